//! Asynchronous, queued, cache-backed DNS client.
//!
//! One resolver instance is created at server startup and a cloned handle is
//! passed into every session. A single actor task owns the UDP socket:
//! lookups are queued FIFO over a channel, one query datagram is sent per
//! loop iteration, and replies are demultiplexed back to waiters by the
//! echoed question name. Answered names are cached forever.
//!
//! Carried over from the design this implements: no retry and no timeout. A
//! query or reply lost on the wire leaves its callers pending indefinitely.

use crate::common::error::MorayError;
use anyhow::Result;
use log::{debug, warn};
use std::{
    collections::HashMap,
    net::{Ipv4Addr, SocketAddr},
};
use tokio::{
    net::UdpSocket,
    sync::{mpsc, oneshot},
};

pub mod message;

/// Upstream resolver queried for every non-cached name.
pub const DEFAULT_UPSTREAM: &str = "8.8.8.8:53";

/// Largest reply datagram accepted over plain UDP.
const MAX_DATAGRAM_LEN: usize = 512;

struct Lookup {
    name: String,
    waiter: oneshot::Sender<Vec<Ipv4Addr>>,
}

/// Clonable resolver handle. Dropping every handle stops the actor task.
#[derive(Clone)]
pub struct DnsResolver {
    lookups: mpsc::UnboundedSender<Lookup>,
}

impl DnsResolver {
    /// Binds the resolver's UDP socket, connects it to `upstream` and spawns
    /// the actor task.
    pub async fn spawn(upstream: SocketAddr) -> Result<DnsResolver> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(upstream).await?;
        debug!("DNS resolver bound to {}, upstream {}", socket.local_addr()?, upstream);

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(ResolverActor::new(socket, rx).run());

        Ok(DnsResolver { lookups: tx })
    }

    /// Resolves `name` to its A records. Cached names answer immediately;
    /// everything else waits for the upstream reply. The returned list may
    /// be empty when the upstream answered without A records.
    pub async fn resolve(&self, name: &str) -> Result<Vec<Ipv4Addr>> {
        let (tx, rx) = oneshot::channel();
        self.lookups
            .send(Lookup {
                name: name.to_string(),
                waiter: tx,
            })
            .map_err(|_| MorayError::ResolverUnavailable)?;

        rx.await.map_err(|_| MorayError::ResolverUnavailable.into())
    }
}

struct ResolverActor {
    socket: UdpSocket,
    lookups: mpsc::UnboundedReceiver<Lookup>,
    cache: HashMap<String, Vec<Ipv4Addr>>,
    waiting_reply: HashMap<String, Vec<oneshot::Sender<Vec<Ipv4Addr>>>>,
    next_id: u16,
}

impl ResolverActor {
    fn new(socket: UdpSocket, lookups: mpsc::UnboundedReceiver<Lookup>) -> ResolverActor {
        ResolverActor {
            socket,
            lookups,
            cache: HashMap::new(),
            waiting_reply: HashMap::new(),
            next_id: 0,
        }
    }

    async fn run(mut self) {
        let mut datagram = [0u8; MAX_DATAGRAM_LEN];
        loop {
            tokio::select! {
                lookup = self.lookups.recv() => match lookup {
                    Some(lookup) => self.handle_lookup(lookup).await,
                    // All handles dropped, pending waiters resolve with
                    // ResolverUnavailable on their side.
                    None => break,
                },
                received = self.socket.recv(&mut datagram) => match received {
                    Ok(len) => self.handle_reply(&datagram[..len]),
                    Err(err) => warn!("DNS socket receive error: {}", err),
                },
            }
        }
        debug!("DNS resolver actor finished");
    }

    async fn handle_lookup(&mut self, lookup: Lookup) {
        if let Some(cached) = self.cache.get(&lookup.name) {
            debug!("DNS cache hit for {}", lookup.name);
            // Waiter may be gone already, nothing to do about it here.
            let _ = lookup.waiter.send(cached.clone());
            return;
        }

        // A query for this name is already in flight, join its waiters
        // instead of sending a duplicate.
        if let Some(waiters) = self.waiting_reply.get_mut(&lookup.name) {
            debug!("DNS lookup for {} joins the in-flight query", lookup.name);
            waiters.push(lookup.waiter);
            return;
        }

        self.next_id = self.next_id.wrapping_add(1);
        let query = match message::encode_query(self.next_id, &lookup.name) {
            Ok(query) => query,
            Err(err) => {
                warn!("Dropping DNS lookup for '{}': {}", lookup.name, err);
                return;
            }
        };

        debug!("Sending DNS query #{} for {}", self.next_id, lookup.name);
        match self.socket.send(&query).await {
            // Waiter registration happens only after a successful send, so
            // a send failure surfaces as ResolverUnavailable to the caller
            // rather than an eternally pending lookup.
            Ok(_) => {
                self.waiting_reply.insert(lookup.name, vec![lookup.waiter]);
            }
            Err(err) => warn!("Failed to send DNS query for {}: {}", lookup.name, err),
        }
    }

    fn handle_reply(&mut self, datagram: &[u8]) {
        let reply = match message::decode_reply(datagram) {
            Ok(reply) => reply,
            Err(err) => {
                warn!("Discarding undecodable DNS datagram: {}", err);
                return;
            }
        };

        debug!(
            "DNS reply #{} for {}: {} A record(s)",
            reply.id,
            reply.question,
            reply.addresses.len()
        );

        // First reply wins, later duplicates never overwrite the cache.
        if !self.cache.contains_key(&reply.question) {
            self.cache.insert(reply.question.clone(), reply.addresses.clone());
        }

        if let Some(waiters) = self.waiting_reply.remove(&reply.question) {
            for waiter in waiters {
                let _ = waiter.send(reply.addresses.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    /// Minimal upstream stand-in: answers every query for `name` with the
    /// given records and counts received datagrams.
    async fn spawn_fake_upstream(answers: Vec<Ipv4Addr>) -> (SocketAddr, mpsc::UnboundedReceiver<()>) {
        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = socket.local_addr().unwrap();
        let (seen_tx, seen_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut buf = [0u8; MAX_DATAGRAM_LEN];
            loop {
                let (len, peer) = socket.recv_from(&mut buf).await.unwrap();
                seen_tx.send(()).unwrap();

                let id = u16::from_be_bytes([buf[0], buf[1]]);
                let question = &buf[12..len];
                let mut reply = Vec::new();
                reply.extend_from_slice(&id.to_be_bytes());
                reply.extend_from_slice(&[0x81, 0x80]);
                reply.extend_from_slice(&1u16.to_be_bytes());
                reply.extend_from_slice(&(answers.len() as u16).to_be_bytes());
                reply.extend_from_slice(&[0, 0, 0, 0]);
                reply.extend_from_slice(question);
                for answer in &answers {
                    reply.extend_from_slice(&[0xC0, 0x0C]);
                    reply.extend_from_slice(&[0x00, 0x01, 0x00, 0x01]);
                    reply.extend_from_slice(&300u32.to_be_bytes());
                    reply.extend_from_slice(&4u16.to_be_bytes());
                    reply.extend_from_slice(&answer.octets());
                }
                socket.send_to(&reply, peer).await.unwrap();
            }
        });

        (addr, seen_rx)
    }

    fn queries_seen(seen: &mut mpsc::UnboundedReceiver<()>) -> usize {
        let mut count = 0;
        while seen.try_recv().is_ok() {
            count += 1;
        }
        count
    }

    #[tokio::test]
    async fn cached_name_sends_no_further_queries() {
        let records = vec![Ipv4Addr::new(93, 184, 216, 34)];
        let (upstream, mut seen) = spawn_fake_upstream(records.clone()).await;
        let resolver = DnsResolver::spawn(upstream).await.unwrap();

        let first = resolver.resolve("example.com").await.unwrap();
        assert_eq!(records, first);
        assert_eq!(1, queries_seen(&mut seen));

        let second = resolver.resolve("example.com").await.unwrap();
        assert_eq!(records, second);
        assert_eq!(0, queries_seen(&mut seen), "cache hit must not query upstream");
    }

    #[tokio::test]
    async fn concurrent_lookups_coalesce_into_one_query() {
        let records = vec![Ipv4Addr::new(198, 51, 100, 7)];
        let (upstream, mut seen) = spawn_fake_upstream(records.clone()).await;
        let resolver = DnsResolver::spawn(upstream).await.unwrap();

        let (first, second) = tokio::join!(resolver.resolve("example.org"), resolver.resolve("example.org"));
        assert_eq!(records, first.unwrap());
        assert_eq!(records, second.unwrap());
        assert_eq!(1, queries_seen(&mut seen), "in-flight lookups must share one query");
    }

    #[tokio::test]
    async fn reply_without_records_resolves_empty() {
        let (upstream, _seen) = spawn_fake_upstream(vec![]).await;
        let resolver = DnsResolver::spawn(upstream).await.unwrap();

        let records = timeout(Duration::from_secs(5), resolver.resolve("nowhere.invalid"))
            .await
            .expect("negative reply must resolve the lookup")
            .unwrap();
        assert!(records.is_empty());
    }
}
