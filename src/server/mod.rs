use crate::{
    common::logging::{log_closed_session, log_closed_session_with_error, log_opened_session},
    io::MorayStream,
    resolver::{self, DnsResolver},
    server::session::Session,
};
use anyhow::Result;
use log::{error, info, warn};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};

mod auth;

pub mod session;

pub struct MorayServer {
    addr: SocketAddr,
}

impl MorayServer {
    pub fn new(addr: SocketAddr) -> MorayServer {
        MorayServer { addr }
    }

    pub async fn run(&self) -> Result<()> {
        let tcp_listener = self.bind().await?;
        // Replies advertise the actually bound address, the configured one
        // may carry port 0.
        let server_addr = tcp_listener.local_addr()?;

        let resolver = DnsResolver::spawn(resolver::DEFAULT_UPSTREAM.parse()?).await?;

        loop {
            match tcp_listener.accept().await {
                Ok((stream, addr)) => self.on_client_connected(stream, addr, server_addr, resolver.clone()),
                Err(err) => warn!("Error while accepting the TCP connection: {}", err),
            }
        }
    }

    async fn bind(&self) -> Result<TcpListener> {
        let tcp_listener = TcpListener::bind(self.addr).await?;
        info!("Listening on {}", self.addr);

        Ok(tcp_listener)
    }

    fn on_client_connected(&self, stream: TcpStream, addr: SocketAddr, server_addr: SocketAddr, resolver: DnsResolver) {
        log_opened_session!(addr);

        tokio::spawn(async move {
            let mut session = Session::new(MorayStream::new(stream), addr, server_addr, resolver);
            match session.handle().await {
                Ok(()) => log_closed_session!(addr),
                Err(err) => log_closed_session_with_error!(addr, err),
            }
        });
    }
}
