///
/// DNS message framing for the resolver: single-question A-record
/// queries and the subset of reply parsing the proxy needs.
///
/// RFC 1035, sections 4.1.1 - 4.1.4
///
use crate::common::error::MorayError;
use anyhow::{bail, ensure, Result};
use bytes::{BufMut, BytesMut};
use std::net::Ipv4Addr;

const HEADER_LEN: usize = 12;
const FLAG_RESPONSE: u16 = 0x8000;
const FLAG_RECURSION_DESIRED: u16 = 0x0100;
const TYPE_A: u16 = 0x0001;
const CLASS_IN: u16 = 0x0001;

const MAX_LABEL_LEN: usize = 63;
// An 0xC0-tagged length octet is a two-byte offset into the datagram.
const POINTER_TAG: u8 = 0xC0;
const MAX_POINTER_JUMPS: usize = 16;

/// Serializes a recursion-desired query with a single `IN A` question.
pub fn encode_query(id: u16, name: &str) -> Result<Vec<u8>> {
    let mut bytes = BytesMut::with_capacity(HEADER_LEN + name.len() + 6);

    bytes.put_u16(id);
    bytes.put_u16(FLAG_RECURSION_DESIRED);
    bytes.put_u16(1); // QDCOUNT
    bytes.put_u16(0); // ANCOUNT
    bytes.put_u16(0); // NSCOUNT
    bytes.put_u16(0); // ARCOUNT

    for label in name.split('.') {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            bail!(MorayError::InvalidDnsName(name.to_string()));
        }
        bytes.put_u8(label.len() as u8);
        bytes.put_slice(label.as_bytes());
    }
    bytes.put_u8(0);

    bytes.put_u16(TYPE_A);
    bytes.put_u16(CLASS_IN);

    Ok(bytes.to_vec())
}

/// Parsed reply datagram: the echoed question name keys the demultiplexing,
/// the address list holds every `IN A` answer record in reply order.
#[derive(Debug, PartialEq)]
pub struct DnsReply {
    pub id: u16,
    pub question: String,
    pub addresses: Vec<Ipv4Addr>,
}

pub fn decode_reply(datagram: &[u8]) -> Result<DnsReply> {
    ensure!(
        datagram.len() >= HEADER_LEN,
        MorayError::MalformedDnsReply("datagram shorter than header")
    );

    let id = read_u16(datagram, 0)?;
    let flags = read_u16(datagram, 2)?;
    ensure!(
        flags & FLAG_RESPONSE != 0,
        MorayError::MalformedDnsReply("QR flag marks a query, not a response")
    );

    let qdcount = read_u16(datagram, 4)?;
    let ancount = read_u16(datagram, 6)?;
    ensure!(qdcount >= 1, MorayError::MalformedDnsReply("reply carries no question"));

    let (question, mut pos) = read_name(datagram, HEADER_LEN)?;
    // QTYPE + QCLASS of the first question; further questions never occur
    // with the queries this resolver sends.
    pos = skip(datagram, pos, 4)?;

    let mut addresses = Vec::new();
    for _ in 0..ancount {
        let (_, after_name) = read_name(datagram, pos)?;
        let rtype = read_u16(datagram, after_name)?;
        let rclass = read_u16(datagram, after_name + 2)?;
        let rdlength = read_u16(datagram, after_name + 8)? as usize;
        let rdata_start = after_name + 10;
        pos = skip(datagram, rdata_start, rdlength)?;

        if rtype == TYPE_A && rclass == CLASS_IN && rdlength == 4 {
            let octets: [u8; 4] = datagram[rdata_start..rdata_start + 4]
                .try_into()
                .expect("slice bounds checked above");
            addresses.push(Ipv4Addr::from(octets));
        }
    }

    Ok(DnsReply { id, question, addresses })
}

fn read_u16(buf: &[u8], pos: usize) -> Result<u16> {
    ensure!(
        pos + 2 <= buf.len(),
        MorayError::MalformedDnsReply("truncated 16-bit field")
    );
    Ok(u16::from_be_bytes([buf[pos], buf[pos + 1]]))
}

fn skip(buf: &[u8], pos: usize, n: usize) -> Result<usize> {
    ensure!(pos + n <= buf.len(), MorayError::MalformedDnsReply("truncated record"));
    Ok(pos + n)
}

/// Reads a possibly-compressed domain name starting at `pos` and returns it
/// together with the position right after the name's in-place encoding.
fn read_name(buf: &[u8], pos: usize) -> Result<(String, usize)> {
    let mut name = String::new();
    let mut cursor = pos;
    let mut end = None;
    let mut jumps = 0;

    loop {
        ensure!(cursor < buf.len(), MorayError::MalformedDnsReply("truncated name"));
        let len = buf[cursor];

        if len & POINTER_TAG == POINTER_TAG {
            ensure!(
                jumps < MAX_POINTER_JUMPS,
                MorayError::MalformedDnsReply("compression pointer loop")
            );
            jumps += 1;
            let pointer = read_u16(buf, cursor)? & !((POINTER_TAG as u16) << 8);
            end.get_or_insert(cursor + 2);
            cursor = pointer as usize;
            continue;
        }

        if len == 0 {
            end.get_or_insert(cursor + 1);
            break;
        }

        let label_start = cursor + 1;
        let label_end = skip(buf, label_start, len as usize)?;
        let label = std::str::from_utf8(&buf[label_start..label_end])
            .map_err(|_| MorayError::MalformedDnsReply("label is not valid UTF-8"))?;

        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(label);
        cursor = label_end;
    }

    Ok((name, end.expect("end position recorded before loop exit")))
}
