//! Minimal DNS SRV client over UDP.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::net::UdpSocket;
use tokio::time::timeout;

use super::{DiscoveryError, SrvResolver, SrvTarget};

/// Default resolver configuration file.
pub const RESOLV_CONF: &str = "/etc/resolv.conf";

/// Standard DNS port.
pub const DNS_PORT: u16 = 53;

const TYPE_SRV: u16 = 33;
const CLASS_IN: u16 = 1;
const FLAG_QR: u16 = 0x8000;
const FLAG_TC: u16 = 0x0200;
const FLAG_RD: u16 = 0x0100;
const MAX_POINTER_JUMPS: usize = 16;

/// Sends one SRV question per lookup to a single nameserver.
///
/// Without an explicit server, the first `nameserver` entry of the resolver
/// configuration is used. Truncated responses are rejected (no TCP fallback).
#[derive(Debug, Clone)]
pub struct UdpSrvResolver {
    timeout: Duration,
    resolv_conf: PathBuf,
}

impl UdpSrvResolver {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            resolv_conf: PathBuf::from(RESOLV_CONF),
        }
    }

    /// Read nameservers from a different file.
    pub fn with_resolv_conf(mut self, path: impl Into<PathBuf>) -> Self {
        self.resolv_conf = path.into();
        self
    }

    /// First nameserver listed in the resolver configuration.
    pub fn system_nameserver(&self) -> Result<SocketAddr, DiscoveryError> {
        let content = std::fs::read_to_string(&self.resolv_conf)
            .map_err(DiscoveryError::ResolverConfig)?;

        content
            .lines()
            .map(str::trim)
            .filter_map(|line| line.strip_prefix("nameserver"))
            .filter_map(|rest| rest.trim().split('%').next()?.parse::<IpAddr>().ok())
            .map(|ip| SocketAddr::new(ip, DNS_PORT))
            .next()
            .ok_or_else(|| DiscoveryError::NoNameserver(self.resolv_conf.display().to_string()))
    }
}

#[async_trait::async_trait]
impl SrvResolver for UdpSrvResolver {
    async fn lookup_srv(
        &self,
        record: &str,
        server: Option<SocketAddr>,
    ) -> Result<Vec<SrvTarget>, DiscoveryError> {
        let server = match server {
            Some(server) => server,
            None => self.system_nameserver()?,
        };
        let io_err = |source| DiscoveryError::Dns {
            record: record.to_string(),
            source,
        };
        let bad_response = |reason| DiscoveryError::Response {
            record: record.to_string(),
            reason,
        };

        let id = query_id();
        let query = build_srv_query(id, record).map_err(bad_response)?;

        let bind: SocketAddr = if server.is_ipv4() {
            ([0, 0, 0, 0], 0).into()
        } else {
            ([0u16; 8], 0).into()
        };
        let socket = UdpSocket::bind(bind).await.map_err(io_err)?;
        socket.connect(server).await.map_err(io_err)?;
        socket.send(&query).await.map_err(io_err)?;
        tracing::debug!(record = %record, server = %server, "Sent SRV query");

        let mut buf = vec![0u8; 4096];
        let len = timeout(self.timeout, socket.recv(&mut buf))
            .await
            .map_err(|_| DiscoveryError::DnsTimeout {
                record: record.to_string(),
                server,
            })?
            .map_err(io_err)?;

        let targets = parse_srv_response(&buf[..len], id).map_err(bad_response)?;
        tracing::debug!(record = %record, targets = targets.len(), "Received SRV answer");
        Ok(targets)
    }
}

fn query_id() -> u16 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| (d.subsec_nanos() ^ d.as_secs() as u32) as u16)
        .unwrap_or(0x4d54)
}

/// Append a name as length-prefixed labels.
fn encode_name(buf: &mut Vec<u8>, name: &str) -> Result<(), String> {
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() {
            return Err(format!("empty label in name '{name}'"));
        }
        if label.len() > 63 {
            return Err(format!("label '{label}' exceeds 63 bytes"));
        }
        buf.push(label.len() as u8);
        buf.extend_from_slice(label.as_bytes());
    }
    buf.push(0);
    Ok(())
}

/// Build a recursive SRV question for `record`.
pub fn build_srv_query(id: u16, record: &str) -> Result<Vec<u8>, String> {
    let mut buf = Vec::with_capacity(64);
    buf.extend_from_slice(&id.to_be_bytes());
    buf.extend_from_slice(&FLAG_RD.to_be_bytes());
    buf.extend_from_slice(&1u16.to_be_bytes()); // QDCOUNT
    buf.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // AN/NS/AR
    encode_name(&mut buf, record)?;
    buf.extend_from_slice(&TYPE_SRV.to_be_bytes());
    buf.extend_from_slice(&CLASS_IN.to_be_bytes());
    Ok(buf)
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, String> {
    data.get(offset..offset + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| "truncated packet".to_string())
}

/// Read a possibly-compressed name; returns it with the offset just past it.
fn parse_name(data: &[u8], start: usize) -> Result<(String, usize), String> {
    let mut labels: Vec<String> = Vec::new();
    let mut offset = start;
    let mut resume: Option<usize> = None;
    let mut jumps = 0;

    loop {
        let len = *data.get(offset).ok_or("name extends beyond packet")? as usize;

        if len & 0xC0 == 0xC0 {
            let low = *data.get(offset + 1).ok_or("pointer extends beyond packet")? as usize;
            jumps += 1;
            if jumps > MAX_POINTER_JUMPS {
                return Err("too many compression pointers".to_string());
            }
            resume.get_or_insert(offset + 2);
            offset = ((len & 0x3F) << 8) | low;
            continue;
        }

        offset += 1;
        if len == 0 {
            break;
        }

        let label = data
            .get(offset..offset + len)
            .ok_or("label extends beyond packet")?;
        labels.push(String::from_utf8_lossy(label).into_owned());
        offset += len;
    }

    Ok((labels.join("."), resume.unwrap_or(offset)))
}

fn rcode_name(rcode: u16) -> &'static str {
    match rcode {
        1 => "FORMERR",
        2 => "SERVFAIL",
        3 => "NXDOMAIN",
        4 => "NOTIMP",
        5 => "REFUSED",
        _ => "error",
    }
}

/// Extract SRV answers from a response to query `id`.
pub fn parse_srv_response(data: &[u8], id: u16) -> Result<Vec<SrvTarget>, String> {
    if data.len() < 12 {
        return Err("packet too short".to_string());
    }
    if read_u16(data, 0)? != id {
        return Err("transaction id mismatch".to_string());
    }

    let flags = read_u16(data, 2)?;
    if flags & FLAG_QR == 0 {
        return Err("packet is not a response".to_string());
    }
    if flags & FLAG_TC != 0 {
        return Err("response truncated".to_string());
    }
    let rcode = flags & 0x000F;
    if rcode != 0 {
        return Err(format!("server returned {} ({rcode})", rcode_name(rcode)));
    }

    let qdcount = read_u16(data, 4)?;
    let ancount = read_u16(data, 6)?;
    let mut offset = 12;

    for _ in 0..qdcount {
        let (_, next) = parse_name(data, offset)?;
        offset = next + 4;
    }

    let mut targets = Vec::new();
    for _ in 0..ancount {
        let (_, next) = parse_name(data, offset)?;
        let rtype = read_u16(data, next)?;
        let rdlength = read_u16(data, next + 8)? as usize;
        let rdata = next + 10;
        if rdata + rdlength > data.len() {
            return Err("record data extends beyond packet".to_string());
        }

        if rtype == TYPE_SRV {
            let priority = read_u16(data, rdata)?;
            let weight = read_u16(data, rdata + 2)?;
            let port = read_u16(data, rdata + 4)?;
            let (target, _) = parse_name(data, rdata + 6)?;
            targets.push(SrvTarget {
                target,
                port,
                priority,
                weight,
            });
        }
        offset = rdata + rdlength;
    }

    Ok(targets)
}
