use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::time::Duration;

use crate::config::SessionSection;
use crate::error::MetadataError;

/// Default interval after which an idle SoupBinTCP client sends a heartbeat
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 1_000;
/// Default silence after which the SoupBinTCP peer is considered dead
pub const DEFAULT_HEARTBEAT_TIMEOUT_MS: u64 = 15_000;
/// Default age after which an unanswered MoldUDP64 request is re-sent
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 1_000;

/// SoupBinTCP field widths
pub const MAX_USERNAME_LEN: usize = 6;
pub const MAX_PASSWORD_LEN: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    SoupBinTcp,
    MoldUdp64,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::SoupBinTcp => write!(f, "soupbintcp"),
            TransportKind::MoldUdp64 => write!(f, "moldudp64"),
        }
    }
}

/// Interface on which the multicast group is joined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MulticastInterface {
    Address(Ipv4Addr),
    Name(String),
}

impl MulticastInterface {
    pub fn parse(value: &str) -> Result<Self, MetadataError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(MetadataError::Validation(
                "multicast-interface must not be empty".to_string(),
            ));
        }
        Ok(match value.parse::<Ipv4Addr>() {
            Ok(addr) => MulticastInterface::Address(addr),
            Err(_) => MulticastInterface::Name(value.to_string()),
        })
    }
}

impl fmt::Display for MulticastInterface {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MulticastInterface::Address(addr) => write!(f, "{}", addr),
            MulticastInterface::Name(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SoupBinTcpConfig {
    pub address: SocketAddr,
    pub username: String,
    pub password: String,
    pub heartbeat_interval: Duration,
    pub heartbeat_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct MoldUdp64Config {
    pub interface: MulticastInterface,
    pub group: Ipv4Addr,
    pub port: u16,
    pub request_address: SocketAddr,
    pub request_timeout: Duration,
}

/// Fully resolved session parameters. Exactly one variant per run.
#[derive(Debug, Clone)]
pub enum SessionConfig {
    SoupBinTcp(SoupBinTcpConfig),
    MoldUdp64(MoldUdp64Config),
}

impl SessionConfig {
    pub fn resolve(section: &SessionSection) -> Result<Self, MetadataError> {
        match section.multicast_interface {
            Some(ref interface) => {
                resolve_moldudp64(section, interface).map(SessionConfig::MoldUdp64)
            }
            None => resolve_soupbintcp(section).map(SessionConfig::SoupBinTcp),
        }
    }

    pub fn kind(&self) -> TransportKind {
        match self {
            SessionConfig::SoupBinTcp(_) => TransportKind::SoupBinTcp,
            SessionConfig::MoldUdp64(_) => TransportKind::MoldUdp64,
        }
    }
}

fn resolve_soupbintcp(section: &SessionSection) -> Result<SoupBinTcpConfig, MetadataError> {
    let host = required(&section.address, "session.address")?;
    let port = port(section.port, "session.port")?;
    let username = required(&section.username, "session.username")?;
    let password = required(&section.password, "session.password")?;

    check_field(username, "session.username", MAX_USERNAME_LEN)?;
    check_field(password, "session.password", MAX_PASSWORD_LEN)?;

    let heartbeat_interval = Duration::from_millis(
        section
            .heartbeat_interval_ms
            .unwrap_or(DEFAULT_HEARTBEAT_INTERVAL_MS),
    );
    let heartbeat_timeout = Duration::from_millis(
        section
            .heartbeat_timeout_ms
            .unwrap_or(DEFAULT_HEARTBEAT_TIMEOUT_MS),
    );
    if heartbeat_interval.is_zero() || heartbeat_timeout <= heartbeat_interval {
        return Err(MetadataError::Validation(format!(
            "heartbeat-timeout-ms ({}) must exceed a non-zero heartbeat-interval-ms ({})",
            heartbeat_timeout.as_millis(),
            heartbeat_interval.as_millis()
        )));
    }

    Ok(SoupBinTcpConfig {
        address: resolve_host("session.address", host, port)?,
        username: username.clone(),
        password: password.clone(),
        heartbeat_interval,
        heartbeat_timeout,
    })
}

fn resolve_moldudp64(
    section: &SessionSection,
    interface: &str,
) -> Result<MoldUdp64Config, MetadataError> {
    let interface = MulticastInterface::parse(interface)?;
    let group = required(&section.multicast_group, "session.multicast-group")?;
    let multicast_port = port(section.multicast_port, "session.multicast-port")?;
    let request_host = required(&section.request_address, "session.request-address")?;
    let request_port = port(section.request_port, "session.request-port")?;

    let group_addr = match resolve_host("session.multicast-group", group, multicast_port)?.ip() {
        IpAddr::V4(addr) if addr.is_multicast() => addr,
        other => {
            return Err(MetadataError::Validation(format!(
                "session.multicast-group {} is not an IPv4 multicast address",
                other
            )))
        }
    };

    let request_timeout = Duration::from_millis(
        section
            .request_timeout_ms
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
    );
    if request_timeout.is_zero() {
        return Err(MetadataError::Validation(
            "request-timeout-ms must be non-zero".to_string(),
        ));
    }

    Ok(MoldUdp64Config {
        interface,
        group: group_addr,
        port: multicast_port,
        request_address: resolve_host("session.request-address", request_host, request_port)?,
        request_timeout,
    })
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a String, MetadataError> {
    value
        .as_ref()
        .ok_or_else(|| MetadataError::MissingKey(key.to_string()))
}

fn port(value: Option<u32>, key: &str) -> Result<u16, MetadataError> {
    let value = value.ok_or_else(|| MetadataError::MissingKey(key.to_string()))?;
    match u16::try_from(value) {
        Ok(port) if port != 0 => Ok(port),
        _ => Err(MetadataError::Validation(format!(
            "{} must be between 1 and 65535, got {}",
            key, value
        ))),
    }
}

fn check_field(value: &str, key: &str, max_len: usize) -> Result<(), MetadataError> {
    if !value.is_ascii() || value.len() > max_len {
        return Err(MetadataError::Validation(format!(
            "{} must be at most {} ASCII characters",
            key, max_len
        )));
    }
    Ok(())
}

/// Resolve a host name, preferring an IPv4 address when both families exist.
fn resolve_host(key: &str, host: &str, port: u16) -> Result<SocketAddr, MetadataError> {
    let resolve_err = |source: std::io::Error| MetadataError::Resolve {
        key: key.to_string(),
        value: host.to_string(),
        source,
    };

    let addrs: Vec<SocketAddr> = (host, port).to_socket_addrs().map_err(resolve_err)?.collect();

    addrs
        .iter()
        .find(|addr| addr.is_ipv4())
        .or_else(|| addrs.first())
        .copied()
        .ok_or_else(|| {
            resolve_err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no addresses found",
            ))
        })
}
