//! Transport selection: builds exactly one session from the resolved
//! configuration, wired to the sink and the status observer.

use mdrec_metadata::{
    MoldUdp64Config, MulticastInterface, SessionConfig, SoupBinTcpConfig, TransportKind,
};
use socket2::{Domain, InterfaceIndexOrAddress, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::{TcpStream, UdpSocket};
use tracing::info;

use crate::error::ConnectorError;
use crate::liveness::Liveness;
use crate::metrics::SessionMetrics;
use crate::moldudp64::MoldUdp64Client;
use crate::soupbintcp::{LoginRequest, SoupBinTcpClient};
use crate::status::RecorderStatus;
use crate::traits::Writer;

/// The one live session of a run
pub enum Session<W> {
    SoupBinTcp(SoupBinTcpClient<W, RecorderStatus>),
    MoldUdp64(MoldUdp64Client<W, RecorderStatus>),
}

impl<W: Writer> Session<W> {
    pub fn kind(&self) -> TransportKind {
        match self {
            Session::SoupBinTcp(_) => TransportKind::SoupBinTcp,
            Session::MoldUdp64(_) => TransportKind::MoldUdp64,
        }
    }

    pub fn metrics(&self) -> &SessionMetrics {
        match self {
            Session::SoupBinTcp(client) => client.metrics(),
            Session::MoldUdp64(client) => client.metrics(),
        }
    }
}

/// Open the session the configuration selects.
pub async fn open<W: Writer>(
    config: &SessionConfig,
    writer: W,
    liveness: &Liveness,
) -> Result<Session<W>, ConnectorError> {
    match config {
        SessionConfig::SoupBinTcp(config) => {
            connect(config, writer, liveness).await.map(Session::SoupBinTcp)
        }
        SessionConfig::MoldUdp64(config) => {
            join(config, writer, liveness).await.map(Session::MoldUdp64)
        }
    }
}

/// Connect to the SoupBinTCP server and log in from sequence number 1 of
/// the current session.
pub async fn connect<W: Writer>(
    config: &SoupBinTcpConfig,
    writer: W,
    liveness: &Liveness,
) -> Result<SoupBinTcpClient<W, RecorderStatus>, ConnectorError> {
    info!(addr = %config.address, "Connecting to SoupBinTCP server");

    let stream = TcpStream::connect(config.address)
        .await
        .map_err(|e| ConnectorError::ConnectionFailed(format!("{}: {}", config.address, e)))?;
    stream
        .set_nodelay(true)
        .map_err(|e| ConnectorError::ConnectionFailed(format!("{}: {}", config.address, e)))?;

    let status = RecorderStatus::new(liveness.clone(), TransportKind::SoupBinTcp);
    let mut client = SoupBinTcpClient::new(stream, writer, status)
        .with_heartbeat(config.heartbeat_interval, config.heartbeat_timeout);

    client
        .login(&LoginRequest {
            username: config.username.clone(),
            password: config.password.clone(),
            requested_session: String::new(),
            requested_sequence_number: 1,
        })
        .await?;
    info!(username = %config.username, "Sent login request");

    Ok(client)
}

/// Join the multicast group and open the request socket.
pub async fn join<W: Writer>(
    config: &MoldUdp64Config,
    writer: W,
    liveness: &Liveness,
) -> Result<MoldUdp64Client<W, RecorderStatus>, ConnectorError> {
    info!(
        group = %config.group,
        port = config.port,
        interface = %config.interface,
        "Joining MoldUDP64 multicast group"
    );

    let socket = multicast_socket(config).map_err(|e| {
        ConnectorError::JoinFailed(format!(
            "{}:{} on {}: {}",
            config.group, config.port, config.interface, e
        ))
    })?;

    let request_bind: SocketAddr = if config.request_address.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let request_socket = UdpSocket::bind(request_bind)
        .await
        .map_err(|e| ConnectorError::ConnectionFailed(format!("request socket: {}", e)))?;

    info!(request_addr = %config.request_address, "Joined multicast group");

    let status = RecorderStatus::new(liveness.clone(), TransportKind::MoldUdp64);
    Ok(MoldUdp64Client::new(
        socket,
        request_socket,
        config.request_address,
        writer,
        status,
    )
    .with_request_timeout(config.request_timeout))
}

fn multicast_socket(config: &MoldUdp64Config) -> io::Result<UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&SocketAddr::from((Ipv4Addr::UNSPECIFIED, config.port)).into())?;

    match config.interface {
        MulticastInterface::Address(ref addr) => socket.join_multicast_v4(&config.group, addr)?,
        MulticastInterface::Name(ref name) => socket.join_multicast_v4_n(
            &config.group,
            &InterfaceIndexOrAddress::Index(interface_index(name)?),
        )?,
    }

    socket.set_nonblocking(true)?;
    UdpSocket::from_std(socket.into())
}

#[cfg(unix)]
fn interface_index(name: &str) -> io::Result<u32> {
    let c_name = std::ffi::CString::new(name)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "interface name contains NUL"))?;
    // SAFETY: c_name is a valid NUL-terminated string that outlives the call
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("no such interface: {}", name),
        ));
    }
    Ok(index)
}

#[cfg(not(unix))]
fn interface_index(name: &str) -> io::Result<u32> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        format!("interface names are not supported on this platform: {}", name),
    ))
}
