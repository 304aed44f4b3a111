use bytes::BytesMut;
use std::io;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tracing::trace;

use crate::error::SessionError;
use crate::metrics::SessionMetrics;
use crate::soupbintcp::packets::{
    decode_packet, encode_packet, LoginAccepted, LoginRequest, Packet, RejectReason,
    CLIENT_HEARTBEAT, DEBUG, END_OF_SESSION, LOGIN_ACCEPTED, LOGIN_REJECTED, SEQUENCED_DATA,
    SERVER_HEARTBEAT, UNSEQUENCED_DATA,
};
use crate::traits::{StatusListener, Writer};

/// Interval after which an idle client sends a heartbeat
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);
/// Silence after which the server is considered dead
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(15);

const RX_BUFFER_CAPACITY: usize = 64 * 1024;

/// Lifecycle events reported to the status listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    LoginAccepted(LoginAccepted),
    LoginRejected(RejectReason),
    HeartbeatTimeout,
    EndOfSession,
}

/// Outcome of one `receive` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receive {
    /// Bytes read from the socket; zero if it was not actually readable
    Processed(usize),
    /// The server closed the connection
    EndOfStream,
}

/// SoupBinTCP client over a connected, non-blocking TCP stream.
///
/// Sequenced and unsequenced data payloads are handed to the writer
/// verbatim, in the order they arrive.
pub struct SoupBinTcpClient<W, S> {
    stream: TcpStream,
    writer: W,
    status: S,
    rx_buf: BytesMut,
    tx_buf: BytesMut,
    heartbeat_interval: Duration,
    heartbeat_timeout: Duration,
    last_rx: Instant,
    last_tx: Instant,
    metrics: SessionMetrics,
}

impl<W: Writer, S: StatusListener<Event>> SoupBinTcpClient<W, S> {
    pub fn new(stream: TcpStream, writer: W, status: S) -> Self {
        let now = Instant::now();
        Self {
            stream,
            writer,
            status,
            rx_buf: BytesMut::with_capacity(RX_BUFFER_CAPACITY),
            tx_buf: BytesMut::new(),
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            last_rx: now,
            last_tx: now,
            metrics: SessionMetrics::new("soupbintcp"),
        }
    }

    pub fn with_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Wait until the stream has data (or EOF) to read
    pub async fn readable(&self) -> io::Result<()> {
        self.stream.readable().await
    }

    pub async fn login(&mut self, request: &LoginRequest) -> Result<(), SessionError> {
        request.encode(&mut self.tx_buf);
        self.flush().await
    }

    /// Read whatever is available without blocking and dispatch every
    /// complete packet.
    pub async fn receive(&mut self) -> Result<Receive, SessionError> {
        self.rx_buf.reserve(RX_BUFFER_CAPACITY);

        let n = match self.stream.try_read_buf(&mut self.rx_buf) {
            Ok(0) => return Ok(Receive::EndOfStream),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(Receive::Processed(0)),
            Err(e) => return Err(e.into()),
        };
        self.last_rx = Instant::now();

        while let Some(packet) = decode_packet(&mut self.rx_buf)? {
            self.handle(packet).await?;
        }

        Ok(Receive::Processed(n))
    }

    /// Send a heartbeat if the client has been quiet for the heartbeat
    /// interval, and report a timeout if the server has been quiet for the
    /// heartbeat timeout.
    pub async fn keep_alive(&mut self) -> Result<(), SessionError> {
        let now = Instant::now();

        if now.duration_since(self.last_tx) >= self.heartbeat_interval {
            encode_packet(&mut self.tx_buf, CLIENT_HEARTBEAT, &[]);
            self.flush().await?;
            self.metrics.heartbeat_sent();
            trace!("Sent client heartbeat");
        }

        if now.duration_since(self.last_rx) > self.heartbeat_timeout {
            self.status.on_event(Event::HeartbeatTimeout);
        }

        Ok(())
    }

    async fn handle(&mut self, packet: Packet) -> Result<(), SessionError> {
        match packet.packet_type {
            SEQUENCED_DATA | UNSEQUENCED_DATA => {
                self.writer.write(&packet.payload).await?;
                self.metrics.record_message(packet.payload.len());
            }
            SERVER_HEARTBEAT => trace!("Server heartbeat received"),
            DEBUG => {
                let text = String::from_utf8_lossy(&packet.payload);
                trace!(text = %text, "Debug packet received");
            }
            LOGIN_ACCEPTED => {
                let accepted = LoginAccepted::decode(&packet.payload)?;
                self.status.on_event(Event::LoginAccepted(accepted));
            }
            LOGIN_REJECTED => {
                let reason = RejectReason::decode(&packet.payload)?;
                self.status.on_event(Event::LoginRejected(reason));
            }
            END_OF_SESSION => self.status.on_event(Event::EndOfSession),
            other => {
                return Err(SessionError::Protocol(format!(
                    "unknown packet type 0x{:02x}",
                    other
                )))
            }
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SessionError> {
        self.stream.write_all(&self.tx_buf).await?;
        self.tx_buf.clear();
        self.last_tx = Instant::now();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::soupbintcp::packets::LOGIN_REQUEST_LEN;
    use crate::test_helpers::{FailingWriter, MemoryWriter};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, server) = tokio::join!(TcpStream::connect(addr), listener.accept());
        (client.unwrap(), server.unwrap().0)
    }

    fn packet(packet_type: u8, payload: &[u8]) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_packet(&mut buf, packet_type, payload);
        buf.to_vec()
    }

    /// Drive the client until the server hangs up
    async fn receive_to_end<W: Writer, S: StatusListener<Event>>(
        client: &mut SoupBinTcpClient<W, S>,
    ) -> Result<(), SessionError> {
        loop {
            client.readable().await?;
            if client.receive().await? == Receive::EndOfStream {
                return Ok(());
            }
        }
    }

    #[tokio::test]
    async fn test_login_request_on_wire() {
        let (stream, mut server) = connected_pair().await;
        let mut writer = MemoryWriter::default();
        let mut events: Vec<Event> = Vec::new();
        let mut client = SoupBinTcpClient::new(stream, &mut writer, &mut events);

        client
            .login(&LoginRequest {
                username: "user".to_string(),
                password: "secret".to_string(),
                requested_session: String::new(),
                requested_sequence_number: 1,
            })
            .await
            .unwrap();

        let mut buf = vec![0u8; 3 + LOGIN_REQUEST_LEN];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(buf[2], b'L');
        assert_eq!(&buf[3..9], b"user  ");
        assert_eq!(&buf[buf.len() - 1..], b"1");
    }

    #[tokio::test]
    async fn test_forwards_data_in_order() {
        let (stream, mut server) = connected_pair().await;
        let mut writer = MemoryWriter::default();
        let mut events: Vec<Event> = Vec::new();

        let mut wire = Vec::new();
        let mut accepted = BytesMut::new();
        LoginAccepted {
            session: "S1".to_string(),
            sequence_number: 1,
        }
        .encode(&mut accepted);
        wire.extend_from_slice(&accepted);
        wire.extend(packet(SEQUENCED_DATA, &[1u8; 10]));
        wire.extend(packet(SERVER_HEARTBEAT, b""));
        wire.extend(packet(UNSEQUENCED_DATA, &[2u8; 24]));
        wire.extend(packet(DEBUG, b"hello"));
        wire.extend(packet(SEQUENCED_DATA, &[3u8; 8]));
        server.write_all(&wire).await.unwrap();
        drop(server);

        let mut client = SoupBinTcpClient::new(stream, &mut writer, &mut events);
        receive_to_end(&mut client).await.unwrap();
        drop(client);

        assert_eq!(
            writer.messages,
            vec![vec![1u8; 10], vec![2u8; 24], vec![3u8; 8]]
        );
        assert_eq!(
            events,
            vec![Event::LoginAccepted(LoginAccepted {
                session: "S1".to_string(),
                sequence_number: 1,
            })]
        );
    }

    #[tokio::test]
    async fn test_packet_split_across_reads() {
        let (stream, mut server) = connected_pair().await;
        let mut writer = MemoryWriter::default();
        let mut events: Vec<Event> = Vec::new();
        let mut client = SoupBinTcpClient::new(stream, &mut writer, &mut events);

        let wire = packet(SEQUENCED_DATA, b"split message");
        server.write_all(&wire[..5]).await.unwrap();
        server.flush().await.unwrap();

        client.readable().await.unwrap();
        assert!(matches!(client.receive().await.unwrap(), Receive::Processed(n) if n > 0));

        server.write_all(&wire[5..]).await.unwrap();
        drop(server);
        receive_to_end(&mut client).await.unwrap();
        drop(client);

        assert_eq!(writer.messages, vec![b"split message".to_vec()]);
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let (stream, mut server) = connected_pair().await;
        let mut writer = MemoryWriter::default();
        let mut events: Vec<Event> = Vec::new();

        let mut wire = packet(LOGIN_REJECTED, b"A");
        wire.extend(packet(END_OF_SESSION, b""));
        server.write_all(&wire).await.unwrap();
        drop(server);

        let mut client = SoupBinTcpClient::new(stream, &mut writer, &mut events);
        receive_to_end(&mut client).await.unwrap();
        drop(client);

        assert_eq!(
            events,
            vec![
                Event::LoginRejected(RejectReason::NotAuthorized),
                Event::EndOfSession
            ]
        );
        assert!(writer.messages.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_packet_type_is_fatal() {
        let (stream, mut server) = connected_pair().await;
        let mut writer = MemoryWriter::default();
        let mut events: Vec<Event> = Vec::new();

        server.write_all(&packet(b'?', b"")).await.unwrap();
        drop(server);

        let mut client = SoupBinTcpClient::new(stream, &mut writer, &mut events);
        let err = receive_to_end(&mut client).await.unwrap_err();
        assert!(matches!(err, SessionError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_writer_failure_propagates() {
        let (stream, mut server) = connected_pair().await;
        let mut events: Vec<Event> = Vec::new();

        server
            .write_all(&packet(SEQUENCED_DATA, b"lost"))
            .await
            .unwrap();
        drop(server);

        let mut client = SoupBinTcpClient::new(stream, FailingWriter, &mut events);
        let err = receive_to_end(&mut client).await.unwrap_err();
        assert!(matches!(err, SessionError::Writer(_)));
    }

    #[tokio::test]
    async fn test_keep_alive_sends_heartbeat() {
        let (stream, mut server) = connected_pair().await;
        let mut writer = MemoryWriter::default();
        let mut events: Vec<Event> = Vec::new();
        let mut client = SoupBinTcpClient::new(stream, &mut writer, &mut events)
            .with_heartbeat(Duration::from_millis(10), Duration::from_secs(60));

        // Nothing due yet
        client.keep_alive().await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        client.keep_alive().await.unwrap();
        assert!(client.metrics().heartbeats_sent() >= 1);

        let mut buf = [0u8; 3];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"\x00\x01R");
        drop(client);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_keep_alive_reports_heartbeat_timeout() {
        let (stream, _server) = connected_pair().await;
        let mut writer = MemoryWriter::default();
        let mut events: Vec<Event> = Vec::new();
        let mut client = SoupBinTcpClient::new(stream, &mut writer, &mut events)
            .with_heartbeat(Duration::from_millis(10), Duration::from_millis(30));

        client.keep_alive().await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        client.keep_alive().await.unwrap();
        drop(client);

        assert_eq!(events, vec![Event::HeartbeatTimeout]);
    }
}
