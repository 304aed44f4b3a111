use bytes::BytesMut;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

use crate::error::SessionError;
use crate::metrics::SessionMetrics;
use crate::moldudp64::packets::{
    session_name, DownstreamPacket, RequestPacket, Session, MAX_REQUEST_COUNT,
};
use crate::traits::{StatusListener, Writer};

/// Age after which an unanswered request is sent again
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(1);

const RX_BUFFER_LEN: usize = 64 * 1024;
/// Datagrams handled per `receive` call before yielding back to the loop
const MAX_DATAGRAMS_PER_RECEIVE: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No packet seen yet
    Unknown,
    /// Every message up to the latest packet has been delivered
    Synchronized,
    /// Waiting for a retransmission to fill a gap
    Backfill,
}

/// Lifecycle events reported to the status listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    State(ClientState),
    Downstream {
        sequence_number: u64,
        message_count: u16,
    },
    Request {
        sequence_number: u64,
        message_count: u16,
    },
    EndOfSession,
}

#[derive(Debug, Clone, Copy)]
enum Source {
    Downstream,
    Response,
}

/// MoldUDP64 client over a multicast receive socket and a unicast request
/// socket.
///
/// Messages reach the writer strictly in sequence order. A packet ahead of
/// the next expected sequence number is dropped and the missing range is
/// requested; retransmissions and later live packets then fill it in.
pub struct MoldUdp64Client<W, S> {
    socket: UdpSocket,
    request_socket: UdpSocket,
    request_address: SocketAddr,
    writer: W,
    status: S,
    session: Option<Session>,
    state: ClientState,
    next_sequence_number: u64,
    /// End (exclusive) of the highest range requested so far
    requested_until: u64,
    last_request: Option<Instant>,
    request_timeout: Duration,
    end_of_session: Option<u64>,
    ended: bool,
    rx_buf: Vec<u8>,
    tx_buf: BytesMut,
    metrics: SessionMetrics,
}

impl<W: Writer, S: StatusListener<Event>> MoldUdp64Client<W, S> {
    pub fn new(
        socket: UdpSocket,
        request_socket: UdpSocket,
        request_address: SocketAddr,
        writer: W,
        status: S,
    ) -> Self {
        Self {
            socket,
            request_socket,
            request_address,
            writer,
            status,
            session: None,
            state: ClientState::Unknown,
            next_sequence_number: 1,
            requested_until: 1,
            last_request: None,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            end_of_session: None,
            ended: false,
            rx_buf: vec![0u8; RX_BUFFER_LEN],
            tx_buf: BytesMut::new(),
            metrics: SessionMetrics::new("moldudp64"),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Multicast receive socket
    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    /// Unicast socket that requests go out on and retransmissions come back on
    pub fn request_socket(&self) -> &UdpSocket {
        &self.request_socket
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn next_sequence_number(&self) -> u64 {
        self.next_sequence_number
    }

    pub fn metrics(&self) -> &SessionMetrics {
        &self.metrics
    }

    /// Handle downstream packets waiting on the multicast socket.
    /// Returns the number of datagrams handled.
    pub async fn receive(&mut self) -> Result<usize, SessionError> {
        self.drain(Source::Downstream).await
    }

    /// Handle retransmissions waiting on the request socket.
    /// Returns the number of datagrams handled.
    pub async fn receive_response(&mut self) -> Result<usize, SessionError> {
        self.drain(Source::Response).await
    }

    async fn drain(&mut self, source: Source) -> Result<usize, SessionError> {
        let mut buf = std::mem::take(&mut self.rx_buf);
        let result = self.drain_into(source, &mut buf).await;
        self.rx_buf = buf;
        result
    }

    async fn drain_into(&mut self, source: Source, buf: &mut [u8]) -> Result<usize, SessionError> {
        let mut handled = 0;
        while handled < MAX_DATAGRAMS_PER_RECEIVE {
            let socket = match source {
                Source::Downstream => &self.socket,
                Source::Response => &self.request_socket,
            };
            let n = match socket.try_recv_from(buf) {
                Ok((n, _)) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(e.into()),
            };
            self.handle(&buf[..n]).await?;
            handled += 1;
        }
        Ok(handled)
    }

    async fn handle(&mut self, datagram: &[u8]) -> Result<(), SessionError> {
        let packet = DownstreamPacket::decode(datagram)?;

        let session = match self.session {
            None => {
                debug!(session = %session_name(&packet.session), "Joined session");
                self.session = Some(packet.session);
                packet.session
            }
            Some(session) if session != packet.session => {
                debug!(
                    session = %session_name(&packet.session),
                    "Ignoring packet from another session"
                );
                return Ok(());
            }
            Some(session) => session,
        };

        self.status.on_event(Event::Downstream {
            sequence_number: packet.sequence_number,
            message_count: packet.message_count,
        });

        if packet.is_end_of_session() && self.end_of_session.is_none() {
            self.end_of_session = Some(packet.sequence_number);
        }

        if packet.sequence_number > self.next_sequence_number {
            self.transition(ClientState::Backfill);
            return self.request(session, packet.next_sequence_number()).await;
        }

        let mut sequence_number = packet.sequence_number;
        for message in packet.messages() {
            let message = message?;
            // Anything below the expected number was already delivered
            if sequence_number == self.next_sequence_number {
                self.writer.write(message).await?;
                self.metrics.record_message(message.len());
                self.next_sequence_number += 1;
            }
            sequence_number += 1;
        }

        if self.next_sequence_number >= self.requested_until {
            self.transition(ClientState::Synchronized);
        }

        if let Some(end) = self.end_of_session {
            if !self.ended && self.next_sequence_number >= end {
                self.ended = true;
                self.status.on_event(Event::EndOfSession);
            }
        }

        Ok(())
    }

    /// Ask for every message from the next expected one up to `until`.
    /// Skipped when an outstanding request already covers the range.
    async fn request(&mut self, session: Session, until: u64) -> Result<(), SessionError> {
        let now = Instant::now();
        let stale = self
            .last_request
            .map_or(true, |at| now.duration_since(at) >= self.request_timeout);
        if until <= self.requested_until && !stale {
            return Ok(());
        }

        self.requested_until = self.requested_until.max(until);
        let missing = self.requested_until - self.next_sequence_number;
        let requested_count = missing.min(u64::from(MAX_REQUEST_COUNT)) as u16;

        let request = RequestPacket {
            session,
            sequence_number: self.next_sequence_number,
            requested_count,
        };
        request.encode(&mut self.tx_buf);
        self.request_socket
            .send_to(&self.tx_buf, self.request_address)
            .await?;
        self.tx_buf.clear();

        self.last_request = Some(now);
        self.metrics.recovery_request_sent();
        self.status.on_event(Event::Request {
            sequence_number: request.sequence_number,
            message_count: requested_count,
        });

        Ok(())
    }

    fn transition(&mut self, next: ClientState) {
        if self.state != next {
            self.state = next;
            self.status.on_event(Event::State(next));
        }
    }
}
