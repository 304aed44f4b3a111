//! MoldUDP64 packet layout
//!
//! Downstream: session (10), sequence number (u64), message count (u16),
//! then `count` message blocks of a u16 length and the message bytes.
//! Request: session (10), sequence number (u64), requested count (u16).
//! All integers are big-endian.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::SessionError;

pub const SESSION_LEN: usize = 10;
pub const HEADER_LEN: usize = SESSION_LEN + 8 + 2;
pub const REQUEST_LEN: usize = HEADER_LEN;

/// Message count of a heartbeat packet
pub const HEARTBEAT: u16 = 0;
/// Message count of an end-of-session packet
pub const END_OF_SESSION: u16 = 0xFFFF;
/// Largest message count a request may ask for
pub const MAX_REQUEST_COUNT: u16 = 0xFFFE;

pub type Session = [u8; SESSION_LEN];

/// Borrowed view of one downstream packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownstreamPacket<'a> {
    pub session: Session,
    pub sequence_number: u64,
    pub message_count: u16,
    body: &'a [u8],
}

impl<'a> DownstreamPacket<'a> {
    pub fn decode(datagram: &'a [u8]) -> Result<Self, SessionError> {
        if datagram.len() < HEADER_LEN {
            return Err(SessionError::Protocol(format!(
                "downstream packet too short: {} bytes",
                datagram.len()
            )));
        }

        let mut header = &datagram[..HEADER_LEN];
        let mut session = [0u8; SESSION_LEN];
        header.copy_to_slice(&mut session);

        let sequence_number = header.get_u64();
        let message_count = header.get_u16();
        if message_count != END_OF_SESSION
            && sequence_number.checked_add(u64::from(message_count)).is_none()
        {
            return Err(SessionError::Protocol(format!(
                "sequence number {} with {} messages overflows",
                sequence_number, message_count
            )));
        }

        Ok(Self {
            session,
            sequence_number,
            message_count,
            body: &datagram[HEADER_LEN..],
        })
    }

    pub fn is_heartbeat(&self) -> bool {
        self.message_count == HEARTBEAT
    }

    pub fn is_end_of_session(&self) -> bool {
        self.message_count == END_OF_SESSION
    }

    /// Sequence number following the last message in this packet
    pub fn next_sequence_number(&self) -> u64 {
        if self.is_end_of_session() {
            self.sequence_number
        } else {
            self.sequence_number
                .saturating_add(u64::from(self.message_count))
        }
    }

    /// Iterate the message blocks; a block overrunning the datagram is an error.
    pub fn messages(&self) -> Messages<'a> {
        let remaining = if self.is_end_of_session() {
            0
        } else {
            self.message_count
        };
        Messages {
            body: self.body,
            remaining,
        }
    }

    pub fn encode(
        buf: &mut BytesMut,
        session: &Session,
        sequence_number: u64,
        messages: &[&[u8]],
    ) {
        buf.put_slice(session);
        buf.put_u64(sequence_number);
        buf.put_u16(messages.len() as u16);
        for message in messages {
            buf.put_u16(message.len() as u16);
            buf.put_slice(message);
        }
    }
}

pub struct Messages<'a> {
    body: &'a [u8],
    remaining: u16,
}

impl<'a> Iterator for Messages<'a> {
    type Item = Result<&'a [u8], SessionError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;

        if self.body.len() < 2 {
            self.remaining = 0;
            return Some(Err(SessionError::Protocol(
                "truncated message length".to_string(),
            )));
        }
        let len = u16::from_be_bytes([self.body[0], self.body[1]]) as usize;
        if self.body.len() < 2 + len {
            self.remaining = 0;
            return Some(Err(SessionError::Protocol(format!(
                "message block of {} bytes overruns packet",
                len
            ))));
        }

        let message = &self.body[2..2 + len];
        self.body = &self.body[2 + len..];
        Some(Ok(message))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestPacket {
    pub session: Session,
    pub sequence_number: u64,
    pub requested_count: u16,
}

impl RequestPacket {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(REQUEST_LEN);
        buf.put_slice(&self.session);
        buf.put_u64(self.sequence_number);
        buf.put_u16(self.requested_count);
    }

    pub fn decode(datagram: &[u8]) -> Result<Self, SessionError> {
        if datagram.len() < REQUEST_LEN {
            return Err(SessionError::Protocol(format!(
                "request packet too short: {} bytes",
                datagram.len()
            )));
        }

        let mut buf = &datagram[..REQUEST_LEN];
        let mut session = [0u8; SESSION_LEN];
        buf.copy_to_slice(&mut session);

        Ok(Self {
            session,
            sequence_number: buf.get_u64(),
            requested_count: buf.get_u16(),
        })
    }
}

/// Session name as printable text
pub fn session_name(session: &Session) -> String {
    String::from_utf8_lossy(session).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    const SESSION: Session = *b"SESSION001";

    #[test]
    fn test_decode_downstream() {
        let mut buf = BytesMut::new();
        DownstreamPacket::encode(&mut buf, &SESSION, 7, &[b"abc", b"", b"de"]);

        let packet = DownstreamPacket::decode(&buf).unwrap();
        assert_eq!(packet.session, SESSION);
        assert_eq!(packet.sequence_number, 7);
        assert_eq!(packet.message_count, 3);
        assert_eq!(packet.next_sequence_number(), 10);

        let messages: Vec<&[u8]> = packet.messages().collect::<Result<_, _>>().unwrap();
        assert_eq!(messages, vec![&b"abc"[..], &b""[..], &b"de"[..]]);
    }

    #[test]
    fn test_heartbeat_and_end_of_session() {
        let mut buf = BytesMut::new();
        DownstreamPacket::encode(&mut buf, &SESSION, 5, &[]);
        let heartbeat = DownstreamPacket::decode(&buf).unwrap();
        assert!(heartbeat.is_heartbeat());
        assert_eq!(heartbeat.messages().count(), 0);

        let mut buf = BytesMut::new();
        buf.put_slice(&SESSION);
        buf.put_u64(5);
        buf.put_u16(END_OF_SESSION);
        let end = DownstreamPacket::decode(&buf).unwrap();
        assert!(end.is_end_of_session());
        assert_eq!(end.next_sequence_number(), 5);
        assert_eq!(end.messages().count(), 0);
    }

    #[test]
    fn test_truncated_packets() {
        assert!(DownstreamPacket::decode(&[0u8; HEADER_LEN - 1]).is_err());

        let mut buf = BytesMut::new();
        DownstreamPacket::encode(&mut buf, &SESSION, 1, &[b"abcdef"]);
        buf.truncate(buf.len() - 2);

        let packet = DownstreamPacket::decode(&buf).unwrap();
        let results: Vec<_> = packet.messages().collect();
        assert_eq!(results.len(), 1);
        assert!(results[0].is_err());
    }

    #[test]
    fn test_sequence_overflow_rejected() {
        let mut buf = BytesMut::new();
        DownstreamPacket::encode(&mut buf, &SESSION, u64::MAX, &[b"x", b"y"]);
        assert!(matches!(
            DownstreamPacket::decode(&buf),
            Err(SessionError::Protocol(_))
        ));

        // The last representable sequence number still fits
        let mut buf = BytesMut::new();
        DownstreamPacket::encode(&mut buf, &SESSION, u64::MAX - 1, &[b"x"]);
        let packet = DownstreamPacket::decode(&buf).unwrap();
        assert_eq!(packet.next_sequence_number(), u64::MAX);

        // End of session carries no messages, so any sequence number is valid
        let mut buf = BytesMut::new();
        buf.put_slice(&SESSION);
        buf.put_u64(u64::MAX);
        buf.put_u16(END_OF_SESSION);
        assert!(DownstreamPacket::decode(&buf).unwrap().is_end_of_session());
    }

    #[test]
    fn test_request_layout() {
        let mut buf = BytesMut::new();
        RequestPacket {
            session: SESSION,
            sequence_number: 3,
            requested_count: 2,
        }
        .encode(&mut buf);

        assert_eq!(buf.len(), REQUEST_LEN);
        assert_eq!(&buf[..10], b"SESSION001");
        assert_eq!(&buf[10..18], &3u64.to_be_bytes());
        assert_eq!(&buf[18..20], &2u16.to_be_bytes());
        assert_eq!(RequestPacket::decode(&buf).unwrap().requested_count, 2);
    }

    #[test]
    fn test_session_name() {
        assert_eq!(session_name(b"ABC       "), "ABC");
    }
}
