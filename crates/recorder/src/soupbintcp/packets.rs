//! SoupBinTCP 3.0 packet layout
//!
//! Every packet is a 2-byte big-endian length (covering the type byte and
//! payload), one packet type byte, then the payload.

use bytes::{Buf, BufMut, BytesMut};

use crate::error::SessionError;

pub const LENGTH_FIELD_LEN: usize = 2;

// Server to client
pub const DEBUG: u8 = b'+';
pub const LOGIN_ACCEPTED: u8 = b'A';
pub const LOGIN_REJECTED: u8 = b'J';
pub const SEQUENCED_DATA: u8 = b'S';
pub const SERVER_HEARTBEAT: u8 = b'H';
pub const END_OF_SESSION: u8 = b'Z';

// Both directions
pub const UNSEQUENCED_DATA: u8 = b'U';

// Client to server
pub const LOGIN_REQUEST: u8 = b'L';
pub const CLIENT_HEARTBEAT: u8 = b'R';

const USERNAME_LEN: usize = 6;
const PASSWORD_LEN: usize = 10;
const SESSION_LEN: usize = 10;
const SEQUENCE_NUMBER_LEN: usize = 20;

pub const LOGIN_REQUEST_LEN: usize =
    USERNAME_LEN + PASSWORD_LEN + SESSION_LEN + SEQUENCE_NUMBER_LEN;
pub const LOGIN_ACCEPTED_LEN: usize = SESSION_LEN + SEQUENCE_NUMBER_LEN;

/// One complete packet split off the receive buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub packet_type: u8,
    pub payload: BytesMut,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    /// Empty requests the current session
    pub requested_session: String,
    pub requested_sequence_number: u64,
}

impl LoginRequest {
    pub fn encode(&self, buf: &mut BytesMut) {
        buf.reserve(LENGTH_FIELD_LEN + 1 + LOGIN_REQUEST_LEN);
        buf.put_u16(1 + LOGIN_REQUEST_LEN as u16);
        buf.put_u8(LOGIN_REQUEST);
        put_alpha_right_padded(buf, &self.username, USERNAME_LEN);
        put_alpha_right_padded(buf, &self.password, PASSWORD_LEN);
        put_alpha_left_padded(buf, &self.requested_session, SESSION_LEN);
        put_alpha_left_padded(
            buf,
            &self.requested_sequence_number.to_string(),
            SEQUENCE_NUMBER_LEN,
        );
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAccepted {
    pub session: String,
    pub sequence_number: u64,
}

impl LoginAccepted {
    pub fn decode(payload: &[u8]) -> Result<Self, SessionError> {
        if payload.len() < LOGIN_ACCEPTED_LEN {
            return Err(SessionError::Protocol(format!(
                "login accepted payload too short: {} bytes",
                payload.len()
            )));
        }

        let session = alpha(&payload[..SESSION_LEN]);
        let sequence = alpha(&payload[SESSION_LEN..LOGIN_ACCEPTED_LEN]);
        let sequence_number = sequence.parse::<u64>().map_err(|_| {
            SessionError::Protocol(format!("invalid sequence number '{}'", sequence))
        })?;

        Ok(Self {
            session,
            sequence_number,
        })
    }

    pub fn encode(&self, buf: &mut BytesMut) {
        buf.put_u16(1 + LOGIN_ACCEPTED_LEN as u16);
        buf.put_u8(LOGIN_ACCEPTED);
        put_alpha_left_padded(buf, &self.session, SESSION_LEN);
        put_alpha_left_padded(buf, &self.sequence_number.to_string(), SEQUENCE_NUMBER_LEN);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotAuthorized,
    SessionNotAvailable,
    Other(u8),
}

impl RejectReason {
    pub fn decode(payload: &[u8]) -> Result<Self, SessionError> {
        match payload.first() {
            Some(b'A') => Ok(RejectReason::NotAuthorized),
            Some(b'S') => Ok(RejectReason::SessionNotAvailable),
            Some(&code) => Ok(RejectReason::Other(code)),
            None => Err(SessionError::Protocol(
                "login rejected without reason code".to_string(),
            )),
        }
    }

    pub fn code(&self) -> u8 {
        match self {
            RejectReason::NotAuthorized => b'A',
            RejectReason::SessionNotAvailable => b'S',
            RejectReason::Other(code) => *code,
        }
    }
}

/// Largest payload that fits the 16-bit length field alongside the type byte
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize - 1;

/// Encode a packet carrying only its type byte and payload.
pub fn encode_packet(buf: &mut BytesMut, packet_type: u8, payload: &[u8]) {
    debug_assert!(
        payload.len() <= MAX_PAYLOAD_LEN,
        "payload of {} bytes does not fit a packet",
        payload.len()
    );
    buf.reserve(LENGTH_FIELD_LEN + 1 + payload.len());
    buf.put_u16(1 + payload.len() as u16);
    buf.put_u8(packet_type);
    buf.put_slice(payload);
}

/// Split the next complete packet off the front of `buf`.
/// Returns `Ok(None)` when more bytes are needed.
pub fn decode_packet(buf: &mut BytesMut) -> Result<Option<Packet>, SessionError> {
    if buf.len() < LENGTH_FIELD_LEN {
        return Ok(None);
    }

    let len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if len == 0 {
        return Err(SessionError::Protocol("empty packet".to_string()));
    }
    if buf.len() < LENGTH_FIELD_LEN + len {
        return Ok(None);
    }

    buf.advance(LENGTH_FIELD_LEN);
    let mut payload = buf.split_to(len);
    let packet_type = payload.get_u8();

    Ok(Some(Packet {
        packet_type,
        payload,
    }))
}

fn put_alpha_right_padded(buf: &mut BytesMut, value: &str, width: usize) {
    let bytes = &value.as_bytes()[..value.len().min(width)];
    buf.put_slice(bytes);
    buf.put_bytes(b' ', width - bytes.len());
}

fn put_alpha_left_padded(buf: &mut BytesMut, value: &str, width: usize) {
    let bytes = &value.as_bytes()[..value.len().min(width)];
    buf.put_bytes(b' ', width - bytes.len());
    buf.put_slice(bytes);
}

fn alpha(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}
