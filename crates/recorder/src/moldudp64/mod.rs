//! MoldUDP64 client session
//!
//! Multicast downstream packets carrying batches of sequenced messages,
//! with a unicast request channel for retransmission of missed ones.

pub mod client;
pub mod packets;

pub use client::{ClientState, Event, MoldUdp64Client};
pub use packets::{DownstreamPacket, RequestPacket};
