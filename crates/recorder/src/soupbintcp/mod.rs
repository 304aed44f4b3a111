//! SoupBinTCP 3.0 client session
//!
//! Connection-oriented transport with login, heartbeats in both directions
//! and strictly ordered sequenced data.

pub mod client;
pub mod packets;

pub use client::{Event, Receive, SoupBinTcpClient};
pub use packets::{LoginAccepted, LoginRequest, RejectReason};
