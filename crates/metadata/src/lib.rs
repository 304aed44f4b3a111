//! mdrec-metadata: recorder configuration
//!
//! Loads the YAML configuration file and resolves it into exactly one
//! transport session configuration.

pub mod config;
pub mod error;
pub mod session;

pub use config::{RecorderConfig, SessionSection};
pub use error::MetadataError;
pub use session::{
    MoldUdp64Config, MulticastInterface, SessionConfig, SoupBinTcpConfig, TransportKind,
};
