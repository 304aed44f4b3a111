//! mdrec-recorder: market data session recorder runtime
//!
//! Captures every application message delivered by a SoupBinTCP or
//! MoldUDP64 session and appends it, verbatim, to a BinaryFILE.

pub mod error;
pub mod liveness;
pub mod metrics;
pub mod moldudp64;
pub mod runner;
pub mod shutdown;
pub mod soupbintcp;
pub mod status;
pub mod traits;
pub mod transport;
pub mod writer;

#[cfg(test)]
mod test_helpers;

pub use error::{ConnectorError, SessionError, WriterError};
pub use liveness::Liveness;
pub use metrics::SessionMetrics;
pub use runner::Runner;
pub use status::RecorderStatus;
pub use traits::{StatusListener, Writer};
pub use transport::Session;
pub use writer::{BinaryFileReader, BinaryFileWriter};
