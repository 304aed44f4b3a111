//! Maps transport lifecycle events onto the liveness flag.

use mdrec_metadata::TransportKind;
use tracing::{debug, error, info, trace, warn};

use crate::liveness::Liveness;
use crate::metrics::SessionMetrics;
use crate::moldudp64;
use crate::soupbintcp;
use crate::traits::StatusListener;

/// Status listener shared by both transports. Every event either does
/// nothing beyond logging or stops the recorder.
#[derive(Debug, Clone)]
pub struct RecorderStatus {
    liveness: Liveness,
    metrics: SessionMetrics,
}

impl RecorderStatus {
    pub fn new(liveness: Liveness, transport: TransportKind) -> Self {
        Self {
            liveness,
            metrics: SessionMetrics::new(transport.to_string()),
        }
    }

    fn stop(&self, event: &str) {
        self.metrics.lifecycle_event(event);
        if self.liveness.stop() {
            info!(event, "Stopping recorder");
        }
    }
}

impl StatusListener<soupbintcp::Event> for RecorderStatus {
    fn on_event(&mut self, event: soupbintcp::Event) {
        match event {
            soupbintcp::Event::LoginAccepted(accepted) => {
                info!(
                    session = %accepted.session,
                    sequence_number = accepted.sequence_number,
                    "Login accepted"
                );
                self.metrics.lifecycle_event("login_accepted");
            }
            soupbintcp::Event::LoginRejected(reason) => {
                error!(reason = ?reason, code = %(reason.code() as char), "Login rejected");
                self.stop("login_rejected");
            }
            soupbintcp::Event::HeartbeatTimeout => {
                warn!("Server heartbeat timeout");
                self.stop("heartbeat_timeout");
            }
            soupbintcp::Event::EndOfSession => {
                info!("End of session");
                self.stop("end_of_session");
            }
        }
    }
}

impl StatusListener<moldudp64::Event> for RecorderStatus {
    fn on_event(&mut self, event: moldudp64::Event) {
        match event {
            moldudp64::Event::State(state) => {
                debug!(state = ?state, "Session state changed");
            }
            moldudp64::Event::Downstream {
                sequence_number,
                message_count,
            } => {
                trace!(sequence_number, message_count, "Downstream packet");
            }
            moldudp64::Event::Request {
                sequence_number,
                message_count,
            } => {
                debug!(sequence_number, message_count, "Requested retransmission");
            }
            moldudp64::Event::EndOfSession => {
                info!("End of session");
                self.stop("end_of_session");
            }
        }
    }
}
