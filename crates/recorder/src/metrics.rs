//! Prometheus metrics for the recorder
//!
//! Counters are labelled by transport so a host running several recorders
//! against different feeds can tell them apart.

use once_cell::sync::Lazy;
use prometheus::{register_int_counter_vec, IntCounterVec};

const LABEL_TRANSPORT: &str = "transport";
const LABEL_EVENT: &str = "event";

/// Application messages handed to the sink
static MESSAGES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrec_messages_total",
        "Total application messages recorded",
        &[LABEL_TRANSPORT]
    )
    .expect("Failed to register messages_total metric")
});

/// Payload bytes handed to the sink
static BYTES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrec_bytes_total",
        "Total application message bytes recorded",
        &[LABEL_TRANSPORT]
    )
    .expect("Failed to register bytes_total metric")
});

/// Client heartbeats sent
static HEARTBEATS_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrec_heartbeats_sent_total",
        "Total client heartbeats sent",
        &[LABEL_TRANSPORT]
    )
    .expect("Failed to register heartbeats_sent_total metric")
});

/// Gap recovery requests sent
static RECOVERY_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrec_recovery_requests_total",
        "Total gap recovery requests sent",
        &[LABEL_TRANSPORT]
    )
    .expect("Failed to register recovery_requests_total metric")
});

/// Session lifecycle events by kind
static LIFECYCLE_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    register_int_counter_vec!(
        "mdrec_lifecycle_events_total",
        "Total session lifecycle events observed",
        &[LABEL_TRANSPORT, LABEL_EVENT]
    )
    .expect("Failed to register lifecycle_events_total metric")
});

/// Handle for recording metrics for one transport session
#[derive(Debug, Clone)]
pub struct SessionMetrics {
    transport: String,
}

impl SessionMetrics {
    pub fn new(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
        }
    }

    /// Record one message handed to the sink
    pub fn record_message(&self, len: usize) {
        MESSAGES_TOTAL.with_label_values(&[&self.transport]).inc();
        BYTES_TOTAL.with_label_values(&[&self.transport]).inc_by(len as u64);
    }

    pub fn heartbeat_sent(&self) {
        HEARTBEATS_SENT_TOTAL.with_label_values(&[&self.transport]).inc();
    }

    pub fn recovery_request_sent(&self) {
        RECOVERY_REQUESTS_TOTAL.with_label_values(&[&self.transport]).inc();
    }

    pub fn lifecycle_event(&self, event: &str) {
        LIFECYCLE_EVENTS_TOTAL.with_label_values(&[&self.transport, event]).inc();
    }

    pub fn messages(&self) -> u64 {
        MESSAGES_TOTAL.with_label_values(&[&self.transport]).get()
    }

    pub fn bytes(&self) -> u64 {
        BYTES_TOTAL.with_label_values(&[&self.transport]).get()
    }

    pub fn heartbeats_sent(&self) -> u64 {
        HEARTBEATS_SENT_TOTAL.with_label_values(&[&self.transport]).get()
    }

    pub fn recovery_requests_sent(&self) -> u64 {
        RECOVERY_REQUESTS_TOTAL.with_label_values(&[&self.transport]).get()
    }
}
