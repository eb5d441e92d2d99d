// Audit event stream. The core emits to this interface and never depends on
// the outcome: log_event returns nothing actionable, so a broken telemetry
// backend cannot affect control flow.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::remote::errors::ErrorCode;
use crate::remote::types::SessionId;

/// Structured audit events emitted by the picking core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted,
    BinScanned {
        bin_code: String,
    },
    BinCleared {
        bin_code: String,
    },
    ProductScanned {
        sku: String,
        bin_code: String,
        quantity: u32,
    },
    ScanRejected {
        code: ErrorCode,
        message: String,
    },
    ItemDecremented {
        sku: String,
        bin_code: String,
    },
    ItemRemoved {
        sku: String,
        bin_code: String,
        released_quantity: u32,
    },
    VerificationStarted {
        distinct_skus: usize,
    },
    VerificationScan {
        sku: String,
        verified_quantity: u32,
        total_quantity: u32,
    },
    VerificationCompleted,
    FinalizeAttemptStarted {
        attempt: u32,
        version: u64,
    },
    FinalizeRetryScheduled {
        attempt: u32,
        reason: String,
        delay_ms: u64,
    },
    FinalizeShortCircuited,
    FinalizeSucceeded {
        attempts: u32,
        version: u64,
    },
    FinalizeFailed {
        code: ErrorCode,
        attempts: u32,
    },
    CompensationIssued {
        items_released: u32,
    },
    CompensationFailed {
        message: String,
    },
    SessionCancelled,
    SessionReset {
        code: ErrorCode,
    },
}

impl SessionEvent {
    /// Short machine-readable name for log fields.
    pub fn name(&self) -> &'static str {
        match self {
            SessionEvent::SessionStarted => "session_started",
            SessionEvent::BinScanned { .. } => "bin_scanned",
            SessionEvent::BinCleared { .. } => "bin_cleared",
            SessionEvent::ProductScanned { .. } => "product_scanned",
            SessionEvent::ScanRejected { .. } => "scan_rejected",
            SessionEvent::ItemDecremented { .. } => "item_decremented",
            SessionEvent::ItemRemoved { .. } => "item_removed",
            SessionEvent::VerificationStarted { .. } => "verification_started",
            SessionEvent::VerificationScan { .. } => "verification_scan",
            SessionEvent::VerificationCompleted => "verification_completed",
            SessionEvent::FinalizeAttemptStarted { .. } => "finalize_attempt_started",
            SessionEvent::FinalizeRetryScheduled { .. } => "finalize_retry_scheduled",
            SessionEvent::FinalizeShortCircuited => "finalize_short_circuited",
            SessionEvent::FinalizeSucceeded { .. } => "finalize_succeeded",
            SessionEvent::FinalizeFailed { .. } => "finalize_failed",
            SessionEvent::CompensationIssued { .. } => "compensation_issued",
            SessionEvent::CompensationFailed { .. } => "compensation_failed",
            SessionEvent::SessionCancelled => "session_cancelled",
            SessionEvent::SessionReset { .. } => "session_reset",
        }
    }
}

/// Fire-and-forget audit sink.
pub trait EventSink: Send + Sync {
    fn log_event(&self, session: &SessionId, event: &SessionEvent);
}

/// Default sink: structured tracing events with the serialized payload as a
/// field. Serialization failures are swallowed - audit must never push back.
#[derive(Debug, Default)]
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for TracingEventSink {
    fn log_event(&self, session: &SessionId, event: &SessionEvent) {
        let details = serde_json::to_string(event).unwrap_or_else(|_| "{}".to_string());
        info!(
            session_id = %session,
            event = event.name(),
            details = %details,
            "picking event"
        );
    }
}

/// Sink that discards everything. Useful in tests that don't assert on audit.
#[derive(Debug, Default)]
pub struct NoopEventSink;

impl NoopEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for NoopEventSink {
    fn log_event(&self, _session: &SessionId, _event: &SessionEvent) {}
}
