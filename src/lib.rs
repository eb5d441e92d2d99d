// freepick - warehouse free-picking session core
// Session lifecycle, scan validation, verification reconciliation, and the
// idempotent finalization protocol against a remote inventory store.

pub mod config;
pub mod events;
pub mod finalize;
pub mod remote;
pub mod session;
pub mod telemetry;
pub mod verification;

// Re-export key types for easy access
pub use config::FreepickConfig;
pub use events::{EventSink, NoopEventSink, SessionEvent, TracingEventSink};
pub use finalize::{
    backoff_delay, FinalizationCoordinator, FinalizeError, FinalizeOutcome, RetryConfig,
};
pub use remote::{
    DocumentEmitter, DocumentRef, DocumentType, EmissionError, ErrorCode, ErrorKind,
    FinalizeReceipt, FinalizeRequest, LocationCheck, RemoteSessionStatus, RemoteStockService,
    ScannedItem, SessionId, StockServiceError, VersionSnapshot,
};
pub use session::{
    PersistedSessionMeta, PickingSessionMachine, Session, SessionError, SessionStatus,
    VerificationProgress,
};
pub use telemetry::{create_session_span, generate_correlation_id, init_telemetry};
pub use verification::{VerificationChecklist, VerificationError, VerificationItem};
