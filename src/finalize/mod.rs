pub mod backoff;
pub mod coordinator;

pub use backoff::{backoff_delay, RetryConfig};
pub use coordinator::{
    FinalizationCoordinator, FinalizeError, FinalizeOutcome, DEFAULT_STALE_FINALIZE_AFTER,
};
