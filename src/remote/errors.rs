// Error taxonomy for the remote inventory store. Classification drives the
// propagation policy: validation errors surface to the operator, session-fatal
// codes force a reset, concurrency and transport errors are retried at the
// finalize layer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Wire-level error codes returned by the remote stock service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation
    LocationNotFound,
    LocationFrozen,
    ProductNotFound,
    AlreadyVerified,
    InvalidState,
    OperationInFlight,

    // Stock conflict
    InsufficientStock,
    NotAvailable,
    StockRaceCondition,
    StockLocked,

    // Session-fatal
    SessionInvalid,
    SessionClosed,
    SessionPermission,
    Unauthorized,

    // Concurrency
    VersionMismatch,
    LockNotAvailable,
    SerializationFailure,
    BeingProcessed,

    // Transport
    Timeout,
    Transport,
}

/// Propagation category for an [`ErrorCode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Surfaced to the operator; session state unaffected.
    Validation,
    /// Surfaced at the scan layer; the operator chooses a different action.
    StockConflict,
    /// Forces a full session reset; never retried.
    SessionFatal,
    /// Retried with backoff by the finalization coordinator.
    Concurrency,
    /// Retryable for idempotent reads; finalize re-reads status first.
    Transport,
}

impl ErrorCode {
    pub fn kind(&self) -> ErrorKind {
        use ErrorCode::*;
        match self {
            LocationNotFound | LocationFrozen | ProductNotFound | AlreadyVerified
            | InvalidState | OperationInFlight => ErrorKind::Validation,
            InsufficientStock | NotAvailable | StockRaceCondition | StockLocked => {
                ErrorKind::StockConflict
            }
            SessionInvalid | SessionClosed | SessionPermission | Unauthorized => {
                ErrorKind::SessionFatal
            }
            VersionMismatch | LockNotAvailable | SerializationFailure | BeingProcessed => {
                ErrorKind::Concurrency
            }
            Timeout | Transport => ErrorKind::Transport,
        }
    }

    pub fn is_session_fatal(&self) -> bool {
        self.kind() == ErrorKind::SessionFatal
    }

    /// Whether the finalization coordinator may retry after this code.
    /// Stock conflicts count only when they manifest as a lock or race on the
    /// ledger; a plain shortage will not resolve by waiting.
    pub fn is_retryable_for_finalize(&self) -> bool {
        use ErrorCode::*;
        matches!(
            self,
            VersionMismatch
                | LockNotAvailable
                | SerializationFailure
                | BeingProcessed
                | Timeout
                | Transport
                | StockLocked
                | StockRaceCondition
        )
    }

    /// Wire name, as the backend spells it.
    pub fn wire_name(&self) -> &'static str {
        use ErrorCode::*;
        match self {
            LocationNotFound => "LOCATION_NOT_FOUND",
            LocationFrozen => "LOCATION_FROZEN",
            ProductNotFound => "PRODUCT_NOT_FOUND",
            AlreadyVerified => "ALREADY_VERIFIED",
            InvalidState => "INVALID_STATE",
            OperationInFlight => "OPERATION_IN_FLIGHT",
            InsufficientStock => "INSUFFICIENT_STOCK",
            NotAvailable => "NOT_AVAILABLE",
            StockRaceCondition => "STOCK_RACE_CONDITION",
            StockLocked => "STOCK_LOCKED",
            SessionInvalid => "SESSION_INVALID",
            SessionClosed => "SESSION_CLOSED",
            SessionPermission => "SESSION_PERMISSION",
            Unauthorized => "UNAUTHORIZED",
            VersionMismatch => "VERSION_MISMATCH",
            LockNotAvailable => "LOCK_NOT_AVAILABLE",
            SerializationFailure => "SERIALIZATION_FAILURE",
            BeingProcessed => "BEING_PROCESSED",
            Timeout => "TIMEOUT",
            Transport => "TRANSPORT",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Error returned by any [`crate::remote::RemoteStockService`] operation.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message} ({code})")]
pub struct StockServiceError {
    pub code: ErrorCode,
    pub message: String,
}

impl StockServiceError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }
}

/// Error from the document emission collaborator (invoicing side).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EmissionError {
    #[error("invoicing backend rejected document: {0}")]
    Rejected(String),
    #[error("invoicing backend unreachable: {0}")]
    Unreachable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_fatal_codes_are_never_finalize_retryable() {
        for code in [
            ErrorCode::SessionInvalid,
            ErrorCode::SessionClosed,
            ErrorCode::SessionPermission,
            ErrorCode::Unauthorized,
        ] {
            assert!(code.is_session_fatal());
            assert!(!code.is_retryable_for_finalize());
        }
    }

    #[test]
    fn lock_and_race_conflicts_retry_at_finalize_but_shortages_do_not() {
        assert!(ErrorCode::StockLocked.is_retryable_for_finalize());
        assert!(ErrorCode::StockRaceCondition.is_retryable_for_finalize());
        assert!(!ErrorCode::InsufficientStock.is_retryable_for_finalize());
        assert!(!ErrorCode::NotAvailable.is_retryable_for_finalize());
    }

    #[test]
    fn version_mismatch_is_concurrency_kind() {
        assert_eq!(ErrorCode::VersionMismatch.kind(), ErrorKind::Concurrency);
        assert!(ErrorCode::VersionMismatch.is_retryable_for_finalize());
    }

    #[test]
    fn error_display_carries_wire_name() {
        let err = StockServiceError::new(ErrorCode::LocationFrozen, "bin A-01 is frozen");
        assert_eq!(err.to_string(), "bin A-01 is frozen (LOCATION_FROZEN)");
    }
}
