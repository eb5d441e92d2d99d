// Session aggregate and its error type. The aggregate mirrors the server's
// item ledger; every quantity in here came from a server acknowledgment.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::finalize::coordinator::FinalizeError;
use crate::remote::errors::{ErrorCode, StockServiceError};
use crate::remote::types::{ItemKey, ScannedItem, SessionId};
use crate::verification::reconciler::VerificationError;

/// Client-side picking status. `WaitingForBin` is both initial and
/// re-enterable: the operator may change bin mid-session without losing
/// already-scanned items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    WaitingForBin,
    ScanningProducts,
    VerificationMode,
    VerificationCompleted,
}

/// Non-derived session metadata persisted across process restarts. Scanned
/// items are deliberately absent: the server is the durable source of truth
/// and they are re-fetched on resume.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedSessionMeta {
    pub id: SessionId,
    pub current_bin: Option<String>,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
}

/// In-memory picking session owned by a single operator's client process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub current_bin: Option<String>,
    pub started_at: DateTime<Utc>,
    pub verification_completed_at: Option<DateTime<Utc>>,
    /// Mirror of the server's item ledger. Never persisted: resume re-fetches
    /// it from the server.
    #[serde(skip)]
    items: BTreeMap<ItemKey, ScannedItem>,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            status: SessionStatus::WaitingForBin,
            current_bin: None,
            started_at: Utc::now(),
            verification_completed_at: None,
            items: BTreeMap::new(),
        }
    }

    /// Replace or create the item keyed by `(sku, bin_code)` with the
    /// server's canonical record.
    pub fn upsert_item(&mut self, item: ScannedItem) {
        self.items.insert(item.key(), item);
    }

    pub fn remove_item(&mut self, sku: &str, bin_code: &str) -> Option<ScannedItem> {
        self.items.remove(&ItemKey::new(sku, bin_code))
    }

    /// Wholesale resynchronization from a server item list.
    pub fn replace_items(&mut self, items: Vec<ScannedItem>) {
        self.items = items.into_iter().map(|i| (i.key(), i)).collect();
    }

    pub fn item(&self, sku: &str, bin_code: &str) -> Option<&ScannedItem> {
        self.items.get(&ItemKey::new(sku, bin_code))
    }

    pub fn scanned_items(&self) -> impl Iterator<Item = &ScannedItem> {
        self.items.values()
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Sum of scanned quantities for one SKU across all bins.
    pub fn total_quantity_for(&self, sku: &str) -> u32 {
        self.items
            .values()
            .filter(|i| i.sku == sku)
            .map(|i| i.quantity)
            .sum()
    }

    pub fn clear_items(&mut self) {
        self.items.clear();
    }

    pub fn persisted_meta(&self) -> PersistedSessionMeta {
        PersistedSessionMeta {
            id: self.id.clone(),
            current_bin: self.current_bin.clone(),
            status: self.status,
            started_at: self.started_at,
        }
    }
}

/// Everything that can go wrong driving a picking session.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("operation {operation} not allowed while session is {state:?}")]
    InvalidState {
        state: SessionStatus,
        operation: &'static str,
    },
    #[error("another operation is already in flight for this session")]
    OperationInFlight,
    #[error("location {code} not found")]
    LocationNotFound { code: String },
    #[error("location {code} is frozen and cannot be picked from")]
    LocationFrozen { code: String },
    #[error("cannot start verification with no scanned items")]
    NothingToVerify,
    #[error("item {sku} in bin {bin_code} is not part of this session")]
    ItemNotFound { sku: String, bin_code: String },
    #[error("session reset after fatal backend error: {message} ({code})")]
    SessionFatal { code: ErrorCode, message: String },
    #[error(transparent)]
    Verification(#[from] VerificationError),
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error(transparent)]
    Service(#[from] StockServiceError),
}

impl SessionError {
    /// Wire error code for telemetry and operator messaging.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::InvalidState { .. } => ErrorCode::InvalidState,
            SessionError::OperationInFlight => ErrorCode::OperationInFlight,
            SessionError::LocationNotFound { .. } => ErrorCode::LocationNotFound,
            SessionError::LocationFrozen { .. } => ErrorCode::LocationFrozen,
            SessionError::NothingToVerify => ErrorCode::InvalidState,
            SessionError::ItemNotFound { .. } => ErrorCode::ProductNotFound,
            SessionError::SessionFatal { code, .. } => *code,
            SessionError::Verification(VerificationError::ProductNotFound { .. }) => {
                ErrorCode::ProductNotFound
            }
            SessionError::Verification(VerificationError::AlreadyVerified { .. }) => {
                ErrorCode::AlreadyVerified
            }
            SessionError::Finalize(err) => err.code(),
            SessionError::Service(err) => err.code,
        }
    }
}
