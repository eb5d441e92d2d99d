// Wire types for the remote inventory store contract.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, server-issued session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Composite key identifying a scanned item within a session.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub sku: String,
    pub bin_code: String,
}

impl ItemKey {
    pub fn new(sku: impl Into<String>, bin_code: impl Into<String>) -> Self {
        Self {
            sku: sku.into(),
            bin_code: bin_code.into(),
        }
    }
}

/// A picked item as acknowledged by the server. The server owns the stock
/// ledger; the client mirrors these records and never computes quantities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannedItem {
    pub sku: String,
    pub bin_code: String,
    pub quantity: u32,
    pub product_name: String,
    pub variant: Option<String>,
    pub scanned_at: DateTime<Utc>,
    /// Server-side stock-row identifier backing the reservation.
    pub stock_reference_id: String,
}

impl ScannedItem {
    pub fn key(&self) -> ItemKey {
        ItemKey::new(self.sku.clone(), self.bin_code.clone())
    }
}

/// Result of validating a storage location code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationCheck {
    pub exists: bool,
    pub is_frozen: bool,
    pub message: Option<String>,
}

/// Session status as the remote store sees it. Distinct from the client-side
/// picking status: this is the authority consulted by the finalization
/// protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RemoteSessionStatus {
    Active,
    Finalizing {
        since: DateTime<Utc>,
        last_error: Option<String>,
    },
    Completed,
    Cancelled,
}

/// Fresh read of the optimistic-concurrency token plus remote status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSnapshot {
    pub version: u64,
    pub status: RemoteSessionStatus,
}

/// Acknowledgment of a successful finalize call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeReceipt {
    pub version: u64,
    pub status: RemoteSessionStatus,
}

/// Summary returned when a session's reservations are released.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseSummary {
    pub items_released: u32,
}

/// Acknowledgment of removing a single scanned item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemovalReceipt {
    pub released_quantity: u32,
}

/// Kind of stock movement document emitted at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    InternalTransfer,
    RemissionGuide,
}

/// Payload for the finalize operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeRequest {
    pub document_type: DocumentType,
    pub destination: String,
    pub carrier: Option<String>,
    pub notes: Option<String>,
}

/// Reference to an emitted stock movement document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub document_id: String,
    pub folio: Option<String>,
}
