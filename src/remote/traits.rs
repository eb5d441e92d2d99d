// Collaborator interfaces - separating the remote store and the invoicing
// backend from the core so session logic can be tested without either.

use async_trait::async_trait;

use crate::remote::errors::{EmissionError, StockServiceError};
use crate::remote::types::{
    DocumentRef, FinalizeReceipt, FinalizeRequest, LocationCheck, ReleaseSummary, RemovalReceipt,
    ScannedItem, SessionId, VersionSnapshot,
};

/// Remote inventory store contract. The server implements stock reservation
/// internally; this crate only depends on the behavior documented here.
///
/// Every call is a network round-trip and every response is authoritative:
/// callers apply the returned state verbatim and never compute quantities or
/// versions locally.
#[async_trait]
pub trait RemoteStockService: Send + Sync {
    /// Check that a storage location exists and is usable.
    async fn validate_location(&self, code: &str) -> Result<LocationCheck, StockServiceError>;

    /// Reserve one unit of the scanned product in the given bin. Returns the
    /// canonical item record (newly created or incremented server-side).
    async fn scan_item(
        &self,
        session: &SessionId,
        code: &str,
        bin_code: &str,
    ) -> Result<ScannedItem, StockServiceError>;

    /// Fetch all scanned items for a session. Used to resynchronize after a
    /// server-side recompute and to rebuild state on resume.
    async fn list_items(&self, session: &SessionId) -> Result<Vec<ScannedItem>, StockServiceError>;

    /// Decrement a scanned item's quantity by one. The server recomputes the
    /// reservation; the client must re-read items afterwards.
    async fn decrement_item(
        &self,
        session: &SessionId,
        sku: &str,
        bin_code: &str,
    ) -> Result<(), StockServiceError>;

    /// Remove a scanned item entirely, releasing its reserved quantity.
    async fn remove_item(
        &self,
        session: &SessionId,
        sku: &str,
        bin_code: &str,
    ) -> Result<RemovalReceipt, StockServiceError>;

    /// Release every reservation held by the session.
    async fn release_reservation(
        &self,
        session: &SessionId,
    ) -> Result<ReleaseSummary, StockServiceError>;

    /// Read the current version token and remote status. Idempotent.
    async fn read_session_version(
        &self,
        session: &SessionId,
    ) -> Result<VersionSnapshot, StockServiceError>;

    /// Consume the session's reserved stock and mark it finalized. The
    /// `expected_version` is an optimistic-concurrency precondition checked
    /// atomically by the server.
    async fn finalize(
        &self,
        session: &SessionId,
        expected_version: u64,
        request: &FinalizeRequest,
    ) -> Result<FinalizeReceipt, StockServiceError>;

    /// Advisory cancellation. The server garbage-collects abandoned sessions
    /// independently, so failures here are tolerable.
    async fn cancel_session(&self, session: &SessionId) -> Result<(), StockServiceError>;
}

/// Invoicing collaborator that turns a finalized session into a stock
/// movement document. Called exactly once per successful finalize.
#[async_trait]
pub trait DocumentEmitter: Send + Sync {
    async fn emit(
        &self,
        session: &SessionId,
        receipt: &FinalizeReceipt,
        request: &FinalizeRequest,
    ) -> Result<DocumentRef, EmissionError>;
}
