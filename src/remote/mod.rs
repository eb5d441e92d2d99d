// Remote collaborator contracts: the inventory store, the invoicing backend,
// and the error taxonomy both are described by.

pub mod errors;
pub mod mocks;
pub mod traits;
pub mod types;

pub use errors::{EmissionError, ErrorCode, ErrorKind, StockServiceError};
pub use traits::{DocumentEmitter, RemoteStockService};
pub use types::{
    DocumentRef, DocumentType, FinalizeReceipt, FinalizeRequest, ItemKey, LocationCheck,
    ReleaseSummary, RemovalReceipt, RemoteSessionStatus, ScannedItem, SessionId, VersionSnapshot,
};
