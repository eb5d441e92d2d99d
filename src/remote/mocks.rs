// Mock implementations for testing - scripted responses, no side effects.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;

use crate::events::{EventSink, SessionEvent};
use crate::remote::errors::{EmissionError, ErrorCode, StockServiceError};
use crate::remote::traits::{DocumentEmitter, RemoteStockService};
use crate::remote::types::{
    DocumentRef, FinalizeReceipt, FinalizeRequest, LocationCheck, ReleaseSummary, RemovalReceipt,
    RemoteSessionStatus, ScannedItem, SessionId, VersionSnapshot,
};

/// Every call the mock store received, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum StockCommand {
    ValidateLocation { code: String },
    ScanItem { code: String, bin_code: String },
    ListItems,
    DecrementItem { sku: String, bin_code: String },
    RemoveItem { sku: String, bin_code: String },
    ReleaseReservation,
    ReadSessionVersion,
    Finalize { expected_version: u64 },
    CancelSession,
}

/// Scripted mock of the remote inventory store. Responses are queued per
/// operation; when a queue is empty a benign default is returned so tests
/// only script the calls they care about.
#[derive(Default)]
pub struct MockStockService {
    locations: Mutex<HashMap<String, LocationCheck>>,
    scan_responses: Mutex<VecDeque<Result<ScannedItem, StockServiceError>>>,
    listed_items: Mutex<Vec<ScannedItem>>,
    decrement_responses: Mutex<VecDeque<Result<(), StockServiceError>>>,
    removal_responses: Mutex<VecDeque<Result<RemovalReceipt, StockServiceError>>>,
    release_responses: Mutex<VecDeque<Result<ReleaseSummary, StockServiceError>>>,
    version_responses: Mutex<VecDeque<Result<VersionSnapshot, StockServiceError>>>,
    finalize_responses: Mutex<VecDeque<Result<FinalizeReceipt, StockServiceError>>>,
    cancel_responses: Mutex<VecDeque<Result<(), StockServiceError>>>,
    executed: Mutex<Vec<StockCommand>>,
}

impl MockStockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_location(&self, code: &str, check: LocationCheck) {
        self.locations.lock().unwrap().insert(code.to_string(), check);
    }

    pub fn push_scan_response(&self, response: Result<ScannedItem, StockServiceError>) {
        self.scan_responses.lock().unwrap().push_back(response);
    }

    pub fn set_listed_items(&self, items: Vec<ScannedItem>) {
        *self.listed_items.lock().unwrap() = items;
    }

    pub fn push_decrement_response(&self, response: Result<(), StockServiceError>) {
        self.decrement_responses.lock().unwrap().push_back(response);
    }

    pub fn push_removal_response(&self, response: Result<RemovalReceipt, StockServiceError>) {
        self.removal_responses.lock().unwrap().push_back(response);
    }

    pub fn push_release_response(&self, response: Result<ReleaseSummary, StockServiceError>) {
        self.release_responses.lock().unwrap().push_back(response);
    }

    pub fn push_version_response(&self, response: Result<VersionSnapshot, StockServiceError>) {
        self.version_responses.lock().unwrap().push_back(response);
    }

    pub fn push_finalize_response(&self, response: Result<FinalizeReceipt, StockServiceError>) {
        self.finalize_responses.lock().unwrap().push_back(response);
    }

    pub fn push_cancel_response(&self, response: Result<(), StockServiceError>) {
        self.cancel_responses.lock().unwrap().push_back(response);
    }

    pub fn executed_commands(&self) -> Vec<StockCommand> {
        self.executed.lock().unwrap().clone()
    }

    pub fn count_commands(&self, predicate: impl Fn(&StockCommand) -> bool) -> usize {
        self.executed.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    fn record(&self, command: StockCommand) {
        self.executed.lock().unwrap().push(command);
    }
}

/// Convenience constructor for a canonical server item in tests.
pub fn server_item(sku: &str, bin_code: &str, quantity: u32) -> ScannedItem {
    ScannedItem {
        sku: sku.to_string(),
        bin_code: bin_code.to_string(),
        quantity,
        product_name: format!("Product {sku}"),
        variant: None,
        scanned_at: Utc::now(),
        stock_reference_id: format!("stock-{sku}-{bin_code}"),
    }
}

#[async_trait]
impl RemoteStockService for MockStockService {
    async fn validate_location(&self, code: &str) -> Result<LocationCheck, StockServiceError> {
        self.record(StockCommand::ValidateLocation {
            code: code.to_string(),
        });
        Ok(self
            .locations
            .lock()
            .unwrap()
            .get(code)
            .cloned()
            .unwrap_or(LocationCheck {
                exists: true,
                is_frozen: false,
                message: None,
            }))
    }

    async fn scan_item(
        &self,
        _session: &SessionId,
        code: &str,
        bin_code: &str,
    ) -> Result<ScannedItem, StockServiceError> {
        self.record(StockCommand::ScanItem {
            code: code.to_string(),
            bin_code: bin_code.to_string(),
        });
        match self.scan_responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(server_item(code, bin_code, 1)),
        }
    }

    async fn list_items(
        &self,
        _session: &SessionId,
    ) -> Result<Vec<ScannedItem>, StockServiceError> {
        self.record(StockCommand::ListItems);
        Ok(self.listed_items.lock().unwrap().clone())
    }

    async fn decrement_item(
        &self,
        _session: &SessionId,
        sku: &str,
        bin_code: &str,
    ) -> Result<(), StockServiceError> {
        self.record(StockCommand::DecrementItem {
            sku: sku.to_string(),
            bin_code: bin_code.to_string(),
        });
        self.decrement_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }

    async fn remove_item(
        &self,
        _session: &SessionId,
        sku: &str,
        bin_code: &str,
    ) -> Result<RemovalReceipt, StockServiceError> {
        self.record(StockCommand::RemoveItem {
            sku: sku.to_string(),
            bin_code: bin_code.to_string(),
        });
        self.removal_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(RemovalReceipt {
                released_quantity: 1,
            }))
    }

    async fn release_reservation(
        &self,
        _session: &SessionId,
    ) -> Result<ReleaseSummary, StockServiceError> {
        self.record(StockCommand::ReleaseReservation);
        self.release_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(ReleaseSummary { items_released: 0 }))
    }

    async fn read_session_version(
        &self,
        _session: &SessionId,
    ) -> Result<VersionSnapshot, StockServiceError> {
        self.record(StockCommand::ReadSessionVersion);
        self.version_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(VersionSnapshot {
                version: 1,
                status: RemoteSessionStatus::Active,
            }))
    }

    async fn finalize(
        &self,
        _session: &SessionId,
        expected_version: u64,
        _request: &FinalizeRequest,
    ) -> Result<FinalizeReceipt, StockServiceError> {
        self.record(StockCommand::Finalize { expected_version });
        self.finalize_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(FinalizeReceipt {
                version: expected_version + 1,
                status: RemoteSessionStatus::Completed,
            }))
    }

    async fn cancel_session(&self, _session: &SessionId) -> Result<(), StockServiceError> {
        self.record(StockCommand::CancelSession);
        self.cancel_responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

/// Scripted mock of the invoicing backend.
#[derive(Default)]
pub struct MockDocumentEmitter {
    responses: Mutex<VecDeque<Result<DocumentRef, EmissionError>>>,
    emissions: Mutex<Vec<(SessionId, u64)>>,
}

impl MockDocumentEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_response(&self, response: Result<DocumentRef, EmissionError>) {
        self.responses.lock().unwrap().push_back(response);
    }

    pub fn emission_count(&self) -> usize {
        self.emissions.lock().unwrap().len()
    }
}

#[async_trait]
impl DocumentEmitter for MockDocumentEmitter {
    async fn emit(
        &self,
        session: &SessionId,
        receipt: &FinalizeReceipt,
        _request: &FinalizeRequest,
    ) -> Result<DocumentRef, EmissionError> {
        self.emissions
            .lock()
            .unwrap()
            .push((session.clone(), receipt.version));
        match self.responses.lock().unwrap().pop_front() {
            Some(response) => response,
            None => Ok(DocumentRef {
                document_id: format!("doc-{session}"),
                folio: None,
            }),
        }
    }
}

/// Event sink that records everything for assertions.
#[derive(Default)]
pub struct RecordingEventSink {
    events: Mutex<Vec<(SessionId, SessionEvent)>>,
}

impl RecordingEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<(SessionId, SessionEvent)> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&SessionEvent) -> bool) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, e)| predicate(e))
            .count()
    }
}

impl EventSink for RecordingEventSink {
    fn log_event(&self, session: &SessionId, event: &SessionEvent) {
        self.events
            .lock()
            .unwrap()
            .push((session.clone(), event.clone()));
    }
}

/// Error constructor shorthands used across tests.
pub fn service_error(code: ErrorCode, message: &str) -> StockServiceError {
    StockServiceError::new(code, message)
}
