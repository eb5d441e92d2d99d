// Picking session state machine. Owns the session aggregate, enforces legal
// transitions, and applies server-acknowledged scan results. Every operation
// that touches inventory goes through the remote store; the machine never
// computes stock quantities itself.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::events::{EventSink, SessionEvent};
use crate::finalize::coordinator::{FinalizationCoordinator, FinalizeOutcome};
use crate::remote::traits::RemoteStockService;
use crate::remote::types::{FinalizeRequest, RemovalReceipt, ScannedItem, SessionId};
use crate::session::types::{PersistedSessionMeta, Session, SessionError, SessionStatus};
use crate::verification::reconciler::{VerificationChecklist, VerificationItem};

/// Result of one verification scan.
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationProgress {
    pub item: VerificationItem,
    /// True when this scan completed verification for the whole session.
    pub session_verified: bool,
}

/// Drives a single operator's picking session against the remote store.
///
/// Scan operations serialize per session: the in-flight flag rejects any
/// RPC-backed operation entered while another is outstanding, because the
/// server applies one reservation change at a time and overlapping client
/// calls could double-count retries.
pub struct PickingSessionMachine {
    session: Session,
    checklist: Option<VerificationChecklist>,
    service: Arc<dyn RemoteStockService>,
    events: Arc<dyn EventSink>,
    op_in_flight: bool,
}

impl PickingSessionMachine {
    /// Start a fresh session waiting for the first bin scan.
    pub fn start(
        id: SessionId,
        service: Arc<dyn RemoteStockService>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        let session = Session::new(id);
        events.log_event(&session.id, &SessionEvent::SessionStarted);
        info!(session_id = %session.id, "picking session started");
        Self {
            session,
            checklist: None,
            service,
            events,
            op_in_flight: false,
        }
    }

    /// Rebuild a session from persisted metadata plus a fresh server read of
    /// scanned items. Verification progress is not persisted, so verification
    /// restarts from zero - unless the persisted status was already
    /// `VerificationCompleted`, in which case prior completion is trusted and
    /// every item is marked verified.
    pub async fn resume(
        meta: PersistedSessionMeta,
        service: Arc<dyn RemoteStockService>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, SessionError> {
        let items = service.list_items(&meta.id).await?;

        let mut session = Session::new(meta.id);
        session.started_at = meta.started_at;
        session.replace_items(items);

        let checklist = match meta.status {
            SessionStatus::VerificationCompleted => {
                session.status = SessionStatus::VerificationCompleted;
                Some(VerificationChecklist::build_fully_verified(
                    session.scanned_items().collect::<Vec<_>>(),
                ))
            }
            SessionStatus::VerificationMode => {
                session.status = SessionStatus::VerificationMode;
                Some(VerificationChecklist::build(
                    session.scanned_items().collect::<Vec<_>>(),
                ))
            }
            SessionStatus::ScanningProducts => {
                // A bin must be re-scanned if it wasn't persisted.
                match meta.current_bin {
                    Some(bin) => {
                        session.current_bin = Some(bin);
                        session.status = SessionStatus::ScanningProducts;
                    }
                    None => session.status = SessionStatus::WaitingForBin,
                }
                None
            }
            SessionStatus::WaitingForBin => {
                session.status = SessionStatus::WaitingForBin;
                None
            }
        };

        info!(
            session_id = %session.id,
            status = ?session.status,
            items = session.item_count(),
            "picking session resumed"
        );
        Ok(Self {
            session,
            checklist,
            service,
            events,
            op_in_flight: false,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn status(&self) -> SessionStatus {
        self.session.status
    }

    pub fn current_bin(&self) -> Option<&str> {
        self.session.current_bin.as_deref()
    }

    pub fn checklist(&self) -> Option<&VerificationChecklist> {
        self.checklist.as_ref()
    }

    fn begin_operation(&mut self) -> Result<(), SessionError> {
        if self.op_in_flight {
            return Err(SessionError::OperationInFlight);
        }
        self.op_in_flight = true;
        Ok(())
    }

    fn end_operation(&mut self) {
        self.op_in_flight = false;
    }

    /// Validate and enter a storage location. Only legal while waiting for a
    /// bin; an unusable location leaves the session untouched so the operator
    /// can pick another.
    pub async fn scan_bin(&mut self, code: &str) -> Result<(), SessionError> {
        self.begin_operation()?;
        let result = self.scan_bin_inner(code).await;
        self.end_operation();
        result
    }

    async fn scan_bin_inner(&mut self, code: &str) -> Result<(), SessionError> {
        if self.session.status != SessionStatus::WaitingForBin {
            return Err(SessionError::InvalidState {
                state: self.session.status,
                operation: "scan_bin",
            });
        }

        let check = self.service.validate_location(code).await?;
        if !check.exists {
            self.reject_scan(SessionError::LocationNotFound {
                code: code.to_string(),
            })?;
        }
        if check.is_frozen {
            self.reject_scan(SessionError::LocationFrozen {
                code: code.to_string(),
            })?;
        }

        self.session.current_bin = Some(code.to_string());
        self.session.status = SessionStatus::ScanningProducts;
        self.events.log_event(
            &self.session.id,
            &SessionEvent::BinScanned {
                bin_code: code.to_string(),
            },
        );
        info!(session_id = %self.session.id, bin = code, "entered bin");
        Ok(())
    }

    /// Scan one product in the current bin. The server assigns the new
    /// quantity (created or incremented); the returned canonical item
    /// replaces the local record keyed by `(sku, bin)`.
    pub async fn scan_product(&mut self, code: &str) -> Result<ScannedItem, SessionError> {
        self.begin_operation()?;
        let result = self.scan_product_inner(code).await;
        self.end_operation();
        result
    }

    async fn scan_product_inner(&mut self, code: &str) -> Result<ScannedItem, SessionError> {
        if self.session.status != SessionStatus::ScanningProducts {
            return Err(SessionError::InvalidState {
                state: self.session.status,
                operation: "scan_product",
            });
        }
        let bin = match self.session.current_bin.clone() {
            Some(bin) => bin,
            None => {
                return Err(SessionError::InvalidState {
                    state: self.session.status,
                    operation: "scan_product",
                })
            }
        };

        match self.service.scan_item(&self.session.id, code, &bin).await {
            Ok(item) => {
                debug!(
                    session_id = %self.session.id,
                    sku = %item.sku,
                    bin = %bin,
                    quantity = item.quantity,
                    "product scan acknowledged"
                );
                self.events.log_event(
                    &self.session.id,
                    &SessionEvent::ProductScanned {
                        sku: item.sku.clone(),
                        bin_code: item.bin_code.clone(),
                        quantity: item.quantity,
                    },
                );
                self.session.upsert_item(item.clone());
                Ok(item)
            }
            Err(err) if err.code.is_session_fatal() => {
                warn!(
                    session_id = %self.session.id,
                    code = %err.code,
                    "fatal backend error, resetting session"
                );
                self.events.log_event(
                    &self.session.id,
                    &SessionEvent::SessionReset { code: err.code },
                );
                self.reset_after_fatal().await;
                Err(SessionError::SessionFatal {
                    code: err.code,
                    message: err.message,
                })
            }
            Err(err) => {
                self.events.log_event(
                    &self.session.id,
                    &SessionEvent::ScanRejected {
                        code: err.code,
                        message: err.message.clone(),
                    },
                );
                Err(err.into())
            }
        }
    }

    /// Leave the current bin and go back to waiting for a bin scan. Already
    /// scanned items are untouched.
    pub fn change_current_bin(&mut self) -> Result<(), SessionError> {
        if self.op_in_flight {
            return Err(SessionError::OperationInFlight);
        }
        if self.session.status != SessionStatus::ScanningProducts {
            return Err(SessionError::InvalidState {
                state: self.session.status,
                operation: "change_current_bin",
            });
        }
        if let Some(bin) = self.session.current_bin.take() {
            self.events
                .log_event(&self.session.id, &SessionEvent::BinCleared { bin_code: bin });
        }
        self.session.status = SessionStatus::WaitingForBin;
        Ok(())
    }

    /// Decrement one unit of a scanned item. The server recomputes the
    /// reservation, so the local list is resynchronized from a fresh read
    /// rather than decremented locally.
    pub async fn decrease_item_quantity(
        &mut self,
        sku: &str,
        bin_code: &str,
    ) -> Result<(), SessionError> {
        self.begin_operation()?;
        let result = self.decrease_item_quantity_inner(sku, bin_code).await;
        self.end_operation();
        result
    }

    async fn decrease_item_quantity_inner(
        &mut self,
        sku: &str,
        bin_code: &str,
    ) -> Result<(), SessionError> {
        self.require_pre_verification("decrease_item_quantity")?;
        self.require_known_item(sku, bin_code)?;

        self.service
            .decrement_item(&self.session.id, sku, bin_code)
            .await?;
        let items = self.service.list_items(&self.session.id).await?;
        self.session.replace_items(items);
        self.events.log_event(
            &self.session.id,
            &SessionEvent::ItemDecremented {
                sku: sku.to_string(),
                bin_code: bin_code.to_string(),
            },
        );
        Ok(())
    }

    /// Remove a scanned item entirely, releasing its reservation.
    pub async fn remove_scanned_item(
        &mut self,
        sku: &str,
        bin_code: &str,
    ) -> Result<RemovalReceipt, SessionError> {
        self.begin_operation()?;
        let result = self.remove_scanned_item_inner(sku, bin_code).await;
        self.end_operation();
        result
    }

    async fn remove_scanned_item_inner(
        &mut self,
        sku: &str,
        bin_code: &str,
    ) -> Result<RemovalReceipt, SessionError> {
        self.require_pre_verification("remove_scanned_item")?;
        self.require_known_item(sku, bin_code)?;

        let receipt = self
            .service
            .remove_item(&self.session.id, sku, bin_code)
            .await?;
        self.session.remove_item(sku, bin_code);
        self.events.log_event(
            &self.session.id,
            &SessionEvent::ItemRemoved {
                sku: sku.to_string(),
                bin_code: bin_code.to_string(),
                released_quantity: receipt.released_quantity,
            },
        );
        Ok(receipt)
    }

    /// Build the verification checklist from all scanned items and enter
    /// verification mode. Requires at least one scanned item. The built
    /// checklist is available through [`Self::checklist`].
    pub fn start_verification(&mut self) -> Result<(), SessionError> {
        if self.op_in_flight {
            return Err(SessionError::OperationInFlight);
        }
        match self.session.status {
            SessionStatus::WaitingForBin | SessionStatus::ScanningProducts => {}
            state => {
                return Err(SessionError::InvalidState {
                    state,
                    operation: "start_verification",
                })
            }
        }
        if self.session.is_empty() {
            return Err(SessionError::NothingToVerify);
        }

        let checklist = VerificationChecklist::build(self.session.scanned_items());
        self.events.log_event(
            &self.session.id,
            &SessionEvent::VerificationStarted {
                distinct_skus: checklist.len(),
            },
        );
        info!(
            session_id = %self.session.id,
            distinct_skus = checklist.len(),
            "verification started"
        );
        self.session.status = SessionStatus::VerificationMode;
        self.checklist = Some(checklist);
        Ok(())
    }

    /// Apply one verification scan. Pure local reconciliation - no RPC.
    /// Completing the last item transitions the session to
    /// `VerificationCompleted` and stamps the completion time.
    pub fn record_verification_scan(
        &mut self,
        sku: &str,
    ) -> Result<VerificationProgress, SessionError> {
        if self.op_in_flight {
            return Err(SessionError::OperationInFlight);
        }
        if self.session.status != SessionStatus::VerificationMode {
            return Err(SessionError::InvalidState {
                state: self.session.status,
                operation: "record_verification_scan",
            });
        }
        let checklist = match self.checklist.as_mut() {
            Some(checklist) => checklist,
            None => {
                return Err(SessionError::InvalidState {
                    state: self.session.status,
                    operation: "record_verification_scan",
                })
            }
        };

        match checklist.record_scan(sku) {
            Ok(item) => {
                self.events.log_event(
                    &self.session.id,
                    &SessionEvent::VerificationScan {
                        sku: item.sku.clone(),
                        verified_quantity: item.verified_quantity,
                        total_quantity: item.total_quantity,
                    },
                );
                let session_verified = checklist.all_verified();
                if session_verified {
                    self.session.status = SessionStatus::VerificationCompleted;
                    self.session.verification_completed_at = Some(Utc::now());
                    self.events
                        .log_event(&self.session.id, &SessionEvent::VerificationCompleted);
                    info!(session_id = %self.session.id, "verification completed");
                }
                Ok(VerificationProgress {
                    item,
                    session_verified,
                })
            }
            Err(err) => {
                self.events.log_event(
                    &self.session.id,
                    &SessionEvent::ScanRejected {
                        code: SessionError::Verification(err.clone()).code(),
                        message: err.to_string(),
                    },
                );
                Err(err.into())
            }
        }
    }

    /// Run the finalization protocol for this session. Only legal once
    /// verification has completed.
    pub async fn finalize(
        &mut self,
        coordinator: &FinalizationCoordinator,
        request: &FinalizeRequest,
    ) -> Result<FinalizeOutcome, SessionError> {
        self.begin_operation()?;
        let result = self.finalize_inner(coordinator, request).await;
        self.end_operation();
        result
    }

    async fn finalize_inner(
        &mut self,
        coordinator: &FinalizationCoordinator,
        request: &FinalizeRequest,
    ) -> Result<FinalizeOutcome, SessionError> {
        if self.session.status != SessionStatus::VerificationCompleted {
            return Err(SessionError::InvalidState {
                state: self.session.status,
                operation: "finalize",
            });
        }
        let outcome = coordinator.finalize_session(&self.session.id, request).await?;
        Ok(outcome)
    }

    /// Best-effort cancellation: release any server-side stock hold and reset
    /// the aggregate. The RPC failing is tolerable - the server independently
    /// garbage-collects abandoned sessions after an inactivity timeout.
    pub async fn cancel(&mut self) -> Result<(), SessionError> {
        self.begin_operation()?;
        if let Err(err) = self.service.cancel_session(&self.session.id).await {
            warn!(
                session_id = %self.session.id,
                error = %err,
                "advisory cancellation failed; server GC will reclaim the hold"
            );
        }
        self.events
            .log_event(&self.session.id, &SessionEvent::SessionCancelled);
        self.reset_local_state();
        self.end_operation();
        Ok(())
    }

    fn require_pre_verification(&self, operation: &'static str) -> Result<(), SessionError> {
        match self.session.status {
            SessionStatus::WaitingForBin | SessionStatus::ScanningProducts => Ok(()),
            state => Err(SessionError::InvalidState { state, operation }),
        }
    }

    fn require_known_item(&self, sku: &str, bin_code: &str) -> Result<(), SessionError> {
        if self.session.item(sku, bin_code).is_none() {
            return Err(SessionError::ItemNotFound {
                sku: sku.to_string(),
                bin_code: bin_code.to_string(),
            });
        }
        Ok(())
    }

    fn reject_scan(&self, err: SessionError) -> Result<(), SessionError> {
        self.events.log_event(
            &self.session.id,
            &SessionEvent::ScanRejected {
                code: err.code(),
                message: err.to_string(),
            },
        );
        Err(err)
    }

    async fn reset_after_fatal(&mut self) {
        if let Err(err) = self.service.cancel_session(&self.session.id).await {
            warn!(
                session_id = %self.session.id,
                error = %err,
                "cancel during fatal reset failed"
            );
        }
        self.reset_local_state();
    }

    fn reset_local_state(&mut self) {
        self.session.clear_items();
        self.session.current_bin = None;
        self.session.status = SessionStatus::WaitingForBin;
        self.session.verification_completed_at = None;
        self.checklist = None;
    }
}
