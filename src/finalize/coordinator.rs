// Finalization protocol: read the session version fresh, short-circuit if the
// server already finalized, retry transient contention with backoff, and
// release reserved stock if document emission fails after a successful
// finalize. Retry count and final state are first-class values in the result,
// not side effects of stack unwinding.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::events::{EventSink, SessionEvent};
use crate::finalize::backoff::{backoff_delay, RetryConfig};
use crate::remote::errors::{EmissionError, ErrorCode, StockServiceError};
use crate::remote::traits::{DocumentEmitter, RemoteStockService};
use crate::remote::types::{
    DocumentRef, FinalizeReceipt, FinalizeRequest, RemoteSessionStatus, SessionId,
};
use crate::telemetry::generate_correlation_id;

/// How long an in-progress finalize marker may sit before another process is
/// allowed to take over.
pub const DEFAULT_STALE_FINALIZE_AFTER: Duration = Duration::from_secs(120);

/// Typed result of a finalization run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FinalizeOutcome {
    pub attempts_needed: u32,
    pub version: u64,
    pub status: RemoteSessionStatus,
    /// True when the server had already finalized this session and the run
    /// short-circuited without side effects.
    pub already_finalized: bool,
    pub document: Option<DocumentRef>,
}

#[derive(Debug, Error)]
pub enum FinalizeError {
    #[error("session is already being finalized by another process")]
    BeingProcessed,
    #[error("session cannot be finalized from remote status {status:?}")]
    NotFinalizable { status: RemoteSessionStatus },
    #[error("finalization failed after {attempts} attempt(s): {source}")]
    RetriesExhausted {
        attempts: u32,
        source: StockServiceError,
    },
    #[error("finalization failed: {0}")]
    Service(StockServiceError),
    #[error("stock consumed but document emission failed: {source}")]
    EmissionFailed {
        source: EmissionError,
        /// Whether the compensating stock release went through.
        compensation_issued: bool,
    },
}

impl FinalizeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FinalizeError::BeingProcessed => ErrorCode::BeingProcessed,
            FinalizeError::NotFinalizable { .. } => ErrorCode::InvalidState,
            FinalizeError::RetriesExhausted { source, .. } => source.code,
            FinalizeError::Service(err) => err.code,
            FinalizeError::EmissionFailed { .. } => ErrorCode::Transport,
        }
    }
}

/// Executes the retrying, idempotent finalize-then-emit-document sequence.
pub struct FinalizationCoordinator {
    service: Arc<dyn RemoteStockService>,
    emitter: Arc<dyn DocumentEmitter>,
    events: Arc<dyn EventSink>,
    retry: RetryConfig,
    stale_finalize_after: Duration,
}

impl FinalizationCoordinator {
    pub fn new(
        service: Arc<dyn RemoteStockService>,
        emitter: Arc<dyn DocumentEmitter>,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            service,
            emitter,
            events,
            retry: RetryConfig::default(),
            stale_finalize_after: DEFAULT_STALE_FINALIZE_AFTER,
        }
    }

    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_stale_finalize_after(mut self, threshold: Duration) -> Self {
        self.stale_finalize_after = threshold;
        self
    }

    /// Run the finalization protocol for a session.
    ///
    /// Safe to call again after a client-side timeout: every attempt starts
    /// with a fresh version-and-status read, so a finalize whose server-side
    /// effect already succeeded is detected and short-circuited instead of
    /// emitting a second document.
    pub async fn finalize_session(
        &self,
        session_id: &SessionId,
        request: &FinalizeRequest,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        let correlation_id = generate_correlation_id();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            // The version precondition must be read after the previous
            // attempt's failure, never reused.
            let snapshot = match self.service.read_session_version(session_id).await {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    self.retry_or_surface(session_id, attempt, err).await?;
                    continue;
                }
            };

            match &snapshot.status {
                RemoteSessionStatus::Completed => {
                    info!(
                        session_id = %session_id,
                        correlation_id = %correlation_id,
                        "session already finalized, short-circuiting"
                    );
                    self.events
                        .log_event(session_id, &SessionEvent::FinalizeShortCircuited);
                    return Ok(FinalizeOutcome {
                        attempts_needed: attempt,
                        version: snapshot.version,
                        status: snapshot.status.clone(),
                        already_finalized: true,
                        document: None,
                    });
                }
                RemoteSessionStatus::Finalizing { since, last_error } => {
                    let age = Utc::now().signed_duration_since(*since);
                    let stale_after = chrono::Duration::milliseconds(
                        self.stale_finalize_after.as_millis() as i64,
                    );
                    if age < stale_after && last_error.is_none() {
                        self.events.log_event(
                            session_id,
                            &SessionEvent::FinalizeFailed {
                                code: ErrorCode::BeingProcessed,
                                attempts: attempt,
                            },
                        );
                        return Err(FinalizeError::BeingProcessed);
                    }
                    warn!(
                        session_id = %session_id,
                        marker_age_secs = age.num_seconds(),
                        marker_error = ?last_error,
                        "stale or errored finalize marker, taking over"
                    );
                }
                RemoteSessionStatus::Active => {}
                RemoteSessionStatus::Cancelled => {
                    self.events.log_event(
                        session_id,
                        &SessionEvent::FinalizeFailed {
                            code: ErrorCode::InvalidState,
                            attempts: attempt,
                        },
                    );
                    return Err(FinalizeError::NotFinalizable {
                        status: snapshot.status.clone(),
                    });
                }
            }

            self.events.log_event(
                session_id,
                &SessionEvent::FinalizeAttemptStarted {
                    attempt,
                    version: snapshot.version,
                },
            );
            info!(
                session_id = %session_id,
                correlation_id = %correlation_id,
                attempt,
                version = snapshot.version,
                "issuing finalize"
            );

            match self
                .service
                .finalize(session_id, snapshot.version, request)
                .await
            {
                Ok(receipt) => {
                    return self
                        .emit_document(session_id, attempt, receipt, request)
                        .await
                }
                Err(err) => {
                    self.retry_or_surface(session_id, attempt, err).await?;
                    continue;
                }
            }
        }
    }

    /// Classify an attempt failure. Returns `Ok(())` after sleeping out the
    /// backoff when a retry is allowed; otherwise surfaces the terminal error.
    async fn retry_or_surface(
        &self,
        session_id: &SessionId,
        attempt: u32,
        err: StockServiceError,
    ) -> Result<(), FinalizeError> {
        let max_attempts = self.retry.max_attempts.max(1);

        if !err.code.is_retryable_for_finalize() {
            self.events.log_event(
                session_id,
                &SessionEvent::FinalizeFailed {
                    code: err.code,
                    attempts: attempt,
                },
            );
            error!(
                session_id = %session_id,
                attempt,
                code = %err.code,
                "finalize failed with non-retryable error"
            );
            return Err(FinalizeError::Service(err));
        }

        if attempt >= max_attempts {
            self.events.log_event(
                session_id,
                &SessionEvent::FinalizeFailed {
                    code: err.code,
                    attempts: attempt,
                },
            );
            error!(
                session_id = %session_id,
                attempts = attempt,
                code = %err.code,
                "finalize retries exhausted"
            );
            return Err(FinalizeError::RetriesExhausted {
                attempts: attempt,
                source: err,
            });
        }

        let delay = backoff_delay(&self.retry, attempt);
        warn!(
            session_id = %session_id,
            attempt,
            delay_ms = delay.as_millis() as u64,
            reason = %err,
            "finalize attempt failed, retrying"
        );
        self.events.log_event(
            session_id,
            &SessionEvent::FinalizeRetryScheduled {
                attempt,
                reason: err.to_string(),
                delay_ms: delay.as_millis() as u64,
            },
        );
        tokio::time::sleep(delay).await;
        Ok(())
    }

    async fn emit_document(
        &self,
        session_id: &SessionId,
        attempts: u32,
        receipt: FinalizeReceipt,
        request: &FinalizeRequest,
    ) -> Result<FinalizeOutcome, FinalizeError> {
        match self.emitter.emit(session_id, &receipt, request).await {
            Ok(document) => {
                self.events.log_event(
                    session_id,
                    &SessionEvent::FinalizeSucceeded {
                        attempts,
                        version: receipt.version,
                    },
                );
                info!(
                    session_id = %session_id,
                    attempts,
                    document_id = %document.document_id,
                    "finalize completed and document emitted"
                );
                Ok(FinalizeOutcome {
                    attempts_needed: attempts,
                    version: receipt.version,
                    status: receipt.status,
                    already_finalized: false,
                    document: Some(document),
                })
            }
            Err(emission) => {
                error!(
                    session_id = %session_id,
                    error = %emission,
                    "document emission failed after successful finalize, releasing stock"
                );
                // Compensation is best-effort: its own failure is logged and
                // swallowed.
                let compensation_issued =
                    match self.service.release_reservation(session_id).await {
                        Ok(summary) => {
                            self.events.log_event(
                                session_id,
                                &SessionEvent::CompensationIssued {
                                    items_released: summary.items_released,
                                },
                            );
                            true
                        }
                        Err(err) => {
                            warn!(
                                session_id = %session_id,
                                error = %err,
                                "compensating stock release failed"
                            );
                            self.events.log_event(
                                session_id,
                                &SessionEvent::CompensationFailed {
                                    message: err.to_string(),
                                },
                            );
                            false
                        }
                    };
                Err(FinalizeError::EmissionFailed {
                    source: emission,
                    compensation_issued,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::NoopEventSink;
    use crate::remote::mocks::{service_error, MockDocumentEmitter, MockStockService, StockCommand};
    use crate::remote::types::{DocumentType, VersionSnapshot};

    fn request() -> FinalizeRequest {
        FinalizeRequest {
            document_type: DocumentType::InternalTransfer,
            destination: "WH-CENTRAL".to_string(),
            carrier: None,
            notes: None,
        }
    }

    fn coordinator(
        service: Arc<MockStockService>,
        emitter: Arc<MockDocumentEmitter>,
    ) -> FinalizationCoordinator {
        FinalizationCoordinator::new(service, emitter, Arc::new(NoopEventSink::new()))
    }

    #[tokio::test]
    async fn already_completed_session_short_circuits_without_side_effects() {
        let service = Arc::new(MockStockService::new());
        let emitter = Arc::new(MockDocumentEmitter::new());
        service.push_version_response(Ok(VersionSnapshot {
            version: 7,
            status: RemoteSessionStatus::Completed,
        }));

        let outcome = coordinator(service.clone(), emitter.clone())
            .finalize_session(&SessionId::new("sess-1"), &request())
            .await
            .unwrap();

        assert!(outcome.already_finalized);
        assert_eq!(outcome.version, 7);
        assert_eq!(emitter.emission_count(), 0);
        assert_eq!(
            service.count_commands(|c| matches!(c, StockCommand::Finalize { .. })),
            0
        );
    }

    #[tokio::test]
    async fn fresh_in_progress_marker_fails_fast() {
        let service = Arc::new(MockStockService::new());
        let emitter = Arc::new(MockDocumentEmitter::new());
        service.push_version_response(Ok(VersionSnapshot {
            version: 3,
            status: RemoteSessionStatus::Finalizing {
                since: Utc::now(),
                last_error: None,
            },
        }));

        let err = coordinator(service.clone(), emitter)
            .finalize_session(&SessionId::new("sess-1"), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, FinalizeError::BeingProcessed));
        // No spinning: a single version read, no finalize call.
        assert_eq!(
            service.count_commands(|c| matches!(c, StockCommand::ReadSessionVersion)),
            1
        );
        assert_eq!(
            service.count_commands(|c| matches!(c, StockCommand::Finalize { .. })),
            0
        );
    }

    #[tokio::test]
    async fn stale_in_progress_marker_is_taken_over() {
        let service = Arc::new(MockStockService::new());
        let emitter = Arc::new(MockDocumentEmitter::new());
        service.push_version_response(Ok(VersionSnapshot {
            version: 3,
            status: RemoteSessionStatus::Finalizing {
                since: Utc::now() - chrono::Duration::seconds(600),
                last_error: None,
            },
        }));

        let outcome = coordinator(service, emitter.clone())
            .finalize_session(&SessionId::new("sess-1"), &request())
            .await
            .unwrap();

        assert!(!outcome.already_finalized);
        assert_eq!(emitter.emission_count(), 1);
    }

    #[tokio::test]
    async fn errored_in_progress_marker_is_retried_even_when_fresh() {
        let service = Arc::new(MockStockService::new());
        let emitter = Arc::new(MockDocumentEmitter::new());
        service.push_version_response(Ok(VersionSnapshot {
            version: 3,
            status: RemoteSessionStatus::Finalizing {
                since: Utc::now(),
                last_error: Some("VERSION_MISMATCH".to_string()),
            },
        }));

        let outcome = coordinator(service, emitter)
            .finalize_session(&SessionId::new("sess-1"), &request())
            .await
            .unwrap();
        assert_eq!(outcome.attempts_needed, 1);
    }

    #[tokio::test]
    async fn cancelled_session_is_not_finalizable() {
        let service = Arc::new(MockStockService::new());
        let emitter = Arc::new(MockDocumentEmitter::new());
        service.push_version_response(Ok(VersionSnapshot {
            version: 1,
            status: RemoteSessionStatus::Cancelled,
        }));

        let err = coordinator(service, emitter)
            .finalize_session(&SessionId::new("sess-1"), &request())
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::NotFinalizable { .. }));
    }

    #[tokio::test]
    async fn non_retryable_error_surfaces_immediately() {
        let service = Arc::new(MockStockService::new());
        let emitter = Arc::new(MockDocumentEmitter::new());
        service.push_finalize_response(Err(service_error(
            ErrorCode::InsufficientStock,
            "not enough stock to consume",
        )));

        let err = coordinator(service.clone(), emitter)
            .finalize_session(&SessionId::new("sess-1"), &request())
            .await
            .unwrap_err();

        assert!(matches!(err, FinalizeError::Service(_)));
        assert_eq!(
            service.count_commands(|c| matches!(c, StockCommand::Finalize { .. })),
            1
        );
    }
}
