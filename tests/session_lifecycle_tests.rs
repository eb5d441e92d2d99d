//! Session lifecycle: bin entry, product scanning, item corrections, resume,
//! and cancellation. Uses the scripted mock store; the server's responses are
//! the only source of quantities.

use std::sync::Arc;

use freepick::remote::mocks::{server_item, service_error, MockStockService, RecordingEventSink, StockCommand};
use freepick::{
    ErrorCode, LocationCheck, PersistedSessionMeta, PickingSessionMachine, SessionEvent, SessionId,
    SessionStatus,
};

fn new_machine(service: Arc<MockStockService>) -> PickingSessionMachine {
    PickingSessionMachine::start(
        SessionId::new("sess-lifecycle"),
        service,
        Arc::new(RecordingEventSink::new()),
    )
}

#[tokio::test]
async fn unknown_location_must_be_rescanned() {
    let service = Arc::new(MockStockService::new());
    service.set_location(
        "NOPE",
        LocationCheck {
            exists: false,
            is_frozen: false,
            message: None,
        },
    );
    let mut machine = new_machine(service);

    let err = machine.scan_bin("NOPE").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::LocationNotFound);
    assert_eq!(machine.status(), SessionStatus::WaitingForBin);

    // The operator picks another bin and the session proceeds normally.
    machine.scan_bin("B1").await.unwrap();
    assert_eq!(machine.status(), SessionStatus::ScanningProducts);
    assert_eq!(machine.current_bin(), Some("B1"));
}

#[tokio::test]
async fn repeated_scan_takes_server_quantity_not_local_arithmetic() {
    let service = Arc::new(MockStockService::new());
    // The server caps the second scan at quantity 2 regardless of what the
    // client might have computed.
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 1)));
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 2)));
    let mut machine = new_machine(service);

    machine.scan_bin("B1").await.unwrap();
    let first = machine.scan_product("SKU-1").await.unwrap();
    assert_eq!(first.quantity, 1);
    let second = machine.scan_product("SKU-1").await.unwrap();
    assert_eq!(second.quantity, 2);

    assert_eq!(machine.session().total_quantity_for("SKU-1"), 2);
    assert_eq!(machine.session().item_count(), 1);
}

#[tokio::test]
async fn same_sku_in_two_bins_is_two_records() {
    let service = Arc::new(MockStockService::new());
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 1)));
    service.push_scan_response(Ok(server_item("SKU-1", "B2", 1)));
    let mut machine = new_machine(service);

    machine.scan_bin("B1").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();
    machine.change_current_bin().unwrap();
    machine.scan_bin("B2").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();

    assert_eq!(machine.session().item_count(), 2);
    assert_eq!(machine.session().total_quantity_for("SKU-1"), 2);
}

#[tokio::test]
async fn decrement_resynchronizes_from_the_server() {
    let service = Arc::new(MockStockService::new());
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 3)));
    let mut machine = new_machine(service.clone());

    machine.scan_bin("B1").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();
    assert_eq!(machine.session().total_quantity_for("SKU-1"), 3);

    // Server recomputes to 2; the client mirrors the fresh read verbatim.
    service.set_listed_items(vec![server_item("SKU-1", "B1", 2)]);
    machine.decrease_item_quantity("SKU-1", "B1").await.unwrap();

    assert_eq!(machine.session().total_quantity_for("SKU-1"), 2);
    assert_eq!(
        service.count_commands(|c| matches!(c, StockCommand::ListItems)),
        1
    );
}

#[tokio::test]
async fn remove_calls_the_rpc_before_dropping_the_local_record() {
    let service = Arc::new(MockStockService::new());
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 2)));
    let mut machine = new_machine(service.clone());

    machine.scan_bin("B1").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();

    let receipt = machine.remove_scanned_item("SKU-1", "B1").await.unwrap();
    assert_eq!(receipt.released_quantity, 1);
    assert!(machine.session().is_empty());
    assert_eq!(
        service.count_commands(|c| matches!(c, StockCommand::RemoveItem { .. })),
        1
    );
}

#[tokio::test]
async fn failed_removal_rpc_leaves_the_local_record_alone() {
    let service = Arc::new(MockStockService::new());
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 2)));
    service.push_removal_response(Err(service_error(
        ErrorCode::StockLocked,
        "stock row is locked",
    )));
    let mut machine = new_machine(service);

    machine.scan_bin("B1").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();

    let err = machine.remove_scanned_item("SKU-1", "B1").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::StockLocked);
    assert_eq!(machine.session().item_count(), 1);
}

#[tokio::test]
async fn corrections_are_rejected_once_verification_started() {
    let service = Arc::new(MockStockService::new());
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 1)));
    let mut machine = new_machine(service);

    machine.scan_bin("B1").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();
    machine.start_verification().unwrap();

    let err = machine.remove_scanned_item("SKU-1", "B1").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
    let err = machine.decrease_item_quantity("SKU-1", "B1").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidState);
}

#[tokio::test]
async fn unknown_item_corrections_fail_without_an_rpc() {
    let service = Arc::new(MockStockService::new());
    let mut machine = new_machine(service.clone());
    machine.scan_bin("B1").await.unwrap();

    let err = machine.remove_scanned_item("SKU-9", "B1").await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::ProductNotFound);
    assert_eq!(
        service.count_commands(|c| matches!(c, StockCommand::RemoveItem { .. })),
        0
    );
}

#[tokio::test]
async fn resume_mid_scanning_restores_bin_and_items() {
    let service = Arc::new(MockStockService::new());
    service.set_listed_items(vec![
        server_item("SKU-1", "B1", 2),
        server_item("SKU-2", "B1", 1),
    ]);
    let meta = PersistedSessionMeta {
        id: SessionId::new("sess-resume"),
        current_bin: Some("B1".to_string()),
        status: SessionStatus::ScanningProducts,
        started_at: chrono::Utc::now(),
    };

    let machine = PickingSessionMachine::resume(
        meta,
        service,
        Arc::new(RecordingEventSink::new()),
    )
    .await
    .unwrap();

    assert_eq!(machine.status(), SessionStatus::ScanningProducts);
    assert_eq!(machine.current_bin(), Some("B1"));
    assert_eq!(machine.session().item_count(), 2);
}

#[tokio::test]
async fn cancel_is_best_effort_and_resets_the_session() {
    let service = Arc::new(MockStockService::new());
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 1)));
    service.push_cancel_response(Err(service_error(ErrorCode::Timeout, "cancel timed out")));
    let events = Arc::new(RecordingEventSink::new());
    let mut machine = PickingSessionMachine::start(
        SessionId::new("sess-cancel"),
        service.clone(),
        events.clone(),
    );

    machine.scan_bin("B1").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();

    // The RPC failure is swallowed: the server garbage-collects abandoned
    // sessions on its own.
    machine.cancel().await.unwrap();
    assert_eq!(machine.status(), SessionStatus::WaitingForBin);
    assert!(machine.session().is_empty());
    assert_eq!(
        events.count(|e| matches!(e, SessionEvent::SessionCancelled)),
        1
    );
}

#[tokio::test]
async fn scan_events_reach_the_audit_sink() {
    let service = Arc::new(MockStockService::new());
    service.push_scan_response(Ok(server_item("SKU-1", "B1", 1)));
    let events = Arc::new(RecordingEventSink::new());
    let mut machine = PickingSessionMachine::start(
        SessionId::new("sess-audit"),
        service,
        events.clone(),
    );

    machine.scan_bin("B1").await.unwrap();
    machine.scan_product("SKU-1").await.unwrap();

    assert_eq!(events.count(|e| matches!(e, SessionEvent::SessionStarted)), 1);
    assert_eq!(events.count(|e| matches!(e, SessionEvent::BinScanned { .. })), 1);
    assert_eq!(
        events.count(|e| matches!(e, SessionEvent::ProductScanned { .. })),
        1
    );
}
