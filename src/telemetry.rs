use anyhow::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

/// Initialize structured logging for the picking core. JSON output with
/// span context, filtered by RUST_LOG with an info default.
pub fn init_telemetry() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .with_span_list(true),
        )
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    tracing::info!("freepick telemetry initialized with structured logging");
    Ok(())
}

/// Generate a correlation ID for linking the attempts of one finalize run.
pub fn generate_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

/// Create a span with common picking-session attributes.
pub fn create_session_span(
    operation: &str,
    session_id: Option<&str>,
    correlation_id: Option<&str>,
) -> tracing::Span {
    tracing::info_span!(
        "picking_session",
        operation = operation,
        session.id = session_id,
        correlation.id = correlation_id,
    )
}
