/*!
 * Structured Tracing
 * Subscriber setup and timed operation spans using the tracing crate
 */

use crate::core::limits::ENV_TRACE_JSON;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, span, Level};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - VMSLAB_TRACE_JSON: Enable JSON output (default: false)
///
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let use_json = std::env::var(ENV_TRACE_JSON)
        .map(|v| v == "1" || v == "true")
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(env_filter);

    let installed = if use_json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_line_number(true)
                    .with_file(true)
                    .with_current_span(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_line_number(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
    };

    if installed.is_ok() {
        debug!(json = use_json, "Structured tracing initialized");
    }
}

static NEXT_OPERATION: AtomicU64 = AtomicU64::new(1);

/// Span timing one named heap operation, reported on drop
pub struct OperationSpan {
    span: tracing::Span,
    start: Instant,
    operation_id: u64,
}

impl OperationSpan {
    pub fn new(operation: &str) -> Self {
        let operation_id = NEXT_OPERATION.fetch_add(1, Ordering::Relaxed);
        let span = span!(
            Level::INFO,
            "operation",
            operation = operation,
            operation_id = operation_id,
            duration_us = tracing::field::Empty,
        );
        Self {
            span,
            start: Instant::now(),
            operation_id,
        }
    }

    /// Enter the span so events logged inside are attributed to it
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for OperationSpan {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        self.span.record("duration_us", duration.as_micros() as u64);
        let _entered = self.span.enter();
        debug!(
            operation_id = self.operation_id,
            duration_us = duration.as_micros() as u64,
            "operation completed"
        );
    }
}

/// Start a timed span for `operation`
pub fn span_operation(operation: &str) -> OperationSpan {
    OperationSpan::new(operation)
}
