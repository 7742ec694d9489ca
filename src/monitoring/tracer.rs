/*!
 * Structured Tracing
 * Subscriber setup and per-operation spans using the tracing crate
 *
 * Features:
 * - Unique operation IDs for correlating submit, execution and completion
 * - JSON-formatted logs for structured parsing
 * - Final status and latency recorded on the operation span
 */

use crate::core::limits::{DEFAULT_LOG_FILTER, ENV_TRACE_JSON};
use crate::core::types::AsyncStatus;
use std::time::Instant;
use tracing::{debug, info, span, warn, Level, Span};
use tracing_subscriber::{
    fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};
use uuid::Uuid;

/// Operations slower than this are reported at `warn`
const SLOW_OPERATION_MS: u128 = 1_000;

/// Initialize structured tracing
///
/// Environment variables:
/// - RUST_LOG: Set log level (default: info)
/// - TRACERAYER_TRACE_JSON: Enable JSON output (default: false)
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

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
                    .with_thread_ids(true)
                    .with_thread_names(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_span_events(FmtSpan::CLOSE),
            )
            .try_init()
            .is_ok()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_names(true)
                    .with_span_events(FmtSpan::CLOSE)
                    .compact(),
            )
            .try_init()
            .is_ok()
    };

    if installed {
        info!(json = use_json, "Structured tracing initialized");
    }
    installed
}

/// Span covering one async operation from creation to completion
pub struct OperationSpan {
    span: Span,
    id: Uuid,
    start: Instant,
}

impl OperationSpan {
    pub fn new() -> Self {
        let id = Uuid::new_v4();
        let span = span!(
            Level::DEBUG,
            "async_operation",
            operation_id = %id,
            status = tracing::field::Empty,
            duration_us = tracing::field::Empty,
        );

        Self {
            span,
            id,
            start: Instant::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Enter the span (worker threads enter it while the work item runs)
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }

    /// Record the status the work item settled in
    pub fn record_status(&self, status: AsyncStatus) {
        let elapsed = self.start.elapsed();
        self.span.record("status", tracing::field::display(status));
        self.span.record("duration_us", elapsed.as_micros() as u64);

        let _entered = self.span.enter();
        if elapsed.as_millis() > SLOW_OPERATION_MS {
            warn!(
                operation_id = %self.id,
                duration_ms = elapsed.as_millis() as u64,
                slow = true,
                "slow async operation"
            );
        } else {
            debug!(operation_id = %self.id, status = %status, "async operation settled");
        }
    }
}

impl Default for OperationSpan {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_ids_are_unique() {
        let a = OperationSpan::new();
        let b = OperationSpan::new();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_record_status_without_subscriber() {
        let span = OperationSpan::new();
        span.record_status(AsyncStatus::Completed);
    }
}
