//! Retry campaign observers.

use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};

use super::context::RetryContext;
use crate::constants::events;
use crate::error::ConduitError;
use crate::logging::log_retry_operation;

/// Callbacks invoked on the task driving the retry loop.
///
/// All hooks default to no-ops. A panicking hook is caught and logged; it
/// never changes the outcome of the campaign.
pub trait RetryNotifier: Send + Sync {
    fn on_failure(&self, _context: &RetryContext, _failure: &ConduitError) {}

    fn on_success(&self, _context: &RetryContext) {}

    fn on_exhausted(&self, _context: &RetryContext) {}

    fn on_cancelled(&self, _context: &RetryContext) {}
}

/// Notifier that only writes tracing events
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingRetryNotifier;

impl RetryNotifier for LoggingRetryNotifier {
    fn on_failure(&self, context: &RetryContext, failure: &ConduitError) {
        warn!(
            work = %context.description(),
            attempt = context.attempts(),
            error = %failure,
            event = events::RETRY_ATTEMPT_FAILED,
            "🔁 RETRY: Attempt failed"
        );
    }

    fn on_success(&self, context: &RetryContext) {
        log_retry_operation(
            context.description(),
            context.attempts(),
            events::RETRY_SUCCEEDED,
            None,
        );
    }

    fn on_exhausted(&self, context: &RetryContext) {
        warn!(
            work = %context.description(),
            attempts = context.attempts(),
            event = events::RETRY_EXHAUSTED,
            "🛑 RETRY: Exhausted"
        );
    }

    fn on_cancelled(&self, context: &RetryContext) {
        info!(
            work = %context.description(),
            attempts = context.attempts(),
            event = events::RETRY_CANCELLED,
            "⏹️ RETRY: Cancelled"
        );
    }
}

/// Run one notifier hook, containing any panic
pub(crate) fn notify_isolated(hook: &str, context: &RetryContext, call: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(call)).is_err() {
        warn!(
            work = %context.description(),
            hook,
            "⚠️ RETRY: Notifier panicked, continuing"
        );
    }
}
