//! # Structured Logging Module
//!
//! Environment-aware structured logging for stages, retry campaigns and
//! correlation groups. Library code only emits `tracing` events; binaries and
//! tests call [`init_structured_logging`] once to install a subscriber.

use chrono::Utc;
use std::process;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
///
/// `CONDUIT_LOG` overrides the filter directive entirely; otherwise the level
/// follows `CONDUIT_ENV`. `CONDUIT_LOG_FORMAT=json` switches to JSON lines.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let directive = std::env::var("CONDUIT_LOG").unwrap_or_else(|_| get_log_level(&environment));
        let json = use_json_format();

        let layer = if json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(EnvFilter::new(directive.clone()))
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(EnvFilter::new(directive.clone()))
                .boxed()
        };

        // Another subscriber (e.g. from a test harness) may already be installed
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            filter = %directive,
            json,
            "🔧 STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("CONDUIT_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var("CONDUIT_LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Log structured data for stage operations
pub fn log_stage_operation(stage: &str, operation: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        stage = %stage,
        operation = %operation,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🏊 STAGE_OPERATION"
    );
}

/// Log structured data for retry campaigns
pub fn log_retry_operation(work: &str, attempt: u32, status: &str, details: Option<&str>) {
    tracing::info!(
        work = %work,
        attempt = attempt,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "🔁 RETRY_OPERATION"
    );
}

/// Log structured data for correlation groups
pub fn log_correlation_operation(
    correlation_id: &str,
    operation: &str,
    status: &str,
    received: Option<usize>,
    expected: Option<usize>,
) {
    tracing::info!(
        correlation_id = %correlation_id,
        operation = %operation,
        status = %status,
        received = received,
        expected = expected,
        timestamp = %Utc::now().to_rfc3339(),
        "🧩 CORRELATION_OPERATION"
    );
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
