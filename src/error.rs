//! Error types for the Conduit core.
//!

use crate::message::Event;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum ConduitError {
    /// Failure raised by a processing step, retry callback or merge strategy
    #[error("Processing error: {0}")]
    Processing(String),

    /// A step inside a processor chain failed
    #[error("Step '{step}' failed for correlation id {correlation_id}: {source}")]
    ChainStep {
        step: String,
        correlation_id: String,
        #[source]
        source: Box<ConduitError>,
    },

    /// The stage queue stayed full for the whole enqueue timeout
    #[error("Queue for stage '{stage}' is full (capacity {capacity}, waited {timeout_ms}ms)")]
    QueueFull {
        stage: String,
        capacity: usize,
        timeout_ms: u64,
    },

    /// A worker failed while invoking a component
    #[error("Work in stage '{stage}' failed for correlation id {correlation_id}: {source}")]
    WorkExecution {
        stage: String,
        correlation_id: String,
        #[source]
        source: Box<ConduitError>,
    },

    #[error("{work} retries exhausted after {attempts} attempts. Last exception message was: {last_failure}")]
    RetryExhausted {
        work: String,
        attempts: u32,
        #[source]
        last_failure: Box<ConduitError>,
    },

    #[error("{work} retries cancelled after {attempts} attempts")]
    RetryCancelled { work: String, attempts: u32 },

    /// Merge logic failed; carries the raw group members for diagnostics
    #[error("Aggregation failed for correlation id {correlation_id} ({} events): {reason}", .events.len())]
    Aggregation {
        correlation_id: String,
        events: Vec<Event>,
        reason: String,
    },

    #[error("Correlation timed out for group {correlation_id}: received {received} of {expected:?} events")]
    CorrelationTimeout {
        correlation_id: String,
        received: usize,
        expected: Option<usize>,
    },

    #[error("Response timed out after {timeout_ms}ms waiting for correlation id {correlation_id}")]
    ResponseTimeout {
        correlation_id: String,
        timeout_ms: u64,
    },

    #[error("Event has no usable correlation id")]
    MissingCorrelationId,

    #[error("No route for operation '{operation}'")]
    UnknownOperation { operation: String },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl ConduitError {
    /// Shorthand for a plain processing failure
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    /// The innermost error, following wrapped causes
    pub fn root_cause(&self) -> &ConduitError {
        match self {
            Self::ChainStep { source, .. } | Self::WorkExecution { source, .. } => {
                source.root_cause()
            }
            Self::RetryExhausted { last_failure, .. } => last_failure.root_cause(),
            other => other,
        }
    }
}

impl From<anyhow::Error> for ConduitError {
    fn from(error: anyhow::Error) -> Self {
        ConduitError::Processing(format!("{error:#}"))
    }
}

impl From<serde_json::Error> for ConduitError {
    fn from(error: serde_json::Error) -> Self {
        ConduitError::Processing(format!("JSON serialization error: {error}"))
    }
}

impl From<config::ConfigError> for ConduitError {
    fn from(error: config::ConfigError) -> Self {
        ConduitError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ConduitError>;

/// Receives failures from asynchronous paths (stage workers, the correlation
/// timeout monitor) that have no caller to return them to
pub trait FailureListener: Send + Sync {
    fn on_failure(&self, error: ConduitError);
}

/// Failures are forwarded to the receiving half; a dropped receiver is logged
impl FailureListener for tokio::sync::mpsc::UnboundedSender<ConduitError> {
    fn on_failure(&self, error: ConduitError) {
        if let Err(tokio::sync::mpsc::error::SendError(error)) = self.send(error) {
            tracing::warn!(error = %error, "Failure listener channel closed, dropping failure");
        }
    }
}

/// Default listener that records failures in the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingFailureListener;

impl FailureListener for LoggingFailureListener {
    fn on_failure(&self, error: ConduitError) {
        crate::logging::log_error("failure_listener", "on_failure", &error.to_string(), None);
    }
}
