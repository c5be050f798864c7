//! Per-campaign retry state.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ConduitError;

/// Where a retry campaign stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryState {
    /// Attempts still in progress (or not yet started)
    #[default]
    Running,
    /// An attempt succeeded
    Ok,
    /// The policy gave up
    Exhausted,
    /// `stop_retrying` was observed before the campaign finished
    Cancelled,
}

impl RetryState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl fmt::Display for RetryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// One retry campaign: created per `execute`, updated after every attempt
#[derive(Debug, Clone)]
pub struct RetryContext {
    description: String,
    attempts: u32,
    last_failure: Option<ConduitError>,
    state: RetryState,
}

impl RetryContext {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            attempts: 0,
            last_failure: None,
            state: RetryState::Running,
        }
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Attempts started so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_failure(&self) -> Option<&ConduitError> {
        self.last_failure.as_ref()
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    pub fn is_ok(&self) -> bool {
        self.state == RetryState::Ok
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    pub(crate) fn record_attempt(&mut self) {
        self.attempts += 1;
    }

    pub(crate) fn record_failure(&mut self, failure: ConduitError) {
        self.last_failure = Some(failure);
    }

    pub(crate) fn finish(&mut self, state: RetryState) {
        self.state = state;
    }
}
