//! # Component Lifecycle
//!
//! A single lifecycle state enum plus a controller object that components hold
//! by composition. The controller publishes every transition through a tokio
//! `watch` channel so worker loops can park while paused and exit on stop.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;
use tracing::debug;

use crate::error::{ConduitError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    /// Built but not yet started
    #[default]
    Initialised,
    /// Processing normally
    Started,
    /// Accepting work but not processing it
    Paused,
    /// No longer accepting or processing work; may be restarted
    Stopped,
    /// Released; no further transitions allowed
    Disposed,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disposed)
    }

    /// Whether new work may be submitted in this state
    pub fn accepts_work(&self) -> bool {
        matches!(self, Self::Initialised | Self::Started | Self::Paused)
    }

    /// Whether workers should be dequeuing in this state
    pub fn is_processing(&self) -> bool {
        matches!(self, Self::Started)
    }

    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;
        matches!(
            (self, next),
            (Initialised, Started)
                | (Initialised, Paused)
                | (Initialised, Disposed)
                | (Started, Paused)
                | (Started, Stopped)
                | (Paused, Started)
                | (Paused, Stopped)
                | (Stopped, Started)
                | (Stopped, Disposed)
        )
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialised => write!(f, "initialised"),
            Self::Started => write!(f, "started"),
            Self::Paused => write!(f, "paused"),
            Self::Stopped => write!(f, "stopped"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}

impl std::str::FromStr for LifecycleState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "initialised" => Ok(Self::Initialised),
            "started" => Ok(Self::Started),
            "paused" => Ok(Self::Paused),
            "stopped" => Ok(Self::Stopped),
            "disposed" => Ok(Self::Disposed),
            _ => Err(format!("Invalid lifecycle state: {s}")),
        }
    }
}

/// Owns a component's lifecycle state and validates transitions
#[derive(Debug)]
pub struct LifecycleController {
    name: String,
    sender: watch::Sender<LifecycleState>,
}

impl LifecycleController {
    pub fn new(name: impl Into<String>) -> Self {
        let (sender, _) = watch::channel(LifecycleState::Initialised);
        Self {
            name: name.into(),
            sender,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.sender.subscribe()
    }

    /// Move to `next`, returning the previous state
    pub fn transition(&self, next: LifecycleState) -> Result<LifecycleState> {
        let mut previous = None;
        self.sender.send_if_modified(|current| {
            if current.can_transition_to(next) {
                previous = Some(*current);
                *current = next;
                true
            } else {
                false
            }
        });

        match previous {
            Some(previous) => {
                debug!(component = %self.name, from = %previous, to = %next, "Lifecycle transition");
                Ok(previous)
            }
            None => Err(ConduitError::InvalidState(format!(
                "{} cannot move from {} to {}",
                self.name,
                self.state(),
                next
            ))),
        }
    }

    /// Fail unless the component is in `expected`
    pub fn ensure(&self, expected: LifecycleState) -> Result<()> {
        let current = self.state();
        if current == expected {
            Ok(())
        } else {
            Err(ConduitError::InvalidState(format!(
                "{} is {}, expected {}",
                self.name, current, expected
            )))
        }
    }
}
