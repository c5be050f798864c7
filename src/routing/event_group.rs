//! Events collected under one correlation id.

use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

use crate::error::{ConduitError, Result};
use crate::message::Event;

/// Mutable collection awaiting aggregation. Every member shares the group's
/// correlation id; once sealed the group accepts nothing further.
#[derive(Debug, Clone)]
pub struct EventGroup {
    correlation_id: String,
    events: Vec<Event>,
    expected_size: Option<usize>,
    last_seen: bool,
    created: Instant,
    created_at: DateTime<Utc>,
    sealed: bool,
}

impl EventGroup {
    pub fn new(correlation_id: impl Into<String>) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            events: Vec::new(),
            expected_size: None,
            last_seen: false,
            created: Instant::now(),
            created_at: Utc::now(),
            sealed: false,
        }
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn size(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Part count announced by the first member that carried one
    pub fn expected_size(&self) -> Option<usize> {
        self.expected_size
    }

    /// Whether any member was flagged as the last part
    pub fn has_last(&self) -> bool {
        self.last_seen
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed
    }

    pub fn add(&mut self, event: Event) -> Result<()> {
        if self.sealed {
            return Err(ConduitError::InvalidState(format!(
                "event group {} is sealed",
                self.correlation_id
            )));
        }
        if event.correlation_id() != self.correlation_id {
            return Err(ConduitError::InvalidState(format!(
                "event {} does not belong to group {}",
                event.correlation_id(),
                self.correlation_id
            )));
        }
        if self.expected_size.is_none() {
            self.expected_size = event.correlation_group_size();
        }
        self.last_seen |= event.is_last_in_group();
        self.events.push(event);
        Ok(())
    }

    /// Seal the group and move its members into a detached copy for merging.
    /// The original stays behind, sealed and empty.
    pub(crate) fn seal_and_take(&mut self) -> EventGroup {
        self.sealed = true;
        EventGroup {
            correlation_id: self.correlation_id.clone(),
            events: std::mem::take(&mut self.events),
            expected_size: self.expected_size,
            last_seen: self.last_seen,
            created: self.created,
            created_at: self.created_at,
            sealed: true,
        }
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }
}
