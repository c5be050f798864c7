//! # Message Model
//!
//! Immutable event envelope plus the sink trait used to hand events to
//! outbound collaborators (reply transports, aggregation outputs).

pub mod event;

use async_trait::async_trait;

use crate::error::Result;

pub use event::{Event, EventBuilder, ExceptionPayload, ExchangePattern};

/// Outbound collaborator that takes delivery of an event
#[async_trait]
pub trait EventSink: Send + Sync {
    async fn deliver(&self, event: Event) -> Result<()>;
}

/// Sink backed by an unbounded tokio channel
#[async_trait]
impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    async fn deliver(&self, event: Event) -> Result<()> {
        self.send(event).map_err(|_| {
            crate::error::ConduitError::InvalidState("event sink receiver dropped".to_string())
        })
    }
}
