//! Work items and the components they target.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::error::Result;
use crate::message::{Event, EventSink};
use crate::processor::ProcessorChain;

/// A named processing chain with an optional destination for replies
pub struct Component {
    name: String,
    chain: ProcessorChain,
    reply_sink: Option<Arc<dyn EventSink>>,
}

impl Component {
    pub fn new(name: impl Into<String>, chain: ProcessorChain) -> Self {
        Self {
            name: name.into(),
            chain,
            reply_sink: None,
        }
    }

    /// Deliver results of request-response events to `sink`
    pub fn with_reply_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.reply_sink = Some(sink);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn chain(&self) -> &ProcessorChain {
        &self.chain
    }

    pub fn reply_sink(&self) -> Option<&Arc<dyn EventSink>> {
        self.reply_sink.as_ref()
    }

    pub async fn invoke(&self, event: Event) -> Result<Option<Event>> {
        self.chain.process(event).await
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.name)
            .field("chain", &self.chain)
            .field("has_reply_sink", &self.reply_sink.is_some())
            .finish()
    }
}

/// One queued unit of work: an event and the component that must process it
#[derive(Debug, Clone)]
pub struct WorkItem {
    event: Event,
    component: Arc<Component>,
    enqueued_at: Instant,
}

impl WorkItem {
    pub fn new(event: Event, component: Arc<Component>) -> Self {
        Self {
            event,
            component,
            enqueued_at: Instant::now(),
        }
    }

    pub fn event(&self) -> &Event {
        &self.event
    }

    pub fn component(&self) -> &Arc<Component> {
        &self.component
    }

    pub fn enqueued_at(&self) -> Instant {
        self.enqueued_at
    }

    pub(crate) fn into_parts(self) -> (Event, Arc<Component>, Instant) {
        (self.event, self.component, self.enqueued_at)
    }
}
