//! Lifecycle-aware decorator for processors.

use async_trait::async_trait;
use std::sync::Arc;

use super::traits::Processor;
use crate::error::{ConduitError, Result};
use crate::lifecycle::LifecycleController;
use crate::message::Event;

/// Only lets events reach `inner` while the shared controller is started
pub struct LifecycleFilter<P> {
    inner: P,
    lifecycle: Arc<LifecycleController>,
}

impl<P: Processor> LifecycleFilter<P> {
    pub fn new(inner: P, lifecycle: Arc<LifecycleController>) -> Self {
        Self { inner, lifecycle }
    }
}

#[async_trait]
impl<P: Processor> Processor for LifecycleFilter<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn process(&self, event: Event) -> Result<Option<Event>> {
        match self.lifecycle.state() {
            state if state.is_processing() => self.inner.process(event).await,
            state => Err(ConduitError::InvalidState(format!(
                "{} is {} and cannot process events",
                self.lifecycle.name(),
                state
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::LifecycleState;
    use crate::processor::traits::MapProcessor;
    use serde_json::json;

    #[tokio::test]
    async fn test_filter_follows_controller_state() {
        let lifecycle = Arc::new(LifecycleController::new("billing"));
        let filter = LifecycleFilter::new(
            MapProcessor::new("bill", |event: Event| Ok(Some(event))),
            lifecycle.clone(),
        );

        assert!(filter.process(Event::new(json!(1))).await.is_err());

        lifecycle.transition(LifecycleState::Started).unwrap();
        assert!(filter.process(Event::new(json!(1))).await.unwrap().is_some());

        lifecycle.transition(LifecycleState::Stopped).unwrap();
        let err = filter.process(Event::new(json!(1))).await.unwrap_err();
        assert!(matches!(err, ConduitError::InvalidState(_)));
    }
}
