//! Try/catch scoping for chains.

use async_trait::async_trait;
use tracing::warn;

use super::chain::ProcessorChain;
use super::traits::Processor;
use crate::error::{ConduitError, Result};
use crate::message::{Event, ExceptionPayload};

/// Runs `body`; if it fails, runs `handler` on the original event with the
/// failure attached as its exception payload. Errors raised by the handler
/// itself propagate.
#[derive(Debug, Clone)]
pub struct ErrorHandlingScope {
    name: String,
    body: ProcessorChain,
    handler: ProcessorChain,
}

impl ErrorHandlingScope {
    pub fn new(name: impl Into<String>, body: ProcessorChain, handler: ProcessorChain) -> Self {
        Self {
            name: name.into(),
            body,
            handler,
        }
    }
}

#[async_trait]
impl Processor for ErrorHandlingScope {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Result<Option<Event>> {
        match self.body.process(event.clone()).await {
            Ok(result) => Ok(result),
            Err(error) => {
                let step = match &error {
                    ConduitError::ChainStep { step, .. } => Some(step.clone()),
                    _ => None,
                };
                warn!(
                    scope = %self.name,
                    correlation_id = %event.correlation_id(),
                    error = %error,
                    "⚠️ Error caught by scope, running handler"
                );
                let failed = event.with_exception(ExceptionPayload::new(
                    error.root_cause().to_string(),
                    step,
                ));
                self.handler.process(failed).await
            }
        }
    }
}
