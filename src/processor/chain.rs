//! # Processor Chain
//!
//! Ordered, immutable composition of processing steps. A chain is built once
//! and shared freely: each invocation only touches the event it was given.
//!
//! Adding one chain to another copies its steps in place, so
//! `(a;b);c` and `a;(b;c)` run exactly the same step sequence, interceptors
//! included.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

use super::traits::{Interceptor, Next, Processor};
use crate::error::{ConduitError, Result};
use crate::message::Event;

#[derive(Clone)]
enum Step {
    Processor(Arc<dyn Processor>),
    Interceptor(Arc<dyn Interceptor>),
}

impl Step {
    fn name(&self) -> &str {
        match self {
            Step::Processor(p) => p.name(),
            Step::Interceptor(i) => i.name(),
        }
    }
}

#[derive(Clone)]
pub struct ProcessorChain {
    name: String,
    steps: Arc<[Step]>,
}

impl ProcessorChain {
    pub fn builder() -> ProcessorChainBuilder {
        ProcessorChainBuilder::default()
    }

    /// Chain of plain processors, in order
    pub fn of<I>(name: impl Into<String>, processors: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Processor>>,
    {
        let mut builder = Self::builder().named(name);
        for processor in processors {
            builder = builder.processor_arc(processor);
        }
        builder.build()
    }

    /// The identity chain
    pub fn empty() -> Self {
        Self::builder().build()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(Step::name).collect()
    }

    /// Run every step in order, feeding each output to the next step.
    ///
    /// Returns `Ok(None)` as soon as a step short-circuits; later steps do
    /// not run. Step failures come back as [`ConduitError::ChainStep`].
    pub async fn process(&self, event: Event) -> Result<Option<Event>> {
        self.run_from(0, event).await
    }

    fn run_from(&self, start: usize, event: Event) -> BoxFuture<'_, Result<Option<Event>>> {
        Box::pin(async move {
            let mut current = event;
            for (index, step) in self.steps.iter().enumerate().skip(start) {
                let correlation_id = current.correlation_id().to_string();
                trace!(chain = %self.name, step = %step.name(), correlation_id = %correlation_id, "Running step");

                match step {
                    Step::Processor(processor) => match processor.process(current).await {
                        Ok(Some(next)) => current = next,
                        Ok(None) => {
                            debug!(
                                chain = %self.name,
                                step = %processor.name(),
                                correlation_id = %correlation_id,
                                "Chain short-circuited"
                            );
                            return Ok(None);
                        }
                        Err(error) => {
                            return Err(wrap_step_error(processor.name(), &correlation_id, error))
                        }
                    },
                    Step::Interceptor(interceptor) => {
                        let next = Next {
                            run: Box::new(move |event: Event| self.run_from(index + 1, event)),
                        };
                        return interceptor
                            .intercept(current, next)
                            .await
                            .map_err(|error| {
                                wrap_step_error(interceptor.name(), &correlation_id, error)
                            });
                    }
                }
            }
            Ok(Some(current))
        })
    }
}

/// Attach step identity unless an inner step already did
fn wrap_step_error(step: &str, correlation_id: &str, error: ConduitError) -> ConduitError {
    match error {
        already @ ConduitError::ChainStep { .. } => already,
        other => ConduitError::ChainStep {
            step: step.to_string(),
            correlation_id: correlation_id.to_string(),
            source: Box::new(other),
        },
    }
}

impl Default for ProcessorChain {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ProcessorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorChain")
            .field("name", &self.name)
            .field("steps", &self.step_names())
            .finish()
    }
}

#[async_trait]
impl Processor for ProcessorChain {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Result<Option<Event>> {
        ProcessorChain::process(self, event).await
    }
}

#[derive(Default)]
pub struct ProcessorChainBuilder {
    name: Option<String>,
    steps: Vec<Step>,
}

impl ProcessorChainBuilder {
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn processor<P: Processor + 'static>(self, processor: P) -> Self {
        self.processor_arc(Arc::new(processor))
    }

    pub fn processor_arc(mut self, processor: Arc<dyn Processor>) -> Self {
        self.steps.push(Step::Processor(processor));
        self
    }

    pub fn interceptor<I: Interceptor + 'static>(mut self, interceptor: I) -> Self {
        self.steps.push(Step::Interceptor(Arc::new(interceptor)));
        self
    }

    /// Append every step of an existing chain
    pub fn chain(mut self, chain: &ProcessorChain) -> Self {
        self.steps.extend(chain.steps.iter().cloned());
        self
    }

    /// Append every step collected by another builder
    pub fn nested(mut self, builder: ProcessorChainBuilder) -> Self {
        self.steps.extend(builder.steps);
        self
    }

    pub fn build(self) -> ProcessorChain {
        ProcessorChain {
            name: self.name.unwrap_or_else(|| "chain".to_string()),
            steps: self.steps.into(),
        }
    }
}
