//! # Processor Traits
//!
//! The seams every processing step plugs into. A step receives an owned
//! [`Event`] and returns the event for the next step, `None` to stop the
//! chain, or an error.

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::sync::Arc;

use crate::error::Result;
use crate::message::Event;

/// A single processing step
#[async_trait]
pub trait Processor: Send + Sync {
    /// Step name used in error context and logs
    fn name(&self) -> &str {
        "anonymous"
    }

    async fn process(&self, event: Event) -> Result<Option<Event>>;
}

/// A step that wraps the remainder of the chain it sits in
#[async_trait]
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &str {
        "interceptor"
    }

    /// Call `next.run(event)` to continue the chain; skipping the call ends it
    async fn intercept(&self, event: Event, next: Next<'_>) -> Result<Option<Event>>;
}

/// Handle on the steps following an interceptor
pub struct Next<'a> {
    pub(crate) run: Box<dyn FnOnce(Event) -> BoxFuture<'a, Result<Option<Event>>> + Send + 'a>,
}

impl<'a> Next<'a> {
    pub async fn run(self, event: Event) -> Result<Option<Event>> {
        (self.run)(event).await
    }
}

/// Processor built from an async closure
pub struct FnProcessor<F> {
    name: String,
    f: F,
}

impl<F> FnProcessor<F> {
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Processor for FnProcessor<F>
where
    F: Fn(Event) -> BoxFuture<'static, Result<Option<Event>>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Result<Option<Event>> {
        (self.f)(event).await
    }
}

/// Processor built from a synchronous closure that maps one event to the next
pub struct MapProcessor<F> {
    name: String,
    f: F,
}

impl<F> MapProcessor<F>
where
    F: Fn(Event) -> Result<Option<Event>> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

#[async_trait]
impl<F> Processor for MapProcessor<F>
where
    F: Fn(Event) -> Result<Option<Event>> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Result<Option<Event>> {
        (self.f)(event)
    }
}

#[async_trait]
impl<P: Processor + ?Sized> Processor for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn process(&self, event: Event) -> Result<Option<Event>> {
        (**self).process(event).await
    }
}
