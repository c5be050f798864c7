//! Operation dispatch table.
//!
//! Routes are resolved when the router is built. At runtime the router reads
//! the event's `operation` property and hands the event to the matching
//! processor.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::traits::Processor;
use crate::constants::properties;
use crate::error::{ConduitError, Result};
use crate::message::Event;

pub struct OperationRouter {
    name: String,
    routes: HashMap<String, Arc<dyn Processor>>,
    default_route: Option<Arc<dyn Processor>>,
}

impl OperationRouter {
    pub fn builder(name: impl Into<String>) -> OperationRouterBuilder {
        OperationRouterBuilder {
            name: name.into(),
            routes: HashMap::new(),
            default_route: None,
        }
    }

    pub fn operations(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.routes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    fn resolve(&self, event: &Event) -> Result<&Arc<dyn Processor>> {
        let operation = event
            .property(properties::OPERATION)
            .and_then(|value| value.as_str());

        match operation {
            Some(op) => self
                .routes
                .get(op)
                .or(self.default_route.as_ref())
                .ok_or_else(|| ConduitError::UnknownOperation {
                    operation: op.to_string(),
                }),
            None => self
                .default_route
                .as_ref()
                .ok_or_else(|| ConduitError::UnknownOperation {
                    operation: String::new(),
                }),
        }
    }
}

#[async_trait]
impl Processor for OperationRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn process(&self, event: Event) -> Result<Option<Event>> {
        let route = self.resolve(&event)?;
        debug!(router = %self.name, route = %route.name(), correlation_id = %event.correlation_id(), "Dispatching event");
        route.process(event).await
    }
}

pub struct OperationRouterBuilder {
    name: String,
    routes: HashMap<String, Arc<dyn Processor>>,
    default_route: Option<Arc<dyn Processor>>,
}

impl OperationRouterBuilder {
    pub fn route<P: Processor + 'static>(mut self, operation: impl Into<String>, processor: P) -> Self {
        self.routes.insert(operation.into(), Arc::new(processor));
        self
    }

    /// Used when the event names no operation or an unregistered one
    pub fn default_route<P: Processor + 'static>(mut self, processor: P) -> Self {
        self.default_route = Some(Arc::new(processor));
        self
    }

    pub fn build(self) -> OperationRouter {
        OperationRouter {
            name: self.name,
            routes: self.routes,
            default_route: self.default_route,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processor::traits::MapProcessor;
    use serde_json::json;

    fn tagger(tag: &'static str) -> MapProcessor<impl Fn(Event) -> Result<Option<Event>> + Send + Sync> {
        MapProcessor::new(tag, move |event: Event| Ok(Some(event.with_payload(json!(tag)))))
    }

    fn with_operation(op: &str) -> Event {
        Event::builder(json!(null))
            .property(properties::OPERATION, json!(op))
            .build()
    }

    #[tokio::test]
    async fn test_dispatches_by_operation_property() {
        let router = OperationRouter::builder("orders")
            .route("create", tagger("created"))
            .route("cancel", tagger("cancelled"))
            .build();

        let created = router.process(with_operation("create")).await.unwrap().unwrap();
        let cancelled = router.process(with_operation("cancel")).await.unwrap().unwrap();
        assert_eq!(created.payload(), &json!("created"));
        assert_eq!(cancelled.payload(), &json!("cancelled"));
        assert_eq!(router.operations(), vec!["cancel", "create"]);
    }

    #[tokio::test]
    async fn test_unknown_operation_without_default_fails() {
        let router = OperationRouter::builder("orders")
            .route("create", tagger("created"))
            .build();
        let err = router.process(with_operation("refund")).await.unwrap_err();
        assert!(matches!(err, ConduitError::UnknownOperation { operation } if operation == "refund"));
    }

    #[tokio::test]
    async fn test_default_route_catches_unmatched_events() {
        let router = OperationRouter::builder("orders")
            .route("create", tagger("created"))
            .default_route(tagger("fallback"))
            .build();
        let result = router.process(Event::new(json!(1))).await.unwrap().unwrap();
        assert_eq!(result.payload(), &json!("fallback"));
    }
}
