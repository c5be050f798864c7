//! End-to-end flows combining chains, stages, retries and correlation.

mod common;

use common::*;
use conduit_core::constants::properties;
use conduit_core::resilience::{FnRetryCallback, RetryContext, SimpleRetryPolicyTemplate};
use conduit_core::routing::{CollectionAggregator, CorrelationOutcome, DefaultCompletionPolicy};
use conduit_core::{
    Component, ConduitError, CorrelatorConfig, ErrorHandlingScope, Event, EventCorrelator,
    LoggingFailureListener, MapProcessor, OperationRouter, ProcessorChain, Result, RetryTemplate,
    SedaStage, StageConfig,
};
use serde_json::json;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test]
async fn test_split_parts_flow_through_stage_into_correlator() {
    let correlator = Arc::new(EventCorrelator::new(
        CorrelatorConfig::new("invoice-lines"),
        DefaultCompletionPolicy,
        CollectionAggregator,
    ));
    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Event>();

    let aggregate_step = {
        let correlator = correlator.clone();
        MapProcessor::new("aggregate", move |event: Event| -> Result<Option<Event>> {
            match correlator.on_event(event)? {
                CorrelationOutcome::Aggregated(merged) => Ok(Some(merged)),
                _ => Ok(None),
            }
        })
    };
    let forward_step = MapProcessor::new("forward", move |event: Event| -> Result<Option<Event>> {
        done_tx
            .send(event.clone())
            .map_err(|_| ConduitError::processing("receiver dropped"))?;
        Ok(Some(event))
    });

    let component = Arc::new(Component::new(
        "lines",
        ProcessorChain::builder()
            .processor(append("-priced"))
            .processor(aggregate_step)
            .processor(forward_step)
            .build(),
    ));
    let stage = SedaStage::new(
        "lines",
        StageConfig::new(16, 3, Duration::from_millis(100)),
        Arc::new(LoggingFailureListener),
    )
    .unwrap();
    stage.start().unwrap();

    for sequence in 0..4 {
        let part = Event::builder(json!(format!("line{sequence}")))
            .correlation_id("invoice-7")
            .correlation_part(sequence, 4)
            .build();
        stage.dispatch(component.clone(), part).await.unwrap();
    }

    let merged = tokio::time::timeout(Duration::from_secs(2), done_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        merged.payload(),
        &json!(["line0-priced", "line1-priced", "line2-priced", "line3-priced"])
    );
    stage.stop().await.unwrap();
    assert!(done_rx.try_recv().is_err());
}

#[tokio::test]
async fn test_router_inside_error_scope() {
    let router = OperationRouter::builder("commands")
        .route("create", append("+created"))
        .route("delete", fail("delete", "deletes are disabled"))
        .build();
    let handler = ProcessorChain::builder()
        .processor(MapProcessor::new("recover", |event: Event| -> Result<Option<Event>> {
            let message = event
                .exception()
                .map(|exception| exception.message.clone())
                .unwrap_or_default();
            Ok(Some(event.with_payload(json!(message))))
        }))
        .build();
    let scope = ErrorHandlingScope::new(
        "guarded",
        ProcessorChain::builder().processor(router).build(),
        handler,
    );
    let chain = ProcessorChain::builder().processor(scope).build();

    let create = text_event("doc").with_property(properties::OPERATION, json!("create"));
    let created = chain.process(create).await.unwrap().unwrap();
    assert_eq!(created.payload(), &json!("doc+created"));

    let delete = text_event("doc").with_property(properties::OPERATION, json!("delete"));
    let recovered = chain.process(delete).await.unwrap().unwrap();
    assert_eq!(recovered.payload(), &json!("Processing error: deletes are disabled"));
}

#[tokio::test]
async fn test_retry_wraps_flaky_chain() {
    let attempts = Arc::new(AtomicU32::new(0));
    let flaky = {
        let attempts = attempts.clone();
        MapProcessor::new("flaky", move |event: Event| -> Result<Option<Event>> {
            if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ConduitError::processing("connection reset"))
            } else {
                Ok(Some(event))
            }
        })
    };
    let chain = Arc::new(ProcessorChain::builder().processor(flaky).build());

    let template = RetryTemplate::new(SimpleRetryPolicyTemplate::new(3, Duration::from_millis(1)));
    let callback = {
        let chain = chain.clone();
        FnRetryCallback::new("deliver", move |_context: RetryContext| {
            let chain = chain.clone();
            async move { chain.process(text_event("payload")).await.map(|_| ()) }
        })
    };

    let context = template.execute(&callback).await.unwrap();
    assert!(context.is_ok());
    assert_eq!(context.attempts(), 3);
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
}
