#![allow(dead_code)]

pub mod strategies;

use conduit_core::{ConduitError, Event, MapProcessor, Processor, ProcessorChain, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Step that appends `tag` to a string payload
pub fn append(tag: &str) -> impl Processor {
    let tag = tag.to_string();
    MapProcessor::new(format!("append-{tag}"), move |event: Event| -> Result<Option<Event>> {
        let current = event.payload().as_str().unwrap_or_default();
        Ok(Some(event.with_payload(json!(format!("{current}{tag}")))))
    })
}

/// Step that ends the chain
pub fn stop(name: &str) -> impl Processor {
    MapProcessor::new(name, |_event: Event| -> Result<Option<Event>> { Ok(None) })
}

/// Step that always fails
pub fn fail(name: &str, message: &str) -> impl Processor {
    let message = message.to_string();
    MapProcessor::new(name, move |_event: Event| -> Result<Option<Event>> {
        Err(ConduitError::processing(message.clone()))
    })
}

pub fn tagged_chain(tags: &[String]) -> ProcessorChain {
    tags.iter()
        .fold(ProcessorChain::builder(), |builder, tag| builder.processor(append(tag)))
        .build()
}

pub fn text_event(text: &str) -> Event {
    Event::new(json!(text))
}

/// Failure listener whose failures can be inspected by the test
pub fn failure_channel() -> (Arc<mpsc::UnboundedSender<ConduitError>>, mpsc::UnboundedReceiver<ConduitError>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

/// Current-thread runtime for driving async chains inside proptest bodies
pub fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("failed to build test runtime")
}
