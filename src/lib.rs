#![allow(clippy::doc_markdown)] // Allow technical terms like SEDA in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Conduit Core
//!
//! Asynchronous message-processing core: processor chains, staged event-driven
//! queues, retry campaigns and event correlation.
//!
//! ## Overview
//!
//! An [`Event`] enters through a source, flows through a [`ProcessorChain`]
//! either synchronously or via a [`SedaStage`] that decouples receipt from
//! processing, and may be retried by a [`RetryTemplate`] or collected with its
//! siblings by an [`EventCorrelator`].
//!
//! ## Module Organization
//!
//! - [`message`] - Immutable events and outbound sinks
//! - [`processor`] - Chains, interceptors, error scopes and dispatch
//! - [`lifecycle`] - Lifecycle state shared by components
//! - [`seda`] - Bounded queues drained by worker pools
//! - [`resilience`] - Retry policies and templates
//! - [`routing`] - Correlation groups and aggregation
//! - [`config`] - Layered configuration
//! - [`error`] - Structured error handling
//! - [`logging`] - Structured logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conduit_core::{Event, MapProcessor, ProcessorChain};
//! use serde_json::json;
//!
//! # async fn example() -> conduit_core::Result<()> {
//! let chain = ProcessorChain::builder()
//!     .named("greeting")
//!     .processor(MapProcessor::new("upper", |event: conduit_core::Event| {
//!         let text = event.payload().as_str().unwrap_or_default().to_uppercase();
//!         Ok(Some(event.with_payload(json!(text))))
//!     }))
//!     .build();
//!
//! let result = chain.process(Event::new(json!("hello"))).await?;
//! assert_eq!(result.map(|e| e.payload().clone()), Some(json!("HELLO")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # All tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod message;
pub mod processor;
pub mod resilience;
pub mod routing;
pub mod seda;

pub use config::ConduitConfig;
pub use error::{ConduitError, FailureListener, LoggingFailureListener, Result};
pub use lifecycle::{LifecycleController, LifecycleState};
pub use message::{Event, EventBuilder, EventSink, ExceptionPayload, ExchangePattern};
pub use processor::{
    ErrorHandlingScope, FnProcessor, Interceptor, LifecycleFilter, MapProcessor, Next,
    OperationRouter, Processor, ProcessorChain,
};
pub use resilience::{
    AsyncRetryHandle, AsynchronousRetryTemplate, FnRetryCallback, RetryCallback, RetryContext,
    RetryNotifier, RetryState, RetryTemplate,
};
pub use routing::{
    AggregationStrategy, CollectionAggregator, CompletionPolicy, CorrelationOutcome,
    CorrelatorConfig, DefaultCompletionPolicy, EventCorrelator, EventGroup,
};
pub use seda::{Component, SedaStage, StageConfig, WorkItem};
