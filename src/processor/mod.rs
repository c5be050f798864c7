//! # Processor Chains
//!
//! Steps, chains and the processors that give chains structure:
//!
//! - [`ProcessorChain`] - ordered, immutable, short-circuiting composition
//! - [`Interceptor`] - a step that wraps the rest of its chain
//! - [`ErrorHandlingScope`] - try/catch around a chain
//! - [`OperationRouter`] - dispatch table keyed by the `operation` property
//! - [`LifecycleFilter`] - decorator gating a processor on lifecycle state

pub mod chain;
pub mod dispatch;
pub mod filter;
pub mod scope;
pub mod traits;

pub use chain::{ProcessorChain, ProcessorChainBuilder};
pub use dispatch::{OperationRouter, OperationRouterBuilder};
pub use filter::LifecycleFilter;
pub use scope::ErrorHandlingScope;
pub use traits::{FnProcessor, Interceptor, MapProcessor, Next, Processor};
