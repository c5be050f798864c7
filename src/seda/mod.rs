//! # Staged Event-Driven Processing
//!
//! Bounded work queues drained by worker pools. A stage decouples the caller
//! that receives an event from the component that processes it, applying
//! backpressure when the queue stays full.

pub mod stage;
pub mod stats;
pub mod work;

pub use stage::{SedaStage, StageConfig};
pub use stats::{StageStats, StageStatsSnapshot};
pub use work::{Component, WorkItem};
