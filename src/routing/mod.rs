//! # Event Routing
//!
//! Correlation and aggregation of related events.
//!
//! An [`EventCorrelator`] groups incoming events by correlation id into
//! [`EventGroup`]s, asks a [`CompletionPolicy`] whether each group is done and
//! merges completed groups with an [`AggregationStrategy`]. Each group is
//! aggregated at most once; stragglers go to a [`LateEventHandler`].

pub mod aggregator;
pub mod correlator;
pub mod event_group;

pub use aggregator::{
    AggregationStrategy, CollectionAggregator, CompletionPolicy, DefaultCompletionPolicy,
    FixedSizeCompletionPolicy,
};
pub use correlator::{
    CorrelationOutcome, CorrelatorConfig, EventCorrelator, EventCorrelatorBuilder,
    LateEventHandler, LoggingLateEventHandler,
};
pub use event_group::EventGroup;
