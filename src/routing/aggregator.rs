//! Completion predicates and merge strategies for event groups.

use serde_json::Value;

use super::event_group::EventGroup;
use crate::constants::properties;
use crate::error::{ConduitError, Result};
use crate::message::Event;

/// Decides when a group is ready to aggregate
pub trait CompletionPolicy: Send + Sync {
    fn should_aggregate(&self, group: &EventGroup) -> bool;
}

/// Complete once the announced group size is reached or a member is flagged
/// as the last part. Expiry is handled by the correlator's timeout monitor.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCompletionPolicy;

impl CompletionPolicy for DefaultCompletionPolicy {
    fn should_aggregate(&self, group: &EventGroup) -> bool {
        group.has_last()
            || group
                .expected_size()
                .is_some_and(|expected| group.size() >= expected)
    }
}

/// Complete after a fixed number of members regardless of event properties
#[derive(Debug, Clone, Copy)]
pub struct FixedSizeCompletionPolicy(pub usize);

impl CompletionPolicy for FixedSizeCompletionPolicy {
    fn should_aggregate(&self, group: &EventGroup) -> bool {
        group.size() >= self.0
    }
}

/// Merges a sealed group into one outgoing event
pub trait AggregationStrategy: Send + Sync {
    fn aggregate(&self, group: &EventGroup) -> Result<Event>;
}

impl<F> AggregationStrategy for F
where
    F: Fn(&EventGroup) -> Result<Event> + Send + Sync,
{
    fn aggregate(&self, group: &EventGroup) -> Result<Event> {
        self(group)
    }
}

/// Collects member payloads into a JSON array ordered by sequence number,
/// falling back to arrival order for members without one.
#[derive(Debug, Clone, Copy, Default)]
pub struct CollectionAggregator;

impl AggregationStrategy for CollectionAggregator {
    fn aggregate(&self, group: &EventGroup) -> Result<Event> {
        let first = group.events().first().ok_or_else(|| {
            ConduitError::processing(format!(
                "cannot aggregate empty group {}",
                group.correlation_id()
            ))
        })?;

        let mut members: Vec<(usize, &Event)> = group.events().iter().enumerate().collect();
        members.sort_by_key(|(arrival, event)| (event.correlation_sequence().unwrap_or(*arrival), *arrival));

        let payload = Value::Array(
            members
                .into_iter()
                .map(|(_, event)| event.payload().clone())
                .collect(),
        );

        let mut builder = Event::builder(payload)
            .correlation_id(group.correlation_id())
            .exchange_pattern(first.exchange_pattern());
        for (name, value) in first.properties() {
            if name != properties::CORRELATION_SEQUENCE && name != properties::CORRELATION_LAST {
                builder = builder.property(name.clone(), value.clone());
            }
        }
        Ok(builder
            .property(properties::CORRELATION_GROUP_SIZE, Value::from(group.size() as u64))
            .build())
    }
}
