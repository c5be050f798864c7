//! # Event Correlator
//!
//! Collects events sharing a correlation id and aggregates each group exactly
//! once.
//!
//! Groups live in a `DashMap` keyed by correlation id, each behind its own
//! mutex so unrelated ids never contend. Aggregation seals the group, records
//! its id in a bounded processed-groups list and removes it from the table
//! while still holding the group lock. Any event arriving for that id
//! afterwards is routed to the [`LateEventHandler`] instead of reopening it.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::aggregator::{AggregationStrategy, CompletionPolicy};
use super::event_group::EventGroup;
use crate::constants::{events, system};
use crate::error::{ConduitError, FailureListener, LoggingFailureListener, Result};
use crate::logging::log_correlation_operation;
use crate::message::{Event, EventSink};

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelatorConfig {
    pub name: String,
    /// Groups older than this are expired by the timeout monitor
    pub timeout: Option<Duration>,
    /// On expiry, report `CorrelationTimeout` instead of aggregating the partial group
    pub fail_on_timeout: bool,
    /// Correlation ids remembered after aggregation for late-event detection
    pub max_processed_groups: usize,
    /// Keep aggregated results nobody is waiting for yet so a later
    /// `await_response` finds them. Request-response groups are always kept.
    /// Uncollected results are bounded by `max_processed_groups`, oldest first.
    pub store_responses: bool,
}

impl CorrelatorConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration, fail_on_timeout: bool) -> Self {
        self.timeout = Some(timeout);
        self.fail_on_timeout = fail_on_timeout;
        self
    }

    pub fn with_store_responses(mut self, store_responses: bool) -> Self {
        self.store_responses = store_responses;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_processed_groups == 0 {
            return Err(ConduitError::Configuration(
                "max_processed_groups must be greater than 0".to_string(),
            ));
        }
        if self.timeout.is_some_and(|timeout| timeout.is_zero()) {
            return Err(ConduitError::Configuration(
                "correlation timeout must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for CorrelatorConfig {
    fn default() -> Self {
        Self {
            name: "correlator".to_string(),
            timeout: None,
            fail_on_timeout: true,
            max_processed_groups: system::MAX_PROCESSED_GROUPS,
            store_responses: true,
        }
    }
}

/// Result of feeding one event to the correlator
#[derive(Debug, Clone, PartialEq)]
pub enum CorrelationOutcome {
    /// Added to its group, which is still incomplete
    Collecting { correlation_id: String, received: usize },
    /// This event completed its group
    Aggregated(Event),
    /// The group was already aggregated; the event went to the late path
    Late(Event),
}

/// Receives events that arrive after their group was aggregated
pub trait LateEventHandler: Send + Sync {
    fn on_late_event(&self, event: Event);
}

impl LateEventHandler for tokio::sync::mpsc::UnboundedSender<Event> {
    fn on_late_event(&self, event: Event) {
        if self.send(event).is_err() {
            warn!("Late event receiver dropped");
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingLateEventHandler;

impl LateEventHandler for LoggingLateEventHandler {
    fn on_late_event(&self, event: Event) {
        warn!(
            correlation_id = %event.correlation_id(),
            event = events::MISSED_ASYNC_REPLY,
            "📭 CORRELATION: Late event for an aggregated group"
        );
    }
}

/// Bounded FIFO of aggregated correlation ids
#[derive(Debug)]
struct ProcessedGroups {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl ProcessedGroups {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::new(),
            ids: HashSet::new(),
            capacity,
        }
    }

    fn contains(&self, correlation_id: &str) -> bool {
        self.ids.contains(correlation_id)
    }

    fn insert(&mut self, correlation_id: &str) {
        if !self.ids.insert(correlation_id.to_string()) {
            return;
        }
        self.order.push_back(correlation_id.to_string());
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.ids.remove(&evicted);
            }
        }
    }
}

enum ResponseSlot {
    Waiting(Vec<oneshot::Sender<Result<Event>>>),
    Ready(Result<Event>),
}

struct CorrelatorInner {
    config: CorrelatorConfig,
    completion_policy: Arc<dyn CompletionPolicy>,
    strategy: Arc<dyn AggregationStrategy>,
    late_handler: Arc<dyn LateEventHandler>,
    failure_listener: Arc<dyn FailureListener>,
    output: Option<Arc<dyn EventSink>>,
    groups: DashMap<String, Arc<Mutex<EventGroup>>>,
    processed: Mutex<ProcessedGroups>,
    responses: DashMap<String, ResponseSlot>,
    /// Insertion order of `Ready` slots, for eviction
    stored: Mutex<VecDeque<String>>,
}

pub struct EventCorrelatorBuilder {
    config: CorrelatorConfig,
    completion_policy: Arc<dyn CompletionPolicy>,
    strategy: Arc<dyn AggregationStrategy>,
    late_handler: Arc<dyn LateEventHandler>,
    failure_listener: Arc<dyn FailureListener>,
    output: Option<Arc<dyn EventSink>>,
}

impl EventCorrelatorBuilder {
    pub fn late_event_handler(mut self, handler: Arc<dyn LateEventHandler>) -> Self {
        self.late_handler = handler;
        self
    }

    /// Where timeout failures are reported
    pub fn failure_listener(mut self, listener: Arc<dyn FailureListener>) -> Self {
        self.failure_listener = listener;
        self
    }

    /// Destination for groups aggregated by the timeout monitor
    pub fn output_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.output = Some(sink);
        self
    }

    pub fn build(self) -> EventCorrelator {
        let capacity = self.config.max_processed_groups;
        EventCorrelator {
            inner: Arc::new(CorrelatorInner {
                config: self.config,
                completion_policy: self.completion_policy,
                strategy: self.strategy,
                late_handler: self.late_handler,
                failure_listener: self.failure_listener,
                output: self.output,
                groups: DashMap::new(),
                processed: Mutex::new(ProcessedGroups::new(capacity)),
                responses: DashMap::new(),
                stored: Mutex::new(VecDeque::new()),
            }),
            monitor: Mutex::new(None),
        }
    }
}

pub struct EventCorrelator {
    inner: Arc<CorrelatorInner>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl EventCorrelator {
    pub fn new(
        config: CorrelatorConfig,
        completion_policy: impl CompletionPolicy + 'static,
        strategy: impl AggregationStrategy + 'static,
    ) -> Self {
        Self::builder(config, completion_policy, strategy).build()
    }

    pub fn builder(
        config: CorrelatorConfig,
        completion_policy: impl CompletionPolicy + 'static,
        strategy: impl AggregationStrategy + 'static,
    ) -> EventCorrelatorBuilder {
        EventCorrelatorBuilder {
            config,
            completion_policy: Arc::new(completion_policy),
            strategy: Arc::new(strategy),
            late_handler: Arc::new(LoggingLateEventHandler),
            failure_listener: Arc::new(LoggingFailureListener),
            output: None,
        }
    }

    pub fn config(&self) -> &CorrelatorConfig {
        &self.inner.config
    }

    /// Groups still collecting
    pub fn active_groups(&self) -> usize {
        self.inner.groups.len()
    }

    /// Whether `correlation_id` is remembered as already aggregated
    pub fn is_processed(&self, correlation_id: &str) -> bool {
        self.inner.processed.lock().contains(correlation_id)
    }

    /// Aggregated results stored for callers that have not collected them yet
    pub fn pending_responses(&self) -> usize {
        self.inner
            .responses
            .iter()
            .filter(|entry| matches!(entry.value(), ResponseSlot::Ready(_)))
            .count()
    }

    pub fn on_event(&self, event: Event) -> Result<CorrelationOutcome> {
        self.inner.on_event(event)
    }

    /// Start the background task that expires groups older than the
    /// configured timeout, checking every 100ms.
    ///
    /// Spawns onto the current tokio runtime, so it must be called from
    /// within one; outside a runtime this panics.
    pub fn enable_timeout_monitor(&self) -> Result<()> {
        if self.inner.config.timeout.is_none() {
            return Err(ConduitError::Configuration(format!(
                "correlator {} has no timeout configured",
                self.inner.config.name
            )));
        }

        let mut monitor = self.monitor.lock();
        if monitor.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let inner = self.inner.clone();
        *monitor = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(system::TIMEOUT_MONITOR_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                inner.expire_stale_groups().await;
            }
        }));

        info!(
            correlator = %self.inner.config.name,
            interval_ms = system::TIMEOUT_MONITOR_INTERVAL.as_millis() as u64,
            "⏱️ CORRELATION: Timeout monitor enabled"
        );
        Ok(())
    }

    pub fn disable_timeout_monitor(&self) {
        if let Some(handle) = self.monitor.lock().take() {
            handle.abort();
        }
    }

    /// Expire every group older than the configured timeout right now,
    /// returning how many were expired.
    pub async fn expire_stale_groups(&self) -> usize {
        self.inner.expire_stale_groups().await
    }

    /// Wait for the aggregated event of `correlation_id`.
    ///
    /// On timeout this fails with [`ConduitError::ResponseTimeout`] when
    /// `fail_on_timeout` is set; otherwise whatever has arrived so far is
    /// aggregated and returned.
    pub async fn await_response(&self, correlation_id: &str, timeout: Duration) -> Result<Event> {
        let receiver = match self.inner.responses.entry(correlation_id.to_string()) {
            Entry::Occupied(mut occupied) => match occupied.get_mut() {
                ResponseSlot::Ready(result) => {
                    let result = result.clone();
                    occupied.remove();
                    return result;
                }
                ResponseSlot::Waiting(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    rx
                }
            },
            Entry::Vacant(vacant) => {
                let (tx, rx) = oneshot::channel();
                vacant.insert(ResponseSlot::Waiting(vec![tx]));
                rx
            }
        };

        match tokio::time::timeout(timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(ConduitError::InvalidState(format!(
                "response channel for {correlation_id} closed"
            ))),
            Err(_) => {
                self.inner.responses.remove_if(correlation_id, |_, slot| {
                    matches!(slot, ResponseSlot::Waiting(waiters) if waiters.iter().all(|w| w.is_closed()))
                });

                let timeout_error = ConduitError::ResponseTimeout {
                    correlation_id: correlation_id.to_string(),
                    timeout_ms: timeout.as_millis() as u64,
                };
                if self.inner.config.fail_on_timeout {
                    return Err(timeout_error);
                }
                match self.inner.force_aggregate(correlation_id) {
                    Some(result) => result,
                    None => Err(timeout_error),
                }
            }
        }
    }
}

impl Drop for EventCorrelator {
    fn drop(&mut self) {
        if let Some(handle) = self.monitor.get_mut().take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for EventCorrelator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventCorrelator")
            .field("config", &self.inner.config)
            .field("active_groups", &self.inner.groups.len())
            .finish()
    }
}

impl CorrelatorInner {
    fn on_event(&self, event: Event) -> Result<CorrelationOutcome> {
        let correlation_id = event.correlation_id().to_string();
        if correlation_id.is_empty() {
            return Err(ConduitError::MissingCorrelationId);
        }

        if self.processed.lock().contains(&correlation_id) {
            return Ok(self.late(event));
        }

        let group = self
            .groups
            .entry(correlation_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(EventGroup::new(correlation_id.clone()))))
            .clone();

        let mut guard = group.lock();
        if guard.is_sealed() {
            drop(guard);
            return Ok(self.late(event));
        }
        if self.processed.lock().contains(&correlation_id) {
            // Created after the previous group for this id was aggregated and removed
            guard.seal_and_take();
            self.groups
                .remove_if(&correlation_id, |_, existing| Arc::ptr_eq(existing, &group));
            drop(guard);
            return Ok(self.late(event));
        }

        guard.add(event)?;
        if !self.completion_policy.should_aggregate(&guard) {
            let received = guard.size();
            debug!(correlation_id = %correlation_id, received, "Event collected");
            return Ok(CorrelationOutcome::Collecting {
                correlation_id,
                received,
            });
        }

        let sealed = self.seal(&group, &mut guard);
        drop(guard);

        let aggregated = self.merge(sealed)?;
        Ok(CorrelationOutcome::Aggregated(aggregated))
    }

    /// Seal, record and remove a group. Caller holds the group lock.
    fn seal(&self, group: &Arc<Mutex<EventGroup>>, guard: &mut EventGroup) -> EventGroup {
        let sealed = guard.seal_and_take();
        self.processed.lock().insert(sealed.correlation_id());
        self.groups
            .remove_if(sealed.correlation_id(), |_, existing| Arc::ptr_eq(existing, group));
        sealed
    }

    /// Whether the result for this group is kept until someone collects it
    fn keeps_response(&self, group: &EventGroup) -> bool {
        self.config.store_responses
            || group
                .events()
                .iter()
                .any(|event| event.exchange_pattern().has_response())
    }

    fn merge(&self, sealed: EventGroup) -> Result<Event> {
        let correlation_id = sealed.correlation_id().to_string();
        let keep = self.keeps_response(&sealed);
        match self.strategy.aggregate(&sealed) {
            Ok(aggregated) => {
                log_correlation_operation(
                    &correlation_id,
                    events::CORRELATION_AGGREGATED,
                    "aggregated",
                    Some(sealed.size()),
                    sealed.expected_size(),
                );
                self.complete_response(&correlation_id, Ok(aggregated.clone()), keep);
                Ok(aggregated)
            }
            Err(error) => {
                let failure = ConduitError::Aggregation {
                    correlation_id: correlation_id.clone(),
                    reason: error.to_string(),
                    events: sealed.into_events(),
                };
                warn!(correlation_id = %correlation_id, error = %failure, "❌ CORRELATION: Merge failed");
                self.complete_response(&correlation_id, Err(failure.clone()), keep);
                Err(failure)
            }
        }
    }

    fn late(&self, event: Event) -> CorrelationOutcome {
        debug!(
            correlation_id = %event.correlation_id(),
            event = events::MISSED_ASYNC_REPLY,
            "Routing late event"
        );
        self.late_handler.on_late_event(event.clone());
        CorrelationOutcome::Late(event)
    }

    fn complete_response(&self, correlation_id: &str, result: Result<Event>, keep: bool) {
        match self.responses.entry(correlation_id.to_string()) {
            Entry::Occupied(occupied) => {
                if let ResponseSlot::Waiting(waiters) = occupied.remove() {
                    for waiter in waiters {
                        let _ = waiter.send(result.clone());
                    }
                }
                return;
            }
            Entry::Vacant(vacant) => {
                if !keep {
                    return;
                }
                vacant.insert(ResponseSlot::Ready(result));
            }
        }
        self.remember_response(correlation_id);
    }

    /// Track a stored result, dropping the oldest uncollected ones past capacity.
    /// Takes the `stored` lock before any response shard.
    fn remember_response(&self, correlation_id: &str) {
        let mut stored = self.stored.lock();
        stored.push_back(correlation_id.to_string());
        while stored.len() > self.config.max_processed_groups {
            let Some(evicted) = stored.pop_front() else {
                break;
            };
            if self
                .responses
                .remove_if(&evicted, |_, slot| matches!(slot, ResponseSlot::Ready(_)))
                .is_some()
            {
                debug!(correlation_id = %evicted, "Evicted uncollected response");
            }
        }
    }

    /// Seal and merge whatever a group holds right now
    fn force_aggregate(&self, correlation_id: &str) -> Option<Result<Event>> {
        let group = self.groups.get(correlation_id).map(|entry| entry.value().clone())?;
        let mut guard = group.lock();
        if guard.is_sealed() || guard.is_empty() {
            return None;
        }
        let sealed = self.seal(&group, &mut guard);
        drop(guard);
        Some(self.merge(sealed))
    }

    async fn expire_stale_groups(&self) -> usize {
        let Some(timeout) = self.config.timeout else {
            return 0;
        };

        // Collect first: group locks must not be taken while a map shard is held
        let candidates: Vec<Arc<Mutex<EventGroup>>> = self
            .groups
            .iter()
            .map(|entry| entry.value().clone())
            .collect();

        let mut expired = 0;
        for group in candidates {
            let sealed = {
                let mut guard = group.lock();
                if guard.is_sealed() || guard.age() < timeout {
                    continue;
                }
                self.seal(&group, &mut guard)
            };
            expired += 1;
            self.expire(sealed).await;
        }
        expired
    }

    async fn expire(&self, sealed: EventGroup) {
        let correlation_id = sealed.correlation_id().to_string();
        log_correlation_operation(
            &correlation_id,
            events::CORRELATION_TIMEOUT,
            if self.config.fail_on_timeout { "failed" } else { "partial" },
            Some(sealed.size()),
            sealed.expected_size(),
        );

        if self.config.fail_on_timeout {
            let failure = ConduitError::CorrelationTimeout {
                correlation_id: correlation_id.clone(),
                received: sealed.size(),
                expected: sealed.expected_size(),
            };
            let keep = self.keeps_response(&sealed);
            self.complete_response(&correlation_id, Err(failure.clone()), keep);
            self.failure_listener.on_failure(failure);
            return;
        }

        match self.merge(sealed) {
            Ok(aggregated) => match &self.output {
                Some(output) => {
                    if let Err(error) = output.deliver(aggregated).await {
                        self.failure_listener.on_failure(error);
                    }
                }
                None => warn!(
                    correlator = %self.config.name,
                    correlation_id = %correlation_id,
                    "⚠️ CORRELATION: Partial aggregate has no output sink configured"
                ),
            },
            Err(failure) => self.failure_listener.on_failure(failure),
        }
    }
}
