//! # SEDA Stage
//!
//! A bounded queue drained by a fixed pool of worker tasks. Receivers hand
//! over work with [`SedaStage::enqueue`] and return as soon as the item is
//! queued; workers invoke the target component and report failures to the
//! stage's [`FailureListener`] without ever dying on a bad item.
//!
//! Ordering: items leave the queue in FIFO order. With one worker they also
//! complete in that order; with several workers completion order is not
//! defined.

use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::SendTimeoutError, error::TrySendError};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::stats::{StageStats, StageStatsSnapshot};
use super::work::{Component, WorkItem};
use crate::constants::{events, properties, system};
use crate::error::{ConduitError, FailureListener, Result};
use crate::lifecycle::{LifecycleController, LifecycleState};
use crate::logging::log_stage_operation;
use crate::message::Event;

/// Sizing and timing for one stage
#[derive(Debug, Clone, PartialEq)]
pub struct StageConfig {
    /// Maximum number of queued items
    pub queue_capacity: usize,
    /// Number of worker tasks draining the queue
    pub worker_count: usize,
    /// How long `enqueue` waits for room in a full queue; zero means never wait
    pub enqueue_timeout: Duration,
    /// How long `stop` waits for in-flight work before aborting workers
    pub drain_timeout: Duration,
}

impl StageConfig {
    /// The enqueue timeout has no default and must always be chosen explicitly
    pub fn new(queue_capacity: usize, worker_count: usize, enqueue_timeout: Duration) -> Self {
        Self {
            queue_capacity,
            worker_count,
            enqueue_timeout,
            drain_timeout: system::DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, drain_timeout: Duration) -> Self {
        self.drain_timeout = drain_timeout;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(ConduitError::Configuration(
                "queue_capacity must be greater than 0".to_string(),
            ));
        }
        if self.worker_count == 0 {
            return Err(ConduitError::Configuration(
                "worker_count must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

struct StageInner {
    name: String,
    config: StageConfig,
    receiver: Mutex<mpsc::Receiver<WorkItem>>,
    lifecycle: LifecycleController,
    failure_listener: Arc<dyn FailureListener>,
    stats: StageStats,
}

pub struct SedaStage {
    inner: Arc<StageInner>,
    sender: mpsc::Sender<WorkItem>,
    workers: parking_lot::Mutex<Vec<JoinHandle<()>>>,
}

impl SedaStage {
    pub fn new(
        name: impl Into<String>,
        config: StageConfig,
        failure_listener: Arc<dyn FailureListener>,
    ) -> Result<Self> {
        config.validate()?;
        let name = name.into();
        let (sender, receiver) = mpsc::channel(config.queue_capacity);

        info!(
            stage = %name,
            queue_capacity = config.queue_capacity,
            worker_count = config.worker_count,
            enqueue_timeout_ms = config.enqueue_timeout.as_millis() as u64,
            "🏊 STAGE: Created"
        );

        Ok(Self {
            inner: Arc::new(StageInner {
                lifecycle: LifecycleController::new(name.clone()),
                name,
                config,
                receiver: Mutex::new(receiver),
                failure_listener,
                stats: StageStats::default(),
            }),
            sender,
            workers: parking_lot::Mutex::new(Vec::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &StageConfig {
        &self.inner.config
    }

    pub fn state(&self) -> LifecycleState {
        self.inner.lifecycle.state()
    }

    /// Items currently waiting to be picked up
    pub fn queued(&self) -> usize {
        self.inner.config.queue_capacity - self.sender.capacity()
    }

    pub fn stats(&self) -> StageStatsSnapshot {
        self.inner.stats.snapshot(self.queued())
    }

    /// Spawn the workers and begin processing. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<()> {
        self.inner.lifecycle.transition(LifecycleState::Started)?;
        self.spawn_workers();
        info!(stage = %self.inner.name, event = events::STAGE_STARTED, "🚀 STAGE: Started");
        Ok(())
    }

    /// Spawn the workers but hold them until [`resume`](Self::resume);
    /// the queue accepts work in the meantime.
    pub fn start_paused(&self) -> Result<()> {
        self.inner.lifecycle.transition(LifecycleState::Paused)?;
        self.spawn_workers();
        info!(stage = %self.inner.name, event = events::STAGE_PAUSED, "⏸️ STAGE: Started paused");
        Ok(())
    }

    pub fn pause(&self) -> Result<()> {
        self.inner.lifecycle.transition(LifecycleState::Paused)?;
        info!(stage = %self.inner.name, event = events::STAGE_PAUSED, "⏸️ STAGE: Paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<()> {
        self.inner.lifecycle.ensure(LifecycleState::Paused)?;
        self.inner.lifecycle.transition(LifecycleState::Started)?;
        info!(stage = %self.inner.name, event = events::STAGE_RESUMED, "▶️ STAGE: Resumed");
        Ok(())
    }

    /// Stop accepting and processing work. Workers finish the item they hold;
    /// any still running after the drain timeout are aborted. Items left in
    /// the queue stay there and are processed if the stage is restarted.
    #[instrument(skip(self), fields(stage = %self.inner.name))]
    pub async fn stop(&self) -> Result<()> {
        self.inner.lifecycle.transition(LifecycleState::Stopped)?;

        let handles = std::mem::take(&mut *self.workers.lock());
        let abort_handles: Vec<_> = handles.iter().map(JoinHandle::abort_handle).collect();
        let drain_timeout = self.inner.config.drain_timeout;

        match tokio::time::timeout(drain_timeout, futures::future::join_all(handles)).await {
            Ok(_) => debug!("All workers exited"),
            Err(_) => {
                warn!(
                    drain_timeout_ms = drain_timeout.as_millis() as u64,
                    "⚠️ STAGE: Workers still busy after drain timeout, aborting"
                );
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }

        let queued = self.queued();
        log_stage_operation(
            &self.inner.name,
            events::STAGE_STOPPED,
            "stopped",
            (queued > 0).then(|| format!("{queued} items left queued")).as_deref(),
        );
        Ok(())
    }

    /// Release the stage for good. Only valid once stopped (or never started).
    pub fn dispose(&self) -> Result<()> {
        self.inner.lifecycle.transition(LifecycleState::Disposed)?;
        Ok(())
    }

    /// Queue `item` for asynchronous processing.
    ///
    /// Returns as soon as the item is queued. While the queue is full this
    /// waits up to the configured enqueue timeout and then fails with
    /// [`ConduitError::QueueFull`]; a zero timeout fails immediately.
    pub async fn enqueue(&self, item: WorkItem) -> Result<()> {
        let state = self.inner.lifecycle.state();
        if !state.accepts_work() {
            return Err(ConduitError::InvalidState(format!(
                "stage {} is {} and does not accept work",
                self.inner.name, state
            )));
        }

        let timeout = self.inner.config.enqueue_timeout;
        let outcome = if timeout.is_zero() {
            self.sender.try_send(item).map_err(|e| match e {
                TrySendError::Full(_) => self.queue_full(),
                TrySendError::Closed(_) => self.closed(),
            })
        } else {
            self.sender
                .send_timeout(item, timeout)
                .await
                .map_err(|e| match e {
                    SendTimeoutError::Timeout(_) => self.queue_full(),
                    SendTimeoutError::Closed(_) => self.closed(),
                })
        };

        match &outcome {
            Ok(()) => self.inner.stats.record_enqueued(),
            Err(error) => {
                self.inner.stats.record_rejected();
                warn!(stage = %self.inner.name, error = %error, "🚫 STAGE: Enqueue rejected");
            }
        }
        outcome
    }

    /// Convenience for `enqueue(WorkItem::new(event, component))`
    pub async fn dispatch(&self, component: Arc<Component>, event: Event) -> Result<()> {
        self.enqueue(WorkItem::new(event, component)).await
    }

    fn queue_full(&self) -> ConduitError {
        ConduitError::QueueFull {
            stage: self.inner.name.clone(),
            capacity: self.inner.config.queue_capacity,
            timeout_ms: self.inner.config.enqueue_timeout.as_millis() as u64,
        }
    }

    fn closed(&self) -> ConduitError {
        ConduitError::InvalidState(format!("stage {} queue is closed", self.inner.name))
    }

    fn spawn_workers(&self) {
        let mut workers = self.workers.lock();
        workers.retain(|handle| !handle.is_finished());
        for worker_id in workers.len()..self.inner.config.worker_count {
            let inner = self.inner.clone();
            workers.push(tokio::spawn(run_worker(inner, worker_id)));
        }
    }
}

impl Drop for SedaStage {
    fn drop(&mut self) {
        for handle in self.workers.get_mut().drain(..) {
            handle.abort();
        }
    }
}

async fn run_worker(inner: Arc<StageInner>, worker_id: usize) {
    let mut state_rx: watch::Receiver<LifecycleState> = inner.lifecycle.subscribe();
    debug!(stage = %inner.name, worker_id, "Worker started");

    loop {
        let state = *state_rx.borrow_and_update();
        match state {
            LifecycleState::Started => {}
            LifecycleState::Initialised | LifecycleState::Paused => {
                if state_rx.changed().await.is_err() {
                    break;
                }
                continue;
            }
            LifecycleState::Stopped | LifecycleState::Disposed => break,
        }

        let item = {
            let mut receiver = inner.receiver.lock().await;
            tokio::select! {
                biased;
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                item = receiver.recv() => item,
            }
        };

        match item {
            Some(item) => inner.handle(item, worker_id).await,
            None => break,
        }
    }

    debug!(stage = %inner.name, worker_id, "Worker exited");
}

impl StageInner {
    async fn handle(&self, item: WorkItem, worker_id: usize) {
        let (event, component, enqueued_at) = item.into_parts();
        let correlation_id = event.correlation_id().to_string();
        let wants_reply = event.exchange_pattern().has_response();
        let queue_wait_ms = enqueued_at.elapsed().as_millis() as u64;

        let invocation = AssertUnwindSafe(component.invoke(event)).catch_unwind().await;
        let result = match invocation {
            Ok(result) => result,
            Err(panic) => Err(ConduitError::Processing(format!(
                "component {} panicked: {}",
                component.name(),
                panic_message(panic.as_ref())
            ))),
        };

        match result {
            Ok(output) => {
                self.stats.record_processed(queue_wait_ms);
                debug!(
                    stage = %self.name,
                    worker_id,
                    component = %component.name(),
                    correlation_id = %correlation_id,
                    "✅ Work completed"
                );
                match (wants_reply, output, component.reply_sink()) {
                    (true, Some(output), Some(sink)) => {
                        let reply = output.with_property(
                            properties::REPLY_FROM_STAGE,
                            serde_json::Value::from(self.name.clone()),
                        );
                        match sink.deliver(reply).await {
                            Ok(()) => self.stats.record_replied(),
                            Err(error) => self.report(&correlation_id, error),
                        }
                    }
                    (true, Some(_), None) => warn!(
                        stage = %self.name,
                        component = %component.name(),
                        correlation_id = %correlation_id,
                        "⚠️ STAGE: Request-response result dropped, component has no reply sink"
                    ),
                    _ => {}
                }
            }
            Err(error) => {
                self.stats.record_failed();
                self.report(&correlation_id, error);
            }
        }
    }

    fn report(&self, correlation_id: &str, error: ConduitError) {
        let failure = ConduitError::WorkExecution {
            stage: self.name.clone(),
            correlation_id: correlation_id.to_string(),
            source: Box::new(error),
        };
        error!(
            stage = %self.name,
            correlation_id = %correlation_id,
            error = %failure,
            event = events::WORK_FAILED,
            "❌ STAGE: Work failed"
        );
        self.failure_listener.on_failure(failure);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggingFailureListener;
    use crate::processor::{MapProcessor, ProcessorChain};
    use serde_json::json;
    use std::time::Instant;

    fn echo_component() -> Arc<Component> {
        Arc::new(Component::new(
            "echo",
            ProcessorChain::builder()
                .processor(MapProcessor::new("echo", |event: Event| Ok(Some(event))))
                .build(),
        ))
    }

    #[test]
    fn test_config_validation() {
        assert!(StageConfig::new(0, 1, Duration::ZERO).validate().is_err());
        assert!(StageConfig::new(1, 0, Duration::ZERO).validate().is_err());
        assert!(StageConfig::new(1, 1, Duration::ZERO).validate().is_ok());
    }

    #[tokio::test]
    async fn test_zero_timeout_rejects_immediately_when_full() {
        let stage = SedaStage::new(
            "orders",
            StageConfig::new(1, 1, Duration::ZERO),
            Arc::new(LoggingFailureListener),
        )
        .unwrap();
        stage.start_paused().unwrap();

        stage.dispatch(echo_component(), Event::new(json!(1))).await.unwrap();

        let started = Instant::now();
        let err = stage
            .dispatch(echo_component(), Event::new(json!(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::QueueFull { capacity: 1, timeout_ms: 0, .. }));
        assert!(started.elapsed() < Duration::from_millis(50));
        assert_eq!(stage.stats().rejected, 1);
        assert_eq!(stage.queued(), 1);
    }

    #[tokio::test]
    async fn test_request_response_without_reply_sink_completes_without_reply() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<ConduitError>();
        let stage = SedaStage::new(
            "orders",
            StageConfig::new(4, 1, Duration::from_millis(10)),
            Arc::new(tx),
        )
        .unwrap();
        stage.start().unwrap();

        let event = Event::builder(json!(1))
            .exchange_pattern(crate::message::ExchangePattern::RequestResponse)
            .build();
        stage.dispatch(echo_component(), event).await.unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while stage.stats().processed < 1 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let stats = stage.stats();
        assert_eq!(stats.processed, 1);
        assert_eq!(stats.replied, 0);
        assert_eq!(stats.failed, 0);
        assert!(rx.try_recv().is_err());
        stage.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_enqueue_rejected_after_stop() {
        let stage = SedaStage::new(
            "orders",
            StageConfig::new(4, 1, Duration::from_millis(10)),
            Arc::new(LoggingFailureListener),
        )
        .unwrap();
        stage.start().unwrap();
        stage.stop().await.unwrap();

        let err = stage
            .dispatch(echo_component(), Event::new(json!(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ConduitError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_resume_drains_work_queued_while_paused() {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let component = Arc::new(
            Component::new(
                "echo",
                ProcessorChain::builder()
                    .processor(MapProcessor::new("echo", |event: Event| Ok(Some(event))))
                    .build(),
            )
            .with_reply_sink(Arc::new(tx)),
        );
        let stage = SedaStage::new(
            "orders",
            StageConfig::new(8, 2, Duration::from_millis(100)),
            Arc::new(LoggingFailureListener),
        )
        .unwrap();
        stage.start_paused().unwrap();

        for i in 0..3 {
            let event = Event::builder(json!(i))
                .exchange_pattern(crate::message::ExchangePattern::RequestResponse)
                .build();
            stage.dispatch(component.clone(), event).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(stage.stats().processed, 0);

        stage.resume().unwrap();
        for _ in 0..3 {
            let reply = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .unwrap()
                .unwrap();
            assert_eq!(reply.property(properties::REPLY_FROM_STAGE), Some(&json!("orders")));
        }
        stage.stop().await.unwrap();
        assert_eq!(stage.stats().replied, 3);
    }
}
