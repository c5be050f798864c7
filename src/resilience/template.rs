//! # Retry Templates
//!
//! [`RetryTemplate`] drives a campaign on the caller's task and returns once it
//! is over. [`AsynchronousRetryTemplate`] spawns the whole campaign as one
//! task and hands back an [`AsyncRetryHandle`] straight away.
//!
//! Cancellation is cooperative: [`RetryCancellation`] is checked before every
//! attempt and after every policy decision, and it cuts short the back-off
//! sleep. An attempt already running is never interrupted.

use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use super::context::{RetryContext, RetryState};
use super::notifier::{notify_isolated, LoggingRetryNotifier, RetryNotifier};
use super::policy::{PolicyStatus, RetryPolicyTemplate};
use crate::error::{ConduitError, Result};

/// The unit of work a campaign retries
#[async_trait]
pub trait RetryCallback: Send + Sync {
    fn work_description(&self) -> &str;

    async fn do_work(&self, context: &RetryContext) -> Result<()>;
}

/// Adapts an async closure into a [`RetryCallback`]; the closure receives a
/// snapshot of the context for the current attempt.
pub struct FnRetryCallback<F> {
    description: String,
    work: F,
}

impl<F, Fut> FnRetryCallback<F>
where
    F: Fn(RetryContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    pub fn new(description: impl Into<String>, work: F) -> Self {
        Self {
            description: description.into(),
            work,
        }
    }
}

#[async_trait]
impl<F, Fut> RetryCallback for FnRetryCallback<F>
where
    F: Fn(RetryContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<()>> + Send,
{
    fn work_description(&self) -> &str {
        &self.description
    }

    async fn do_work(&self, context: &RetryContext) -> Result<()> {
        (self.work)(context.clone()).await
    }
}

/// Shared stop flag for one or more campaigns
#[derive(Debug, Clone, Default)]
pub struct RetryCancellation {
    inner: Arc<CancellationInner>,
}

#[derive(Debug, Default)]
struct CancellationInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl RetryCancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Completes once `cancel` has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Runs retry campaigns on the calling task
#[derive(Clone)]
pub struct RetryTemplate {
    policy_template: Arc<dyn RetryPolicyTemplate>,
    notifier: Arc<dyn RetryNotifier>,
    cancellation: RetryCancellation,
}

impl RetryTemplate {
    pub fn new(policy_template: impl RetryPolicyTemplate + 'static) -> Self {
        Self::from_arc(Arc::new(policy_template))
    }

    pub fn from_arc(policy_template: Arc<dyn RetryPolicyTemplate>) -> Self {
        Self {
            policy_template,
            notifier: Arc::new(LoggingRetryNotifier),
            cancellation: RetryCancellation::new(),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn RetryNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Share a stop flag with other templates
    pub fn with_cancellation(mut self, cancellation: RetryCancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    pub fn policy_template(&self) -> &Arc<dyn RetryPolicyTemplate> {
        &self.policy_template
    }

    pub fn cancellation(&self) -> &RetryCancellation {
        &self.cancellation
    }

    /// Ask running and future campaigns of this template to stop
    pub fn stop_retrying(&self) {
        self.cancellation.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Run `callback` until it succeeds, the policy gives up or the template
    /// is stopped.
    pub async fn execute(&self, callback: &dyn RetryCallback) -> Result<RetryContext> {
        self.run_campaign(callback, &|_| {}).await
    }

    #[instrument(skip_all, fields(work = %callback.work_description()))]
    async fn run_campaign(
        &self,
        callback: &dyn RetryCallback,
        publish: &(dyn Fn(&RetryContext) + Send + Sync),
    ) -> Result<RetryContext> {
        let mut policy = self.policy_template.create_retry_instance();
        let mut context = RetryContext::new(callback.work_description());

        loop {
            if self.cancellation.is_cancelled() {
                return Err(self.cancel(context, publish));
            }

            context.record_attempt();
            debug!(attempt = context.attempts(), "Starting attempt");
            publish(&context);

            let failure = match callback.do_work(&context).await {
                Ok(()) => {
                    context.finish(RetryState::Ok);
                    publish(&context);
                    notify_isolated("on_success", &context, || self.notifier.on_success(&context));
                    return Ok(context);
                }
                Err(failure) => failure,
            };

            context.record_failure(failure.clone());
            publish(&context);
            notify_isolated("on_failure", &context, || {
                self.notifier.on_failure(&context, &failure)
            });

            let delay = match policy.apply_policy(&failure) {
                PolicyStatus::Retry { delay } => delay,
                PolicyStatus::Exhausted => {
                    context.finish(RetryState::Exhausted);
                    publish(&context);
                    notify_isolated("on_exhausted", &context, || {
                        self.notifier.on_exhausted(&context)
                    });
                    return Err(ConduitError::RetryExhausted {
                        work: context.description().to_string(),
                        attempts: context.attempts(),
                        last_failure: Box::new(failure),
                    });
                }
            };

            if self.cancellation.is_cancelled() {
                return Err(self.cancel(context, publish));
            }
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = self.cancellation.cancelled() => {}
                }
            }
        }
    }

    fn cancel(
        &self,
        mut context: RetryContext,
        publish: &(dyn Fn(&RetryContext) + Send + Sync),
    ) -> ConduitError {
        context.finish(RetryState::Cancelled);
        publish(&context);
        notify_isolated("on_cancelled", &context, || self.notifier.on_cancelled(&context));
        ConduitError::RetryCancelled {
            work: context.description().to_string(),
            attempts: context.attempts(),
        }
    }
}

impl std::fmt::Debug for RetryTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryTemplate")
            .field("policy_template", &self.policy_template)
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

/// Runs each campaign as a single spawned task
#[derive(Debug, Clone)]
pub struct AsynchronousRetryTemplate {
    delegate: RetryTemplate,
    runtime: Option<Handle>,
}

impl AsynchronousRetryTemplate {
    pub fn new(delegate: RetryTemplate) -> Self {
        Self {
            delegate,
            runtime: None,
        }
    }

    /// Spawn campaigns on `runtime` instead of the caller's runtime
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    pub fn delegate(&self) -> &RetryTemplate {
        &self.delegate
    }

    pub fn stop_retrying(&self) {
        self.delegate.stop_retrying();
    }

    /// Start a campaign and return immediately.
    ///
    /// Without [`with_runtime`](Self::with_runtime) the campaign is spawned on
    /// the current tokio runtime, so this must be called from within one;
    /// outside a runtime it panics.
    pub fn execute(&self, callback: Arc<dyn RetryCallback>) -> AsyncRetryHandle {
        let (progress_tx, progress_rx) =
            watch::channel(RetryContext::new(callback.work_description()));
        let template = self.delegate.clone();

        let campaign = async move {
            let publish = move |context: &RetryContext| {
                progress_tx.send_replace(context.clone());
            };
            template.run_campaign(callback.as_ref(), &publish).await
        };

        let join = match &self.runtime {
            Some(runtime) => runtime.spawn(campaign),
            None => tokio::spawn(campaign),
        };

        AsyncRetryHandle {
            progress: progress_rx,
            join,
        }
    }
}

/// Handle on a campaign running in the background
#[derive(Debug)]
pub struct AsyncRetryHandle {
    progress: watch::Receiver<RetryContext>,
    join: JoinHandle<Result<RetryContext>>,
}

impl AsyncRetryHandle {
    /// Latest snapshot of the campaign. Its state stays `Running` until the
    /// campaign ends; only terminal snapshots carry a meaningful outcome.
    pub fn context(&self) -> RetryContext {
        self.progress.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the campaign's terminal result
    pub async fn wait(self) -> Result<RetryContext> {
        match self.join.await {
            Ok(result) => result,
            Err(join_error) => Err(ConduitError::Processing(format!(
                "retry campaign task failed: {join_error}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resilience::policy::{NoRetryPolicyTemplate, SimpleRetryPolicyTemplate};
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    struct CountingCallback {
        calls: AtomicU32,
        succeed_on: Option<u32>,
    }

    impl CountingCallback {
        fn new(succeed_on: Option<u32>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                succeed_on,
            }
        }
    }

    #[async_trait]
    impl RetryCallback for CountingCallback {
        fn work_description(&self) -> &str {
            "flaky endpoint"
        }

        async fn do_work(&self, _context: &RetryContext) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.succeed_on {
                Some(n) if call >= n => Ok(()),
                _ => Err(ConduitError::processing(format!("attempt {call} failed"))),
            }
        }
    }

    #[tokio::test]
    async fn test_success_after_failures() {
        let template = RetryTemplate::new(SimpleRetryPolicyTemplate::new(5, Duration::ZERO));
        let callback = CountingCallback::new(Some(3));

        let context = template.execute(&callback).await.unwrap();
        assert!(context.is_ok());
        assert_eq!(context.attempts(), 3);
        assert!(context.last_failure().is_some());
    }

    #[tokio::test]
    async fn test_no_retry_runs_once() {
        let template = RetryTemplate::new(NoRetryPolicyTemplate);
        let callback = CountingCallback::new(None);

        let err = template.execute(&callback).await.unwrap_err();
        assert!(matches!(err, ConduitError::RetryExhausted { attempts: 1, .. }));
        assert_eq!(callback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhausted_message_names_last_failure() {
        let template = RetryTemplate::new(SimpleRetryPolicyTemplate::new(1, Duration::ZERO));
        let callback = CountingCallback::new(None);

        let err = template.execute(&callback).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "flaky endpoint retries exhausted after 2 attempts. Last exception message was: Processing error: attempt 2 failed"
        );
    }

    #[tokio::test]
    async fn test_stop_wakes_backoff_sleep() {
        let template = RetryTemplate::new(SimpleRetryPolicyTemplate::forever(Duration::from_secs(60)));
        let callback = Arc::new(CountingCallback::new(None));

        let stopper = template.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            stopper.stop_retrying();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), template.execute(callback.as_ref()))
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, ConduitError::RetryCancelled { attempts: 1, .. }));
    }

    struct PanickingNotifier;

    impl RetryNotifier for PanickingNotifier {
        fn on_failure(&self, _context: &RetryContext, _failure: &ConduitError) {
            panic!("notifier bug");
        }
    }

    #[tokio::test]
    async fn test_panicking_notifier_does_not_break_campaign() {
        let template = RetryTemplate::new(SimpleRetryPolicyTemplate::new(3, Duration::ZERO))
            .with_notifier(Arc::new(PanickingNotifier));
        let callback = CountingCallback::new(Some(2));

        let context = template.execute(&callback).await.unwrap();
        assert_eq!(context.attempts(), 2);
        assert!(context.is_ok());
    }

    #[tokio::test]
    async fn test_cancellation_token_completes_after_cancel() {
        let token = RetryCancellation::new();
        let waiter = token.clone();
        let task = tokio::spawn(async move { waiter.cancelled().await });
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn test_shared_cancellation_stops_every_template() {
        let shared = RetryCancellation::new();
        let first = RetryTemplate::new(NoRetryPolicyTemplate).with_cancellation(shared.clone());
        let second = RetryTemplate::new(NoRetryPolicyTemplate).with_cancellation(shared.clone());

        first.stop_retrying();
        assert!(second.is_stopped());

        let callback = CountingCallback::new(Some(1));
        let err = second.execute(&callback).await.unwrap_err();
        assert!(matches!(err, ConduitError::RetryCancelled { attempts: 0, .. }));
        assert_eq!(callback.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_async_campaign_runs_on_supplied_runtime() {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();

        // Called outside any runtime context; the supplied handle does the spawning
        let template = AsynchronousRetryTemplate::new(RetryTemplate::new(
            SimpleRetryPolicyTemplate::new(2, Duration::ZERO),
        ))
        .with_runtime(runtime.handle().clone());
        let handle = template.execute(Arc::new(CountingCallback::new(Some(2))));

        let context = runtime.block_on(handle.wait()).unwrap();
        assert!(context.is_ok());
        assert_eq!(context.attempts(), 2);
    }
}
