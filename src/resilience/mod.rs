//! # Resilience Module
//!
//! Retry campaigns for work that may fail transiently.
//!
//! ## Architecture
//!
//! - **Policies**: a [`RetryPolicyTemplate`] creates a fresh, stateful
//!   [`RetryPolicy`] per campaign that decides between retrying after a delay
//!   and giving up
//! - **Templates**: [`RetryTemplate`] runs a campaign on the caller's task;
//!   [`AsynchronousRetryTemplate`] runs it in the background
//! - **Notifiers**: [`RetryNotifier`] hooks fire on every transition
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conduit_core::resilience::{FnRetryCallback, RetryTemplate, SimpleRetryPolicyTemplate};
//! use std::time::Duration;
//!
//! # async fn example() -> conduit_core::Result<()> {
//! let template = RetryTemplate::new(SimpleRetryPolicyTemplate::new(2, Duration::from_millis(500)));
//!
//! let callback = FnRetryCallback::new("deliver invoice", |_context| async {
//!     // Remote call here
//!     Ok::<(), conduit_core::ConduitError>(())
//! });
//!
//! let context = template.execute(&callback).await?;
//! assert!(context.is_ok());
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod notifier;
pub mod policy;
pub mod template;

pub use context::{RetryContext, RetryState};
pub use notifier::{LoggingRetryNotifier, RetryNotifier};
pub use policy::{
    ExponentialBackoffPolicyTemplate, NoRetryPolicyTemplate, PolicyStatus, RetryPolicy,
    RetryPolicyTemplate, SimpleRetryPolicyTemplate,
};
pub use template::{
    AsyncRetryHandle, AsynchronousRetryTemplate, FnRetryCallback, RetryCallback,
    RetryCancellation, RetryTemplate,
};
