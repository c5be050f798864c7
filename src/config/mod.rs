//! # Conduit Configuration
//!
//! Plain configuration values for stages, retry campaigns and correlators.
//!
//! ## Architecture
//!
//! - **Layered Sources**: defaults, then an optional TOML file, then
//!   `CONDUIT__`-prefixed environment variables (see [`loader`])
//! - **Explicit Validation**: no silent fallbacks for values that must be chosen,
//!   such as the stage enqueue timeout
//! - **Conversion**: each section converts into the runtime type it configures
//!
//! ## Usage
//!
//! ```rust,no_run
//! use conduit_core::config::ConduitConfig;
//! use std::path::Path;
//!
//! # fn main() -> conduit_core::Result<()> {
//! let config = ConduitConfig::load(Some(Path::new("config/conduit.toml")))?;
//! let stage_config = config.stage.to_stage_config()?;
//! let retry = config.retry.to_retry_template()?;
//! # Ok(())
//! # }
//! ```

pub mod loader;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::constants::system;
use crate::error::{ConduitError, Result};
use crate::resilience::{
    ExponentialBackoffPolicyTemplate, NoRetryPolicyTemplate, RetryPolicyTemplate, RetryTemplate,
    SimpleRetryPolicyTemplate,
};
use crate::routing::CorrelatorConfig;
use crate::seda::StageConfig;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConduitConfig {
    pub stage: StageSettings,
    pub retry: RetrySettings,
    pub correlation: CorrelationSettings,
}

/// Queue and worker pool sizing for SEDA stages
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StageSettings {
    pub queue_capacity: usize,
    pub worker_count: usize,
    /// Required; `0` means enqueue fails immediately when the queue is full
    pub enqueue_timeout_ms: Option<u64>,
    pub drain_timeout_ms: u64,
}

impl Default for StageSettings {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            worker_count: 16,
            enqueue_timeout_ms: None,
            drain_timeout_ms: system::DEFAULT_DRAIN_TIMEOUT.as_millis() as u64,
        }
    }
}

impl StageSettings {
    pub fn validate(&self) -> Result<()> {
        if self.enqueue_timeout_ms.is_none() {
            return Err(ConduitError::Configuration(
                "stage.enqueue_timeout_ms must be set explicitly".to_string(),
            ));
        }
        self.to_stage_config()?.validate()
    }

    pub fn to_stage_config(&self) -> Result<StageConfig> {
        let enqueue_timeout = self.enqueue_timeout_ms.ok_or_else(|| {
            ConduitError::Configuration("stage.enqueue_timeout_ms must be set explicitly".to_string())
        })?;
        Ok(StageConfig::new(
            self.queue_capacity,
            self.worker_count,
            Duration::from_millis(enqueue_timeout),
        )
        .with_drain_timeout(Duration::from_millis(self.drain_timeout_ms)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RetryPolicyKind {
    None,
    #[default]
    Simple,
    Exponential,
}

/// Retry strategy; which fields apply depends on `policy`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct RetrySettings {
    pub policy: RetryPolicyKind,
    /// `simple`: retries after the first attempt, `-1` for forever
    pub count: i32,
    /// `simple`: pause between attempts
    pub frequency_ms: u64,
    /// `exponential`: total attempts including the first
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        let simple = SimpleRetryPolicyTemplate::default();
        let exponential = ExponentialBackoffPolicyTemplate::default();
        Self {
            policy: RetryPolicyKind::Simple,
            count: simple.count,
            frequency_ms: simple.frequency.as_millis() as u64,
            max_attempts: exponential.max_attempts,
            initial_delay_ms: exponential.initial_delay.as_millis() as u64,
            multiplier: exponential.multiplier,
            max_delay_ms: exponential.max_delay.as_millis() as u64,
        }
    }
}

impl RetrySettings {
    pub fn validate(&self) -> Result<()> {
        match self.policy {
            RetryPolicyKind::None => Ok(()),
            RetryPolicyKind::Simple => self.simple().validate(),
            RetryPolicyKind::Exponential => self.exponential().validate(),
        }
    }

    pub fn to_policy_template(&self) -> Result<Arc<dyn RetryPolicyTemplate>> {
        self.validate()?;
        Ok(match self.policy {
            RetryPolicyKind::None => Arc::new(NoRetryPolicyTemplate),
            RetryPolicyKind::Simple => Arc::new(self.simple()),
            RetryPolicyKind::Exponential => Arc::new(self.exponential()),
        })
    }

    pub fn to_retry_template(&self) -> Result<RetryTemplate> {
        Ok(RetryTemplate::from_arc(self.to_policy_template()?))
    }

    fn simple(&self) -> SimpleRetryPolicyTemplate {
        SimpleRetryPolicyTemplate::new(self.count, Duration::from_millis(self.frequency_ms))
    }

    fn exponential(&self) -> ExponentialBackoffPolicyTemplate {
        ExponentialBackoffPolicyTemplate::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
        )
        .with_multiplier(self.multiplier)
        .with_max_delay(Duration::from_millis(self.max_delay_ms))
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CorrelationSettings {
    /// Expire incomplete groups after this long; unset disables expiry
    pub timeout_ms: Option<u64>,
    pub fail_on_timeout: bool,
    pub max_processed_groups: usize,
    pub store_responses: bool,
}

impl Default for CorrelationSettings {
    fn default() -> Self {
        let defaults = CorrelatorConfig::default();
        Self {
            timeout_ms: None,
            fail_on_timeout: defaults.fail_on_timeout,
            max_processed_groups: defaults.max_processed_groups,
            store_responses: defaults.store_responses,
        }
    }
}

impl CorrelationSettings {
    pub fn to_correlator_config(&self, name: impl Into<String>) -> CorrelatorConfig {
        CorrelatorConfig {
            name: name.into(),
            timeout: self.timeout_ms.map(Duration::from_millis),
            fail_on_timeout: self.fail_on_timeout,
            max_processed_groups: self.max_processed_groups,
            store_responses: self.store_responses,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.to_correlator_config("validation").validate()
    }
}

impl ConduitConfig {
    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.stage.validate()?;
        self.retry.validate()?;
        self.correlation.validate()?;
        Ok(())
    }

    /// Defaults overridden by individual environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(capacity) = env_value("CONDUIT_QUEUE_CAPACITY")? {
            config.stage.queue_capacity = capacity;
        }
        if let Some(workers) = env_value("CONDUIT_WORKER_COUNT")? {
            config.stage.worker_count = workers;
        }
        if let Some(timeout) = env_value("CONDUIT_ENQUEUE_TIMEOUT_MS")? {
            config.stage.enqueue_timeout_ms = Some(timeout);
        }
        if let Some(count) = env_value("CONDUIT_RETRY_COUNT")? {
            config.retry.count = count;
        }
        if let Some(frequency) = env_value("CONDUIT_RETRY_FREQUENCY_MS")? {
            config.retry.frequency_ms = frequency;
        }
        if let Some(timeout) = env_value("CONDUIT_CORRELATION_TIMEOUT_MS")? {
            config.correlation.timeout_ms = Some(timeout);
        }

        Ok(config)
    }
}

fn env_value<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| ConduitError::Configuration(format!("Invalid {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
