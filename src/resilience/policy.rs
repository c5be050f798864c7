//! # Retry Policies
//!
//! A [`RetryPolicyTemplate`] is the shareable description of a strategy; each
//! campaign asks it for a fresh [`RetryPolicy`] because policies carry
//! countdown state and must never be shared between concurrent campaigns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::constants::system::RETRY_COUNT_FOREVER;
use crate::error::{ConduitError, Result};

/// Decision returned after each failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyStatus {
    /// Try again once `delay` has passed
    Retry { delay: Duration },
    /// Give up
    Exhausted,
}

/// Stateful decision function owned by a single campaign
pub trait RetryPolicy: Send {
    fn apply_policy(&mut self, failure: &ConduitError) -> PolicyStatus;
}

/// Factory for per-campaign policies
pub trait RetryPolicyTemplate: Send + Sync + fmt::Debug {
    fn create_retry_instance(&self) -> Box<dyn RetryPolicy>;
}

/// Single attempt, never retries
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoRetryPolicyTemplate;

impl RetryPolicyTemplate for NoRetryPolicyTemplate {
    fn create_retry_instance(&self) -> Box<dyn RetryPolicy> {
        Box::new(NoRetryPolicy)
    }
}

struct NoRetryPolicy;

impl RetryPolicy for NoRetryPolicy {
    fn apply_policy(&mut self, _failure: &ConduitError) -> PolicyStatus {
        PolicyStatus::Exhausted
    }
}

/// Fixed number of retries after the first attempt, at a fixed frequency.
///
/// A `count` of [`RETRY_COUNT_FOREVER`] retries until cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimpleRetryPolicyTemplate {
    pub count: i32,
    #[serde(with = "millis")]
    pub frequency: Duration,
}

impl SimpleRetryPolicyTemplate {
    pub const DEFAULT_RETRY_COUNT: i32 = 2;
    pub const DEFAULT_FREQUENCY: Duration = Duration::from_millis(2000);

    pub fn new(count: i32, frequency: Duration) -> Self {
        Self { count, frequency }
    }

    pub fn forever(frequency: Duration) -> Self {
        Self::new(RETRY_COUNT_FOREVER, frequency)
    }

    pub fn is_forever(&self) -> bool {
        self.count == RETRY_COUNT_FOREVER
    }

    pub fn validate(&self) -> Result<()> {
        if self.count < RETRY_COUNT_FOREVER {
            return Err(ConduitError::Configuration(format!(
                "retry count must be >= 0 or {RETRY_COUNT_FOREVER} (forever), got {}",
                self.count
            )));
        }
        Ok(())
    }
}

impl Default for SimpleRetryPolicyTemplate {
    fn default() -> Self {
        Self::new(Self::DEFAULT_RETRY_COUNT, Self::DEFAULT_FREQUENCY)
    }
}

impl RetryPolicyTemplate for SimpleRetryPolicyTemplate {
    fn create_retry_instance(&self) -> Box<dyn RetryPolicy> {
        Box::new(SimpleRetryPolicy {
            remaining: self.count,
            frequency: self.frequency,
        })
    }
}

struct SimpleRetryPolicy {
    remaining: i32,
    frequency: Duration,
}

impl RetryPolicy for SimpleRetryPolicy {
    fn apply_policy(&mut self, _failure: &ConduitError) -> PolicyStatus {
        if self.remaining == RETRY_COUNT_FOREVER {
            return PolicyStatus::Retry {
                delay: self.frequency,
            };
        }
        if self.remaining <= 0 {
            return PolicyStatus::Exhausted;
        }
        self.remaining -= 1;
        PolicyStatus::Retry {
            delay: self.frequency,
        }
    }
}

/// Bounded attempts with exponentially growing, capped delays
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExponentialBackoffPolicyTemplate {
    /// Total attempts including the first
    pub max_attempts: u32,
    #[serde(with = "millis")]
    pub initial_delay: Duration,
    pub multiplier: f64,
    #[serde(with = "millis")]
    pub max_delay: Duration,
}

impl ExponentialBackoffPolicyTemplate {
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Self::default()
        }
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(i32::MAX as u32) as i32;
        let scaled = self.initial_delay.as_secs_f64() * self.multiplier.powi(exponent);
        if !scaled.is_finite() || scaled >= self.max_delay.as_secs_f64() {
            self.max_delay
        } else {
            Duration::from_secs_f64(scaled.max(0.0))
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(ConduitError::Configuration(
                "max_attempts must be greater than 0".to_string(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(ConduitError::Configuration(format!(
                "backoff multiplier must be >= 1.0, got {}",
                self.multiplier
            )));
        }
        if self.max_delay < self.initial_delay {
            return Err(ConduitError::Configuration(
                "max_delay must not be shorter than initial_delay".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ExponentialBackoffPolicyTemplate {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            multiplier: 2.0,
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicyTemplate for ExponentialBackoffPolicyTemplate {
    fn create_retry_instance(&self) -> Box<dyn RetryPolicy> {
        Box::new(ExponentialBackoffPolicy {
            template: *self,
            failures: 0,
        })
    }
}

struct ExponentialBackoffPolicy {
    template: ExponentialBackoffPolicyTemplate,
    failures: u32,
}

impl RetryPolicy for ExponentialBackoffPolicy {
    fn apply_policy(&mut self, _failure: &ConduitError) -> PolicyStatus {
        self.failures += 1;
        if self.failures >= self.template.max_attempts {
            PolicyStatus::Exhausted
        } else {
            PolicyStatus::Retry {
                delay: self.template.delay_for(self.failures),
            }
        }
    }
}

/// Durations as integer milliseconds in config files
pub(crate) mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
