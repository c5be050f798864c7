//! # System Constants
//!
//! Well-known event property names and operational defaults shared by the
//! chain, stage, retry and correlation modules.

/// Event property names understood by the core
pub mod properties {
    /// Number of parts the correlation group is expected to contain
    pub const CORRELATION_GROUP_SIZE: &str = "correlation_group_size";
    /// Zero-based position of this part within its group
    pub const CORRELATION_SEQUENCE: &str = "correlation_sequence";
    /// Marks the final part of a group when the size is not known up front
    pub const CORRELATION_LAST: &str = "correlation_last";
    /// Dispatch key read by the operation router
    pub const OPERATION: &str = "operation";
    /// Name of the stage that produced a reply
    pub const REPLY_FROM_STAGE: &str = "reply_from_stage";
}

/// Lifecycle notifications emitted through tracing
pub mod events {
    pub const STAGE_STARTED: &str = "stage.started";
    pub const STAGE_PAUSED: &str = "stage.paused";
    pub const STAGE_RESUMED: &str = "stage.resumed";
    pub const STAGE_STOPPED: &str = "stage.stopped";
    pub const WORK_FAILED: &str = "stage.work_failed";

    pub const RETRY_ATTEMPT_FAILED: &str = "retry.attempt_failed";
    pub const RETRY_SUCCEEDED: &str = "retry.succeeded";
    pub const RETRY_EXHAUSTED: &str = "retry.exhausted";
    pub const RETRY_CANCELLED: &str = "retry.cancelled";

    pub const CORRELATION_AGGREGATED: &str = "correlation.aggregated";
    pub const CORRELATION_TIMEOUT: &str = "correlation.timeout";
    pub const MISSED_ASYNC_REPLY: &str = "correlation.missed_async_reply";
}

/// Operational defaults
pub mod system {
    use std::time::Duration;

    /// Ids of aggregated groups remembered for late-event detection
    pub const MAX_PROCESSED_GROUPS: usize = 50_000;
    /// How often the correlation timeout monitor scans active groups
    pub const TIMEOUT_MONITOR_INTERVAL: Duration = Duration::from_millis(100);
    /// How long a stopping stage waits for in-flight work
    pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
    /// Retry count meaning "never give up"
    pub const RETRY_COUNT_FOREVER: i32 = -1;
}
