//! Scheduler knobs

use std::time::Duration;

/// Configuration for the classification scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    /// Items per model call.
    pub batch_size: usize,
    /// Request bucket capacity per minute.
    pub max_requests_per_minute: f64,
    /// Token bucket capacity per minute.
    pub max_tokens_per_minute: f64,
    /// Invocations allowed per request before it is abandoned.
    pub max_attempts: u32,
    /// Pause applied after the most recent rate-limit signal.
    pub rate_limit_cooldown: Duration,
    /// Fresh batches dispatched between checkpoints and progress lines.
    pub checkpoint_interval: usize,
    /// Wait before a checkpoint so in-flight calls can land.
    pub checkpoint_settle: Duration,
    /// Idle sleep between loop iterations.
    pub poll_interval: Duration,
    /// Extra tokens budgeted per item for the reply.
    pub per_item_token_overhead: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            max_requests_per_minute: 100.0,
            max_tokens_per_minute: 200_000.0,
            max_attempts: 5,
            rate_limit_cooldown: Duration::from_secs(15),
            checkpoint_interval: 10,
            checkpoint_settle: Duration::from_millis(250),
            poll_interval: Duration::from_millis(1),
            per_item_token_overhead: 100,
        }
    }
}

impl SchedulerConfig {
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn with_rate_limits(mut self, requests_per_minute: f64, tokens_per_minute: f64) -> Self {
        self.max_requests_per_minute = requests_per_minute;
        self.max_tokens_per_minute = tokens_per_minute;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown = cooldown;
        self
    }

    pub fn with_checkpoint_interval(mut self, batches: usize) -> Self {
        self.checkpoint_interval = batches;
        self
    }

    pub fn with_checkpoint_settle(mut self, settle: Duration) -> Self {
        self.checkpoint_settle = settle;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}
