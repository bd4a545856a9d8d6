//! Per-run progress counters

use std::time::{Duration, Instant};

use serde::Serialize;

use super::request::FailureKind;

/// Counters for one scheduler run.
///
/// `succeeded + failed + in_progress == started` holds after every
/// accounting step. Retries do not touch `in_progress`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusTracker {
    pub num_tasks_started: u64,
    pub num_tasks_in_progress: u64,
    pub num_tasks_succeeded: u64,
    pub num_tasks_failed: u64,
    pub num_rate_limit_errors: u64,
    pub num_api_errors: u64,
    pub num_format_errors: u64,
    #[serde(skip)]
    pub last_rate_limit_at: Option<Instant>,
}

impl StatusTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// A request was created for a fresh batch.
    pub fn start(&mut self) {
        self.num_tasks_started += 1;
        self.num_tasks_in_progress += 1;
    }

    pub fn succeed(&mut self) {
        self.num_tasks_succeeded += 1;
        self.num_tasks_in_progress = self.num_tasks_in_progress.saturating_sub(1);
    }

    /// A request was abandoned after its last attempt.
    pub fn fail(&mut self) {
        self.num_tasks_failed += 1;
        self.num_tasks_in_progress = self.num_tasks_in_progress.saturating_sub(1);
    }

    /// Count one failed attempt by kind; rate limits stamp the cooldown clock.
    pub fn record_failure(&mut self, kind: FailureKind, now: Instant) {
        match kind {
            FailureKind::RateLimit => {
                self.num_rate_limit_errors += 1;
                self.last_rate_limit_at = Some(now);
            }
            FailureKind::Api => self.num_api_errors += 1,
            FailureKind::Format => self.num_format_errors += 1,
        }
    }

    /// Time left before calls may resume after the latest rate limit.
    pub fn cooldown_remaining(&self, window: Duration, now: Instant) -> Option<Duration> {
        let since = now.saturating_duration_since(self.last_rate_limit_at?);
        if since < window { Some(window - since) } else { None }
    }

    pub fn is_settled(&self) -> bool {
        self.num_tasks_in_progress == 0
    }

    pub fn log_status(&self) {
        tracing::info!(
            started = self.num_tasks_started,
            in_progress = self.num_tasks_in_progress,
            succeeded = self.num_tasks_succeeded,
            failed = self.num_tasks_failed,
            rate_limit_errors = self.num_rate_limit_errors,
            api_errors = self.num_api_errors,
            format_errors = self.num_format_errors,
            "Scheduler status"
        );
    }
}
