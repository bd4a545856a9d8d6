//! Leaky-bucket rate budget
//!
//! Two independent buckets, one for requests and one for tokens, each
//! refilled continuously at its per-minute capacity. Only the scheduler loop
//! touches the budget, so there is no locking.

use std::time::Instant;

const SECONDS_PER_MINUTE: f64 = 60.0;

/// Request and token buckets for admission control.
#[derive(Debug, Clone)]
pub struct RateBudget {
    request_capacity: f64,
    token_capacity: f64,
    available_requests: f64,
    available_tokens: f64,
    last_refill: Instant,
}

impl RateBudget {
    /// Create a full budget starting now.
    pub fn new(requests_per_minute: f64, tokens_per_minute: f64) -> Self {
        Self::with_start(requests_per_minute, tokens_per_minute, Instant::now())
    }

    /// Create a full budget with an explicit refill origin.
    ///
    /// Capacities below one are raised to one so the budget always admits
    /// eventually.
    pub fn with_start(requests_per_minute: f64, tokens_per_minute: f64, start: Instant) -> Self {
        let request_capacity = sanitize_capacity(requests_per_minute);
        let token_capacity = sanitize_capacity(tokens_per_minute);
        Self {
            request_capacity,
            token_capacity,
            available_requests: request_capacity,
            available_tokens: token_capacity,
            last_refill: start,
        }
    }

    /// Top up both buckets for the time elapsed since the last refill.
    pub fn refill(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_refill).as_secs_f64();
        if elapsed <= 0.0 {
            return;
        }

        self.available_requests =
            (self.available_requests + self.request_capacity * elapsed / SECONDS_PER_MINUTE).min(self.request_capacity);
        self.available_tokens =
            (self.available_tokens + self.token_capacity * elapsed / SECONDS_PER_MINUTE).min(self.token_capacity);
        self.last_refill = now;
    }

    /// Whether a request costing `cost` tokens fits right now.
    pub fn can_admit(&self, cost: u64) -> bool {
        self.available_requests >= 1.0 && self.available_tokens >= self.effective_cost(cost)
    }

    /// Consume one request and the token cost.
    pub fn admit(&mut self, cost: u64) {
        self.available_requests = (self.available_requests - 1.0).max(0.0);
        self.available_tokens = (self.available_tokens - self.effective_cost(cost)).max(0.0);
    }

    /// Cost capped at the token capacity, so an oversized request is admitted
    /// once the bucket is full.
    pub fn effective_cost(&self, cost: u64) -> f64 {
        (cost as f64).min(self.token_capacity)
    }

    pub fn exceeds_capacity(&self, cost: u64) -> bool {
        cost as f64 > self.token_capacity
    }

    pub fn available_requests(&self) -> f64 {
        self.available_requests
    }

    pub fn available_tokens(&self) -> f64 {
        self.available_tokens
    }

    pub fn request_capacity(&self) -> f64 {
        self.request_capacity
    }

    pub fn token_capacity(&self) -> f64 {
        self.token_capacity
    }
}

fn sanitize_capacity(value: f64) -> f64 {
    if value.is_finite() { value.max(1.0) } else { 1.0 }
}
