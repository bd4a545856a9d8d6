//! Rate-limited batch scheduler for classification calls.
//!
//! This module provides:
//! - **TokenEstimator**: sizes prompts for admission control.
//! - **RateBudget**: request and token leaky buckets refilled per minute.
//! - **ClassificationRequest**: one batch, one call at a time, with a retry budget.
//! - **StatusTracker**: per-run counters, including rate-limit cooldown state.
//! - **Scheduler**: the control loop that dispatches, retries and checkpoints.
//!
//! # Architecture
//!
//! The scheduler uses a polling model:
//! 1. The loop drains completion events from finished calls
//! 2. It selects a retry or the next fresh batch
//! 3. Admitted requests are spawned as async tasks
//! 4. Tasks report back via a channel; the loop is the only writer
//!
//! # Example
//!
//! ```ignore
//! use cs_classify::scheduler::{Scheduler, SchedulerConfig};
//!
//! let scheduler = Scheduler::new(SchedulerConfig::default(), client, Domain::Package)
//!     .with_checkpoint(store);
//! let report = scheduler.run(records, &system_prompt).await;
//! ```

mod budget;
mod config;
mod core;
mod request;
mod status;
mod tokens;

pub use budget::RateBudget;
pub use config::SchedulerConfig;
pub use self::core::{RunReport, Scheduler};
pub use request::{Batch, ClassificationRequest, FailureKind, RequestFailure, Resolution, parse_items, strip_code_fence};
pub use status::StatusTracker;
pub use tokens::TokenEstimator;
