//! The scheduler control loop
//!
//! One loop owns all mutable run state: the fresh backlog, the retry queue,
//! the rate budget, the status counters and the results. Each admitted
//! request runs as its own tokio task and reports back with a single
//! `CallCompleted` event, so calls never touch shared state.
//!
//! Per iteration the loop:
//! 1. Applies completion events and reaps tasks that died without one
//! 2. Picks a candidate, retries first
//! 3. Refills the budget and dispatches the candidate if it fits and no
//!    rate-limit cooldown is running
//! 4. Checkpoints every `checkpoint_interval` fresh batches
//! 5. Exits once nothing is queued, held or in flight
//! 6. Sleeps for the poll interval, then for any rate-limit cooldown

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::checkpoint::CheckpointStore;
use crate::domain::{Domain, Record, render_user_message};
use crate::llm::ModelClient;

use super::budget::RateBudget;
use super::config::SchedulerConfig;
use super::request::{Batch, ClassificationRequest, FailureKind, RequestFailure, Resolution};
use super::status::StatusTracker;
use super::tokens::TokenEstimator;

const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Event sent from a call task back to the loop.
#[derive(Debug)]
struct CallCompleted {
    request: ClassificationRequest,
    outcome: Result<Vec<Record>, RequestFailure>,
}

/// Handle to a running call task.
struct InFlight {
    handle: JoinHandle<()>,
    request: ClassificationRequest,
}

/// Summary of a finished run.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// Every result record, including fallbacks and checkpointed results
    pub results: Vec<Record>,
    pub status: StatusTracker,
    pub total_batches: usize,
    /// Batches skipped because a checkpoint already covered them
    pub resumed_batches: usize,
    pub elapsed: Duration,
}

/// Mutable state of one run, owned by the loop.
struct RunState {
    status: StatusTracker,
    budget: RateBudget,
    backlog: VecDeque<Batch>,
    retry_queue: VecDeque<ClassificationRequest>,
    candidate: Option<ClassificationRequest>,
    in_flight: HashMap<u64, InFlight>,
    results: Vec<Record>,
    completed: BTreeSet<usize>,
    total_batches: usize,
    next_sequence: u64,
    fresh_dispatched: usize,
    event_tx: mpsc::Sender<CallCompleted>,
    event_rx: mpsc::Receiver<CallCompleted>,
}

impl RunState {
    fn is_finished(&self) -> bool {
        self.status.is_settled()
            && self.backlog.is_empty()
            && self.retry_queue.is_empty()
            && self.candidate.is_none()
            && self.in_flight.is_empty()
    }
}

/// Batches records, paces calls against the rate budget, retries failures
/// and checkpoints progress.
pub struct Scheduler<C: ModelClient + ?Sized + 'static> {
    config: SchedulerConfig,
    client: Arc<C>,
    domain: Domain,
    estimator: TokenEstimator,
    checkpoint: Option<CheckpointStore>,
}

impl<C: ModelClient + ?Sized + 'static> Scheduler<C> {
    pub fn new(config: SchedulerConfig, client: Arc<C>, domain: Domain) -> Self {
        Self {
            config,
            client,
            domain,
            estimator: TokenEstimator::default(),
            checkpoint: None,
        }
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_checkpoint(mut self, store: CheckpointStore) -> Self {
        self.checkpoint = Some(store);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Classify every record and return all result records.
    ///
    /// Individual request failures never abort the run; they end up as
    /// fallback records.
    pub async fn run(&self, records: Vec<Record>, system_prompt: &str) -> RunReport {
        let started_at = Instant::now();
        let batch_size = self.config.batch_size.max(1);

        let batches: Vec<Batch> = records
            .chunks(batch_size)
            .enumerate()
            .map(|(index, items)| Batch {
                index,
                items: items.to_vec(),
            })
            .collect();
        let total_batches = batches.len();

        let (completed, results) = self.restore(total_batches);
        let resumed_batches = completed.len();
        let backlog: VecDeque<Batch> = batches.into_iter().filter(|b| !completed.contains(&b.index)).collect();

        tracing::info!(
            domain = %self.domain,
            model = self.client.model(),
            records = records.len(),
            total_batches,
            resumed_batches,
            pending_batches = backlog.len(),
            "Starting classification run"
        );

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let mut state = RunState {
            status: StatusTracker::new(),
            budget: RateBudget::new(self.config.max_requests_per_minute, self.config.max_tokens_per_minute),
            backlog,
            retry_queue: VecDeque::new(),
            candidate: None,
            in_flight: HashMap::new(),
            results,
            completed,
            total_batches,
            next_sequence: 0,
            fresh_dispatched: 0,
            event_tx,
            event_rx,
        };

        let system: Arc<str> = Arc::from(system_prompt);
        let system_tokens = self.estimator.estimate(system_prompt);

        loop {
            self.process_events(&mut state);
            self.reap_completed(&mut state).await;

            if state.candidate.is_none() {
                state.candidate = self.next_request(&mut state, system_tokens);
            }

            let now = Instant::now();
            state.budget.refill(now);

            let cooling = state
                .status
                .cooldown_remaining(self.config.rate_limit_cooldown, now)
                .is_some();

            if let Some(candidate) = state.candidate.take() {
                if !cooling && state.budget.can_admit(candidate.token_estimate) {
                    let fresh = candidate.attempts_made == 0;
                    self.dispatch(&mut state, candidate, &system);
                    if fresh {
                        state.fresh_dispatched += 1;
                        self.after_fresh_dispatch(&mut state).await;
                    }
                } else {
                    state.candidate = Some(candidate);
                }
            }

            if state.is_finished() {
                break;
            }

            tokio::time::sleep(self.config.poll_interval).await;

            if let Some(remaining) = state
                .status
                .cooldown_remaining(self.config.rate_limit_cooldown, Instant::now())
            {
                tracing::info!(cooldown_ms = remaining.as_millis() as u64, "Rate limited, cooling down");
                tokio::time::sleep(remaining).await;
            }
        }

        if let Some(store) = &self.checkpoint {
            if let Err(e) = store.clear() {
                log::warn!("Failed to remove checkpoint {}: {}", store.path().display(), e);
            }
        }

        state.status.log_status();
        let elapsed = started_at.elapsed();
        tracing::info!(
            results = state.results.len(),
            succeeded = state.status.num_tasks_succeeded,
            failed = state.status.num_tasks_failed,
            elapsed_secs = elapsed.as_secs_f64(),
            "Classification run complete"
        );

        RunReport {
            results: state.results,
            status: state.status,
            total_batches,
            resumed_batches,
            elapsed,
        }
    }

    /// Completed batches and results from a compatible checkpoint.
    fn restore(&self, total_batches: usize) -> (BTreeSet<usize>, Vec<Record>) {
        let Some(checkpoint) = self.checkpoint.as_ref().and_then(|store| store.load()) else {
            return (BTreeSet::new(), Vec::new());
        };

        if checkpoint.total_batches != total_batches {
            log::warn!(
                "Discarding checkpoint for {} batches; this run has {} batches",
                checkpoint.total_batches,
                total_batches
            );
            return (BTreeSet::new(), Vec::new());
        }

        let completed = checkpoint.completed_set();
        log::info!(
            "Resuming from checkpoint: {}/{} batches done, {} results",
            completed.len(),
            total_batches,
            checkpoint.results.len()
        );
        (completed, checkpoint.results)
    }

    /// Non-blocking receive of all pending completion events.
    fn process_events(&self, state: &mut RunState) {
        while let Ok(event) = state.event_rx.try_recv() {
            state.in_flight.remove(&event.request.sequence_id);
            self.apply_outcome(state, event.request, event.outcome);
        }
    }

    /// Reap finished call tasks; a task that panicked never sent its event,
    /// so its attempt counts as failed.
    async fn reap_completed(&self, state: &mut RunState) {
        let finished: Vec<u64> = state
            .in_flight
            .iter()
            .filter(|(_, call)| call.handle.is_finished())
            .map(|(id, _)| *id)
            .collect();

        for id in finished {
            let Some(call) = state.in_flight.remove(&id) else {
                continue;
            };
            if let Err(e) = call.handle.await {
                tracing::error!(sequence_id = id, error = ?e, "Call task panicked");
                let failure = RequestFailure {
                    kind: FailureKind::Api,
                    message: format!("Call task failed: {}", e),
                };
                self.apply_outcome(state, call.request, Err(failure));
            }
        }
    }

    fn apply_outcome(
        &self,
        state: &mut RunState,
        request: ClassificationRequest,
        outcome: Result<Vec<Record>, RequestFailure>,
    ) {
        let index = request.batch.index;
        match request.resolve(outcome, self.domain, &mut state.status, Instant::now()) {
            Resolution::Succeeded(items) | Resolution::Abandoned(items) => {
                state.results.extend(items);
                state.completed.insert(index);
            }
            Resolution::Retry(request) => state.retry_queue.push_back(request),
        }
    }

    /// Next request to dispatch: retries first, then the next fresh batch.
    fn next_request(&self, state: &mut RunState, system_tokens: u64) -> Option<ClassificationRequest> {
        if let Some(retry) = state.retry_queue.pop_front() {
            return Some(retry);
        }

        let batch = state.backlog.pop_front()?;
        let user_prompt = render_user_message(self.domain, &batch.items);
        let cost = system_tokens
            + self.estimator.estimate(&user_prompt)
            + self.config.per_item_token_overhead * batch.len() as u64;

        let sequence_id = state.next_sequence;
        state.next_sequence += 1;
        state.status.start();

        Some(ClassificationRequest::new(
            sequence_id,
            batch,
            user_prompt,
            cost,
            self.config.max_attempts,
        ))
    }

    /// Consume budget and spawn the call task.
    fn dispatch(&self, state: &mut RunState, request: ClassificationRequest, system: &Arc<str>) {
        if state.budget.exceeds_capacity(request.token_estimate) {
            tracing::warn!(
                batch = request.batch.index,
                tokens = request.token_estimate,
                capacity = state.budget.token_capacity(),
                "Request exceeds the per-minute token budget"
            );
        }
        state.budget.admit(request.token_estimate);

        tracing::debug!(
            batch = request.batch.index,
            sequence_id = request.sequence_id,
            attempt = request.attempts_made + 1,
            tokens = request.token_estimate,
            "Dispatching batch"
        );

        let client = Arc::clone(&self.client);
        let system = Arc::clone(system);
        let event_tx = state.event_tx.clone();
        let call = request.clone();

        let handle = tokio::spawn(async move {
            let outcome = call.execute(client.as_ref(), &system).await;
            let _ = event_tx.send(CallCompleted { request: call, outcome }).await;
        });

        state.in_flight.insert(request.sequence_id, InFlight { handle, request });
    }

    /// Progress line and checkpoint cadence for fresh batches.
    async fn after_fresh_dispatch(&self, state: &mut RunState) {
        let interval = self.config.checkpoint_interval;
        let on_interval = interval > 0 && state.fresh_dispatched % interval == 0;
        let last_batch = state.backlog.is_empty();

        if on_interval || last_batch {
            let pending = state.backlog.len();
            let dispatched = state.total_batches - pending;
            let percent = if state.total_batches == 0 {
                100.0
            } else {
                (dispatched as f64 * 1000.0 / state.total_batches as f64).round() / 10.0
            };
            tracing::info!(
                dispatched,
                total = state.total_batches,
                percent,
                "Batch progress"
            );
            state.status.log_status();
        }

        if on_interval {
            self.save_checkpoint(state).await;
        }
    }

    /// Let in-flight calls land, then persist a snapshot.
    async fn save_checkpoint(&self, state: &mut RunState) {
        let Some(store) = &self.checkpoint else {
            return;
        };

        tokio::time::sleep(self.config.checkpoint_settle).await;
        self.process_events(state);

        let snapshot = store.snapshot(&state.completed, state.total_batches, &state.results);
        match store.save(&snapshot) {
            Ok(()) => tracing::info!(
                completed_batches = snapshot.completed_batches.len(),
                results = snapshot.results.len(),
                "Checkpoint saved"
            ),
            Err(e) => log::warn!("Failed to save checkpoint {}: {}", store.path().display(), e),
        }
    }
}
