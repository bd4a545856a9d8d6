//! One classification call and its retry lifecycle
//!
//! A request wraps one batch. It is invoked, its reply is validated against
//! the batch size, and the outcome is resolved into success, another attempt
//! on the retry queue, or abandonment with one fallback record per item.

use std::time::Instant;

use serde_json::Value;

use crate::domain::{Domain, Record};
use crate::llm::{InvokeError, ModelClient, looks_like_rate_limit};

use super::status::StatusTracker;

/// A contiguous slice of the backlog sent in one call
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    pub index: usize,
    pub items: Vec<Record>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Failure classes accounted separately by the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimit,
    Api,
    Format,
}

/// A failed attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct RequestFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl RequestFailure {
    pub fn format(message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::Format,
            message: message.into(),
        }
    }
}

impl From<InvokeError> for RequestFailure {
    fn from(err: InvokeError) -> Self {
        let message = err.to_string();
        let kind = if err.is_rate_limit() || looks_like_rate_limit(&message) {
            FailureKind::RateLimit
        } else {
            FailureKind::Api
        };
        Self { kind, message }
    }
}

/// What the scheduler does with a request after an attempt
#[derive(Debug)]
pub enum Resolution {
    /// Parsed items to append to the results
    Succeeded(Vec<Record>),
    /// Put back on the retry queue
    Retry(ClassificationRequest),
    /// Out of attempts; one fallback record per item
    Abandoned(Vec<Record>),
}

/// A batch in flight, with its retry budget
#[derive(Debug, Clone)]
pub struct ClassificationRequest {
    /// Dispatch order, unique within a run
    pub sequence_id: u64,
    pub batch: Batch,
    pub user_prompt: String,
    pub token_estimate: u64,
    pub attempts_remaining: u32,
    pub attempts_made: u32,
    pub last_error: Option<String>,
}

impl ClassificationRequest {
    pub fn new(sequence_id: u64, batch: Batch, user_prompt: String, token_estimate: u64, max_attempts: u32) -> Self {
        Self {
            sequence_id,
            batch,
            user_prompt,
            token_estimate,
            attempts_remaining: max_attempts.max(1),
            attempts_made: 0,
            last_error: None,
        }
    }

    /// Make one call and validate the reply
    pub async fn execute<C: ModelClient + ?Sized>(
        &self,
        client: &C,
        system_prompt: &str,
    ) -> Result<Vec<Record>, RequestFailure> {
        let text = client.invoke(system_prompt, &self.user_prompt).await?;
        parse_items(&text, self.batch.len())
    }

    /// Apply the outcome of one attempt to the tracker and decide what's next
    pub fn resolve(
        mut self,
        outcome: Result<Vec<Record>, RequestFailure>,
        domain: Domain,
        status: &mut StatusTracker,
        now: Instant,
    ) -> Resolution {
        self.attempts_made += 1;
        let batch_label = domain.batch_label(&self.batch.items);

        match outcome {
            Ok(items) => {
                status.succeed();
                tracing::debug!(
                    batch = self.batch.index,
                    first_id = %batch_label,
                    attempts = self.attempts_made,
                    "Batch classified"
                );
                Resolution::Succeeded(items)
            }
            Err(failure) => {
                status.record_failure(failure.kind, now);
                self.attempts_remaining = self.attempts_remaining.saturating_sub(1);

                if self.attempts_remaining > 0 {
                    tracing::warn!(
                        batch = self.batch.index,
                        first_id = %batch_label,
                        kind = ?failure.kind,
                        attempts_remaining = self.attempts_remaining,
                        error = %failure.message,
                        "Batch failed, retrying"
                    );
                    self.last_error = Some(failure.message);
                    Resolution::Retry(self)
                } else {
                    tracing::error!(
                        batch = self.batch.index,
                        first_id = %batch_label,
                        kind = ?failure.kind,
                        attempts = self.attempts_made,
                        error = %failure.message,
                        "Batch abandoned"
                    );
                    status.fail();
                    let fallback = self
                        .batch
                        .items
                        .iter()
                        .map(|item| domain.fallback_record(item, &failure.message))
                        .collect();
                    Resolution::Abandoned(fallback)
                }
            }
        }
    }
}

/// Strip one surrounding Markdown code fence and whitespace
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Parse a reply into exactly `expected` JSON objects
pub fn parse_items(text: &str, expected: usize) -> Result<Vec<Record>, RequestFailure> {
    let body = strip_code_fence(text);
    let value: Value =
        serde_json::from_str(body).map_err(|e| RequestFailure::format(format!("Reply is not valid JSON: {}", e)))?;

    let Value::Array(items) = value else {
        return Err(RequestFailure::format("Reply is not a JSON array"));
    };

    if items.len() != expected {
        return Err(RequestFailure::format(format!(
            "Reply has {} items, expected {}",
            items.len(),
            expected
        )));
    }

    items
        .into_iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => Ok(map),
            _ => Err(RequestFailure::format(format!("Reply item {} is not a JSON object", i + 1))),
        })
        .collect()
}
