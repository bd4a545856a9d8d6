//! Model invocation contract used by the scheduler
//!
//! The scheduler only needs one thing from an LLM backend: send a system
//! prompt plus a user prompt, get raw text back or a typed failure.

use async_trait::async_trait;

/// Substrings that identify a rate-limit failure when the backend did not
/// report one explicitly (matched case-insensitively).
/// A bare status code is only trusted next to a status marker.
const RATE_LIMIT_SIGNATURES: &[&str] = &[
    "rate limit",
    "rate_limit",
    "ratelimit",
    "too many requests",
    "http 429",
    "error code: 429",
    "status code 429",
    "status: 429",
];

/// Stateless chat-completion backend - each call is independent
#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Run one completion with the given system and user prompts
    async fn invoke(&self, system: &str, user: &str) -> Result<String, InvokeError>;

    /// Model or deployment name, for logging
    fn model(&self) -> &str;
}

/// Ways a single invocation can fail
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvokeError {
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Request timed out: {0}")]
    Timeout(String),
}

impl InvokeError {
    /// Whether this failure should be accounted as a rate-limit signal.
    /// Transport errors whose message carries a rate-limit signature count too.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            InvokeError::RateLimited(_) => true,
            InvokeError::Transport(message) | InvokeError::Timeout(message) => looks_like_rate_limit(message),
        }
    }
}

/// Check an error message against the known rate-limit signatures
pub fn looks_like_rate_limit(message: &str) -> bool {
    let lower = message.to_lowercase();
    RATE_LIMIT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}
