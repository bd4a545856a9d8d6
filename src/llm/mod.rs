//! LLM Client Layer - model invocation for the classification scheduler
//!
//! This module provides:
//! - ModelClient trait, the opaque `invoke(system, user)` call
//! - InvokeError, the typed failure the scheduler matches on
//! - AzureOpenAiClient implementation

pub mod azure;
pub mod client;

pub use azure::{AzureConfig, AzureOpenAiClient};
pub use client::{InvokeError, ModelClient, looks_like_rate_limit};
