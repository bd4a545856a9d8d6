//! cs-classify - batch classification of customer-service inquiries
//!
//! Inquiries are grouped into fixed-size batches and sent to a chat model
//! under request and token rate limits. Failed batches are retried, progress
//! is checkpointed so interrupted runs resume, and the labels are merged back
//! onto the original records.

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod domain;
pub mod error;
pub mod llm;
pub mod scheduler;

pub use error::{ClassifyError, Result};
