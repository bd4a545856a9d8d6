//! Token estimation for admission sizing
//!
//! With the `tiktoken` feature the exact `cl100k_base` count is used. The
//! fallback counts two characters per token, which errs on the high side
//! for Hangul-heavy text.

use std::fmt;
#[cfg(feature = "tiktoken")]
use std::sync::Arc;

#[cfg(feature = "tiktoken")]
use tiktoken_rs::CoreBPE;

/// Estimates how many tokens a prompt will consume
#[derive(Clone)]
pub enum TokenEstimator {
    /// Exact subword count
    #[cfg(feature = "tiktoken")]
    Bpe(Arc<CoreBPE>),
    /// `max(1, chars / 2)`
    CharApprox,
}

impl TokenEstimator {
    /// Pick the exact tokenizer when compiled in and loadable
    pub fn detect() -> Self {
        #[cfg(feature = "tiktoken")]
        {
            match tiktoken_rs::cl100k_base() {
                Ok(bpe) => {
                    log::info!("Token estimation: cl100k_base tokenizer");
                    return TokenEstimator::Bpe(Arc::new(bpe));
                }
                Err(e) => {
                    log::warn!("Failed to load cl100k_base tokenizer, using character estimate: {}", e);
                }
            }
        }

        log::info!("Token estimation: character approximation");
        TokenEstimator::CharApprox
    }

    /// The character-count strategy
    pub fn approximate() -> Self {
        TokenEstimator::CharApprox
    }

    /// Estimated token count, never below 1
    pub fn estimate(&self, text: &str) -> u64 {
        let count = match self {
            #[cfg(feature = "tiktoken")]
            TokenEstimator::Bpe(bpe) => bpe.encode_with_special_tokens(text).len() as u64,
            TokenEstimator::CharApprox => text.chars().count() as u64 / 2,
        };
        count.max(1)
    }

    pub fn is_exact(&self) -> bool {
        !matches!(self, TokenEstimator::CharApprox)
    }
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self::approximate()
    }
}

impl fmt::Debug for TokenEstimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(feature = "tiktoken")]
            TokenEstimator::Bpe(_) => write!(f, "TokenEstimator::Bpe(cl100k_base)"),
            TokenEstimator::CharApprox => write!(f, "TokenEstimator::CharApprox"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_approx() {
        let estimator = TokenEstimator::approximate();
        assert!(!estimator.is_exact());
        assert_eq!(estimator.estimate(""), 1);
        assert_eq!(estimator.estimate("a"), 1);
        assert_eq!(estimator.estimate("abcdef"), 3);
        // Counted by characters, not bytes
        assert_eq!(estimator.estimate("예약변경"), 2);
    }

    #[test]
    fn test_detect_never_returns_zero() {
        let estimator = TokenEstimator::detect();
        assert!(estimator.estimate("") >= 1);
        assert!(estimator.estimate("hello world, this is a longer sentence") >= 1);
    }
}
