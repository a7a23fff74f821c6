//! Token estimation utilities.
//!
//! Uses a character-based heuristic: ~4 characters per token, rounded up.
//! Packing sums per-row estimates, so a counter must be subadditive
//! (`count(a + b) <= count(a) + count(b)`) for batch ceilings to hold.

/// Counts tokens in a piece of context text.
pub trait TokenCounter: Send + Sync {
    fn count(&self, text: &str) -> usize;
}

/// Estimate the token count for a string.
///
/// Heuristic: 1 token ≈ 4 characters. Rounds up.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    text.len().div_ceil(4)
}

/// The default counter, backed by [`estimate_tokens`].
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        estimate_tokens(text)
    }
}
