//! Token counting for budget decisions.
//!
//! Counts are budget estimates, not billing truth. The only hard
//! requirement is stability: the same text always prices the same,
//! so threshold comparisons cannot flap between turns.

pub trait TokenMeter: Send + Sync {
    /// Estimated token count for `text`. Deterministic per input.
    fn count(&self, text: &str) -> usize;
}

/// chars/4 heuristic, minimum 1 for non-empty text.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicMeter;

impl TokenMeter for HeuristicMeter {
    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        (text.chars().count() / 4).max(1)
    }
}

/// Wraps a primary counting function and falls back to the heuristic
/// when the primary fails. A tokenizer hiccup must never stall the
/// budget loop.
pub struct GuardedMeter<F> {
    primary: F,
    fallback: HeuristicMeter,
}

impl<F> GuardedMeter<F>
where
    F: Fn(&str) -> Option<usize> + Send + Sync,
{
    pub fn new(primary: F) -> Self {
        Self {
            primary,
            fallback: HeuristicMeter,
        }
    }
}

impl<F> TokenMeter for GuardedMeter<F>
where
    F: Fn(&str) -> Option<usize> + Send + Sync,
{
    fn count(&self, text: &str) -> usize {
        match (self.primary)(text) {
            Some(n) => n,
            None => {
                tracing::debug!("primary token meter failed, using heuristic");
                self.fallback.count(text)
            }
        }
    }
}
