//! Language model trait and implementations

pub mod bigram;
pub mod loader;

pub use bigram::BigramModel;

use crate::Result;

/// Numerical boundary of the engine: a model maps a token sequence to the
/// logits of the next token.
pub trait LanguageModel: Send + Sync {
    /// Get the model name
    fn name(&self) -> &str;

    /// Get vocabulary size
    fn vocab_size(&self) -> usize;

    /// Get maximum context length
    fn context_length(&self) -> usize;

    /// Forward pass through the model.
    /// Returns `vocab_size` logits for the token following `input_ids`.
    fn forward(&self, input_ids: &[u32]) -> Result<Vec<f32>>;
}
