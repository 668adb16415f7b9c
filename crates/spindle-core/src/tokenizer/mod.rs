//! Tokenizer module for text tokenization
//!
//! This module converts prompt text into token ids and turns produced token
//! ids back into text. Decoding during generation goes through a
//! [`DecodeStream`], which holds the partial-glyph state of a single run.

pub mod sentencepiece;
pub mod stream;
pub mod vocab;

pub use sentencepiece::VocabTokenizer;
pub use stream::TokenStream;
pub use vocab::Vocabulary;

use crate::Result;
use async_trait::async_trait;

/// Main tokenizer trait that all tokenizer implementations must implement
#[async_trait]
pub trait Tokenizer: Send + Sync {
    /// Encode text into a sequence of token IDs
    async fn encode(&self, text: &str) -> Result<Vec<u32>>;

    /// Decode a complete sequence of token IDs back into text
    async fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Create a fresh streaming decoder; each run gets its own
    fn create_stream(&self) -> Box<dyn DecodeStream + '_>;

    /// Get the vocabulary size
    fn vocab_size(&self) -> usize;

    /// Get the end of sequence token ID
    fn eos_token_id(&self) -> Option<u32>;

    /// Check if a token ID is a special token
    fn is_special_token(&self, id: u32) -> bool;

    /// Get token string by ID
    fn id_to_token(&self, id: u32) -> Option<&str>;
}

/// Incremental decoder for one generation run
///
/// `decode` returns the text that became complete with this token, which may
/// be empty while a multi-byte glyph is still being assembled.
pub trait DecodeStream: Send {
    fn decode(&mut self, token_id: u32) -> Result<String>;

    /// Bytes held back waiting for the rest of a glyph
    fn pending_bytes(&self) -> usize;
}
