//! SentencePiece-style tokenizer over a piece vocabulary
//!
//! Encoding splits out special tokens first, maps spaces to `▁` and then
//! takes the longest matching piece at every position. Characters without a
//! piece fall back to `<0xNN>` byte tokens, then to the unknown token; if
//! neither exists the text cannot be encoded.

use super::stream::TokenStream;
use super::vocab::{Vocabulary, SPACE_MARKER};
use super::{DecodeStream, Tokenizer};
use crate::{codes, CoreError, Result};
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

/// Tokenizer backed by a [`Vocabulary`]
#[derive(Debug, Clone)]
pub struct VocabTokenizer {
    vocab: Vocabulary,
}

impl VocabTokenizer {
    pub fn new(vocab: Vocabulary) -> Self {
        Self { vocab }
    }

    /// Load the tokenizer from a `tokenizer.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let vocab = Vocabulary::from_file(path)?;
        debug!(
            "Loaded tokenizer from {} ({} pieces, byte fallback: {})",
            path.display(),
            vocab.size(),
            vocab.has_byte_fallback()
        );
        Ok(Self::new(vocab))
    }

    pub fn vocab(&self) -> &Vocabulary {
        &self.vocab
    }

    /// Create the concrete streaming decoder
    pub fn stream(&self) -> TokenStream<'_> {
        TokenStream::new(&self.vocab)
    }

    fn encode_text(&self, text: &str) -> Result<Vec<u32>> {
        let mut ids = Vec::with_capacity(text.len() / 2 + 1);
        let mut rest = text;

        while !rest.is_empty() {
            match self.vocab.find_special(rest) {
                Some((pos, id, len)) => {
                    self.encode_segment(&rest[..pos], &mut ids)?;
                    ids.push(id);
                    rest = &rest[pos + len..];
                }
                None => {
                    self.encode_segment(rest, &mut ids)?;
                    break;
                }
            }
        }

        Ok(ids)
    }

    fn encode_segment(&self, segment: &str, ids: &mut Vec<u32>) -> Result<()> {
        let chars: Vec<char> = segment
            .chars()
            .map(|c| if c == ' ' { SPACE_MARKER } else { c })
            .collect();

        let mut i = 0;
        while i < chars.len() {
            let longest = self.vocab.max_piece_chars().min(chars.len() - i);
            let mut matched = None;
            let mut candidate = String::new();
            for len in (1..=longest).rev() {
                candidate.clear();
                candidate.extend(&chars[i..i + len]);
                if let Some(id) = self.vocab.piece_id(&candidate) {
                    matched = Some((id, len));
                    break;
                }
            }

            match matched {
                Some((id, len)) => {
                    ids.push(id);
                    i += len;
                }
                None => {
                    let original = if chars[i] == SPACE_MARKER { ' ' } else { chars[i] };
                    self.encode_fallback(original, ids)?;
                    i += 1;
                }
            }
        }

        Ok(())
    }

    fn encode_fallback(&self, c: char, ids: &mut Vec<u32>) -> Result<()> {
        let mut buf = [0u8; 4];
        let bytes = c.encode_utf8(&mut buf).as_bytes();
        let byte_ids: Option<Vec<u32>> = bytes.iter().map(|&b| self.vocab.byte_token(b)).collect();

        if let Some(byte_ids) = byte_ids {
            ids.extend(byte_ids);
            return Ok(());
        }

        if let Some(unk) = self.vocab.unk_token_id() {
            ids.push(unk);
            return Ok(());
        }

        Err(CoreError::encoding(
            codes::TOKENIZER_UNSUPPORTED_CHAR,
            format!("Character {:?} (U+{:04X}) is not supported by the tokenizer", c, c as u32),
            "Prompt encoding",
            "Remove or replace characters the model vocabulary cannot represent",
        ))
    }
}

#[async_trait]
impl Tokenizer for VocabTokenizer {
    async fn encode(&self, text: &str) -> Result<Vec<u32>> {
        self.encode_text(text)
    }

    async fn decode(&self, tokens: &[u32]) -> Result<String> {
        let mut stream = self.stream();
        let mut text = String::new();
        for &token in tokens {
            text.push_str(&stream.decode(token)?);
        }
        if stream.pending_bytes() > 0 {
            text.push(char::REPLACEMENT_CHARACTER);
        }
        Ok(text)
    }

    fn create_stream(&self) -> Box<dyn DecodeStream + '_> {
        Box::new(self.stream())
    }

    fn vocab_size(&self) -> usize {
        self.vocab.size()
    }

    fn eos_token_id(&self) -> Option<u32> {
        self.vocab.eos_token_id()
    }

    fn is_special_token(&self, id: u32) -> bool {
        self.vocab.is_special_token(id)
    }

    fn id_to_token(&self, id: u32) -> Option<&str> {
        self.vocab.id_to_token(id)
    }
}
