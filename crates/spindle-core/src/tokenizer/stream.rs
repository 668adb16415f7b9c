//! Incremental detokenization
//!
//! A single token does not always map to whole characters: byte-fallback
//! tokens carry one raw byte each, so a multi-byte glyph only becomes text
//! once its last byte has arrived. [`TokenStream`] keeps the incomplete tail
//! between calls and releases text at glyph boundaries.

use super::vocab::{Vocabulary, SPACE_MARKER};
use super::DecodeStream;
use crate::{codes, CoreError, Result};
use tracing::trace;

/// Stateful decoder bound to one generation run
pub struct TokenStream<'a> {
    vocab: &'a Vocabulary,
    /// Bytes of a glyph that is not complete yet
    pending: Vec<u8>,
}

impl<'a> TokenStream<'a> {
    pub fn new(vocab: &'a Vocabulary) -> Self {
        Self {
            vocab,
            pending: Vec::with_capacity(8),
        }
    }

    /// Drain the longest decodable prefix of the pending bytes.
    ///
    /// Invalid sequences become U+FFFD; an incomplete trailing sequence is
    /// kept for the next call.
    fn drain_complete(&mut self) -> String {
        let mut text = String::new();
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(valid) => {
                    text.push_str(valid);
                    self.pending.clear();
                    return text;
                }
                Err(e) => {
                    let valid_up_to = e.valid_up_to();
                    // from_utf8 just validated this prefix
                    text.push_str(&String::from_utf8_lossy(&self.pending[..valid_up_to]));
                    match e.error_len() {
                        Some(invalid_len) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            self.pending.drain(..valid_up_to + invalid_len);
                        }
                        None => {
                            self.pending.drain(..valid_up_to);
                            return text;
                        }
                    }
                }
            }
        }
    }
}

impl DecodeStream for TokenStream<'_> {
    fn decode(&mut self, token_id: u32) -> Result<String> {
        let piece = self.vocab.id_to_token(token_id).ok_or_else(|| {
            CoreError::decoding(
                codes::TOKENIZER_UNKNOWN_TOKEN,
                format!("Token id {} is outside the vocabulary", token_id),
                format!("Streaming decode (vocabulary size {})", self.vocab.size()),
                "Check that the model and tokenizer come from the same model directory",
                Some(token_id),
            )
        })?;

        if self.vocab.is_special_token(token_id) {
            trace!("Skipping special token {} ({})", token_id, piece);
            return Ok(String::new());
        }

        match self.vocab.token_byte(token_id) {
            Some(byte) => self.pending.push(byte),
            None => {
                let text = piece.replace(SPACE_MARKER, " ");
                self.pending.extend_from_slice(text.as_bytes());
            }
        }

        Ok(self.drain_complete())
    }

    fn pending_bytes(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::vocab::TokenizerFile;

    fn vocab() -> Vocabulary {
        let pieces = [
            "<|end|>", "<0xC3>", "<0xA9>", "<0xE2>", "<0x82>", "<0xAC>", "caf", "\u{2581}ok", "!",
        ];
        Vocabulary::from_tokenizer_file(TokenizerFile {
            pieces: pieces.iter().map(|p| p.to_string()).collect(),
            eos_token: Some("<|end|>".to_string()),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_whole_pieces_decode_immediately() {
        let vocab = vocab();
        let mut stream = TokenStream::new(&vocab);
        assert_eq!(stream.decode(7).unwrap(), " ok");
        assert_eq!(stream.decode(8).unwrap(), "!");
        assert_eq!(stream.pending_bytes(), 0);
    }

    #[test]
    fn test_multibyte_glyph_waits_for_last_byte() {
        let vocab = vocab();
        let mut stream = TokenStream::new(&vocab);
        assert_eq!(stream.decode(6).unwrap(), "caf");
        assert_eq!(stream.decode(1).unwrap(), "");
        assert_eq!(stream.pending_bytes(), 1);
        assert_eq!(stream.decode(2).unwrap(), "\u{e9}");

        // three-byte euro sign
        assert_eq!(stream.decode(3).unwrap(), "");
        assert_eq!(stream.decode(4).unwrap(), "");
        assert_eq!(stream.decode(5).unwrap(), "\u{20ac}");
        assert_eq!(stream.pending_bytes(), 0);
    }

    #[test]
    fn test_broken_sequence_becomes_replacement_char() {
        let vocab = vocab();
        let mut stream = TokenStream::new(&vocab);
        assert_eq!(stream.decode(1).unwrap(), "");
        // a text piece interrupts the two-byte sequence
        assert_eq!(stream.decode(8).unwrap(), "\u{fffd}!");
        // a stray continuation byte is invalid on its own
        assert_eq!(stream.decode(2).unwrap(), "\u{fffd}");
    }

    #[test]
    fn test_special_tokens_decode_to_nothing() {
        let vocab = vocab();
        let mut stream = TokenStream::new(&vocab);
        assert_eq!(stream.decode(0).unwrap(), "");
    }

    #[test]
    fn test_unknown_token_is_error() {
        let vocab = vocab();
        let mut stream = TokenStream::new(&vocab);
        let err = stream.decode(99).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Decoding);
        assert_eq!(err.code(), codes::TOKENIZER_UNKNOWN_TOKEN);
    }

    #[test]
    fn test_streams_do_not_share_state() {
        let vocab = vocab();
        let mut first = TokenStream::new(&vocab);
        let mut second = TokenStream::new(&vocab);
        assert_eq!(first.decode(1).unwrap(), "");
        assert_eq!(second.decode(8).unwrap(), "!");
        assert_eq!(first.decode(2).unwrap(), "\u{e9}");
    }
}
