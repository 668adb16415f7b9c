//! Vocabulary management for tokenizers
//!
//! A vocabulary is an ordered list of pieces (the id of a piece is its
//! position). Three kinds of pieces are told apart:
//! - special tokens such as `<|user|>`, matched verbatim and decoded to nothing,
//! - byte-fallback tokens written `<0xNN>`, each standing for one raw byte,
//! - ordinary text pieces, where `▁` stands for a space.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Space marker used inside ordinary pieces
pub const SPACE_MARKER: char = '\u{2581}';

/// On-disk layout of `tokenizer.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenizerFile {
    /// Pieces in id order
    pub pieces: Vec<String>,
    /// Pieces that are special tokens
    #[serde(default)]
    pub special_tokens: Vec<String>,
    #[serde(default)]
    pub unk_token: Option<String>,
    #[serde(default)]
    pub bos_token: Option<String>,
    #[serde(default)]
    pub eos_token: Option<String>,
    #[serde(default)]
    pub pad_token: Option<String>,
}

/// Vocabulary container for managing piece-to-id and id-to-piece mappings
#[derive(Debug, Clone)]
pub struct Vocabulary {
    /// Ordinary text piece to ID mapping
    text_pieces: HashMap<String, u32>,

    /// ID to piece mapping
    id_to_token: Vec<String>,

    /// Special tokens
    special_tokens: HashMap<String, u32>,

    /// Byte value to byte-fallback token ID
    byte_tokens: HashMap<u8, u32>,

    /// Byte-fallback token ID to byte value
    token_bytes: HashMap<u32, u8>,

    unk_token_id: Option<u32>,
    bos_token_id: Option<u32>,
    eos_token_id: Option<u32>,
    pad_token_id: Option<u32>,

    /// Length in chars of the longest ordinary piece
    max_piece_chars: usize,
}

impl Vocabulary {
    /// Build a vocabulary from its on-disk description
    pub fn from_tokenizer_file(file: TokenizerFile) -> Result<Self> {
        if file.pieces.is_empty() {
            return Err(CoreError::configuration(
                "TOKENIZER_EMPTY_VOCAB",
                "Tokenizer vocabulary is empty",
                "Vocabulary construction",
                "Provide at least one piece in tokenizer.json",
            ));
        }

        let mut seen: HashMap<&str, u32> = HashMap::with_capacity(file.pieces.len());
        for (idx, piece) in file.pieces.iter().enumerate() {
            if piece.is_empty() {
                return Err(CoreError::configuration(
                    "TOKENIZER_EMPTY_PIECE",
                    format!("Piece {} is empty", idx),
                    "Vocabulary construction",
                    "Remove empty pieces from tokenizer.json",
                ));
            }
            if seen.insert(piece.as_str(), idx as u32).is_some() {
                return Err(CoreError::configuration(
                    "TOKENIZER_DUPLICATE_PIECE",
                    format!("Piece {:?} appears more than once", piece),
                    "Vocabulary construction",
                    "Every piece in tokenizer.json must be unique",
                ));
            }
        }

        let lookup = |name: &str| -> Result<u32> {
            seen.get(name).copied().ok_or_else(|| {
                CoreError::configuration(
                    "TOKENIZER_UNKNOWN_SPECIAL",
                    format!("Special token {:?} is not in the piece list", name),
                    "Vocabulary construction",
                    "Add the token to `pieces` or remove it from the special token settings",
                )
            })
        };

        let mut special_tokens = HashMap::new();
        for name in &file.special_tokens {
            special_tokens.insert(name.clone(), lookup(name)?);
        }

        let mut resolve = |name: &Option<String>| -> Result<Option<u32>> {
            match name {
                Some(name) => {
                    let id = lookup(name)?;
                    special_tokens.insert(name.clone(), id);
                    Ok(Some(id))
                }
                None => Ok(None),
            }
        };
        let unk_token_id = resolve(&file.unk_token)?;
        let bos_token_id = resolve(&file.bos_token)?;
        let eos_token_id = resolve(&file.eos_token)?;
        let pad_token_id = resolve(&file.pad_token)?;

        let mut text_pieces = HashMap::new();
        let mut byte_tokens = HashMap::new();
        let mut token_bytes = HashMap::new();
        let mut max_piece_chars = 0;

        for (idx, piece) in file.pieces.iter().enumerate() {
            let id = idx as u32;
            if special_tokens.contains_key(piece) {
                continue;
            }
            if let Some(byte) = parse_byte_piece(piece) {
                byte_tokens.insert(byte, id);
                token_bytes.insert(id, byte);
                continue;
            }
            max_piece_chars = max_piece_chars.max(piece.chars().count());
            text_pieces.insert(piece.clone(), id);
        }

        Ok(Self {
            text_pieces,
            id_to_token: file.pieces,
            special_tokens,
            byte_tokens,
            token_bytes,
            unk_token_id,
            bos_token_id,
            eos_token_id,
            pad_token_id,
            max_piece_chars,
        })
    }

    /// Load vocabulary from a `tokenizer.json` file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::model_with_path(
                "TOKENIZER_FILE_READ_ERROR",
                format!("Failed to read tokenizer file: {}", e),
                "Tokenizer loading",
                "Check file path and permissions",
                path,
            )
        })?;
        Self::from_json_str(&content).map_err(|e| {
            CoreError::model_with_path(
                "TOKENIZER_FILE_INVALID",
                e.to_string(),
                "Tokenizer loading",
                "Check the tokenizer.json layout: pieces, special_tokens, eos_token",
                path,
            )
        })
    }

    /// Load vocabulary from JSON text
    pub fn from_json_str(json: &str) -> Result<Self> {
        let file: TokenizerFile = serde_json::from_str(json).map_err(|e| {
            CoreError::configuration(
                "TOKENIZER_JSON_INVALID",
                format!("Failed to parse tokenizer JSON: {}", e),
                "Vocabulary parsing",
                "Check file format and encoding",
            )
        })?;
        Self::from_tokenizer_file(file)
    }

    /// Get the vocabulary size
    pub fn size(&self) -> usize {
        self.id_to_token.len()
    }

    /// Look up an ordinary text piece
    pub fn piece_id(&self, piece: &str) -> Option<u32> {
        self.text_pieces.get(piece).copied()
    }

    /// Get the piece for an ID
    pub fn id_to_token(&self, id: u32) -> Option<&str> {
        self.id_to_token.get(id as usize).map(|s| s.as_str())
    }

    /// Byte-fallback token for a raw byte
    pub fn byte_token(&self, byte: u8) -> Option<u32> {
        self.byte_tokens.get(&byte).copied()
    }

    /// Raw byte carried by a byte-fallback token
    pub fn token_byte(&self, id: u32) -> Option<u8> {
        self.token_bytes.get(&id).copied()
    }

    pub fn has_byte_fallback(&self) -> bool {
        !self.byte_tokens.is_empty()
    }

    pub fn is_special_token(&self, id: u32) -> bool {
        self.special_tokens.values().any(|&special| special == id)
    }

    pub fn special_tokens(&self) -> &HashMap<String, u32> {
        &self.special_tokens
    }

    /// Earliest special token in `text`, preferring the longest at equal position.
    /// Returns `(byte offset, token id, byte length)`.
    pub fn find_special(&self, text: &str) -> Option<(usize, u32, usize)> {
        let mut best: Option<(usize, u32, usize)> = None;
        for (name, &id) in &self.special_tokens {
            if let Some(pos) = text.find(name.as_str()) {
                let better = match best {
                    None => true,
                    Some((best_pos, _, best_len)) => {
                        pos < best_pos || (pos == best_pos && name.len() > best_len)
                    }
                };
                if better {
                    best = Some((pos, id, name.len()));
                }
            }
        }
        best
    }

    pub fn max_piece_chars(&self) -> usize {
        self.max_piece_chars
    }

    pub fn unk_token_id(&self) -> Option<u32> {
        self.unk_token_id
    }

    pub fn bos_token_id(&self) -> Option<u32> {
        self.bos_token_id
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    pub fn pad_token_id(&self) -> Option<u32> {
        self.pad_token_id
    }
}

/// Parse a `<0xNN>` byte-fallback piece
pub fn parse_byte_piece(piece: &str) -> Option<u8> {
    let hex = piece.strip_prefix("<0x")?.strip_suffix('>')?;
    if hex.len() != 2 {
        return None;
    }
    u8::from_str_radix(hex, 16).ok()
}
