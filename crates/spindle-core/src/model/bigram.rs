//! Lookup-table bigram language model
//!
//! The logits of the next token depend only on the previous token. Tokens
//! without an entry in `transitions` use the `default` row. Every logit not
//! listed is `base_logit`.

use super::LanguageModel;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// File name of the bigram weights inside a model directory
pub const WEIGHTS_FILE: &str = "weights.json";

/// On-disk layout of `weights.json`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BigramWeights {
    #[serde(default = "default_base_logit")]
    pub base_logit: f32,

    /// Row used for tokens without their own transition
    #[serde(default)]
    pub default: Vec<(u32, f32)>,

    #[serde(default)]
    pub transitions: Vec<Transition>,
}

fn default_base_logit() -> f32 {
    -10.0
}

/// Logits following one token
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transition {
    pub after: u32,
    pub next: Vec<(u32, f32)>,
}

pub struct BigramModel {
    name: String,
    vocab_size: usize,
    context_length: usize,
    base_logit: f32,
    default_row: Vec<(u32, f32)>,
    rows: HashMap<u32, Vec<(u32, f32)>>,
}

impl BigramModel {
    pub fn new(
        name: impl Into<String>,
        vocab_size: usize,
        context_length: usize,
        weights: BigramWeights,
    ) -> Result<Self> {
        let check = |id: u32| -> Result<()> {
            if id as usize >= vocab_size {
                return Err(CoreError::model(
                    "WEIGHTS_TOKEN_OUT_OF_RANGE",
                    format!("Token id {} in {} is outside the vocabulary", id, WEIGHTS_FILE),
                    format!("Vocabulary size: {}", vocab_size),
                    "Regenerate the weights for this tokenizer",
                ));
            }
            Ok(())
        };

        for &(id, _) in &weights.default {
            check(id)?;
        }
        let mut rows = HashMap::with_capacity(weights.transitions.len());
        for transition in weights.transitions {
            check(transition.after)?;
            for &(id, _) in &transition.next {
                check(id)?;
            }
            rows.insert(transition.after, transition.next);
        }

        Ok(Self {
            name: name.into(),
            vocab_size,
            context_length,
            base_logit: weights.base_logit,
            default_row: weights.default,
            rows,
        })
    }

    /// Load weights from a `weights.json` file
    pub fn from_file(
        path: &Path,
        name: impl Into<String>,
        vocab_size: usize,
        context_length: usize,
    ) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::model_with_path(
                "WEIGHTS_READ_ERROR",
                format!("Failed to read {}: {}", WEIGHTS_FILE, e),
                "Model weight loading",
                "Check file path and permissions",
                path,
            )
        })?;
        let weights: BigramWeights = serde_json::from_str(&content).map_err(|e| {
            CoreError::model_with_path(
                "WEIGHTS_INVALID",
                format!("Failed to parse {}: {}", WEIGHTS_FILE, e),
                "Model weight loading",
                "Expected `base_logit`, `default` and `transitions` entries",
                path,
            )
        })?;
        Self::new(name, vocab_size, context_length, weights)
    }
}

impl LanguageModel for BigramModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    fn context_length(&self) -> usize {
        self.context_length
    }

    fn forward(&self, input_ids: &[u32]) -> Result<Vec<f32>> {
        let last = input_ids.last().copied().ok_or_else(|| {
            CoreError::generation(
                "EMPTY_INPUT_SEQUENCE",
                "Forward pass needs at least one token",
                "Bigram forward pass",
                "Seed the generator with the encoded prompt first",
            )
        })?;

        let row = self.rows.get(&last).unwrap_or(&self.default_row);
        let mut logits = vec![self.base_logit; self.vocab_size];
        for &(id, logit) in row {
            logits[id as usize] = logit;
        }
        Ok(logits)
    }
}
