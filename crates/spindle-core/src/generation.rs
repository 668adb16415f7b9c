//! Generation parameters, search options and run statistics

pub mod sampler;

use crate::{validation::Validator, CoreError, Result};
use serde::{Deserialize, Serialize};

/// Named search options as accepted from configuration files and callers.
///
/// Every field is optional; unset fields fall back to the next layer
/// (see [`SearchOptions::overlay`]) and finally to the engine defaults.
/// Unknown option names are rejected rather than ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SearchOptions {
    /// Cap on the total sequence length (prompt plus generated tokens)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,

    /// Number of sequences processed together (only 1 is supported)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_size: Option<usize>,

    /// Top-p (nucleus) sampling threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Top-k sampling candidate pool size
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,

    /// Temperature for sampling (0.0 = greedy)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Sample from the distribution instead of picking the best token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub do_sample: Option<bool>,

    /// Repetition penalty (1.0 = no penalty)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetition_penalty: Option<f32>,

    /// Random seed for reproducible sampling
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub random_seed: Option<u64>,
}

impl SearchOptions {
    /// Parse options from a JSON object, rejecting unknown names
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| {
            CoreError::invalid_input(
                "SEARCH_OPTIONS_INVALID",
                format!("Invalid search options: {}", e),
                "Search option parsing",
                "Recognized options: max_length, batch_size, top_p, top_k, temperature, \
                 do_sample, repetition_penalty, random_seed",
            )
        })
    }

    /// Layer `other` on top of `self`; fields set in `other` win
    pub fn overlay(&self, other: &SearchOptions) -> SearchOptions {
        SearchOptions {
            max_length: other.max_length.or(self.max_length),
            batch_size: other.batch_size.or(self.batch_size),
            top_p: other.top_p.or(self.top_p),
            top_k: other.top_k.or(self.top_k),
            temperature: other.temperature.or(self.temperature),
            do_sample: other.do_sample.or(self.do_sample),
            repetition_penalty: other.repetition_penalty.or(self.repetition_penalty),
            random_seed: other.random_seed.or(self.random_seed),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == SearchOptions::default()
    }
}

/// Validated, immutable generation parameters for one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeneratorParams {
    max_length: usize,
    batch_size: usize,
    top_p: f32,
    top_k: usize,
    temperature: f32,
    do_sample: bool,
    repetition_penalty: f32,
    random_seed: Option<u64>,
}

impl Default for GeneratorParams {
    fn default() -> Self {
        Self {
            max_length: 2048,
            batch_size: 1,
            top_p: 0.9,
            top_k: 50,
            temperature: 1.0,
            do_sample: false,
            repetition_penalty: 1.0,
            random_seed: None,
        }
    }
}

impl GeneratorParams {
    /// Build parameters from search options over the defaults, validating the result
    pub fn new(options: &SearchOptions) -> Result<Self> {
        let defaults = Self::default();
        let params = Self {
            max_length: options.max_length.unwrap_or(defaults.max_length),
            batch_size: options.batch_size.unwrap_or(defaults.batch_size),
            top_p: options.top_p.unwrap_or(defaults.top_p),
            top_k: options.top_k.unwrap_or(defaults.top_k),
            temperature: options.temperature.unwrap_or(defaults.temperature),
            do_sample: options.do_sample.unwrap_or(defaults.do_sample),
            repetition_penalty: options
                .repetition_penalty
                .unwrap_or(defaults.repetition_penalty),
            random_seed: options.random_seed,
        };

        Validator::validate_generation_config(
            Some(params.max_length),
            Some(params.batch_size),
            Some(params.temperature),
            Some(params.top_p),
            Some(params.top_k),
            Some(params.repetition_penalty),
        )?;

        Ok(params)
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn top_p(&self) -> f32 {
        self.top_p
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn do_sample(&self) -> bool {
        self.do_sample
    }

    pub fn repetition_penalty(&self) -> f32 {
        self.repetition_penalty
    }

    pub fn random_seed(&self) -> Option<u64> {
        self.random_seed
    }

    /// Whether token selection is a plain argmax
    pub fn is_greedy(&self) -> bool {
        !self.do_sample || self.temperature == 0.0
    }
}

/// Statistics about one generation run
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStats {
    /// Number of tokens in the encoded prompt
    pub prompt_tokens: usize,

    /// Tokens produced by the engine
    pub tokens_generated: usize,

    /// Non-empty fragments handed to the caller
    pub fragments_emitted: usize,

    /// Time from run start to the first emitted fragment (ms)
    pub time_to_first_token_ms: Option<f64>,

    /// Total run time (ms)
    pub total_time_ms: f64,

    /// Tokens per second
    pub tokens_per_second: f64,
}
