//! Generation engine capability traits and the sampling engine
//!
//! A [`GenerationEngine`] hands out [`Generator`]s, one per run. A generator
//! is seeded once with the prompt tokens and then produces one token per
//! call to [`Generator::generate_next_token`] until its stop policy says it
//! is done.

use crate::generation::sampler::LogitsSampler;
use crate::generation::GeneratorParams;
use crate::model::LanguageModel;
use crate::{codes, CoreError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Per-run token generator owned by a single session
#[async_trait]
pub trait Generator: Send {
    /// Seed the generator with the prompt tokens
    fn append_tokens(&mut self, tokens: &[u32]) -> Result<()>;

    /// Whether the stop policy has been reached
    fn is_done(&self) -> bool;

    /// Produce exactly one more token per sequence
    async fn generate_next_token(&mut self) -> Result<()>;

    /// Newest token of every sequence; empty before the first step
    fn next_tokens(&self) -> &[u32];
}

/// Factory for generators
pub trait GenerationEngine: Send + Sync {
    fn name(&self) -> &str;

    fn create_generator(&self, params: &GeneratorParams) -> Result<Box<dyn Generator>>;
}

/// Engine that samples next tokens from any [`LanguageModel`]
pub struct SamplingModel {
    model: Arc<dyn LanguageModel>,
    eos_token_ids: Vec<u32>,
}

impl SamplingModel {
    pub fn new(model: Arc<dyn LanguageModel>, eos_token_ids: Vec<u32>) -> Self {
        Self {
            model,
            eos_token_ids,
        }
    }

    pub fn model(&self) -> &Arc<dyn LanguageModel> {
        &self.model
    }

    pub fn eos_token_ids(&self) -> &[u32] {
        &self.eos_token_ids
    }
}

impl GenerationEngine for SamplingModel {
    fn name(&self) -> &str {
        self.model.name()
    }

    fn create_generator(&self, params: &GeneratorParams) -> Result<Box<dyn Generator>> {
        debug!(
            "Creating generator for {} (max_length={}, greedy={})",
            self.model.name(),
            params.max_length(),
            params.is_greedy()
        );
        Ok(Box::new(SamplingGenerator::new(
            Arc::clone(&self.model),
            params,
            self.eos_token_ids.clone(),
        )))
    }
}

/// Generator that runs a forward pass and samples one token per step.
///
/// Stops once the whole sequence (prompt included) reaches `max_length`, the
/// model context is full, or an EOS token was produced.
pub struct SamplingGenerator {
    model: Arc<dyn LanguageModel>,
    sampler: LogitsSampler,
    eos_token_ids: Vec<u32>,
    max_length: usize,
    sequence: Vec<u32>,
    prompt_len: usize,
    next: Vec<u32>,
    eos_reached: bool,
}

impl SamplingGenerator {
    pub fn new(model: Arc<dyn LanguageModel>, params: &GeneratorParams, eos_token_ids: Vec<u32>) -> Self {
        let max_length = params.max_length().min(model.context_length());
        Self {
            model,
            sampler: LogitsSampler::new(params),
            eos_token_ids,
            max_length,
            sequence: Vec::new(),
            prompt_len: 0,
            next: Vec::with_capacity(1),
            eos_reached: false,
        }
    }

    fn is_seeded(&self) -> bool {
        self.prompt_len > 0
    }
}

#[async_trait]
impl Generator for SamplingGenerator {
    fn append_tokens(&mut self, tokens: &[u32]) -> Result<()> {
        if self.is_seeded() {
            return Err(CoreError::session(
                codes::SESSION_ALREADY_SEEDED,
                "Generator already holds a prompt",
                "Appending prompt tokens",
                "Create a new generator for every prompt",
                None,
            ));
        }
        if tokens.is_empty() {
            return Err(CoreError::invalid_input(
                "EMPTY_TOKEN_SEQUENCE",
                "Cannot seed a generator with an empty token sequence",
                "Appending prompt tokens",
                "Encode a non-empty prompt first",
            ));
        }
        if tokens.len() > self.model.context_length() {
            return Err(CoreError::invalid_parameter(
                "PROMPT_EXCEEDS_CONTEXT",
                format!(
                    "Prompt has {} tokens but the model context holds {}",
                    tokens.len(),
                    self.model.context_length()
                ),
                "Appending prompt tokens",
                "Shorten the prompt",
                "prompt_tokens",
                tokens.len().to_string(),
                format!("1 to {}", self.model.context_length()),
            ));
        }
        if tokens.len() >= self.max_length {
            return Err(CoreError::invalid_parameter(
                "PROMPT_EXCEEDS_MAX_LENGTH",
                format!(
                    "Prompt has {} tokens, leaving no room below max_length {}",
                    tokens.len(),
                    self.max_length
                ),
                "Appending prompt tokens",
                "Increase max_length or shorten the prompt",
                "max_length",
                self.max_length.to_string(),
                format!("greater than {}", tokens.len()),
            ));
        }
        if let Some(&bad) = tokens.iter().find(|&&t| t as usize >= self.model.vocab_size()) {
            return Err(CoreError::invalid_input(
                "TOKEN_OUT_OF_RANGE",
                format!("Prompt token {} is outside the model vocabulary", bad),
                "Appending prompt tokens",
                "Check that the tokenizer matches the model",
            ));
        }

        self.sequence.extend_from_slice(tokens);
        self.prompt_len = tokens.len();
        trace!("Generator seeded with {} tokens", tokens.len());
        Ok(())
    }

    fn is_done(&self) -> bool {
        self.is_seeded() && (self.eos_reached || self.sequence.len() >= self.max_length)
    }

    async fn generate_next_token(&mut self) -> Result<()> {
        if !self.is_seeded() {
            return Err(CoreError::generation(
                codes::SESSION_NOT_SEEDED,
                "Generator has no prompt",
                "Generating next token",
                "Append prompt tokens before generating",
            ));
        }
        if self.is_done() {
            return Err(CoreError::generation(
                codes::SESSION_FINISHED,
                "Generator already reached its stop condition",
                "Generating next token",
                "Check is_done() before generating",
            ));
        }

        let logits = self.model.forward(&self.sequence)?;
        if logits.len() != self.model.vocab_size() {
            return Err(CoreError::generation(
                codes::GENERATOR_FAULT,
                format!(
                    "Model returned {} logits for a vocabulary of {}",
                    logits.len(),
                    self.model.vocab_size()
                ),
                "Generating next token",
                "The model weights do not match its configuration",
            ));
        }

        let token = self.sampler.sample(&logits, &self.sequence)?;
        self.sequence.push(token);
        self.next.clear();
        self.next.push(token);
        if self.eos_token_ids.contains(&token) {
            self.eos_reached = true;
        }
        trace!("Sampled token {} (sequence length {})", token, self.sequence.len());

        // Forward passes are synchronous; give other tasks such as the
        // Ctrl-C listener a chance to run between tokens.
        tokio::task::yield_now().await;
        Ok(())
    }

    fn next_tokens(&self) -> &[u32] {
        &self.next
    }
}
