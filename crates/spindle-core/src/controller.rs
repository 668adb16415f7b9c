//! Session controller: the streaming generation loop
//!
//! One run goes through these stages:
//!
//! 1. check the formatted prompt is not empty,
//! 2. encode it,
//! 3. open a [`GeneratorSession`] and seed it with the prompt tokens,
//! 4. open a fresh decode stream,
//! 5. loop: check cancellation, check the stop condition, step, decode the
//!    newest token and hand any non-empty fragment to the caller,
//! 6. release the session and the stream.
//!
//! Cancellation is only observed at the top of an iteration, so a fragment
//! that has been decoded is always delivered. Every exit path ends in a
//! [`RunOutcome`]; errors never escape as panics or early returns.

use crate::engine::GenerationEngine;
use crate::generation::{GenerationStats, GeneratorParams, SearchOptions};
use crate::model::loader::ModelDir;
use crate::prompt::{FormattedPrompt, PromptTemplate};
use crate::session::GeneratorSession;
use crate::tokenizer::Tokenizer;
use crate::validation::Validator;
use crate::{codes, CoreError, ErrorKind, Result};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Terminal status of a run
#[derive(Debug)]
pub enum RunStatus {
    /// The engine reached its stop condition
    CompletedNormally,
    /// Cancellation was requested; fragments emitted so far stand
    Cancelled,
    /// The run ended on an error
    Failed(CoreError),
}

impl RunStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::CompletedNormally)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed(err) => Some(err.kind()),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompletedNormally => f.write_str("completed"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::Failed(err) => write!(f, "failed ({}, {})", err.kind(), err.code()),
        }
    }
}

/// Result of one run
#[derive(Debug)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub stats: GenerationStats,
}

/// A validated prompt and parameter bundle, ready to run
#[derive(Debug, Clone)]
pub struct RunRequest {
    prompt: FormattedPrompt,
    params: GeneratorParams,
}

impl RunRequest {
    pub fn new(prompt: FormattedPrompt, params: GeneratorParams) -> Self {
        Self { prompt, params }
    }

    pub fn prompt(&self) -> &FormattedPrompt {
        &self.prompt
    }

    pub fn params(&self) -> &GeneratorParams {
        &self.params
    }
}

/// Drives generation runs against one engine and tokenizer.
///
/// The controller holds no per-run state, so concurrent runs through the
/// same controller use independent sessions and decode streams.
pub struct SessionController {
    engine: Arc<dyn GenerationEngine>,
    tokenizer: Arc<dyn Tokenizer>,
    template: PromptTemplate,
    defaults: SearchOptions,
}

impl SessionController {
    pub fn new(engine: Arc<dyn GenerationEngine>, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            engine,
            tokenizer,
            template: PromptTemplate::default(),
            defaults: SearchOptions::default(),
        }
    }

    /// Controller over a loaded model directory, using its search defaults
    pub fn from_model_dir(model_dir: &ModelDir) -> Self {
        Self::new(model_dir.engine(), model_dir.tokenizer())
            .with_defaults(model_dir.config().search.clone())
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Search options that requests are layered on top of
    pub fn with_defaults(mut self, defaults: SearchOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    pub fn defaults(&self) -> &SearchOptions {
        &self.defaults
    }

    /// Format the prompt and build parameters without touching the engine
    pub fn configure(&self, user_text: &str, options: &SearchOptions) -> Result<RunRequest> {
        let prompt = self.template.format(user_text)?;
        let params = GeneratorParams::new(&self.defaults.overlay(options))?;
        Ok(RunRequest::new(prompt, params))
    }

    /// Configure and run in one go; configuration errors become a failed outcome
    pub async fn generate<F>(
        &self,
        user_text: &str,
        options: &SearchOptions,
        cancel: &CancellationToken,
        on_fragment: F,
    ) -> RunOutcome
    where
        F: FnMut(&str) -> std::io::Result<()>,
    {
        match self.configure(user_text, options) {
            Ok(request) => self.run(&request, cancel, on_fragment).await,
            Err(err) => {
                warn!("Run rejected before generation: {}", err.code());
                RunOutcome {
                    status: RunStatus::Failed(err),
                    stats: GenerationStats::default(),
                }
            }
        }
    }

    /// Run a configured request, streaming fragments to `on_fragment`
    pub async fn run<F>(&self, request: &RunRequest, cancel: &CancellationToken, on_fragment: F) -> RunOutcome
    where
        F: FnMut(&str) -> std::io::Result<()>,
    {
        self.run_with(&request.prompt, &request.params, cancel, on_fragment)
            .await
    }

    /// Run generation for an already formatted prompt.
    ///
    /// `on_fragment` is called synchronously, in production order, with every
    /// non-empty piece of decoded text. If it fails the run ends as an
    /// output failure.
    pub async fn run_with<F>(
        &self,
        prompt: &FormattedPrompt,
        params: &GeneratorParams,
        cancel: &CancellationToken,
        mut on_fragment: F,
    ) -> RunOutcome
    where
        F: FnMut(&str) -> std::io::Result<()>,
    {
        let start = Instant::now();
        let mut stats = GenerationStats::default();

        let status = match self
            .drive(prompt, params, cancel, &mut on_fragment, &mut stats, start)
            .await
        {
            Ok(status) => status,
            Err(err) => {
                warn!("Generation failed after {} tokens: {}", stats.tokens_generated, err);
                RunStatus::Failed(err)
            }
        };

        let elapsed = start.elapsed();
        stats.total_time_ms = elapsed.as_secs_f64() * 1000.0;
        if elapsed.as_secs_f64() > 0.0 {
            stats.tokens_per_second = stats.tokens_generated as f64 / elapsed.as_secs_f64();
        }

        info!(
            "Run {}: {} tokens, {} fragments in {:.1}ms",
            status, stats.tokens_generated, stats.fragments_emitted, stats.total_time_ms
        );

        RunOutcome { status, stats }
    }

    async fn drive<F>(
        &self,
        prompt: &FormattedPrompt,
        params: &GeneratorParams,
        cancel: &CancellationToken,
        on_fragment: &mut F,
        stats: &mut GenerationStats,
        start: Instant,
    ) -> Result<RunStatus>
    where
        F: FnMut(&str) -> std::io::Result<()>,
    {
        Validator::validate_input_text(prompt.as_str())?;

        let tokens = self.tokenizer.encode(prompt.as_str()).await?;
        stats.prompt_tokens = tokens.len();
        debug!("Encoded prompt into {} tokens", tokens.len());

        // Both live until this function returns, whichever way it returns.
        let mut session = GeneratorSession::new(self.engine.as_ref(), params)?;
        session.append_tokens(&tokens)?;
        let mut stream = self.tokenizer.create_stream();

        loop {
            if cancel.is_cancelled() {
                session.cancel();
                return Ok(RunStatus::Cancelled);
            }

            if session.is_done() {
                if stream.pending_bytes() > 0 {
                    debug!(
                        "Dropping {} bytes of an incomplete character at end of output",
                        stream.pending_bytes()
                    );
                }
                return Ok(RunStatus::CompletedNormally);
            }

            session.step().await?;
            let token = session.latest_token().ok_or_else(|| {
                CoreError::generation(
                    codes::GENERATOR_FAULT,
                    "Engine reported a step but produced no token",
                    "Reading the newest token",
                    "Check the engine implementation",
                )
                .with_session_id(session.id())
            })?;
            stats.tokens_generated += 1;

            let fragment = stream.decode(token)?;
            trace!("Token {} decoded to {:?}", token, fragment);
            if fragment.is_empty() {
                continue;
            }

            on_fragment(&fragment)?;
            stats.fragments_emitted += 1;
            if stats.time_to_first_token_ms.is_none() {
                stats.time_to_first_token_ms = Some(start.elapsed().as_secs_f64() * 1000.0);
            }
        }
    }
}
