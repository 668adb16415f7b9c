//! Generator session lifecycle
//!
//! A [`GeneratorSession`] wraps one engine [`Generator`] for one run and
//! enforces the order of operations:
//!
//! ```text
//! Configured -> Seeded -> Generating -> Done
//!                  |          |
//!                  +----------+-> Cancelled
//! ```
//!
//! There is no way back to an earlier state. Dropping the session releases
//! the generator.

use crate::engine::{GenerationEngine, Generator};
use crate::generation::GeneratorParams;
use crate::{codes, CoreError, Result};
use serde::Serialize;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, trace};
use uuid::Uuid;

/// Lifecycle state of a generator session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Parameters applied, no prompt yet
    Configured,
    /// Prompt tokens appended, no step taken
    Seeded,
    /// At least one step taken
    Generating,
    /// Stop condition reached
    Done,
    /// Stopped on request
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configured => "configured",
            Self::Seeded => "seeded",
            Self::Generating => "generating",
            Self::Done => "done",
            Self::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// A live generation handle for a single run
pub struct GeneratorSession {
    id: String,
    generator: Box<dyn Generator>,
    state: SessionState,
    steps: usize,
    created_at: Instant,
}

impl GeneratorSession {
    /// Create a session in the `Configured` state
    pub fn new(engine: &dyn GenerationEngine, params: &GeneratorParams) -> Result<Self> {
        let id = Uuid::new_v4().to_string();
        let generator = engine
            .create_generator(params)
            .map_err(|e| e.with_session_id(&id))?;

        debug!(
            "Created session '{}' on engine {} (max_length: {})",
            id,
            engine.name(),
            params.max_length()
        );

        Ok(Self {
            id,
            generator,
            state: SessionState::Configured,
            steps: 0,
            created_at: Instant::now(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of successful steps
    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Seed the session with the prompt tokens; only valid once, in `Configured`
    pub fn append_tokens(&mut self, tokens: &[u32]) -> Result<()> {
        if self.state != SessionState::Configured {
            return Err(CoreError::session(
                codes::SESSION_ALREADY_SEEDED,
                format!("Cannot append tokens in state {}", self.state),
                "Seeding generator session",
                "Append the prompt exactly once, before the first step",
                Some(self.id.clone()),
            ));
        }
        if tokens.is_empty() {
            return Err(CoreError::invalid_input(
                "EMPTY_TOKEN_SEQUENCE",
                "Cannot seed a session with an empty token sequence",
                "Seeding generator session",
                "Encode a non-empty prompt first",
            ));
        }

        self.generator
            .append_tokens(tokens)
            .map_err(|e| e.with_session_id(&self.id))?;
        self.state = SessionState::Seeded;
        debug!("Session '{}' seeded with {} tokens", self.id, tokens.len());
        Ok(())
    }

    /// Whether the stop condition is reached; latches `Done`
    pub fn is_done(&mut self) -> bool {
        match self.state {
            SessionState::Done | SessionState::Cancelled => true,
            SessionState::Configured => false,
            SessionState::Seeded | SessionState::Generating => {
                if self.generator.is_done() {
                    self.state = SessionState::Done;
                    debug!("Session '{}' done after {} steps", self.id, self.steps);
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Produce exactly one more token
    pub async fn step(&mut self) -> Result<()> {
        if self.state.is_terminal() {
            return Err(CoreError::generation(
                codes::SESSION_FINISHED,
                format!("Cannot step a session in state {}", self.state),
                "Generator session step",
                "Start a new run",
            )
            .with_session_id(&self.id));
        }
        if self.state == SessionState::Configured {
            return Err(CoreError::generation(
                codes::SESSION_NOT_SEEDED,
                "Cannot step before the prompt was appended",
                "Generator session step",
                "Call append_tokens first",
            )
            .with_session_id(&self.id));
        }

        self.generator
            .generate_next_token()
            .await
            .map_err(|e| e.with_session_id(&self.id))?;
        self.state = SessionState::Generating;
        self.steps += 1;
        trace!("Session '{}' step {}", self.id, self.steps);
        Ok(())
    }

    /// Newest token of the single sequence, `None` before the first step
    pub fn latest_token(&self) -> Option<u32> {
        if self.steps == 0 {
            return None;
        }
        self.generator.next_tokens().first().copied()
    }

    /// Stop the session; only `Seeded` and `Generating` sessions move to `Cancelled`
    pub fn cancel(&mut self) {
        if matches!(self.state, SessionState::Seeded | SessionState::Generating) {
            self.state = SessionState::Cancelled;
            info!("Session '{}' cancelled after {} steps", self.id, self.steps);
        }
    }
}

impl Drop for GeneratorSession {
    fn drop(&mut self) {
        debug!(
            "Releasing session '{}' (state: {}, steps: {}, lifetime: {:.1?})",
            self.id,
            self.state,
            self.steps,
            self.created_at.elapsed()
        );
    }
}
