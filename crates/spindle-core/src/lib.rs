//! Spindle Core - streaming generation session controller
//!
//! This crate drives an autoregressive generation engine one token at a time,
//! decodes every produced token incrementally and hands the resulting text
//! fragments to the caller, while honouring cooperative cancellation.

// Module declarations
pub mod config;
pub mod controller;
pub mod engine;
pub mod generation;
pub mod model;
pub mod prompt;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod tokenizer;
pub mod validation;

use serde::Serialize;
use thiserror::Error;

/// Error codes that callers match on programmatically
pub mod codes {
    pub const INPUT_TEXT_EMPTY: &str = "INPUT_TEXT_EMPTY";
    pub const TOKENIZER_UNSUPPORTED_CHAR: &str = "TOKENIZER_UNSUPPORTED_CHAR";
    pub const TOKENIZER_UNKNOWN_TOKEN: &str = "TOKENIZER_UNKNOWN_TOKEN";
    pub const SESSION_ALREADY_SEEDED: &str = "SESSION_ALREADY_SEEDED";
    pub const SESSION_NOT_SEEDED: &str = "SESSION_NOT_SEEDED";
    pub const SESSION_FINISHED: &str = "SESSION_FINISHED";
    pub const GENERATOR_FAULT: &str = "GENERATOR_FAULT";
}

#[derive(Error, Debug)]
pub enum CoreError {
    /// Model directory loading or validation errors
    #[error("Model error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Model {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        file_path: Option<std::path::PathBuf>,
    },

    /// Text could not be converted into tokens
    #[error("Encoding error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Encoding {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
    },

    /// A produced token could not be converted back into text
    #[error("Decoding error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Decoding {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        token_id: Option<u32>,
    },

    /// Generator session lifecycle violations
    #[error("Session error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Session {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        session_id: Option<String>,
    },

    /// Faults raised by the engine while producing a token
    #[error("Generation error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Generation {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        session_id: Option<String>,
    },

    /// Input validation and parameter errors
    #[error("Invalid input [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    InvalidInput {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        parameter_name: Option<String>,
        value: Option<String>,
        valid_range: Option<String>,
    },

    /// Configuration parsing and validation errors
    #[error("Configuration error [{code}]: {message}\nContext: {context}\nSuggestion: {suggestion}")]
    Configuration {
        code: &'static str,
        message: String,
        context: String,
        suggestion: String,
        config_path: Option<std::path::PathBuf>,
        field_name: Option<String>,
    },

    /// File system and output stream errors
    #[error("IO error [{code}]: {message}\nPath: {path:?}\nSuggestion: {suggestion}")]
    Io {
        code: &'static str,
        message: String,
        path: Option<std::path::PathBuf>,
        suggestion: String,
        #[source]
        source: std::io::Error,
    },

    /// Other unexpected errors
    #[error("Internal error [{code}]: {message}\nContext: {context}")]
    Internal {
        code: &'static str,
        message: String,
        context: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

pub type Result<T> = std::result::Result<T, CoreError>;

/// Coarse classification of a [`CoreError`], reported in failed run outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The user supplied no text
    EmptyInput,
    /// Some other input or parameter was rejected
    InvalidInput,
    /// The tokenizer rejected the prompt
    Encoding,
    /// A produced token could not be decoded
    Decoding,
    /// Seeding a session that was already past `Configured`
    Append,
    /// The engine failed mid-step
    Generation,
    /// Missing or invalid model artifacts
    ModelLoad,
    /// Bad configuration file or template
    Configuration,
    /// The fragment sink could not accept output
    Output,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::EmptyInput => "empty input",
            Self::InvalidInput => "invalid input",
            Self::Encoding => "encoding",
            Self::Decoding => "decoding",
            Self::Append => "append",
            Self::Generation => "generation",
            Self::ModelLoad => "model load",
            Self::Configuration => "configuration",
            Self::Output => "output",
            Self::Internal => "internal",
        };
        f.write_str(name)
    }
}

impl CoreError {
    /// Create a model error with context
    pub fn model<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Model {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            file_path: None,
        }
    }

    /// Create a model error with file path
    pub fn model_with_path<S1, S2, S3, P>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        path: P,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        P: Into<std::path::PathBuf>,
    {
        Self::Model {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            file_path: Some(path.into()),
        }
    }

    /// Create an encoding error
    pub fn encoding<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Encoding {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a decoding error for a specific token
    pub fn decoding<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        token_id: Option<u32>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Decoding {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            token_id,
        }
    }

    /// Create a session lifecycle error
    pub fn session<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        session_id: Option<String>,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Session {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            session_id,
        }
    }

    /// Create a generation error
    pub fn generation<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Generation {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            session_id: None,
        }
    }

    /// Create an invalid input error
    pub fn invalid_input<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: None,
            value: None,
            valid_range: None,
        }
    }

    /// Create an invalid input error with parameter validation details
    pub fn invalid_parameter<S1, S2, S3, S4, S5, S6>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
        param_name: S4,
        value: S5,
        valid_range: S6,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
        S4: Into<String>,
        S5: Into<String>,
        S6: Into<String>,
    {
        Self::InvalidInput {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            parameter_name: Some(param_name.into()),
            value: Some(value.into()),
            valid_range: Some(valid_range.into()),
        }
    }

    /// Create a configuration error
    pub fn configuration<S1, S2, S3>(
        code: &'static str,
        message: S1,
        context: S2,
        suggestion: S3,
    ) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
        S3: Into<String>,
    {
        Self::Configuration {
            code,
            message: message.into(),
            context: context.into(),
            suggestion: suggestion.into(),
            config_path: None,
            field_name: None,
        }
    }

    /// Attach the owning session id to session and generation errors
    pub fn with_session_id(mut self, id: &str) -> Self {
        match &mut self {
            Self::Session { session_id, .. } | Self::Generation { session_id, .. } => {
                session_id.get_or_insert_with(|| id.to_string());
            }
            _ => {}
        }
        self
    }

    /// Get the error code for programmatic handling
    pub fn code(&self) -> &'static str {
        match self {
            Self::Model { code, .. } => code,
            Self::Encoding { code, .. } => code,
            Self::Decoding { code, .. } => code,
            Self::Session { code, .. } => code,
            Self::Generation { code, .. } => code,
            Self::InvalidInput { code, .. } => code,
            Self::Configuration { code, .. } => code,
            Self::Io { code, .. } => code,
            Self::Internal { code, .. } => code,
        }
    }

    /// Classify the error for run outcomes
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Model { .. } => ErrorKind::ModelLoad,
            Self::Encoding { .. } => ErrorKind::Encoding,
            Self::Decoding { .. } => ErrorKind::Decoding,
            Self::Session { .. } => ErrorKind::Append,
            Self::Generation { .. } => ErrorKind::Generation,
            Self::InvalidInput { code, .. } if *code == codes::INPUT_TEXT_EMPTY => {
                ErrorKind::EmptyInput
            }
            Self::InvalidInput { .. } => ErrorKind::InvalidInput,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Io { .. } => ErrorKind::Output,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        let (code, suggestion) = match err.kind() {
            std::io::ErrorKind::NotFound => (
                "IO_FILE_NOT_FOUND",
                "Check that the file path is correct and the file exists"
            ),
            std::io::ErrorKind::PermissionDenied => (
                "IO_PERMISSION_DENIED",
                "Check file permissions or run with appropriate privileges"
            ),
            std::io::ErrorKind::BrokenPipe => (
                "IO_BROKEN_PIPE",
                "The output stream was closed before generation finished"
            ),
            std::io::ErrorKind::InvalidData => (
                "IO_INVALID_DATA",
                "The file may be corrupted or in an unexpected format"
            ),
            _ => (
                "IO_UNKNOWN",
                "Check the file system and try the operation again"
            ),
        };

        Self::Io {
            code,
            message: err.to_string(),
            path: None,
            suggestion: suggestion.to_string(),
            source: err,
        }
    }
}

impl From<anyhow::Error> for CoreError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal {
            code: "INTERNAL_UNKNOWN",
            message: err.to_string(),
            context: "An unexpected error occurred".to_string(),
            source: Some(err),
        }
    }
}

/// Prelude module for common imports
pub mod prelude {
    pub use crate::{
        config::{GenAiConfig, ModelSection},
        controller::{RunOutcome, RunRequest, RunStatus, SessionController},
        engine::{GenerationEngine, Generator, SamplingModel},
        generation::{GenerationStats, GeneratorParams, SearchOptions},
        model::{LanguageModel, loader::ModelDir},
        prompt::{FormattedPrompt, Prompt, PromptTemplate},
        session::{GeneratorSession, SessionState},
        tokenizer::{DecodeStream, Tokenizer},
        validation::Validator,
        CoreError, ErrorKind, Result,
    };
    pub use tokio_util::sync::CancellationToken;
}

// Re-export key types at the crate root
pub use controller::{RunOutcome, RunStatus, SessionController};
pub use generation::{GeneratorParams, SearchOptions};
pub use prompt::PromptTemplate;
pub use tokio_util::sync::CancellationToken;

pub mod error {
    pub use super::{CoreError, ErrorKind, Result};
}
