//! Model directory loading
//!
//! A model directory holds three artifacts:
//! - `genai_config.json`: model metadata and default search options,
//! - `tokenizer.json`: the piece vocabulary,
//! - `weights.json`: the model weights.

use super::bigram::{BigramModel, WEIGHTS_FILE};
use super::LanguageModel;
use crate::config::{GenAiConfig, GENAI_CONFIG_FILE};
use crate::engine::SamplingModel;
use crate::tokenizer::VocabTokenizer;
use crate::validation::Validator;
use crate::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// File name of the tokenizer inside a model directory
pub const TOKENIZER_FILE: &str = "tokenizer.json";

/// A loaded model directory
pub struct ModelDir {
    path: PathBuf,
    config: GenAiConfig,
    tokenizer: Arc<VocabTokenizer>,
    engine: Arc<SamplingModel>,
}

impl ModelDir {
    /// Open and validate a model directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = Validator::validate_model_dir(path)?;

        let config_path = Validator::validate_model_artifact(&path, GENAI_CONFIG_FILE)?;
        let tokenizer_path = Validator::validate_model_artifact(&path, TOKENIZER_FILE)?;
        let weights_path = Validator::validate_model_artifact(&path, WEIGHTS_FILE)?;

        let config = GenAiConfig::from_file(&config_path)?;
        let tokenizer = VocabTokenizer::from_file(&tokenizer_path)?;

        if tokenizer.vocab().size() != config.model.vocab_size {
            return Err(CoreError::model_with_path(
                "VOCAB_SIZE_MISMATCH",
                format!(
                    "{} has {} pieces but {} declares vocab_size {}",
                    TOKENIZER_FILE,
                    tokenizer.vocab().size(),
                    GENAI_CONFIG_FILE,
                    config.model.vocab_size
                ),
                "Model directory loading",
                "Make sure the tokenizer and the model come from the same export",
                tokenizer_path,
            ));
        }

        let model: Arc<dyn LanguageModel> = match config.model.model_type.as_str() {
            "bigram" => Arc::new(BigramModel::from_file(
                &weights_path,
                config.display_name(),
                config.model.vocab_size,
                config.model.context_length,
            )?),
            other => {
                return Err(CoreError::model_with_path(
                    "UNSUPPORTED_MODEL_TYPE",
                    format!("Unsupported model type: {}", other),
                    "Model directory loading",
                    "Supported model types: bigram",
                    config_path,
                ))
            }
        };

        let engine = Arc::new(SamplingModel::new(model, config.eos_token_ids()));

        info!(
            "Loaded model {} from {} ({} tokens, context {})",
            config.display_name(),
            path.display(),
            config.model.vocab_size,
            config.model.context_length
        );

        Ok(Self {
            path,
            config,
            tokenizer: Arc::new(tokenizer),
            engine,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &GenAiConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> Arc<VocabTokenizer> {
        Arc::clone(&self.tokenizer)
    }

    pub fn engine(&self) -> Arc<SamplingModel> {
        Arc::clone(&self.engine)
    }
}
