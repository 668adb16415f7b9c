//! Model directory configuration (`genai_config.json`)

use crate::generation::SearchOptions;
use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name of the model configuration inside a model directory
pub const GENAI_CONFIG_FILE: &str = "genai_config.json";

/// Contents of `genai_config.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenAiConfig {
    pub model: ModelSection,

    /// Default search options shipped with the model
    #[serde(default)]
    pub search: SearchOptions,
}

/// Model metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSection {
    /// Model architecture, e.g. `bigram`
    #[serde(rename = "type")]
    pub model_type: String,

    #[serde(default)]
    pub name: Option<String>,

    pub vocab_size: usize,

    /// Longest token sequence the model accepts
    pub context_length: usize,

    pub eos_token_id: EosTokenIds,
}

/// One end-of-sequence token or several
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EosTokenIds {
    Single(u32),
    Multiple(Vec<u32>),
}

impl EosTokenIds {
    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            Self::Single(id) => vec![*id],
            Self::Multiple(ids) => ids.clone(),
        }
    }
}

impl GenAiConfig {
    /// Load and validate the configuration file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CoreError::model_with_path(
                "MODEL_CONFIG_READ_ERROR",
                format!("Failed to read {}: {}", GENAI_CONFIG_FILE, e),
                "Model configuration loading",
                "Check file path and permissions",
                path,
            )
        })?;
        let config = Self::from_json_str(&content).map_err(|e| {
            CoreError::model_with_path(
                "MODEL_CONFIG_INVALID",
                e.to_string(),
                "Model configuration loading",
                format!("Fix {} in the model directory", GENAI_CONFIG_FILE),
                path,
            )
        })?;
        Ok(config)
    }

    /// Parse and validate configuration JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json).map_err(|e| {
            CoreError::configuration(
                "MODEL_CONFIG_PARSE_ERROR",
                format!("Failed to parse model configuration: {}", e),
                "Model configuration parsing",
                "Expected a `model` section and an optional `search` section",
            )
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.model.vocab_size == 0 {
            return Err(CoreError::configuration(
                "MODEL_CONFIG_INVALID",
                "vocab_size must be greater than 0",
                "Model configuration validation",
                "Set model.vocab_size to the number of tokenizer pieces",
            ));
        }

        if self.model.context_length == 0 {
            return Err(CoreError::configuration(
                "MODEL_CONFIG_INVALID",
                "context_length must be greater than 0",
                "Model configuration validation",
                "Set model.context_length to the longest sequence the model accepts",
            ));
        }

        let eos = self.model.eos_token_id.to_vec();
        if eos.is_empty() {
            return Err(CoreError::configuration(
                "MODEL_CONFIG_INVALID",
                "eos_token_id must name at least one token",
                "Model configuration validation",
                "Set model.eos_token_id to a token id or a list of ids",
            ));
        }
        if let Some(id) = eos.iter().find(|&&id| id as usize >= self.model.vocab_size) {
            return Err(CoreError::configuration(
                "MODEL_CONFIG_INVALID",
                format!("eos_token_id {} is outside the vocabulary", id),
                "Model configuration validation",
                format!("Token ids must be below vocab_size ({})", self.model.vocab_size),
            ));
        }

        Ok(())
    }

    pub fn eos_token_ids(&self) -> Vec<u32> {
        self.model.eos_token_id.to_vec()
    }

    /// Display name, falling back to the model type
    pub fn display_name(&self) -> &str {
        self.model.name.as_deref().unwrap_or(&self.model.model_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "model": {
            "type": "bigram",
            "name": "tiny-chat",
            "vocab_size": 16,
            "context_length": 128,
            "eos_token_id": [3, 1]
        },
        "search": { "max_length": 64, "top_k": 50 }
    }"#;

    #[test]
    fn test_parse_config() {
        let config = GenAiConfig::from_json_str(CONFIG).unwrap();
        assert_eq!(config.model.model_type, "bigram");
        assert_eq!(config.display_name(), "tiny-chat");
        assert_eq!(config.eos_token_ids(), vec![3, 1]);
        assert_eq!(config.search.max_length, Some(64));
        assert_eq!(config.search.temperature, None);
    }

    #[test]
    fn test_single_eos_and_missing_search() {
        let config = GenAiConfig::from_json_str(
            r#"{"model": {"type": "bigram", "vocab_size": 8, "context_length": 32, "eos_token_id": 2}}"#,
        )
        .unwrap();
        assert_eq!(config.eos_token_ids(), vec![2]);
        assert!(config.search.is_empty());
        assert_eq!(config.display_name(), "bigram");
    }

    #[test]
    fn test_eos_outside_vocab_rejected() {
        let err = GenAiConfig::from_json_str(
            r#"{"model": {"type": "bigram", "vocab_size": 8, "context_length": 32, "eos_token_id": 9}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "MODEL_CONFIG_INVALID");
    }

    #[test]
    fn test_unknown_search_option_rejected() {
        let err = GenAiConfig::from_json_str(
            r#"{"model": {"type": "bigram", "vocab_size": 8, "context_length": 32, "eos_token_id": 2},
                "search": {"num_beams": 4}}"#,
        )
        .unwrap_err();
        assert_eq!(err.code(), "MODEL_CONFIG_PARSE_ERROR");
    }
}
