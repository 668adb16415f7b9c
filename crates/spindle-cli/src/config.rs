//! Configuration management for Spindle CLI
//!
//! The configuration file is optional and only ever read. Search options
//! set here sit between the model directory defaults and the command line.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use spindle_core::prelude::*;
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Default model directory or name
    pub default_model: Option<String>,

    /// Model search directories
    pub model_dirs: Vec<PathBuf>,

    /// Chat template overriding the built-in one
    pub chat_template: Option<PromptTemplate>,

    /// Search options applied on top of the model defaults
    pub search: SearchOptions,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_model: None,
            model_dirs: vec![PathBuf::from("~/.spindle/models"), PathBuf::from("./models")],
            chat_template: None,
            search: SearchOptions::default(),
        }
    }
}

impl Config {
    /// Load configuration from file; a missing file means defaults
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let config_path = match config_path {
            Some(path) => path.to_path_buf(),
            None => Self::default_config_path(),
        };

        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)?;
        Ok(config)
    }

    /// Get default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"))
            .join("spindle")
            .join("config.toml")
    }

    /// Resolve a model directory from a path or a name in the model directories
    pub fn find_model(&self, model_name: &str) -> Result<PathBuf> {
        let model_path = Path::new(model_name);
        if model_path.is_dir() {
            return Ok(model_path.to_path_buf());
        }

        // Expand shell variables like ~
        let expanded = shellexpand::full(model_name)
            .context("Failed to expand shell variables in model path")?;
        let expanded_path = Path::new(expanded.as_ref());
        if expanded_path.is_dir() {
            return Ok(expanded_path.to_path_buf());
        }

        for dir in &self.model_dirs {
            let dir = shellexpand::full(&dir.to_string_lossy())
                .map(|d| PathBuf::from(d.as_ref()))
                .unwrap_or_else(|_| dir.clone());
            let candidate = dir.join(model_name);
            if candidate.is_dir() {
                return Ok(candidate);
            }
        }

        anyhow::bail!(
            "Model '{}' not found in any configured directory\n\
             Suggestion: Pass the path of a directory containing genai_config.json",
            model_name
        );
    }

    /// Model given on the command line, else the configured default
    pub fn resolve_model(&self, requested: Option<&Path>) -> Result<PathBuf> {
        match requested {
            Some(path) => self.find_model(&path.to_string_lossy()),
            None => match &self.default_model {
                Some(default_model) => self.find_model(default_model),
                None => anyhow::bail!(
                    "No model specified and no default model configured\n\
                     Suggestion: Use --model /path/to/model-dir or set default_model in the config file"
                ),
            },
        }
    }
}
