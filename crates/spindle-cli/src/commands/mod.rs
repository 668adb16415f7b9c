//! Command implementations for Spindle CLI

pub mod info;
pub mod run;

use anyhow::{Context, Result};
use async_trait::async_trait;
use spindle_core::prelude::*;
use std::path::Path;
use tracing::info;

use crate::utils::create_spinner;

/// Trait for CLI command execution
#[async_trait]
pub trait Command {
    /// Execute the command
    async fn execute(&self, config: &crate::config::Config, json_output: bool) -> Result<()>;
}

/// Open a model directory behind a spinner
pub(crate) fn load_model(path: &Path) -> Result<ModelDir> {
    let spinner = create_spinner("Loading model...");
    let result = ModelDir::open(path)
        .with_context(|| format!("Failed to load model from {}", path.display()));
    spinner.finish_and_clear();

    let model_dir = result?;
    info!("Using model: {}", model_dir.path().display());
    Ok(model_dir)
}
