//! Info command: model metadata and effective search options

use anyhow::Result;
use async_trait::async_trait;
use clap::Args;
use serde_json::json;
use spindle_core::prelude::*;
use spindle_core::tokenizer::Tokenizer;
use std::path::PathBuf;
use tracing::debug;

use crate::commands::{load_model, Command};
use crate::config::Config;
use crate::utils::print_output;

#[derive(Args, Debug)]
pub struct InfoCommand {
    /// Path or name of the model directory
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// List the tokenizer's special tokens
    #[arg(long)]
    pub tokenizer: bool,
}

#[async_trait]
impl Command for InfoCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing info command: {:?}", self);

        let model_path = config.resolve_model(self.model.as_deref())?;
        let model_dir = load_model(&model_path)?;
        let info = self.model_info(&model_dir, config)?;
        print_output(&info, json_output)
    }
}

impl InfoCommand {
    fn model_info(&self, model_dir: &ModelDir, config: &Config) -> Result<serde_json::Value> {
        let genai = model_dir.config();
        let tokenizer = model_dir.tokenizer();
        let params = GeneratorParams::new(&genai.search.overlay(&config.search))?;
        let template = config.chat_template.clone().unwrap_or_default();

        let mut info = json!({
            "path": model_dir.path().display().to_string(),
            "model": {
                "name": genai.display_name(),
                "type": genai.model.model_type,
                "vocab_size": genai.model.vocab_size,
                "context_length": genai.model.context_length,
                "eos_token_ids": genai.eos_token_ids(),
            },
            "chat_template": template.as_str(),
            "search": params,
        });

        if self.tokenizer {
            let vocab = tokenizer.vocab();
            let mut specials: Vec<_> = vocab
                .special_tokens()
                .iter()
                .map(|(piece, id)| (*id, piece.clone()))
                .collect();
            specials.sort();
            info["tokenizer"] = json!({
                "pieces": tokenizer.vocab_size(),
                "byte_fallback": vocab.has_byte_fallback(),
                "special_tokens": specials
                    .into_iter()
                    .map(|(id, piece)| format!("{} {}", id, piece))
                    .collect::<Vec<_>>(),
            });
        }

        Ok(info)
    }
}
