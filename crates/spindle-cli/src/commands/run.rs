//! Run command: prompt for input and stream the generated reply

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Args;
use console::style;
use serde_json::json;
use spindle_core::prelude::*;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::commands::{load_model, Command};
use crate::config::Config;
use crate::utils::{format_duration, print_output};

/// Printed when generation is interrupted with Ctrl-C
const ABORT_MESSAGE: &str = "  --control+c pressed, aborting generation--";

/// Exit status after Ctrl-C at the input prompt
const SIGINT_EXIT_CODE: i32 = 130;

#[derive(Args, Debug, Default)]
pub struct RunCommand {
    /// Path or name of the model directory
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// Prompt text; read from stdin when omitted
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Keep prompting until `exit`, `quit` or end of input
    #[arg(short, long)]
    pub interactive: bool,

    /// Cap on the total sequence length, prompt included
    #[arg(long)]
    pub max_length: Option<usize>,

    /// Temperature for sampling
    #[arg(long)]
    pub temperature: Option<f32>,

    /// Top-p (nucleus) sampling threshold
    #[arg(long)]
    pub top_p: Option<f32>,

    /// Top-k sampling candidate pool size
    #[arg(long)]
    pub top_k: Option<usize>,

    /// Random seed for reproducible sampling
    #[arg(long)]
    pub seed: Option<u64>,

    /// Sample from the distribution instead of always taking the best token
    #[arg(long)]
    pub sample: bool,

    /// Show timing information
    #[arg(long)]
    pub timing: bool,
}

#[async_trait]
impl Command for RunCommand {
    async fn execute(&self, config: &Config, json_output: bool) -> Result<()> {
        debug!("Executing run command: {:?}", self);

        let model_path = config.resolve_model(self.model.as_deref())?;
        let model_dir = load_model(&model_path)?;

        let template = config.chat_template.clone().unwrap_or_default();
        let controller = SessionController::from_model_dir(&model_dir)
            .with_template(template)
            .with_defaults(model_dir.config().search.overlay(&config.search));
        let options = self.search_options();

        if !self.interactive {
            let text = match &self.prompt {
                Some(text) => text.clone(),
                None => match read_input(json_output).await? {
                    Some(text) => text,
                    None => return Ok(()),
                },
            };
            self.generate(&controller, &text, &options, json_output).await?;
            return Ok(());
        }

        if let Some(text) = &self.prompt {
            self.generate(&controller, text, &options, json_output).await?;
        }
        while let Some(text) = read_input(json_output).await? {
            if matches!(text.trim(), "exit" | "quit") {
                break;
            }
            self.generate(&controller, &text, &options, json_output).await?;
        }

        Ok(())
    }
}

impl RunCommand {
    /// Command-line overrides; unset flags leave lower layers alone
    fn search_options(&self) -> SearchOptions {
        SearchOptions {
            max_length: self.max_length,
            top_p: self.top_p,
            top_k: self.top_k,
            temperature: self.temperature,
            do_sample: self.sample.then_some(true),
            random_seed: self.seed,
            ..Default::default()
        }
    }

    async fn generate(
        &self,
        controller: &SessionController,
        text: &str,
        options: &SearchOptions,
        json_output: bool,
    ) -> Result<()> {
        let request = match controller.configure(text, options) {
            Ok(request) => request,
            Err(e) if e.kind() == ErrorKind::EmptyInput => {
                if json_output {
                    let rejected = json!({
                        "input": text,
                        "status": "rejected",
                        "error": "Input cannot be empty",
                    });
                    print_output(&rejected, true)?;
                } else {
                    println!("Error: Input cannot be empty");
                }
                return Ok(());
            }
            Err(e) => return Err(e).context("Invalid generation settings"),
        };

        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Ctrl-C received, cancelling generation");
                    cancel.cancel();
                }
            })
        };

        let mut output = String::new();
        let outcome = if json_output {
            controller
                .run(&request, &cancel, |fragment| {
                    output.push_str(fragment);
                    Ok(())
                })
                .await
        } else {
            let mut stdout = io::stdout();
            write!(stdout, "Output: ")?;
            stdout.flush()?;
            controller
                .run(&request, &cancel, |fragment| {
                    stdout.write_all(fragment.as_bytes())?;
                    stdout.flush()
                })
                .await
        };
        watcher.abort();

        if json_output {
            let summary = json!({
                "input": text,
                "output": output,
                "status": outcome.status.to_string(),
                "stats": outcome.stats,
            });
            print_output(&summary, true)?;
        } else {
            match &outcome.status {
                RunStatus::Cancelled => println!("\n{}", ABORT_MESSAGE),
                _ => println!(),
            }
            if self.timing {
                print_timing(&outcome.stats);
            }
        }

        match outcome.status {
            RunStatus::Failed(e) => Err(e).context("Generation failed"),
            RunStatus::CompletedNormally | RunStatus::Cancelled => Ok(()),
        }
    }
}

/// Prompt with `Input: ` and read one line; `None` at end of input.
///
/// In JSON mode the prompt goes to stderr so stdout only carries JSON.
/// Ctrl-C while waiting ends the process, as there is nothing to keep.
async fn read_input(json_output: bool) -> Result<Option<String>> {
    if json_output {
        eprint!("Input: ");
        io::stderr().flush()?;
    } else {
        print!("Input: ");
        io::stdout().flush()?;
    }

    let read = tokio::task::spawn_blocking(|| -> io::Result<Option<String>> {
        let mut line = String::new();
        let bytes = io::stdin().lock().read_line(&mut line)?;
        if bytes == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    });

    tokio::select! {
        result = read => {
            let line = result.context("Input reader stopped unexpectedly")??;
            if line.is_none() {
                // keep the shell prompt off the `Input: ` line
                end_prompt_line(json_output);
            }
            Ok(line)
        }
        _ = tokio::signal::ctrl_c() => {
            end_prompt_line(json_output);
            std::process::exit(SIGINT_EXIT_CODE);
        }
    }
}

fn end_prompt_line(json_output: bool) {
    if json_output {
        eprintln!();
    } else {
        println!();
    }
}

fn print_timing(stats: &GenerationStats) {
    let total = Duration::from_secs_f64(stats.total_time_ms / 1000.0);
    eprintln!(
        "{} {} prompt tokens, {} generated in {} ({:.1} tokens/s)",
        style("Timing:").cyan().bold(),
        stats.prompt_tokens,
        stats.tokens_generated,
        format_duration(total),
        stats.tokens_per_second
    );
    if let Some(first) = stats.time_to_first_token_ms {
        eprintln!("{} {:.1}ms", style("First token:").cyan().bold(), first);
    }
}
