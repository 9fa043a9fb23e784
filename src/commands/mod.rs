//! CLI subcommands.

pub mod draft;
pub mod publish;
pub mod status;
pub mod walk;

use crate::config::{ProviderKind, Settings};
use crate::error::{Error, LlmError};
use crate::llm::claude::ClaudeClient;
use crate::llm::gateway::GatewayClient;
use crate::llm::{Completion, LLMProvider, Prompt, SchemaDescriptor};
use anyhow::{bail, Result};
use async_trait::async_trait;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

/// How a successful command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Complete,
    /// Some target language was withheld
    Partial,
}

impl Outcome {
    pub fn exit_code(self) -> u8 {
        match self {
            Outcome::Complete => 0,
            Outcome::Partial => 2,
        }
    }
}

/// Build the configured LLM provider
pub fn build_provider(settings: &Settings) -> Result<Box<dyn LLMProvider>> {
    let llm = &settings.llm;
    match llm.provider {
        ProviderKind::ClaudeCli => Ok(Box::new(ClaudeClient::new(llm.model.clone()))),
        ProviderKind::Gateway => {
            let Some(base_url) = llm.base_url.clone() else {
                bail!("[llm] base_url is required for the gateway provider");
            };
            let Some(api_key) = settings.api_key.clone() else {
                bail!(
                    "Gateway provider needs an API key in ${}",
                    llm.api_key_env
                );
            };
            Ok(Box::new(GatewayClient::new(
                base_url,
                api_key,
                llm.model.clone(),
                llm.temperature,
            )))
        }
    }
}

/// Provider for `publish`; an English-only publish never calls the model, so
/// it does not need a configured one
pub fn publish_provider(settings: &Settings) -> Result<Box<dyn LLMProvider>> {
    if settings.needs_translation() {
        build_provider(settings)
    } else {
        Ok(Box::new(NoProvider))
    }
}

/// Stand-in when no target language needs translating
struct NoProvider;

#[async_trait]
impl LLMProvider for NoProvider {
    async fn complete(&self, _prompt: &Prompt, _schema: &SchemaDescriptor) -> Result<Completion, Error> {
        Err(Error::Llm(LlmError::CapabilityUnavailable {
            model: "none".to_string(),
            details: "no LLM provider configured".to_string(),
        }))
    }

    fn name(&self) -> &str {
        "none"
    }

    fn model(&self) -> &str {
        "none"
    }
}

/// Print an error with any manifest entry ids an operator has to fix
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "error:".red().bold(), err);
    if let Some(lib) = err.downcast_ref::<Error>() {
        let ids = lib.offending_ids();
        if !ids.is_empty() {
            eprintln!("\nOffending entries:");
            for id in ids {
                eprintln!("  - {}", id);
            }
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
