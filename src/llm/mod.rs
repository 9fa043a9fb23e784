//! LLM capability abstraction and implementations
//!
//! The pipeline talks to a model only through the `LLMProvider` trait.
//! Two providers ship: the `claude` CLI as a subprocess, and an
//! OpenAI-compatible HTTP gateway. Every call goes through
//! `audit::invoke`, which applies the timeout/retry budget and writes the
//! per-call audit record.

pub mod audit;
pub mod claude;
pub mod gateway;
pub mod parallel;

use crate::error::Error;
use serde::Serialize;

/// A prompt split into the policy part and the per-call part
#[derive(Debug, Clone, PartialEq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

/// Named JSON schema the response must satisfy
#[derive(Debug, Clone)]
pub struct SchemaDescriptor {
    pub name: &'static str,
    pub schema: serde_json::Value,
}

/// Token counts reported by the capability, when available
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Raw model output plus accounting
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
    pub usage: Option<TokenUsage>,
}

impl Completion {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Timeout and transport-retry budget for one unit of work
#[derive(Debug, Clone, Copy)]
pub struct CallBudget {
    /// Per-attempt timeout
    pub timeout_secs: u64,
    /// Retries after the first attempt for retryable transport errors
    pub max_retries: u32,
    /// First backoff delay, doubled on each retry
    pub backoff_ms: u64,
}

impl Default for CallBudget {
    fn default() -> Self {
        Self {
            timeout_secs: 60,
            max_retries: 3,
            backoff_ms: 1000,
        }
    }
}

/// Common trait for LLM providers
#[async_trait::async_trait]
pub trait LLMProvider: Send + Sync {
    /// Send a prompt and return the raw response text.
    ///
    /// Fails with transport-level `LlmError`s only; whether the text
    /// matches `schema` is for the output validator to decide.
    async fn complete(&self, prompt: &Prompt, schema: &SchemaDescriptor) -> Result<Completion, Error>;

    /// Provider name (e.g., "claude-cli", "gateway")
    fn name(&self) -> &str;

    /// Model identity recorded in the audit log
    fn model(&self) -> &str;
}
