//! Claude CLI subprocess invocation with JSON parsing
//!
//! Invokes the `claude` CLI in print mode with JSON output, maps stderr
//! onto the capability error taxonomy and extracts token usage from the
//! result envelope. Timeouts and retries are applied by `llm::audit`.

use crate::error::{Error, LlmError};
use crate::llm::{Completion, LLMProvider, Prompt, SchemaDescriptor, TokenUsage};
use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Claude CLI client
#[derive(Debug, Clone)]
pub struct ClaudeClient {
    /// Model alias or id passed via `--model`
    model: String,
    /// Executable name or path
    binary: String,
}

impl ClaudeClient {
    /// Create a client for the given model
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            binary: "claude".to_string(),
        }
    }

    /// Use a different executable (e.g. an absolute path)
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Execute a single query attempt
    async fn query_once(&self, prompt: &Prompt) -> Result<Completion, Error> {
        // claude -p --output-format json --model <model> --append-system-prompt <system> <user>
        let mut cmd = Command::new(&self.binary);
        cmd.args([
            "-p",
            "--output-format",
            "json",
            "--model",
            &self.model,
            "--append-system-prompt",
            &prompt.system,
            &prompt.user,
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .stdin(Stdio::null())
        .kill_on_drop(true);

        debug!(
            "Executing: {} -p --output-format json --model {} [prompt: {} chars]",
            self.binary,
            self.model,
            prompt.user.len()
        );

        let child = cmd.spawn().map_err(|e| {
            Error::Llm(LlmError::CapabilityUnavailable {
                model: self.model.clone(),
                details: format!("Failed to spawn process: {}", e),
            })
        })?;

        let output = child.wait_with_output().await.map_err(|e| {
            Error::Llm(LlmError::CapabilityUnavailable {
                model: self.model.clone(),
                details: format!("Process error: {}", e),
            })
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(self.parse_error(&stderr));
        }

        let stdout = String::from_utf8(output.stdout).map_err(|e| {
            Error::Llm(LlmError::InvalidResponse {
                model: self.model.clone(),
                details: format!("Invalid UTF-8 in output: {}", e),
            })
        })?;

        let response: ClaudeResponse = serde_json::from_str(&stdout).map_err(|e| {
            Error::Llm(LlmError::InvalidResponse {
                model: self.model.clone(),
                details: format!(
                    "Failed to parse JSON: {}. Output: {}",
                    e,
                    stdout.chars().take(200).collect::<String>()
                ),
            })
        })?;

        if response.is_error {
            return Err(self.parse_error(&response.result));
        }

        debug!("Claude query completed successfully");
        Ok(Completion {
            text: response.result,
            usage: response.usage.map(|u| TokenUsage {
                prompt_tokens: u.input_tokens,
                completion_tokens: u.output_tokens,
            }),
        })
    }

    /// Parse error text to determine error type
    fn parse_error(&self, stderr: &str) -> Error {
        let lower = stderr.to_lowercase();

        if lower.contains("429") || lower.contains("rate limit") || lower.contains("quota exceeded") {
            return Error::Llm(LlmError::RateLimited {
                model: self.model.clone(),
                retry_after: extract_retry_after(stderr),
            });
        }

        if lower.contains("unauthorized") || lower.contains("authentication") || lower.contains("401") {
            return Error::Llm(LlmError::AuthenticationFailed(self.model.clone()));
        }

        Error::Llm(LlmError::CapabilityUnavailable {
            model: self.model.clone(),
            details: stderr.trim().to_string(),
        })
    }
}

/// Extract retry-after duration from an error message
pub(crate) fn extract_retry_after(text: &str) -> Option<u64> {
    // Patterns like "retry after 60 seconds" or "retry-after: 60"
    let re = regex::Regex::new(r"(?i)retry[- ]after:?\s*(\d+)").ok()?;
    re.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Result envelope printed by `claude -p --output-format json`
#[derive(Debug, Deserialize, Serialize)]
pub struct ClaudeResponse {
    /// The model's final text
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ClaudeUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
}

#[async_trait::async_trait]
impl LLMProvider for ClaudeClient {
    async fn complete(&self, prompt: &Prompt, _schema: &SchemaDescriptor) -> Result<Completion, Error> {
        // The schema is already embedded in the prompt text
        self.query_once(prompt).await
    }

    fn name(&self) -> &str {
        "claude-cli"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rate_limit_error() {
        let client = ClaudeClient::new("sonnet");
        let error = client.parse_error("Error: 429 Too Many Requests - retry after 30 seconds");
        assert!(matches!(
            error,
            Error::Llm(LlmError::RateLimited { retry_after: Some(30), .. })
        ));
    }

    #[test]
    fn test_parse_auth_error() {
        let client = ClaudeClient::new("sonnet");
        let error = client.parse_error("Error: 401 Unauthorized - authentication failed");
        assert!(matches!(error, Error::Llm(LlmError::AuthenticationFailed(_))));
    }

    #[test]
    fn test_parse_unavailable_error() {
        let client = ClaudeClient::new("sonnet");
        let error = client.parse_error("Error: 503 Service Unavailable");
        assert!(matches!(error, Error::Llm(LlmError::CapabilityUnavailable { .. })));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_extract_retry_after() {
        assert_eq!(extract_retry_after("retry after 60 seconds"), Some(60));
        assert_eq!(extract_retry_after("retry-after: 120"), Some(120));
        assert_eq!(extract_retry_after("no retry info"), None);
    }

    #[test]
    fn test_deserialize_claude_response() {
        let json = r#"{"type":"result","result":"{\"ok\":true}","is_error":false,
            "usage":{"input_tokens":120,"output_tokens":40}}"#;
        let response: ClaudeResponse = serde_json::from_str(json).unwrap();
        assert_eq!(response.result, "{\"ok\":true}");
        assert!(!response.is_error);
        assert_eq!(response.usage.unwrap().input_tokens, 120);
    }

    #[tokio::test]
    async fn test_missing_binary_is_unavailable() {
        let client = ClaudeClient::new("sonnet").with_binary("relnotes-no-such-binary");
        let prompt = Prompt {
            system: "s".to_string(),
            user: "u".to_string(),
        };
        let schema = SchemaDescriptor {
            name: "t",
            schema: serde_json::json!({}),
        };
        let result = client.complete(&prompt, &schema).await;
        assert!(matches!(
            result,
            Err(Error::Llm(LlmError::CapabilityUnavailable { .. }))
        ));
    }
}
