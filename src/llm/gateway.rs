//! OpenAI-compatible chat-completions gateway.
//!
//! Sends the system and user prompt as chat messages and requests a
//! `json_schema` response format built from the schema descriptor.

use crate::error::{Error, LlmError};
use crate::llm::claude::extract_retry_after;
use crate::llm::{Completion, LLMProvider, Prompt, SchemaDescriptor, TokenUsage};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// HTTP client for an OpenAI-compatible endpoint
pub struct GatewayClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    response_format: ResponseFormat<'a>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ResponseFormat<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    json_schema: JsonSchemaFormat<'a>,
}

#[derive(Debug, Serialize)]
struct JsonSchemaFormat<'a> {
    name: &'a str,
    schema: &'a serde_json::Value,
}

/// Chat completion response (subset)
#[derive(Debug, Deserialize)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

impl GatewayClient {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
        temperature: f32,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn status_error(&self, status: StatusCode, retry_after: Option<u64>, body: &str) -> Error {
        match status {
            StatusCode::TOO_MANY_REQUESTS => Error::Llm(LlmError::RateLimited {
                model: self.model.clone(),
                retry_after: retry_after.or_else(|| extract_retry_after(body)),
            }),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Error::Llm(LlmError::AuthenticationFailed(self.model.clone()))
            }
            _ => Error::Llm(LlmError::CapabilityUnavailable {
                model: self.model.clone(),
                details: format!("HTTP {}: {}", status, body.chars().take(200).collect::<String>()),
            }),
        }
    }
}

/// Pull the message text and usage out of a chat response
pub fn extract_completion(model: &str, response: ChatResponse) -> Result<Completion, Error> {
    let text = response
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| {
            Error::Llm(LlmError::InvalidResponse {
                model: model.to_string(),
                details: "response has no message content".to_string(),
            })
        })?;

    Ok(Completion {
        text,
        usage: response.usage.map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
        }),
    })
}

#[async_trait::async_trait]
impl LLMProvider for GatewayClient {
    async fn complete(&self, prompt: &Prompt, schema: &SchemaDescriptor) -> Result<Completion, Error> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage { role: "system", content: &prompt.system },
                ChatMessage { role: "user", content: &prompt.user },
            ],
            temperature: self.temperature,
            response_format: ResponseFormat {
                kind: "json_schema",
                json_schema: JsonSchemaFormat {
                    name: schema.name,
                    schema: &schema.schema,
                },
            },
        };

        debug!("POST {} [prompt: {} chars]", self.endpoint(), prompt.user.len());

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                Error::Llm(LlmError::CapabilityUnavailable {
                    model: self.model.clone(),
                    details: format!("Failed to send request: {}", e),
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse().ok());
            let body = response.text().await.unwrap_or_default();
            return Err(self.status_error(status, retry_after, &body));
        }

        let parsed = response.json::<ChatResponse>().await.map_err(|e| {
            Error::Llm(LlmError::InvalidResponse {
                model: self.model.clone(),
                details: format!("Failed to parse response: {}", e),
            })
        })?;

        extract_completion(&self.model, parsed)
    }

    fn name(&self) -> &str {
        "gateway"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> GatewayClient {
        GatewayClient::new("https://gateway.example.com/v1/", "key", "gpt-4.1", 0.2)
    }

    #[test]
    fn test_endpoint_trims_slash() {
        assert_eq!(client().endpoint(), "https://gateway.example.com/v1/chat/completions");
    }

    #[test]
    fn test_status_mapping() {
        let c = client();
        assert!(matches!(
            c.status_error(StatusCode::TOO_MANY_REQUESTS, Some(12), ""),
            Error::Llm(LlmError::RateLimited { retry_after: Some(12), .. })
        ));
        assert!(matches!(
            c.status_error(StatusCode::UNAUTHORIZED, None, ""),
            Error::Llm(LlmError::AuthenticationFailed(_))
        ));
        assert!(matches!(
            c.status_error(StatusCode::BAD_GATEWAY, None, "upstream"),
            Error::Llm(LlmError::CapabilityUnavailable { .. })
        ));
    }

    #[test]
    fn test_extract_completion() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"{\"a\":1}"}}],
            "usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#;
        let response: ChatResponse = serde_json::from_str(json).unwrap();
        let completion = extract_completion("gpt-4.1", response).unwrap();
        assert_eq!(completion.text, "{\"a\":1}");
        assert_eq!(
            completion.usage,
            Some(TokenUsage { prompt_tokens: 10, completion_tokens: 5 })
        );
    }

    #[test]
    fn test_extract_completion_without_choices() {
        let response: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            extract_completion("gpt-4.1", response),
            Err(Error::Llm(LlmError::InvalidResponse { .. }))
        ));
    }
}
