//! Audited, budgeted LLM invocation.
//!
//! Wraps a provider call with a per-attempt timeout and bounded
//! exponential-backoff retries for transport failures. Each attempt emits
//! exactly one structured audit event on the `relnotes::llm` target with
//! operation, model, latency and token usage, whether it succeeded or not.

use crate::error::{Error, LlmError};
use crate::llm::{CallBudget, Completion, LLMProvider, Prompt, SchemaDescriptor};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Call `provider` within `budget`, logging every attempt.
pub async fn invoke(
    provider: &dyn LLMProvider,
    operation: &str,
    run_id: &str,
    prompt: &Prompt,
    schema: &SchemaDescriptor,
    budget: &CallBudget,
) -> Result<Completion, Error> {
    let max_attempts = budget.max_retries.saturating_add(1);
    let mut attempts = 0;
    let mut backoff_ms = budget.backoff_ms;

    loop {
        attempts += 1;
        let started = Instant::now();
        let result = match tokio::time::timeout(
            Duration::from_secs(budget.timeout_secs),
            provider.complete(prompt, schema),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(Error::Llm(LlmError::Timeout {
                model: provider.model().to_string(),
                secs: budget.timeout_secs,
            })),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(completion) => {
                let usage = completion.usage.unwrap_or_default();
                info!(
                    target: "relnotes::llm",
                    operation,
                    provider = provider.name(),
                    model = provider.model(),
                    run_id,
                    attempt = attempts,
                    latency_ms,
                    prompt_tokens = usage.prompt_tokens,
                    completion_tokens = usage.completion_tokens,
                    usage_reported = completion.usage.is_some(),
                    outcome = "ok",
                    "llm_call"
                );
            }
            Err(e) => {
                info!(
                    target: "relnotes::llm",
                    operation,
                    provider = provider.name(),
                    model = provider.model(),
                    run_id,
                    attempt = attempts,
                    latency_ms,
                    prompt_tokens = 0u64,
                    completion_tokens = 0u64,
                    usage_reported = false,
                    outcome = "error",
                    error = %e,
                    "llm_call"
                );
            }
        }

        match result {
            Ok(completion) => return Ok(completion),
            Err(e) if e.is_retryable() && attempts < max_attempts => {
                let delay = retry_delay(&e, backoff_ms);
                warn!(
                    "{} call failed (attempt {}/{}), retrying in {}ms: {}",
                    operation, attempts, max_attempts, delay, e
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
                backoff_ms = backoff_ms.saturating_mul(2);
            }
            Err(e) => {
                warn!("{} call failed after {} attempts: {}", operation, attempts, e);
                return Err(e);
            }
        }
    }
}

/// Backoff before the next attempt; a rate limit's `retry_after` wins when longer.
fn retry_delay(error: &Error, backoff_ms: u64) -> u64 {
    match error {
        Error::Llm(LlmError::RateLimited { retry_after: Some(secs), .. }) => {
            secs.saturating_mul(1000).max(backoff_ms)
        }
        _ => backoff_ms,
    }
}
