//! Ambiguity classifier.
//!
//! Resolves changes the rule filter could not decide by asking the LLM
//! for a schema-constrained verdict. Malformed or schema-violating
//! responses are retried with the identical prompt up to `max_attempts`.
//! When no acceptable answer arrives, the configured fallback policy
//! decides what happens to the change.

pub mod prompts;
pub mod validator;

use crate::error::{ClassificationError, Error};
use crate::filter::{title_from_subject, truncate_chars, MAX_DESCRIPTION_CHARS};
use crate::llm::{audit, parallel, CallBudget, LLMProvider};
use crate::model::{Category, ChangeRecord, ClassificationResult, ClassificationSource, Resolution};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Reason recorded when the LLM accepts a change
pub const REASON_LLM_CLASSIFIED: &str = "llm-classified";

/// Reason recorded when an unresolved change is kept for the reviewer
pub const REASON_UNRESOLVED_ESCALATED: &str = "unresolved-escalated";

/// Reason recorded when an unresolved change is discarded by policy
pub const REASON_UNRESOLVED_DISCARDED: &str = "unresolved-discarded";

/// What to do with a change the classifier could not resolve
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackPolicy {
    /// Keep it as `other` with a clarification question for the reviewer
    #[default]
    Escalate,
    /// Drop it and report it in the run summary
    Discard,
}

#[derive(Debug, Clone)]
pub struct ClassifierSettings {
    /// Schema-level attempts per change
    pub max_attempts: u32,
    /// Transport budget per attempt
    pub budget: CallBudget,
    pub on_unresolved: FallbackPolicy,
    /// Concurrent classification calls
    pub workers: usize,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            budget: CallBudget::default(),
            on_unresolved: FallbackPolicy::default(),
            workers: 4,
        }
    }
}

/// Final resolution of an ambiguous change
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedChange {
    pub resolution: Resolution,
    /// Last failure when the fallback policy was applied
    pub unresolved: Option<String>,
}

pub struct AmbiguityClassifier<'a> {
    provider: &'a dyn LLMProvider,
    settings: ClassifierSettings,
    run_id: String,
}

impl<'a> AmbiguityClassifier<'a> {
    pub fn new(provider: &'a dyn LLMProvider, settings: ClassifierSettings, run_id: impl Into<String>) -> Self {
        Self {
            provider,
            settings,
            run_id: run_id.into(),
        }
    }

    /// Ask the LLM about one change.
    ///
    /// Fails with `ClassificationError::Unresolved` when attempts or the
    /// transport budget run out, and passes fatal errors (e.g. rejected
    /// credentials) through as-is.
    pub async fn classify(&self, record: &ChangeRecord) -> Result<ClassificationResult, Error> {
        let schema = validator::classification_schema();
        let prompt = prompts::build_classification_prompt(record, &schema);
        let max_attempts = self.settings.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let completion = match audit::invoke(
                self.provider,
                "classify",
                &self.run_id,
                &prompt,
                &schema,
                &self.settings.budget,
            )
            .await
            {
                Ok(c) => c,
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    // Transport budget already spent inside invoke
                    return Err(unresolved(record, attempt, e.to_string()));
                }
            };

            match validator::parse_classification(&completion.text) {
                Ok(payload) => {
                    debug!("{} classified as {}", record.short_id, payload.category);
                    return Ok(ClassificationResult {
                        category: payload.category,
                        title: payload.title,
                        description: payload.description,
                        clarification_question: payload.clarification_question,
                        source: ClassificationSource::Llm,
                    });
                }
                Err(e) => {
                    warn!(
                        "{} response rejected (attempt {}/{}): {}",
                        record.short_id, attempt, max_attempts, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(unresolved(record, max_attempts, last_error))
    }

    /// Classify one change and apply the fallback policy if it stays unresolved
    pub async fn resolve(&self, record: &ChangeRecord) -> Result<ClassifiedChange, Error> {
        match self.classify(record).await {
            Ok(result) => Ok(ClassifiedChange {
                resolution: Resolution::Entry(result),
                unresolved: None,
            }),
            Err(Error::Classification(ClassificationError::Unresolved { last_error, .. })) => {
                warn!(
                    "{} unresolved, applying {:?} policy: {}",
                    record.short_id, self.settings.on_unresolved, last_error
                );
                let resolution = fallback(record, self.settings.on_unresolved, &last_error);
                Ok(ClassifiedChange {
                    resolution,
                    unresolved: Some(last_error),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve a batch through the bounded worker pool, keeping input order
    pub async fn resolve_all(
        &self,
        records: &[&ChangeRecord],
    ) -> Result<Vec<(String, ClassifiedChange)>, Error> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        info!(
            "Classifying {} ambiguous changes with {} workers",
            records.len(),
            self.settings.workers
        );

        let items: Vec<(String, &ChangeRecord)> =
            records.iter().map(|r| (r.id.clone(), *r)).collect();
        let results =
            parallel::dispatch_keyed(items, self.settings.workers, |_, record| self.resolve(record))
                .await;

        results
            .into_iter()
            .map(|(id, result)| result.map(|classified| (id, classified)))
            .collect()
    }
}

fn unresolved(record: &ChangeRecord, attempts: u32, last_error: String) -> Error {
    Error::Classification(ClassificationError::Unresolved {
        id: record.id.clone(),
        attempts,
        last_error,
    })
}

/// Resolution for a change the classifier gave up on
pub fn fallback(record: &ChangeRecord, policy: FallbackPolicy, last_error: &str) -> Resolution {
    match policy {
        FallbackPolicy::Discard => Resolution::Dropped(REASON_UNRESOLVED_DISCARDED),
        FallbackPolicy::Escalate => {
            let title = title_from_subject(record.subject());
            let body = record.body().split_whitespace().collect::<Vec<_>>().join(" ");
            let description = if body.is_empty() {
                title.clone()
            } else {
                truncate_chars(&body, MAX_DESCRIPTION_CHARS)
            };
            Resolution::Entry(ClassificationResult {
                category: Category::Other,
                title,
                description,
                clarification_question: Some(format!(
                    "Automatic classification failed ({}). Should this change appear in the \
                     release notes, and under which category?",
                    truncate_chars(last_error, 160)
                )),
                source: ClassificationSource::Llm,
            })
        }
    }
}
