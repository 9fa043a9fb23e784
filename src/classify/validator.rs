//! Output contract for LLM responses.
//!
//! Raw model text is either turned into a fully conformant payload or
//! rejected with `SchemaViolation`. Nothing partial ever leaves this
//! module.

use crate::error::ValidationError;
use crate::filter::{MAX_DESCRIPTION_CHARS, MAX_TITLE_CHARS};
use crate::llm::SchemaDescriptor;
use crate::model::Category;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Classification verdict for one ambiguous change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ClassificationPayload {
    pub category: Category,
    /// User-facing title, at most 70 characters
    pub title: String,
    /// User-facing description, at most 240 characters
    pub description: String,
    /// Single concrete question for the author when information is insufficient
    #[serde(default)]
    pub clarification_question: Option<String>,
}

/// Batch translation of the public entries of one manifest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TranslationPayload {
    /// Target language code
    pub lang: String,
    pub entries: Vec<TranslatedEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct TranslatedEntry {
    pub id: String,
    pub title: String,
    pub description: String,
}

pub fn classification_schema() -> SchemaDescriptor {
    SchemaDescriptor {
        name: "release_note_classification",
        schema: schemars::schema_for!(ClassificationPayload).to_value(),
    }
}

pub fn translation_schema() -> SchemaDescriptor {
    SchemaDescriptor {
        name: "release_note_translation",
        schema: schemars::schema_for!(TranslationPayload).to_value(),
    }
}

/// Remove one surrounding markdown code fence, if present
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening line
    let rest = match rest.split_once('\n') {
        Some((_, body)) => body,
        None => return trimmed,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Validate a classification response
pub fn parse_classification(raw: &str) -> Result<ClassificationPayload, ValidationError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err(violation("empty response"));
    }

    let mut payload: ClassificationPayload =
        serde_json::from_str(text).map_err(|e| violation(format!("invalid classification: {}", e)))?;

    payload.title = payload.title.trim().to_string();
    payload.description = payload.description.trim().to_string();
    payload.clarification_question = payload
        .clarification_question
        .map(|q| q.trim().to_string())
        .filter(|q| !q.is_empty());

    check_text("title", &payload.title, MAX_TITLE_CHARS)?;
    check_text("description", &payload.description, MAX_DESCRIPTION_CHARS)?;

    Ok(payload)
}

/// Validate a translation response against the requested language and ids.
///
/// Returns the translated entries in the order of `expected_ids`.
pub fn parse_translation(
    raw: &str,
    lang: &str,
    expected_ids: &[String],
) -> Result<Vec<TranslatedEntry>, ValidationError> {
    let text = strip_code_fence(raw);
    if text.is_empty() {
        return Err(violation("empty response"));
    }

    let payload: TranslationPayload =
        serde_json::from_str(text).map_err(|e| violation(format!("invalid translation: {}", e)))?;

    if payload.lang.trim() != lang {
        return Err(violation(format!(
            "expected lang '{}', got '{}'",
            lang, payload.lang
        )));
    }

    let expected: HashSet<&str> = expected_ids.iter().map(String::as_str).collect();
    let mut by_id: HashMap<String, TranslatedEntry> = HashMap::new();

    for entry in payload.entries {
        if !expected.contains(entry.id.as_str()) {
            return Err(violation(format!("unexpected entry id '{}'", entry.id)));
        }
        let entry = TranslatedEntry {
            id: entry.id,
            title: entry.title.trim().to_string(),
            description: entry.description.trim().to_string(),
        };
        check_text("title", &entry.title, MAX_TITLE_CHARS)
            .and_then(|_| check_text("description", &entry.description, MAX_DESCRIPTION_CHARS))
            .map_err(|e| violation(format!("entry {}: {}", entry.id, e)))?;
        if by_id.contains_key(&entry.id) {
            return Err(violation(format!("duplicate entry id '{}'", entry.id)));
        }
        by_id.insert(entry.id.clone(), entry);
    }

    let missing: Vec<&str> = expected_ids
        .iter()
        .filter(|id| !by_id.contains_key(id.as_str()))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() {
        return Err(violation(format!("missing entries: {}", missing.join(", "))));
    }

    Ok(expected_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect())
}

fn check_text(field: &str, value: &str, max: usize) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(violation(format!("{} is empty", field)));
    }
    let len = value.chars().count();
    if len > max {
        return Err(violation(format!("{} has {} chars (max {})", field, len, max)));
    }
    Ok(())
}

fn violation(details: impl Into<String>) -> ValidationError {
    ValidationError::SchemaViolation(details.into())
}
