//! Prompt templates for classification and translation.
//!
//! Prompts embed the exact JSON schema the response must satisfy, so the
//! same text works for providers with and without native structured output.

use crate::llm::{Prompt, SchemaDescriptor};
use crate::model::ChangeRecord;

/// Maximum touched files listed in a classification prompt
const MAX_FILES_PER_PROMPT: usize = 50;

/// Maximum body characters included in a classification prompt
const MAX_BODY_CHARS: usize = 2000;

pub const CLASSIFY_SYSTEM_PROMPT: &str = "You are assisting with publishing user-facing release notes.\n\
Rules:\n\
- Classify strictly as feature, bugfix or other; internal-only work is other.\n\
- Write for end users: clear, concise, minimal jargon.\n\
- If information is insufficient, provide a single concrete clarification_question to ask the author.\n\
Return ONLY valid JSON matching the requested schema. No extra text.";

pub const TRANSLATE_SYSTEM_PROMPT: &str = "You are a professional technical writer translating release notes.\n\
Constraints:\n\
- Translate only the title and description of each entry.\n\
- Keep every id exactly as given. Do not add or remove entries.\n\
- Preserve inline code, code spans, URLs and product names unchanged.\n\
Return ONLY valid JSON matching the requested schema. No extra text.";

/// Build the prompt for one ambiguous change.
///
/// Includes author, subject, body, touched files and diff stats: enough
/// signal for a decision while keeping token usage low.
pub fn build_classification_prompt(record: &ChangeRecord, schema: &SchemaDescriptor) -> Prompt {
    let mut user = String::from(
        "Write the release note entry for the following change.\n\n\
         Constraints:\n\
         - title <= 70 chars\n\
         - description <= 240 chars\n\n",
    );

    user.push_str("SCHEMA:\n");
    user.push_str(&schema_text(schema));
    user.push_str("\n\n--- CHANGE ---\n\n");

    let body: String = record.body().chars().take(MAX_BODY_CHARS).collect();
    user.push_str(&format!(
        "author: {}\nsubject: {}\nbody: {}\n",
        record.author,
        record.subject(),
        if body.is_empty() { "(none)" } else { body.as_str() },
    ));

    let meta = &record.metadata;
    user.push_str(&format!(
        "diff: {} files changed, +{} -{}\n",
        meta.files.len(),
        meta.insertions,
        meta.deletions
    ));

    if !meta.files.is_empty() {
        user.push_str("files:\n");
        for file in meta.files.iter().take(MAX_FILES_PER_PROMPT) {
            user.push_str(&format!("  - {}\n", file));
        }
        if meta.files.len() > MAX_FILES_PER_PROMPT {
            user.push_str(&format!(
                "  ({} more files not shown)\n",
                meta.files.len() - MAX_FILES_PER_PROMPT
            ));
        }
    }

    Prompt {
        system: CLASSIFY_SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Build the batch translation prompt for one language.
///
/// `entries` are `(id, title, description)` triples in manifest order.
pub fn build_translation_prompt(
    lang_code: &str,
    lang_name: &str,
    entries: &[(String, String, String)],
    schema: &SchemaDescriptor,
) -> Prompt {
    let mut user = format!(
        "Translate the following release note entries into {} (language code \"{}\").\n\
         Set \"lang\" to \"{}\" and return one translated entry per id.\n\
         Titles must stay within 70 chars and descriptions within 240 chars.\n\n",
        lang_name, lang_code, lang_code
    );

    user.push_str("SCHEMA:\n");
    user.push_str(&schema_text(schema));
    user.push_str("\n\n--- ENTRIES ---\n\n");

    let listed: Vec<serde_json::Value> = entries
        .iter()
        .map(|(id, title, description)| {
            serde_json::json!({ "id": id, "title": title, "description": description })
        })
        .collect();
    user.push_str(&serde_json::to_string_pretty(&listed).unwrap_or_default());
    user.push('\n');

    Prompt {
        system: TRANSLATE_SYSTEM_PROMPT.to_string(),
        user,
    }
}

fn schema_text(schema: &SchemaDescriptor) -> String {
    serde_json::to_string_pretty(&schema.schema).unwrap_or_default()
}
