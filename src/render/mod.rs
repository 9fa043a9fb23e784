//! Deterministic markdown rendering of a reviewed manifest.
//!
//! No I/O, clock or randomness: the only timestamp comes from the manifest
//! metadata, so the same manifest always renders to the same bytes.

pub mod translate;

use crate::classify::validator::TranslatedEntry;
use crate::error::ManifestError;
use crate::model::Category;
use crate::review::{ManifestState, ReviewEntry, ReviewManifest};
use std::collections::HashMap;

/// Language of documents rendered straight from the manifest
pub const BASE_LANG: &str = "en";

/// Heading of the untranslated reviewer section
pub const INTERNAL_HEADING: &str = "Reviewer notes (internal)";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// User-facing category section, subject to translation
    Public(Category),
    /// Workflow notes for the documentation owner, never translated
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedItem {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub kind: SectionKind,
    pub heading: String,
    pub items: Vec<RenderedItem>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedDocument {
    pub lang_code: String,
    pub source_manifest_id: String,
    pub sections: Vec<Section>,
    /// Markdown bytes
    pub body: String,
}

pub fn section_heading(category: Category) -> &'static str {
    match category {
        Category::Feature => "Features",
        Category::Bugfix => "Bug Fixes",
        Category::Other => "Other Changes",
    }
}

fn empty_placeholder(category: Category) -> &'static str {
    match category {
        Category::Feature => "_No user-facing features in this release._",
        Category::Bugfix => "_No user-facing bug fixes in this release._",
        Category::Other => "_No other changes in this release._",
    }
}

/// Render the base-language document
pub fn render(manifest: &ReviewManifest) -> Result<RenderedDocument, ManifestError> {
    render_localized(manifest, BASE_LANG, &HashMap::new())
}

/// Render with per-entry title/description replacements keyed by entry id.
///
/// Entries without a replacement keep the reviewed text. Only public
/// sections are affected; the internal section is always the base text.
pub fn render_localized(
    manifest: &ReviewManifest,
    lang_code: &str,
    translations: &HashMap<String, TranslatedEntry>,
) -> Result<RenderedDocument, ManifestError> {
    if !matches!(manifest.state, ManifestState::Reviewed | ManifestState::Published) {
        return Err(ManifestError::InvalidTransition {
            from: manifest.state.to_string(),
            to: "rendered".to_string(),
        });
    }

    let publishable: Vec<&ReviewEntry> = manifest.publishable().collect();
    let mut sections = Vec::new();

    for category in Category::ALL {
        let items = publishable
            .iter()
            .filter(|e| e.category == category)
            .map(|e| {
                let (title, description) = match translations.get(&e.id) {
                    Some(t) => (t.title.clone(), t.description.clone()),
                    None => (e.title.clone(), e.description.clone()),
                };
                RenderedItem {
                    id: e.id.clone(),
                    title,
                    description,
                    author: e.author.clone(),
                    url: e.url.clone(),
                }
            })
            .collect();
        sections.push(Section {
            kind: SectionKind::Public(category),
            heading: section_heading(category).to_string(),
            items,
        });
    }

    let noted: Vec<&&ReviewEntry> = publishable
        .iter()
        .filter(|e| e.clarification_question.is_some())
        .collect();

    let mut body = String::new();
    body.push_str("# Release Notes\n\n");
    body.push_str(&format!(
        "_Changes: {} → {}_\n\n",
        manifest.run.from_ref, manifest.run.to_ref
    ));
    body.push_str(&format!(
        "_Generated at: {}_\n",
        manifest.run.generated_at.format("%Y-%m-%d %H:%M UTC")
    ));

    for section in &sections {
        body.push_str(&format!("\n## {}\n\n", section.heading));
        if section.items.is_empty() {
            if let SectionKind::Public(category) = section.kind {
                body.push_str(empty_placeholder(category));
                body.push('\n');
            }
            continue;
        }
        for item in &section.items {
            body.push_str(&format_item(item));
        }
    }

    if !noted.is_empty() {
        body.push_str(&format!("\n---\n\n## {}\n\n", INTERNAL_HEADING));
        let mut items = Vec::new();
        for entry in noted {
            let question = entry.clarification_question.as_deref().unwrap_or_default();
            let answer = entry.clarification_answer.as_deref().unwrap_or("_unanswered_");
            body.push_str(&format!(
                "- {}\n  - Question: {}\n  - Answer: {}\n",
                entry.subject, question, answer
            ));
            items.push(RenderedItem {
                id: entry.id.clone(),
                title: entry.subject.clone(),
                description: question.to_string(),
                author: entry.author.clone(),
                url: entry.url.clone(),
            });
        }
        sections.push(Section {
            kind: SectionKind::Internal,
            heading: INTERNAL_HEADING.to_string(),
            items,
        });
    }

    Ok(RenderedDocument {
        lang_code: lang_code.to_string(),
        source_manifest_id: manifest.run.manifest_id.clone(),
        sections,
        body,
    })
}

fn format_item(item: &RenderedItem) -> String {
    let link = item
        .url
        .as_deref()
        .map(|url| format!(" ([details]({}))", url))
        .unwrap_or_default();
    let mut out = format!("- **{}**{}\n", item.title, link);
    if !item.description.is_empty() {
        out.push_str(&format!("  - {}\n", item.description));
    }
    out.push_str(&format!("  - Author: {}\n", item.author));
    out
}
