//! Core records passed between pipeline stages.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One harvested change. Never modified after the source returns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Full commit hash
    pub id: String,
    /// Abbreviated hash for display
    pub short_id: String,
    /// Author name and email
    pub author: String,
    /// Author timestamp (unix seconds)
    pub timestamp: i64,
    /// Full commit message
    pub message: String,
    /// Optional diff metadata
    #[serde(default)]
    pub metadata: ChangeMetadata,
}

/// Files touched and diff size of a change
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeMetadata {
    #[serde(default)]
    pub files: Vec<String>,
    #[serde(default)]
    pub insertions: u32,
    #[serde(default)]
    pub deletions: u32,
    #[serde(default)]
    pub parent_count: u32,
}

impl ChangeRecord {
    /// First line of the message
    pub fn subject(&self) -> &str {
        self.message.lines().next().unwrap_or("").trim()
    }

    /// Everything after the subject line, trimmed
    pub fn body(&self) -> &str {
        match self.message.split_once('\n') {
            Some((_, rest)) => rest.trim(),
            None => "",
        }
    }
}

/// Release-note category. Order of variants is the render order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Feature,
    Bugfix,
    Other,
}

impl Category {
    pub const ALL: [Category; 3] = [Category::Feature, Category::Bugfix, Category::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Feature => "feature",
            Category::Bugfix => "bugfix",
            Category::Other => "other",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "feature" => Some(Category::Feature),
            "bugfix" => Some(Category::Bugfix),
            "other" => Some(Category::Other),
            _ => None,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of the rule filter for one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterOutcome {
    /// A rule decided the change is user-facing
    Include(ClassificationResult),
    /// A rule decided the change is internal
    Exclude,
    /// No rule matched; escalate to the classifier
    Ambiguous,
}

/// Rule filter verdict attached to exactly one change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterDecision {
    pub change_id: String,
    pub outcome: FilterOutcome,
    /// Id of the rule that produced the outcome
    pub reason: &'static str,
}

/// Which path produced a classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Rule,
    Llm,
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClassificationSource::Rule => f.write_str("rule"),
            ClassificationSource::Llm => f.write_str("llm"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationResult {
    pub category: Category,
    pub title: String,
    pub description: String,
    /// Set only when the classifier could not confidently proceed
    pub clarification_question: Option<String>,
    pub source: ClassificationSource,
}

/// Final decision for a change after the classifier has run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Goes into the manifest
    Entry(ClassificationResult),
    /// Dropped, with the rule or policy that dropped it
    Dropped(&'static str),
}
