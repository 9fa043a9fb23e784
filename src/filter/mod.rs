//! Deterministic rule filter.
//!
//! Each change is checked against a fixed, ordered rule list. The first
//! rule that matches supplies both the outcome and the reason. Changes no
//! rule matches are ambiguous and escalate to the LLM classifier.
//!
//! Rules only look at the change record and the static filter config, so
//! filtering the same record twice always yields the same decision.

use crate::model::{
    Category, ChangeRecord, ClassificationResult, ClassificationSource, FilterDecision,
    FilterOutcome,
};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Maximum characters in a release-note title
pub const MAX_TITLE_CHARS: usize = 70;

/// Maximum characters in a release-note description
pub const MAX_DESCRIPTION_CHARS: usize = 240;

/// Rule ids, in evaluation order
pub const RULE_MERGE: &str = "merge-commit";
pub const RULE_VERSION_BUMP: &str = "version-bump";
pub const RULE_MAINTENANCE: &str = "maintenance-type";
pub const RULE_BODY_BUMP: &str = "body-version-bump";
pub const RULE_INTERNAL_PATHS: &str = "internal-paths-only";
pub const RULE_FEAT: &str = "conventional-feat";
pub const RULE_FIX: &str = "conventional-fix";
pub const RULE_NONE: &str = "no-rule-matched";

/// Configuration for the rule filter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Include `feat:`/`fix:` commits without asking the LLM (opt-in)
    #[serde(default = "default_conventional_include")]
    pub conventional_include: bool,
    /// Path prefixes (or `*_test.*` style suffix globs) that are never user-facing
    #[serde(default = "default_internal_paths")]
    pub internal_paths: Vec<String>,
}

fn default_conventional_include() -> bool {
    false
}

fn default_internal_paths() -> Vec<String> {
    [".github/", "docs/", "doc/", "test/", "tests/", "ci/", "*_test.*"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            conventional_include: default_conventional_include(),
            internal_paths: default_internal_paths(),
        }
    }
}

fn merge_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^Merge (pull request #\d+|branch |remote-tracking branch )")
            .expect("valid merge regex")
    })
}

fn conventional_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<type>[a-zA-Z]+)(\([^)]*\))?!?:\s*").expect("valid conventional regex")
    })
}

fn subject_bump_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(bump|version|release)\b|^v?\d+\.\d+\.\d+\S*$")
            .expect("valid bump regex")
    })
}

fn body_bump_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\b(bump|version)\b").expect("valid body regex"))
}

const MAINTENANCE_TYPES: &[&str] = &[
    "chore", "refactor", "ci", "test", "tests", "build", "style", "docs",
];

/// Lower-cased conventional-commit type of a subject, if any
pub fn conventional_type(subject: &str) -> Option<String> {
    conventional_re()
        .captures(subject.trim())
        .and_then(|caps| caps.name("type"))
        .map(|m| m.as_str().to_lowercase())
}

/// Run the rule filter over one change
pub fn filter_change(record: &ChangeRecord, config: &FilterConfig) -> FilterDecision {
    let (outcome, reason) = evaluate(record, config);
    FilterDecision {
        change_id: record.id.clone(),
        outcome,
        reason,
    }
}

/// Run the rule filter over a batch, keeping source order
pub fn filter_all(records: &[ChangeRecord], config: &FilterConfig) -> Vec<FilterDecision> {
    records.iter().map(|r| filter_change(r, config)).collect()
}

fn evaluate(record: &ChangeRecord, config: &FilterConfig) -> (FilterOutcome, &'static str) {
    let subject = record.subject();
    let body = record.body();
    let ctype = conventional_type(subject);

    if record.metadata.parent_count > 1 || merge_re().is_match(subject) {
        return (FilterOutcome::Exclude, RULE_MERGE);
    }

    if subject_bump_re().is_match(subject) {
        return (FilterOutcome::Exclude, RULE_VERSION_BUMP);
    }

    if let Some(t) = ctype.as_deref() {
        if MAINTENANCE_TYPES.contains(&t) {
            return (FilterOutcome::Exclude, RULE_MAINTENANCE);
        }
    }

    let is_feat_or_fix = matches!(ctype.as_deref(), Some("feat") | Some("fix"));
    if !is_feat_or_fix && body_bump_re().is_match(body) {
        return (FilterOutcome::Exclude, RULE_BODY_BUMP);
    }

    let files = &record.metadata.files;
    if !files.is_empty() && files.iter().all(|f| is_internal_path(f, &config.internal_paths)) {
        return (FilterOutcome::Exclude, RULE_INTERNAL_PATHS);
    }

    if config.conventional_include {
        match ctype.as_deref() {
            Some("feat") => {
                let result = rule_classification(record, Category::Feature);
                return (FilterOutcome::Include(result), RULE_FEAT);
            }
            Some("fix") => {
                let result = rule_classification(record, Category::Bugfix);
                return (FilterOutcome::Include(result), RULE_FIX);
            }
            _ => {}
        }
    }

    (FilterOutcome::Ambiguous, RULE_NONE)
}

/// Check a path against prefix patterns and `*suffix` globs
fn is_internal_path(path: &str, patterns: &[String]) -> bool {
    let lower = path.to_lowercase();
    patterns.iter().any(|pattern| {
        let pattern = pattern.to_lowercase();
        match pattern.strip_prefix('*') {
            Some(rest) => match rest.split_once('*') {
                Some((middle, _)) => lower
                    .rsplit('/')
                    .next()
                    .map(|name| name.contains(middle))
                    .unwrap_or(false),
                None => lower.ends_with(rest),
            },
            None => lower.starts_with(&pattern),
        }
    })
}

fn rule_classification(record: &ChangeRecord, category: Category) -> ClassificationResult {
    let title = title_from_subject(record.subject());
    let first_paragraph = record.body().split("\n\n").next().unwrap_or("").trim();
    let description = if first_paragraph.is_empty() {
        title.clone()
    } else {
        let flattened = first_paragraph.split_whitespace().collect::<Vec<_>>().join(" ");
        truncate_chars(&flattened, MAX_DESCRIPTION_CHARS)
    };

    ClassificationResult {
        category,
        title,
        description,
        clarification_question: None,
        source: ClassificationSource::Rule,
    }
}

/// Turn a conventional subject into a user-facing title.
///
/// Strips a `type(scope): ` prefix, upper-cases the first letter and
/// bounds the length.
pub fn title_from_subject(subject: &str) -> String {
    let trimmed = subject.trim();
    let stripped = match conventional_re().find(trimmed) {
        Some(m) => &trimmed[m.end()..],
        None => trimmed,
    };
    let stripped = stripped.trim();
    let stripped = if stripped.is_empty() { "Untitled change" } else { stripped };

    let mut chars = stripped.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    truncate_chars(&capitalized, MAX_TITLE_CHARS)
}

/// Truncate to at most `max` characters on a char boundary
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let cut: String = text.chars().take(max.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}
