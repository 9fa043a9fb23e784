//! Review manifest: the human-in-the-loop checkpoint.
//!
//! Drafted entries are written to a human-editable TOML file. A reviewer
//! approves, edits or rejects each entry, then the file is reloaded as
//! untrusted input and reconciled against the drafted copy. Only the
//! reconciled, reviewed manifest feeds the renderer.

pub mod store;

pub use store::{ManifestStatus, ManifestStore};

use crate::error::{EntryProblem, ManifestError};
use crate::model::{Category, ChangeRecord, ClassificationResult, ClassificationSource};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// Reviewer verdict on one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Edited,
    Rejected,
}

impl ReviewStatus {
    pub const ALL: [ReviewStatus; 4] = [
        ReviewStatus::Pending,
        ReviewStatus::Approved,
        ReviewStatus::Edited,
        ReviewStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewStatus::Pending => "pending",
            ReviewStatus::Approved => "approved",
            ReviewStatus::Edited => "edited",
            ReviewStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// Approved and edited entries are published
    pub fn is_publishable(&self) -> bool {
        matches!(self, ReviewStatus::Approved | ReviewStatus::Edited)
    }
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Manifest lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ManifestState {
    Draft,
    AwaitingHumanReview,
    Reviewed,
    Published,
}

impl ManifestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ManifestState::Draft => "draft",
            ManifestState::AwaitingHumanReview => "awaiting_human_review",
            ManifestState::Reviewed => "reviewed",
            ManifestState::Published => "published",
        }
    }

    /// Move to `to`, or fail if the lifecycle does not allow it.
    ///
    /// Reviewed and Published may repeat: a reviewer can re-edit before
    /// publishing, and publishing can be re-run for withheld languages.
    pub fn transition(self, to: ManifestState) -> Result<ManifestState, ManifestError> {
        use ManifestState::*;
        match (self, to) {
            (Draft, AwaitingHumanReview)
            | (AwaitingHumanReview, Reviewed)
            | (Reviewed, Reviewed)
            | (Reviewed, Published)
            | (Published, Published) => Ok(to),
            _ => Err(ManifestError::InvalidTransition {
                from: self.as_str().to_string(),
                to: to.as_str().to_string(),
            }),
        }
    }
}

impl fmt::Display for ManifestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One reviewable release-note entry.
///
/// Humans may edit `review_status`, `category`, `title`, `description`
/// and `clarification_answer`. Everything else is read-only provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewEntry {
    /// Full commit hash
    pub id: String,
    pub review_status: ReviewStatus,
    pub category: Category,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarification_answer: Option<String>,
    pub source: ClassificationSource,
    pub author: String,
    pub subject: String,
    /// Rule or policy that put the change here
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ReviewEntry {
    /// Fresh pending entry for a decided change
    pub fn from_decision(
        record: &ChangeRecord,
        result: &ClassificationResult,
        reason: &str,
        commit_url_base: Option<&str>,
    ) -> Self {
        Self {
            id: record.id.clone(),
            review_status: ReviewStatus::Pending,
            category: result.category,
            title: result.title.clone(),
            description: result.description.clone(),
            clarification_question: result.clarification_question.clone(),
            clarification_answer: None,
            source: result.source,
            author: author_name(&record.author).to_string(),
            subject: record.subject().to_string(),
            reason: reason.to_string(),
            url: commit_url_base
                .map(|base| format!("{}/{}", base.trim_end_matches('/'), record.id)),
        }
    }
}

/// Display name without the email part
pub fn author_name(author: &str) -> &str {
    match author.find(" <") {
        Some(idx) => author[..idx].trim(),
        None => author.trim(),
    }
}

/// Metadata of one drafting run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub manifest_id: String,
    pub from_ref: String,
    pub to_ref: String,
    pub generated_at: DateTime<Utc>,
    pub target_langs: Vec<String>,
}

impl RunMetadata {
    pub fn new(
        from_ref: impl Into<String>,
        to_ref: impl Into<String>,
        generated_at: DateTime<Utc>,
        target_langs: Vec<String>,
        entry_ids: &[&str],
    ) -> Self {
        let from_ref = from_ref.into();
        let to_ref = to_ref.into();
        let manifest_id = compute_manifest_id(&from_ref, &to_ref, &generated_at, entry_ids);
        Self {
            manifest_id,
            from_ref,
            to_ref,
            generated_at,
            target_langs,
        }
    }
}

/// Short SHA-256 id over refs, generation time and entry ids
pub fn compute_manifest_id(
    from_ref: &str,
    to_ref: &str,
    generated_at: &DateTime<Utc>,
    entry_ids: &[&str],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(from_ref.as_bytes());
    hasher.update(b"\0");
    hasher.update(to_ref.as_bytes());
    hasher.update(b"\0");
    hasher.update(generated_at.to_rfc3339().as_bytes());
    for id in entry_ids {
        hasher.update(b"\0");
        hasher.update(id.as_bytes());
    }
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewManifest {
    pub run: RunMetadata,
    pub state: ManifestState,
    pub entries: Vec<ReviewEntry>,
}

impl ReviewManifest {
    /// Entries that go into rendered documents, in manifest order
    pub fn publishable(&self) -> impl Iterator<Item = &ReviewEntry> {
        self.entries.iter().filter(|e| e.review_status.is_publishable())
    }

    pub fn pending_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter(|e| e.review_status == ReviewStatus::Pending)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn count_by_status(&self) -> BTreeMap<&'static str, usize> {
        let mut counts: BTreeMap<&'static str, usize> =
            ReviewStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
        for entry in &self.entries {
            *counts.entry(entry.review_status.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

/// Decide how pending entries affect publication.
///
/// This is the only place the review-enforcement toggle is read. With
/// enforcement on, any pending entry blocks publication; with it off,
/// pending entries are left out and their ids returned for the summary.
pub fn apply_review_policy(
    manifest: &ReviewManifest,
    enforce_review: bool,
) -> Result<Vec<String>, ManifestError> {
    let pending = manifest.pending_ids();
    if enforce_review && !pending.is_empty() {
        return Err(ManifestError::PendingEntriesRemain(pending));
    }
    Ok(pending)
}

/// On-disk shape of the human-editable file
#[derive(Debug, Serialize)]
pub(crate) struct ManifestFile<'a> {
    pub run: &'a RunMetadata,
    pub entries: &'a [ReviewEntry],
}

/// Untrusted view of the human-editable file
#[derive(Debug, Deserialize)]
pub(crate) struct RawManifest {
    #[serde(default)]
    pub run: Option<toml::Value>,
    #[serde(default)]
    pub entries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawEntry {
    id: Option<String>,
    review_status: Option<String>,
    category: Option<String>,
    title: Option<String>,
    description: Option<String>,
    clarification_question: Option<String>,
    clarification_answer: Option<String>,
    source: Option<String>,
    author: Option<String>,
    subject: Option<String>,
    reason: Option<String>,
    url: Option<String>,
    #[serde(flatten)]
    extra: BTreeMap<String, toml::Value>,
}

/// Validate a reloaded file against the drafted entries.
///
/// Collects every problem instead of stopping at the first, and returns
/// the reconciled entries in drafted order.
pub(crate) fn reconcile(
    raw: RawManifest,
    run: &RunMetadata,
    drafted: &[ReviewEntry],
    path: &str,
) -> Result<Vec<ReviewEntry>, ManifestError> {
    let mut problems = Vec::new();

    let run_matches = raw
        .run
        .and_then(|value| value.try_into::<RunMetadata>().ok())
        .map(|parsed| &parsed == run)
        .unwrap_or(false);
    if !run_matches {
        problems.push(problem("run", "run metadata is missing or was edited"));
    }

    let originals: HashMap<&str, (usize, &ReviewEntry)> = drafted
        .iter()
        .enumerate()
        .map(|(idx, e)| (e.id.as_str(), (idx, e)))
        .collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut reconciled: Vec<(usize, ReviewEntry)> = Vec::new();

    for (position, entry) in raw.entries.into_iter().enumerate() {
        let Some(id) = entry.id.clone().map(|id| id.trim().to_string()).filter(|id| !id.is_empty())
        else {
            problems.push(problem(format!("entries[{}]", position), "missing id"));
            continue;
        };
        let Some(&(index, original)) = originals.get(id.as_str()) else {
            problems.push(problem(&id, "unknown id"));
            continue;
        };
        if !seen.insert(id.clone()) {
            problems.push(problem(&id, "duplicate id"));
            continue;
        }

        match check_entry(entry, original) {
            Ok(checked) => reconciled.push((index, checked)),
            Err(details) => problems.extend(details.into_iter().map(|d| problem(&id, d))),
        }
    }

    for original in drafted {
        if !seen.contains(&original.id) {
            problems.push(problem(&original.id, "entry was removed"));
        }
    }

    if !problems.is_empty() {
        return Err(ManifestError::ManifestCorrupt {
            path: path.to_string(),
            problems,
        });
    }

    reconciled.sort_by_key(|(index, _)| *index);
    Ok(reconciled.into_iter().map(|(_, entry)| entry).collect())
}

fn check_entry(raw: RawEntry, original: &ReviewEntry) -> Result<ReviewEntry, Vec<String>> {
    let mut details = Vec::new();

    if !raw.extra.is_empty() {
        let keys: Vec<&str> = raw.extra.keys().map(String::as_str).collect();
        details.push(format!("unknown field(s): {}", keys.join(", ")));
    }

    let status = match raw.review_status.as_deref().map(str::trim) {
        Some(value) => ReviewStatus::parse(value).unwrap_or_else(|| {
            details.push(format!("invalid review_status '{}'", value));
            ReviewStatus::Pending
        }),
        None => {
            details.push("missing review_status".to_string());
            ReviewStatus::Pending
        }
    };

    let category = match raw.category.as_deref().map(str::trim) {
        Some(value) => Category::parse(value).unwrap_or_else(|| {
            details.push(format!("invalid category '{}'", value));
            original.category
        }),
        None => {
            details.push("missing category".to_string());
            original.category
        }
    };

    let title = raw.title.unwrap_or_default().trim().to_string();
    if title.is_empty() {
        details.push("title is empty".to_string());
    }
    let description = raw.description.unwrap_or_default().trim().to_string();

    let read_only: [(&str, Option<&str>, Option<&str>); 6] = [
        (
            "clarification_question",
            raw.clarification_question.as_deref(),
            original.clarification_question.as_deref(),
        ),
        ("source", raw.source.as_deref(), Some(source_str(original.source))),
        ("author", raw.author.as_deref(), Some(original.author.as_str())),
        ("subject", raw.subject.as_deref(), Some(original.subject.as_str())),
        ("reason", raw.reason.as_deref(), Some(original.reason.as_str())),
        ("url", raw.url.as_deref(), original.url.as_deref()),
    ];
    for (field, found, expected) in read_only {
        if found != expected {
            details.push(format!("read-only field '{}' was edited", field));
        }
    }

    if !details.is_empty() {
        return Err(details);
    }

    Ok(ReviewEntry {
        id: original.id.clone(),
        review_status: status,
        category,
        title,
        description,
        clarification_question: original.clarification_question.clone(),
        clarification_answer: raw
            .clarification_answer
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty()),
        source: original.source,
        author: original.author.clone(),
        subject: original.subject.clone(),
        reason: original.reason.clone(),
        url: original.url.clone(),
    })
}

fn source_str(source: ClassificationSource) -> &'static str {
    match source {
        ClassificationSource::Rule => "rule",
        ClassificationSource::Llm => "llm",
    }
}

fn problem(id: impl AsRef<str>, details: impl Into<String>) -> EntryProblem {
    EntryProblem {
        id: id.as_ref().to_string(),
        details: details.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn run() -> RunMetadata {
        let at = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        RunMetadata::new("v1.0.0", "v1.1.0", at, vec!["en".to_string()], &["a", "b"])
    }

    fn entry(id: &str, status: ReviewStatus) -> ReviewEntry {
        ReviewEntry {
            id: id.to_string(),
            review_status: status,
            category: Category::Feature,
            title: format!("Title {}", id),
            description: format!("Description {}", id),
            clarification_question: None,
            clarification_answer: None,
            source: ClassificationSource::Rule,
            author: "Dev".to_string(),
            subject: format!("feat: {}", id),
            reason: "conventional-feat".to_string(),
            url: None,
        }
    }

    fn raw_from(run: &RunMetadata, entries: &[ReviewEntry]) -> String {
        toml::to_string_pretty(&ManifestFile { run, entries }).unwrap()
    }

    fn parse(text: &str) -> RawManifest {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn test_transitions() {
        use ManifestState::*;
        assert_eq!(Draft.transition(AwaitingHumanReview).unwrap(), AwaitingHumanReview);
        assert!(AwaitingHumanReview.transition(Reviewed).is_ok());
        assert!(Reviewed.transition(Published).is_ok());
        assert!(Published.transition(Published).is_ok());
        assert!(AwaitingHumanReview.transition(Published).is_err());
        assert!(Published.transition(AwaitingHumanReview).is_err());
        assert!(Draft.transition(Reviewed).is_err());
    }

    #[test]
    fn test_manifest_id_is_stable_and_short() {
        let a = run();
        let b = run();
        assert_eq!(a.manifest_id, b.manifest_id);
        assert_eq!(a.manifest_id.len(), 16);

        let other = RunMetadata::new("v1.0.0", "v1.2.0", a.generated_at, vec![], &["a", "b"]);
        assert_ne!(a.manifest_id, other.manifest_id);
    }

    #[test]
    fn test_author_name() {
        assert_eq!(author_name("Ada Lovelace <ada@example.com>"), "Ada Lovelace");
        assert_eq!(author_name("bot"), "bot");
    }

    #[test]
    fn test_reconcile_unedited_roundtrip() {
        let run = run();
        let drafted = vec![entry("a", ReviewStatus::Pending), entry("b", ReviewStatus::Pending)];
        let text = raw_from(&run, &drafted);
        let reconciled = reconcile(parse(&text), &run, &drafted, "review.toml").unwrap();
        assert_eq!(reconciled, drafted);
    }

    #[test]
    fn test_reconcile_accepts_editable_fields_and_keeps_drafted_order() {
        let run = run();
        let drafted = vec![entry("a", ReviewStatus::Pending), entry("b", ReviewStatus::Pending)];
        let mut edited = vec![drafted[1].clone(), drafted[0].clone()];
        edited[0].review_status = ReviewStatus::Edited;
        edited[0].title = "Better title".to_string();
        edited[0].category = Category::Bugfix;
        edited[1].review_status = ReviewStatus::Approved;
        edited[1].clarification_answer = Some("Yes, user facing".to_string());

        let text = raw_from(&run, &edited);
        let reconciled = reconcile(parse(&text), &run, &drafted, "review.toml").unwrap();
        assert_eq!(reconciled[0].id, "a");
        assert_eq!(reconciled[0].clarification_answer.as_deref(), Some("Yes, user facing"));
        assert_eq!(reconciled[1].title, "Better title");
        assert_eq!(reconciled[1].category, Category::Bugfix);
    }

    #[test]
    fn test_reconcile_reports_every_offending_id() {
        let run = run();
        let drafted = vec![entry("a", ReviewStatus::Pending), entry("b", ReviewStatus::Pending)];
        let mut edited = drafted.clone();
        edited[0].author = "Mallory".to_string();
        edited.push(entry("zzz", ReviewStatus::Approved));
        let text = raw_from(&run, &edited).replace(
            "review_status = \"pending\"\ncategory = \"feature\"\ntitle = \"Title b\"",
            "review_status = \"maybe\"\ncategory = \"feature\"\ntitle = \"Title b\"",
        );

        let err = reconcile(parse(&text), &run, &drafted, "review.toml").unwrap_err();
        match err {
            ManifestError::ManifestCorrupt { problems, .. } => {
                let ids: Vec<_> = problems.iter().map(|p| p.id.as_str()).collect();
                assert!(ids.contains(&"a"));
                assert!(ids.contains(&"b"));
                assert!(ids.contains(&"zzz"));
            }
            other => panic!("expected corrupt, got {:?}", other),
        }
    }

    #[test]
    fn test_reconcile_rejects_removed_duplicate_and_invalid_category() {
        let run = run();
        let drafted = vec![entry("a", ReviewStatus::Pending), entry("b", ReviewStatus::Pending)];
        let text = raw_from(&run, &[drafted[0].clone(), drafted[0].clone()])
            .replacen("category = \"feature\"", "category = \"docs\"", 1);

        let err = reconcile(parse(&text), &run, &drafted, "review.toml").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("a: invalid category 'docs'"));
        assert!(message.contains("a: duplicate id"));
        assert!(message.contains("b: entry was removed"));
    }

    #[test]
    fn test_reconcile_rejects_empty_title_and_unknown_fields() {
        let run = run();
        let drafted = vec![entry("a", ReviewStatus::Pending)];
        let text = raw_from(&run, &drafted)
            .replace("title = \"Title a\"", "title = \"  \"\npriority = 1");

        let err = reconcile(parse(&text), &run, &drafted, "review.toml").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("title is empty"));
        assert!(message.contains("unknown field(s): priority"));
    }

    #[test]
    fn test_reconcile_rejects_run_edits() {
        let run = run();
        let drafted = vec![entry("a", ReviewStatus::Pending)];
        let text = raw_from(&run, &drafted).replace("to_ref = \"v1.1.0\"", "to_ref = \"main\"");
        let err = reconcile(parse(&text), &run, &drafted, "review.toml").unwrap_err();
        assert!(err.to_string().contains("run: run metadata"));
    }

    #[test]
    fn test_review_policy() {
        let manifest = ReviewManifest {
            run: run(),
            state: ManifestState::Reviewed,
            entries: vec![entry("a", ReviewStatus::Approved), entry("b", ReviewStatus::Pending)],
        };
        match apply_review_policy(&manifest, true) {
            Err(ManifestError::PendingEntriesRemain(ids)) => assert_eq!(ids, vec!["b".to_string()]),
            other => panic!("expected pending error, got {:?}", other),
        }
        assert_eq!(apply_review_policy(&manifest, false).unwrap(), vec!["b".to_string()]);
        assert_eq!(manifest.publishable().count(), 1);
        assert_eq!(manifest.count_by_status()["pending"], 1);
    }
}
