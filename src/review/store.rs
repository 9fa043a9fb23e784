//! Persistence for the review manifest.
//!
//! Layout under the review directory:
//! - `review.toml`: the human-editable manifest
//! - `review.state.json`: automation checkpoint (lifecycle state, drafted
//!   entries, frozen reviewed snapshot, published languages)
//! - `review.lock`: single-writer guard, held for the duration of a run
//!
//! Every write goes to a temp file first and is then renamed into place.

use super::{
    apply_review_policy, reconcile, ManifestFile, ManifestState, RawManifest, ReviewEntry,
    ReviewManifest, RunMetadata,
};
use crate::error::{EntryProblem, Error, IoError, ManifestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const MANIFEST_FILE: &str = "review.toml";
const STATE_FILE: &str = "review.state.json";
const LOCK_FILE: &str = "review.lock";

const MANIFEST_HEADER: &str = "\
# Release notes review manifest.
#
# For every [[entries]] block set review_status to approved, edited or rejected.
# Editable: review_status, category (feature, bugfix, other), title,
# description, clarification_answer. All other fields are read-only.

";

/// Automation-side record of the manifest lifecycle
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Checkpoint {
    state: ManifestState,
    run: RunMetadata,
    drafted: Vec<ReviewEntry>,
    #[serde(default)]
    reviewed: Option<Vec<ReviewEntry>>,
    #[serde(default)]
    published_langs: Vec<String>,
}

/// Held while a run may write the manifest; released on drop
#[derive(Debug)]
pub struct ManifestLock {
    path: PathBuf,
}

impl Drop for ManifestLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}

/// Reviewed manifest plus the pending entries the review policy left out
#[derive(Debug, Clone)]
pub struct Reloaded {
    pub manifest: ReviewManifest,
    pub excluded_pending: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct ManifestStatus {
    pub path: PathBuf,
    pub state: ManifestState,
    pub manifest_id: String,
    pub from_ref: String,
    pub to_ref: String,
    pub generated_at: DateTime<Utc>,
    pub counts: BTreeMap<&'static str, usize>,
    pub published_langs: Vec<String>,
    /// Problems the current edits would be rejected for
    pub problems: Vec<EntryProblem>,
}

#[derive(Debug, Clone)]
pub struct ManifestStore {
    dir: PathBuf,
}

impl ManifestStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn lock_path(&self) -> PathBuf {
        self.dir.join(LOCK_FILE)
    }

    /// Whether a manifest has been drafted here
    pub fn exists(&self) -> bool {
        self.state_path().exists()
    }

    /// Take the single-writer lock, failing if another run holds it
    pub fn lock(&self) -> Result<ManifestLock> {
        fs::create_dir_all(&self.dir).map_err(|source| {
            Error::Io(IoError::DirectoryCreateFailed {
                path: self.dir.display().to_string(),
                source,
            })
        })?;

        let path = self.lock_path();
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                // Owner pid helps an operator clear a stale lock
                let _ = writeln!(file, "{}", std::process::id());
                debug!("Acquired {}", path.display());
                Ok(ManifestLock { path })
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Err(Error::Manifest(
                ManifestError::ManifestLocked(path.display().to_string()),
            )),
            Err(source) => Err(Error::Io(IoError::FileWriteFailed {
                path: path.display().to_string(),
                source,
            })),
        }
    }

    /// Persist freshly drafted entries at `AwaitingHumanReview`.
    ///
    /// Refuses to replace a manifest that is still under review unless
    /// `force` is set. An empty entry list is an error unless `allow_empty`.
    pub fn build(
        &self,
        _lock: &ManifestLock,
        run: RunMetadata,
        entries: Vec<ReviewEntry>,
        allow_empty: bool,
        force: bool,
    ) -> Result<ReviewManifest> {
        if entries.is_empty() && !allow_empty {
            return Err(Error::Manifest(ManifestError::EmptyManifest));
        }

        if !force && self.exists() {
            let existing = self.read_checkpoint()?;
            if matches!(
                existing.state,
                ManifestState::AwaitingHumanReview | ManifestState::Reviewed
            ) {
                return Err(Error::Manifest(ManifestError::InvalidTransition {
                    from: existing.state.to_string(),
                    to: ManifestState::Draft.to_string(),
                }));
            }
        }

        let state = ManifestState::Draft.transition(ManifestState::AwaitingHumanReview)?;
        let manifest = ReviewManifest { run, state, entries };

        self.write_manifest_file(&manifest.run, &manifest.entries)?;
        self.write_checkpoint(&Checkpoint {
            state,
            run: manifest.run.clone(),
            drafted: manifest.entries.clone(),
            reviewed: None,
            published_langs: Vec::new(),
        })?;

        info!(
            "Drafted manifest {} with {} entries at {}",
            manifest.run.manifest_id,
            manifest.entries.len(),
            self.manifest_path().display()
        );
        Ok(manifest)
    }

    /// Reload human edits, validate them and move to `Reviewed`.
    ///
    /// A published manifest returns its frozen reviewed snapshot; later
    /// edits to the file are ignored.
    pub fn reload(&self, _lock: &ManifestLock, enforce_review: bool) -> Result<Reloaded> {
        let mut checkpoint = self.read_checkpoint()?;

        if checkpoint.state == ManifestState::Published {
            if let Some(reviewed) = checkpoint.reviewed.clone() {
                let manifest = ReviewManifest {
                    run: checkpoint.run,
                    state: ManifestState::Published,
                    entries: reviewed,
                };
                let excluded_pending = apply_review_policy(&manifest, enforce_review)?;
                debug!("Using frozen snapshot of published manifest");
                return Ok(Reloaded {
                    manifest,
                    excluded_pending,
                });
            }
        }

        let next = checkpoint.state.transition(ManifestState::Reviewed)?;
        let entries = self.read_edits(&checkpoint)?;
        let manifest = ReviewManifest {
            run: checkpoint.run.clone(),
            state: next,
            entries,
        };

        // Enforcement failures leave the checkpoint untouched
        let excluded_pending = apply_review_policy(&manifest, enforce_review)?;

        checkpoint.state = next;
        checkpoint.reviewed = Some(manifest.entries.clone());
        self.write_checkpoint(&checkpoint)?;

        info!(
            "Manifest {} reviewed ({} publishable, {} pending excluded)",
            manifest.run.manifest_id,
            manifest.publishable().count(),
            excluded_pending.len()
        );
        Ok(Reloaded {
            manifest,
            excluded_pending,
        })
    }

    /// Record a publication. Only valid from `Reviewed` (or again from `Published`).
    pub fn mark_published(&self, _lock: &ManifestLock, langs: &[String]) -> Result<ReviewManifest> {
        let mut checkpoint = self.read_checkpoint()?;
        let next = checkpoint.state.transition(ManifestState::Published)?;
        let entries = checkpoint.reviewed.clone().ok_or_else(|| {
            Error::Manifest(ManifestError::InvalidTransition {
                from: checkpoint.state.to_string(),
                to: next.to_string(),
            })
        })?;

        checkpoint.state = next;
        for lang in langs {
            if !checkpoint.published_langs.contains(lang) {
                checkpoint.published_langs.push(lang.clone());
            }
        }
        self.write_checkpoint(&checkpoint)?;

        Ok(ReviewManifest {
            run: checkpoint.run,
            state: next,
            entries,
        })
    }

    /// Current lifecycle state and per-status counts.
    ///
    /// Before publication the counts reflect the editable file, along with
    /// any problems a reload would reject.
    pub fn status(&self) -> Result<ManifestStatus> {
        let checkpoint = self.read_checkpoint()?;

        let (entries, problems) = match (&checkpoint.state, &checkpoint.reviewed) {
            (ManifestState::Published, Some(reviewed)) => (reviewed.clone(), Vec::new()),
            _ => match self.read_edits(&checkpoint) {
                Ok(entries) => (entries, Vec::new()),
                Err(Error::Manifest(ManifestError::ManifestCorrupt { problems, .. })) => {
                    (checkpoint.drafted.clone(), problems)
                }
                Err(e) => return Err(e),
            },
        };

        let view = ReviewManifest {
            run: checkpoint.run.clone(),
            state: checkpoint.state,
            entries,
        };

        Ok(ManifestStatus {
            path: self.manifest_path(),
            state: checkpoint.state,
            manifest_id: checkpoint.run.manifest_id.clone(),
            from_ref: checkpoint.run.from_ref.clone(),
            to_ref: checkpoint.run.to_ref.clone(),
            generated_at: checkpoint.run.generated_at,
            counts: view.count_by_status(),
            published_langs: checkpoint.published_langs,
            problems,
        })
    }

    fn read_edits(&self, checkpoint: &Checkpoint) -> Result<Vec<ReviewEntry>> {
        let path = self.manifest_path();
        let display = path.display().to_string();
        let text = fs::read_to_string(&path).map_err(|source| {
            Error::Io(IoError::FileReadFailed {
                path: display.clone(),
                source,
            })
        })?;

        let raw: RawManifest = toml::from_str(&text).map_err(|e| {
            Error::Manifest(ManifestError::ManifestCorrupt {
                path: display.clone(),
                problems: vec![EntryProblem {
                    id: "(file)".to_string(),
                    details: e.message().to_string(),
                }],
            })
        })?;

        Ok(reconcile(raw, &checkpoint.run, &checkpoint.drafted, &display)?)
    }

    fn read_checkpoint(&self) -> Result<Checkpoint> {
        let path = self.state_path();
        if !path.exists() {
            return Err(Error::Manifest(ManifestError::NotFound(
                self.dir.display().to_string(),
            )));
        }
        let text = fs::read_to_string(&path).map_err(|source| {
            Error::Io(IoError::FileReadFailed {
                path: path.display().to_string(),
                source,
            })
        })?;
        serde_json::from_str(&text).map_err(|e| {
            Error::Manifest(ManifestError::ManifestCorrupt {
                path: path.display().to_string(),
                problems: vec![EntryProblem {
                    id: "(checkpoint)".to_string(),
                    details: e.to_string(),
                }],
            })
        })
    }

    fn write_checkpoint(&self, checkpoint: &Checkpoint) -> Result<()> {
        let contents = serde_json::to_string_pretty(checkpoint)
            .map_err(|e| Error::Io(IoError::Other(std::io::Error::new(ErrorKind::InvalidData, e))))?;
        write_atomic(&self.state_path(), &contents)
    }

    fn write_manifest_file(&self, run: &RunMetadata, entries: &[ReviewEntry]) -> Result<()> {
        let body = toml::to_string_pretty(&ManifestFile { run, entries })
            .map_err(|e| Error::Io(IoError::Other(std::io::Error::new(ErrorKind::InvalidData, e))))?;
        write_atomic(&self.manifest_path(), &format!("{}{}", MANIFEST_HEADER, body))
    }
}

/// Write to a sibling temp file, then rename over the target
fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| {
            Error::Io(IoError::DirectoryCreateFailed {
                path: parent.display().to_string(),
                source,
            })
        })?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    fs::write(&temp_path, contents).map_err(|source| {
        Error::Io(IoError::FileWriteFailed {
            path: temp_path.display().to_string(),
            source,
        })
    })?;
    fs::rename(&temp_path, path).map_err(|source| {
        Error::Io(IoError::FileWriteFailed {
            path: path.display().to_string(),
            source,
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Category, ClassificationSource};
    use crate::review::ReviewStatus;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn run() -> RunMetadata {
        let at = Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, 0).unwrap();
        RunMetadata::new("v1.0.0", "v1.1.0", at, vec!["en".to_string(), "it".to_string()], &["a1", "b2"])
    }

    fn entry(id: &str) -> ReviewEntry {
        ReviewEntry {
            id: id.to_string(),
            review_status: ReviewStatus::Pending,
            category: Category::Bugfix,
            title: format!("Fix {}", id),
            description: format!("Fixes \"{}\" for everyone.", id),
            clarification_question: Some("Is this user facing?".to_string()),
            clarification_answer: None,
            source: ClassificationSource::Llm,
            author: "Dev".to_string(),
            subject: format!("fix: {}", id),
            reason: "no-rule-matched".to_string(),
            url: Some(format!("https://example.com/commit/{}", id)),
        }
    }

    fn setup() -> (TempDir, ManifestStore) {
        let temp = TempDir::new().unwrap();
        let store = ManifestStore::new(temp.path().join(".relnotes"));
        (temp, store)
    }

    fn set_all_status(store: &ManifestStore, status: &str) {
        let text = fs::read_to_string(store.manifest_path()).unwrap();
        let edited = text.replace(
            "review_status = \"pending\"",
            &format!("review_status = \"{}\"", status),
        );
        fs::write(store.manifest_path(), edited).unwrap();
    }

    #[test]
    fn test_build_then_reload_unedited_reproduces_entries() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        let drafted = store
            .build(&lock, run(), vec![entry("a1"), entry("b2")], false, false)
            .unwrap();
        assert_eq!(drafted.state, ManifestState::AwaitingHumanReview);

        let text = fs::read_to_string(store.manifest_path()).unwrap();
        assert!(text.starts_with("# Release notes review manifest."));

        let reloaded = store.reload(&lock, false).unwrap();
        assert_eq!(reloaded.manifest.entries, drafted.entries);
        assert_eq!(reloaded.manifest.run, drafted.run);
        assert_eq!(reloaded.manifest.state, ManifestState::Reviewed);
        assert_eq!(reloaded.excluded_pending, vec!["a1".to_string(), "b2".to_string()]);
    }

    #[test]
    fn test_enforcement_blocks_without_transition() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        store.build(&lock, run(), vec![entry("a1")], false, false).unwrap();

        let err = store.reload(&lock, true).unwrap_err();
        assert_eq!(err.offending_ids(), vec!["a1".to_string()]);
        assert_eq!(store.status().unwrap().state, ManifestState::AwaitingHumanReview);

        set_all_status(&store, "approved");
        let reloaded = store.reload(&lock, true).unwrap();
        assert!(reloaded.excluded_pending.is_empty());
    }

    #[test]
    fn test_second_writer_is_locked_out() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        let second = store.clone();
        assert!(matches!(
            second.lock(),
            Err(Error::Manifest(ManifestError::ManifestLocked(_)))
        ));
        drop(lock);
        assert!(second.lock().is_ok());
    }

    #[test]
    fn test_empty_manifest_policy() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        assert!(matches!(
            store.build(&lock, run(), vec![], false, false),
            Err(Error::Manifest(ManifestError::EmptyManifest))
        ));
        let manifest = store.build(&lock, run(), vec![], true, false).unwrap();
        assert!(manifest.entries.is_empty());
        assert!(store.reload(&lock, true).unwrap().manifest.entries.is_empty());
    }

    #[test]
    fn test_build_refuses_to_replace_manifest_under_review() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        store.build(&lock, run(), vec![entry("a1")], false, false).unwrap();

        assert!(matches!(
            store.build(&lock, run(), vec![entry("b2")], false, false),
            Err(Error::Manifest(ManifestError::InvalidTransition { .. }))
        ));
        let replaced = store.build(&lock, run(), vec![entry("b2")], false, true).unwrap();
        assert_eq!(replaced.entries[0].id, "b2");
    }

    #[test]
    fn test_mark_published_requires_review() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        store.build(&lock, run(), vec![entry("a1")], false, false).unwrap();
        assert!(store.mark_published(&lock, &["en".to_string()]).is_err());

        set_all_status(&store, "approved");
        store.reload(&lock, true).unwrap();
        let published = store.mark_published(&lock, &["en".to_string()]).unwrap();
        assert_eq!(published.state, ManifestState::Published);
        store.mark_published(&lock, &["en".to_string(), "it".to_string()]).unwrap();
        assert_eq!(store.status().unwrap().published_langs, vec!["en", "it"]);
    }

    #[test]
    fn test_published_manifest_is_frozen() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        store.build(&lock, run(), vec![entry("a1")], false, false).unwrap();
        set_all_status(&store, "approved");
        store.reload(&lock, true).unwrap();
        store.mark_published(&lock, &["en".to_string()]).unwrap();

        // Edits after publication do not leak into a re-publish
        let text = fs::read_to_string(store.manifest_path()).unwrap();
        fs::write(store.manifest_path(), text.replace("Fix a1", "Changed later")).unwrap();

        let reloaded = store.reload(&lock, true).unwrap();
        assert_eq!(reloaded.manifest.state, ManifestState::Published);
        assert_eq!(reloaded.manifest.entries[0].title, "Fix a1");
    }

    #[test]
    fn test_corrupt_file_is_reported_with_ids() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        store.build(&lock, run(), vec![entry("a1"), entry("b2")], false, false).unwrap();
        set_all_status(&store, "approved");
        let text = fs::read_to_string(store.manifest_path()).unwrap();
        fs::write(
            store.manifest_path(),
            text.replacen("category = \"bugfix\"", "category = \"improvement\"", 1),
        )
        .unwrap();

        let err = store.reload(&lock, false).unwrap_err();
        assert_eq!(err.offending_ids(), vec!["a1".to_string()]);

        let status = store.status().unwrap();
        assert_eq!(status.problems.len(), 1);
        assert_eq!(status.state, ManifestState::AwaitingHumanReview);
    }

    #[test]
    fn test_unparseable_file_is_corrupt() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        store.build(&lock, run(), vec![entry("a1")], false, false).unwrap();
        fs::write(store.manifest_path(), "[[entries]\nid = ").unwrap();

        let err = store.reload(&lock, false).unwrap_err();
        assert_eq!(err.offending_ids(), vec!["(file)".to_string()]);
    }

    #[test]
    fn test_missing_manifest() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        assert!(matches!(
            store.reload(&lock, false),
            Err(Error::Manifest(ManifestError::NotFound(_)))
        ));
        assert!(!store.exists());
    }

    #[test]
    fn test_status_counts_current_edits() {
        let (_temp, store) = setup();
        let lock = store.lock().unwrap();
        store.build(&lock, run(), vec![entry("a1"), entry("b2")], false, false).unwrap();
        let text = fs::read_to_string(store.manifest_path()).unwrap();
        fs::write(
            store.manifest_path(),
            text.replacen("review_status = \"pending\"", "review_status = \"rejected\"", 1),
        )
        .unwrap();

        let status = store.status().unwrap();
        assert_eq!(status.counts["rejected"], 1);
        assert_eq!(status.counts["pending"], 1);
        assert!(status.problems.is_empty());
    }
}
