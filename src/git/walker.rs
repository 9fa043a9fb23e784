//! Git range walker for release-note harvesting
//!
//! Extracts change records between two references, supporting:
//! - Range semantics `(from, to]` (commits reachable from `to` but not `from`)
//! - Chronological order (oldest to newest)
//! - Diff statistics and touched file paths
//! - Branch-name fallback to `origin/<name>` for fetched clones

use crate::error::{Error, Result, SourceError};
use crate::model::{ChangeMetadata, ChangeRecord};
use git2::{DiffOptions, Oid, Repository, Sort};
use std::path::Path;
use tracing::debug;

/// Options for walking a ref range
#[derive(Debug, Clone)]
pub struct RangeOptions {
    /// Exclusive lower bound (tag, branch, or hash)
    pub from_ref: String,
    /// Inclusive upper bound (tag, branch, or hash)
    pub to_ref: String,
    /// Collect touched file paths per commit
    pub include_files: bool,
    /// Maximum number of commits to return
    pub limit: Option<usize>,
}

impl RangeOptions {
    pub fn new(from_ref: impl Into<String>, to_ref: impl Into<String>) -> Self {
        Self {
            from_ref: from_ref.into(),
            to_ref: to_ref.into(),
            include_files: true,
            limit: None,
        }
    }
}

/// Walk the commits in `(from_ref, to_ref]`, oldest first.
pub fn walk_range(repo_path: &Path, options: &RangeOptions) -> Result<Vec<ChangeRecord>> {
    let repo = Repository::open(repo_path).map_err(|e| {
        Error::Source(SourceError::SourceUnavailable {
            location: repo_path.display().to_string(),
            details: e.message().to_string(),
        })
    })?;

    let from = resolve_ref(&repo, &options.from_ref)?;
    let to = resolve_ref(&repo, &options.to_ref)?;
    debug!("Walking {}..{} ({}..{})", options.from_ref, options.to_ref, from, to);

    let mut revwalk = repo.revwalk().map_err(unavailable(repo_path, "create revwalk"))?;
    revwalk
        .set_sorting(Sort::TOPOLOGICAL | Sort::REVERSE)
        .map_err(unavailable(repo_path, "set revwalk sorting"))?;
    revwalk.push(to).map_err(unavailable(repo_path, "push upper bound"))?;
    revwalk.hide(from).map_err(unavailable(repo_path, "hide lower bound"))?;

    let mut records = Vec::new();
    for oid_result in revwalk {
        let oid = oid_result.map_err(unavailable(repo_path, "walk commits"))?;

        if let Some(limit) = options.limit {
            if records.len() >= limit {
                break;
            }
        }

        let commit = repo
            .find_commit(oid)
            .map_err(unavailable(repo_path, "read commit"))?;
        records.push(extract_record(&repo, &commit, options.include_files));
    }

    Ok(records)
}

/// Resolve a tag, branch, or hash to a commit id.
///
/// Falls back to `origin/<name>` so plain branch names work in clones
/// that only carry remote-tracking branches.
pub fn resolve_ref(repo: &Repository, name: &str) -> Result<Oid> {
    let name = name.trim();
    let candidates = [name.to_string(), format!("origin/{}", name)];

    for candidate in &candidates {
        if let Ok(object) = repo.revparse_single(candidate) {
            if let Ok(commit) = object.peel_to_commit() {
                return Ok(commit.id());
            }
        }
    }

    Err(Error::Source(SourceError::RefNotFound(name.to_string())))
}

fn unavailable<'a>(repo_path: &'a Path, operation: &'a str) -> impl Fn(git2::Error) -> Error + 'a {
    move |e| {
        Error::Source(SourceError::SourceUnavailable {
            location: repo_path.display().to_string(),
            details: format!("{}: {}", operation, e.message()),
        })
    }
}

/// Build a change record from a single commit
fn extract_record(repo: &Repository, commit: &git2::Commit, include_files: bool) -> ChangeRecord {
    let id = commit.id().to_string();
    let short_id = commit
        .as_object()
        .short_id()
        .ok()
        .and_then(|buf| buf.as_str().map(str::to_string))
        .unwrap_or_else(|| id[..7].to_string());

    let author = commit.author();
    let author_str = format!(
        "{} <{}>",
        author.name().unwrap_or("Unknown"),
        author.email().unwrap_or("unknown@example.com")
    );

    // Initial commits and unreadable trees fall back to empty stats
    let (files, insertions, deletions) =
        diff_summary(repo, commit, include_files).unwrap_or_default();

    ChangeRecord {
        id,
        short_id,
        author: author_str,
        timestamp: author.when().seconds(),
        message: commit.message().unwrap_or("").to_string(),
        metadata: ChangeMetadata {
            files,
            insertions,
            deletions,
            parent_count: commit.parent_count() as u32,
        },
    }
}

/// Touched paths and line counts against the first parent
fn diff_summary(
    repo: &Repository,
    commit: &git2::Commit,
    include_files: bool,
) -> std::result::Result<(Vec<String>, u32, u32), git2::Error> {
    let current_tree = commit.tree()?;
    let parent_tree = if commit.parent_count() > 0 {
        Some(commit.parent(0)?.tree()?)
    } else {
        None
    };

    let mut diff_opts = DiffOptions::new();
    let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), Some(&mut diff_opts))?;
    let stats = diff.stats()?;

    let files = if include_files {
        diff.deltas()
            .filter_map(|delta| {
                delta
                    .new_file()
                    .path()
                    .or_else(|| delta.old_file().path())
                    .map(|p| p.to_string_lossy().into_owned())
            })
            .collect()
    } else {
        Vec::new()
    };

    Ok((files, stats.insertions() as u32, stats.deletions() as u32))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_test_repo() -> anyhow::Result<(TempDir, Repository)> {
        let temp_dir = TempDir::new()?;
        let repo = Repository::init(temp_dir.path())?;

        let mut config = repo.config()?;
        config.set_str("user.name", "Test User")?;
        config.set_str("user.email", "test@example.com")?;

        Ok((temp_dir, repo))
    }

    fn create_commit(repo: &Repository, file: &str, message: &str, content: &str) -> anyhow::Result<Oid> {
        let repo_path = repo.path().parent().unwrap();
        let file_path = repo_path.join(file);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&file_path, content)?;

        let mut index = repo.index()?;
        index.add_path(Path::new(file))?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let signature = repo.signature()?;
        let parent_commit = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent_commit.iter().collect();

        Ok(repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)?)
    }

    #[test]
    fn test_range_excludes_lower_bound() -> anyhow::Result<()> {
        let (temp, repo) = create_test_repo()?;
        let first = create_commit(&repo, "a.txt", "Initial", "one")?;
        create_commit(&repo, "b.txt", "feat: second", "two")?;
        let third = create_commit(&repo, "c.txt", "fix: third", "three")?;

        let options = RangeOptions::new(first.to_string(), third.to_string());
        let records = walk_range(temp.path(), &options)?;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].subject(), "feat: second");
        assert_eq!(records[1].subject(), "fix: third");
        assert_eq!(records[1].id, third.to_string());
        Ok(())
    }

    #[test]
    fn test_record_metadata() -> anyhow::Result<()> {
        let (temp, repo) = create_test_repo()?;
        let first = create_commit(&repo, "a.txt", "Initial", "line1\nline2\nline3")?;
        create_commit(&repo, "a.txt", "Update", "line1\nline3\nline4\nline5")?;

        let records = walk_range(temp.path(), &RangeOptions::new(first.to_string(), "HEAD"))?;

        assert_eq!(records.len(), 1);
        let record = &records[0];
        assert_eq!(record.author, "Test User <test@example.com>");
        assert_eq!(record.short_id.len(), 7);
        assert_eq!(record.metadata.files, vec!["a.txt"]);
        assert_eq!(record.metadata.insertions, 2);
        assert_eq!(record.metadata.deletions, 1);
        assert_eq!(record.metadata.parent_count, 1);
        Ok(())
    }

    #[test]
    fn test_tag_resolution() -> anyhow::Result<()> {
        let (temp, repo) = create_test_repo()?;
        let first = create_commit(&repo, "a.txt", "Initial", "one")?;
        let object = repo.find_object(first, None)?;
        repo.tag_lightweight("v1.0.0", &object, false)?;
        create_commit(&repo, "b.txt", "feat: after tag", "two")?;

        let records = walk_range(temp.path(), &RangeOptions::new("v1.0.0", "HEAD"))?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject(), "feat: after tag");
        Ok(())
    }

    #[test]
    fn test_unknown_ref() -> anyhow::Result<()> {
        let (temp, repo) = create_test_repo()?;
        create_commit(&repo, "a.txt", "Initial", "one")?;

        let result = walk_range(temp.path(), &RangeOptions::new("v0.0.0-missing", "HEAD"));
        assert!(matches!(
            result,
            Err(Error::Source(SourceError::RefNotFound(ref name))) if name == "v0.0.0-missing"
        ));
        Ok(())
    }

    #[test]
    fn test_not_a_repository() {
        let temp = TempDir::new().unwrap();
        let result = walk_range(temp.path(), &RangeOptions::new("a", "b"));
        assert!(matches!(
            result,
            Err(Error::Source(SourceError::SourceUnavailable { .. }))
        ));
    }

    #[test]
    fn test_limit() -> anyhow::Result<()> {
        let (temp, repo) = create_test_repo()?;
        let first = create_commit(&repo, "a.txt", "Initial", "one")?;
        create_commit(&repo, "b.txt", "Second", "two")?;
        create_commit(&repo, "c.txt", "Third", "three")?;

        let mut options = RangeOptions::new(first.to_string(), "HEAD");
        options.limit = Some(1);
        let records = walk_range(temp.path(), &options)?;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject(), "Second");
        Ok(())
    }
}
