//! Change source adapter
//!
//! The pipeline only sees the `ChangeSource` trait; `GitSource` is the
//! local-repository implementation backed by `git2`.

pub mod walker;

use crate::error::Result;
use crate::model::ChangeRecord;
use std::path::PathBuf;
use walker::{walk_range, RangeOptions};

/// Supplies the ordered change records for a ref range
pub trait ChangeSource: Send + Sync {
    /// Fetch changes in `(from_ref, to_ref]`, oldest first.
    ///
    /// Fails with `RefNotFound` or `SourceUnavailable`.
    fn fetch(&self, from_ref: &str, to_ref: &str) -> Result<Vec<ChangeRecord>>;
}

/// Change source reading a local git repository
#[derive(Debug, Clone)]
pub struct GitSource {
    repo_path: PathBuf,
}

impl GitSource {
    pub fn new(repo_path: impl Into<PathBuf>) -> Self {
        Self {
            repo_path: repo_path.into(),
        }
    }
}

impl ChangeSource for GitSource {
    fn fetch(&self, from_ref: &str, to_ref: &str) -> Result<Vec<ChangeRecord>> {
        walk_range(&self.repo_path, &RangeOptions::new(from_ref, to_ref))
    }
}
