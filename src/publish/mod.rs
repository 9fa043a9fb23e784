//! Document sink: writes finished documents into a MkDocs-style site.
//!
//! Layout under the site root:
//! - `mkdocs.yml`
//! - `docs/index.md` (created once, never overwritten)
//! - `docs/<basename>.md` for the base language
//! - `docs/<basename>.<lang>.md` for every other language
//!
//! Publishing identical bytes again is a no-op.

use crate::render::translate::language_name;
use crate::render::BASE_LANG;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether a publish changed anything on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    Written,
    Unchanged,
}

/// Destination for finished documents
pub trait DocumentSink {
    /// Store the document for `lang_code`. Idempotent for identical bodies.
    fn publish(&self, lang_code: &str, body: &str) -> Result<PublishOutcome>;

    /// Called once after a run with every language published so far
    fn finalize(&self, _published_langs: &[String]) -> Result<()> {
        Ok(())
    }
}

/// The subset of `mkdocs.yml` this sink owns
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MkDocsConfig {
    pub site_name: String,
    pub docs_dir: String,
    pub nav: Vec<NavItem>,
}

/// One `- Title: target` nav entry
pub type NavItem = BTreeMap<String, NavTarget>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NavTarget {
    Page(String),
    Section(Vec<NavItem>),
}

fn nav_item(title: &str, target: NavTarget) -> NavItem {
    BTreeMap::from([(title.to_string(), target)])
}

/// Filesystem sink producing MkDocs sources
#[derive(Debug, Clone)]
pub struct FsSink {
    site_root: PathBuf,
    docs_dir: String,
    basename: String,
    site_name: String,
}

impl FsSink {
    pub fn new(
        site_root: impl Into<PathBuf>,
        docs_dir: impl Into<String>,
        basename: impl Into<String>,
        site_name: impl Into<String>,
    ) -> Self {
        Self {
            site_root: site_root.into(),
            docs_dir: docs_dir.into(),
            basename: basename.into(),
            site_name: site_name.into(),
        }
    }

    pub fn docs_path(&self) -> PathBuf {
        self.site_root.join(&self.docs_dir)
    }

    /// File name of the page for a language, relative to the docs dir
    pub fn page_name(&self, lang_code: &str) -> String {
        if lang_code == BASE_LANG {
            format!("{}.md", self.basename)
        } else {
            format!("{}.{}.md", self.basename, lang_code)
        }
    }

    pub fn page_path(&self, lang_code: &str) -> PathBuf {
        self.docs_path().join(self.page_name(lang_code))
    }

    /// Site config with a nav entry per published language
    pub fn site_config(&self, langs: &[String]) -> MkDocsConfig {
        let pages = ordered_langs(langs)
            .iter()
            .map(|lang| nav_item(language_name(lang), NavTarget::Page(self.page_name(lang))))
            .collect();
        MkDocsConfig {
            site_name: self.site_name.clone(),
            docs_dir: self.docs_dir.clone(),
            nav: vec![
                nav_item("Home", NavTarget::Page("index.md".to_string())),
                nav_item("Release Notes", NavTarget::Section(pages)),
            ],
        }
    }

    /// Write `mkdocs.yml`
    pub fn write_site_config(&self, langs: &[String]) -> Result<PublishOutcome> {
        let yaml = serde_yaml::to_string(&self.site_config(langs))
            .context("Failed to serialize mkdocs.yml")?;
        write_if_changed(&self.site_root.join("mkdocs.yml"), &yaml)
    }

    /// Create `index.md` if it does not exist yet
    pub fn ensure_index_page(&self) -> Result<PublishOutcome> {
        let path = self.docs_path().join("index.md");
        if path.exists() {
            return Ok(PublishOutcome::Unchanged);
        }
        let body = format!(
            "# {}\n\nSee the [release notes]({}).\n",
            self.site_name,
            self.page_name(BASE_LANG)
        );
        write_if_changed(&path, &body)
    }
}

impl DocumentSink for FsSink {
    fn publish(&self, lang_code: &str, body: &str) -> Result<PublishOutcome> {
        let outcome = write_if_changed(&self.page_path(lang_code), body)?;
        debug!("{} page: {:?}", lang_code, outcome);
        Ok(outcome)
    }

    fn finalize(&self, published_langs: &[String]) -> Result<()> {
        self.ensure_index_page()?;
        self.write_site_config(published_langs)?;
        Ok(())
    }
}

/// Base language first, then the rest in given order, without duplicates
fn ordered_langs(langs: &[String]) -> Vec<String> {
    let mut out = vec![BASE_LANG.to_string()];
    for lang in langs {
        if !out.contains(lang) {
            out.push(lang.clone());
        }
    }
    out
}

/// Compare bytes first; write atomically only when they differ
fn write_if_changed(path: &Path, contents: &str) -> Result<PublishOutcome> {
    if let Ok(existing) = fs::read(path) {
        if existing == contents.as_bytes() {
            return Ok(PublishOutcome::Unchanged);
        }
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let temp_path = path.with_extension("tmp");
    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file {}", temp_path.display()))?;
    fs::rename(&temp_path, path)
        .with_context(|| format!("Failed to rename temp file to {}", path.display()))?;

    Ok(PublishOutcome::Written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sink(temp: &TempDir) -> FsSink {
        FsSink::new(temp.path(), "docs", "release-notes", "Acme Docs")
    }

    #[test]
    fn test_page_names() {
        let temp = TempDir::new().unwrap();
        let sink = sink(&temp);
        assert_eq!(sink.page_name("en"), "release-notes.md");
        assert_eq!(sink.page_name("it"), "release-notes.it.md");
    }

    #[test]
    fn test_publish_is_idempotent() -> Result<()> {
        let temp = TempDir::new()?;
        let sink = sink(&temp);

        assert_eq!(sink.publish("en", "# Release Notes\n")?, PublishOutcome::Written);
        assert_eq!(sink.publish("en", "# Release Notes\n")?, PublishOutcome::Unchanged);
        assert_eq!(sink.publish("en", "# Release Notes v2\n")?, PublishOutcome::Written);

        let written = fs::read_to_string(temp.path().join("docs/release-notes.md"))?;
        assert_eq!(written, "# Release Notes v2\n");
        Ok(())
    }

    #[test]
    fn test_site_config_lists_languages() -> Result<()> {
        let temp = TempDir::new()?;
        let sink = sink(&temp);
        sink.write_site_config(&["it".to_string(), "en".to_string(), "xx".to_string()])?;

        let yaml = fs::read_to_string(temp.path().join("mkdocs.yml"))?;
        assert!(yaml.starts_with("site_name: Acme Docs\ndocs_dir: docs\n"));
        let en = yaml.find("- English: release-notes.md").unwrap();
        let it = yaml.find("- Italian: release-notes.it.md").unwrap();
        assert!(en < it);
        assert!(yaml.contains("- xx: release-notes.xx.md"));

        let parsed: MkDocsConfig = serde_yaml::from_str(&yaml)?;
        let NavTarget::Section(pages) = &parsed.nav[1]["Release Notes"] else {
            panic!("expected a release notes section, got {:?}", parsed.nav);
        };
        let titles: Vec<&str> = pages.iter().flat_map(|p| p.keys()).map(String::as_str).collect();
        assert_eq!(titles, vec!["English", "Italian", "xx"]);
        Ok(())
    }

    #[test]
    fn test_index_page_is_not_overwritten() -> Result<()> {
        let temp = TempDir::new()?;
        let sink = sink(&temp);
        assert_eq!(sink.ensure_index_page()?, PublishOutcome::Written);

        let index = temp.path().join("docs/index.md");
        fs::write(&index, "custom\n")?;
        assert_eq!(sink.ensure_index_page()?, PublishOutcome::Unchanged);
        assert_eq!(fs::read_to_string(index)?, "custom\n");
        Ok(())
    }

    #[test]
    fn test_site_config_survives_yaml_special_characters() -> Result<()> {
        for site_name in ["[Beta] Notes", "- Notes", "* Notes", "Line\nTwo", "Acme: Docs #1", "'quoted'"] {
            let temp = TempDir::new()?;
            let sink = FsSink::new(temp.path(), "docs", "release-notes", site_name);
            let langs = vec!["en".to_string(), "1".to_string(), "no".to_string()];
            sink.write_site_config(&langs)?;

            let yaml = fs::read_to_string(temp.path().join("mkdocs.yml"))?;
            let parsed: MkDocsConfig = serde_yaml::from_str(&yaml)?;
            assert_eq!(parsed, sink.site_config(&langs), "{:?}", site_name);

            let value: serde_yaml::Value = serde_yaml::from_str(&yaml)?;
            assert_eq!(value["site_name"].as_str(), Some(site_name));
        }
        Ok(())
    }
}
