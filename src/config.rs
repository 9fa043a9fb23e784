//! `relnotes.toml` configuration and the resolved, immutable run settings.

use crate::classify::{ClassifierSettings, FallbackPolicy};
use crate::filter::FilterConfig;
use crate::llm::CallBudget;
use crate::render::BASE_LANG;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "relnotes.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub filter: FilterConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub review: ReviewConfig,
    #[serde(default)]
    pub publish: PublishConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// `[log]`: stderr logging is always on; `file` adds an append-only copy
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderKind {
    /// `claude` CLI subprocess
    ClaudeCli,
    /// OpenAI-compatible HTTP endpoint
    Gateway,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: ProviderKind,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_workers")]
    pub workers: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_provider() -> ProviderKind {
    ProviderKind::ClaudeCli
}

fn default_model() -> String {
    "sonnet".to_string()
}

fn default_api_key_env() -> String {
    "RELNOTES_API_KEY".to_string()
}

fn default_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

fn default_max_attempts() -> u32 {
    3
}

fn default_workers() -> usize {
    4
}

fn default_temperature() -> f32 {
    0.2
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout(),
            max_retries: default_max_retries(),
            max_attempts: default_max_attempts(),
            workers: default_workers(),
            temperature: default_temperature(),
        }
    }
}

/// What to do when no change qualifies for the notes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmptyReleasePolicy {
    /// Fail the draft with `EmptyManifest`
    #[default]
    Block,
    /// Persist an empty manifest and publish "no changes" notes
    Publish,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewConfig {
    #[serde(default = "default_enforce_review")]
    pub enforce_review: bool,
    #[serde(default)]
    pub empty_release: EmptyReleasePolicy,
    #[serde(default)]
    pub on_unresolved: FallbackPolicy,
    #[serde(default = "default_review_dir")]
    pub dir: PathBuf,
}

fn default_enforce_review() -> bool {
    true
}

fn default_review_dir() -> PathBuf {
    PathBuf::from(".relnotes")
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            enforce_review: default_enforce_review(),
            empty_release: EmptyReleasePolicy::default(),
            on_unresolved: FallbackPolicy::default(),
            dir: default_review_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_target_langs")]
    pub target_langs: Vec<String>,
    /// Site root; `docs_dir` and `mkdocs.yml` live under it
    #[serde(default = "default_site_root")]
    pub site_root: PathBuf,
    #[serde(default = "default_docs_dir")]
    pub docs_dir: String,
    #[serde(default = "default_basename")]
    pub basename: String,
    #[serde(default = "default_site_name")]
    pub site_name: String,
    /// Web base for commit links, e.g. `https://github.com/org/repo/commit`
    #[serde(default)]
    pub commit_url_base: Option<String>,
}

fn default_target_langs() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_site_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_docs_dir() -> String {
    "docs".to_string()
}

fn default_basename() -> String {
    "release-notes".to_string()
}

fn default_site_name() -> String {
    "Release Notes".to_string()
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            target_langs: default_target_langs(),
            site_root: default_site_root(),
            docs_dir: default_docs_dir(),
            basename: default_basename(),
            site_name: default_site_name(),
            commit_url_base: None,
        }
    }
}

impl Config {
    /// Load from `path`, or from `relnotes.toml` if present, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }
}

/// Everything a run needs, resolved once at startup
#[derive(Debug, Clone)]
pub struct Settings {
    pub filter: FilterConfig,
    pub llm: LlmConfig,
    /// Resolved from the variable named by `llm.api_key_env`
    pub api_key: Option<String>,
    pub classifier: ClassifierSettings,
    pub enforce_review: bool,
    pub empty_release: EmptyReleasePolicy,
    pub review_dir: PathBuf,
    /// Normalized: lower-case, deduplicated, base language first
    pub target_langs: Vec<String>,
    pub publish: PublishConfig,
}

impl Settings {
    /// Apply environment overrides (`TARGET_LANGS`, `HITL_ENFORCE`, API key)
    pub fn resolve<F>(config: Config, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let enforce_review = match env("HITL_ENFORCE") {
            Some(raw) => parse_bool(&raw)
                .with_context(|| format!("Invalid HITL_ENFORCE value '{}'", raw))?,
            None => config.review.enforce_review,
        };

        let target_langs = match env("TARGET_LANGS") {
            Some(raw) => normalize_langs(raw.split(',')),
            None => normalize_langs(config.publish.target_langs.iter().map(String::as_str)),
        };

        let api_key = env(&config.llm.api_key_env).filter(|k| !k.trim().is_empty());

        let classifier = ClassifierSettings {
            max_attempts: config.llm.max_attempts.max(1),
            budget: CallBudget {
                timeout_secs: config.llm.timeout_secs,
                max_retries: config.llm.max_retries,
                ..CallBudget::default()
            },
            on_unresolved: config.review.on_unresolved,
            workers: config.llm.workers.max(1),
        };

        Ok(Self {
            filter: config.filter,
            llm: config.llm,
            api_key,
            classifier,
            enforce_review,
            empty_release: config.review.empty_release,
            review_dir: config.review.dir,
            target_langs,
            publish: config.publish,
        })
    }

    /// Resolve against the process environment
    pub fn from_env(config: Config) -> Result<Self> {
        Self::resolve(config, |key| std::env::var(key).ok())
    }

    /// Whether any target language needs an LLM translation
    pub fn needs_translation(&self) -> bool {
        self.target_langs.iter().any(|lang| lang != BASE_LANG)
    }
}

fn parse_bool(raw: &str) -> Result<bool> {
    match raw.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("expected true/false, got '{}'", other),
    }
}

fn normalize_langs<'a>(codes: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut langs = vec![BASE_LANG.to_string()];
    for code in codes {
        let code = code.trim().to_lowercase();
        if !code.is_empty() && !langs.contains(&code) {
            langs.push(code);
        }
    }
    langs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(Config::default(), env_of(&[])).unwrap();
        assert!(settings.enforce_review);
        assert_eq!(settings.target_langs, vec!["en"]);
        assert!(!settings.filter.conventional_include);
        assert!(!settings.needs_translation());
        assert_eq!(settings.classifier.workers, 4);
        assert_eq!(settings.classifier.on_unresolved, FallbackPolicy::Escalate);
        assert_eq!(settings.empty_release, EmptyReleasePolicy::Block);
        assert_eq!(settings.review_dir, PathBuf::from(".relnotes"));
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_parse_full_file() {
        let toml = r#"
            [filter]
            conventional_include = true

            [llm]
            provider = "gateway"
            model = "gpt-4.1"
            base_url = "https://llm.example.com/v1"
            workers = 8
            max_attempts = 2

            [review]
            enforce_review = false
            empty_release = "publish"
            on_unresolved = "discard"

            [publish]
            target_langs = ["en", "it"]
            site_name = "Acme"

            [log]
            file = "outputs/run.log"
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert!(config.filter.conventional_include);
        assert_eq!(config.llm.provider, ProviderKind::Gateway);
        assert_eq!(config.llm.timeout_secs, 60);
        assert_eq!(config.review.on_unresolved, FallbackPolicy::Discard);
        assert_eq!(config.review.empty_release, EmptyReleasePolicy::Publish);
        assert_eq!(config.publish.basename, "release-notes");
        assert_eq!(config.log.file, Some(PathBuf::from("outputs/run.log")));

        let settings = Settings::resolve(config, env_of(&[])).unwrap();
        assert_eq!(settings.classifier.max_attempts, 2);
        assert_eq!(settings.target_langs, vec!["en", "it"]);
    }

    #[test]
    fn test_env_overrides() {
        let settings = Settings::resolve(
            Config::default(),
            env_of(&[
                ("TARGET_LANGS", "IT, fr,,it"),
                ("HITL_ENFORCE", "0"),
                ("RELNOTES_API_KEY", "secret"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.target_langs, vec!["en", "it", "fr"]);
        assert!(settings.needs_translation());
        assert!(!settings.enforce_review);
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_invalid_enforce_value() {
        let result = Settings::resolve(Config::default(), env_of(&[("HITL_ENFORCE", "maybe")]));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&temp.path().join("nope.toml"))).is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("relnotes.toml");
        fs::write(&path, "[llm]\nmodel = \"opus\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.llm.model, "opus");
        assert!(config.review.enforce_review);
    }
}
