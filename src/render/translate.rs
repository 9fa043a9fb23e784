//! Per-language documents from the reviewed manifest.
//!
//! One batch LLM call per language translates the title and description of
//! every publishable entry. The response goes through the same validator
//! discipline as classification, and any missing entry withholds the whole
//! language with `TranslationIncomplete`.

use super::{render, render_localized, RenderedDocument, BASE_LANG};
use crate::classify::prompts::build_translation_prompt;
use crate::classify::validator::{parse_translation, translation_schema, TranslatedEntry};
use crate::error::{Error, TranslationError};
use crate::llm::{audit, parallel, CallBudget, LLMProvider};
use crate::review::ReviewManifest;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Display name of a language code; unknown codes pass through
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "it" => "Italian",
        "fr" => "French",
        "de" => "German",
        "es" => "Spanish",
        "pt" => "Portuguese",
        "ja" => "Japanese",
        "nl" => "Dutch",
        other => other,
    }
}

pub struct Translator<'a> {
    provider: &'a dyn LLMProvider,
    budget: CallBudget,
    max_attempts: u32,
    workers: usize,
    run_id: String,
}

impl<'a> Translator<'a> {
    pub fn new(
        provider: &'a dyn LLMProvider,
        budget: CallBudget,
        max_attempts: u32,
        workers: usize,
        run_id: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            budget,
            max_attempts,
            workers,
            run_id: run_id.into(),
        }
    }

    /// Produce the document for one language
    pub async fn translate(&self, manifest: &ReviewManifest, lang: &str) -> Result<RenderedDocument, Error> {
        if lang == BASE_LANG {
            return Ok(render(manifest)?);
        }

        let entries: Vec<(String, String, String)> = manifest
            .publishable()
            .map(|e| (e.id.clone(), e.title.clone(), e.description.clone()))
            .collect();

        if entries.is_empty() {
            debug!("Nothing to translate for {}", lang);
            return Ok(render_localized(manifest, lang, &HashMap::new())?);
        }

        let ids: Vec<String> = entries.iter().map(|(id, _, _)| id.clone()).collect();
        let schema = translation_schema();
        let prompt = build_translation_prompt(lang, language_name(lang), &entries, &schema);
        let max_attempts = self.max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            let completion = match audit::invoke(
                self.provider,
                "translate",
                &self.run_id,
                &prompt,
                &schema,
                &self.budget,
            )
            .await
            {
                Ok(c) => c,
                Err(e) => return Err(incomplete(lang, &ids, e.to_string())),
            };

            match parse_translation(&completion.text, lang, &ids) {
                Ok(translated) => {
                    let by_id: HashMap<String, TranslatedEntry> =
                        translated.into_iter().map(|t| (t.id.clone(), t)).collect();
                    info!("Translated {} entries into {}", by_id.len(), language_name(lang));
                    return Ok(render_localized(manifest, lang, &by_id)?);
                }
                Err(e) => {
                    warn!(
                        "{} translation rejected (attempt {}/{}): {}",
                        lang, attempt, max_attempts, e
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(incomplete(lang, &ids, last_error))
    }

    /// Translate into every language through the bounded worker pool.
    ///
    /// Results come back in the order of `langs`; a failed language does
    /// not affect the others.
    pub async fn translate_all(
        &self,
        manifest: &ReviewManifest,
        langs: &[String],
    ) -> Vec<(String, Result<RenderedDocument, Error>)> {
        let items: Vec<(String, ())> = langs.iter().map(|l| (l.clone(), ())).collect();
        parallel::dispatch_keyed(items, self.workers, |lang, _| async move {
            self.translate(manifest, &lang).await
        })
        .await
    }
}

fn incomplete(lang: &str, ids: &[String], details: String) -> Error {
    Error::Translation(TranslationError::TranslationIncomplete {
        lang: lang.to_string(),
        missing: ids.to_vec(),
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{Completion, Prompt, SchemaDescriptor};
    use crate::model::{Category, ClassificationSource};
    use crate::review::{ManifestState, ReviewEntry, ReviewStatus, RunMetadata};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Answers every language correctly except the ones listed as broken
    struct FakeTranslator {
        broken: Vec<&'static str>,
        calls: AtomicU32,
    }

    #[async_trait]
    impl LLMProvider for FakeTranslator {
        async fn complete(&self, prompt: &Prompt, _schema: &SchemaDescriptor) -> Result<Completion, Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lang = ["it", "fr", "de"]
                .into_iter()
                .find(|l| prompt.user.contains(&format!("language code \"{}\"", l)))
                .unwrap_or("??");
            if self.broken.contains(&lang) {
                return Ok(Completion::text(r#"{"lang":"it","entries":[]}"#));
            }
            Ok(Completion::text(format!(
                r#"{{"lang":"{}","entries":[{{"id":"a","title":"[{}] Dark mode","description":"[{}] Adds a theme."}}]}}"#,
                lang, lang, lang
            )))
        }

        fn name(&self) -> &str {
            "fake"
        }

        fn model(&self) -> &str {
            "fake-model"
        }
    }

    fn manifest(status: ReviewStatus) -> ReviewManifest {
        let at = Utc.with_ymd_and_hms(2026, 10, 1, 9, 30, 0).unwrap();
        ReviewManifest {
            run: RunMetadata::new("v1", "v2", at, vec![], &["a"]),
            state: ManifestState::Reviewed,
            entries: vec![ReviewEntry {
                id: "a".to_string(),
                review_status: status,
                category: Category::Feature,
                title: "Dark mode".to_string(),
                description: "Adds a theme.".to_string(),
                clarification_question: None,
                clarification_answer: None,
                source: ClassificationSource::Rule,
                author: "Dev".to_string(),
                subject: "feat: dark mode".to_string(),
                reason: "conventional-feat".to_string(),
                url: None,
            }],
        }
    }

    fn translator(provider: &FakeTranslator) -> Translator<'_> {
        let budget = CallBudget {
            timeout_secs: 5,
            max_retries: 1,
            backoff_ms: 1,
        };
        Translator::new(provider, budget, 2, 2, "run")
    }

    #[test]
    fn test_language_names() {
        assert_eq!(language_name("it"), "Italian");
        assert_eq!(language_name("ja"), "Japanese");
        assert_eq!(language_name("sv"), "sv");
    }

    #[tokio::test]
    async fn test_base_language_needs_no_call() {
        let provider = FakeTranslator { broken: vec![], calls: AtomicU32::new(0) };
        let doc = translator(&provider).translate(&manifest(ReviewStatus::Approved), "en").await.unwrap();
        assert!(doc.body.contains("**Dark mode**"));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_translates_public_entries() {
        let provider = FakeTranslator { broken: vec![], calls: AtomicU32::new(0) };
        let doc = translator(&provider).translate(&manifest(ReviewStatus::Approved), "fr").await.unwrap();
        assert!(doc.body.contains("**[fr] Dark mode**"));
        assert_eq!(doc.lang_code, "fr");
    }

    #[tokio::test]
    async fn test_invalid_translation_is_incomplete_after_retries() {
        let provider = FakeTranslator { broken: vec!["it"], calls: AtomicU32::new(0) };
        let err = translator(&provider)
            .translate(&manifest(ReviewStatus::Approved), "it")
            .await
            .unwrap_err();
        match err {
            Error::Translation(TranslationError::TranslationIncomplete { lang, missing, .. }) => {
                assert_eq!(lang, "it");
                assert_eq!(missing, vec!["a".to_string()]);
            }
            other => panic!("expected incomplete, got {:?}", other),
        }
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_nothing_publishable_skips_call() {
        let provider = FakeTranslator { broken: vec![], calls: AtomicU32::new(0) };
        let doc = translator(&provider).translate(&manifest(ReviewStatus::Rejected), "de").await.unwrap();
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
        assert_eq!(doc.lang_code, "de");
    }

    #[tokio::test]
    async fn test_translate_all_isolates_failures() {
        let provider = FakeTranslator { broken: vec!["it"], calls: AtomicU32::new(0) };
        let langs = vec!["en".to_string(), "it".to_string(), "fr".to_string()];
        let results = translator(&provider)
            .translate_all(&manifest(ReviewStatus::Approved), &langs)
            .await;

        let order: Vec<_> = results.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(order, vec!["en", "it", "fr"]);
        assert!(results[0].1.is_ok());
        assert!(results[1].1.is_err());
        assert!(results[2].1.is_ok());
    }
}
