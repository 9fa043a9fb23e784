//! End-to-end orchestration of the two halves of a release.
//!
//! `draft` harvests, filters, classifies and persists the review manifest,
//! then stops at the human checkpoint. `publish` resumes from disk: it
//! reloads the reviewed manifest, renders and translates it, and hands the
//! documents to the sink. Nothing is re-harvested after the checkpoint.

use crate::classify::{
    AmbiguityClassifier, ClassifiedChange, REASON_LLM_CLASSIFIED, REASON_UNRESOLVED_ESCALATED,
};
use crate::config::{EmptyReleasePolicy, Settings};
use crate::filter::filter_all;
use crate::git::ChangeSource;
use crate::llm::LLMProvider;
use crate::model::{ChangeRecord, FilterOutcome, Resolution};
use crate::publish::{DocumentSink, PublishOutcome};
use crate::render::translate::Translator;
use crate::review::{ManifestStore, ReviewEntry, ReviewManifest, RunMetadata};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tracing::{info, warn};
use uuid::Uuid;

/// What happened to the harvested changes during a draft
#[derive(Debug, Clone, Default)]
pub struct DraftSummary {
    pub run_id: String,
    pub harvested: usize,
    pub rule_included: usize,
    pub ambiguous: usize,
    pub llm_included: usize,
    /// Unresolved changes kept as `other` with a clarification question
    pub escalated: Vec<String>,
    /// Unresolved changes dropped by the discard policy
    pub discarded: Vec<String>,
    /// Excluded change count per rule or policy id
    pub excluded: BTreeMap<&'static str, usize>,
}

impl DraftSummary {
    pub fn excluded_total(&self) -> usize {
        self.excluded.values().sum()
    }
}

#[derive(Debug, Clone)]
pub struct DraftOutcome {
    pub manifest: ReviewManifest,
    pub summary: DraftSummary,
}

/// Options for one draft run
#[derive(Debug, Clone)]
pub struct DraftRequest {
    pub from_ref: String,
    pub to_ref: String,
    /// Replace a manifest that is still under review
    pub force: bool,
    pub generated_at: DateTime<Utc>,
}

/// Harvest, filter, classify and persist the review manifest
pub async fn draft(
    source: &dyn ChangeSource,
    provider: &dyn LLMProvider,
    store: &ManifestStore,
    settings: &Settings,
    request: &DraftRequest,
) -> Result<DraftOutcome> {
    let lock = store.lock()?;
    let run_id = Uuid::new_v4().to_string();
    info!(
        "Drafting {}..{} (run {})",
        request.from_ref, request.to_ref, run_id
    );

    let records = source.fetch(&request.from_ref, &request.to_ref)?;
    let decisions = filter_all(&records, &settings.filter);

    let ambiguous: Vec<&ChangeRecord> = records
        .iter()
        .zip(&decisions)
        .filter(|(_, d)| d.outcome == FilterOutcome::Ambiguous)
        .map(|(r, _)| r)
        .collect();

    let classifier = AmbiguityClassifier::new(provider, settings.classifier.clone(), run_id.clone());
    let classified: HashMap<String, ClassifiedChange> =
        classifier.resolve_all(&ambiguous).await?.into_iter().collect();

    let mut summary = DraftSummary {
        run_id,
        harvested: records.len(),
        ambiguous: ambiguous.len(),
        ..Default::default()
    };
    let url_base = settings.publish.commit_url_base.as_deref();
    let mut entries = Vec::new();

    for (record, decision) in records.iter().zip(&decisions) {
        match &decision.outcome {
            FilterOutcome::Include(result) => {
                summary.rule_included += 1;
                entries.push(ReviewEntry::from_decision(record, result, decision.reason, url_base));
            }
            FilterOutcome::Exclude => {
                *summary.excluded.entry(decision.reason).or_insert(0) += 1;
            }
            FilterOutcome::Ambiguous => {
                let Some(change) = classified.get(&record.id) else {
                    continue;
                };
                match (&change.resolution, &change.unresolved) {
                    (Resolution::Entry(result), None) => {
                        summary.llm_included += 1;
                        entries.push(ReviewEntry::from_decision(
                            record,
                            result,
                            REASON_LLM_CLASSIFIED,
                            url_base,
                        ));
                    }
                    (Resolution::Entry(result), Some(_)) => {
                        summary.escalated.push(record.id.clone());
                        entries.push(ReviewEntry::from_decision(
                            record,
                            result,
                            REASON_UNRESOLVED_ESCALATED,
                            url_base,
                        ));
                    }
                    (Resolution::Dropped(reason), unresolved) => {
                        if unresolved.is_some() {
                            summary.discarded.push(record.id.clone());
                        }
                        *summary.excluded.entry(*reason).or_insert(0) += 1;
                    }
                }
            }
        }
    }

    let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
    let run = RunMetadata::new(
        request.from_ref.clone(),
        request.to_ref.clone(),
        request.generated_at,
        settings.target_langs.clone(),
        &ids,
    );

    let allow_empty = settings.empty_release == EmptyReleasePolicy::Publish;
    let manifest = store.build(&lock, run, entries, allow_empty, request.force)?;

    info!(
        "Draft complete: {} harvested, {} entries, {} excluded",
        summary.harvested,
        manifest.entries.len(),
        summary.excluded_total()
    );
    Ok(DraftOutcome { manifest, summary })
}

/// Outcome of a publish run
#[derive(Debug, Clone, Default)]
pub struct PublishReport {
    pub run_id: String,
    pub manifest_id: String,
    /// Languages handed to the sink, in target order
    pub published: Vec<(String, PublishOutcome)>,
    /// Withheld languages and why
    pub incomplete: Vec<(String, String)>,
    /// Pending entries left out because enforcement is off
    pub excluded_pending: Vec<String>,
    pub entries_published: usize,
}

impl PublishReport {
    /// Some target language was withheld
    pub fn is_partial(&self) -> bool {
        !self.incomplete.is_empty()
    }
}

/// Reload the reviewed manifest and publish every target language
pub async fn publish(
    store: &ManifestStore,
    provider: &dyn LLMProvider,
    sink: &dyn DocumentSink,
    settings: &Settings,
) -> Result<PublishReport> {
    let lock = store.lock()?;
    let run_id = Uuid::new_v4().to_string();

    let reloaded = store.reload(&lock, settings.enforce_review)?;
    let manifest = reloaded.manifest;

    let translator = Translator::new(
        provider,
        settings.classifier.budget,
        settings.classifier.max_attempts,
        settings.classifier.workers,
        run_id.clone(),
    );
    let documents = translator.translate_all(&manifest, &settings.target_langs).await;

    let mut report = PublishReport {
        run_id,
        manifest_id: manifest.run.manifest_id.clone(),
        excluded_pending: reloaded.excluded_pending,
        entries_published: manifest.publishable().count(),
        ..Default::default()
    };

    for (lang, result) in documents {
        match result {
            Ok(document) => {
                let outcome = sink
                    .publish(&lang, &document.body)
                    .with_context(|| format!("Failed to publish {} document", lang))?;
                report.published.push((lang, outcome));
            }
            Err(e) => {
                warn!("Withholding {}: {}", lang, e);
                report.incomplete.push((lang, e.to_string()));
            }
        }
    }

    if !report.published.is_empty() {
        let langs: Vec<String> = report.published.iter().map(|(l, _)| l.clone()).collect();
        store.mark_published(&lock, &langs)?;
        let all_published = store.status()?.published_langs;
        sink.finalize(&all_published)
            .context("Failed to write site configuration")?;
    }

    info!(
        "Publish complete: {} languages published, {} withheld",
        report.published.len(),
        report.incomplete.len()
    );
    Ok(report)
}
