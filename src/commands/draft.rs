//! Draft command: harvest a ref range and stop at the review checkpoint.

use super::{build_provider, spinner, Outcome};
use crate::config::Settings;
use crate::git::GitSource;
use crate::pipeline::{self, DraftRequest};
use crate::review::ManifestStore;
use anyhow::Result;
use chrono::Utc;
use colored::Colorize;
use std::path::Path;

pub async fn draft_command(
    settings: &Settings,
    repo: &Path,
    from_ref: &str,
    to_ref: &str,
    force: bool,
) -> Result<Outcome> {
    let provider = build_provider(settings)?;
    let source = GitSource::new(repo);
    let store = ManifestStore::new(&settings.review_dir);
    let request = DraftRequest {
        from_ref: from_ref.to_string(),
        to_ref: to_ref.to_string(),
        force,
        generated_at: Utc::now(),
    };

    let pb = spinner(&format!("Drafting release notes for {}..{}", from_ref, to_ref));
    let result = pipeline::draft(&source, provider.as_ref(), &store, settings, &request).await;
    pb.finish_and_clear();
    let outcome = result?;
    let summary = &outcome.summary;

    println!("{}", "=== Draft Complete ===".bold());
    println!("Run:        {}", summary.run_id);
    println!("Manifest:   {}", outcome.manifest.run.manifest_id);
    println!("Harvested:  {}", summary.harvested);
    println!("Included:   {} by rule, {} by LLM", summary.rule_included, summary.llm_included);
    println!("Ambiguous:  {}", summary.ambiguous);
    println!("Excluded:   {}", summary.excluded_total());
    for (reason, count) in &summary.excluded {
        println!("  {:<24} {}", reason, count);
    }

    if !summary.escalated.is_empty() {
        println!(
            "{}",
            format!(
                "{} change(s) could not be classified and need a reviewer's answer:",
                summary.escalated.len()
            )
            .yellow()
        );
        for id in &summary.escalated {
            println!("  - {}", id);
        }
    }
    if !summary.discarded.is_empty() {
        println!(
            "{}",
            format!("{} unresolved change(s) were discarded", summary.discarded.len()).yellow()
        );
    }

    println!();
    println!(
        "Review {} ({} entries), then run 'relnotes publish'.",
        store.manifest_path().display(),
        outcome.manifest.entries.len()
    );
    Ok(Outcome::Complete)
}
