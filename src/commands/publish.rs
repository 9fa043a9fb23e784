//! Publish command: resume from the reviewed manifest and write the site.

use super::{publish_provider, spinner, Outcome};
use crate::config::Settings;
use crate::pipeline;
use crate::publish::{FsSink, PublishOutcome};
use crate::review::ManifestStore;
use anyhow::Result;
use colored::Colorize;

pub async fn publish_command(settings: &Settings) -> Result<Outcome> {
    let provider = publish_provider(settings)?;
    let store = ManifestStore::new(&settings.review_dir);
    let cfg = &settings.publish;
    let sink = FsSink::new(&cfg.site_root, &cfg.docs_dir, &cfg.basename, &cfg.site_name);

    let pb = spinner(&format!(
        "Publishing release notes ({})",
        settings.target_langs.join(", ")
    ));
    let result = pipeline::publish(&store, provider.as_ref(), &sink, settings).await;
    pb.finish_and_clear();
    let report = result?;

    println!("{}", "=== Publish Complete ===".bold());
    println!("Manifest: {}", report.manifest_id);
    println!("Entries:  {}", report.entries_published);

    for (lang, outcome) in &report.published {
        let page = sink.page_path(lang);
        match outcome {
            PublishOutcome::Written => {
                println!("  {} {} -> {}", "written".green(), lang, page.display())
            }
            PublishOutcome::Unchanged => {
                println!("  {} {} -> {}", "unchanged".green(), lang, page.display())
            }
        }
    }
    for (lang, reason) in &report.incomplete {
        println!("  {} {}: {}", "withheld".red(), lang, reason);
    }

    if !report.excluded_pending.is_empty() {
        println!(
            "{}",
            format!(
                "{} pending entr(ies) left out of the notes:",
                report.excluded_pending.len()
            )
            .yellow()
        );
        for id in &report.excluded_pending {
            println!("  - {}", id);
        }
    }

    if report.is_partial() {
        println!(
            "{}",
            "Some languages were withheld; rerun 'relnotes publish' to retry them.".yellow()
        );
        return Ok(Outcome::Partial);
    }
    Ok(Outcome::Complete)
}
