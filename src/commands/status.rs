use super::Outcome;
use crate::config::Settings;
use crate::review::ManifestStore;
use anyhow::{bail, Result};
use colored::Colorize;

/// Show the manifest lifecycle state and review progress
pub fn status_command(settings: &Settings) -> Result<Outcome> {
    let store = ManifestStore::new(&settings.review_dir);
    if !store.exists() {
        bail!(
            "No manifest in {}. Run 'relnotes draft' first.",
            settings.review_dir.display()
        );
    }
    let status = store.status()?;

    println!("Manifest:  {}", status.path.display());
    println!("Id:        {}", status.manifest_id);
    println!("Range:     {}..{}", status.from_ref, status.to_ref);
    println!(
        "Generated: {}",
        status.generated_at.format("%Y-%m-%d %H:%M UTC")
    );
    println!("State:     {}", status.state.as_str().bold());
    for (name, count) in &status.counts {
        println!("  {:<10} {}", name, count);
    }
    if !status.published_langs.is_empty() {
        println!("Published: {}", status.published_langs.join(", "));
    }

    if !status.problems.is_empty() {
        println!();
        println!(
            "{}",
            format!("{} problem(s) in the edited manifest:", status.problems.len()).red()
        );
        for problem in &status.problems {
            println!("  - {}", problem);
        }
    }
    Ok(Outcome::Complete)
}
