//! Walk command: list the harvested changes of a range without classifying.

use super::Outcome;
use crate::git::walker::{walk_range, RangeOptions};
use anyhow::Result;
use std::path::Path;

pub fn walk_command(
    repo: &Path,
    from_ref: &str,
    to_ref: &str,
    limit: Option<usize>,
    include_files: bool,
    json: bool,
) -> Result<Outcome> {
    let mut options = RangeOptions::new(from_ref, to_ref);
    options.limit = limit;
    options.include_files = include_files;
    let records = walk_range(repo, &options)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(Outcome::Complete);
    }

    println!("Changes ({})", records.len());
    println!();
    for record in &records {
        println!("commit {}", record.id);
        println!("Author: {}", record.author);
        println!("Date:   {}", record.timestamp);
        if record.metadata.parent_count > 1 {
            println!("Merge:  {} parents", record.metadata.parent_count);
        }
        println!();
        println!("    {}", record.subject());
        println!();
        println!(
            "    {} insertions(+), {} deletions(-)",
            record.metadata.insertions, record.metadata.deletions
        );
        for file in &record.metadata.files {
            println!("    {}", file);
        }
        println!();
    }
    Ok(Outcome::Complete)
}
