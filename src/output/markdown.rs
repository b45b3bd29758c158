//! Markdown summary generation
//!
//! This module renders a run summary as a human-readable markdown file:
//! run metadata, classification counts, the bucketed change list, and the
//! URLs that failed.

use crate::model::RunSummary;
use crate::output::alerts::AlertDigest;
use crate::output::traits::{OutputResult, SummarySink};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Most changes listed per bucket before the rest are elided
const MAX_LISTED_PER_BUCKET: usize = 200;

/// Writes a markdown summary of a run
///
/// # Arguments
///
/// * `summary` - The run summary
/// * `output_path` - Path where the markdown file should be written
///
/// # Returns
///
/// * `Ok(())` - Successfully wrote markdown summary
/// * `Err(OutputError)` - Failed to write summary
pub fn generate_markdown_summary(summary: &RunSummary, output_path: &Path) -> OutputResult<()> {
    let markdown = format_markdown_summary(summary);

    let mut file = File::create(output_path)?;
    file.write_all(markdown.as_bytes())?;

    Ok(())
}

/// Formats a run summary as markdown
pub fn format_markdown_summary(summary: &RunSummary) -> String {
    let mut md = String::new();

    md.push_str("# Shelfwatch Run Summary\n\n");

    // Run metadata
    md.push_str("## Run Information\n\n");
    md.push_str(&format!("- **Run ID**: {}\n", summary.run_id));
    md.push_str(&format!("- **Started**: {}\n", summary.started_at.to_rfc3339()));
    md.push_str(&format!("- **Finished**: {}\n", summary.finished_at.to_rfc3339()));
    md.push_str(&format!(
        "- **Duration**: {} seconds\n",
        summary.duration_seconds()
    ));
    md.push_str(&format!("- **State**: {}\n\n", summary.state));

    // Counts
    md.push_str("## Classification Counts\n\n");
    md.push_str("| Classification | Count |\n");
    md.push_str("|----------------|-------|\n");
    md.push_str(&format!("| New | {} |\n", summary.counts.new));
    md.push_str(&format!("| Updated | {} |\n", summary.counts.updated));
    md.push_str(&format!("| Unchanged | {} |\n", summary.counts.unchanged));
    md.push_str(&format!("| Failed | {} |\n", summary.counts.failed));
    md.push_str(&format!(
        "| Skipped (already committed) | {} |\n",
        summary.skipped
    ));
    md.push_str(&format!("| **Total targets** | {} |\n\n", summary.total_targets));

    // Changes
    let digest = AlertDigest::from_summary(summary);
    if digest.is_empty() {
        md.push_str("## Changes\n\nNo changes detected.\n\n");
    } else {
        md.push_str("## Changes\n\n");
        for (category, entries) in digest.buckets() {
            if entries.is_empty() {
                continue;
            }
            md.push_str(&format!("### {} ({})\n\n", category.label(), entries.len()));
            for entry in entries.iter().take(MAX_LISTED_PER_BUCKET) {
                if entry.changes.is_empty() {
                    md.push_str(&format!("- [{}]({})\n", entry.identity, entry.source_url));
                } else {
                    let fields: Vec<String> =
                        entry.changes.iter().map(|c| format!("`{}`", c)).collect();
                    md.push_str(&format!(
                        "- [{}]({}): {}\n",
                        entry.identity,
                        entry.source_url,
                        fields.join(", ")
                    ));
                }
            }
            if entries.len() > MAX_LISTED_PER_BUCKET {
                md.push_str(&format!(
                    "\n... and {} more\n",
                    entries.len() - MAX_LISTED_PER_BUCKET
                ));
            }
            md.push('\n');
        }
    }

    // Failures
    if !summary.failed.is_empty() {
        md.push_str("## Failed URLs\n\n");
        md.push_str("| URL | Kind | Reason |\n");
        md.push_str("|-----|------|--------|\n");
        for failure in &summary.failed {
            md.push_str(&format!(
                "| {} | {} | {} |\n",
                failure.url,
                failure.kind.as_str(),
                failure.reason.replace('|', "\\|")
            ));
        }
        md.push('\n');
    }

    md
}

/// Sink that writes each run summary to a markdown file
#[derive(Debug, Clone)]
pub struct MarkdownSummarySink {
    path: PathBuf,
}

impl MarkdownSummarySink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SummarySink for MarkdownSummarySink {
    fn name(&self) -> &'static str {
        "markdown"
    }

    fn emit(&self, summary: &RunSummary) -> OutputResult<()> {
        generate_markdown_summary(summary, &self.path)
    }
}
