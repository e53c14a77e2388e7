//! Pure formatting functions for UI output.
//!
//! `format_*` functions build the text; `display_*` functions print it.
//! Colors come from `console` and are dropped automatically when the
//! stream is not a terminal.

use std::path::Path;

use console::style;

use crate::driver::{ReferenceUpdate, UpdateSummary};

/// Format and print an error message in red.
pub fn display_error(message: &str) {
    eprintln!("{} {}", style("ERROR:").red().bold(), message);
}

/// Format and print a success message with green checkmark.
pub fn display_success(message: &str) {
    println!("{} {}", style("✓").green(), message);
}

/// Format and print a status message with yellow arrow.
pub fn display_status(message: &str) {
    println!("{} {}", style("→").yellow(), message);
}

/// Print the path of a file whose references changed.
pub fn display_file_path(path: &Path) {
    println!("{}", style(path.display()).bold());
}

/// Line shown for one updated reference: repository, then `tag@digest`.
pub fn format_reference_update(update: &ReferenceUpdate) -> String {
    format!(
        "\t{}\t\t{}@{}",
        update.repository, update.new_tag, update.new_digest
    )
}

pub fn display_reference_update(update: &ReferenceUpdate) {
    println!("{}", format_reference_update(update));
}

/// Closing line of a run.
pub fn format_summary(summary: &UpdateSummary, dry_run: bool) -> String {
    let verb = if dry_run { "would update" } else { "updated" };
    format!(
        "{} {} of {} references in {} of {} files",
        verb,
        summary.references_updated,
        summary.references_found,
        summary.files_changed,
        summary.files_scanned
    )
}

pub fn display_summary(summary: &UpdateSummary, dry_run: bool) {
    display_success(&format_summary(summary, dry_run));
}
