//! Main workflow orchestration logic
//!
//! Keeps argument handling apart from the update logic so the workflow can
//! be driven programmatically, without clap and with any [Registry].

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::Config;
use crate::driver::{TagUpdater, UpdateOptions, UpdateSummary};
use crate::registry::Registry;

/// Arguments for the update workflow
///
/// Mirrors the CLI Args in a form that does not depend on clap.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct UpdateWorkflowArgs {
    /// Files and directories to update
    pub paths: Vec<PathBuf>,

    /// Raw `IMAGE=CONSTRAINT` arguments
    pub constraints: Vec<String>,

    /// Raw `IMAGE=CONSTRAINT` arguments enforced even on opaque tags
    pub enforce: Vec<String>,

    /// Reference pattern override
    pub pattern: Option<String>,

    /// Preview mode - report updates without writing files
    pub dry_run: bool,
}

/// Merge arguments into the configuration and compile the result.
///
/// Malformed constraints or patterns fail here, before any file is read.
pub fn build_options(args: &UpdateWorkflowArgs, config: Config) -> Result<UpdateOptions> {
    let config = config
        .with_overrides(&args.constraints, &args.enforce, args.pattern.as_deref())
        .context("failed to parse command-line constraints")?;
    config
        .update_options(args.dry_run)
        .context("failed to compile configuration")
}

/// Update every path in turn, stopping at the first failure.
///
/// Files processed before the failure keep their updates; the failing file
/// is left untouched.
pub fn run_update_workflow<R: Registry>(
    args: &UpdateWorkflowArgs,
    options: UpdateOptions,
    registry: R,
) -> Result<UpdateSummary> {
    let mut updater = TagUpdater::new(registry, options);
    let mut summary = UpdateSummary::default();

    for root in &args.paths {
        let root_summary = updater
            .update_path(root)
            .with_context(|| format!("failed to update docker tags for root '{}'", root.display()))?;
        summary.merge(root_summary);
    }

    Ok(summary)
}
