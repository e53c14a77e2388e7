use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use update_docker_tags::cli::{build_options, run_update_workflow, UpdateWorkflowArgs};
use update_docker_tags::config;
use update_docker_tags::registry::DockerRegistry;
use update_docker_tags::ui;

const EXAMPLES: &str = "\
Examples:

  Update all image tags in a directory:

  $ update-docker-tags dir/

  Update all image tags in the given files and folders, satisfying constraints:

  $ update-docker-tags --constraint=ubuntu=<18.04 --constraint=alpine=<3.10 deployment.yaml dir/

  Override all tags in the given files and folders to enforce a constraint:

  $ update-docker-tags --enforce=sourcegraph/frontend=~3.19 dir/";

#[derive(clap::Parser)]
#[command(
    name = "update-docker-tags",
    version,
    about = "Update pinned Docker image tags and digests in files",
    after_help = EXAMPLES
)]
struct Args {
    #[arg(
        long = "constraint",
        value_name = "IMAGE=CONSTRAINT",
        help = "Perform semver update on given docker image to satisfy semver constraint (repeatable)"
    )]
    constraints: Vec<String>,

    #[arg(
        long = "enforce",
        value_name = "IMAGE=CONSTRAINT",
        help = "Override given docker image to enforce a semver constraint (repeatable)"
    )]
    enforce: Vec<String>,

    #[arg(long, value_name = "REGEX", help = "Reference pattern with repository, tag and digest groups")]
    pattern: Option<String>,

    #[arg(short, long, help = "Custom configuration file path")]
    config: Option<String>,

    #[arg(long, help = "Preview what would change without writing files")]
    dry_run: bool,

    #[arg(short, long, help = "Enable debug logging")]
    verbose: bool,

    #[arg(required = true, value_name = "PATH", help = "Files or directories to update")]
    paths: Vec<PathBuf>,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(args: Args) -> Result<()> {
    let config = config::load_config(args.config.as_deref()).context("failed to load configuration")?;
    let registry = DockerRegistry::new(config.registry.clone()).context("failed to create registry client")?;

    let workflow_args = UpdateWorkflowArgs {
        paths: args.paths,
        constraints: args.constraints,
        enforce: args.enforce,
        pattern: args.pattern,
        dry_run: args.dry_run,
    };
    let options = build_options(&workflow_args, config)?;

    if workflow_args.dry_run {
        ui::display_status("Dry run: no files will be written");
    }

    let summary = run_update_workflow(&workflow_args, options, registry)?;
    ui::display_summary(&summary, workflow_args.dry_run);
    Ok(())
}

fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    if let Err(e) = run(args) {
        ui::display_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
