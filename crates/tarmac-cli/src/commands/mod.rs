//! Command definitions.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;

pub mod completions;
pub mod merge;
pub mod plugins;

/// Lands approved merge proposals into their target branches.
#[derive(Debug, Parser)]
#[command(name = "tarmac", version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Only print errors, warnings and essential output.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge approved proposals into their target branches.
    #[command(visible_alias = "land")]
    Merge(MergeArgs),

    /// List the bundled hooks in the order they run.
    Plugins,

    /// Generate shell completions.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Default, Args)]
pub struct MergeArgs {
    /// Target branches as `gh:<owner>/<repo>/<branch>`; all configured branches when omitted.
    #[arg(value_name = "BRANCH_URL")]
    pub branch_urls: Vec<String>,

    /// Log at debug level.
    #[arg(long)]
    pub debug: bool,

    /// Use the proposal description when no commit message is set.
    #[arg(long)]
    pub imply_commit_message: bool,

    /// Stop after the first proposal that lands or is rejected.
    #[arg(long)]
    pub one: bool,

    /// List approved proposals without landing them.
    #[arg(long)]
    pub list_approved: bool,

    /// Land only this proposal, given by its web URL.
    #[arg(long, value_name = "URL", conflicts_with = "branch_urls")]
    pub proposal: Option<String>,

    /// Show what would land without committing or commenting.
    #[arg(long)]
    pub dry_run: bool,
}
