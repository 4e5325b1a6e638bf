//! `tarmac merge` command - Land approved proposals.

use anyhow::{Context, Result, bail};
use tarmac_core::plugins::register_builtin;
use tarmac_core::{Config, HookRegistry, MergeOptions, MergeSession};
use tarmac_git::{Committer, Credentials, GitOpener};
use tarmac_review::{Auth, GitHubClient};
use tracing::debug;

use crate::commands::MergeArgs;
use crate::{logging, output};

/// Run the merge command.
pub fn run(args: &MergeArgs) -> Result<()> {
    let path = Config::default_path();
    let config = Config::load(&path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;
    logging::init(
        args.debug,
        output::is_quiet(),
        config.tarmac.log_file.as_deref(),
    )?;
    debug!(config = %path.display(), "loaded configuration");

    if args.proposal.is_none() && args.branch_urls.is_empty() && config.branch_urls().is_empty() {
        output::warn(&format!(
            "No branches to land - pass branch URLs or add [branches] to {}",
            path.display()
        ));
        return Ok(());
    }
    if let Some(url) = args.branch_urls.iter().find(|url| !url.starts_with("gh:")) {
        bail!("Invalid branch URL '{url}' - branch URLs must start with gh:");
    }

    let auth = Auth::auto();
    let client = match &config.tarmac.api_url {
        Some(api_url) => GitHubClient::with_base_url(&auth, api_url),
        None => GitHubClient::new(&auth),
    }
    .context("Failed to connect to GitHub")?;
    let client = match &config.tarmac.web_url {
        Some(web_url) => client.with_web_url(web_url),
        None => client,
    };

    let committer = config
        .tarmac
        .committer
        .as_deref()
        .map(Committer::parse)
        .unwrap_or_default();
    let opener = GitOpener::new(Credentials::token(client.token().clone()), committer);

    let mut hooks = HookRegistry::new();
    register_builtin(&mut hooks);

    let options = MergeOptions {
        dry_run: args.dry_run,
        one: args.one,
        imply_commit_message: args.imply_commit_message,
        list_approved: args.list_approved,
        proposal: args.proposal.clone(),
    };
    if args.dry_run {
        output::info("Dry run - nothing will be committed or reported");
    }

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let report = rt.block_on(
        MergeSession::new(&config, options, &opener, &client, &hooks)
            .with_issue_tracker(&client)
            .run(&args.branch_urls),
    )?;

    output::run_report(&report);
    Ok(())
}
