//! The landing loop.
//!
//! For each target branch: find approved proposals, then merge, verify
//! and commit them one at a time into the same working tree. Failures are
//! classified per proposal (see [`ProposalError`]) so one bad proposal
//! does not stop the batch.

use std::collections::BTreeMap;

use tarmac_git::{BranchLocation, BranchOpener, BranchOps, CommitRequest, WorkingDirPolicy};
use tarmac_review::{IssueTracker, Proposal, ProposalStatus, ReviewService};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::candidates::{mergeable_proposals, prerequisite_landings};
use crate::config::{BranchConfig, Config};
use crate::error::{Error, MergeError, MergeErrorKind, ProposalError, Result};
use crate::hooks::{HookContext, HookError, HookEvent, HookRegistry, HookResult};

/// Revision property naming the landed proposal.
pub const MERGE_URL: &str = "Merge-Url";

/// Options of one run, usually from the command line.
#[derive(Debug, Clone, Default)]
pub struct MergeOptions {
    /// Report failures and log commits without changing anything.
    pub dry_run: bool,
    /// Stop after the first landed or rejected proposal.
    pub one: bool,
    /// Use proposal descriptions as commit messages when needed.
    pub imply_commit_message: bool,
    /// Only list the approved proposals.
    pub list_approved: bool,
    /// Land only this proposal.
    pub proposal: Option<String>,
}

/// What happened to one proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// Committed; `None` in dry-run mode.
    Landed { revision: Option<String> },
    /// Left alone for the next run.
    Skipped { reason: String },
    /// Already part of the target.
    NothingToMerge,
    /// Rejected and reported on the proposal.
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposalReport {
    pub web_link: String,
    pub outcome: MergeOutcome,
}

/// Result of processing one target branch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BranchReport {
    pub branch_url: String,
    /// Approved proposals, in list-approved mode.
    pub approved: Vec<String>,
    pub outcomes: Vec<ProposalReport>,
    pub landed: usize,
    /// Single-proposal mode finished with this branch.
    pub handled: bool,
}

impl BranchReport {
    fn new(branch_url: &str) -> Self {
        Self {
            branch_url: branch_url.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, proposal: &Proposal, outcome: MergeOutcome) {
        self.outcomes.push(ProposalReport {
            web_link: proposal.web_link.clone(),
            outcome,
        });
    }
}

/// Result of a whole run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub branches: Vec<BranchReport>,
    /// Branch URLs skipped because their tree was locked.
    pub locked: Vec<String>,
}

impl RunReport {
    #[must_use]
    pub fn landed(&self) -> usize {
        self.branches.iter().map(|branch| branch.landed).sum()
    }
}

/// Drives landings for a set of target branches.
pub struct MergeSession<'a, O: BranchOpener> {
    config: &'a Config,
    options: MergeOptions,
    opener: &'a O,
    review: &'a dyn ReviewService,
    issues: Option<&'a dyn IssueTracker>,
    hooks: &'a HookRegistry<O::Branch>,
}

#[allow(clippy::future_not_send)]
impl<'a, O: BranchOpener> MergeSession<'a, O> {
    #[must_use]
    pub const fn new(
        config: &'a Config,
        options: MergeOptions,
        opener: &'a O,
        review: &'a dyn ReviewService,
        hooks: &'a HookRegistry<O::Branch>,
    ) -> Self {
        Self {
            config,
            options,
            opener,
            review,
            issues: None,
            hooks,
        }
    }

    #[must_use]
    pub const fn with_issue_tracker(mut self, issues: &'a dyn IssueTracker) -> Self {
        self.issues = Some(issues);
        self
    }

    const fn one(&self) -> bool {
        self.options.one || self.config.tarmac.one
    }

    fn imply_commit_message(&self, branch_config: &BranchConfig) -> bool {
        self.options.imply_commit_message
            || branch_config
                .imply_commit_message
                .unwrap_or(self.config.tarmac.imply_commit_message)
    }

    /// Land approved proposals into each of `branch_urls`.
    ///
    /// With no URLs, every configured branch is processed. A branch whose
    /// tree is locked by another process is skipped.
    ///
    /// # Errors
    /// Returns the first error that aborts a branch.
    pub async fn run(&self, branch_urls: &[String]) -> Result<RunReport> {
        let mut run = RunReport::default();

        if let Some(url) = &self.options.proposal {
            let proposal = self.review.load_by_url(url).await?;
            let branch_url = proposal.target.identity.clone();
            let report = self
                .merge_branch(&branch_url, Some(proposal))
                .instrument(info_span!("target", branch = %branch_url))
                .await?;
            run.branches.push(report);
            return Ok(run);
        }

        let branch_urls = if branch_urls.is_empty() {
            self.config.branch_urls()
        } else {
            branch_urls.to_vec()
        };
        if let Some(invalid) = branch_urls.iter().find(|url| !url.starts_with("gh:")) {
            return Err(Error::InvalidBranchUrl(invalid.clone()));
        }

        for branch_url in &branch_urls {
            let result = self
                .merge_branch(branch_url, None)
                .instrument(info_span!("target", branch = %branch_url))
                .await;
            match result {
                Ok(report) => {
                    let stop = self.one() && report.handled;
                    run.branches.push(report);
                    if stop {
                        break;
                    }
                }
                Err(err) if err.is_lock_contention() => {
                    warn!(branch = %branch_url, error = %err, "tree is locked; skipping branch");
                    run.locked.push(branch_url.clone());
                }
                Err(err) => {
                    error!(branch = %branch_url, error = %err, "landing failed");
                    return Err(err);
                }
            }
        }
        Ok(run)
    }

    async fn merge_branch(&self, branch_url: &str, explicit: Option<Proposal>) -> Result<BranchReport> {
        let mut report = BranchReport::new(branch_url);
        let branch_config = self.config.branch(branch_url);
        let ctx = HookContext {
            branch_url,
            settings: &self.config.tarmac,
            branch_config: &branch_config,
            dry_run: self.options.dry_run,
            review: self.review,
            issues: self.issues,
        };

        let Some(target_ref) = self.review.find_branch(branch_url).await? else {
            warn!("not a valid branch");
            return Ok(report);
        };

        let imply = self.imply_commit_message(&branch_config);
        let proposals = match explicit {
            Some(proposal) => vec![proposal],
            None => mergeable_proposals(self.review, &target_ref, imply).await?,
        };
        if proposals.is_empty() {
            info!("no approved proposals to land");
            return Ok(report);
        }

        if self.options.list_approved {
            for proposal in &proposals {
                info!(proposal = %proposal.web_link, "approved");
            }
            report.approved = proposals.iter().map(|p| p.web_link.clone()).collect();
            return Ok(report);
        }

        let location = BranchLocation::new(&target_ref.identity, &target_ref.url, &target_ref.branch);
        let policy = branch_config
            .tree_dir
            .clone()
            .map_or(WorkingDirPolicy::Scratch, WorkingDirPolicy::Persistent);
        let mut target = match self.opener.open_target(&location, &policy) {
            Ok(target) => target,
            Err(err @ tarmac_git::Error::InvalidWorkingTree { .. }) => {
                let first = &proposals[0];
                let err = MergeError::new(MergeErrorKind::InvalidWorkingTree, err.to_string());
                error!(proposal = %first.web_link, error = %err, "cannot use working tree");
                self.report_failure(&ctx, first, &err).await?;
                report.record(first, MergeOutcome::Failed {
                    reason: err.message,
                });
                return Ok(report);
            }
            Err(err) => return Err(err.into()),
        };

        let landed = self
            .land_all(&ctx, &mut target, &proposals, imply, &mut report)
            .await;

        let post_merge = self
            .hooks
            .fire(&ctx, HookEvent::PostMerge {
                target: &target,
                landed: report.landed,
            })
            .await;
        let cleanup = target.cleanup();

        landed?;
        settle_hook(post_merge, "post-merge")?;
        cleanup?;
        Ok(report)
    }

    async fn land_all(
        &self,
        ctx: &HookContext<'_>,
        target: &mut O::Branch,
        proposals: &[Proposal],
        imply: bool,
        report: &mut BranchReport,
    ) -> Result<()> {
        // Nothing is attributable to a single proposal yet, so any
        // objection from a pre-merge hook stops the target.
        match self.hooks.fire(ctx, HookEvent::PreMerge { target: &*target }).await {
            Ok(()) => {}
            Err(HookError::Failed(err)) => return Err(Error::Hook(err)),
            Err(HookError::Vetoed(err)) => {
                return Err(Error::Hook(anyhow::anyhow!("pre-merge hook refused: {err}")));
            }
            Err(HookError::Skipped(err)) => {
                return Err(Error::Hook(anyhow::anyhow!("pre-merge hook skipped: {err}")));
            }
        }

        for proposal in proposals {
            let span = info_span!("proposal", url = %proposal.web_link);
            let attempt = self
                .land_proposal(ctx, target, proposal, imply)
                .instrument(span)
                .await;
            let outcome = match attempt {
                Ok(revision) => {
                    info!(proposal = %proposal.web_link, revision = ?revision, "landed");
                    report.landed += 1;
                    MergeOutcome::Landed { revision }
                }
                Err(ProposalError::Merge(err)) => {
                    warn!(proposal = %proposal.web_link, reason = %err, "cannot land proposal");
                    self.report_failure(ctx, proposal, &err).await?;
                    target.cleanup()?;
                    MergeOutcome::Failed {
                        reason: err.message,
                    }
                }
                Err(ProposalError::Skip(err)) => {
                    warn!(proposal = %proposal.web_link, reason = %err, "skipping proposal");
                    target.cleanup()?;
                    MergeOutcome::Skipped {
                        reason: err.message,
                    }
                }
                Err(ProposalError::NothingToMerge) => {
                    info!(proposal = %proposal.web_link, "nothing to merge; skipping");
                    target.cleanup()?;
                    MergeOutcome::NothingToMerge
                }
                Err(ProposalError::Fatal(err)) => return Err(err),
            };

            let handled = matches!(
                outcome,
                MergeOutcome::Landed { .. } | MergeOutcome::Failed { .. }
            );
            report.record(proposal, outcome);
            if handled && self.one() {
                info!("single proposal mode; stopping");
                report.handled = true;
                break;
            }
        }
        Ok(())
    }

    async fn land_proposal(
        &self,
        ctx: &HookContext<'_>,
        target: &mut O::Branch,
        proposal: &Proposal,
        imply: bool,
    ) -> std::result::Result<Option<String>, ProposalError> {
        target.cleanup().map_err(Error::from)?;

        if proposal.prerequisite.is_some() {
            let found = self.review.prerequisite_proposals(proposal).await?;
            match prerequisite_landings(proposal, found).len() {
                0 => return Err(MergeError::no_prerequisite_proposal().into()),
                1 => {}
                _ => return Err(MergeError::ambiguous_prerequisite().into()),
            }
        }

        let Some(revision) = proposal.reviewed_revision.as_deref() else {
            return Err(MergeError::no_approved_revision().into());
        };

        let source_location = BranchLocation::new(
            &proposal.source.identity,
            &proposal.source.url,
            &proposal.source.branch,
        );
        let source = self
            .opener
            .open_source(&source_location, target)
            .map_err(Error::from)?;

        let approved = match source.revision_number(revision) {
            Ok(revno) => revno,
            Err(err @ tarmac_git::Error::RevisionNotFound(_)) => {
                return Err(MergeError::new(MergeErrorKind::RevisionNotFound, err.to_string()).into());
            }
            Err(err) => return Err(Error::from(err).into()),
        };
        let tip = source.tip_revision_number().map_err(Error::from)?;
        if tip > approved {
            debug!(approved, tip, "source moved past the approved revision");
            return Err(MergeError::unapproved_changes().into());
        }

        target
            .merge(&source, Some(revision))
            .map_err(ProposalError::from_merge)?;

        self.hooks
            .fire(ctx, HookEvent::PreCommit {
                target: &*target,
                source: &source,
                proposal,
            })
            .await?;

        let request = CommitRequest {
            message: self.commit_message(proposal, imply, ctx.branch_config)?,
            revprops: BTreeMap::from([(MERGE_URL.to_string(), proposal.web_link.clone())]),
            authors: None,
            reviews: proposal.reviews(),
            dry_run: ctx.dry_run,
        };
        let landed = target
            .commit(&request)
            .map_err(ProposalError::from_commit)?;

        match target.merge_tags(&source, ctx.dry_run) {
            Ok(0) => {}
            Ok(count) => debug!(count, "merged tags"),
            Err(err) => warn!(error = %err, "could not merge tags"),
        }

        let post_commit = self
            .hooks
            .fire(ctx, HookEvent::PostCommit {
                target: &*target,
                source: &source,
                proposal,
            })
            .await;
        settle_hook(post_commit, "post-commit")?;

        target.cleanup().map_err(Error::from)?;
        Ok(landed)
    }

    /// Message to land `proposal` with.
    fn commit_message(
        &self,
        proposal: &Proposal,
        imply: bool,
        branch_config: &BranchConfig,
    ) -> std::result::Result<String, MergeError> {
        let non_empty = |text: &Option<String>| text.clone().filter(|text| !text.trim().is_empty());
        let message = non_empty(&proposal.commit_message)
            .or_else(|| imply.then(|| non_empty(&proposal.description)).flatten())
            .ok_or_else(|| {
                MergeError::new(
                    MergeErrorKind::MissingCommitMessage,
                    "No commit message was specified for the proposal.",
                )
            })?;

        let template = branch_config
            .commit_message_template
            .as_deref()
            .or(self.config.tarmac.commit_message_template.as_deref());
        Ok(template.map_or(message.clone(), |template| {
            render_template(template, &message, proposal)
        }))
    }

    /// Comment on `proposal` and send it back for review.
    async fn report_failure(
        &self,
        ctx: &HookContext<'_>,
        proposal: &Proposal,
        err: &MergeError,
    ) -> Result<()> {
        if ctx.dry_run {
            info!(proposal = %proposal.web_link, "dry run; not reporting failure");
            return Ok(());
        }
        let subject = format!(
            "Re: [Merge] {} into {}",
            proposal.source.display_name, proposal.target.display_name
        );
        self.review
            .post_comment(proposal, &subject, err.comment_text())
            .await?;

        let status = ctx
            .branch_config
            .rejected_branch_status
            .as_deref()
            .or(self.config.tarmac.rejected_branch_status.as_deref())
            .map_or(ProposalStatus::NeedsReview, ProposalStatus::from);
        self.review.set_status(proposal, &status).await?;
        self.review.save(proposal).await?;
        Ok(())
    }
}

/// Hooks after a commit cannot stop it; only failures matter.
fn settle_hook(result: HookResult, point: &str) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(HookError::Failed(err)) => Err(Error::Hook(err)),
        Err(HookError::Vetoed(err)) => {
            warn!(reason = %err, "{point} hook objected after the fact");
            Ok(())
        }
        Err(HookError::Skipped(err)) => {
            warn!(reason = %err, "{point} hook skipped");
            Ok(())
        }
    }
}

/// Fill `<commit_message>`, `<author>` and `<reviewer>` in `template`.
fn render_template(template: &str, message: &str, proposal: &Proposal) -> String {
    template
        .replace("<commit_message>", message)
        .replace("<author>", &proposal.owner)
        .replace("<reviewer>", &proposal.reviewers_voting("Approve").join(", "))
}
