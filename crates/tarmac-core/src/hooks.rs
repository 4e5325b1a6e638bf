//! Hook points around a landing run.
//!
//! Hooks are registered once at startup and fired in registration order.
//! A hook affects the run only through its result: `Vetoed` and `Skipped`
//! are handled like any other failure of the current proposal, `Failed`
//! stops processing of the target.

use std::fmt;

use async_trait::async_trait;
use tarmac_git::BranchOps;
use tarmac_review::{IssueTracker, Proposal, ReviewService};
use tracing::debug;

use crate::config::{BranchConfig, Settings};
use crate::error::{Error, MergeError, MergeSkipError, ProposalError};

/// Where in a run a hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookPoint {
    /// Once per target, before any proposal.
    PreMerge,
    /// After a proposal is merged, before it is committed.
    PreCommit,
    /// After a proposal is committed.
    PostCommit,
    /// Once per target, after all proposals, even on failure.
    PostMerge,
}

impl HookPoint {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreMerge => "pre-merge",
            Self::PreCommit => "pre-commit",
            Self::PostCommit => "post-commit",
            Self::PostMerge => "post-merge",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a hook stopped the current step.
#[derive(Debug)]
pub enum HookError {
    /// The proposal must not land; reported on the proposal.
    Vetoed(MergeError),
    /// The proposal cannot land right now; retried next run.
    Skipped(MergeSkipError),
    /// Unexpected failure; stops processing of the target.
    Failed(anyhow::Error),
}

impl From<MergeError> for HookError {
    fn from(err: MergeError) -> Self {
        Self::Vetoed(err)
    }
}

impl From<MergeSkipError> for HookError {
    fn from(err: MergeSkipError) -> Self {
        Self::Skipped(err)
    }
}

impl From<HookError> for ProposalError {
    fn from(err: HookError) -> Self {
        match err {
            HookError::Vetoed(err) => Self::Merge(err),
            HookError::Skipped(err) => Self::Skip(err),
            HookError::Failed(err) => Self::Fatal(Error::Hook(err)),
        }
    }
}

pub type HookResult = std::result::Result<(), HookError>;

/// What hooks can see of the run.
#[derive(Clone, Copy)]
pub struct HookContext<'a> {
    /// Target branch URL as configured.
    pub branch_url: &'a str,
    pub settings: &'a Settings,
    pub branch_config: &'a BranchConfig,
    pub dry_run: bool,
    pub review: &'a dyn ReviewService,
    pub issues: Option<&'a dyn IssueTracker>,
}

impl fmt::Debug for HookContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookContext")
            .field("branch_url", &self.branch_url)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

/// An extension run at fixed points of a landing run.
///
/// Every method defaults to doing nothing.
#[async_trait(?Send)]
pub trait Hook<B: BranchOps> {
    /// Name shown in logs and `tarmac plugins`.
    fn name(&self) -> &str;

    async fn pre_merge(&self, _ctx: &HookContext<'_>, _target: &B) -> HookResult {
        Ok(())
    }

    /// `target` holds the merged, uncommitted tree.
    async fn pre_commit(
        &self,
        _ctx: &HookContext<'_>,
        _target: &B,
        _source: &B,
        _proposal: &Proposal,
    ) -> HookResult {
        Ok(())
    }

    async fn post_commit(
        &self,
        _ctx: &HookContext<'_>,
        _target: &B,
        _source: &B,
        _proposal: &Proposal,
    ) -> HookResult {
        Ok(())
    }

    /// `landed` is the number of proposals committed in this run.
    async fn post_merge(&self, _ctx: &HookContext<'_>, _target: &B, _landed: usize) -> HookResult {
        Ok(())
    }
}

/// Arguments of one hook point.
pub enum HookEvent<'e, B> {
    PreMerge {
        target: &'e B,
    },
    PreCommit {
        target: &'e B,
        source: &'e B,
        proposal: &'e Proposal,
    },
    PostCommit {
        target: &'e B,
        source: &'e B,
        proposal: &'e Proposal,
    },
    PostMerge {
        target: &'e B,
        landed: usize,
    },
}

impl<B> HookEvent<'_, B> {
    #[must_use]
    pub const fn point(&self) -> HookPoint {
        match self {
            Self::PreMerge { .. } => HookPoint::PreMerge,
            Self::PreCommit { .. } => HookPoint::PreCommit,
            Self::PostCommit { .. } => HookPoint::PostCommit,
            Self::PostMerge { .. } => HookPoint::PostMerge,
        }
    }
}

/// Hooks subscribed to each point, in registration order.
pub struct HookRegistry<B: BranchOps> {
    hooks: Vec<(HookPoint, Box<dyn Hook<B>>)>,
}

impl<B: BranchOps> Default for HookRegistry<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::future_not_send)]
impl<B: BranchOps> HookRegistry<B> {
    #[must_use]
    pub const fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Subscribe `hook` to `point`.
    pub fn register(&mut self, point: HookPoint, hook: impl Hook<B> + 'static) {
        debug!(hook = hook.name(), %point, "registered hook");
        self.hooks.push((point, Box::new(hook)));
    }

    /// Subscribed hooks as `(point, name)`.
    #[must_use]
    pub fn describe(&self) -> Vec<(HookPoint, &str)> {
        self.hooks
            .iter()
            .map(|(point, hook)| (*point, hook.name()))
            .collect()
    }

    /// Run every hook subscribed to `event`'s point, stopping at the first error.
    ///
    /// # Errors
    /// Returns the first hook error; `Failed` errors name the hook.
    pub async fn fire(&self, ctx: &HookContext<'_>, event: HookEvent<'_, B>) -> HookResult {
        let point = event.point();
        for (_, hook) in self.hooks.iter().filter(|(subscribed, _)| *subscribed == point) {
            debug!(hook = hook.name(), %point, "running hook");
            let result = match &event {
                HookEvent::PreMerge { target } => hook.pre_merge(ctx, target).await,
                HookEvent::PreCommit {
                    target,
                    source,
                    proposal,
                } => hook.pre_commit(ctx, target, source, proposal).await,
                HookEvent::PostCommit {
                    target,
                    source,
                    proposal,
                } => hook.post_commit(ctx, target, source, proposal).await,
                HookEvent::PostMerge { target, landed } => {
                    hook.post_merge(ctx, target, *landed).await
                }
            };
            result.map_err(|err| match err {
                HookError::Failed(err) => {
                    HookError::Failed(err.context(format!("{} hook ({point})", hook.name())))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}
