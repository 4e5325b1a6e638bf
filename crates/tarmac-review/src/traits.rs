//! Trait abstractions for review service operations.
//!
//! The merge session only knows about proposals through `ReviewService`,
//! and about issue trackers through `IssueTracker`, so both can be
//! mocked in tests or backed by another service.

use async_trait::async_trait;

use crate::{BranchRef, Proposal, ProposalStatus, Result};

/// Review service operations consumed by the merge session.
#[async_trait]
pub trait ReviewService: Send + Sync {
    /// Look up a branch by its service identity.
    ///
    /// Returns `None` if the branch does not exist.
    async fn find_branch(&self, url: &str) -> Result<Option<BranchRef>>;

    /// Open proposals targeting `target`, in service order.
    async fn candidate_proposals(&self, target: &BranchRef) -> Result<Vec<Proposal>>;

    /// Proposals whose source is `proposal`'s prerequisite branch.
    ///
    /// Unfiltered: callers decide which targets and statuses count.
    async fn prerequisite_proposals(&self, proposal: &Proposal) -> Result<Vec<Proposal>>;

    /// Post a comment on a proposal.
    async fn post_comment(&self, proposal: &Proposal, subject: &str, body: &str) -> Result<()>;

    /// Move a proposal to `status`.
    async fn set_status(&self, proposal: &Proposal, status: &ProposalStatus) -> Result<()>;

    /// Persist pending changes to a proposal.
    async fn save(&self, proposal: &Proposal) -> Result<()>;

    /// Load a single proposal from its web link.
    async fn load_by_url(&self, url: &str) -> Result<Proposal>;
}

/// Issue tracker operations used after a landing.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Record that `issue` was fixed by `revision` on `target`.
    async fn mark_fix_committed(
        &self,
        target: &BranchRef,
        issue: &str,
        revision: &str,
        label: &str,
    ) -> Result<()>;
}
