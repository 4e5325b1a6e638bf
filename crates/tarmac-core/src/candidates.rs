//! Selection of proposals that are ready to land.

use tarmac_review::{BranchRef, Proposal, ProposalStatus, ReviewService};
use tracing::debug;

use crate::error::Result;
use crate::order::sort_landing_candidates;

/// Proposals landing `proposal`'s prerequisite into the same target.
#[must_use]
pub fn prerequisite_landings(proposal: &Proposal, found: Vec<Proposal>) -> Vec<Proposal> {
    found
        .into_iter()
        .filter(|landing| {
            landing.target.unique_name() == proposal.target.unique_name()
                && landing.status != ProposalStatus::Superseded
        })
        .collect()
}

/// Whether `proposal` can be attempted now.
///
/// More than one prerequisite landing is not a reason to wait: that is
/// reported when the landing is attempted.
#[must_use]
pub fn is_mergeable(
    proposal: &Proposal,
    prerequisite_landings: &[Proposal],
    imply_commit_message: bool,
) -> bool {
    if proposal.status != ProposalStatus::Approved {
        debug!(proposal = %proposal.web_link, status = %proposal.status, "not approved");
        return false;
    }
    let has_message = proposal
        .commit_message
        .as_deref()
        .is_some_and(|message| !message.trim().is_empty());
    if !has_message && !imply_commit_message {
        debug!(proposal = %proposal.web_link, "no commit message");
        return false;
    }
    if let [landing] = prerequisite_landings
        && landing.status != ProposalStatus::Merged
    {
        debug!(
            proposal = %proposal.web_link,
            prerequisite = %landing.web_link,
            "waiting for prerequisite to land"
        );
        return false;
    }
    true
}

/// Ready proposals for `target`, in landing order.
///
/// # Errors
/// Returns error if the review service cannot be queried.
pub async fn mergeable_proposals(
    service: &dyn ReviewService,
    target: &BranchRef,
    imply_commit_message: bool,
) -> Result<Vec<Proposal>> {
    let candidates = sort_landing_candidates(service.candidate_proposals(target).await?);
    let mut mergeable = Vec::new();
    for proposal in candidates {
        let landings = if proposal.prerequisite.is_some() {
            prerequisite_landings(&proposal, service.prerequisite_proposals(&proposal).await?)
        } else {
            Vec::new()
        };
        if is_mergeable(&proposal, &landings, imply_commit_message) {
            mergeable.push(proposal);
        }
    }
    Ok(mergeable)
}
