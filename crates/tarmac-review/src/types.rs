//! Review service domain types.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A branch known to the review service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchRef {
    /// Service identity, e.g. `gh:owner/repo/main`.
    pub identity: String,

    /// Repository as `owner/repo`.
    pub repository: String,

    /// Branch name.
    pub branch: String,

    /// URL git fetches from.
    pub url: String,

    /// Web page of the branch.
    pub web_link: String,

    /// Short name for messages.
    pub display_name: String,
}

impl BranchRef {
    /// The identity proposals and prerequisites are keyed by.
    #[must_use]
    pub fn unique_name(&self) -> &str {
        &self.identity
    }

    /// Repository owner.
    #[must_use]
    pub fn owner(&self) -> &str {
        self.repository
            .split_once('/')
            .map_or(self.repository.as_str(), |(owner, _)| owner)
    }
}

/// Review status of a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ProposalStatus {
    Approved,
    NeedsReview,
    WorkInProgress,
    Superseded,
    Merged,
    Rejected,
    Queued,
    /// A status this crate does not know about.
    Other(String),
}

impl ProposalStatus {
    /// Display string as used by the review service.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Approved => "Approved",
            Self::NeedsReview => "Needs review",
            Self::WorkInProgress => "Work in progress",
            Self::Superseded => "Superseded",
            Self::Merged => "Merged",
            Self::Rejected => "Rejected",
            Self::Queued => "Queued",
            Self::Other(status) => status,
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProposalStatus {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s.trim().to_ascii_lowercase().as_str() {
            "approved" => Self::Approved,
            "needs review" => Self::NeedsReview,
            "work in progress" => Self::WorkInProgress,
            "superseded" => Self::Superseded,
            "merged" => Self::Merged,
            "rejected" => Self::Rejected,
            "queued" => Self::Queued,
            _ => Self::Other(s.trim().to_string()),
        };
        Ok(status)
    }
}

impl From<&str> for ProposalStatus {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(status) => status,
            Err(never) => match never {},
        }
    }
}

/// One reviewer's vote on a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    /// Reviewer display name.
    pub reviewer: String,

    /// Vote value such as `Approve`; `None` while the review is pending.
    pub value: Option<String>,

    /// Review comment, if any.
    pub comment: Option<String>,
}

/// A request to merge a source branch into a target branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Proposal {
    /// Service-side number.
    pub number: u64,

    /// Web page of the proposal.
    pub web_link: String,

    /// Branch being merged.
    pub source: BranchRef,

    /// Branch being merged into.
    pub target: BranchRef,

    /// Branch that must land first.
    pub prerequisite: Option<BranchRef>,

    /// Review status.
    pub status: ProposalStatus,

    /// Revision the approval applies to.
    pub reviewed_revision: Option<String>,

    /// Commit message to land with.
    pub commit_message: Option<String>,

    /// Free-text description.
    pub description: Option<String>,

    /// Login of the proposal's author.
    pub owner: String,

    /// Reviewer votes.
    pub votes: Vec<Vote>,
}

impl Proposal {
    /// Reviews as stored in landing commits: `reviewer;vote` per cast vote.
    #[must_use]
    pub fn reviews(&self) -> Vec<String> {
        self.votes
            .iter()
            .filter_map(|vote| {
                vote.value
                    .as_ref()
                    .map(|value| format!("{};{value}", vote.reviewer))
            })
            .collect()
    }

    /// Reviewers who voted `value`.
    #[must_use]
    pub fn reviewers_voting(&self, value: &str) -> Vec<&str> {
        self.votes
            .iter()
            .filter(|vote| vote.value.as_deref() == Some(value))
            .map(|vote| vote.reviewer.as_str())
            .collect()
    }
}
