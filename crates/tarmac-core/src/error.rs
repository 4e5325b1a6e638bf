//! Error types for tarmac-core.
//!
//! Three tiers decide what happens to a proposal that fails to land:
//! a [`MergeError`] is reported back on the proposal and the batch moves on,
//! a [`MergeSkipError`] is only logged so the next run retries, and an
//! [`Error`] aborts the current target branch.

use std::fmt;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort processing of a target branch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Branch URL does not name a service branch.
    #[error("invalid branch URL '{0}' - branch URLs must start with gh:")]
    InvalidBranchUrl(String),

    /// Branch operation failed.
    #[error("git error: {0}")]
    Git(#[from] tarmac_git::Error),

    /// Review service request failed.
    #[error("review service error: {0}")]
    Review(#[from] tarmac_review::Error),

    /// A hook failed in a way it could not classify.
    #[error("hook failed: {0:#}")]
    Hook(anyhow::Error),

    /// TOML parsing error.
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("toml error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether another process holds the target's working tree.
    #[must_use]
    pub const fn is_lock_contention(&self) -> bool {
        matches!(self, Self::Git(tarmac_git::Error::Locked(_)))
    }
}

/// Why a proposal could not land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeErrorKind {
    NoPrerequisiteProposal,
    AmbiguousPrerequisite,
    NoApprovedRevision,
    UnapprovedChanges,
    RevisionNotFound,
    Conflicts,
    InvalidMetadata,
    InvalidWorkingTree,
    MissingCommitMessage,
    VerifyCommandFailed,
    InvalidContributor,
    VotingViolation,
    InvalidCriterion,
    CommitFailed,
}

/// A proposal cannot land; the reason is posted back on it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeError {
    /// Failure class.
    pub kind: MergeErrorKind,
    /// One-line reason, used in logs.
    pub message: String,
    /// Longer text for the proposal comment, when it differs from `message`.
    pub comment: Option<String>,
}

impl MergeError {
    #[must_use]
    pub fn new(kind: MergeErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            comment: None,
        }
    }

    #[must_use]
    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }

    /// Text posted on the proposal.
    #[must_use]
    pub fn comment_text(&self) -> &str {
        self.comment.as_deref().unwrap_or(&self.message)
    }

    pub(crate) fn no_prerequisite_proposal() -> Self {
        Self::new(
            MergeErrorKind::NoPrerequisiteProposal,
            "No proposals of prerequisite branch.",
        )
    }

    pub(crate) fn ambiguous_prerequisite() -> Self {
        Self::new(
            MergeErrorKind::AmbiguousPrerequisite,
            "Too many proposals of prerequisite.",
        )
    }

    pub(crate) fn no_approved_revision() -> Self {
        Self::new(
            MergeErrorKind::NoApprovedRevision,
            "No approved revision specified.",
        )
    }

    pub(crate) fn unapproved_changes() -> Self {
        Self::new(
            MergeErrorKind::UnapprovedChanges,
            "Unapproved changes made after approval",
        )
        .with_comment(
            "There are additional revisions which have not been approved in review. \
             Please seek review and approval of these new revisions.",
        )
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MergeError {}

/// A proposal cannot land right now; try again on the next run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSkipError {
    pub message: String,
    /// Captured command output, if any.
    pub output: Option<String>,
}

impl MergeSkipError {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            output: None,
        }
    }
}

impl fmt::Display for MergeSkipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for MergeSkipError {}

/// How one landing attempt failed.
#[derive(Debug)]
pub enum ProposalError {
    /// Report on the proposal and continue.
    Merge(MergeError),
    /// Log and continue.
    Skip(MergeSkipError),
    /// Already landed; continue.
    NothingToMerge,
    /// Stop processing this target.
    Fatal(Error),
}

impl ProposalError {
    /// Classify an error raised while merging a source into the target.
    #[must_use]
    pub fn from_merge(err: tarmac_git::Error) -> Self {
        match err {
            tarmac_git::Error::NothingToMerge => Self::NothingToMerge,
            tarmac_git::Error::BranchHasConflicts(_) => {
                let listing = err.conflict_listing().unwrap_or_default();
                Self::Merge(MergeError::new(MergeErrorKind::Conflicts, listing))
            }
            tarmac_git::Error::RevisionNotFound(_) => Self::Merge(MergeError::new(
                MergeErrorKind::RevisionNotFound,
                err.to_string(),
            )),
            other => Self::Fatal(other.into()),
        }
    }

    /// Classify an error raised while committing the merged tree.
    #[must_use]
    pub fn from_commit(err: tarmac_git::Error) -> Self {
        match err {
            tarmac_git::Error::OutOfDate(_) => Self::Skip(MergeSkipError::new(err.to_string())),
            tarmac_git::Error::Locked(_) => Self::Fatal(err.into()),
            tarmac_git::Error::InvalidMetadata(_) => Self::Merge(MergeError::new(
                MergeErrorKind::InvalidMetadata,
                err.to_string(),
            )),
            other => Self::Merge(MergeError::new(
                MergeErrorKind::CommitFailed,
                other.to_string(),
            )),
        }
    }
}

impl From<MergeError> for ProposalError {
    fn from(err: MergeError) -> Self {
        Self::Merge(err)
    }
}

impl From<MergeSkipError> for ProposalError {
    fn from(err: MergeSkipError) -> Self {
        Self::Skip(err)
    }
}

impl From<Error> for ProposalError {
    fn from(err: Error) -> Self {
        Self::Fatal(err)
    }
}

impl From<tarmac_review::Error> for ProposalError {
    fn from(err: tarmac_review::Error) -> Self {
        Self::Fatal(err.into())
    }
}
