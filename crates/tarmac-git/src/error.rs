//! Error types for tarmac-git.

use std::path::PathBuf;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a branch.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A persistent working tree tracks a different branch than configured.
    #[error("working tree at {} tracks {found}, expected {expected}", path.display())]
    InvalidWorkingTree {
        /// Configured tree location.
        path: PathBuf,
        /// What the configuration says the tree should track.
        expected: String,
        /// What the tree actually tracks.
        found: String,
    },

    /// The merge left unresolved conflicts in the working tree.
    #[error("merge has conflicts in: {0:?}")]
    BranchHasConflicts(Vec<String>),

    /// The revision is already part of the target.
    #[error("nothing to merge")]
    NothingToMerge,

    /// `commit` was called without a pending merge.
    #[error("no merge in progress")]
    NoPendingMerge,

    /// The remote moved while we were working; retry later.
    #[error("branch is out of date: {0}")]
    OutOfDate(String),

    /// Commit metadata cannot be stored.
    #[error("invalid commit metadata: {0}")]
    InvalidMetadata(String),

    /// The revision is not part of the branch history.
    #[error("revision {0} is not in the branch history")]
    RevisionNotFound(String),

    /// The operation needs a working tree and the handle has none.
    #[error("branch has no working tree")]
    NoWorkingTree,

    /// Another process holds a lock on the repository.
    #[error("repository is locked: {0}")]
    Locked(String),

    /// IO error while purging or exporting files.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Underlying git2 error.
    #[error("git error: {0}")]
    Git2(git2::Error),
}

impl Error {
    /// Render conflicts the way they are reported on a proposal.
    #[must_use]
    pub fn conflict_listing(&self) -> Option<String> {
        match self {
            Self::BranchHasConflicts(paths) => Some(
                paths
                    .iter()
                    .map(|path| format!("Text conflict in {path}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        }
    }
}

impl From<git2::Error> for Error {
    fn from(err: git2::Error) -> Self {
        if err.code() == git2::ErrorCode::Locked {
            Self::Locked(err.message().to_string())
        } else {
            Self::Git2(err)
        }
    }
}
