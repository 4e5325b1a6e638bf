//! Error types for tarmac-review.

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while talking to the review service.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Authentication failed or token missing.
    #[error("GitHub authentication failed - run `gh auth login` or set TARMAC_GITHUB_TOKEN")]
    AuthenticationFailed,

    /// Token not found.
    #[error("no GitHub token found - run `gh auth login` or set TARMAC_GITHUB_TOKEN")]
    NoToken,

    /// API rate limit exceeded.
    #[error("GitHub API rate limit exceeded - wait and try again")]
    RateLimited,

    /// Branch URL is not of the form `gh:<owner>/<repo>/<branch>`.
    #[error("invalid branch URL '{0}' - expected gh:<owner>/<repo>/<branch>")]
    InvalidBranchUrl(String),

    /// Proposal URL does not point at a pull request.
    #[error("invalid proposal URL '{0}' - expected https://<host>/<owner>/<repo>/pull/<number>")]
    InvalidProposalUrl(String),

    /// Issue reference cannot be resolved on this service.
    #[error("unknown issue reference '{0}'")]
    InvalidIssue(String),

    /// API error with status code.
    #[error("GitHub API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    /// Network error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("failed to parse GitHub response: {0}")]
    Parse(#[from] serde_json::Error),

    /// IO error (e.g., reading gh CLI token).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
