//! # tarmac-review
//!
//! Review service integration for Tarmac: finding approved merge
//! proposals, reading their votes, and reporting back with comments
//! and status changes. GitHub pull requests are the backing service.
//!
//! # Security
//!
//! Authentication tokens are stored using `SecretString` which automatically
//! zeroizes memory when dropped, reducing credential exposure in memory dumps.

mod auth;
mod client;
mod error;
mod traits;
mod types;

pub use auth::{Auth, TOKEN_VARS};
pub use client::{GitHubClient, STATUS_LABEL_PREFIX, parse_branch_url};
pub use error::{Error, Result};
// Re-export SecretString for constructing Auth::Token
pub use secrecy::SecretString;
pub use traits::{IssueTracker, ReviewService};
pub use types::{BranchRef, Proposal, ProposalStatus, Vote};
