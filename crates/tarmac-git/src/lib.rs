//! # tarmac-git
//!
//! Branch handles for Tarmac, built on git2-rs.
//!
//! A target handle owns a working tree of the branch being landed into
//! and can be cleaned, merged into, committed and pushed. A source handle
//! exposes the history of a proposal's branch, fetched into the target's
//! repository. Approval metadata is written as commit trailers.

mod branch;
mod error;
mod location;
pub mod metadata;
mod traits;

pub use branch::{BranchHandle, GitOpener};
pub use error::{Error, Result};
pub use location::{BranchLocation, Committer, Credentials, WorkingDirPolicy};
pub use secrecy::SecretString;
pub use traits::{BranchOpener, BranchOps, CommitRequest};
