//! # tarmac-core
//!
//! Landing logic for Tarmac: which proposals are ready, in what order
//! they land, and what happens when one of them cannot.
//!
//! A [`MergeSession`] walks the configured target branches. For each one
//! it opens a working tree, merges every approved proposal in dependency
//! order, runs the registered [`Hook`]s, and commits. Failures are either
//! reported back on the proposal or skipped until the next run.

pub mod candidates;
pub mod config;
pub mod error;
pub mod hooks;
pub mod order;
pub mod plugins;
pub mod session;

#[cfg(test)]
mod test_mocks;

pub use config::{BranchConfig, Config, Settings};
pub use error::{Error, MergeError, MergeErrorKind, MergeSkipError, ProposalError, Result};
pub use hooks::{Hook, HookContext, HookError, HookEvent, HookPoint, HookRegistry, HookResult};
pub use session::{
    BranchReport, MergeOptions, MergeOutcome, MergeSession, ProposalReport, RunReport,
};
