//! Hooks bundled with Tarmac.
//!
//! Each one is inert unless its branch configuration keys are set.

mod bugresolver;
mod command;
mod contributors;
mod votes;

pub use bugresolver::BugResolver;
pub use command::{VerifyCommand, trim_output};
pub use contributors::ContributorCheck;
pub use votes::{
    Comparison, Criterion, VoteCheck, count_votes, evaluate_criteria, parse_criteria,
};

use tarmac_git::BranchOps;

use crate::hooks::{HookPoint, HookRegistry};

/// Register the bundled hooks in their run order.
pub fn register_builtin<B: BranchOps>(registry: &mut HookRegistry<B>) {
    registry.register(HookPoint::PreCommit, ContributorCheck);
    registry.register(HookPoint::PreCommit, VoteCheck);
    registry.register(HookPoint::PreCommit, VerifyCommand);
    registry.register(HookPoint::PostCommit, BugResolver);
}
