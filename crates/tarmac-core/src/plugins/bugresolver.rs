//! Marks issues fixed by a landing as fix-committed.

use async_trait::async_trait;
use tarmac_git::BranchOps;
use tarmac_review::Proposal;
use tracing::{debug, info, warn};

use crate::hooks::{Hook, HookContext, HookResult};

/// Post-commit hook reading `Fixes:` trailers from the landing commit.
///
/// Tracker failures are logged; the landing already happened.
#[derive(Debug, Clone, Copy, Default)]
pub struct BugResolver;

#[async_trait(?Send)]
impl<B: BranchOps> Hook<B> for BugResolver {
    fn name(&self) -> &str {
        "Bug resolver"
    }

    async fn post_commit(
        &self,
        ctx: &HookContext<'_>,
        target: &B,
        _source: &B,
        proposal: &Proposal,
    ) -> HookResult {
        if ctx.dry_run {
            debug!("dry run; not resolving issues");
            return Ok(());
        }
        let Some(tracker) = ctx.issues else {
            debug!("no issue tracker configured");
            return Ok(());
        };

        let (issues, revision) = match (target.fixed_issues(), target.last_revision()) {
            (Ok(issues), Ok(revision)) => (issues, revision),
            (Err(err), _) | (_, Err(err)) => {
                warn!(error = %err, "could not read fixed issues");
                return Ok(());
            }
        };

        let label = &ctx.branch_config.fix_committed_label;
        for issue in &issues {
            match tracker
                .mark_fix_committed(&proposal.target, issue, &revision, label)
                .await
            {
                Ok(()) => info!(issue = %issue, revision = %revision, "marked fix committed"),
                Err(err) => warn!(issue = %issue, error = %err, "could not mark issue fixed"),
            }
        }
        Ok(())
    }
}
