//! Rejects landings authored by people outside `allowed_contributors`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tarmac_git::BranchOps;
use tarmac_git::metadata::parse_identity;
use tarmac_review::Proposal;
use tracing::debug;

use crate::error::{MergeError, MergeErrorKind};
use crate::hooks::{Hook, HookContext, HookError, HookResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct ContributorCheck;

#[async_trait(?Send)]
impl<B: BranchOps> Hook<B> for ContributorCheck {
    fn name(&self) -> &str {
        "Allowed contributors"
    }

    async fn pre_commit(
        &self,
        ctx: &HookContext<'_>,
        _target: &B,
        source: &B,
        proposal: &Proposal,
    ) -> HookResult {
        let Some(allowed) = ctx.branch_config.allowed_contributors.as_deref() else {
            return Ok(());
        };
        debug!(
            source = %proposal.source.display_name,
            target = %proposal.target.display_name,
            "checking that authors are allowed to contribute"
        );

        let authors = source
            .authors()
            .map_err(|err| HookError::Failed(err.into()))?;
        let rejected: BTreeSet<&str> = authors
            .iter()
            .map(String::as_str)
            .filter(|author| !is_allowed(author, allowed))
            .collect();
        if rejected.is_empty() {
            return Ok(());
        }

        let allowed: BTreeSet<&str> = allowed.iter().map(|entry| entry.trim()).collect();
        let indent = "\n    ";
        let comment = format!(
            "There was a problem validating some authors of the branch. \
             Authors must be one of the allowed contributors.\n\n\
             Allowed contributors:\n\n    {}\n\n\
             Unaccepted authors:\n\n    {}",
            allowed.into_iter().collect::<Vec<_>>().join(indent),
            rejected.into_iter().collect::<Vec<_>>().join(indent),
        );
        Err(MergeError::new(
            MergeErrorKind::InvalidContributor,
            "Some contributors are not acceptable.",
        )
        .with_comment(comment)
        .into())
    }
}

/// Whether `author` (`Name <email>`) matches an entry by identity, name,
/// e-mail or e-mail local part.
fn is_allowed(author: &str, allowed: &[String]) -> bool {
    let (name, email) = parse_identity(author);
    let local_part = email
        .as_deref()
        .and_then(|email| email.split_once('@'))
        .map(|(local, _)| local);

    allowed.iter().map(|entry| entry.trim()).any(|entry| {
        entry == author
            || entry == name
            || email
                .as_deref()
                .is_some_and(|email| email.eq_ignore_ascii_case(entry))
            || local_part == Some(entry)
    })
}
