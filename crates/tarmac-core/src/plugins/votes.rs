//! Rejects landings whose votes do not meet `voting_criteria`.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use tarmac_git::BranchOps;
use tarmac_review::{Proposal, Vote};

use crate::error::{MergeError, MergeErrorKind};
use crate::hooks::{Hook, HookContext, HookResult};

#[allow(clippy::expect_used)]
static CRITERION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(.+?)\s*(==|!=|<=|>=|<|>)\s*(\d+)\s*$").expect("criterion pattern is valid")
});

/// Comparison in a voting criterion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    fn parse(op: &str) -> Option<Self> {
        Some(match op {
            "==" => Self::Eq,
            "!=" => Self::Ne,
            "<" => Self::Lt,
            "<=" => Self::Le,
            ">" => Self::Gt,
            ">=" => Self::Ge,
            _ => return None,
        })
    }

    const fn holds(self, lhs: usize, rhs: usize) -> bool {
        match self {
            Self::Eq => lhs == rhs,
            Self::Ne => lhs != rhs,
            Self::Lt => lhs < rhs,
            Self::Le => lhs <= rhs,
            Self::Gt => lhs > rhs,
            Self::Ge => lhs >= rhs,
        }
    }
}

/// One `<vote> <op> <count>` requirement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Criterion {
    pub vote: String,
    pub comparison: Comparison,
    pub count: usize,
}

/// Parse criteria separated by `,` or `;`.
///
/// # Errors
/// Returns an `InvalidCriterion` error naming the first bad criterion.
pub fn parse_criteria(text: &str) -> Result<Vec<Criterion>, MergeError> {
    text.split([',', ';'])
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            let invalid = || {
                MergeError::new(
                    MergeErrorKind::InvalidCriterion,
                    format!("Invalid voting criterion: {}", part.trim()),
                )
            };
            let captures = CRITERION.captures(part).ok_or_else(invalid)?;
            Ok(Criterion {
                vote: captures[1].to_string(),
                comparison: Comparison::parse(&captures[2]).ok_or_else(invalid)?,
                count: captures[3].parse().map_err(|_| invalid())?,
            })
        })
        .collect()
}

/// Number of cast votes per value.
#[must_use]
pub fn count_votes(votes: &[Vote]) -> BTreeMap<&str, usize> {
    let mut counts = BTreeMap::new();
    for value in votes.iter().filter_map(|vote| vote.value.as_deref()) {
        *counts.entry(value).or_insert(0) += 1;
    }
    counts
}

#[must_use]
pub fn evaluate_criteria(counts: &BTreeMap<&str, usize>, criteria: &[Criterion]) -> bool {
    criteria.iter().all(|criterion| {
        let count = counts.get(criterion.vote.as_str()).copied().unwrap_or(0);
        criterion.comparison.holds(count, criterion.count)
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VoteCheck;

#[async_trait(?Send)]
impl<B: BranchOps> Hook<B> for VoteCheck {
    fn name(&self) -> &str {
        "Votes"
    }

    async fn pre_commit(
        &self,
        ctx: &HookContext<'_>,
        _target: &B,
        _source: &B,
        proposal: &Proposal,
    ) -> HookResult {
        let Some(text) = ctx.branch_config.voting_criteria.as_deref() else {
            return Ok(());
        };
        let criteria = parse_criteria(text)?;
        let counts = count_votes(&proposal.votes);
        if evaluate_criteria(&counts, &criteria) {
            return Ok(());
        }

        let got = if counts.is_empty() {
            "no votes".to_string()
        } else {
            counts
                .iter()
                .map(|(value, count)| format!("{count} {value}"))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let required = text.trim().trim_end_matches([',', ';']).trim_end();
        Err(MergeError::new(
            MergeErrorKind::VotingViolation,
            format!("Voting does not meet specified criteria. Required: {required}. Got: {got}."),
        )
        .into())
    }
}
