//! Landing order for proposals into one target.
//!
//! A proposal whose source depends on another proposal's source lands
//! after it. Depth is the number of prerequisite hops from a proposal's
//! source that stay within the batch; a prerequisite that is not itself
//! a candidate's source does not count.

use std::collections::{HashMap, HashSet};

use tarmac_review::Proposal;
use tracing::error;

/// Sort `proposals` so that prerequisites land first.
///
/// Equal depths keep their input order. Proposals whose prerequisite
/// chain loops back on itself are dropped.
#[must_use]
pub fn sort_landing_candidates(proposals: Vec<Proposal>) -> Vec<Proposal> {
    let prerequisites: HashMap<&str, &str> = proposals
        .iter()
        .filter_map(|proposal| {
            proposal
                .prerequisite
                .as_ref()
                .map(|prerequisite| (proposal.source.unique_name(), prerequisite.unique_name()))
        })
        .collect();

    let sources: HashSet<&str> = proposals
        .iter()
        .map(|proposal| proposal.source.unique_name())
        .collect();

    let depths: Vec<Option<usize>> = proposals
        .iter()
        .map(|proposal| depth(&prerequisites, &sources, proposal.source.unique_name()))
        .collect();

    let mut ordered: Vec<(usize, Proposal)> = proposals
        .into_iter()
        .zip(depths)
        .filter_map(|(proposal, depth)| match depth {
            Some(depth) => Some((depth, proposal)),
            None => {
                error!(
                    proposal = %proposal.web_link,
                    source = %proposal.source.identity,
                    "prerequisite cycle; not landing"
                );
                None
            }
        })
        .collect();

    ordered.sort_by_key(|(depth, _)| *depth);
    ordered.into_iter().map(|(_, proposal)| proposal).collect()
}

/// Hops from `source` through other candidates; `None` on a cycle.
fn depth(
    prerequisites: &HashMap<&str, &str>,
    sources: &HashSet<&str>,
    source: &str,
) -> Option<usize> {
    let mut seen = HashSet::from([source]);
    let mut current = source;
    let mut hops = 0;
    while let Some(&next) = prerequisites.get(current) {
        if !sources.contains(next) {
            break;
        }
        if !seen.insert(next) {
            return None;
        }
        hops += 1;
        current = next;
    }
    Some(hops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_mocks::proposal;

    fn numbers(proposals: &[Proposal]) -> Vec<u64> {
        proposals.iter().map(|proposal| proposal.number).collect()
    }

    #[test]
    fn test_prerequisites_land_first() {
        let sorted = sort_landing_candidates(vec![
            proposal(1, "c", Some("b")),
            proposal(2, "b", Some("a")),
            proposal(3, "a", None),
        ]);
        assert_eq!(numbers(&sorted), vec![3, 2, 1]);
    }

    #[test]
    fn test_equal_depth_is_stable() {
        let sorted = sort_landing_candidates(vec![
            proposal(1, "x", Some("base")),
            proposal(2, "y", None),
            proposal(3, "z", None),
            proposal(4, "w", Some("elsewhere")),
        ]);
        assert_eq!(numbers(&sorted), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_prerequisite_outside_batch_does_not_delay() {
        let sorted = sort_landing_candidates(vec![
            proposal(1, "x", Some("landed")),
            proposal(2, "y", None),
        ]);
        assert_eq!(numbers(&sorted), vec![1, 2]);

        let sorted = sort_landing_candidates(vec![
            proposal(1, "c", Some("b")),
            proposal(2, "b", Some("landed")),
            proposal(3, "d", None),
        ]);
        assert_eq!(numbers(&sorted), vec![2, 3, 1]);
    }

    #[test]
    fn test_forest_never_lands_before_prerequisite() {
        let proposals = vec![
            proposal(1, "d", Some("c")),
            proposal(2, "b", Some("a")),
            proposal(3, "c", Some("a")),
            proposal(4, "a", None),
            proposal(5, "e", Some("b")),
        ];
        let sorted = sort_landing_candidates(proposals);
        let position = |source: &str| {
            sorted
                .iter()
                .position(|p| p.source.branch == source)
                .unwrap_or(usize::MAX)
        };
        for p in &sorted {
            if let Some(prerequisite) = &p.prerequisite {
                let before = position(&prerequisite.branch);
                if before != usize::MAX {
                    assert!(before < position(&p.source.branch));
                }
            }
        }
        assert_eq!(sorted.len(), 5);
    }

    #[test]
    fn test_cycles_are_dropped() {
        let sorted = sort_landing_candidates(vec![
            proposal(1, "a", Some("b")),
            proposal(2, "b", Some("a")),
            proposal(3, "c", Some("a")),
            proposal(4, "d", None),
        ]);
        assert_eq!(numbers(&sorted), vec![4]);
    }

    #[test]
    fn test_self_prerequisite_is_a_cycle() {
        let sorted = sort_landing_candidates(vec![proposal(1, "a", Some("a"))]);
        assert!(sorted.is_empty());
    }
}
