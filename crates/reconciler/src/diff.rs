//! Pure diffing of fact sets.
//!
//! No I/O and no concurrency: given the same inputs these functions always
//! return the same output.

use factsync_core::{Fact, FactSet};
use itertools::Itertools;

use crate::types::{DiffResult, FactUpdate};

/// Compute the operations that turn `observed` into `desired`.
///
/// - additions: desired facts whose identity is not observed
/// - removals: observed facts whose identity is not desired
/// - updates: same identity on both sides, different content (conditions
///   whose operator or threshold changed); the observed remote id is
///   carried onto the desired fact
///
/// Set membership drives the result, so duplicate desired entries never
/// produce duplicate operations.
pub fn diff(observed: &FactSet, desired: &FactSet) -> DiffResult {
    let have = observed.by_identity();
    let want = desired.by_identity();

    let additions = desired
        .iter()
        .filter(|f| !have.contains_key(&f.identity()))
        .cloned()
        .collect_vec();

    let removals = observed
        .iter()
        .filter(|f| !want.contains_key(&f.identity()))
        .cloned()
        .collect_vec();

    let updates = desired
        .iter()
        .filter_map(|wanted| {
            have.get(&wanted.identity())
                .filter(|current| **current != wanted)
                .map(|current| FactUpdate {
                    current: (*current).clone(),
                    desired: wanted.clone().with_remote_id_of(current),
                })
        })
        .collect_vec();

    DiffResult {
        additions,
        removals,
        updates,
    }
}

/// Reorder `items` to follow `like` where possible.
///
/// Items that appear in `like` come first, in `like`'s order; the rest
/// follow in their original order. Every returned element is taken from
/// `items`, so fields that equality ignores (remote ids) survive. Only used
/// for presenting read-backs in the order the caller declared them, never
/// for diffing.
pub fn ordered_like<T: PartialEq + Clone>(items: &[T], like: &[T]) -> Vec<T> {
    let known = like
        .iter()
        .filter_map(|l| items.iter().find(|item| *item == l));
    let extra = items.iter().filter(|item| !like.contains(item));
    known.chain(extra).cloned().collect()
}

/// [`ordered_like`] for fact sets.
pub fn order_facts_like(items: &FactSet, like: &FactSet) -> FactSet {
    ordered_like::<Fact>(items.as_slice(), like.as_slice())
        .into_iter()
        .collect()
}
