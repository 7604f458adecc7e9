//! Property-based tests for diffing using proptest.
//!
//! Properties verified:
//! - Applying a diff to the observed set yields the desired set
//! - Diffing a set against itself is empty
//! - Additions are never observed, removals are never desired
//! - Duplicate desired entries never produce duplicate operations
//! - A full reconciliation leaves the store holding exactly the desired set

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashSet;
use std::sync::Arc;

use factsync_core::{Condition, ConditionOp, Fact, FactScope, FactSet, Permission, Scope};
use factsync_reconciler::{
    diff, CancellationToken, InMemoryFactStore, Reconciler, ReconcilerConfig, RetryPolicy,
};
use proptest::prelude::*;

const METRICS: [&str; 5] = ["coverage", "new_bugs", "duplicated_lines", "smells", "vulns"];

fn devs() -> FactScope {
    FactScope::group_permissions(Scope::Project("api".into()), "devs")
}

fn permission_facts() -> impl Strategy<Value = Vec<Fact>> {
    prop::collection::vec(prop::sample::select(Permission::ALL.to_vec()), 0..14)
        .prop_map(|ps| ps.into_iter().map(|p| devs().fact(p)).collect())
}

fn condition_facts() -> impl Strategy<Value = Vec<Fact>> {
    let condition = (
        prop::sample::select(METRICS.to_vec()),
        any::<bool>(),
        0u8..4,
    )
        .prop_map(|(metric, lt, threshold)| {
            let op = if lt { ConditionOp::Lt } else { ConditionOp::Gt };
            FactScope::gate_conditions("9").fact(Condition::new(metric, op, threshold.to_string()))
        });
    prop::collection::vec(condition, 0..8)
}

proptest! {
    /// Property: observed with the diff applied equals desired.
    #[test]
    fn prop_diff_applied_yields_desired(
        observed in permission_facts(),
        desired in permission_facts(),
    ) {
        let observed = FactSet::from(observed);
        let desired = FactSet::from(desired);

        let changes = diff(&observed, &desired);

        prop_assert!(changes.apply_to(&observed).set_eq(&desired));
        prop_assert!(changes.updates.is_empty());
    }

    /// Property: condition diffs converge too, through updates.
    #[test]
    fn prop_condition_diff_applied_yields_desired(
        observed in condition_facts(),
        desired in condition_facts(),
    ) {
        let observed = FactSet::from(observed);
        let desired = FactSet::from(desired);

        let changes = diff(&observed, &desired);

        prop_assert!(changes.apply_to(&observed).set_eq(&desired));
    }

    /// Property: a set diffed against itself needs no operation.
    #[test]
    fn prop_self_diff_is_empty(facts in condition_facts()) {
        let set = FactSet::from(facts);
        prop_assert!(diff(&set, &set).is_empty());
    }

    /// Property: additions are absent from observed, removals absent from desired.
    #[test]
    fn prop_operations_are_minimal(
        observed in permission_facts(),
        desired in permission_facts(),
    ) {
        let observed = FactSet::from(observed);
        let desired = FactSet::from(desired);

        let changes = diff(&observed, &desired);

        for fact in &changes.additions {
            prop_assert!(!observed.contains(fact));
            prop_assert!(desired.contains(fact));
        }
        for fact in &changes.removals {
            prop_assert!(observed.contains(fact));
            prop_assert!(!desired.contains(fact));
        }
    }

    /// Property: duplicates in the declaration collapse to one operation each.
    #[test]
    fn prop_duplicates_never_repeat_operations(desired in permission_facts()) {
        let doubled: Vec<Fact> = desired.iter().chain(desired.iter()).cloned().collect();

        let changes = diff(&FactSet::new(), &FactSet::from(doubled));

        let unique: HashSet<&Fact> = changes.additions.iter().collect();
        prop_assert_eq!(unique.len(), changes.additions.len());
        let distinct: HashSet<&Fact> = desired.iter().collect();
        prop_assert_eq!(changes.additions.len(), distinct.len());
    }

    /// Property: reconciling against the in-memory store converges to desired.
    #[test]
    fn prop_reconcile_converges(
        observed in condition_facts(),
        desired in condition_facts(),
        lag in 0usize..3,
    ) {
        let gate = FactScope::gate_conditions("9");
        let desired = FactSet::from(desired);
        let store = Arc::new(
            InMemoryFactStore::new(gate)
                .with_facts(FactSet::from(observed))
                .with_visibility_lag(lag),
        );
        let reconciler = Reconciler::new(ReconcilerConfig {
            retry: RetryPolicy::immediate(5),
            ..ReconcilerConfig::default()
        });

        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .expect("runtime creation should succeed");
        let outcome = rt.block_on(reconciler.reconcile(
            &desired,
            store.clone(),
            &CancellationToken::new(),
        ));

        prop_assert!(outcome.is_ok(), "reconcile failed: {:?}", outcome.err());
        let committed = rt.block_on(store.committed());
        prop_assert!(committed.set_eq(&desired));
    }
}
