//! Remote fact stores.
//!
//! [`RemoteFactStore`] is the seam between the engine and the remote
//! service: one implementation per fact scope, each exposing single-fact
//! add/remove and a full list. [`InMemoryFactStore`] implements it with
//! configurable eventual consistency for tests and simulation.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use factsync_core::{Attribute, Fact, FactScope, FactSet};
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{RemoteError, RemoteResult};
use crate::types::Operation;

/// Add, remove and list facts of one scope on the remote service.
///
/// Implementations must be safe to call concurrently. Add and remove are
/// not assumed idempotent; the engine never adds an observed fact or
/// removes an unobserved one.
#[async_trait]
pub trait RemoteFactStore: Send + Sync {
    /// The scope this store manages.
    fn scope(&self) -> &FactScope;

    /// Create one fact.
    async fn add(&self, fact: &Fact) -> RemoteResult<()>;

    /// Delete one fact.
    async fn remove(&self, fact: &Fact) -> RemoteResult<()>;

    /// Change a fact in place, keeping its remote id.
    async fn update(&self, _current: &Fact, desired: &Fact) -> RemoteResult<()> {
        Err(RemoteError::rejected(
            desired.clone(),
            "in-place update not supported by this store",
        ))
    }

    /// Read every fact of the scope, across all pages.
    async fn list(&self) -> RemoteResult<FactSet>;

    /// Apply one operation.
    async fn apply(&self, operation: &Operation) -> RemoteResult<()> {
        match operation {
            Operation::Add(fact) => self.add(fact).await,
            Operation::Remove(fact) => self.remove(fact).await,
            Operation::Update(update) => self.update(&update.current, &update.desired).await,
        }
    }
}

#[derive(Debug, Default)]
struct StoreState {
    committed: FactSet,
    /// Snapshot served while a visibility lag is in effect.
    stale: Option<FactSet>,
    stale_reads_left: usize,
    list_failures_left: usize,
}

#[derive(Debug, Default)]
struct CallCounts {
    add: AtomicUsize,
    remove: AtomicUsize,
    update: AtomicUsize,
    list: AtomicUsize,
}

/// In-memory, eventually consistent fact store.
///
/// After any mutation the next `visibility_lag` reads return the facts as
/// they were before the mutation. Mutations that land while a lag window
/// is open restart the window but keep the older snapshot.
#[derive(Debug)]
pub struct InMemoryFactStore {
    scope: FactScope,
    state: RwLock<StoreState>,
    visibility_lag: usize,
    latency: Duration,
    rejections: Vec<(Attribute, String)>,
    list_error: Option<RemoteError>,
    next_id: AtomicU64,
    calls: CallCounts,
}

impl InMemoryFactStore {
    /// Create an empty, immediately consistent store.
    pub fn new(scope: FactScope) -> Self {
        Self {
            scope,
            state: RwLock::new(StoreState::default()),
            visibility_lag: 0,
            latency: Duration::ZERO,
            rejections: Vec::new(),
            list_error: None,
            next_id: AtomicU64::new(1),
            calls: CallCounts::default(),
        }
    }

    /// Seed the store with committed facts. Conditions without an id get one.
    #[must_use]
    pub fn with_facts(mut self, facts: FactSet) -> Self {
        let committed = facts
            .into_iter()
            .map(|fact| self.assign_id(fact))
            .collect();
        self.state.get_mut().committed = committed;
        self
    }

    /// Serve pre-mutation snapshots for `reads` reads after each mutation.
    #[must_use]
    pub fn with_visibility_lag(mut self, reads: usize) -> Self {
        self.visibility_lag = reads;
        self
    }

    /// Delay every mutation by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject every mutation of `attribute` with `reason`.
    #[must_use]
    pub fn reject(mut self, attribute: impl Into<Attribute>, reason: impl Into<String>) -> Self {
        self.rejections.push((attribute.into(), reason.into()));
        self
    }

    /// Fail the next `count` reads with `error`.
    #[must_use]
    pub fn with_list_failures(mut self, count: usize, error: RemoteError) -> Self {
        self.state.get_mut().list_failures_left = count;
        self.list_error = Some(error);
        self
    }

    /// The committed facts, ignoring any visibility lag.
    pub async fn committed(&self) -> FactSet {
        self.state.read().await.committed.clone()
    }

    /// Number of add calls received.
    pub fn add_calls(&self) -> usize {
        self.calls.add.load(Ordering::SeqCst)
    }

    /// Number of remove calls received.
    pub fn remove_calls(&self) -> usize {
        self.calls.remove.load(Ordering::SeqCst)
    }

    /// Number of update calls received.
    pub fn update_calls(&self) -> usize {
        self.calls.update.load(Ordering::SeqCst)
    }

    /// Number of list calls received.
    pub fn list_calls(&self) -> usize {
        self.calls.list.load(Ordering::SeqCst)
    }

    /// Number of add, remove and update calls received.
    pub fn mutation_calls(&self) -> usize {
        self.add_calls()
            .saturating_add(self.remove_calls())
            .saturating_add(self.update_calls())
    }

    fn assign_id(&self, mut fact: Fact) -> Fact {
        if let Attribute::Condition(condition) = &mut fact.attribute {
            if condition.id.is_none() {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                condition.id = Some(id.to_string());
            }
        }
        fact
    }

    fn check(&self, fact: &Fact) -> RemoteResult<()> {
        if let Err(e) = self.scope.admit(fact) {
            return Err(RemoteError::rejected(fact.clone(), e.to_string()));
        }
        match self.rejections.iter().find(|(a, _)| *a == fact.attribute) {
            Some((_, reason)) => Err(RemoteError::rejected(fact.clone(), reason.clone())),
            None => Ok(()),
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn open_lag_window(&self, state: &mut StoreState) {
        if self.visibility_lag == 0 {
            return;
        }
        if state.stale.is_none() {
            state.stale = Some(state.committed.clone());
        }
        state.stale_reads_left = self.visibility_lag;
    }
}

#[async_trait]
impl RemoteFactStore for InMemoryFactStore {
    fn scope(&self) -> &FactScope {
        &self.scope
    }

    async fn add(&self, fact: &Fact) -> RemoteResult<()> {
        self.calls.add.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check(fact)?;

        let mut state = self.state.write().await;
        if state.committed.get(fact).is_some() {
            return Err(RemoteError::rejected(fact.clone(), "already exists"));
        }
        self.open_lag_window(&mut state);
        let stored = self.assign_id(fact.clone());
        debug!(scope = %self.scope, fact = %stored, "Fact added");
        state.committed.insert(stored);
        Ok(())
    }

    async fn remove(&self, fact: &Fact) -> RemoteResult<()> {
        self.calls.remove.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check(fact)?;

        let mut state = self.state.write().await;
        if state.committed.get(fact).is_none() {
            return Err(RemoteError::rejected(fact.clone(), "not found"));
        }
        self.open_lag_window(&mut state);
        let identity = fact.identity();
        state.committed = std::mem::take(&mut state.committed)
            .into_iter()
            .filter(|f| f.identity() != identity)
            .collect();
        debug!(scope = %self.scope, fact = %fact, "Fact removed");
        Ok(())
    }

    async fn update(&self, current: &Fact, desired: &Fact) -> RemoteResult<()> {
        self.calls.update.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        self.check(desired)?;

        let mut state = self.state.write().await;
        let Some(stored) = state.committed.get(current).cloned() else {
            return Err(RemoteError::rejected(current.clone(), "not found"));
        };
        self.open_lag_window(&mut state);
        let replacement = desired.clone().with_remote_id_of(&stored);
        let identity = stored.identity();
        state.committed = std::mem::take(&mut state.committed)
            .into_iter()
            .map(|f| {
                if f.identity() == identity {
                    replacement.clone()
                } else {
                    f
                }
            })
            .collect();
        debug!(scope = %self.scope, fact = %replacement, "Fact updated");
        Ok(())
    }

    async fn list(&self) -> RemoteResult<FactSet> {
        self.calls.list.fetch_add(1, Ordering::SeqCst);

        let mut state = self.state.write().await;
        if state.list_failures_left > 0 {
            state.list_failures_left = state.list_failures_left.saturating_sub(1);
            if let Some(error) = &self.list_error {
                return Err(error.clone());
            }
        }
        if state.stale_reads_left > 0 {
            state.stale_reads_left = state.stale_reads_left.saturating_sub(1);
            if let Some(stale) = &state.stale {
                return Ok(stale.clone());
            }
        }
        state.stale = None;
        Ok(state.committed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factsync_core::{Condition, ConditionOp, Permission, Scope};

    fn devs() -> FactScope {
        FactScope::group_permissions(Scope::Organization, "devs")
    }

    #[tokio::test]
    async fn test_add_then_list() {
        let g = devs();
        let store = InMemoryFactStore::new(g.clone());

        assert!(store.add(&g.fact(Permission::Scan)).await.is_ok());
        let listed = store.list().await;

        assert_eq!(listed.ok().map(|s| s.len()), Some(1));
        assert_eq!(store.add_calls(), 1);
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_add_is_not_idempotent() {
        let g = devs();
        let store = InMemoryFactStore::new(g.clone()).with_facts(vec![g.fact(Permission::Scan)].into());

        let result = store.add(&g.fact(Permission::Scan)).await;

        assert!(matches!(result, Err(RemoteError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_remove_missing_fact_is_rejected() {
        let g = devs();
        let store = InMemoryFactStore::new(g.clone());

        let result = store.remove(&g.fact(Permission::Admin)).await;

        assert!(matches!(result, Err(RemoteError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_visibility_lag_serves_stale_reads() {
        let g = devs();
        let store = InMemoryFactStore::new(g.clone()).with_visibility_lag(2);

        assert!(store.add(&g.fact(Permission::Admin)).await.is_ok());

        let first = store.list().await.ok().map(|s| s.len());
        let second = store.list().await.ok().map(|s| s.len());
        let third = store.list().await.ok().map(|s| s.len());

        assert_eq!(first, Some(0));
        assert_eq!(second, Some(0));
        assert_eq!(third, Some(1));
        assert_eq!(store.committed().await.len(), 1);
    }

    #[tokio::test]
    async fn test_configured_rejection() {
        let g = devs();
        let store = InMemoryFactStore::new(g.clone()).reject(Permission::GateAdmin, "quota exceeded");

        let result = store.add(&g.fact(Permission::GateAdmin)).await;

        assert!(matches!(
            result,
            Err(RemoteError::Rejected { reason, .. }) if reason == "quota exceeded"
        ));
        assert!(store.committed().await.is_empty());
    }

    #[tokio::test]
    async fn test_foreign_fact_is_rejected() {
        let store = InMemoryFactStore::new(devs());
        let other = FactScope::group_permissions(Scope::Organization, "ops");

        let result = store.add(&other.fact(Permission::Admin)).await;

        assert!(matches!(result, Err(RemoteError::Rejected { .. })));
    }

    #[tokio::test]
    async fn test_conditions_get_remote_ids() {
        let gate = FactScope::gate_conditions("9");
        let store = InMemoryFactStore::new(gate.clone());
        let condition = gate.fact(Condition::new("coverage", ConditionOp::Lt, "80"));

        assert!(store.add(&condition).await.is_ok());
        let stored = store.committed().await;

        assert!(stored
            .get(&condition)
            .and_then(|f| f.attribute.remote_id().map(str::to_owned))
            .is_some());
    }

    #[tokio::test]
    async fn test_update_keeps_remote_id() {
        let gate = FactScope::gate_conditions("9");
        let store = InMemoryFactStore::new(gate.clone()).with_facts(
            vec![gate.fact(Condition::new("coverage", ConditionOp::Lt, "80").with_id("5"))].into(),
        );
        let current = gate.fact(Condition::new("coverage", ConditionOp::Lt, "80"));
        let desired = gate.fact(Condition::new("coverage", ConditionOp::Lt, "60"));

        assert!(store.update(&current, &desired).await.is_ok());
        let stored = store.committed().await;

        assert!(stored.contains(&desired));
        assert_eq!(
            stored.get(&desired).and_then(|f| f.attribute.remote_id()),
            Some("5")
        );
    }

    #[tokio::test]
    async fn test_list_failures_are_transient() {
        let store = InMemoryFactStore::new(devs())
            .with_list_failures(1, RemoteError::unavailable("503 Service Unavailable"));

        assert!(store.list().await.is_err());
        assert!(store.list().await.is_ok());
    }
}
