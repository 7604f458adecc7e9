//! Reconciliation orchestrator.

use std::sync::Arc;

use factsync_core::FactSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ReconcilerConfig, RetryPolicy};
use crate::diff::{diff, order_facts_like};
use crate::dispatch::MutationDispatcher;
use crate::error::{Error, RemoteError, RemoteResult, Result};
use crate::store::RemoteFactStore;
use crate::types::{Converged, DiffResult, Phase, ReconciliationOutcome};
use crate::verify::ConsistencyVerifier;

/// Drives one store from its observed facts to a desired fact set.
///
/// Every reconciliation runs `Diffing -> Mutating -> Verifying` and ends
/// either converged, with the facts read back from the store, or failed.
/// Nothing is cached between runs: diffing always starts from a fresh read,
/// so re-running after a failure is safe.
#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler.
    pub fn new(config: ReconcilerConfig) -> Self {
        Self { config }
    }

    /// Get a builder.
    pub fn builder() -> ReconcilerBuilder {
        ReconcilerBuilder::new()
    }

    /// Get the configuration.
    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }

    /// Reconcile `store` toward `desired` using the configured retry policy.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidDesiredState`] if a desired fact does not belong to
    ///   the store; no remote call is made.
    /// - [`Error::ObservationFailed`] if the initial read fails.
    /// - [`Error::Mutation`] or [`Error::DispatchTimeout`] if any operation
    ///   was not applied; verification is skipped.
    /// - [`Error::ConvergenceTimeout`] if the store never reported `desired`.
    /// - [`Error::Cancelled`] if `cancel` fired first.
    pub async fn reconcile(
        &self,
        desired: &FactSet,
        store: Arc<dyn RemoteFactStore>,
        cancel: &CancellationToken,
    ) -> ReconciliationOutcome {
        self.reconcile_with_policy(desired, store, &self.config.retry, cancel)
            .await
    }

    /// Reconcile with an explicit convergence policy.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::reconcile`].
    pub async fn reconcile_with_policy(
        &self,
        desired: &FactSet,
        store: Arc<dyn RemoteFactStore>,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> ReconciliationOutcome {
        let scope = store.scope().clone();
        info!(scope = %scope, desired = desired.len(), "Starting reconciliation");

        // Diffing
        let (observed, changes) = self.diff_against(desired, store.as_ref(), cancel).await?;
        if changes.is_empty() {
            info!(scope = %scope, facts = observed.len(), "Already converged");
            return Ok(Converged {
                facts: order_facts_like(&observed, desired),
                applied: Vec::new(),
                verify_attempts: 0,
            });
        }
        info!(
            scope = %scope,
            additions = changes.additions.len(),
            removals = changes.removals.len(),
            updates = changes.updates.len(),
            "Computed diff"
        );

        // Mutating
        let dispatcher = MutationDispatcher::new(self.config.dispatch_deadline);
        let report = dispatcher
            .dispatch(changes.into_operations(), Arc::clone(&store), cancel)
            .await
            .inspect_err(|e| warn!(scope = %scope, error = %e, "Mutation phase failed"))?;
        if !report.all_succeeded() {
            let error = Error::mutation(report.failed);
            warn!(
                scope = %scope,
                succeeded = report.succeeded.len(),
                error = %error,
                "Reconciliation failed"
            );
            return Err(error);
        }

        // Verifying
        let verifier = ConsistencyVerifier::new(policy.clone());
        let (confirmed, attempts) = verifier
            .verify_converged(store.as_ref(), desired, cancel)
            .await?;

        info!(
            scope = %scope,
            applied = report.succeeded.len(),
            attempts,
            "Reconciliation converged"
        );
        Ok(Converged {
            facts: order_facts_like(&confirmed, desired),
            applied: report.succeeded,
            verify_attempts: attempts,
        })
    }

    /// Remove every fact from `store`.
    ///
    /// # Errors
    ///
    /// See [`Reconciler::reconcile`].
    pub async fn teardown(
        &self,
        store: Arc<dyn RemoteFactStore>,
        cancel: &CancellationToken,
    ) -> ReconciliationOutcome {
        self.reconcile(&FactSet::new(), store, cancel).await
    }

    /// Compute the operations a reconciliation would dispatch, without
    /// mutating anything.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidDesiredState`], [`Error::ObservationFailed`]
    /// or [`Error::Cancelled`] like the diffing phase of a reconciliation.
    pub async fn plan(
        &self,
        desired: &FactSet,
        store: &dyn RemoteFactStore,
        cancel: &CancellationToken,
    ) -> Result<DiffResult> {
        self.diff_against(desired, store, cancel)
            .await
            .map(|(_, changes)| changes)
    }

    /// Read `store`, ordered like the caller's declaration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ObservationFailed`] if the read fails or outlasts
    /// the dispatch deadline.
    pub async fn read_ordered(
        &self,
        store: &dyn RemoteFactStore,
        declared: &FactSet,
    ) -> Result<FactSet> {
        let observed = self
            .observe(store)
            .await
            .map_err(Error::observation_failed)?;
        Ok(order_facts_like(&observed, declared))
    }

    /// One bounded read of `store`.
    async fn observe(&self, store: &dyn RemoteFactStore) -> RemoteResult<FactSet> {
        let deadline = self.config.dispatch_deadline;
        tokio::time::timeout(deadline, store.list())
            .await
            .unwrap_or_else(|_| Err(RemoteError::timeout(deadline)))
    }

    async fn diff_against(
        &self,
        desired: &FactSet,
        store: &dyn RemoteFactStore,
        cancel: &CancellationToken,
    ) -> Result<(FactSet, DiffResult)> {
        validate_desired(desired, store)?;

        let read = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::cancelled(Phase::Diffing)),
            read = self.observe(store) => read,
        };
        let observed = read.map_err(|e| {
            warn!(scope = %store.scope(), error = %e, "Failed to observe remote state");
            Error::observation_failed(e)
        })?;

        let changes = diff(&observed, desired);
        debug!(
            scope = %store.scope(),
            observed = observed.len(),
            operations = changes.len(),
            "Diffed remote state"
        );
        Ok((observed, changes))
    }
}

fn validate_desired(desired: &FactSet, store: &dyn RemoteFactStore) -> Result<()> {
    desired
        .iter()
        .try_for_each(|fact| store.scope().admit(fact))
        .map_err(|e| Error::invalid_desired_state(e.to_string()))
}

/// Builder for [`Reconciler`].
#[derive(Debug, Default)]
pub struct ReconcilerBuilder {
    config: ReconcilerConfig,
}

impl ReconcilerBuilder {
    /// Create a new builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the configuration.
    #[must_use]
    pub fn with_config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the dispatch deadline.
    #[must_use]
    pub fn dispatch_deadline(mut self, deadline: std::time::Duration) -> Self {
        self.config.dispatch_deadline = deadline;
        self
    }

    /// Set the convergence policy.
    #[must_use]
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Build the reconciler.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the configuration does not validate.
    pub fn build(self) -> Result<Reconciler> {
        self.config.validate()?;
        Ok(Reconciler::new(self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFactStore;
    use async_trait::async_trait;
    use factsync_core::{Fact, FactScope, Permission, Scope};
    use std::time::Duration;

    fn devs() -> FactScope {
        FactScope::group_permissions(Scope::Organization, "devs")
    }

    /// Store whose reads never come back.
    struct StalledStore {
        scope: FactScope,
    }

    #[async_trait]
    impl RemoteFactStore for StalledStore {
        fn scope(&self) -> &FactScope {
            &self.scope
        }

        async fn add(&self, _fact: &Fact) -> RemoteResult<()> {
            Ok(())
        }

        async fn remove(&self, _fact: &Fact) -> RemoteResult<()> {
            Ok(())
        }

        async fn list(&self) -> RemoteResult<FactSet> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(FactSet::new())
        }
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(ReconcilerConfig {
            retry: RetryPolicy::immediate(3),
            ..ReconcilerConfig::default()
        })
    }

    #[tokio::test]
    async fn test_reconcile_empty() {
        let store = Arc::new(InMemoryFactStore::new(devs()));

        let result = reconciler()
            .reconcile(&FactSet::new(), store.clone(), &CancellationToken::new())
            .await;

        assert!(result.as_ref().is_ok_and(Converged::was_noop));
        assert_eq!(store.list_calls(), 1);
    }

    #[tokio::test]
    async fn test_reconcile_adds_missing_facts() {
        let g = devs();
        let store = Arc::new(InMemoryFactStore::new(g.clone()));
        let desired: FactSet = vec![g.fact(Permission::Admin), g.fact(Permission::Scan)].into();

        let result = reconciler()
            .reconcile(&desired, store.clone(), &CancellationToken::new())
            .await;

        let converged = result.ok();
        assert_eq!(converged.as_ref().map(|c| c.applied.len()), Some(2));
        assert!(converged.is_some_and(|c| c.facts.set_eq(&desired)));
        assert_eq!(store.add_calls(), 2);
    }

    #[tokio::test]
    async fn test_foreign_desired_fact_makes_no_remote_call() {
        let store = Arc::new(InMemoryFactStore::new(devs()));
        let ops = FactScope::group_permissions(Scope::Organization, "ops");
        let desired: FactSet = vec![ops.fact(Permission::Admin)].into();

        let result = reconciler()
            .reconcile(&desired, store.clone(), &CancellationToken::new())
            .await;

        assert!(matches!(result, Err(Error::InvalidDesiredState { .. })));
        assert_eq!(store.list_calls(), 0);
    }

    #[tokio::test]
    async fn test_plan_does_not_mutate() {
        let g = devs();
        let store = InMemoryFactStore::new(g.clone())
            .with_facts(vec![g.fact(Permission::Provisioning)].into());
        let desired: FactSet = vec![g.fact(Permission::Admin)].into();

        let plan = reconciler()
            .plan(&desired, &store, &CancellationToken::new())
            .await
            .ok();

        assert_eq!(plan.as_ref().map(DiffResult::len), Some(2));
        assert_eq!(store.mutation_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_initial_read_is_bounded_by_dispatch_deadline() {
        let g = devs();
        let store = StalledStore { scope: g.clone() };
        let reconciler = Reconciler::builder()
            .dispatch_deadline(Duration::from_secs(5))
            .build();
        assert!(reconciler.is_ok());
        let Ok(reconciler) = reconciler else { return };
        let started = tokio::time::Instant::now();

        let result = reconciler
            .plan(
                &vec![g.fact(Permission::Admin)].into(),
                &store,
                &CancellationToken::new(),
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::ObservationFailed {
                source: RemoteError::Timeout { after_ms: 5000 }
            })
        ));
        assert!(started.elapsed() < Duration::from_secs(6));
    }

    #[test]
    fn test_builder() {
        let result = Reconciler::builder()
            .dispatch_deadline(Duration::from_secs(5))
            .retry_policy(RetryPolicy::immediate(2))
            .build();

        let reconciler = result.ok();
        assert_eq!(
            reconciler.as_ref().map(|r| r.config().dispatch_deadline),
            Some(Duration::from_secs(5))
        );
        assert_eq!(
            reconciler.and_then(|r| r.config().retry.max_attempts),
            Some(2)
        );
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = Reconciler::builder()
            .dispatch_deadline(Duration::ZERO)
            .build();

        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }
}
