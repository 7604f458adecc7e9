//! Concurrent mutation dispatch.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn, Instrument};

use crate::error::{Error, OperationFailure, RemoteResult, Result};
use crate::store::RemoteFactStore;
use crate::types::{DispatchReport, Operation, Phase};

/// Runs every operation of one reconciliation as an independent task.
///
/// All tasks are spawned before any result is awaited. The call returns when
/// every task has reported, the deadline elapses, or the token is cancelled.
/// Tasks still running at that point are detached, not aborted: the remote
/// mutation may land later, and the next reconciliation re-reads state.
#[derive(Debug, Clone, Copy)]
pub struct MutationDispatcher {
    deadline: Duration,
}

impl MutationDispatcher {
    /// Create a dispatcher with an overall deadline.
    pub fn new(deadline: Duration) -> Self {
        Self { deadline }
    }

    /// The overall deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Apply `operations` to `store` concurrently.
    ///
    /// Individual failures are collected into the report; succeeded
    /// operations are never rolled back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DispatchTimeout`] if some task has not reported when
    /// the deadline elapses, and [`Error::Cancelled`] if `cancel` fires first.
    pub async fn dispatch(
        &self,
        operations: Vec<Operation>,
        store: Arc<dyn RemoteFactStore>,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        let total = operations.len();
        let mut report = DispatchReport::default();
        if total == 0 {
            return Ok(report);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<(Operation, RemoteResult<()>)>();
        for operation in operations {
            let tx = tx.clone();
            let store = Arc::clone(&store);
            let span = tracing::debug_span!("mutation", op = %operation.description());
            tokio::spawn(
                async move {
                    let result = store.apply(&operation).await;
                    // Receiver is gone once the dispatcher gave up.
                    let _ = tx.send((operation, result));
                }
                .instrument(span),
            );
        }
        drop(tx);

        let deadline = tokio::time::sleep(self.deadline);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                biased;

                () = cancel.cancelled() => {
                    warn!(completed = report.total(), total, "Dispatch cancelled");
                    return Err(Error::cancelled(Phase::Mutating));
                }
                () = &mut deadline => {
                    let pending = total.saturating_sub(report.total());
                    warn!(
                        deadline_ms = self.deadline.as_millis(),
                        pending,
                        "Dispatch deadline elapsed"
                    );
                    return Err(Error::dispatch_timeout(self.deadline, pending));
                }
                received = rx.recv() => match received {
                    Some((operation, Ok(()))) => {
                        debug!(op = %operation.description(), "Operation applied");
                        report.succeeded.push(operation);
                    }
                    Some((operation, Err(error))) => {
                        warn!(op = %operation.description(), error = %error, "Operation failed");
                        report.failed.push(OperationFailure { operation, error });
                    }
                    None => break,
                },
            }
        }

        Ok(report)
    }
}

impl Default for MutationDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}
