//! Consistency coordinator.
//!
//! `run_atomic` opens a unit of work, runs the caller's body against it and
//! commits. Any failure rolls the unit back, so a caller either observes every
//! mutation of the body or none. Store conflicts re-run the body from the start
//! with exponential backoff; the body must therefore only capture owned data.

use crate::error::{AppError, Result};
use crate::metrics;
use crate::store::{EntityStore, Mutation, MutationOutcome, StoreError, UnitOfWork};
use futures::future::BoxFuture;
use resilience::{with_timeout, ServiceConfig};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

pub type UnitFuture<'u, T> = BoxFuture<'u, Result<T>>;

#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn EntityStore>,
    policy: ServiceConfig,
}

impl Coordinator {
    pub fn new(store: Arc<dyn EntityStore>, policy: ServiceConfig) -> Self {
        Self { store, policy }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    /// Run `body` as one atomic unit named `operation`.
    ///
    /// Domain errors returned by the body are passed through unchanged after the
    /// rollback. A unique violation becomes `Conflict`. Other store failures
    /// become `CoordinatorAbort` once retries are exhausted or when the failure is
    /// not a concurrency conflict.
    pub async fn run_atomic<T, F>(&self, operation: &'static str, mut body: F) -> Result<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut dyn UnitOfWork) -> UnitFuture<'u, T> + Send,
    {
        let started = Instant::now();
        let mut retry = 0u32;

        loop {
            match self.attempt(operation, &mut body).await {
                Ok(value) => {
                    metrics::record_unit_committed(operation, started.elapsed().as_secs_f64());
                    debug!(operation, retries = retry, "atomic unit committed");
                    return Ok(value);
                }
                Err(err) if err.is_retryable() && retry < self.policy.retry.max_retries => {
                    retry += 1;
                    let delay = self.policy.retry.backoff_for(retry);
                    metrics::record_unit_retried(operation);
                    warn!(
                        operation,
                        retry,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "atomic unit conflicted, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    metrics::record_unit_aborted(operation, started.elapsed().as_secs_f64());
                    return Err(classify(operation, err));
                }
            }
        }
    }

    async fn attempt<T, F>(&self, operation: &'static str, body: &mut F) -> Result<T>
    where
        T: Send,
        F: for<'u> FnMut(&'u mut dyn UnitOfWork) -> UnitFuture<'u, T> + Send,
    {
        let mut unit = self.store.begin().await?;
        let limit = self.policy.timeout.duration;

        let outcome = match with_timeout(limit, body(unit.as_mut())).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Store(StoreError::Unavailable(format!(
                "unit exceeded {limit:?}"
            )))),
        };

        match outcome {
            Ok(value) => {
                unit.commit().await.map_err(StoreError::at_commit)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = unit.rollback().await {
                    warn!(
                        operation,
                        error = %rollback_err,
                        "rollback failed; the store discards the unit on disconnect"
                    );
                }
                Err(err)
            }
        }
    }
}

fn classify(operation: &'static str, err: AppError) -> AppError {
    match err {
        AppError::Store(StoreError::UniqueViolation(constraint)) => {
            AppError::Conflict(format!("{operation} conflicts with an existing record ({constraint})"))
        }
        AppError::Store(source) => {
            warn!(operation, error = %source, "atomic unit aborted");
            AppError::CoordinatorAbort { operation, source }
        }
        other => other,
    }
}

/// Apply a mutation whose failure must not abort the surrounding unit.
///
/// The mutation runs inside a savepoint; on failure the savepoint is rolled back,
/// a warning is logged and `None` is returned.
pub async fn best_effort(
    unit: &mut dyn UnitOfWork,
    mutation: Mutation,
) -> Result<Option<MutationOutcome>> {
    let kind = mutation.kind();
    unit.savepoint().await?;
    match unit.apply(mutation).await {
        Ok(outcome) => {
            unit.release_savepoint().await?;
            Ok(Some(outcome))
        }
        Err(err) => {
            warn!(%kind, error = %err, "best-effort mutation failed, continuing unit");
            unit.rollback_to_savepoint().await?;
            Ok(None)
        }
    }
}

/// Run a unit on its own task so that a dropped request cannot cancel it halfway.
pub async fn detach<T, Fut>(future: Fut) -> Result<T>
where
    T: Send + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    tokio::spawn(future)
        .await
        .map_err(|err| AppError::Internal(format!("atomic unit task failed: {err}")))?
}
