//! Event-driven driver for reconcile passes.
//!
//! The driver consumes resource keys from a channel and runs passes on tokio
//! tasks. A key is never reconciled twice at once: events arriving while a
//! pass is in flight are coalesced into one follow-up pass. Requeued keys run
//! again immediately, retryable failures run again after an exponential
//! backoff, and other failures wait for the next event.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use super::{ReconcileError, ReconcileOutcome, ReconcileResult};
use crate::database::domain::ResourceKey;

/// One reconcile pass, as seen by the driver.
#[async_trait]
pub trait Reconcile: Send + Sync + 'static {
    /// Runs one pass for `key`.
    async fn reconcile(&self, key: &ResourceKey) -> ReconcileResult<ReconcileOutcome>;
}

/// Exponential backoff for retryable failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
    max: Duration,
}

impl BackoffPolicy {
    /// Creates a policy doubling `base` per attempt, capped at `max`.
    #[must_use]
    pub const fn new(base: Duration, max: Duration) -> Self {
        Self { base, max }
    }

    /// Returns the delay before retry number `attempt`, counted from zero.
    #[must_use]
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(300))
    }
}

type PassResult = Result<ReconcileResult<ReconcileOutcome>, JoinError>;

/// Runs reconcile passes for keys received on a channel.
pub struct ReconcileDriver<R>
where
    R: Reconcile,
{
    reconciler: Arc<R>,
    backoff: BackoffPolicy,
}

impl<R> ReconcileDriver<R>
where
    R: Reconcile,
{
    /// Creates a driver.
    #[must_use]
    pub const fn new(reconciler: Arc<R>, backoff: BackoffPolicy) -> Self {
        Self {
            reconciler,
            backoff,
        }
    }

    /// Processes events until the channel closes and in-flight passes finish.
    ///
    /// Retries still waiting on their backoff when that happens are dropped.
    pub async fn run(&self, mut events: mpsc::Receiver<ResourceKey>) {
        let mut state = DriverState::default();
        let mut events_open = true;

        loop {
            if !events_open && state.running.is_empty() {
                break;
            }
            tokio::select! {
                received = events.recv(), if events_open => {
                    let Some(key) = received else {
                        debug!("event channel closed; draining in-flight passes");
                        events_open = false;
                        continue;
                    };
                    self.dispatch(&mut state, key);
                }
                Some(finished) = state.running.join_next() => {
                    let Ok((key, result)) = finished else {
                        error!("reconcile supervisor task failed");
                        continue;
                    };
                    self.complete(&mut state, key, result);
                }
                Some(due) = state.retries.join_next() => {
                    if let Ok(key) = due {
                        self.dispatch(&mut state, key);
                    }
                }
                else => break,
            }
        }
        info!(dropped_retries = state.retries.len(), "reconcile driver stopped");
    }

    fn dispatch(&self, state: &mut DriverState, key: ResourceKey) {
        if state.in_flight.contains(&key) {
            debug!(resource = %key, "pass in flight; coalescing event");
            state.dirty.insert(key);
            return;
        }
        state.in_flight.insert(key.clone());
        let reconciler = Arc::clone(&self.reconciler);
        state.running.spawn(async move {
            let pass_key = key.clone();
            let result = tokio::spawn(async move { reconciler.reconcile(&pass_key).await }).await;
            (key, result)
        });
    }

    fn complete(&self, state: &mut DriverState, key: ResourceKey, result: PassResult) {
        state.in_flight.remove(&key);
        let replay = state.dirty.remove(&key);
        match result {
            Ok(Ok(ReconcileOutcome::Done)) => {
                state.attempts.remove(&key);
                debug!(resource = %key, "resource converged");
                if replay {
                    self.dispatch(state, key);
                }
            }
            Ok(Ok(ReconcileOutcome::Requeue)) => {
                state.attempts.remove(&key);
                self.dispatch(state, key);
            }
            Ok(Err(err)) if err.is_retryable() => self.retry(state, key, &err, replay),
            Ok(Err(err)) => {
                state.attempts.remove(&key);
                error!(resource = %key, class = ?err.class(), error = %err, "reconcile failed permanently");
                if replay {
                    self.dispatch(state, key);
                }
            }
            Err(join) => {
                state.attempts.remove(&key);
                error!(resource = %key, error = %join, "reconcile pass aborted");
                if replay {
                    self.dispatch(state, key);
                }
            }
        }
    }

    fn retry(&self, state: &mut DriverState, key: ResourceKey, err: &ReconcileError, replay: bool) {
        let attempt = state.attempts.entry(key.clone()).or_insert(0);
        let delay = self.backoff.delay(*attempt);
        *attempt = attempt.saturating_add(1);
        warn!(resource = %key, class = ?err.class(), error = %err, ?delay, "reconcile failed; retrying");
        if replay {
            self.dispatch(state, key);
            return;
        }
        state.retries.spawn(async move {
            tokio::time::sleep(delay).await;
            key
        });
    }
}

#[derive(Default)]
struct DriverState {
    in_flight: HashSet<ResourceKey>,
    dirty: HashSet<ResourceKey>,
    attempts: HashMap<ResourceKey, u32>,
    running: JoinSet<(ResourceKey, PassResult)>,
    retries: JoinSet<ResourceKey>,
}
