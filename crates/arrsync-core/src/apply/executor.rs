//! Concurrent, dependency-respecting execution of a schedule
//!
//! Each service gets one worker task that walks its own operations in
//! schedule order, so calls to a single service never overlap. Workers for
//! different services run concurrently and only wait on each other where a
//! cross-service edge demands it. Every operation publishes its completion on
//! a watch channel that dependants subscribe to.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, info, info_span, warn};

use arrsync_client::{AdapterError, AdapterResult, ServiceAdapter};
use arrsync_model::{ResourceGraph, ResourceId};

use super::{ApplyPolicy, IdIndex, OpResult, Outcome};
use crate::plan::{EdgeKind, Operation, Schedule, ScheduledOp};

#[derive(Debug, Clone)]
struct Completion {
    ok: bool,
    /// The resource to blame when dependants are blocked
    cause: Option<ResourceId>,
}

type Signals = Arc<Vec<watch::Sender<Option<Completion>>>>;

/// Runs a [`Schedule`] against service adapters
pub struct Executor {
    adapters: BTreeMap<String, Arc<dyn ServiceAdapter>>,
    policy: ApplyPolicy,
    cancel: CancellationToken,
}

impl Executor {
    pub fn new(
        adapters: BTreeMap<String, Arc<dyn ServiceAdapter>>,
        policy: ApplyPolicy,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            adapters,
            policy,
            cancel,
        }
    }

    /// Execute every operation and return one result per position, in
    /// schedule order.
    ///
    /// `live` seeds each worker's id index with the remote ids of resources
    /// that already exist.
    pub async fn execute(&self, schedule: Schedule, live: Arc<ResourceGraph>) -> Vec<OpResult> {
        let schedule = Arc::new(schedule);
        let signals: Signals = Arc::new(
            (0..schedule.len())
                .map(|_| watch::channel(None).0)
                .collect(),
        );

        let mut workers = Vec::new();
        let mut results = Vec::with_capacity(schedule.len());

        for service in schedule.services() {
            let positions = schedule.positions_for(&service);
            let Some(adapter) = self.adapters.get(&service).cloned() else {
                warn!(service = %service, "no adapter registered");
                release(&signals, &positions);
                results.extend(positions.into_iter().map(|p| {
                    failed(&schedule.ops[p], p, "no adapter registered for service".into())
                }));
                continue;
            };

            let worker = ServiceWorker {
                service: service.clone(),
                adapter,
                schedule: Arc::clone(&schedule),
                signals: Arc::clone(&signals),
                live: Arc::clone(&live),
                policy: self.policy.clone(),
                cancel: self.cancel.clone(),
            };
            let span = info_span!("apply", service = %service);
            let handle = tokio::spawn(worker.run(positions.clone()).instrument(span));
            workers.push((service, positions, handle));
        }

        let (meta, handles): (Vec<_>, Vec<_>) = workers
            .into_iter()
            .map(|(service, positions, handle)| ((service, positions), handle))
            .unzip();

        for ((service, positions), joined) in meta.into_iter().zip(join_all(handles).await) {
            match joined {
                Ok(worker_results) => results.extend(worker_results),
                Err(err) => {
                    warn!(service = %service, error = %err, "service worker aborted");
                    results.extend(positions.into_iter().map(|p| {
                        failed(&schedule.ops[p], p, format!("service worker aborted: {err}"))
                    }));
                }
            }
        }

        results.sort_by_key(|r| r.position);
        results
    }
}

fn failed(scheduled: &ScheduledOp, position: usize, error: String) -> OpResult {
    OpResult {
        position,
        id: scheduled.op.id.clone(),
        operation: scheduled.op.operation,
        changed: scheduled.op.changed_fields(),
        outcome: Outcome::Failed { error },
        attempts: 0,
    }
}

/// Marks any still-pending positions as failed when a worker ends early, so
/// that dependants in other services are released instead of waiting forever.
struct SignalGuard {
    signals: Signals,
    positions: Vec<usize>,
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        release(&self.signals, &self.positions);
    }
}

fn release(signals: &Signals, positions: &[usize]) {
    for &position in positions {
        signals[position].send_if_modified(|state| {
            if state.is_some() {
                return false;
            }
            *state = Some(Completion {
                ok: false,
                cause: None,
            });
            true
        });
    }
}

struct ServiceWorker {
    service: String,
    adapter: Arc<dyn ServiceAdapter>,
    schedule: Arc<Schedule>,
    signals: Signals,
    live: Arc<ResourceGraph>,
    policy: ApplyPolicy,
    cancel: CancellationToken,
}

impl ServiceWorker {
    async fn run(self, positions: Vec<usize>) -> Vec<OpResult> {
        let _guard = SignalGuard {
            signals: Arc::clone(&self.signals),
            positions: positions.clone(),
        };
        let mut index = IdIndex::seed(&self.service, &self.live);
        let mut results = Vec::with_capacity(positions.len());

        for position in positions {
            let scheduled = &self.schedule.ops[position];
            let (outcome, attempts) = self.process(scheduled, &mut index).await;

            let cause = match &outcome {
                Outcome::Failed { .. } | Outcome::Cancelled => Some(scheduled.op.id.clone()),
                Outcome::Blocked { by } => Some(by.clone()),
                _ => None,
            };
            self.signals[position].send_replace(Some(Completion {
                ok: outcome.is_success(),
                cause,
            }));

            match &outcome {
                Outcome::Failed { error } => warn!(
                    resource = %scheduled.op.id,
                    operation = %scheduled.op.operation,
                    attempts,
                    error = %error,
                    "operation failed"
                ),
                Outcome::Blocked { by } => warn!(
                    resource = %scheduled.op.id,
                    operation = %scheduled.op.operation,
                    blocked_by = %by,
                    "operation blocked"
                ),
                Outcome::Unchanged => debug!(resource = %scheduled.op.id, "unchanged"),
                other => info!(
                    resource = %scheduled.op.id,
                    operation = %scheduled.op.operation,
                    outcome = other.label(),
                    "operation finished"
                ),
            }

            results.push(OpResult {
                position,
                id: scheduled.op.id.clone(),
                operation: scheduled.op.operation,
                changed: scheduled.op.changed_fields(),
                outcome,
                attempts,
            });
        }

        results
    }

    async fn process(&self, scheduled: &ScheduledOp, index: &mut IdIndex) -> (Outcome, usize) {
        if self.cancel.is_cancelled() {
            return (Outcome::Cancelled, 0);
        }
        if let Some(missing) = &scheduled.unavailable {
            return (Outcome::Blocked { by: missing.clone() }, 0);
        }

        for &(dep, edge) in &scheduled.deps {
            let mut rx = self.signals[dep].subscribe();
            let completion = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return (Outcome::Cancelled, 0),
                done = async { rx.wait_for(Option::is_some).await.ok().and_then(|v| (*v).clone()) } => done,
            };
            let Some(completion) = completion else {
                continue;
            };
            if edge == EdgeKind::Reference && !completion.ok {
                let by = completion
                    .cause
                    .unwrap_or_else(|| self.schedule.ops[dep].op.id.clone());
                return (Outcome::Blocked { by }, 0);
            }
        }

        if self.cancel.is_cancelled() {
            return (Outcome::Cancelled, 0);
        }

        let op = &scheduled.op;
        if op.operation == Operation::Noop {
            return (Outcome::Unchanged, 0);
        }
        if self.policy.dry_run {
            return (Outcome::Planned, 0);
        }

        match op.operation {
            Operation::Create => {
                let Some(desired) = &op.desired else {
                    return (missing_side(op.operation), 0);
                };
                let bound = match index.bind(desired) {
                    Ok(bound) => bound,
                    Err(err) => return (Outcome::Failed { error: err.to_string() }, 0),
                };
                let (result, attempts) = self.with_retry(|| self.adapter.create(&bound)).await;
                match result {
                    Ok(applied) => {
                        if let Some(remote_id) = applied.remote_id {
                            index.record(&op.id, remote_id);
                        }
                        (Outcome::Applied, attempts)
                    }
                    Err(err) => (Outcome::Failed { error: err.to_string() }, attempts),
                }
            }
            Operation::Update => {
                let (Some(desired), Some(live)) = (&op.desired, &op.live) else {
                    return (missing_side(op.operation), 0);
                };
                let mut bound = match index.bind(desired) {
                    Ok(bound) => bound,
                    Err(err) => return (Outcome::Failed { error: err.to_string() }, 0),
                };
                bound.remote = live.remote.clone();
                let changed = op.changed_fields();
                let (result, attempts) = self
                    .with_retry(|| self.adapter.update(&bound, &changed))
                    .await;
                match result {
                    Ok(_) => (Outcome::Applied, attempts),
                    Err(err) => (Outcome::Failed { error: err.to_string() }, attempts),
                }
            }
            Operation::Delete => {
                let Some(live) = &op.live else {
                    return (missing_side(op.operation), 0);
                };
                let (result, attempts) = self.with_retry(|| self.adapter.delete(live)).await;
                match result {
                    Ok(()) => {
                        index.forget(&op.id);
                        (Outcome::Applied, attempts)
                    }
                    Err(err) => (Outcome::Failed { error: err.to_string() }, attempts),
                }
            }
            Operation::Noop => (Outcome::Unchanged, 0),
        }
    }

    /// Call `attempt` until it succeeds, fails permanently, or the policy's
    /// attempts are used up. Cancellation ends the backoff early.
    async fn with_retry<T, F, Fut>(&self, mut attempt: F) -> (AdapterResult<T>, usize)
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut made = 0;
        loop {
            made += 1;
            match attempt().await {
                Err(err) if err.is_retryable() && made < max_attempts => {
                    let delay = self.policy.backoff(made);
                    warn!(attempt = made, error = %err, ?delay, "retrying");
                    tokio::select! {
                        _ = self.cancel.cancelled() => return (Err(err), made),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                other => return (other, made),
            }
        }
    }
}

fn missing_side(operation: Operation) -> Outcome {
    Outcome::Failed {
        error: AdapterError::Setup(format!("{operation} without the resource it applies to"))
            .to_string(),
    }
}
