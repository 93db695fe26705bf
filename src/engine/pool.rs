//! Worker-pool orchestration.
//!
//! `WorkPool` owns the backlog, the run-state table, the processing gate, the
//! rotating cancellation token and the result aggregator, and exposes the
//! run/pause/resume/stop surface. Control operations are serialized through a
//! single mutex; an operation already in flight makes a new request fail fast
//! instead of blocking.

use crate::engine::aggregator::{ResultAggregator, WorkerOutcome};
use crate::engine::control::{ControlOutcome, Gate, PoolState, PoolStateCell};
use crate::runtime::config::PoolConfig;
use crate::runtime::factory::UnitFactory;
use crate::runtime::hooks::PoolHooks;
use crate::runtime::telemetry::{self, Telemetry};
use crate::work::backlog::Backlog;
use crate::work::state::{RunStateTable, WorkerStatus};
use crate::work::worker::{Worker, WorkerShared, WorkerSharedParams};
use anyhow::{anyhow, Context, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Duration};
use tokio_util::sync::CancellationToken;

/// Async source invoked exactly once, at `run()`, to produce the initial
/// backlog as a finite ordered collection of items.
pub type BacklogSource<T> = Box<dyn FnOnce() -> BoxFuture<'static, Result<Vec<T>>> + Send>;

/// Wraps an async closure into a [`BacklogSource`].
pub fn backlog_source<T, F, Fut>(source: F) -> BacklogSource<T>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
{
    Box::new(move || source().boxed())
}

/// The whole engine instance: one backlog, N workers, one lifecycle.
pub struct WorkPool<T: Send + Sync + 'static> {
    config: PoolConfig,
    backlog: Arc<Backlog<T>>,
    factory: Arc<dyn UnitFactory<T>>,
    hooks: PoolHooks<T>,
    telemetry: Arc<Telemetry>,
    state: Arc<PoolStateCell>,
    states: Arc<RunStateTable>,
    aggregator: Arc<ResultAggregator>,
    gate: Gate,
    cancel_tx: watch::Sender<CancellationToken>,
    root: CancellationToken,
    // Pool-owned child of `root`. Disposal cancels this token, never the
    // caller-supplied root.
    lifecycle: CancellationToken,
    control: tokio::sync::Mutex<()>,
    source: Mutex<Option<BacklogSource<T>>>,
    requested_rxs: Mutex<Option<Vec<watch::Receiver<WorkerStatus>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> WorkPool<T> {
    /// Creates a pool with its own root cancellation token. Use
    /// [`Self::with_cancellation_token`] to integrate with an existing
    /// shutdown mechanism.
    pub fn new(
        config: PoolConfig,
        source: BacklogSource<T>,
        factory: impl UnitFactory<T>,
        hooks: PoolHooks<T>,
    ) -> Self {
        Self::with_cancellation_token(config, source, factory, hooks, CancellationToken::new())
    }

    pub fn with_cancellation_token(
        config: PoolConfig,
        source: BacklogSource<T>,
        factory: impl UnitFactory<T>,
        hooks: PoolHooks<T>,
        root: CancellationToken,
    ) -> Self {
        let worker_count = config.worker_count();
        let (states, requested_rxs) = RunStateTable::new(worker_count);
        let lifecycle = root.child_token();
        let (cancel_tx, _cancel_rx) = watch::channel(lifecycle.child_token());
        Self {
            config,
            backlog: Arc::new(Backlog::new()),
            factory: Arc::new(factory),
            hooks,
            telemetry: Arc::new(Telemetry::default()),
            state: Arc::new(PoolStateCell::new()),
            states: Arc::new(states),
            aggregator: Arc::new(ResultAggregator::new(worker_count)),
            gate: Gate::new(),
            cancel_tx,
            root,
            lifecycle,
            control: tokio::sync::Mutex::new(()),
            source: Mutex::new(Some(source)),
            requested_rxs: Mutex::new(Some(requested_rxs)),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn state(&self) -> PoolState {
        self.state.current()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<PoolState> {
        self.state.subscribe()
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// The full result set, available once the pool is disposed.
    pub fn results(&self) -> Option<&[WorkerOutcome]> {
        self.aggregator.results()
    }

    /// Clone of the root token so external callers can integrate with their
    /// own signal handlers. Cancelling it shuts the pool down; disposal only
    /// cancels pool-owned children, so a caller-supplied root is never
    /// cancelled by the pool itself.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.root.clone()
    }

    /// Resolves once the pool reaches its terminal state.
    pub async fn wait_disposed(&self) {
        let mut rx = self.state.subscribe();
        let _ = rx.wait_for(|state| *state == PoolState::Disposed).await;
    }

    /// Seeds the backlog from the source and spawns one worker per configured
    /// unit. Valid only from `Idle`; a pool never runs twice.
    pub async fn run(&self) -> Result<ControlOutcome> {
        let Ok(_guard) = self.control.try_lock() else {
            return Ok(ControlOutcome::Busy);
        };
        match self.state.current() {
            PoolState::Idle => {}
            other => return Ok(ControlOutcome::InvalidState(other)),
        }

        let source = self
            .source
            .lock()
            .unwrap()
            .take()
            .context("backlog source already consumed")?;
        let items = match source().await.context("backlog source failed") {
            Ok(items) => items,
            Err(err) => {
                // No worker ever existed; the pool is terminal without results.
                self.state.transition(PoolState::Disposed);
                return Err(err);
            }
        };

        tracing::info!(
            items = items.len(),
            workers = self.config.worker_count(),
            "starting worker pool"
        );
        self.backlog.extend(items);
        self.telemetry
            .record_live_workers(self.config.worker_count());

        let run_token = self.lifecycle.child_token();
        let _ = self.cancel_tx.send(run_token);

        telemetry::spawn_metrics_reporter(
            self.telemetry.clone(),
            self.backlog.clone(),
            self.lifecycle.clone(),
            self.config.metrics_interval(),
        );

        let requested_rxs = self
            .requested_rxs
            .lock()
            .unwrap()
            .take()
            .context("worker receivers already consumed")?;

        let shared = WorkerShared::new(WorkerSharedParams {
            backlog: self.backlog.clone(),
            states: self.states.clone(),
            pool_state: self.state.clone(),
            hooks: self.hooks.clone(),
            telemetry: self.telemetry.clone(),
            cancel_rx: self.cancel_tx.subscribe(),
            gate: self.gate.subscribe(),
        });

        let mut handles = Vec::with_capacity(self.config.worker_count());
        for (worker_id, requested_rx) in requested_rxs.into_iter().enumerate() {
            handles.push(self.spawn_worker(worker_id, requested_rx, shared.clone()));
        }
        *self.workers.lock().unwrap() = handles;

        self.state.transition(PoolState::Running);
        Ok(ControlOutcome::Completed)
    }

    fn spawn_worker(
        &self,
        worker_id: usize,
        requested_rx: watch::Receiver<WorkerStatus>,
        shared: WorkerShared<T>,
    ) -> JoinHandle<()> {
        let factory = self.factory.clone();
        let state = self.states.get(worker_id).clone();
        let aggregator = self.aggregator.clone();
        let pool_state = self.state.clone();
        let hooks = self.hooks.clone();
        let telemetry = self.telemetry.clone();
        let active_rx = self.cancel_tx.subscribe();
        let lifecycle = self.lifecycle.clone();

        tokio::spawn(async move {
            let outcome = match factory.build(worker_id) {
                Ok(unit) => {
                    let worker = Worker::new(worker_id, unit, state.clone(), requested_rx, shared);
                    let run = std::panic::AssertUnwindSafe(worker.run()).catch_unwind().await;
                    match run {
                        Ok(outcome) => outcome,
                        Err(panic_payload) => {
                            let panic_msg = panic_message(panic_payload.as_ref());
                            tracing::error!(
                                worker = worker_id,
                                panic = %panic_msg,
                                "worker task panicked"
                            );
                            let error =
                                Arc::new(anyhow!("worker {worker_id} panicked: {panic_msg}"));
                            state.fail(error.clone());
                            telemetry.record_worker_failure();
                            WorkerOutcome::failure(worker_id, error)
                        }
                    }
                }
                Err(error) => {
                    tracing::error!(
                        worker = worker_id,
                        error = %error,
                        "unit construction failed; recording terminal result"
                    );
                    let error = Arc::new(error.context(format!(
                        "failed to construct execution unit for worker {worker_id}"
                    )));
                    state.fail(error.clone());
                    telemetry.record_worker_failure();
                    WorkerOutcome::failure(worker_id, error)
                }
            };

            if let Some(results) = aggregator.record(outcome) {
                pool_state.transition(PoolState::Disposed);
                // Release the active cancellation signal and stop the
                // background reporter.
                active_rx.borrow().cancel();
                lifecycle.cancel();
                telemetry.record_live_workers(0);
                hooks.notify_all_done(results);
                tracing::info!(workers = results.len(), "worker pool disposed");
            }
        })
    }

    /// Requests a live pause or resume. Valid only from Running or Paused.
    ///
    /// Pausing cancels the active token so in-flight executes abort (and are
    /// retried on resume), closes the gate while requested statuses flip, and
    /// waits, bounded by `wait`, until every live worker reports Paused.
    /// Resuming rotates a fresh token and waits for every live worker to
    /// report Running.
    pub async fn set_paused(&self, pause: bool, wait: Duration) -> Result<ControlOutcome> {
        let Ok(_guard) = self.control.try_lock() else {
            return Ok(ControlOutcome::Busy);
        };
        let target = if pause {
            PoolState::Paused
        } else {
            PoolState::Running
        };
        match self.state.current() {
            state @ (PoolState::Running | PoolState::Paused) => {
                if state == target {
                    return Ok(ControlOutcome::AlreadyInState);
                }
            }
            other => return Ok(ControlOutcome::InvalidState(other)),
        }

        let settled = if pause {
            tracing::info!("pausing worker pool");
            self.cancel_tx.borrow().cancel();
            self.gate.close();
            self.states.request_all(WorkerStatus::Paused);
            self.gate.open();
            self.await_settled(WorkerStatus::Paused, wait).await?
        } else {
            tracing::info!("resuming worker pool");
            let _ = self.cancel_tx.send(self.lifecycle.child_token());
            self.states.request_all(WorkerStatus::Running);
            self.await_settled(WorkerStatus::Running, wait).await?
        };

        // Workers promote the pool state as they settle, but a worker that
        // terminated during the settlement window never does. The controller
        // applies the target once settlement is confirmed; a no-op when the
        // last settler already did.
        if settled == ControlOutcome::Completed {
            self.state.transition(target);
        }
        Ok(settled)
    }

    /// Convenience for [`Self::set_paused`] with the configured default bound.
    pub async fn pause(&self) -> Result<ControlOutcome> {
        self.set_paused(true, self.config.control_timeout()).await
    }

    pub async fn resume(&self) -> Result<ControlOutcome> {
        self.set_paused(false, self.config.control_timeout()).await
    }

    /// Requests a graceful stop. Valid only from Running; a disposed pool
    /// reports `AlreadyInState` idempotently. Remaining backlog items are
    /// abandoned; each live worker terminates at its next checkpoint.
    pub async fn stop(&self, wait: Duration) -> Result<ControlOutcome> {
        let Ok(_guard) = self.control.try_lock() else {
            return Ok(ControlOutcome::Busy);
        };
        match self.state.current() {
            PoolState::Disposed => return Ok(ControlOutcome::AlreadyInState),
            PoolState::Running => {}
            other => return Ok(ControlOutcome::InvalidState(other)),
        }

        tracing::info!("stopping worker pool");
        self.state.transition(PoolState::Stopping);
        self.cancel_tx.borrow().cancel();
        self.states.request_all(WorkerStatus::Stopped);

        if timeout(wait, self.wait_disposed()).await.is_err() {
            tracing::warn!("timed out waiting for workers to terminate");
            return Ok(ControlOutcome::TimedOut);
        }

        let handles = std::mem::take(&mut *self.workers.lock().unwrap());
        let results = join_all(handles).await;
        for (worker_id, result) in results.into_iter().enumerate() {
            if let Err(err) = result {
                tracing::warn!(worker = worker_id, error = %err, "worker task terminated unexpectedly");
            }
        }

        Ok(ControlOutcome::Completed)
    }

    async fn await_settled(&self, status: WorkerStatus, wait: Duration) -> Result<ControlOutcome> {
        let poll = self.config.control_poll_interval();
        let settled = async {
            loop {
                if self.states.all_terminal() || self.states.all_settled(status) {
                    break;
                }
                sleep(poll).await;
            }
        };
        if timeout(wait, settled).await.is_err() {
            tracing::warn!(?status, "timed out waiting for workers to settle");
            return Ok(ControlOutcome::TimedOut);
        }
        Ok(ControlOutcome::Completed)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
