use crate::engine::aggregator::WorkerOutcome;
use crate::engine::control::PoolState;
use crate::runtime::contract::ExecutionUnit;
use crate::work::disposition::Disposition;
use crate::work::state::{RunState, WorkerStatus};
use anyhow::{anyhow, Error};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::yield_now;

use super::shared::WorkerShared;

/// One worker: an execution unit bound for life, a run-state record, and the
/// shared pool handles.
pub struct Worker<T> {
    pub id: usize,
    unit: Box<dyn ExecutionUnit<T>>,
    state: Arc<RunState>,
    requested_rx: watch::Receiver<WorkerStatus>,
    shared: WorkerShared<T>,
}

impl<T: Send + Sync + 'static> Worker<T> {
    pub(crate) fn new(
        id: usize,
        unit: Box<dyn ExecutionUnit<T>>,
        state: Arc<RunState>,
        requested_rx: watch::Receiver<WorkerStatus>,
        shared: WorkerShared<T>,
    ) -> Self {
        Self {
            id,
            unit,
            state,
            requested_rx,
            shared,
        }
    }

    /// Runs the worker loop to completion and returns its terminal outcome.
    ///
    /// An explicit bounded loop with the currently held item as accumulator;
    /// long backlogs must not grow the stack. The held item survives a pause
    /// boundary untouched and is requeued on every terminating path that
    /// still holds one.
    #[tracing::instrument(name = "worker", skip_all, fields(worker = self.id))]
    pub(crate) async fn run(mut self) -> WorkerOutcome {
        tracing::debug!("worker started");
        let mut held: Option<T> = None;

        loop {
            self.shared.gate.wait_open().await;

            let requested = *self.requested_rx.borrow();
            match requested {
                WorkerStatus::Stopped => {
                    if let Some(item) = held.take() {
                        self.shared.backlog.push(item);
                    }
                    self.state.set_current(WorkerStatus::Stopped);
                    tracing::debug!("stop requested; abandoning remaining backlog");
                    return WorkerOutcome::failure(
                        self.id,
                        anyhow!("worker {} stopped before the backlog was drained", self.id),
                    );
                }
                WorkerStatus::Paused => {
                    if self.state.set_current(WorkerStatus::Paused)
                        && self.shared.states.all_settled(WorkerStatus::Paused)
                    {
                        self.shared.pool_state.transition(PoolState::Paused);
                    }
                    self.wait_while_paused().await;
                    // Re-enter with the same held item; nothing is lost or
                    // skipped across a pause boundary.
                    continue;
                }
                _ => {
                    if self.state.set_current(WorkerStatus::Running)
                        && self.shared.states.all_settled(WorkerStatus::Running)
                    {
                        self.shared.pool_state.transition(PoolState::Running);
                    }
                }
            }

            if held.is_none() {
                match self.shared.backlog.try_pop() {
                    Some(item) => held = Some(item),
                    None => {
                        self.state.set_current(WorkerStatus::Finished);
                        tracing::debug!("backlog drained; worker finished");
                        return WorkerOutcome::success(self.id);
                    }
                }
            }

            let (disposition, caught) = {
                let item = held.as_ref().expect("an item is held after dequeue");
                self.execute_once(item).await
            };

            match disposition {
                Disposition::Next(_) => {
                    let item = held.take().expect("an item is held after execute");
                    self.shared.telemetry.record_item_completed();
                    self.shared.hooks.notify_item(&item, None);
                }
                Disposition::RetrySame(note) => {
                    let item = held.as_ref().expect("an item is held after execute");
                    self.shared.telemetry.record_item_retried();
                    let error = retry_error(caught, note, "unit requested a retry of the same item");
                    self.shared.hooks.notify_item(item, Some(&error));
                }
                Disposition::RetryOther(note) => {
                    let item = held.take().expect("an item is held after execute");
                    self.shared.telemetry.record_item_requeued();
                    let error = retry_error(caught, note, "unit deferred the item for another attempt");
                    self.shared.hooks.notify_item(&item, Some(&error));
                    self.shared.backlog.push(item);
                }
                Disposition::Abort(note) => {
                    let item = held.take().expect("an item is held after execute");
                    self.shared.telemetry.record_worker_failure();
                    let error = retry_error(caught, note, "execution unit aborted");
                    self.shared.hooks.notify_item(&item, Some(&error));
                    // Another worker may still attempt the item.
                    self.shared.backlog.push(item);
                    tracing::warn!(error = %error, "execution unit aborted; worker exiting");
                    self.state.fail(error.clone());
                    return WorkerOutcome::failure(self.id, error);
                }
            }
        }
    }

    /// Runs the execution unit once against the held item, racing it against
    /// the active cancellation token. A cancellation-triggered abort is
    /// reinterpreted as a retry of the same item; a raised error is mapped to
    /// a disposition by the exception policy, defaulting to abort.
    async fn execute_once(&mut self, item: &T) -> (Disposition, Option<Arc<Error>>) {
        let cancel = self.shared.active_token();

        let result = {
            let fut = self.unit.execute(item, &cancel);
            tokio::pin!(fut);
            tokio::select! {
                result = &mut fut => Some(result),
                _ = cancel.cancelled() => None,
            }
        };

        match result {
            None => {
                tracing::debug!("execute aborted by cancellation; retrying the same item");
                yield_now().await;
                (
                    Disposition::RetrySame(Some("execution cancelled mid-item".into())),
                    None,
                )
            }
            Some(Ok(disposition)) => (disposition, None),
            Some(Err(error)) => {
                let disposition = self
                    .shared
                    .hooks
                    .decide(&error, item)
                    .unwrap_or(Disposition::Abort(None));
                tracing::debug!(error = %error, ?disposition, "exception policy applied");
                (disposition, Some(Arc::new(error)))
            }
        }
    }

    async fn wait_while_paused(&mut self) {
        while *self.requested_rx.borrow() == WorkerStatus::Paused {
            if self.requested_rx.changed().await.is_err() {
                return;
            }
        }
    }
}

fn retry_error(caught: Option<Arc<Error>>, note: Option<String>, fallback: &str) -> Arc<Error> {
    match caught {
        Some(error) => error,
        None => Arc::new(anyhow!("{}", note.unwrap_or_else(|| fallback.to_string()))),
    }
}
