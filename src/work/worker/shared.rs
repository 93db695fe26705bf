use crate::engine::control::{GateHandle, PoolStateCell};
use crate::runtime::hooks::PoolHooks;
use crate::runtime::telemetry::Telemetry;
use crate::work::backlog::Backlog;
use crate::work::state::RunStateTable;
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// State shared by every worker of one pool instance.
///
/// The active cancellation token rotates on pause/resume, so workers read it
/// through a watch channel at each iteration instead of holding a clone.
pub struct WorkerShared<T> {
    pub(crate) backlog: Arc<Backlog<T>>,
    pub(crate) states: Arc<RunStateTable>,
    pub(crate) pool_state: Arc<PoolStateCell>,
    pub(crate) hooks: PoolHooks<T>,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) cancel_rx: watch::Receiver<CancellationToken>,
    pub(crate) gate: GateHandle,
}

pub struct WorkerSharedParams<T> {
    pub(crate) backlog: Arc<Backlog<T>>,
    pub(crate) states: Arc<RunStateTable>,
    pub(crate) pool_state: Arc<PoolStateCell>,
    pub(crate) hooks: PoolHooks<T>,
    pub(crate) telemetry: Arc<Telemetry>,
    pub(crate) cancel_rx: watch::Receiver<CancellationToken>,
    pub(crate) gate: GateHandle,
}

impl<T> WorkerShared<T> {
    pub(crate) fn new(params: WorkerSharedParams<T>) -> Self {
        Self {
            backlog: params.backlog,
            states: params.states,
            pool_state: params.pool_state,
            hooks: params.hooks,
            telemetry: params.telemetry,
            cancel_rx: params.cancel_rx,
            gate: params.gate,
        }
    }

    /// Clone of the currently active cancellation token.
    pub(crate) fn active_token(&self) -> CancellationToken {
        self.cancel_rx.borrow().clone()
    }
}

impl<T> Clone for WorkerShared<T> {
    fn clone(&self) -> Self {
        Self {
            backlog: Arc::clone(&self.backlog),
            states: Arc::clone(&self.states),
            pool_state: Arc::clone(&self.pool_state),
            hooks: self.hooks.clone(),
            telemetry: Arc::clone(&self.telemetry),
            cancel_rx: self.cancel_rx.clone(),
            gate: self.gate.clone(),
        }
    }
}
