use tokio::sync::watch;

/// Engine-wide status, derived from the aggregate of worker run-states.
///
/// Monotonic except for the Running/Paused oscillation. `Stopping` covers the
/// window between a stop request and the last worker terminating; `Disposed`
/// is permanently terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
    Idle,
    Running,
    Paused,
    Stopping,
    Disposed,
}

/// Outcome of a control operation. Expected precondition violations are
/// values the caller branches on; only unexpected internal errors surface as
/// `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The operation took effect and the pool settled in the target state.
    Completed,
    /// The pool is already in the requested state; nothing to do.
    AlreadyInState,
    /// The operation is not valid from the pool's current state.
    InvalidState(PoolState),
    /// Another control operation is in flight; this one failed fast.
    Busy,
    /// Workers did not settle within the caller's timeout. A worker stuck in
    /// a non-cooperating execute can cause this; the wait is bounded for
    /// exactly that reason.
    TimedOut,
}

/// Single writer cell for the pool state, broadcasting transitions over a
/// watch channel so callers can await `Disposed`.
pub struct PoolStateCell {
    tx: watch::Sender<PoolState>,
}

impl PoolStateCell {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(PoolState::Idle);
        Self { tx }
    }

    pub fn current(&self) -> PoolState {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PoolState> {
        self.tx.subscribe()
    }

    /// Applies a transition if the state machine allows it. Returns whether
    /// the state changed.
    pub(crate) fn transition(&self, to: PoolState) -> bool {
        self.tx.send_if_modified(|state| {
            if *state == to || !Self::allowed(*state, to) {
                return false;
            }
            tracing::debug!(from = ?*state, ?to, "pool state transition");
            *state = to;
            true
        })
    }

    fn allowed(from: PoolState, to: PoolState) -> bool {
        match (from, to) {
            (PoolState::Disposed, _) => false,
            (_, PoolState::Disposed) => true,
            (PoolState::Idle, PoolState::Running) => true,
            (PoolState::Running, PoolState::Paused) => true,
            (PoolState::Paused, PoolState::Running) => true,
            (PoolState::Running, PoolState::Stopping) => true,
            _ => false,
        }
    }
}

impl Default for PoolStateCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Pool-wide gate every worker passes at the top of each loop iteration.
/// Closed briefly while the controller flips requested statuses so no worker
/// starts a new iteration mid-change.
pub(crate) struct Gate {
    tx: watch::Sender<bool>,
}

impl Gate {
    pub(crate) fn new() -> Self {
        let (tx, _rx) = watch::channel(true);
        Self { tx }
    }

    pub(crate) fn close(&self) {
        let _ = self.tx.send(false);
    }

    pub(crate) fn open(&self) {
        let _ = self.tx.send(true);
    }

    pub(crate) fn subscribe(&self) -> GateHandle {
        GateHandle {
            rx: self.tx.subscribe(),
        }
    }
}

pub(crate) struct GateHandle {
    rx: watch::Receiver<bool>,
}

impl Clone for GateHandle {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
        }
    }
}

impl GateHandle {
    pub(crate) async fn wait_open(&mut self) {
        // A dropped sender counts as open; the worker re-checks its requested
        // status right after.
        let _ = self.rx.wait_for(|open| *open).await;
    }
}
