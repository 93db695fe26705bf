use anyhow::Error;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Status of a single worker, observed (`current`) or desired (`requested`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    Running,
    Paused,
    /// Terminal: the worker exited because the controller requested a stop.
    Stopped,
    /// Terminal: the worker exited carrying an error.
    Failed,
    /// Terminal: the worker exited normally after draining the backlog.
    Finished,
}

impl WorkerStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkerStatus::Stopped | WorkerStatus::Failed | WorkerStatus::Finished
        )
    }

    fn as_u8(self) -> u8 {
        match self {
            WorkerStatus::Running => 0,
            WorkerStatus::Paused => 1,
            WorkerStatus::Stopped => 2,
            WorkerStatus::Failed => 3,
            WorkerStatus::Finished => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => WorkerStatus::Running,
            1 => WorkerStatus::Paused,
            2 => WorkerStatus::Stopped,
            3 => WorkerStatus::Failed,
            _ => WorkerStatus::Finished,
        }
    }
}

/// Per-worker status record.
///
/// `current` is written only by the owning worker; `requested` only by the
/// controller. Requested-status changes travel over a watch channel so paused
/// workers wake without polling. Once `current` reaches a terminal status it
/// is never overwritten by either side.
pub struct RunState {
    current: AtomicU8,
    failure: Mutex<Option<Arc<Error>>>,
    requested_tx: watch::Sender<WorkerStatus>,
}

impl RunState {
    /// Creates a record starting in `Running` and the receiver the owning
    /// worker uses to observe requested-status changes.
    pub fn new() -> (Arc<Self>, watch::Receiver<WorkerStatus>) {
        let (requested_tx, requested_rx) = watch::channel(WorkerStatus::Running);
        let state = Arc::new(Self {
            current: AtomicU8::new(WorkerStatus::Running.as_u8()),
            failure: Mutex::new(None),
            requested_tx,
        });
        (state, requested_rx)
    }

    pub fn current(&self) -> WorkerStatus {
        WorkerStatus::from_u8(self.current.load(Ordering::SeqCst))
    }

    /// Records the observed status. Returns `false` without writing when the
    /// worker already reached a terminal status.
    pub fn set_current(&self, status: WorkerStatus) -> bool {
        let mut observed = self.current.load(Ordering::SeqCst);
        loop {
            if WorkerStatus::from_u8(observed).is_terminal() {
                return false;
            }
            match self.current.compare_exchange(
                observed,
                status.as_u8(),
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return true,
                Err(actual) => observed = actual,
            }
        }
    }

    /// Marks the worker failed, capturing the error alongside the status.
    pub fn fail(&self, error: Arc<Error>) -> bool {
        let mut slot = self.failure.lock().unwrap();
        if !self.set_current(WorkerStatus::Failed) {
            return false;
        }
        *slot = Some(error);
        true
    }

    pub fn failure(&self) -> Option<Arc<Error>> {
        self.failure.lock().unwrap().clone()
    }

    pub fn requested(&self) -> WorkerStatus {
        *self.requested_tx.borrow()
    }

    /// Controller-side write of the desired status.
    pub fn request(&self, status: WorkerStatus) {
        let _ = self.requested_tx.send(status);
    }
}

/// The full set of per-worker status records for one pool instance.
pub struct RunStateTable {
    states: Vec<Arc<RunState>>,
}

impl RunStateTable {
    /// Builds one record per worker plus the requested-status receivers handed
    /// to the workers at spawn time, in worker-id order.
    pub fn new(worker_count: usize) -> (Self, Vec<watch::Receiver<WorkerStatus>>) {
        let mut states = Vec::with_capacity(worker_count);
        let mut receivers = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let (state, rx) = RunState::new();
            states.push(state);
            receivers.push(rx);
        }
        (Self { states }, receivers)
    }

    pub fn get(&self, worker_id: usize) -> &Arc<RunState> {
        &self.states[worker_id]
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether every worker still running has settled on `status`. Terminal
    /// workers no longer participate; at least one live worker must remain for
    /// the pool to take on a live aggregate state.
    pub fn all_settled(&self, status: WorkerStatus) -> bool {
        let mut live = 0usize;
        for state in &self.states {
            let current = state.current();
            if current.is_terminal() {
                continue;
            }
            if current != status {
                return false;
            }
            live += 1;
        }
        live > 0
    }

    pub fn all_terminal(&self) -> bool {
        self.states.iter().all(|state| state.current().is_terminal())
    }

    /// Sets the desired status of every worker that has not yet terminated.
    pub fn request_all(&self, status: WorkerStatus) {
        for state in &self.states {
            if !state.current().is_terminal() {
                state.request(status);
            }
        }
    }
}
