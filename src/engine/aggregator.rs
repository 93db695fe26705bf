use anyhow::Error;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex};

/// Terminal result reported by exactly one worker: success, or the captured
/// error that ended it.
#[derive(Debug, Clone)]
pub struct WorkerOutcome {
    worker: usize,
    error: Option<Arc<Error>>,
}

impl WorkerOutcome {
    pub fn success(worker: usize) -> Self {
        Self {
            worker,
            error: None,
        }
    }

    pub fn failure(worker: usize, error: impl Into<Arc<Error>>) -> Self {
        Self {
            worker,
            error: Some(error.into()),
        }
    }

    pub fn worker(&self) -> usize {
        self.worker
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&Error> {
        self.error.as_deref()
    }
}

/// Collects one terminal outcome per worker and detects pool-wide completion
/// race-free: the recording call that completes the set observes it atomically
/// and is the only one handed the full result slice.
pub struct ResultAggregator {
    expected: usize,
    pending: Mutex<Vec<WorkerOutcome>>,
    completed: OnceCell<Vec<WorkerOutcome>>,
}

impl ResultAggregator {
    pub fn new(expected: usize) -> Self {
        Self {
            expected,
            pending: Mutex::new(Vec::with_capacity(expected)),
            completed: OnceCell::new(),
        }
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Records one worker's terminal outcome. Returns the full result set for
    /// exactly the call that completes it, `None` otherwise.
    pub fn record(&self, outcome: WorkerOutcome) -> Option<&[WorkerOutcome]> {
        let mut pending = self.pending.lock().unwrap();
        pending.push(outcome);
        if pending.len() < self.expected {
            return None;
        }
        let set = std::mem::take(&mut *pending);
        let _ = self.completed.set(set);
        drop(pending);
        self.completed.get().map(Vec::as_slice)
    }

    /// The full result set, available once every worker has terminated.
    pub fn results(&self) -> Option<&[WorkerOutcome]> {
        self.completed.get().map(Vec::as_slice)
    }
}
