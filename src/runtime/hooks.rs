use crate::engine::aggregator::WorkerOutcome;
use crate::work::disposition::Disposition;
use anyhow::Error;
use std::sync::Arc;

pub type ItemHook<T> = Arc<dyn Fn(&T, Option<&Error>) + Send + Sync>;
pub type PoolHook = Arc<dyn Fn(&[WorkerOutcome]) + Send + Sync>;
pub type ExceptionPolicy<T> = Arc<dyn Fn(&Error, &T) -> Disposition + Send + Sync>;

/// Callbacks the pool fires towards its external collaborators.
///
/// Item notifications are ordered only within a single worker's own sequence
/// of items; no ordering is guaranteed across workers. `when_all_done` fires
/// exactly once, when the pool reaches its terminal state.
pub struct PoolHooks<T> {
    when_item_finished: Option<ItemHook<T>>,
    when_all_done: Option<PoolHook>,
    exception_policy: Option<ExceptionPolicy<T>>,
}

impl<T> PoolHooks<T> {
    pub fn new() -> Self {
        Self {
            when_item_finished: None,
            when_all_done: None,
            exception_policy: None,
        }
    }

    /// Invoked once per terminal item outcome: success, or the failure that
    /// triggered a retry or an abort.
    pub fn on_item_finished(
        mut self,
        hook: impl Fn(&T, Option<&Error>) + Send + Sync + 'static,
    ) -> Self {
        self.when_item_finished = Some(Arc::new(hook));
        self
    }

    /// Invoked exactly once with the full result set when every worker has
    /// terminated.
    pub fn on_all_done(mut self, hook: impl Fn(&[WorkerOutcome]) + Send + Sync + 'static) -> Self {
        self.when_all_done = Some(Arc::new(hook));
        self
    }

    /// Maps an error raised by an execution unit to a [`Disposition`], called
    /// synchronously from the worker that caught it. Without a policy every
    /// raised error aborts the catching worker.
    pub fn on_exception(
        mut self,
        policy: impl Fn(&Error, &T) -> Disposition + Send + Sync + 'static,
    ) -> Self {
        self.exception_policy = Some(Arc::new(policy));
        self
    }

    pub(crate) fn notify_item(&self, item: &T, error: Option<&Error>) {
        if let Some(hook) = &self.when_item_finished {
            hook(item, error);
        }
    }

    pub(crate) fn notify_all_done(&self, outcomes: &[WorkerOutcome]) {
        if let Some(hook) = &self.when_all_done {
            hook(outcomes);
        }
    }

    pub(crate) fn decide(&self, error: &Error, item: &T) -> Option<Disposition> {
        self.exception_policy
            .as_ref()
            .map(|policy| policy(error, item))
    }
}

impl<T> Default for PoolHooks<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for PoolHooks<T> {
    fn clone(&self) -> Self {
        Self {
            when_item_finished: self.when_item_finished.clone(),
            when_all_done: self.when_all_done.clone(),
            exception_policy: self.exception_policy.clone(),
        }
    }
}
