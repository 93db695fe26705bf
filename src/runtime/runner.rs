use crate::engine::control::ControlOutcome;
use crate::engine::pool::WorkPool;
use anyhow::{bail, Result};
use std::sync::Arc;
use tokio::signal;

/// Coordinates a pool's lifecycle and handles OS signals for graceful stops.
pub struct Runner<T: Send + Sync + 'static> {
    pool: Arc<WorkPool<T>>,
}

impl<T: Send + Sync + 'static> Runner<T> {
    pub fn new(pool: WorkPool<T>) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Shared handle to the underlying pool, e.g. for issuing pause/resume
    /// from another task while the runner drives the lifecycle.
    pub fn pool(&self) -> Arc<WorkPool<T>> {
        self.pool.clone()
    }

    /// Starts the pool, then runs until the backlog is drained, Ctrl-C
    /// (SIGINT) is received, or the pool's root token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&self) -> Result<()> {
        match self.pool.run().await? {
            ControlOutcome::Completed => {}
            other => bail!("failed to start worker pool: {other:?}"),
        }
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) or pool completion");

        let cancelled = self.pool.cancellation_token();
        tokio::select! {
            _ = self.pool.wait_disposed() => {
                tracing::info!("pool disposed; runner exiting");
                return Ok(());
            }
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; stopping worker pool");
            }
            _ = cancelled.cancelled() => {
                tracing::info!("root token cancelled; stopping worker pool");
            }
        }

        match self.pool.stop(self.pool.config().control_timeout()).await? {
            ControlOutcome::Completed | ControlOutcome::AlreadyInState => {}
            ControlOutcome::TimedOut => {
                tracing::warn!("workers did not terminate within the stop timeout");
            }
            other => {
                tracing::warn!(outcome = ?other, "stop request was not applied");
            }
        }
        self.pool.wait_disposed().await;
        Ok(())
    }
}
