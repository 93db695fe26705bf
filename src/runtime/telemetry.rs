use crate::work::backlog::Backlog;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back
/// to `info`. Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    items_completed: AtomicU64,
    items_retried: AtomicU64,
    items_requeued: AtomicU64,
    worker_failures: AtomicU64,
    pool_transitions: AtomicU64,
    live_workers: AtomicUsize,
}

impl Telemetry {
    pub fn record_item_completed(&self) {
        self.items_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_retried(&self) {
        self.items_retried.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_item_requeued(&self) {
        self.items_requeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_failure(&self) {
        self.worker_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_live_workers(&self, workers: usize) {
        self.live_workers.store(workers, Ordering::Relaxed);
        self.pool_transitions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            items_completed: self.items_completed.load(Ordering::Relaxed),
            items_retried: self.items_retried.load(Ordering::Relaxed),
            items_requeued: self.items_requeued.load(Ordering::Relaxed),
            worker_failures: self.worker_failures.load(Ordering::Relaxed),
        }
    }

    pub fn items_completed(&self) -> u64 {
        self.items_completed.load(Ordering::Relaxed)
    }

    pub fn items_retried(&self) -> u64 {
        self.items_retried.load(Ordering::Relaxed)
    }

    pub fn items_requeued(&self) -> u64 {
        self.items_requeued.load(Ordering::Relaxed)
    }

    pub fn worker_failures(&self) -> u64 {
        self.worker_failures.load(Ordering::Relaxed)
    }

    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Relaxed)
    }

    pub fn pool_transitions(&self) -> u64 {
        self.pool_transitions.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone)]
pub struct TelemetrySnapshot {
    pub items_completed: u64,
    pub items_retried: u64,
    pub items_requeued: u64,
    pub worker_failures: u64,
}

/// Spawns a background task that periodically logs throughput, backlog depth,
/// and failure counters.
pub fn spawn_metrics_reporter<T: Send + Sync + 'static>(
    telemetry: Arc<Telemetry>,
    backlog: Arc<Backlog<T>>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "taskpool::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let completed_delta = current_snapshot
                        .items_completed
                        .saturating_sub(last_snapshot.items_completed);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        completed_delta as f64 / elapsed
                    };
                    let backlog_items = backlog.len();

                    tracing::info!(
                        target: "taskpool::metrics",
                        throughput = format!("{throughput:.2}"),
                        completed = current_snapshot.items_completed,
                        backlog_items,
                        retried = current_snapshot.items_retried,
                        requeued = current_snapshot.items_requeued,
                        worker_failures = current_snapshot.worker_failures,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}
