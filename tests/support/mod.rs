use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use taskpool::{Disposition, ExecuteFuture, ExecutionUnit, PoolConfig, PoolState, WorkPool};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

static TRACING_SUBSCRIBER: Lazy<()> = Lazy::new(|| {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
});

pub fn init_tracing() {
    Lazy::force(&TRACING_SUBSCRIBER);
}

pub type ItemLog = Arc<Mutex<Vec<u32>>>;

pub fn item_log() -> ItemLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn items(count: u32) -> Vec<u32> {
    (0..count).collect()
}

pub fn sorted(log: &ItemLog) -> Vec<u32> {
    let mut recorded = log.lock().unwrap().clone();
    recorded.sort_unstable();
    recorded
}

pub fn config(worker_count: usize) -> PoolConfig {
    PoolConfig::builder()
        .worker_count(worker_count)
        .control_timeout(Duration::from_secs(5))
        .build()
        .expect("test config should build")
}

/// Unit that sleeps per item before recording it, so control operations can
/// reliably land while executions are in flight. The record happens after the
/// sleep: a cancelled attempt records nothing, so the log only ever holds
/// completed items.
pub struct SleepyUnit {
    delay: Duration,
    log: ItemLog,
}

impl SleepyUnit {
    pub fn new(delay: Duration, log: ItemLog) -> Self {
        Self { delay, log }
    }
}

impl ExecutionUnit<u32> for SleepyUnit {
    fn execute<'a>(&'a mut self, item: &'a u32, _cancel: &'a CancellationToken) -> ExecuteFuture<'a> {
        let delay = self.delay;
        let log = self.log.clone();
        let item = *item;
        Box::pin(async move {
            sleep(delay).await;
            log.lock().unwrap().push(item);
            Ok(Disposition::next())
        })
    }
}

pub async fn wait_for_state(pool: &WorkPool<u32>, target: PoolState, wait: Duration) -> Result<()> {
    let mut rx = pool.subscribe_state();
    if timeout(wait, rx.wait_for(|state| *state == target))
        .await
        .is_err()
    {
        bail!(
            "pool did not reach {target:?} within {wait:?} (current: {:?})",
            pool.state()
        );
    }
    Ok(())
}

pub async fn wait_for_log_len(log: &ItemLog, target: usize, wait: Duration) -> Result<()> {
    let start = std::time::Instant::now();
    loop {
        let current = log.lock().unwrap().len();
        if current >= target {
            return Ok(());
        }
        if start.elapsed() > wait {
            bail!("log did not reach {target} items within {wait:?} (len: {current})");
        }
        sleep(Duration::from_millis(10)).await;
    }
}
