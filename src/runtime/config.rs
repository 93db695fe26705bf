use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::time::Duration;

const DEFAULT_CONTROL_TIMEOUT_SECS: u64 = 30;
const DEFAULT_CONTROL_POLL_INTERVAL_MS: u64 = 10;

/// Runtime configuration for a worker pool.
///
/// All instances must be constructed via [`PoolConfig::builder`] or
/// [`PoolConfig::new`] so invariants are validated before any consumer
/// observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    worker_count: usize,
    control_timeout: Duration,
    control_poll_interval: Duration,
    metrics_interval: Duration,
}

pub struct PoolConfigParams {
    pub worker_count: usize,
    pub control_timeout: Duration,
    pub control_poll_interval: Duration,
    pub metrics_interval: Duration,
}

impl PoolConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> PoolConfigBuilder {
        PoolConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values, enforcing
    /// the same validation the builder performs.
    pub fn new(params: PoolConfigParams) -> Result<Self> {
        let PoolConfigParams {
            worker_count,
            control_timeout,
            control_poll_interval,
            metrics_interval,
        } = params;

        let config = Self {
            worker_count,
            control_timeout,
            control_poll_interval,
            metrics_interval,
        };
        config.validate()?;
        Ok(config)
    }

    /// Number of workers spawned at `run()`.
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Default bound for pause/resume/stop settlement waits.
    pub fn control_timeout(&self) -> Duration {
        self.control_timeout
    }

    /// Cadence at which control operations re-check worker statuses.
    pub fn control_poll_interval(&self) -> Duration {
        self.control_poll_interval
    }

    /// Cadence of the background metrics reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            bail!("worker_count must be greater than zero");
        }
        if self.control_timeout.is_zero() {
            bail!("control_timeout must be greater than zero");
        }
        if self.control_poll_interval.is_zero() {
            bail!("control_poll_interval must be greater than zero");
        }
        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct PoolConfigBuilder {
    worker_count: Option<usize>,
    control_timeout: Option<Duration>,
    control_poll_interval: Option<Duration>,
    metrics_interval: Option<Duration>,
}

impl PoolConfigBuilder {
    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn control_timeout(mut self, timeout: Duration) -> Self {
        self.control_timeout = Some(timeout);
        self
    }

    pub fn control_poll_interval(mut self, interval: Duration) -> Self {
        self.control_poll_interval = Some(interval);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn build(self) -> Result<PoolConfig> {
        let params = PoolConfigParams {
            worker_count: self.worker_count.context("worker_count is required")?,
            control_timeout: self
                .control_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_CONTROL_TIMEOUT_SECS)),
            control_poll_interval: self
                .control_poll_interval
                .unwrap_or_else(|| Duration::from_millis(DEFAULT_CONTROL_POLL_INTERVAL_MS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
        };
        PoolConfig::new(params)
    }
}
