pub mod engine;
pub mod runtime;
pub mod work;

pub use engine::aggregator::{ResultAggregator, WorkerOutcome};
pub use engine::control::{ControlOutcome, PoolState};
pub use engine::pool::{backlog_source, BacklogSource, WorkPool};
pub use runtime::config::{PoolConfig, PoolConfigBuilder, PoolConfigParams};
pub use runtime::contract::{ExecuteFuture, ExecutionUnit, FnUnit};
pub use runtime::factory::{
    InjectedFactory, InjectionPlan, InjectionPlanBuilder, ResolvedDeps, ServiceDirectory,
    StaticDirectory, UnitFactory,
};
pub use runtime::hooks::PoolHooks;
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use work::backlog::Backlog;
pub use work::disposition::Disposition;
pub use work::state::{RunState, RunStateTable, WorkerStatus};
