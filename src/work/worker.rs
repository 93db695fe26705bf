//! Worker module split across focused submodules:
//! - `shared`: state every worker holds a handle to (backlog, run-state
//!   table, pool state, hooks, telemetry, gate, cancellation)
//! - `process`: the worker struct plus its control loop
//! - `tests`: worker unit tests against scripted execution units

mod process;
mod shared;

#[cfg(test)]
mod tests;

pub use process::Worker;
pub use shared::{WorkerShared, WorkerSharedParams};
