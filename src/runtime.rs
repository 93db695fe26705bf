//! Runtime glue that wires configs, the execution-unit contract, factories,
//! hooks, telemetry, and runner orchestration.

pub mod config;
pub mod contract;
pub mod factory;
pub mod hooks;
pub mod runner;
pub mod telemetry;
