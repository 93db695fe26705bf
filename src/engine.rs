//! Pool-level orchestration: the state machine, the controller surface, and
//! the result aggregator that detects pool-wide completion.

pub mod aggregator;
pub mod control;
pub mod pool;
