//! Work primitives: the shared backlog, item dispositions, per-worker
//! run-state records, and the worker loop itself.

pub mod backlog;
pub mod disposition;
pub mod state;
pub mod worker;
