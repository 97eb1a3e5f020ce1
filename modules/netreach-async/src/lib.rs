//! Async Plugin Runtime (spec §4.E) — the hardest component: a
//! short-timeout/long-timeout race around every plugin invocation,
//! backed by the two-tier cache and a non-blocking worker pool.

pub mod runtime;
pub mod worker_pool;

pub use runtime::{AsyncPluginRuntime, AsyncSearchOutcome, RebuildHook};
pub use worker_pool::{WorkerPermit, WorkerPool};
