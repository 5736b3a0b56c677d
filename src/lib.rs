//! A Tokio-based concurrency-limited executor that lazily pulls task
//! factories from a source, keeps at most `concurrency` of them in flight,
//! and folds their hook-classified outcomes into a single terminal result.

mod error;
mod handle;
mod notifier;
mod pool;
mod signal;
mod task;

pub use error::PoolError;
pub use handle::SlotHandle;
pub use notifier::{TaskCompletionInfo, TaskOutcome};
pub use pool::{PoolOptions, ThrottlePool};
pub use signal::{DrainFuture, PoolOutcome, ResultFuture};
pub use task::{RejectHook, ResolveHook, TaskFactory, TaskFuture, Verdict};
