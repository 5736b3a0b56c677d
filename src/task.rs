use crate::handle::SlotHandle;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The type of future a task factory produces.
/// It must be `Send` and `'static`, and settle with `Result<V, E>`.
pub type TaskFuture<V, E> = Pin<Box<dyn Future<Output = Result<V, E>> + Send + 'static>>;

/// One unit of work, pulled lazily from the pool's source.
///
/// The factory is invoked with the task's [`SlotHandle`] at spawn time, so the
/// task body can observe cancellation and the advisory timeout flag.
pub type TaskFactory<V, E> = Box<dyn FnOnce(SlotHandle<V, E>) -> TaskFuture<V, E> + Send + 'static>;

/// What an outcome hook decided about a completed task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict<V, E> {
  /// Absorb the outcome and pull one replacement task from the source.
  Continue,
  /// Settle the pool successfully with this value. No further tasks spawn.
  Complete(V),
  /// Settle the pool as failed with this error. No further tasks spawn.
  Fail(E),
}

/// Classifies a successful raw task value. Default: always [`Verdict::Continue`],
/// so an un-configured pool runs the source to exhaustion.
pub type ResolveHook<V, E> = Arc<dyn Fn(V) -> Verdict<V, E> + Send + Sync + 'static>;

/// Classifies a raw task failure. `Some(err)` fails the pool, `None` absorbs the
/// failure and continues. Default: `Some(err)` unchanged, so an un-configured
/// pool fails on the first raw task failure.
pub type RejectHook<E> = Arc<dyn Fn(E) -> Option<E> + Send + Sync + 'static>;
