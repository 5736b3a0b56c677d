use thiserror::Error;

/// Terminal failures a `ThrottlePool` run can settle with.
///
/// `E` is the caller's task error type. Which variant is stored depends on
/// which side of the hook layer produced the failing verdict.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError<E> {
  /// A task's raw rejection, passed through (or substituted) by the reject hook.
  #[error("task failed: {0}")]
  TaskFailure(E),

  /// The resolve hook turned an otherwise-successful task outcome into a pool failure.
  #[error("resolve hook forced pool failure: {0}")]
  HookForcedFailure(E),

  /// A spawned task panicked. Panics bypass the hook layer entirely.
  #[error("task panicked during execution")]
  TaskPanicked,
}
