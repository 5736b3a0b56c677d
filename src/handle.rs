use crate::pool::PoolShared;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

/// Per-spawned-task context handed to each task factory.
///
/// Exposes a read-only view of the owning pool, the task's advisory timeout
/// flag, and a computed canceled status. Cancellation and timeout are purely
/// cooperative: the pool never aborts a running task, it only changes what
/// this handle reports.
pub struct SlotHandle<V, E> {
  pub(crate) shared: Arc<PoolShared<V, E>>,
  pub(crate) task_seq: u64,
  pub(crate) timed_out: Arc<AtomicBool>,
  pub(crate) token: CancellationToken,
}

impl<V, E> Clone for SlotHandle<V, E> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
      task_seq: self.task_seq,
      timed_out: self.timed_out.clone(),
      token: self.token.clone(),
    }
  }
}

impl<V, E> SlotHandle<V, E> {
  /// Sequence number of this task within its pool (1-based spawn order).
  pub fn task_seq(&self) -> u64 {
    self.task_seq
  }

  /// Name of the owning pool.
  pub fn pool_name(&self) -> &str {
    &self.shared.name
  }

  /// Number of tasks currently in flight in the owning pool.
  pub fn pool_active(&self) -> usize {
    self.shared.state.lock().active
  }

  /// Total tasks the owning pool has ever spawned.
  pub fn pool_spawned(&self) -> u64 {
    self.shared.state.lock().spawned
  }

  /// Whether the owning pool has been canceled (explicitly or by settlement).
  pub fn is_pool_canceled(&self) -> bool {
    self.shared.state.lock().canceled
  }

  /// Whether this task's advisory timeout has elapsed. Never resets.
  pub fn has_timed_out(&self) -> bool {
    self.timed_out.load(Ordering::SeqCst)
  }

  /// Computed canceled status: pool canceled OR this slot timed out.
  pub fn is_canceled(&self) -> bool {
    // The slot token is a child of the pool token and is also fired by the
    // timeout timer, so it encodes exactly this disjunction.
    self.token.is_cancelled()
  }

  /// The slot's cancellation token, for tasks that want to `select!` on
  /// cancellation instead of polling [`is_canceled`](Self::is_canceled).
  pub fn cancellation_token(&self) -> &CancellationToken {
    &self.token
  }

  /// Waits until this slot is canceled (pool cancellation or slot timeout).
  pub async fn cancelled(&self) {
    self.token.cancelled().await;
  }
}
