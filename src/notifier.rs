use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::SystemTime;

use parking_lot::RwLock;
use tracing::{debug, error, trace};

/// The raw outcome of one spawned task, before any hook classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<V, E> {
  Resolved(V),
  Rejected(E),
  Panicked,
}

/// Delivered to every registered completion handler for every task that
/// finishes, independent of hook verdicts and of whether the pool has
/// already settled.
#[derive(Debug, Clone)]
pub struct TaskCompletionInfo<V, E> {
  pub task_seq: u64,
  pub pool_name: Arc<String>,
  pub outcome: TaskOutcome<V, E>,
  pub completion_time: SystemTime,
}

type Handler<V, E> = Arc<dyn Fn(TaskCompletionInfo<V, E>) + Send + Sync + 'static>;

/// Observation side-channel: a plain registrable-callback list dispatched
/// synchronously from the completion path. Handlers are for logging and
/// metrics only and can never influence pool control flow.
pub(crate) struct CompletionNotifier<V, E> {
  handlers: RwLock<Vec<Handler<V, E>>>,
}

impl<V, E> CompletionNotifier<V, E>
where
  V: Clone,
  E: Clone,
{
  pub(crate) fn new() -> Self {
    Self {
      handlers: RwLock::new(Vec::new()),
    }
  }

  pub(crate) fn add_handler(&self, handler: impl Fn(TaskCompletionInfo<V, E>) + Send + Sync + 'static) {
    let mut handlers = self.handlers.write();
    handlers.push(Arc::new(handler));
    debug!("Notifier: added completion handler. Total handlers: {}", handlers.len());
  }

  pub(crate) fn notify(&self, task_seq: u64, pool_name: Arc<String>, outcome: TaskOutcome<V, E>) {
    // Snapshot the list so handlers can register further handlers (or poke
    // the pool) without deadlocking against the dispatch.
    let handlers: Vec<Handler<V, E>> = self.handlers.read().clone();
    if handlers.is_empty() {
      trace!(%task_seq, "No completion handlers registered, dropping notification.");
      return;
    }

    let info = TaskCompletionInfo {
      task_seq,
      pool_name,
      outcome,
      completion_time: SystemTime::now(),
    };

    for handler in handlers.iter() {
      let handler = handler.clone();
      let info = info.clone();
      // A panicking handler must not take down the completion path.
      let result = catch_unwind(AssertUnwindSafe(move || handler(info)));
      if result.is_err() {
        error!(%task_seq, "A completion handler panicked during dispatch.");
      }
    }
  }
}
