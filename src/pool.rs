use crate::error::PoolError;
use crate::handle::SlotHandle;
use crate::notifier::{CompletionNotifier, TaskCompletionInfo, TaskOutcome};
use crate::signal::{self, DrainFuture, PoolOutcome, ResultFuture};
use crate::task::{RejectHook, ResolveHook, TaskFactory, Verdict};

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::channel::oneshot;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, Instrument};

/// Construction options for a [`ThrottlePool`].
///
/// `timeout` is the optional per-task advisory timeout. The hooks classify
/// each raw task outcome; see [`ResolveHook`] and [`RejectHook`] for the
/// default behavior of an un-configured pool.
pub struct PoolOptions<V, E> {
  pub timeout: Option<Duration>,
  pub on_resolve: ResolveHook<V, E>,
  pub on_reject: RejectHook<E>,
}

impl<V, E> Default for PoolOptions<V, E> {
  fn default() -> Self {
    Self {
      timeout: None,
      on_resolve: Arc::new(|_value| Verdict::Continue),
      on_reject: Arc::new(|err| Some(err)),
    }
  }
}

impl<V, E> PoolOptions<V, E> {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_timeout(mut self, timeout: Duration) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn with_on_resolve(mut self, hook: impl Fn(V) -> Verdict<V, E> + Send + Sync + 'static) -> Self {
    self.on_resolve = Arc::new(hook);
    self
  }

  pub fn with_on_reject(mut self, hook: impl Fn(E) -> Option<E> + Send + Sync + 'static) -> Self {
    self.on_reject = Arc::new(hook);
    self
  }
}

impl<V, E> fmt::Debug for PoolOptions<V, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    // Hooks are opaque closures; only the timeout is meaningfully printable.
    f.debug_struct("PoolOptions")
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

/// All mutable pool state behind a single lock, so every flag transition and
/// counter change happens inside one consistency boundary.
pub(crate) struct PoolState<V, E> {
  pub(crate) active: usize,
  pub(crate) spawned: u64,
  pub(crate) depleted: bool,
  pub(crate) canceled: bool,
  pub(crate) drained: bool,
  pub(crate) started: bool,
  pub(crate) error: Option<PoolError<E>>,
  result_tx: Option<oneshot::Sender<PoolOutcome<V, E>>>,
  drain_tx: Option<oneshot::Sender<()>>,
}

impl<V, E> PoolState<V, E> {
  /// Once true, no further tasks will ever spawn.
  pub(crate) fn ended(&self) -> bool {
    self.depleted || self.canceled
  }
}

/// Outcome of a single pull-and-spawn attempt against the task source.
enum SpawnOutcome {
  Spawned,
  AtCapacity,
  Ended,
}

/// How the hook layer decided a completion should affect the pool.
enum Decision<V, E> {
  Continue,
  Succeed(V),
  Fail(PoolError<E>),
}

pub(crate) struct PoolShared<V, E> {
  pub(crate) name: Arc<String>,
  concurrency: usize,
  timeout: Option<Duration>,
  on_resolve: ResolveHook<V, E>,
  on_reject: RejectHook<E>,
  tokio_handle: TokioHandle,
  cancel_token: CancellationToken,
  notifier: CompletionNotifier<V, E>,
  source: Mutex<Box<dyn Iterator<Item = TaskFactory<V, E>> + Send>>,
  pub(crate) state: Mutex<PoolState<V, E>>,
  result_future: ResultFuture<V, E>,
  drain_future: DrainFuture,
}

/// A concurrency-limited executor over a lazy source of task factories.
///
/// At most `concurrency` tasks are in flight at once. Each completion is
/// classified by the configured hooks into a verdict that either settles the
/// pool or pulls exactly one replacement task, so the concurrency ceiling is
/// preserved without any standing scheduler loop. The pool is inert until
/// [`start`](Self::start) is called.
///
/// Cloning is cheap and all clones drive the same run.
pub struct ThrottlePool<V, E> {
  shared: Arc<PoolShared<V, E>>,
}

impl<V, E> Clone for ThrottlePool<V, E> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<V, E> ThrottlePool<V, E>
where
  V: Clone + Send + Sync + 'static,
  E: Clone + Send + Sync + 'static,
{
  /// Creates a new, inert pool over `source`.
  ///
  /// `source` is pulled lazily, one item per free slot; it is never read past
  /// what the replacement loop needs. `concurrency` is clamped to at least 1.
  /// Tasks and timers are spawned on `tokio_handle`. The pool name appears in
  /// all log output.
  pub fn new<S>(
    source: S,
    concurrency: usize,
    options: PoolOptions<V, E>,
    tokio_handle: TokioHandle,
    pool_name: &str,
  ) -> Self
  where
    S: IntoIterator<Item = TaskFactory<V, E>>,
    S::IntoIter: Send + 'static,
  {
    let (result_tx, result_future) = signal::result_channel();
    let (drain_tx, drain_future) = signal::drain_channel();

    Self {
      shared: Arc::new(PoolShared {
        name: Arc::new(pool_name.to_string()),
        concurrency: concurrency.max(1),
        timeout: options.timeout,
        on_resolve: options.on_resolve,
        on_reject: options.on_reject,
        tokio_handle,
        cancel_token: CancellationToken::new(),
        notifier: CompletionNotifier::new(),
        source: Mutex::new(Box::new(source.into_iter())),
        state: Mutex::new(PoolState {
          active: 0,
          spawned: 0,
          depleted: false,
          canceled: false,
          drained: false,
          started: false,
          error: None,
          result_tx: Some(result_tx),
          drain_tx: Some(drain_tx),
        }),
        result_future,
        drain_future,
      }),
    }
  }

  /// Starts the pool and returns its result future.
  ///
  /// The first call runs the initial fill, spawning tasks until the
  /// concurrency ceiling is reached, the source is exhausted, or the pool is
  /// canceled. Repeated calls are no-ops that return the same shared result
  /// future. If the source is exhausted before anything spawns, the result
  /// settles `Ok(None)` and the pool drains within this call.
  pub fn start(&self) -> ResultFuture<V, E> {
    let first_start = {
      let mut st = self.shared.state.lock();
      !std::mem::replace(&mut st.started, true)
    };

    if first_start {
      info!(
        pool_name = %*self.shared.name,
        concurrency = self.shared.concurrency,
        "Starting pool; running initial fill."
      );
      self.shared.fill();
    } else {
      trace!(pool_name = %*self.shared.name, "start() called on an already-started pool.");
    }

    self.shared.result_future.clone()
  }

  /// Requests cooperative cancellation.
  ///
  /// Prevents any further task from spawning and makes cancellation
  /// observable through every task's [`SlotHandle`]. In-flight tasks are
  /// never aborted. Idempotent, and safe to call after settlement.
  ///
  /// A pool canceled before reaching a terminal verdict never settles its
  /// result future; await [`drain_future`](Self::drain_future) to observe
  /// that termination.
  pub fn cancel(&self) {
    let mut st = self.shared.state.lock();
    if !st.canceled {
      st.canceled = true;
      info!(pool_name = %*self.shared.name, active = st.active, "Pool cancellation requested.");
    }
    self.shared.cancel_token.cancel();
    self.shared.maybe_finish(&mut st);
  }

  /// Registers an observer for the raw outcome of every completed task.
  ///
  /// Observers see outcomes before hook classification and continue to be
  /// notified after the pool has settled. They cannot influence control flow.
  pub fn add_completion_handler(&self, handler: impl Fn(TaskCompletionInfo<V, E>) + Send + Sync + 'static) {
    self.shared.notifier.add_handler(handler);
  }

  pub fn name(&self) -> &str {
    &self.shared.name
  }

  pub fn concurrency(&self) -> usize {
    self.shared.concurrency
  }

  pub fn timeout(&self) -> Option<Duration> {
    self.shared.timeout
  }

  /// Number of tasks currently in flight.
  pub fn active(&self) -> usize {
    self.shared.state.lock().active
  }

  /// Total number of tasks ever spawned. Never decreases.
  pub fn spawned(&self) -> u64 {
    self.shared.state.lock().spawned
  }

  /// Whether the task source has reported exhaustion.
  pub fn is_depleted(&self) -> bool {
    self.shared.state.lock().depleted
  }

  /// Whether the pool is canceled, either explicitly or by settlement.
  pub fn is_canceled(&self) -> bool {
    self.shared.state.lock().canceled
  }

  /// Whether the pool will never spawn another task (depleted or canceled).
  pub fn is_ended(&self) -> bool {
    self.shared.state.lock().ended()
  }

  /// Whether the pool is ended and no task remains active.
  pub fn is_drained(&self) -> bool {
    self.shared.state.lock().drained
  }

  /// The terminal error, if the pool settled by failure.
  pub fn error(&self) -> Option<PoolError<E>> {
    self.shared.state.lock().error.clone()
  }

  pub fn on_resolve(&self) -> ResolveHook<V, E> {
    self.shared.on_resolve.clone()
  }

  pub fn on_reject(&self) -> RejectHook<E> {
    self.shared.on_reject.clone()
  }

  /// The pool's aggregate result signal. Settles at most once.
  pub fn result_future(&self) -> ResultFuture<V, E> {
    self.shared.result_future.clone()
  }

  /// Settles once the pool is ended and the last active task has finished,
  /// independent of the result future.
  pub fn drain_future(&self) -> DrainFuture {
    self.shared.drain_future.clone()
  }
}

impl<V, E> PoolShared<V, E>
where
  V: Clone + Send + Sync + 'static,
  E: Clone + Send + Sync + 'static,
{
  /// The initial fill loop: pull-and-spawn until the ceiling, exhaustion, or
  /// cancellation. Iterative on purpose; completions that land while this
  /// runs go through `request_next` themselves and can never recurse into it.
  fn fill(self: &Arc<Self>) {
    while let SpawnOutcome::Spawned = self.request_next() {}
  }

  /// Pulls one item from the source and spawns it, if a slot is free.
  ///
  /// The active slot is reserved under the state lock *before* the source is
  /// touched, so racing completions cannot over-fill past `concurrency`. The
  /// reservation is rolled back if the source is exhausted or the pool was
  /// canceled in the meantime.
  fn request_next(self: &Arc<Self>) -> SpawnOutcome {
    {
      let mut st = self.state.lock();
      if st.ended() {
        return SpawnOutcome::Ended;
      }
      if st.active >= self.concurrency {
        return SpawnOutcome::AtCapacity;
      }
      st.active += 1;
    }

    // Source iterator is user code; only the source lock is held here.
    let next = self.source.lock().next();

    let Some(factory) = next else {
      let mut st = self.state.lock();
      st.active -= 1;
      st.depleted = true;
      debug!(pool_name = %*self.name, spawned = st.spawned, "Task source exhausted.");
      self.maybe_finish(&mut st);
      return SpawnOutcome::Ended;
    };

    let task_seq = {
      let mut st = self.state.lock();
      if st.canceled {
        // Canceled between the reservation and the spawn; the pulled factory
        // is discarded.
        st.active -= 1;
        self.maybe_finish(&mut st);
        return SpawnOutcome::Ended;
      }
      st.spawned += 1;
      st.spawned
    };

    self.spawn_task(factory, task_seq);
    SpawnOutcome::Spawned
  }

  fn spawn_task(self: &Arc<Self>, factory: TaskFactory<V, E>, task_seq: u64) {
    let timed_out = Arc::new(AtomicBool::new(false));
    let token = self.cancel_token.child_token();

    if let Some(timeout) = self.timeout {
      let timer_flag = timed_out.clone();
      let timer_token = token.clone();
      let timer_pool_name = self.name.clone();
      // The timer only flips what the slot reports; it never aborts the task
      // and never touches the counters.
      self.tokio_handle.spawn(async move {
        tokio::time::sleep(timeout).await;
        timer_flag.store(true, Ordering::SeqCst);
        timer_token.cancel();
        trace!(pool_name = %*timer_pool_name, %task_seq, "Advisory timeout elapsed for slot.");
      });
    }

    let slot = SlotHandle {
      shared: self.clone(),
      task_seq,
      timed_out,
      token,
    };

    // Factory is user code, invoked outside all locks.
    let task_future = factory(slot);

    debug!(pool_name = %*self.name, %task_seq, "Spawning pooled task.");

    let shared = self.clone();
    let span = info_span!("pooled_task", pool_name = %*self.name, %task_seq);
    self.tokio_handle.spawn(
      async move {
        let raw = AssertUnwindSafe(task_future).catch_unwind().await;
        let outcome = match raw {
          Ok(Ok(value)) => TaskOutcome::Resolved(value),
          Ok(Err(err)) => TaskOutcome::Rejected(err),
          Err(_panic_payload) => {
            error!("Pooled task panicked during execution.");
            TaskOutcome::Panicked
          }
        };
        shared.handle_completion(task_seq, outcome);
      }
      .instrument(span),
    );
  }

  /// Runs for every task completion, in completion order: notify observers,
  /// classify through the hooks, then either settle or replace.
  fn handle_completion(self: &Arc<Self>, task_seq: u64, outcome: TaskOutcome<V, E>) {
    self.notifier.notify(task_seq, self.name.clone(), outcome.clone());

    // Hooks are user code and run before the state lock is taken. The
    // verdict is computed even when the pool is already winding down, but is
    // discarded in that case.
    let decision = match outcome {
      TaskOutcome::Resolved(value) => match (self.on_resolve)(value) {
        Verdict::Continue => Decision::Continue,
        Verdict::Complete(v) => Decision::Succeed(v),
        Verdict::Fail(e) => Decision::Fail(PoolError::HookForcedFailure(e)),
      },
      TaskOutcome::Rejected(err) => match (self.on_reject)(err) {
        None => Decision::Continue,
        Some(e) => Decision::Fail(PoolError::TaskFailure(e)),
      },
      TaskOutcome::Panicked => Decision::Fail(PoolError::TaskPanicked),
    };

    let mut st = self.state.lock();
    let ended_before = st.ended();
    st.active -= 1;
    trace!(
      pool_name = %*self.name,
      %task_seq,
      active = st.active,
      "Pooled task completed."
    );

    if ended_before {
      // Pool already winding down or settled: the verdict is discarded, the
      // completion only counts toward draining.
      self.maybe_finish(&mut st);
      return;
    }

    match decision {
      Decision::Continue => {
        drop(st);
        // One completion buys at most one replacement.
        self.request_next();
      }
      Decision::Succeed(value) => {
        self.settle_success_locked(&mut st, Some(value));
        self.maybe_finish(&mut st);
      }
      Decision::Fail(err) => {
        self.settle_failure_locked(&mut st, err);
        self.maybe_finish(&mut st);
      }
    }
  }

  /// Settles the result future successfully. No-op if already settled.
  /// Settling forces `canceled` so no further spawns can occur.
  fn settle_success_locked(&self, st: &mut PoolState<V, E>, value: Option<V>) {
    let Some(tx) = st.result_tx.take() else {
      return;
    };
    st.canceled = true;
    self.cancel_token.cancel();
    info!(pool_name = %*self.name, spawned = st.spawned, "Pool settled successfully.");
    let _ = tx.send(Ok(value));
  }

  /// Settles the result future with a failure and stores it in the pool's
  /// error field. No-op if already settled.
  fn settle_failure_locked(&self, st: &mut PoolState<V, E>, err: PoolError<E>) {
    let Some(tx) = st.result_tx.take() else {
      return;
    };
    st.canceled = true;
    self.cancel_token.cancel();
    st.error = Some(err.clone());
    info!(pool_name = %*self.name, spawned = st.spawned, "Pool settled with failure.");
    let _ = tx.send(Err(err));
  }

  /// Settles the drain future once `ended && active == 0` first holds. If the
  /// pool got there by depletion rather than cancellation, the result settles
  /// `Ok(None)` first.
  pub(crate) fn maybe_finish(&self, st: &mut PoolState<V, E>) {
    if !st.ended() || st.active != 0 {
      return;
    }
    if st.depleted && !st.canceled {
      self.settle_success_locked(st, None);
    }
    if !st.drained {
      st.drained = true;
      if let Some(tx) = st.drain_tx.take() {
        let _ = tx.send(());
      }
      info!(pool_name = %*self.name, spawned = st.spawned, "Pool drained; no active work remains.");
    }
  }
}
