use futures_throttle::{PoolOptions, TaskFactory, TaskOutcome, ThrottlePool, Verdict};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

fn create_task(value: u32, duration_ms: u64) -> TaskFactory<u32, String> {
  Box::new(move |_slot| {
    Box::pin(async move {
      sleep(Duration::from_millis(duration_ms)).await;
      Ok(value)
    })
  })
}

fn failing_task(message: &str, duration_ms: u64) -> TaskFactory<u32, String> {
  let message = message.to_string();
  Box::new(move |_slot| {
    Box::pin(async move {
      sleep(Duration::from_millis(duration_ms)).await;
      Err(message)
    })
  })
}

fn setup_tracing_for_test() {
  use std::sync::Once;
  use tracing_subscriber::{fmt, EnvFilter};
  static TRACING_INIT: Once = Once::new();

  TRACING_INIT.call_once(|| {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,futures_throttle=trace"));

    fmt::Subscriber::builder()
      .with_env_filter(filter)
      .with_test_writer()
      .try_init()
      .ok();
  });
}

#[tokio::test]
async fn test_observers_see_raw_outcomes_independent_of_verdicts() {
  setup_tracing_for_test();
  let source: Vec<TaskFactory<u32, String>> = vec![
    create_task(1, 10),
    failing_task("transient", 10),
    create_task(2, 10),
  ];
  // The reject hook absorbs the failure, but observers still see it raw.
  let options = PoolOptions::default().with_on_reject(|_err| None);
  let pool = ThrottlePool::new(
    source,
    1,
    options,
    tokio::runtime::Handle::current(),
    "notifier_raw_outcomes",
  );

  let outcomes = Arc::new(Mutex::new(Vec::new()));
  let outcomes_sink = outcomes.clone();
  pool.add_completion_handler(move |info| {
    assert_eq!(&**info.pool_name, "notifier_raw_outcomes");
    outcomes_sink.lock().push((info.task_seq, info.outcome));
  });

  assert_eq!(pool.start().await, Ok(None));
  pool.drain_future().await;

  let recorded = outcomes.lock();
  assert_eq!(
    *recorded,
    vec![
      (1, TaskOutcome::Resolved(1)),
      (2, TaskOutcome::Rejected("transient".to_string())),
      (3, TaskOutcome::Resolved(2)),
    ],
    "concurrency 1 delivers raw outcomes in spawn order, hook verdicts notwithstanding"
  );
}

#[tokio::test]
async fn test_observers_notified_after_settlement() {
  setup_tracing_for_test();
  // The fast task settles the pool; the slow one completes afterwards and
  // must still reach the observers.
  let source: Vec<TaskFactory<u32, String>> = vec![create_task(7, 10), create_task(9, 120)];
  let options = PoolOptions::default().with_on_resolve(|v| Verdict::Complete(v));
  let pool = ThrottlePool::new(
    source,
    2,
    options,
    tokio::runtime::Handle::current(),
    "notifier_post_settlement",
  );

  let outcomes = Arc::new(Mutex::new(Vec::new()));
  let outcomes_sink = outcomes.clone();
  pool.add_completion_handler(move |info| {
    outcomes_sink.lock().push(info.outcome);
  });

  assert_eq!(pool.start().await, Ok(Some(7)));
  pool.drain_future().await;

  let recorded = outcomes.lock();
  assert_eq!(recorded.len(), 2);
  assert!(recorded.contains(&TaskOutcome::Resolved(7)));
  assert!(
    recorded.contains(&TaskOutcome::Resolved(9)),
    "a completion landing after settlement must still be observed"
  );
}

#[tokio::test]
async fn test_panicking_handler_does_not_disturb_pool() {
  setup_tracing_for_test();
  let source: Vec<TaskFactory<u32, String>> = (0..3).map(|i| create_task(i, 10)).collect();
  let pool = ThrottlePool::new(
    source,
    1,
    PoolOptions::default(),
    tokio::runtime::Handle::current(),
    "notifier_handler_panic",
  );

  pool.add_completion_handler(|_info| {
    panic!("handler intentionally panicked");
  });

  let delivered = Arc::new(AtomicUsize::new(0));
  let delivered_count = delivered.clone();
  pool.add_completion_handler(move |_info| {
    delivered_count.fetch_add(1, Ordering::SeqCst);
  });

  assert_eq!(pool.start().await, Ok(None));
  pool.drain_future().await;

  assert_eq!(pool.spawned(), 3);
  assert_eq!(
    delivered.load(Ordering::SeqCst),
    3,
    "handlers registered after a panicking one must still receive every outcome"
  );
}

#[tokio::test]
async fn test_observers_see_panicked_outcome() {
  setup_tracing_for_test();
  let panic_factory: TaskFactory<u32, String> = Box::new(|_slot| {
    Box::pin(async {
      sleep(Duration::from_millis(10)).await;
      if true {
        panic!("task intentionally panicked");
      }
      Ok(0)
    })
  });
  let pool = ThrottlePool::new(
    vec![panic_factory],
    1,
    PoolOptions::default(),
    tokio::runtime::Handle::current(),
    "notifier_panicked_outcome",
  );

  let outcomes = Arc::new(Mutex::new(Vec::new()));
  let outcomes_sink = outcomes.clone();
  pool.add_completion_handler(move |info| {
    outcomes_sink.lock().push(info.outcome);
  });

  assert!(pool.start().await.is_err());
  pool.drain_future().await;

  assert_eq!(*outcomes.lock(), vec![TaskOutcome::Panicked]);
}
