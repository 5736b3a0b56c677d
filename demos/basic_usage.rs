use futures_throttle::{PoolOptions, TaskFactory, ThrottlePool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

fn fetch_task(id: usize, delay_ms: u64) -> TaskFactory<String, String> {
  Box::new(move |slot| {
    Box::pin(async move {
      info!(
        "Task {} (seq {}) starting, will sleep for {}ms",
        id,
        slot.task_seq(),
        delay_ms
      );
      tokio::time::sleep(Duration::from_millis(delay_ms)).await;
      let result = format!("Task {} finished after {}ms", id, delay_ms);
      info!("{}", result);
      Ok(result)
    })
  })
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false) // Disable module paths for cleaner example output
    .init();

  info!("--- Basic Usage Demo ---");

  // Five tasks, at most two in flight. Default hooks run the source dry.
  let source: Vec<TaskFactory<String, String>> = (0..5)
    .map(|i| fetch_task(i, 500 + (i as u64 % 3 * 250)))
    .collect();

  let pool = ThrottlePool::new(
    source,
    2, // Concurrency limit
    PoolOptions::default(),
    Handle::current(),
    "basic_pool",
  );

  pool.add_completion_handler(|completion| {
    info!("Observer saw raw outcome for seq {}: {:?}", completion.task_seq, completion.outcome);
  });

  info!("Starting pool...");
  let outcome = pool.start().await;
  info!("Pool settled with {:?}", outcome);

  pool.drain_future().await;
  info!("Pool drained: spawned {} tasks total.", pool.spawned());
  info!("--- Basic Usage Demo End ---");
}
