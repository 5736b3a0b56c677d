use futures_throttle::{PoolOptions, TaskFactory, ThrottlePool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

fn cooperative_task(work_ms: u64) -> TaskFactory<String, String> {
  Box::new(move |slot| {
    Box::pin(async move {
      let seq = slot.task_seq();
      tokio::select! {
        _ = slot.cancelled() => {
          info!("Task {} observed cancellation and is stopping early.", seq);
          Ok(format!("task {} stopped early", seq))
        }
        _ = tokio::time::sleep(Duration::from_millis(work_ms)) => {
          info!("Task {} finished its full workload.", seq);
          Ok(format!("task {} completed", seq))
        }
      }
    })
  })
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Cancellation Demo ---");

  let source: Vec<TaskFactory<String, String>> = (0..10).map(|_| cooperative_task(2_000)).collect();
  let pool = ThrottlePool::new(source, 2, PoolOptions::default(), Handle::current(), "cancel_pool");

  let result = pool.start();
  info!("Pool started with {} tasks in flight.", pool.active());

  tokio::time::sleep(Duration::from_millis(300)).await;
  info!("Requesting cancellation; in-flight tasks wind down cooperatively.");
  pool.cancel();

  // A pool canceled before a terminal verdict never settles its result
  // future, so termination is observed through the drain future.
  pool.drain_future().await;
  info!(
    "Pool drained after cancellation: spawned {} of 10 tasks, result future pending: {}",
    pool.spawned(),
    futures::FutureExt::now_or_never(result).is_none()
  );
  info!("--- Cancellation Demo End ---");
}
