use futures_throttle::{PoolOptions, TaskFactory, ThrottlePool, Verdict};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

fn probe_task(target: u32) -> TaskFactory<u32, String> {
  Box::new(move |slot| {
    Box::pin(async move {
      let delay = 100 + (slot.task_seq() % 4) * 150;
      tokio::time::sleep(Duration::from_millis(delay)).await;
      info!("Probe {} reporting value {}", slot.task_seq(), target);
      Ok(target)
    })
  })
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Early Completion Demo ---");

  // An unlimited source of probes. The resolve hook treats the first value
  // of 42 as the answer and settles the whole pool with it; remaining active
  // probes finish naturally without spawning replacements.
  let source = (1u32..).map(|i| probe_task(if i == 6 { 42 } else { i }));

  let options = PoolOptions::default().with_on_resolve(|value| {
    if value == 42 {
      Verdict::Complete(value)
    } else {
      Verdict::Continue
    }
  });

  let pool = ThrottlePool::new(source, 3, options, Handle::current(), "probe_pool");

  let outcome = pool.start().await;
  info!(
    "Pool settled with {:?} after spawning {} probes ({} still winding down).",
    outcome,
    pool.spawned(),
    pool.active()
  );

  pool.drain_future().await;
  info!("All probes finished.");
  info!("--- Early Completion Demo End ---");
}
