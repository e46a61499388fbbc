use futures_throttle::{task_fn, PoolConfig, PoolError, TaskPool};

use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Overflow Rejection Example (Workers: 2, Queue: 2) ---");

  let pool = TaskPool::new(
    task_fn(|id: usize| async move {
      info!("Task {} running", id);
      tokio::time::sleep(Duration::from_millis(800)).await;
      id
    }),
    PoolConfig::new().worker_limit(2).queue_limit(2).named("overflow_pool"),
    Handle::current(),
  );

  // With 2 workers and 2 queue slots, the burst admits 4 submissions and
  // rejects the rest on the spot.
  let mut handles = Vec::new();
  for i in 0..7 {
    match pool.submit(i).await {
      Ok(handle) => {
        info!("Task {} admitted (handle id {})", i, handle.id());
        handles.push(handle);
      }
      Err(PoolError::QueueFull) => {
        info!("Task {} rejected: {}", i, PoolError::QueueFull);
      }
      Err(e) => {
        tracing::error!("Unexpected submit error for task {}: {:?}", i, e);
      }
    }
  }

  info!(
    "Admitted {} of 7. Working: {}, queued: {}.",
    handles.len(),
    pool.working_count(),
    pool.queued_count()
  );

  for handle in handles {
    let task_id = handle.id();
    match handle.await_result().await {
      Ok(id) => info!("Task with handle id {} resolved to {}", task_id, id),
      Err(e) => info!("Task with handle id {} failed: {:?}", task_id, e),
    }
  }

  info!("Shutting down pool.");
  pool.shutdown().await;
  info!("Pool shut down. Example finished.");
}
