use futures_throttle::{task_fn, PoolConfig, TaskPool};

use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn long_task_fn(id: usize) -> String {
  info!("Task {} starting (concurrency test - should take 1s)", id);
  tokio::time::sleep(Duration::from_secs(1)).await;
  let result = format!("Task {} finished", id);
  info!("{}", result);
  result
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Concurrency Limit Example (Limit: 2) ---");

  let concurrency_limit = 2;
  let pool = TaskPool::new(
    task_fn(long_task_fn),
    PoolConfig::new()
      .worker_limit(concurrency_limit)
      .queue_limit(10)
      .named("concurrency_pool"),
    Handle::current(),
  );

  let num_tasks = 5;
  let mut handles = Vec::new();

  info!(
    "Submitting {} tasks, each takes 1 sec. With concurrency {}, this should take ~{} secs.",
    num_tasks,
    concurrency_limit,
    (num_tasks as f32 / concurrency_limit as f32).ceil()
  );

  for i in 0..num_tasks {
    match pool.submit(i).await {
      Ok(handle) => handles.push(handle),
      Err(e) => tracing::error!("Failed to submit task {}: {:?}", i, e),
    }
  }

  info!(
    "Submitted. Currently working: {}, queued: {}.",
    pool.working_count(),
    pool.queued_count()
  );

  for handle in handles {
    let task_id = handle.id();
    match handle.await_result().await {
      Ok(result) => info!("Result for task {}: {}", task_id, result),
      Err(e) => info!("Error for task {}: {:?}", task_id, e),
    }
  }

  info!("All tasks done. Shutting down pool.");
  pool.shutdown().await;
  info!("Pool shut down. Example finished.");
}
