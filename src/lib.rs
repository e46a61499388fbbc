//! A Tokio-based bounded-concurrency pool around one asynchronous function,
//! with FIFO queuing, immediate overflow rejection, and an observable
//! in-flight count.
//!
//! Wrap an async function once, then call it as often as you like: at most
//! `worker_limit` invocations run concurrently, up to `queue_limit` more
//! wait their turn in submission order, and anything beyond that fails fast
//! with [`PoolError::QueueFull`] instead of piling up.
//!
//! ```no_run
//! use futures_throttle::{task_fn, PoolConfig, TaskPool};
//! use std::time::Duration;
//!
//! # #[tokio::main] async fn main() {
//! let fetch = task_fn(|url: String| async move {
//!   tokio::time::sleep(Duration::from_millis(100)).await;
//!   format!("fetched {url}")
//! });
//!
//! let pool = TaskPool::new(
//!   fetch,
//!   PoolConfig::new().worker_limit(6).queue_limit(100),
//!   tokio::runtime::Handle::current(),
//! );
//!
//! let handle = pool.submit("https://example.com".to_string()).await.unwrap();
//! assert_eq!(handle.await_result().await.unwrap(), "fetched https://example.com");
//! # }
//! ```

mod capacity_gate;
mod error;
mod handle;
mod pool;
mod pooled;
mod queue;
mod task;

pub use error::PoolError;
pub use handle::SubmissionHandle;
pub use pool::{PoolConfig, TaskPool, DEFAULT_WORKER_LIMIT};
pub use pooled::PooledTask;
pub use task::{task_fn, TaskFn, TaskFuture};
