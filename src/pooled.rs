use crate::error::PoolError;
use crate::pool::TaskPool;

use std::fmt;
use std::sync::Arc;

/// A submission callable bound to one [`TaskPool`].
///
/// This is the shape repeat callers hold: each [`call`](Self::call) submits
/// arguments against the owning pool and resolves with the task's output for
/// that submission. Both public entry points ([`TaskPool::create`] and
/// [`TaskPool::wrap`]) return this type; the engine behind them is the same.
///
/// Cloning is cheap and every clone targets the same pool, so the
/// concurrency bound is shared across clones. The pool stays alive for as
/// long as any clone does.
pub struct PooledTask<A: Send + 'static, R: Send + 'static> {
  pool: Arc<TaskPool<A, R>>,
}

impl<A: Send + 'static, R: Send + 'static> Clone for PooledTask<A, R> {
  fn clone(&self) -> Self {
    Self {
      pool: self.pool.clone(),
    }
  }
}

impl<A: Send + 'static, R: Send + 'static> fmt::Debug for PooledTask<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PooledTask")
      .field("pool", &self.pool.name())
      .finish_non_exhaustive()
  }
}

impl<A: Send + 'static, R: Send + 'static> PooledTask<A, R> {
  pub(crate) fn new(pool: Arc<TaskPool<A, R>>) -> Self {
    Self { pool }
  }

  /// Submits `args` and awaits the task's output for this call.
  ///
  /// Resolves with exactly what the task produced, fails with
  /// [`PoolError::QueueFull`] when the submission was rejected at capacity,
  /// or with another [`PoolError`] when the pool could not settle it.
  pub async fn call(&self, args: A) -> Result<R, PoolError> {
    self.pool.submit(args).await?.await_result().await
  }
}
