use crate::error::PoolError;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use fibre::oneshot;

/// The future a task invocation produces.
/// It must be `Send` and `'static`, and yield the task's output `R`.
pub type TaskFuture<R> = Pin<Box<dyn Future<Output = R> + Send + 'static>>;

/// The wrapped unit of work: a shareable async function from arguments `A`
/// to an output `R`.
///
/// The pool treats the function as opaque. A fallible task uses
/// `R = Result<T, E>`; the pool never inspects or transforms the output.
pub type TaskFn<A, R> = Arc<dyn Fn(A) -> TaskFuture<R> + Send + Sync + 'static>;

/// Adapts an async closure into the [`TaskFn`] the pool stores.
///
/// ```
/// use futures_throttle::task_fn;
///
/// let task = task_fn(|n: u32| async move { n * 2 });
/// ```
pub fn task_fn<A, R, F, Fut>(f: F) -> TaskFn<A, R>
where
  A: Send + 'static,
  R: Send + 'static,
  F: Fn(A) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = R> + Send + 'static,
{
  Arc::new(move |args| Box::pin(f(args)) as TaskFuture<R>)
}

/// One queued invocation awaiting a worker slot.
///
/// Created at submission, held in the queue until the dispatch loop picks it
/// up, consumed when the execution settles. The result sender is the
/// submission's continuation; dropping it unresolved surfaces as
/// `PoolError::ResultChannelError` on the handle side.
pub(crate) struct QueuedRequest<A: Send + 'static, R: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) args: A,
  pub(crate) result_sender: oneshot::Sender<Result<R, PoolError>>,
}
