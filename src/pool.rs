use crate::error::PoolError;
use crate::handle::SubmissionHandle;
use crate::pooled::PooledTask;
use crate::queue::{QueueConsumer, QueueProducer, TaskQueue};
use crate::task::{QueuedRequest, TaskFn};

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use fibre::oneshot::oneshot;
use futures::FutureExt;
use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_SUBMISSION_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
  static ref NEXT_POOL_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// Worker limit used when [`PoolConfig`] leaves it unset.
pub const DEFAULT_WORKER_LIMIT: usize = 6;

/// Pool configuration with explicit "unset" sentinels.
///
/// Unset and zero are distinct on purpose: a queue limit of zero is an
/// honored configuration (no waiting room beyond in-flight capacity), not a
/// request for the default. A worker limit of zero would make the pool
/// unable to run anything and is clamped to 1.
#[derive(Debug, Clone, Default)]
pub struct PoolConfig {
  worker_limit: Option<usize>,
  queue_limit: Option<usize>,
  name: Option<String>,
}

impl PoolConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// Maximum number of task executions run concurrently.
  /// Unset defaults to [`DEFAULT_WORKER_LIMIT`].
  pub fn worker_limit(mut self, limit: usize) -> Self {
    self.worker_limit = Some(limit);
    self
  }

  /// Maximum number of submissions held waiting for a worker slot.
  /// Unset means unbounded.
  pub fn queue_limit(mut self, limit: usize) -> Self {
    self.queue_limit = Some(limit);
    self
  }

  /// Name used in this pool's logs and spans.
  /// Unset gets a generated `throttle-pool-N` name.
  pub fn named(mut self, name: impl Into<String>) -> Self {
    self.name = Some(name.into());
    self
  }
}

/// A bounded-concurrency pool around one asynchronous function.
///
/// Callers submit arguments an unbounded number of times; at most
/// `worker_limit` invocations execute concurrently, up to `queue_limit`
/// further submissions wait in FIFO order, and submissions beyond that are
/// rejected immediately with [`PoolError::QueueFull`].
///
/// Dispatch is a single loop owning the queue consumer: it acquires a worker
/// slot, receives the oldest request, and spawns its execution onto the
/// runtime. Settlement releases the slot, which is what lets the loop pull
/// the next queued request.
pub struct TaskPool<A: Send + 'static, R: Send + 'static> {
  pool_name: Arc<String>,
  task: TaskFn<A, R>,
  semaphore: Arc<Semaphore>,
  queue_tx: QueueProducer<A, R>,
  working: Arc<AtomicUsize>,
  worker_limit: usize,
  queue_limit: Option<usize>,
  shutdown_token: CancellationToken,
  worker_join_handle_internal: Mutex<Option<JoinHandle<()>>>,
}

impl<A: Send + 'static, R: Send + 'static> TaskPool<A, R> {
  /// Creates the pool and starts its dispatch loop on `tokio_handle`.
  pub fn new(task: TaskFn<A, R>, config: PoolConfig, tokio_handle: TokioHandle) -> Arc<Self> {
    let worker_limit = config.worker_limit.unwrap_or(DEFAULT_WORKER_LIMIT).max(1);
    let queue_limit = config.queue_limit;
    // The gate counts queued plus in-flight work: a slot is only returned at
    // settlement, so worker_limit + queue_limit submissions are admitted
    // while none complete.
    let admission_capacity = queue_limit.map(|limit| limit.saturating_add(worker_limit));
    let pool_name = config.name.unwrap_or_else(|| {
      format!(
        "throttle-pool-{}",
        NEXT_POOL_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed)
      )
    });

    let (queue_tx, queue_rx) = TaskQueue::new(admission_capacity).split();
    let shutdown_token = CancellationToken::new();

    let pool_arc = Arc::new(Self {
      pool_name: Arc::new(pool_name),
      task,
      semaphore: Arc::new(Semaphore::new(worker_limit)),
      queue_tx,
      working: Arc::new(AtomicUsize::new(0)),
      worker_limit,
      queue_limit,
      shutdown_token: shutdown_token.clone(),
      worker_join_handle_internal: Mutex::new(None),
    });

    let loop_pool_name = pool_arc.pool_name.clone();
    let loop_task = pool_arc.task.clone();
    let loop_semaphore = pool_arc.semaphore.clone();
    let loop_working = pool_arc.working.clone();
    let loop_tokio_handle = tokio_handle.clone();

    let loop_join_handle = tokio_handle.spawn(
      async move {
        Self::run_dispatch_loop(
          loop_pool_name,
          loop_task,
          loop_semaphore,
          queue_rx,
          loop_working,
          loop_tokio_handle,
          shutdown_token,
        )
        .await;
      }
      .instrument(info_span!("throttle_dispatch_loop", name = %*pool_arc.pool_name)),
    );

    *pool_arc.worker_join_handle_internal.lock() = Some(loop_join_handle);

    info!(
      pool_name = %*pool_arc.pool_name,
      worker_limit,
      queue_limit = ?queue_limit,
      "Task pool created."
    );
    pool_arc
  }

  /// Builds a pool internally and returns only the bound submission
  /// callable, hiding the pool and its introspection surface.
  pub fn wrap(task: TaskFn<A, R>, config: PoolConfig, tokio_handle: TokioHandle) -> PooledTask<A, R> {
    Self::new(task, config, tokio_handle).create()
  }

  /// Returns a submission callable bound to this pool.
  pub fn create(self: &Arc<Self>) -> PooledTask<A, R> {
    PooledTask::new(self.clone())
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  /// Number of task executions currently in flight.
  /// Never exceeds [`worker_limit`](Self::worker_limit).
  pub fn working_count(&self) -> usize {
    self.working.load(AtomicOrdering::SeqCst)
  }

  /// Number of submissions admitted but not yet dispatched.
  pub fn queued_count(&self) -> usize {
    self.queue_tx.len()
  }

  pub fn worker_limit(&self) -> usize {
    self.worker_limit
  }

  /// The configured queue limit, or `None` when unbounded.
  pub fn queue_limit(&self) -> Option<usize> {
    self.queue_limit
  }

  /// Submits arguments for one task invocation.
  ///
  /// Accepted submissions return a [`SubmissionHandle`] that settles with the
  /// task's output. When the queue is at capacity the submission is rejected
  /// immediately with [`PoolError::QueueFull`] and the task is never invoked
  /// for it; other queued and in-flight submissions are unaffected.
  pub async fn submit(&self, args: A) -> Result<SubmissionHandle<R>, PoolError> {
    if self.shutdown_token.is_cancelled() || self.queue_tx.is_closed() {
      warn!(pool_name = %*self.pool_name, "Submit: pool is shutting down or closed.");
      return Err(PoolError::PoolShuttingDown);
    }

    let task_id = NEXT_SUBMISSION_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let (result_tx, result_rx) = oneshot();
    let request = QueuedRequest {
      task_id,
      args,
      result_sender: result_tx,
    };

    match self.queue_tx.try_send(request).await {
      Ok(()) => {
        debug!(pool_name = %*self.pool_name, %task_id, "Submission queued.");
        Ok(SubmissionHandle {
          task_id,
          result_receiver: Some(result_rx),
        })
      }
      Err(PoolError::QueueFull) => {
        debug!(pool_name = %*self.pool_name, %task_id, "Submission rejected: queue at capacity.");
        Err(PoolError::QueueFull)
      }
      Err(send_error) => {
        error!(
          pool_name = %*self.pool_name,
          %task_id,
          "Submit: failed to enqueue request: {:?}",
          send_error
        );
        if self.shutdown_token.is_cancelled() || self.queue_tx.is_closed() {
          Err(PoolError::PoolShuttingDown)
        } else {
          Err(send_error)
        }
      }
    }
  }

  /// Shuts the pool down: stops admission, closes the queue, and joins the
  /// dispatch loop.
  ///
  /// Already-dispatched executions run to completion and deliver their
  /// outcomes. Queued-but-undispatched submissions are dropped; their
  /// handles observe [`PoolError::ResultChannelError`].
  pub async fn shutdown(self: Arc<Self>) {
    if !self.shutdown_token.is_cancelled() {
      info!(pool_name = %*self.pool_name, "Initiating pool shutdown.");
      self.shutdown_token.cancel();
      self.queue_tx.close();
    } else {
      info!(pool_name = %*self.pool_name, "Shutdown already in progress or initiated by Drop.");
    }

    let handle_to_await: Option<JoinHandle<()>> = self.worker_join_handle_internal.lock().take();

    if let Some(handle) = handle_to_await {
      info!(pool_name = %*self.pool_name, "Waiting for dispatch loop to join.");
      match handle.await {
        Ok(()) => info!(pool_name = %*self.pool_name, "Dispatch loop joined."),
        Err(join_error) => {
          error!(
            pool_name = %*self.pool_name,
            "Error joining dispatch loop during shutdown: {:?}",
            join_error
          );
        }
      }
    } else {
      trace!(pool_name = %*self.pool_name, "Dispatch loop handle already taken by a concurrent shutdown.");
    }
  }

  async fn run_dispatch_loop(
    pool_name: Arc<String>,
    task: TaskFn<A, R>,
    semaphore: Arc<Semaphore>,
    queue_rx: QueueConsumer<A, R>,
    working: Arc<AtomicUsize>,
    tasks_tokio_handle: TokioHandle,
    shutdown_token: CancellationToken,
  ) {
    info!(name = %*pool_name, "Dispatch loop started.");

    loop {
      let worker_slot = tokio::select! {
        biased;

        _ = shutdown_token.cancelled() => {
          info!(name = %*pool_name, "Shutdown signal received. Dispatch loop terminating.");
          break;
        }

        acquired = semaphore.clone().acquire_owned() => {
          match acquired {
            Ok(permit) => permit,
            Err(_) => {
              error!(name = %*pool_name, "Semaphore closed. Dispatch loop exiting.");
              break;
            }
          }
        }
      };
      trace!(
        name = %*pool_name,
        "Acquired worker slot. Available: {}",
        semaphore.available_permits()
      );

      let (request, queue_slot) = tokio::select! {
        biased;

        _ = shutdown_token.cancelled() => {
          info!(name = %*pool_name, "Shutdown signal received while waiting for work. Releasing worker slot.");
          drop(worker_slot);
          break;
        }

        recv_result = queue_rx.recv() => {
          match recv_result {
            Ok(parts) => parts,
            Err(_) => {
              info!(name = %*pool_name, "Task queue closed and drained. Dispatch loop terminating.");
              drop(worker_slot);
              break;
            }
          }
        }
      };

      let QueuedRequest {
        task_id,
        args,
        result_sender,
      } = request;

      debug!(name = %*pool_name, %task_id, "Dequeued request. Spawning execution.");
      working.fetch_add(1, AtomicOrdering::SeqCst);

      let task = task.clone();
      let working_for_settle = working.clone();
      let pool_name_for_execution = pool_name.clone();
      let pool_name_for_span = pool_name.clone();

      tasks_tokio_handle.spawn(
        async move {
          // Slots are held for the whole execution and release at the end of
          // this scope, after the settlement bookkeeping below.
          let _worker_slot = worker_slot;
          let _queue_slot = queue_slot;

          let outcome = match AssertUnwindSafe(async move { task(args).await }).catch_unwind().await {
            Ok(value) => {
              trace!(pool_name = %*pool_name_for_execution, %task_id, "Task settled.");
              Ok(value)
            }
            Err(_panic_payload) => {
              error!(pool_name = %*pool_name_for_execution, %task_id, "Task panicked during execution.");
              Err(PoolError::TaskPanicked)
            }
          };

          if result_sender.send(outcome).is_err() {
            warn!(
              pool_name = %*pool_name_for_execution,
              %task_id,
              "Result receiver for submission was dropped. Outcome may have been lost."
            );
          }

          working_for_settle.fetch_sub(1, AtomicOrdering::SeqCst);
        }
        .instrument(info_span!("pooled_task", pool_name = %*pool_name_for_span, %task_id)),
      );
    }

    info!(
      name = %*pool_name,
      "Dispatch loop stopped. Executions still in flight: {}",
      working.load(AtomicOrdering::SeqCst)
    );
  }
}

impl<A: Send + 'static, R: Send + 'static> Drop for TaskPool<A, R> {
  fn drop(&mut self) {
    if !self.shutdown_token.is_cancelled() {
      info!(
        pool_name = %*self.pool_name,
        "TaskPool instance dropped. Initiating implicit shutdown (signaling dispatch loop, closing queue)."
      );
      // Signal the loop and refuse further submissions. The loop's join
      // handle is not awaited here; Drop must not block.
      self.shutdown_token.cancel();
      self.queue_tx.close();
    } else {
      trace!(
        pool_name = %*self.pool_name,
        "Drop: shutdown already in progress or completed. No new signals sent."
      );
    }
  }
}
