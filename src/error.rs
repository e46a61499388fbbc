use thiserror::Error;

/// Errors that can occur within the `futures_throttle` pool.
///
/// Outcomes produced by the wrapped task itself are not represented here:
/// the pool hands the task's output back to the caller verbatim, so a task
/// that can fail should produce a `Result` and callers match on it after
/// unwrapping the pool layer.
#[derive(Error, Debug, PartialEq)]
pub enum PoolError {
  /// The submission arrived while the queue was at its configured limit.
  /// The task is never invoked for a rejected submission.
  #[error("exceeding queue capacity")]
  QueueFull,

  #[error("Submitted task future panicked")]
  TaskPanicked,

  #[error("Pool is shutting down or already shut down, cannot accept new submissions")]
  PoolShuttingDown,

  #[error("Pool's internal task queue (sender side) was closed unexpectedly")]
  QueueSendChannelClosed,

  #[error("Submission result channel error (outcome was never delivered): {0}")]
  ResultChannelError(String),

  #[error("Submission result already taken or channel was not available")]
  ResultUnavailable,
}
