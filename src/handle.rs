use crate::error::PoolError;

use fibre::oneshot;
use tracing;

/// A handle to one submission accepted by a [`TaskPool`](crate::TaskPool).
///
/// Awaiting it yields whatever the wrapped task produced for this
/// submission's arguments, untouched by the pool.
#[derive(Debug)]
pub struct SubmissionHandle<R: Send + 'static> {
  pub(crate) task_id: u64,
  pub(crate) result_receiver: Option<oneshot::Receiver<Result<R, PoolError>>>,
}

impl<R: Send + 'static> SubmissionHandle<R> {
  /// Returns the unique ID of this submission.
  pub fn id(&self) -> u64 {
    self.task_id
  }

  /// Awaits the settlement of this submission and returns the task's output.
  ///
  /// # Errors
  /// Returns `PoolError::TaskPanicked` if the task panicked while executing.
  /// Returns `PoolError::ResultChannelError` if the pool dropped the request
  /// without settling it (e.g. it was still queued when the pool shut down).
  /// Returns `PoolError::ResultUnavailable` if the result was already taken.
  pub async fn await_result(mut self) -> Result<R, PoolError> {
    match self.result_receiver.take() {
      Some(rx) => match rx.recv().await {
        Ok(outcome) => outcome,
        Err(recv_error) => {
          tracing::warn!(task_id = %self.task_id, "Result channel receive error: {}", recv_error);
          Err(PoolError::ResultChannelError(format!(
            "Submission (id: {}) result channel unexpectedly closed: {}",
            self.task_id, recv_error
          )))
        }
      },
      None => Err(PoolError::ResultUnavailable),
    }
  }
}
