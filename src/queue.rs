use crate::capacity_gate::{CapacityGate, GatePermit};
use crate::error::PoolError;
use crate::task::QueuedRequest;

use std::fmt;
use std::sync::Arc;

use fibre::mpsc::{
  self, UnboundedAsyncReceiver as AsyncReceiver, UnboundedAsyncSender as AsyncSender, RecvError,
};

/// An internal message type pairing a queued request with the admission slot
/// it occupies.
///
/// The permit is not released at dequeue time: the consumer hands it onward
/// so it stays claimed until the execution settles. A slot therefore counts
/// work that is queued *or* in flight, which is what makes "worker limit +
/// queue limit" the exact number of submissions admitted while none
/// complete.
pub(crate) struct QueueMessage<A: Send + 'static, R: Send + 'static> {
  request: QueuedRequest<A, R>,
  permit: GatePermit,
}

impl<A: Send + 'static, R: Send + 'static> fmt::Debug for QueueMessage<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueueMessage")
      .field("task_id", &self.request.task_id)
      .finish_non_exhaustive()
  }
}

/// A FIFO, multi-producer, single-consumer queue of pending requests.
///
/// Capacity is enforced by a [`CapacityGate`] layered over an unbounded
/// `fibre::mpsc` channel: admission either succeeds immediately or fails
/// immediately, and the channel itself never blocks a sender.
#[derive(Debug)]
pub(crate) struct TaskQueue<A: Send + 'static, R: Send + 'static> {
  tx: AsyncSender<QueueMessage<A, R>>,
  rx: AsyncReceiver<QueueMessage<A, R>>,
  gate: Arc<CapacityGate>,
}

impl<A: Send + 'static, R: Send + 'static> TaskQueue<A, R> {
  /// Creates a queue admitting at most `capacity` unsettled requests,
  /// or unbounded when `capacity` is `None`.
  pub(crate) fn new(capacity: Option<usize>) -> Self {
    let (tx, rx) = mpsc::unbounded_async();
    Self {
      tx,
      rx,
      gate: CapacityGate::new(capacity),
    }
  }

  /// Splits the queue into its producer and consumer halves.
  pub(crate) fn split(self) -> (QueueProducer<A, R>, QueueConsumer<A, R>) {
    (
      QueueProducer {
        tx: self.tx,
        gate: self.gate,
      },
      QueueConsumer { rx: self.rx },
    )
  }
}

/// The producer handle for the `TaskQueue`. It can be cloned and shared
/// across submission sites.
pub(crate) struct QueueProducer<A: Send + 'static, R: Send + 'static> {
  tx: AsyncSender<QueueMessage<A, R>>,
  pub(crate) gate: Arc<CapacityGate>,
}

impl<A: Send + 'static, R: Send + 'static> Clone for QueueProducer<A, R> {
  fn clone(&self) -> Self {
    Self {
      tx: self.tx.clone(),
      gate: self.gate.clone(),
    }
  }
}

impl<A: Send + 'static, R: Send + 'static> fmt::Debug for QueueProducer<A, R> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("QueueProducer")
      .field("len", &self.len())
      .field("gate_slots", &self.gate.available())
      .finish_non_exhaustive()
  }
}

/// The consumer handle for the `TaskQueue`. It cannot be cloned, enforcing
/// the single-consumer pattern the dispatch loop relies on for FIFO order.
#[derive(Debug)]
pub(crate) struct QueueConsumer<A: Send + 'static, R: Send + 'static> {
  rx: AsyncReceiver<QueueMessage<A, R>>,
}

impl<A: Send + 'static, R: Send + 'static> QueueProducer<A, R> {
  /// Appends a request to the queue, or rejects it without queuing.
  ///
  /// Returns `PoolError::QueueFull` when the gate has no free slot. The
  /// underlying channel is unbounded, so once a slot is claimed the send
  /// itself completes without waiting. On a send failure the message (and
  /// the permit inside it) is dropped, returning the slot.
  pub(crate) async fn try_send(&self, request: QueuedRequest<A, R>) -> Result<(), PoolError> {
    let Some(permit) = self.gate.try_acquire() else {
      return Err(PoolError::QueueFull);
    };

    let message = QueueMessage { request, permit };
    if self.tx.send(message).await.is_ok() {
      Ok(())
    } else {
      Err(PoolError::QueueSendChannelClosed)
    }
  }

  /// Closes the sending side of the queue.
  pub(crate) fn close(&self) {
    let _ = self.tx.close();
  }

  /// Returns `true` if the queue's sender has been closed.
  pub(crate) fn is_closed(&self) -> bool {
    self.tx.is_closed()
  }

  /// Number of requests currently queued (admitted but not yet dequeued).
  pub(crate) fn len(&self) -> usize {
    self.tx.len()
  }
}

impl<A: Send + 'static, R: Send + 'static> QueueConsumer<A, R> {
  /// Receives the oldest queued request together with its admission permit.
  ///
  /// Ownership of the permit passes to the caller, which is expected to keep
  /// it alive until the request's execution settles.
  pub(crate) async fn recv(&self) -> Result<(QueuedRequest<A, R>, GatePermit), RecvError> {
    let message = self.rx.recv().await?;
    Ok((message.request, message.permit))
  }
}
