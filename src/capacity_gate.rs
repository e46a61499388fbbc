use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// An atomic admission counter bounding how much work the pool will hold at
/// once (queued plus in-flight).
///
/// Unlike a semaphore there is no waiting: `try_acquire` either hands out a
/// slot immediately or reports exhaustion, which is what lets submission
/// reject synchronously instead of applying backpressure.
#[derive(Debug)]
pub(crate) struct CapacityGate {
  /// `None` means the gate is unbounded and every acquisition succeeds.
  slots: Option<AtomicUsize>,
}

impl CapacityGate {
  pub(crate) fn new(capacity: Option<usize>) -> Arc<Self> {
    Arc::new(Self {
      slots: capacity.map(AtomicUsize::new),
    })
  }

  /// Claims a slot, or returns `None` when the gate is exhausted.
  /// The slot is returned when the permit is dropped.
  pub(crate) fn try_acquire(self: &Arc<Self>) -> Option<GatePermit> {
    if let Some(slots) = &self.slots {
      let mut current = slots.load(Ordering::Acquire);
      loop {
        if current == 0 {
          return None;
        }
        match slots.compare_exchange_weak(current, current - 1, Ordering::AcqRel, Ordering::Acquire) {
          Ok(_) => break,
          Err(observed) => current = observed,
        }
      }
    }
    Some(GatePermit { gate: self.clone() })
  }

  /// Remaining free slots, or `None` for an unbounded gate.
  pub(crate) fn available(&self) -> Option<usize> {
    self.slots.as_ref().map(|slots| slots.load(Ordering::Acquire))
  }

  fn release(&self) {
    if let Some(slots) = &self.slots {
      slots.fetch_add(1, Ordering::Release);
    }
  }
}

/// A claimed admission slot. Dropping it returns the slot to the gate.
///
/// The permit travels with its request: queued first, then held by the
/// spawned execution, so the slot is only freed once the submission settles.
#[derive(Debug)]
pub(crate) struct GatePermit {
  gate: Arc<CapacityGate>,
}

impl Drop for GatePermit {
  fn drop(&mut self) {
    self.gate.release();
  }
}
