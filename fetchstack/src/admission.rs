//! Admission control for concurrently active downloads.
//!
//! Every download acquires a [`TransportSlot`] before its request reaches the
//! transport. With a limit configured, slots come from a semaphore and excess
//! downloads wait their turn; without a limit, acquisition never waits. The
//! in-flight counter is tracked either way.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Shared limiter handed to every download a manager starts.
#[derive(Debug)]
pub(crate) struct Admission {
    semaphore: Option<Arc<Semaphore>>,
    limit: Option<usize>,
    in_flight: Arc<AtomicUsize>,
}

impl Admission {
    /// Creates a limiter. `Some(0)` is treated as a limit of one.
    pub(crate) fn new(limit: Option<usize>) -> Self {
        let limit = limit.map(|n| n.max(1));
        Self {
            semaphore: limit.map(|n| Arc::new(Semaphore::new(n))),
            limit,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub(crate) fn unlimited() -> Self {
        Self::new(None)
    }

    pub(crate) fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Number of slots currently held.
    pub(crate) fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Waits for a slot.
    pub(crate) async fn acquire(&self) -> TransportSlot {
        let permit = match &self.semaphore {
            // The semaphore is never closed, so a failed acquire only
            // degrades to unlimited admission.
            Some(semaphore) => Arc::clone(semaphore).acquire_owned().await.ok(),
            None => None,
        };

        self.in_flight.fetch_add(1, Ordering::SeqCst);
        TransportSlot {
            _permit: permit,
            in_flight: Arc::clone(&self.in_flight),
        }
    }
}

/// A held admission slot. Released on drop.
#[derive(Debug)]
pub(crate) struct TransportSlot {
    _permit: Option<OwnedSemaphorePermit>,
    in_flight: Arc<AtomicUsize>,
}

impl Drop for TransportSlot {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
