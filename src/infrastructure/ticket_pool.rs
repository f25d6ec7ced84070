//! Ticket Pool
//!
//! Counting semaphore that bounds how many lookups are in flight at once.

use crate::infrastructure::BatchContext;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Clamp a requested worker count to `[1, available_parallelism]`.
pub fn clamp_workers(requested: i64, available_parallelism: usize) -> usize {
    let upper = available_parallelism.max(1);
    match usize::try_from(requested) {
        Ok(n) => n.clamp(1, upper),
        Err(_) => 1,
    }
}

/// Bounded pool of tickets.
///
/// A task holds a ticket for the duration of its I/O. Using the pool
/// after `close()` is a programming error and panics.
pub struct TicketPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
    closed: Arc<AtomicBool>,
}

impl TicketPool {
    /// Create a pool with `capacity` tickets.
    ///
    /// # Panics
    /// Panics when `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "ticket pool capacity must be at least 1");
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of tickets currently handed out.
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Wait for a ticket.
    ///
    /// # Panics
    /// Panics when the pool has been closed.
    pub async fn acquire(&self) -> Ticket {
        self.assert_open("acquire");
        match self.semaphore.clone().acquire_owned().await {
            Ok(permit) => Ticket {
                permit,
                closed: self.closed.clone(),
            },
            Err(_) => panic!("ticket pool closed while waiting for a ticket"),
        }
    }

    /// Wait for a ticket unless the batch is cancelled first.
    ///
    /// Returns `None` without taking a ticket once `ctx` is cancelled.
    pub async fn acquire_until_cancelled(&self, ctx: &BatchContext) -> Option<Ticket> {
        ctx.run(self.acquire()).await
    }

    /// Invalidate the pool. Later acquires and releases panic.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.semaphore.close();
    }

    fn assert_open(&self, op: &str) {
        if self.is_closed() {
            panic!("ticket pool used after close ({op})");
        }
    }
}

/// A held ticket. Returned to the pool by `release()` or on drop.
pub struct Ticket {
    permit: OwnedSemaphorePermit,
    closed: Arc<AtomicBool>,
}

impl Ticket {
    /// Return the ticket to its pool.
    ///
    /// # Panics
    /// Panics when the pool has been closed.
    pub fn release(self) {
        if self.closed.load(Ordering::SeqCst) {
            panic!("ticket pool used after close (release)");
        }
        drop(self.permit);
    }
}
