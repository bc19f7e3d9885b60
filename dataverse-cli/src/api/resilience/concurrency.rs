//! Concurrency limiter implementation
//!
//! Provides a semaphore-based limiter bounding the number of $batch calls
//! in flight at once, so the client never exceeds the admitted request rate
//! of the service.

use log::debug;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Semaphore-based limiter for concurrent batch submissions
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_concurrent_batches: usize,
    batches_admitted: Arc<AtomicU64>,
    batches_waited: Arc<AtomicU64>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent_batches: usize) -> Self {
        let permits = max_concurrent_batches.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
            max_concurrent_batches: permits,
            batches_admitted: Arc::new(AtomicU64::new(0)),
            batches_waited: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Acquire a permit for submitting a batch. Waits if at capacity.
    /// Returns an owned permit that releases automatically when dropped.
    pub async fn acquire(&self) -> OwnedSemaphorePermit {
        if self.semaphore.available_permits() == 0 {
            self.batches_waited.fetch_add(1, Ordering::Relaxed);
            debug!(
                "Concurrency limiter: waiting for permit ({} in flight)",
                self.max_concurrent_batches
            );
        }

        // The semaphore is never closed, so acquire cannot fail.
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .unwrap_or_else(|_| unreachable!("limiter semaphore closed"));
        self.batches_admitted.fetch_add(1, Ordering::Relaxed);
        permit
    }

    /// Try to acquire a permit without waiting.
    /// Returns None if the ceiling is reached.
    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        match self.semaphore.clone().try_acquire_owned() {
            Ok(permit) => {
                self.batches_admitted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    "Concurrency limiter: acquired permit ({}/{} in flight)",
                    self.max_concurrent_batches - self.semaphore.available_permits(),
                    self.max_concurrent_batches
                );
                Some(permit)
            }
            Err(_) => None,
        }
    }

    /// Number of batches that can start immediately
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    pub fn max_concurrent_batches(&self) -> usize {
        self.max_concurrent_batches
    }

    /// Get current statistics
    pub fn stats(&self) -> ConcurrencyStats {
        ConcurrencyStats {
            available_permits: self.available_permits(),
            max_concurrent_batches: self.max_concurrent_batches,
            batches_admitted: self.batches_admitted.load(Ordering::Relaxed),
            batches_waited: self.batches_waited.load(Ordering::Relaxed),
        }
    }
}

/// Statistics for the concurrency limiter
#[derive(Debug, Clone)]
pub struct ConcurrencyStats {
    /// Number of permits currently available
    pub available_permits: usize,
    /// Maximum concurrent batches allowed
    pub max_concurrent_batches: usize,
    /// Total permits handed out since creation
    pub batches_admitted: u64,
    /// Number of times a submission had to wait for a permit
    pub batches_waited: u64,
}

impl ConcurrencyStats {
    /// Number of permits currently in use
    pub fn in_flight(&self) -> usize {
        self.max_concurrent_batches
            .saturating_sub(self.available_permits)
    }
}
