use std::sync::Arc;
use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Hands out at most `capacity` permits at a time.
///
/// Permits are owned so they can travel into a spawned dispatch task and are
/// returned when dropped, whatever the outcome of the call.
#[derive(Clone, Debug)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ConcurrencyLimiter {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free permit. Fails only once the limiter is closed.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, AcquireError> {
        Arc::clone(&self.semaphore).acquire_owned().await
    }

    pub fn try_acquire(&self) -> Option<OwnedSemaphorePermit> {
        Arc::clone(&self.semaphore).try_acquire_owned().ok()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Permits currently held.
    #[inline]
    pub fn in_use(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}
