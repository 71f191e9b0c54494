use crate::error::{CaptureError, Result};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Bounds the number of rendering contexts alive at once.
///
/// Callers beyond the bound wait in FIFO order rather than failing.
#[derive(Debug, Clone)]
pub struct ContextPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl ContextPool {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    pub async fn acquire(&self) -> Result<ContextLease> {
        if self.semaphore.available_permits() == 0 {
            debug!(capacity = self.capacity, "All rendering contexts busy, queueing");
        }
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| CaptureError::Engine("rendering context pool is closed".to_string()))?;
        debug!(active = self.active(), "Rendering context acquired");
        Ok(ContextLease { _permit: permit })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of leases currently held.
    pub fn active(&self) -> usize {
        self.capacity - self.semaphore.available_permits()
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(4)
    }
}

/// One slot of the pool. Released on drop, whichever way the holder exits.
#[derive(Debug)]
pub struct ContextLease {
    _permit: OwnedSemaphorePermit,
}

impl Drop for ContextLease {
    fn drop(&mut self) {
        debug!("Rendering context released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_capacity_is_raised_to_one() {
        let pool = ContextPool::new(0);
        assert_eq!(pool.capacity(), 1);
    }

    #[tokio::test]
    async fn test_lease_released_on_drop() {
        let pool = ContextPool::new(2);
        let lease = pool.acquire().await.unwrap();
        assert_eq!(pool.active(), 1);
        drop(lease);
        assert_eq!(pool.active(), 0);
    }

    #[tokio::test]
    async fn test_acquire_queues_beyond_capacity() {
        let pool = ContextPool::new(1);
        let first = pool.acquire().await.unwrap();

        let waiting = tokio::time::timeout(Duration::from_millis(50), pool.acquire()).await;
        assert!(waiting.is_err(), "second acquire should wait while the pool is full");

        drop(first);
        let second = tokio::time::timeout(Duration::from_millis(500), pool.acquire()).await;
        assert!(second.is_ok(), "second acquire should proceed once a lease is released");
    }
}
