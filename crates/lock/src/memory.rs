//! In-process lease lock.
//!
//! Backs tests and single-node deployments. Leases live in a mutex-protected
//! map keyed by lock name; an expired lease is treated as released.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::Result;
use crate::DistributedLock;

/// Granularity of the polling loop inside `try_acquire`.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// In-process [`DistributedLock`] implementation.
#[derive(Debug, Default)]
pub struct MemoryLock {
    /// lock name -> lease expiry
    leases: Mutex<HashMap<String, Instant>>,
}

impl MemoryLock {
    /// Create a new lock registry with no leases held.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` is currently held by a live lease.
    #[must_use]
    pub fn is_held(&self, name: &str) -> bool {
        let leases = self.leases.lock();
        leases.get(name).is_some_and(|expiry| *expiry > Instant::now())
    }

    /// Single non-waiting acquisition attempt.
    fn grab(&self, name: &str, ttl: Duration) -> bool {
        let mut leases = self.leases.lock();
        let now = Instant::now();
        match leases.get(name) {
            Some(expiry) if *expiry > now => false,
            _ => {
                leases.insert(name.to_string(), now + ttl);
                true
            }
        }
    }
}

#[async_trait]
impl DistributedLock for MemoryLock {
    async fn try_acquire(&self, name: &str, wait: Duration, ttl: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.grab(name, ttl) {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL.min(wait)).await;
        }
    }

    async fn release(&self, name: &str) -> Result<()> {
        self.leases.lock().remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(10);
    const NO_WAIT: Duration = Duration::from_millis(1);

    #[tokio::test]
    async fn acquire_then_conflict_then_release() {
        let lock = MemoryLock::new();

        assert!(lock.try_acquire("a", NO_WAIT, TTL).await.unwrap());
        assert!(lock.is_held("a"));
        assert!(!lock.try_acquire("a", NO_WAIT, TTL).await.unwrap());

        lock.release("a").await.unwrap();
        assert!(!lock.is_held("a"));
        assert!(lock.try_acquire("a", NO_WAIT, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn different_names_are_independent() {
        let lock = MemoryLock::new();
        assert!(lock.try_acquire("a", NO_WAIT, TTL).await.unwrap());
        assert!(lock.try_acquire("b", NO_WAIT, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn lease_expires_after_ttl() {
        let lock = MemoryLock::new();
        let ttl = Duration::from_millis(20);

        assert!(lock.try_acquire("a", NO_WAIT, ttl).await.unwrap());
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(!lock.is_held("a"));
        assert!(lock.try_acquire("a", NO_WAIT, TTL).await.unwrap());
    }

    #[tokio::test]
    async fn waiting_acquire_succeeds_once_released() {
        let lock = std::sync::Arc::new(MemoryLock::new());
        assert!(lock.try_acquire("a", NO_WAIT, TTL).await.unwrap());

        let waiter = {
            let lock = std::sync::Arc::clone(&lock);
            tokio::spawn(async move {
                lock.try_acquire("a", Duration::from_secs(2), TTL).await.unwrap()
            })
        };

        tokio::time::sleep(Duration::from_millis(30)).await;
        lock.release("a").await.unwrap();

        assert!(waiter.await.unwrap(), "waiter should win the freed lock");
    }

    #[tokio::test]
    async fn release_of_unheld_lock_is_noop() {
        let lock = MemoryLock::new();
        lock.release("never-held").await.unwrap();
    }
}
