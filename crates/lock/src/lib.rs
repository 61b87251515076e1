//! # Cumulus Lock
//!
//! Named mutual-exclusion locks shared by every process that works
//! against the same backing store. A lock is a *lease*: it expires on
//! its own after a TTL, so a crashed holder cannot wedge the fleet.
//!
//! Callers that must eventually get the lock loop via
//! [`acquire_with_backoff`], which spaces acquisition rounds with
//! bounded exponential backoff instead of busy-waiting.

pub mod backoff;
pub mod error;
pub mod memory;

pub use backoff::Backoff;
pub use error::{Error, Result};
pub use memory::MemoryLock;

use std::time::Duration;

use async_trait::async_trait;

/// A named cross-process mutual-exclusion primitive.
///
/// Implementations are expected to be shared between processes (a
/// coordination store, a database named lock, a lease table).
/// [`MemoryLock`] covers tests and single-node deployments.
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// Attempt to acquire the lock `name`, waiting at most `wait` for a
    /// current holder to release it.
    ///
    /// On success the caller holds a lease that expires after `ttl`
    /// unless [`release`](Self::release)d earlier. Returns `Ok(false)`
    /// when the lock was still held after `wait` elapsed.
    async fn try_acquire(&self, name: &str, wait: Duration, ttl: Duration) -> Result<bool>;

    /// Release the lock `name`.
    ///
    /// Idempotent: releasing a lock that is not held (or that already
    /// expired) is a no-op.
    async fn release(&self, name: &str) -> Result<()>;
}

/// Options governing one logical acquisition.
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// How long a single acquisition round may wait on the holder.
    pub acquire_timeout: Duration,
    /// Lease TTL granted on success.
    pub lease_ttl: Duration,
    /// Delay policy between failed acquisition rounds.
    pub backoff: Backoff,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            acquire_timeout: Duration::from_secs(1),
            lease_ttl: Duration::from_secs(30),
            backoff: Backoff::default(),
        }
    }
}

impl LockOptions {
    /// Validate the options, returning an error if inconsistent.
    pub fn validate(&self) -> Result<()> {
        if self.acquire_timeout.is_zero() {
            return Err(Error::configuration("acquire_timeout must be greater than zero"));
        }
        if self.lease_ttl < self.acquire_timeout {
            return Err(Error::configuration(format!(
                "lease_ttl ({:?}) must not be shorter than acquire_timeout ({:?})",
                self.lease_ttl, self.acquire_timeout
            )));
        }
        Ok(())
    }
}

/// Acquire `name`, retrying failed rounds with exponential backoff.
///
/// Each round waits up to `options.acquire_timeout` on the current
/// holder; between rounds the task sleeps `options.backoff.delay_for`.
/// The loop runs until the lock is acquired — callers bound the overall
/// wait with their own timeout or cancellation if they need one.
pub async fn acquire_with_backoff(
    lock: &dyn DistributedLock,
    name: &str,
    options: &LockOptions,
) -> Result<()> {
    let mut round: u32 = 1;
    loop {
        if lock
            .try_acquire(name, options.acquire_timeout, options.lease_ttl)
            .await?
        {
            return Ok(());
        }
        let delay = options.backoff.delay_for(round);
        tracing::debug!(lock = %name, round, ?delay, "lock contended, backing off");
        tokio::time::sleep(delay).await;
        round = round.saturating_add(1);
    }
}
