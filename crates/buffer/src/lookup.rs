//! Consumer-side lookup used by garbage collection.

use async_trait::async_trait;

use crate::error::Result;

/// Answers whether the consumer-side resource owning an assigned entry
/// has reached a final "deleted / no longer in use" state.
///
/// Garbage collection only *lists* such entries; teardown is the job of
/// an external consumer, kept separate so the deletion side effect is
/// independently retryable.
#[async_trait]
pub trait AssignmentLookup: Send + Sync {
    /// Whether the resource named `external_name` is permanently
    /// retired on the consumer side.
    async fn is_retired(&self, external_name: &str) -> Result<bool>;
}

/// Lookup that never retires anything.
///
/// The default when the embedder has no garbage-collection consumer
/// wired up; `garbage_collect` then always returns an empty list.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLookup;

#[async_trait]
impl AssignmentLookup for NullLookup {
    async fn is_retired(&self, _external_name: &str) -> Result<bool> {
        Ok(false)
    }
}
