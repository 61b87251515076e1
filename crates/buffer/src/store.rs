//! Persistence collaborator.
//!
//! The store is the single source of truth: no component keeps
//! authoritative in-memory state. All guarded mutations go through
//! [`BufferStore::compare_and_set`], an atomic single-entry conditional
//! update keyed on the entry's expected status and version, so two
//! concurrent passes can never double-transition the same entry.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::entry::{BufferEntry, EntryId, EntryStatus, PartitionKey};
use crate::error::Result;

/// Persistent store for buffer entries.
#[async_trait]
pub trait BufferStore: Send + Sync {
    /// Insert a new entry, assigning its [`EntryId`] and initial
    /// version. Fails if `external_name` was ever used before,
    /// including by retired entries.
    async fn insert(&self, entry: BufferEntry) -> Result<BufferEntry>;

    /// Fetch an entry by ID.
    async fn get(&self, id: EntryId) -> Result<Option<BufferEntry>>;

    /// The oldest-by-creation-time `Available` entry in `partition`.
    async fn find_oldest_available(&self, partition: &PartitionKey)
    -> Result<Option<BufferEntry>>;

    /// Up to `batch` `Creating` entries ordered by `last_sync_at`
    /// ascending, never-synced entries first, so every stuck entry
    /// eventually gets re-examined.
    async fn find_stale_creating(&self, batch: usize) -> Result<Vec<BufferEntry>>;

    /// All entries in `status` whose last status change precedes
    /// `older_than`.
    async fn find_expired(
        &self,
        status: EntryStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<BufferEntry>>;

    /// Number of entries in `partition` with the given status.
    async fn count_by_status(&self, partition: &PartitionKey, status: EntryStatus)
    -> Result<usize>;

    /// All entries with the given status, across partitions.
    async fn list_by_status(&self, status: EntryStatus) -> Result<Vec<BufferEntry>>;

    /// Persist a sync-poll timestamp for `id`, immediately.
    ///
    /// Deliberately outside the version guard: the sync timestamp is
    /// fairness bookkeeping, not guarded state, and must survive a
    /// crash mid-batch so the same entries are not re-polled forever.
    async fn touch_sync_time(&self, id: EntryId, now: DateTime<Utc>) -> Result<()>;

    /// Conditionally persist `entry`.
    ///
    /// Succeeds only if the stored entry still has status
    /// `expected` and the same version as `entry`; on success the
    /// store bumps the version and writes it back into `entry`.
    /// Returns `Ok(false)` when another process won the race.
    async fn compare_and_set(
        &self,
        entry: &mut BufferEntry,
        expected: EntryStatus,
    ) -> Result<bool>;
}
