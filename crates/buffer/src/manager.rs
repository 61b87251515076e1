//! Buffer manager — refill, reconciliation, reaping, and locked assignment.
//!
//! All five entry points operate against the shared [`BufferStore`] and
//! are safe under arbitrary concurrent invocation across service
//! instances: `assign` serializes its reserve step behind a
//! per-partition cross-process lock, and every other mutation goes
//! through the store's compare-and-set.

use std::collections::HashMap;
use std::sync::Arc;

use cumulus_lock::{DistributedLock, LockOptions, acquire_with_backoff};
use sha2::{Digest, Sha256};

use crate::clock::Clock;
use crate::config::BufferConfig;
use crate::entry::{BufferEntry, EntryStatus, PartitionKey};
use crate::error::{Error, Result};
use crate::lookup::{AssignmentLookup, NullLookup};
use crate::metrics::{GaugeSink, MetricsSink};
use crate::provisioner::{GrantOutcome, ProvisionStatus, Provisioner};
use crate::store::BufferStore;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of one refill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefillReport {
    /// Entries inserted in `Creating` this run.
    pub attempts: usize,
    /// Attempts whose provisioner kickoff also succeeded.
    pub created: usize,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Entries polled this run.
    pub polled: usize,
    /// Entries that became `Available`.
    pub available: usize,
    /// Entries that failed externally and became `Error`.
    pub errored: usize,
}

/// Outcome of one reaping run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReapReport {
    /// Stuck entries retired to `Error`.
    pub reaped: usize,
}

/// Per-status occupancy counts for one partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolStatus {
    /// The partition the counts are for.
    pub partition: PartitionKey,
    /// Entry count per status.
    pub counts: HashMap<EntryStatus, usize>,
}

impl PoolStatus {
    /// Count for one status.
    #[must_use]
    pub fn count(&self, status: EntryStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// The externally-visible pool size: entries ready to hand out.
    #[must_use]
    pub fn available(&self) -> usize {
        self.count(EntryStatus::Available)
    }

    /// Entries occupying pool capacity (`Creating + Available + Assigning`).
    #[must_use]
    pub fn occupancy(&self) -> usize {
        EntryStatus::ALL
            .into_iter()
            .filter(|s| s.counts_toward_occupancy())
            .map(|s| self.count(s))
            .sum()
    }
}

// ---------------------------------------------------------------------------
// BufferManager
// ---------------------------------------------------------------------------

/// Orchestrates the billing-project buffer against its collaborators.
///
/// `refill`, `sync`, and `reap` are driven by a periodic scheduler;
/// `assign`, `status`, and `garbage_collect` by request handlers. All
/// collaborators are injected, so tests run against the fakes in
/// [`crate::testing`].
pub struct BufferManager {
    config: BufferConfig,
    store: Arc<dyn BufferStore>,
    provisioner: Arc<dyn Provisioner>,
    lock: Arc<dyn DistributedLock>,
    clock: Arc<dyn Clock>,
    metrics: Arc<dyn MetricsSink>,
    lookup: Arc<dyn AssignmentLookup>,
    lock_options: LockOptions,
}

impl BufferManager {
    /// Create a manager over the given collaborators.
    ///
    /// # Errors
    /// Returns an error if `config` is invalid.
    pub fn new(
        config: BufferConfig,
        store: Arc<dyn BufferStore>,
        provisioner: Arc<dyn Provisioner>,
        lock: Arc<dyn DistributedLock>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            provisioner,
            lock,
            clock,
            metrics: Arc::new(GaugeSink),
            lookup: Arc::new(NullLookup),
            lock_options: LockOptions::default(),
        })
    }

    /// Replace the default `metrics`-facade sink.
    #[must_use]
    pub fn with_metrics(mut self, metrics: Arc<dyn MetricsSink>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Wire up the consumer-side lookup used by garbage collection.
    #[must_use]
    pub fn with_lookup(mut self, lookup: Arc<dyn AssignmentLookup>) -> Self {
        self.lookup = lookup;
        self
    }

    /// Override the assignment-lock acquisition policy.
    #[must_use]
    pub fn with_lock_options(mut self, lock_options: LockOptions) -> Self {
        self.lock_options = lock_options;
        self
    }

    // -- refill -------------------------------------------------------------

    /// Top up `partition` with new provisioning attempts.
    ///
    /// Makes up to `refill_attempts_per_run` creation attempts, but
    /// re-checks occupancy before every single one so a burst of
    /// external latency cannot overshoot the partition's capacity. A
    /// provisioner failure on one attempt is logged and does not abort
    /// the rest; the inserted `Creating` row is reconciled by a later
    /// `sync`/`reap` pass.
    pub async fn refill(&self, partition: &PartitionKey) -> Result<RefillReport> {
        self.publish_occupancy(partition).await?;

        let capacity = self.config.capacity_for(partition);
        let mut report = RefillReport::default();

        for _ in 0..self.config.refill_attempts_per_run {
            let occupancy = self.occupancy(partition).await?;
            if occupancy >= capacity {
                tracing::info!(%partition, occupancy, capacity, "buffer at capacity");
                break;
            }

            let external_name = self.generate_external_name();
            let entry =
                BufferEntry::new(external_name.clone(), partition.clone(), self.clock.now());
            self.store.insert(entry).await?;
            report.attempts += 1;

            match self.provisioner.create(&external_name).await {
                Ok(()) => {
                    report.created += 1;
                    tracing::info!(entry = %external_name, %partition, "created new billing project");
                }
                Err(err) => {
                    tracing::warn!(
                        entry = %external_name,
                        error = %err,
                        "provisioning kickoff failed; entry left for sync/reap"
                    );
                }
            }
        }

        Ok(report)
    }

    // -- sync ---------------------------------------------------------------

    /// Reconcile `Creating` entries against the external provisioner.
    ///
    /// Polls up to `sync_batch_size` entries, least-recently-synced
    /// first. The sync timestamp is persisted before the poll so a
    /// crash mid-batch cannot starve the same entries forever. A
    /// failure polling one entry never blocks reconciliation of the
    /// others.
    pub async fn sync(&self) -> Result<SyncReport> {
        let batch = self
            .store
            .find_stale_creating(self.config.sync_batch_size)
            .await?;
        let mut report = SyncReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let total = batch.len();
        for mut entry in batch {
            let now = self.clock.now();
            entry.record_sync(now);
            self.store.touch_sync_time(entry.id, now).await?;
            report.polled += 1;

            match self.provisioner.status(&entry.external_name).await {
                Ok(ProvisionStatus::Ready) => {
                    entry.transition_to(EntryStatus::Available, self.clock.now())?;
                    if self
                        .store
                        .compare_and_set(&mut entry, EntryStatus::Creating)
                        .await?
                    {
                        report.available += 1;
                        tracing::info!(entry = %entry.external_name, "billing project available");
                    }
                }
                Ok(ProvisionStatus::Error) => {
                    entry.transition_to(EntryStatus::Error, self.clock.now())?;
                    if self
                        .store
                        .compare_and_set(&mut entry, EntryStatus::Creating)
                        .await?
                    {
                        report.errored += 1;
                        tracing::warn!(entry = %entry.external_name, "billing project creation failed externally");
                    }
                }
                Ok(status) => {
                    // Includes NotFound: only the sync timestamp advances,
                    // which is what eventually trips the creating reap.
                    tracing::debug!(entry = %entry.external_name, ?status, "still provisioning");
                }
                Err(err) => {
                    tracing::warn!(
                        entry = %entry.external_name,
                        error = %err,
                        "status poll failed; entry left for a later pass"
                    );
                }
            }
        }

        tracing::info!(
            polled = report.polled,
            total,
            available = report.available,
            errored = report.errored,
            "synchronized creating entries"
        );
        Ok(report)
    }

    // -- reap ---------------------------------------------------------------

    /// Retire entries stuck past their grace period to `Error`.
    ///
    /// A `Creating` entry is stuck when reconciliation has polled it
    /// (`last_sync_at` set) and the poll trails the status change by
    /// more than the creating grace period. An `Assigning` entry is
    /// stuck when its age alone exceeds the assigning grace period,
    /// since `Assigning` tracks internal state rather than the
    /// provisioner's.
    pub async fn reap(&self) -> Result<ReapReport> {
        let now = self.clock.now();
        let creating_grace = to_chrono(self.config.creating_grace);
        let assigning_grace = to_chrono(self.config.assigning_grace);

        let mut stuck: Vec<BufferEntry> = self
            .store
            .find_expired(EntryStatus::Creating, now - creating_grace)
            .await?
            .into_iter()
            .filter(|e| e.creating_sync_lag().is_some_and(|lag| lag > creating_grace))
            .collect();
        stuck.extend(
            self.store
                .find_expired(EntryStatus::Assigning, now - assigning_grace)
                .await?,
        );

        let mut report = ReapReport::default();
        for mut entry in stuck {
            let from = entry.status;
            entry.transition_to(EntryStatus::Error, self.clock.now())?;
            // A lost race means another process already moved the entry.
            if self.store.compare_and_set(&mut entry, from).await? {
                tracing::warn!(entry = %entry.external_name, %from, "reaped stuck entry to ERROR");
                report.reaped += 1;
            }
        }
        Ok(report)
    }

    // -- assign -------------------------------------------------------------

    /// Hand out the oldest `Available` entry in `partition` to `subject`.
    ///
    /// The reserve step (pick oldest, mark `Assigning`) runs under the
    /// partition's cross-process lock; the slow grant call runs after
    /// the lock is released so it never blocks other assignments. On
    /// grant failure the entry is deliberately *not* reverted to
    /// `Available` — a rollback would reopen the double-assignment race
    /// the lock exists to prevent. The entry stays `Assigning` until
    /// [`reap`](Self::reap) retires it, and the caller retries against
    /// a fresh entry.
    pub async fn assign(&self, partition: &PartitionKey, subject: &str) -> Result<BufferEntry> {
        let lock_name = format!("cumulus/assign/{partition}");
        acquire_with_backoff(self.lock.as_ref(), &lock_name, &self.lock_options).await?;
        let reserved = self.reserve(partition).await;
        if let Err(err) = self.lock.release(&lock_name).await {
            // The lease TTL reclaims the lock; don't fail the request.
            tracing::warn!(lock = %lock_name, error = %err, "failed to release assignment lock");
        }
        let mut entry = reserved?;

        match self.provisioner.grant(subject, &entry.external_name).await {
            Ok(outcome) => {
                if outcome == GrantOutcome::AlreadyMember {
                    tracing::debug!(entry = %entry.external_name, subject, "subject was already a member");
                }
                entry.mark_assigned(subject, self.clock.now())?;
                if !self
                    .store
                    .compare_and_set(&mut entry, EntryStatus::Assigning)
                    .await?
                {
                    return Err(Error::store(
                        "compare_and_set",
                        format!("entry '{}' changed during grant", entry.external_name),
                    ));
                }
                tracing::info!(entry = %entry.external_name, subject, "assigned billing project");
                Ok(entry)
            }
            Err(err) => {
                tracing::warn!(
                    entry = %entry.external_name,
                    subject,
                    error = %err,
                    "grant failed; entry left ASSIGNING for reaping"
                );
                Err(err)
            }
        }
    }

    /// Lock-protected pick-and-mark step of [`assign`](Self::assign).
    async fn reserve(&self, partition: &PartitionKey) -> Result<BufferEntry> {
        let Some(mut entry) = self.store.find_oldest_available(partition).await? else {
            tracing::error!(%partition, "assignment requested while buffer was empty");
            return Err(Error::EmptyPool {
                partition: partition.clone(),
            });
        };
        entry.transition_to(EntryStatus::Assigning, self.clock.now())?;
        if !self
            .store
            .compare_and_set(&mut entry, EntryStatus::Available)
            .await?
        {
            return Err(Error::store(
                "compare_and_set",
                format!(
                    "available entry '{}' changed under the assignment lock",
                    entry.external_name
                ),
            ));
        }
        Ok(entry)
    }

    // -- status / garbage collection ----------------------------------------

    /// Per-status occupancy counts for `partition`. Read-only.
    pub async fn status(&self, partition: &PartitionKey) -> Result<PoolStatus> {
        let mut counts = HashMap::new();
        for status in EntryStatus::ALL {
            counts.insert(status, self.store.count_by_status(partition, status).await?);
        }
        Ok(PoolStatus {
            partition: partition.clone(),
            counts,
        })
    }

    /// External names of `Assigned` entries whose consumer-side
    /// resource is retired.
    ///
    /// Mutates nothing; teardown belongs to the external consumer of
    /// this list. A lookup failure for one entry never hides the rest.
    pub async fn garbage_collect(&self) -> Result<Vec<String>> {
        let assigned = self.store.list_by_status(EntryStatus::Assigned).await?;
        let mut collectable = Vec::new();
        for entry in assigned {
            match self.lookup.is_retired(&entry.external_name).await {
                Ok(true) => collectable.push(entry.external_name),
                Ok(false) => {}
                Err(err) => {
                    tracing::warn!(
                        entry = %entry.external_name,
                        error = %err,
                        "consumer lookup failed; skipping entry this pass"
                    );
                }
            }
        }
        Ok(collectable)
    }

    // -- internals ----------------------------------------------------------

    /// Occupancy (`Creating + Available + Assigning`) for `partition`.
    async fn occupancy(&self, partition: &PartitionKey) -> Result<usize> {
        let mut total = 0;
        for status in EntryStatus::ALL {
            if status.counts_toward_occupancy() {
                total += self.store.count_by_status(partition, status).await?;
            }
        }
        Ok(total)
    }

    /// Record a full per-status gauge reading for `partition`.
    async fn publish_occupancy(&self, partition: &PartitionKey) -> Result<()> {
        let status = self.status(partition).await?;
        for s in EntryStatus::ALL {
            self.metrics.record_occupancy(partition, s, status.count(s));
        }
        Ok(())
    }

    /// Generate a fresh external name: configured prefix (with a `-`
    /// appended when missing) plus a truncated hash of a random UUID.
    fn generate_external_name(&self) -> String {
        let digest = Sha256::digest(uuid::Uuid::new_v4().to_string().as_bytes());
        let hash = hex::encode(digest);
        let suffix = &hash[..self.config.external_name_len];

        let mut name = self.config.name_prefix.clone();
        if !name.ends_with('-') {
            name.push('-');
        }
        name.push_str(suffix);
        name
    }
}

impl std::fmt::Debug for BufferManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BufferManager")
            .field("config", &self.config)
            .finish()
    }
}

/// Config durations are `std::time::Duration`; persisted timestamps are
/// chrono. Saturate rather than fail on absurdly large configs.
fn to_chrono(duration: std::time::Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
