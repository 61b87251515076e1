//! Testing utilities: in-memory store, scriptable provisioner, manual
//! clock, recording metrics sink.
//!
//! Public so downstream crates can test against the same fakes the
//! buffer's own suites use.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

use crate::clock::Clock;
use crate::entry::{BufferEntry, EntryId, EntryStatus, PartitionKey};
use crate::error::{Error, Result};
use crate::lookup::AssignmentLookup;
use crate::metrics::MetricsSink;
use crate::provisioner::{GrantOutcome, ProvisionStatus, Provisioner};
use crate::store::BufferStore;

// ---------------------------------------------------------------------------
// ManualClock
// ---------------------------------------------------------------------------

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl Default for ManualClock {
    /// Starts at a fixed instant so test timestamps are reproducible.
    fn default() -> Self {
        Self::new(
            DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                .expect("valid timestamp")
                .with_timezone(&Utc),
        )
    }
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: StdDuration) {
        let mut now = self.now.lock();
        *now += Duration::from_std(by).expect("advance fits in chrono range");
    }

    /// Jump the clock to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    entries: BTreeMap<u64, BufferEntry>,
    /// Every external name ever inserted; never shrinks, so names are
    /// unique across live and retired entries alike.
    used_names: HashSet<String>,
    next_id: u64,
}

/// In-memory [`BufferStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<StoreState>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every entry, ordered by ID. Test helper.
    #[must_use]
    pub fn dump(&self) -> Vec<BufferEntry> {
        self.inner.lock().entries.values().cloned().collect()
    }
}

#[async_trait]
impl BufferStore for MemoryStore {
    async fn insert(&self, mut entry: BufferEntry) -> Result<BufferEntry> {
        let mut state = self.inner.lock();
        if !state.used_names.insert(entry.external_name.clone()) {
            return Err(Error::store(
                "insert",
                format!("external name '{}' already used", entry.external_name),
            ));
        }
        state.next_id += 1;
        entry.id = EntryId(state.next_id);
        entry.version = 1;
        state.entries.insert(entry.id.0, entry.clone());
        Ok(entry)
    }

    async fn get(&self, id: EntryId) -> Result<Option<BufferEntry>> {
        Ok(self.inner.lock().entries.get(&id.0).cloned())
    }

    async fn find_oldest_available(
        &self,
        partition: &PartitionKey,
    ) -> Result<Option<BufferEntry>> {
        let state = self.inner.lock();
        Ok(state
            .entries
            .values()
            .filter(|e| e.status == EntryStatus::Available && e.partition == *partition)
            .min_by_key(|e| (e.created_at, e.id))
            .cloned())
    }

    async fn find_stale_creating(&self, batch: usize) -> Result<Vec<BufferEntry>> {
        let state = self.inner.lock();
        let mut creating: Vec<BufferEntry> = state
            .entries
            .values()
            .filter(|e| e.status == EntryStatus::Creating)
            .cloned()
            .collect();
        // Option's ordering puts None (never synced) first.
        creating.sort_by_key(|e| (e.last_sync_at, e.id));
        creating.truncate(batch);
        Ok(creating)
    }

    async fn find_expired(
        &self,
        status: EntryStatus,
        older_than: DateTime<Utc>,
    ) -> Result<Vec<BufferEntry>> {
        let state = self.inner.lock();
        Ok(state
            .entries
            .values()
            .filter(|e| e.status == status && e.status_changed_at < older_than)
            .cloned()
            .collect())
    }

    async fn count_by_status(
        &self,
        partition: &PartitionKey,
        status: EntryStatus,
    ) -> Result<usize> {
        let state = self.inner.lock();
        Ok(state
            .entries
            .values()
            .filter(|e| e.status == status && e.partition == *partition)
            .count())
    }

    async fn list_by_status(&self, status: EntryStatus) -> Result<Vec<BufferEntry>> {
        let state = self.inner.lock();
        Ok(state
            .entries
            .values()
            .filter(|e| e.status == status)
            .cloned()
            .collect())
    }

    async fn touch_sync_time(&self, id: EntryId, now: DateTime<Utc>) -> Result<()> {
        let mut state = self.inner.lock();
        let entry = state
            .entries
            .get_mut(&id.0)
            .ok_or_else(|| Error::store("touch_sync_time", format!("no entry with id {id}")))?;
        entry.last_sync_at = Some(now);
        Ok(())
    }

    async fn compare_and_set(
        &self,
        entry: &mut BufferEntry,
        expected: EntryStatus,
    ) -> Result<bool> {
        let mut state = self.inner.lock();
        let Some(stored) = state.entries.get_mut(&entry.id.0) else {
            return Ok(false);
        };
        if stored.status != expected || stored.version != entry.version {
            return Ok(false);
        }
        entry.version += 1;
        *stored = entry.clone();
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// FakeProvisioner
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct ProvisionerState {
    statuses: HashMap<String, ProvisionStatus>,
    fail_next_creates: usize,
    fail_status_for: HashSet<String>,
    fail_grant_for: HashSet<String>,
    fail_all_grants: bool,
    already_member: HashSet<String>,
    create_calls: Vec<String>,
    status_calls: Vec<String>,
    grant_calls: Vec<(String, String)>,
}

/// Scriptable [`Provisioner`] with call recording.
///
/// Newly created names report [`ProvisionStatus::Creating`] until a
/// test calls [`set_status`](Self::set_status); names the provisioner
/// never saw report [`ProvisionStatus::NotFound`].
#[derive(Debug, Default)]
pub struct FakeProvisioner {
    inner: Mutex<ProvisionerState>,
}

impl FakeProvisioner {
    /// Create a provisioner with no scripted behavior.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the externally-reported status for `external_name`.
    pub fn set_status(&self, external_name: &str, status: ProvisionStatus) {
        self.inner
            .lock()
            .statuses
            .insert(external_name.to_string(), status);
    }

    /// Make the next `n` create calls fail.
    pub fn fail_next_creates(&self, n: usize) {
        self.inner.lock().fail_next_creates = n;
    }

    /// Make status polls for `external_name` fail.
    pub fn fail_status_for(&self, external_name: &str) {
        self.inner
            .lock()
            .fail_status_for
            .insert(external_name.to_string());
    }

    /// Make grant calls for `external_name` fail.
    pub fn fail_grant_for(&self, external_name: &str) {
        self.inner
            .lock()
            .fail_grant_for
            .insert(external_name.to_string());
    }

    /// Make every grant call fail.
    pub fn fail_all_grants(&self) {
        self.inner.lock().fail_all_grants = true;
    }

    /// Report "subject already a member" for grants on `external_name`.
    pub fn member_already(&self, external_name: &str) {
        self.inner
            .lock()
            .already_member
            .insert(external_name.to_string());
    }

    /// Names passed to `create`, in call order.
    #[must_use]
    pub fn create_calls(&self) -> Vec<String> {
        self.inner.lock().create_calls.clone()
    }

    /// Names passed to `status`, in call order.
    #[must_use]
    pub fn status_calls(&self) -> Vec<String> {
        self.inner.lock().status_calls.clone()
    }

    /// `(subject, external_name)` pairs passed to `grant`, in call order.
    #[must_use]
    pub fn grant_calls(&self) -> Vec<(String, String)> {
        self.inner.lock().grant_calls.clone()
    }
}

#[async_trait]
impl Provisioner for FakeProvisioner {
    async fn create(&self, external_name: &str) -> Result<()> {
        let mut state = self.inner.lock();
        state.create_calls.push(external_name.to_string());
        if state.fail_next_creates > 0 {
            state.fail_next_creates -= 1;
            return Err(Error::provisioner(
                "create",
                external_name,
                "injected create failure",
                true,
            ));
        }
        state
            .statuses
            .entry(external_name.to_string())
            .or_insert(ProvisionStatus::Creating);
        Ok(())
    }

    async fn status(&self, external_name: &str) -> Result<ProvisionStatus> {
        let mut state = self.inner.lock();
        state.status_calls.push(external_name.to_string());
        if state.fail_status_for.contains(external_name) {
            return Err(Error::provisioner(
                "status",
                external_name,
                "injected status failure",
                true,
            ));
        }
        Ok(state
            .statuses
            .get(external_name)
            .copied()
            .unwrap_or(ProvisionStatus::NotFound))
    }

    async fn grant(&self, subject: &str, external_name: &str) -> Result<GrantOutcome> {
        let mut state = self.inner.lock();
        state
            .grant_calls
            .push((subject.to_string(), external_name.to_string()));
        if state.fail_all_grants || state.fail_grant_for.contains(external_name) {
            return Err(Error::provisioner(
                "grant",
                external_name,
                "injected grant failure",
                false,
            ));
        }
        if state.already_member.contains(external_name) {
            return Ok(GrantOutcome::AlreadyMember);
        }
        Ok(GrantOutcome::Granted)
    }
}

// ---------------------------------------------------------------------------
// RecordingSink
// ---------------------------------------------------------------------------

/// One captured gauge reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyReading {
    /// The partition the reading is for.
    pub partition: PartitionKey,
    /// The status counted.
    pub status: EntryStatus,
    /// The count recorded.
    pub count: usize,
}

/// [`MetricsSink`] that captures readings for assertions.
#[derive(Debug, Default)]
pub struct RecordingSink {
    readings: Mutex<Vec<OccupancyReading>>,
}

impl RecordingSink {
    /// Create an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured readings, in record order.
    #[must_use]
    pub fn readings(&self) -> Vec<OccupancyReading> {
        self.readings.lock().clone()
    }

    /// The most recent count recorded for `(partition, status)`.
    #[must_use]
    pub fn latest(&self, partition: &PartitionKey, status: EntryStatus) -> Option<usize> {
        self.readings
            .lock()
            .iter()
            .rev()
            .find(|r| r.partition == *partition && r.status == status)
            .map(|r| r.count)
    }
}

impl MetricsSink for RecordingSink {
    fn record_occupancy(&self, partition: &PartitionKey, status: EntryStatus, count: usize) {
        self.readings.lock().push(OccupancyReading {
            partition: partition.clone(),
            status,
            count,
        });
    }
}

// ---------------------------------------------------------------------------
// FakeLookup
// ---------------------------------------------------------------------------

/// Scriptable [`AssignmentLookup`].
#[derive(Debug, Default)]
pub struct FakeLookup {
    retired: Mutex<HashSet<String>>,
    fail_for: Mutex<HashSet<String>>,
}

impl FakeLookup {
    /// Create a lookup where nothing is retired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `external_name`'s consumer-side resource as retired.
    pub fn retire(&self, external_name: &str) {
        self.retired.lock().insert(external_name.to_string());
    }

    /// Make lookups for `external_name` fail.
    pub fn fail_for(&self, external_name: &str) {
        self.fail_for.lock().insert(external_name.to_string());
    }
}

#[async_trait]
impl AssignmentLookup for FakeLookup {
    async fn is_retired(&self, external_name: &str) -> Result<bool> {
        if self.fail_for.lock().contains(external_name) {
            return Err(Error::store("lookup", "injected lookup failure"));
        }
        Ok(self.retired.lock().contains(external_name))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
