//! Buffer entry data model and its status state machine.
//!
//! Status transitions form a closed table; every mutation goes through
//! [`BufferEntry::transition_to`], which rejects any edge not in the
//! table. Once an entry leaves `Creating` or `Available` it can never
//! return, and `Assigned`/`Error` are terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// PartitionKey / EntryId
// ---------------------------------------------------------------------------

/// Identifies an independent sub-pool (e.g. an access tier).
///
/// Pools for different partitions never share entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionKey(String);

impl PartitionKey {
    /// Create a new partition key.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// The key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PartitionKey {
    fn from(key: &str) -> Self {
        Self(key.to_string())
    }
}

/// Opaque entry identifier, assigned by the store on insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(pub u64);

impl EntryId {
    /// Placeholder ID for entries not yet inserted into a store.
    pub const UNASSIGNED: Self = Self(0);
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntryStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a buffer entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntryStatus {
    /// External provisioning has been kicked off and not yet confirmed.
    Creating,
    /// Provisioning confirmed; the entry is ready to be handed out.
    Available,
    /// Reserved under the assignment lock; grant in flight.
    Assigning,
    /// Handed out to a consumer. Terminal.
    Assigned,
    /// Provisioning or assignment failed, or the entry was reaped. Terminal.
    Error,
}

impl EntryStatus {
    /// All statuses, in lifecycle order. Used for gauge fan-out and
    /// status reports.
    pub const ALL: [Self; 5] = [
        Self::Creating,
        Self::Available,
        Self::Assigning,
        Self::Assigned,
        Self::Error,
    ];

    /// Whether the edge `self -> next` is in the transition table.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Creating, Self::Available | Self::Error)
                | (Self::Available, Self::Assigning)
                | (Self::Assigning, Self::Assigned | Self::Error)
        )
    }

    /// Whether this status ends the entry's life for the buffer.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Assigned | Self::Error)
    }

    /// Whether entries in this status count toward partition occupancy.
    #[must_use]
    pub fn counts_toward_occupancy(self) -> bool {
        matches!(self, Self::Creating | Self::Available | Self::Assigning)
    }
}

impl std::fmt::Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Available => "available",
            Self::Assigning => "assigning",
            Self::Assigned => "assigned",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// BufferEntry
// ---------------------------------------------------------------------------

/// One pooled externally-provisioned billing project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferEntry {
    /// Store-assigned identifier.
    pub id: EntryId,
    /// Globally unique name of the external resource. Never reused.
    pub external_name: String,
    /// The sub-pool this entry belongs to for its entire lifetime.
    pub partition: PartitionKey,
    /// Current lifecycle status.
    pub status: EntryStatus,
    /// Set once, at entry creation.
    pub created_at: DateTime<Utc>,
    /// Updated on every status transition.
    pub status_changed_at: DateTime<Utc>,
    /// Updated whenever reconciliation polls the provisioner for this
    /// entry. Independent of `status_changed_at`.
    pub last_sync_at: Option<DateTime<Utc>>,
    /// The consumer the entry was handed to. Non-null iff `Assigned`.
    pub assigned_subject: Option<String>,
    /// Optimistic concurrency token, bumped by the store on every
    /// guarded update.
    pub version: u64,
}

impl BufferEntry {
    /// Create a fresh entry in `Creating`.
    pub fn new(
        external_name: impl Into<String>,
        partition: PartitionKey,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: EntryId::UNASSIGNED,
            external_name: external_name.into(),
            partition,
            status: EntryStatus::Creating,
            created_at: now,
            status_changed_at: now,
            last_sync_at: None,
            assigned_subject: None,
            version: 0,
        }
    }

    /// Move the entry along a valid edge, updating `status_changed_at`.
    pub fn transition_to(&mut self, next: EntryStatus, now: DateTime<Utc>) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(Error::InvalidTransition {
                external_name: self.external_name.clone(),
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.status_changed_at = now;
        Ok(())
    }

    /// Transition to `Assigned` and record the consumer.
    ///
    /// The only place `assigned_subject` is ever set.
    pub fn mark_assigned(&mut self, subject: impl Into<String>, now: DateTime<Utc>) -> Result<()> {
        self.transition_to(EntryStatus::Assigned, now)?;
        self.assigned_subject = Some(subject.into());
        Ok(())
    }

    /// Record that reconciliation polled the provisioner for this entry.
    pub fn record_sync(&mut self, now: DateTime<Utc>) {
        self.last_sync_at = Some(now);
    }

    /// How far the latest sync poll trails the latest status change.
    ///
    /// `None` until the entry has been synced at least once. A lag
    /// exceeding the creating grace period means reconciliation has
    /// been trying, and failing, to move the entry forward for that
    /// long — the reap predicate for stuck `Creating` entries.
    #[must_use]
    pub fn creating_sync_lag(&self) -> Option<Duration> {
        self.last_sync_at.map(|sync| sync - self.status_changed_at)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn entry() -> BufferEntry {
        BufferEntry::new("aou-abc123", PartitionKey::from("registered"), t0())
    }

    #[test]
    fn new_entry_starts_creating() {
        let e = entry();
        assert_eq!(e.status, EntryStatus::Creating);
        assert_eq!(e.created_at, t0());
        assert_eq!(e.status_changed_at, t0());
        assert!(e.last_sync_at.is_none());
        assert!(e.assigned_subject.is_none());
    }

    #[test]
    fn transition_table_is_closed() {
        use EntryStatus::{Assigned, Assigning, Available, Creating, Error};

        let allowed = [
            (Creating, Available),
            (Creating, Error),
            (Available, Assigning),
            (Assigning, Assigned),
            (Assigning, Error),
        ];

        for from in EntryStatus::ALL {
            for to in EntryStatus::ALL {
                let expected = allowed.contains(&(from, to));
                assert_eq!(
                    from.can_transition_to(to),
                    expected,
                    "edge {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn no_edge_returns_to_creating_or_available() {
        for from in EntryStatus::ALL {
            assert!(!from.can_transition_to(EntryStatus::Creating));
            if from != EntryStatus::Creating {
                assert!(!from.can_transition_to(EntryStatus::Available));
            }
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_edges() {
        for from in [EntryStatus::Assigned, EntryStatus::Error] {
            assert!(from.is_terminal());
            for to in EntryStatus::ALL {
                assert!(!from.can_transition_to(to));
            }
        }
    }

    #[test]
    fn transition_updates_status_changed_time() {
        let mut e = entry();
        let t1 = t0() + Duration::minutes(5);
        e.transition_to(EntryStatus::Available, t1).unwrap();
        assert_eq!(e.status, EntryStatus::Available);
        assert_eq!(e.status_changed_at, t1);
        assert_eq!(e.created_at, t0(), "creation time is set once");
    }

    #[test]
    fn invalid_transition_is_rejected() {
        let mut e = entry();
        let err = e.transition_to(EntryStatus::Assigned, t0()).unwrap_err();
        assert!(matches!(
            err,
            crate::error::Error::InvalidTransition {
                from: EntryStatus::Creating,
                to: EntryStatus::Assigned,
                ..
            }
        ));
        assert_eq!(e.status, EntryStatus::Creating, "entry unchanged");
    }

    #[test]
    fn assigned_subject_set_only_via_mark_assigned() {
        let mut e = entry();
        e.transition_to(EntryStatus::Available, t0()).unwrap();
        e.transition_to(EntryStatus::Assigning, t0()).unwrap();
        assert!(e.assigned_subject.is_none());

        e.mark_assigned("user-1", t0()).unwrap();
        assert_eq!(e.status, EntryStatus::Assigned);
        assert_eq!(e.assigned_subject.as_deref(), Some("user-1"));
    }

    #[test]
    fn mark_assigned_rejected_outside_assigning() {
        let mut e = entry();
        assert!(e.mark_assigned("user-1", t0()).is_err());
        assert!(e.assigned_subject.is_none());
    }

    #[test]
    fn sync_lag_tracks_sync_vs_status_change() {
        let mut e = entry();
        assert!(e.creating_sync_lag().is_none());

        e.record_sync(t0() + Duration::minutes(90));
        assert_eq!(e.creating_sync_lag(), Some(Duration::minutes(90)));

        // A sync timestamp does not touch the status-change time.
        assert_eq!(e.status_changed_at, t0());
    }

    #[test]
    fn occupancy_statuses() {
        assert!(EntryStatus::Creating.counts_toward_occupancy());
        assert!(EntryStatus::Available.counts_toward_occupancy());
        assert!(EntryStatus::Assigning.counts_toward_occupancy());
        assert!(!EntryStatus::Assigned.counts_toward_occupancy());
        assert!(!EntryStatus::Error.counts_toward_occupancy());
    }

    #[test]
    fn status_serializes_screaming_snake() {
        let json = serde_json::to_string(&EntryStatus::Creating).unwrap();
        assert_eq!(json, "\"CREATING\"");
    }
}
