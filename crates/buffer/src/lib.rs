//! # Cumulus Buffer
//!
//! Keeps a warm pool of externally-provisioned billing projects so
//! callers get one instantly instead of waiting out a slow cloud
//! provisioning flow.
//!
//! Entries move through a closed state machine (`Creating` →
//! `Available` → `Assigning` → `Assigned`, with `Error` as the failure
//! terminal). Three background passes drive the pool:
//!
//! - [`BufferManager::refill`] inserts new `Creating` entries up to the
//!   partition's configured capacity and kicks off provisioning.
//! - [`BufferManager::sync`] polls the provisioner for stale `Creating`
//!   entries and promotes or fails them.
//! - [`BufferManager::reap`] retires entries stuck past their grace
//!   period to `Error`.
//!
//! [`BufferManager::assign`] hands out the oldest `Available` entry,
//! serializing the hand-out under a per-partition [`cumulus_lock`]
//! lock so concurrent requests across processes never share an entry.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use cumulus_buffer::testing::{FakeProvisioner, ManualClock, MemoryStore};
//! use cumulus_buffer::{BufferConfig, BufferManager, PartitionKey};
//! use cumulus_lock::MemoryLock;
//!
//! # async fn demo() -> cumulus_buffer::Result<()> {
//! let mut config = BufferConfig::default();
//! config.capacities.insert(PartitionKey::from("registered"), 10);
//!
//! let manager = BufferManager::new(
//!     config,
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(FakeProvisioner::new()),
//!     Arc::new(MemoryLock::new()),
//!     Arc::new(ManualClock::default()),
//! )?;
//!
//! manager.refill(&PartitionKey::from("registered")).await?;
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod entry;
pub mod error;
pub mod lookup;
pub mod manager;
pub mod metrics;
pub mod provisioner;
pub mod store;
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use config::BufferConfig;
pub use entry::{BufferEntry, EntryId, EntryStatus, PartitionKey};
pub use error::{Error, Result};
pub use lookup::{AssignmentLookup, NullLookup};
pub use manager::{BufferManager, PoolStatus, ReapReport, RefillReport, SyncReport};
pub use metrics::{GaugeSink, MetricsSink, NullSink};
pub use provisioner::{GrantOutcome, ProvisionStatus, Provisioner};
pub use store::BufferStore;
