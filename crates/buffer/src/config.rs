//! Buffer configuration.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::entry::{EntryStatus, PartitionKey};
use crate::error::{Error, Result};

/// Configuration for the billing-project buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Target pool size per partition. Partitions absent from this map
    /// have capacity 0 and are never refilled.
    pub capacities: HashMap<PartitionKey, usize>,
    /// Maximum creation attempts per refill invocation.
    pub refill_attempts_per_run: usize,
    /// Maximum entries polled per sync invocation.
    pub sync_batch_size: usize,
    /// How long a `Creating` entry may trail reconciliation before it
    /// is reaped.
    pub creating_grace: Duration,
    /// How long an `Assigning` entry may sit before it is reaped.
    pub assigning_grace: Duration,
    /// Prefix for generated external names. A trailing `-` is appended
    /// when missing.
    pub name_prefix: String,
    /// Length of the random hex suffix of generated external names.
    pub external_name_len: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacities: HashMap::new(),
            refill_attempts_per_run: 5,
            sync_batch_size: 5,
            creating_grace: Duration::from_secs(60 * 60),
            assigning_grace: Duration::from_secs(10 * 60),
            name_prefix: "cumulus".to_string(),
            external_name_len: 8,
        }
    }
}

impl BufferConfig {
    /// Configured capacity for a partition; 0 when unknown.
    #[must_use]
    pub fn capacity_for(&self, partition: &PartitionKey) -> usize {
        self.capacities.get(partition).copied().unwrap_or(0)
    }

    /// Grace period before entries stuck in `status` are reaped.
    ///
    /// Only `Creating` and `Assigning` have grace periods; the other
    /// statuses cannot get stuck.
    #[must_use]
    pub fn grace_for(&self, status: EntryStatus) -> Option<Duration> {
        match status {
            EntryStatus::Creating => Some(self.creating_grace),
            EntryStatus::Assigning => Some(self.assigning_grace),
            _ => None,
        }
    }

    /// Validate the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.sync_batch_size == 0 {
            return Err(Error::configuration("sync_batch_size must be greater than 0"));
        }
        if self.name_prefix.is_empty() {
            return Err(Error::configuration("name_prefix cannot be empty"));
        }
        if self.external_name_len == 0 || self.external_name_len > 64 {
            return Err(Error::configuration(format!(
                "external_name_len ({}) must be in 1..=64",
                self.external_name_len
            )));
        }
        if self.creating_grace.is_zero() || self.assigning_grace.is_zero() {
            return Err(Error::configuration("grace periods must be greater than zero"));
        }
        Ok(())
    }
}
