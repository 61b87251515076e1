//! The capacity invariant: in-flight entries (Creating, Available,
//! Assigning) never exceed the partition's configured capacity, across
//! any interleaving of refill with the other passes.

use std::sync::Arc;

use cumulus_buffer::testing::{FakeProvisioner, ManualClock, MemoryStore};
use cumulus_buffer::{BufferConfig, BufferManager, PartitionKey, ProvisionStatus};
use cumulus_lock::MemoryLock;

fn partition() -> PartitionKey {
    PartitionKey::from("registered")
}

struct Harness {
    manager: BufferManager,
    provisioner: Arc<FakeProvisioner>,
}

fn harness(capacity: usize) -> Harness {
    let mut config = BufferConfig::default();
    config.capacities.insert(partition(), capacity);

    let provisioner = Arc::new(FakeProvisioner::new());
    let manager = BufferManager::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::clone(&provisioner) as _,
        Arc::new(MemoryLock::new()),
        Arc::new(ManualClock::default()),
    )
    .unwrap();

    Harness {
        manager,
        provisioner,
    }
}

impl Harness {
    async fn occupancy(&self) -> usize {
        self.manager.status(&partition()).await.unwrap().occupancy()
    }

    async fn make_all_ready(&self) {
        for name in self.provisioner.create_calls() {
            self.provisioner.set_status(&name, ProvisionStatus::Ready);
        }
        self.manager.sync().await.unwrap();
    }
}

#[tokio::test]
async fn repeated_refills_never_exceed_capacity() {
    let h = harness(3);

    for _ in 0..4 {
        h.manager.refill(&partition()).await.unwrap();
        assert!(h.occupancy().await <= 3);
    }
    assert_eq!(h.occupancy().await, 3);
}

#[tokio::test]
async fn promotion_to_available_does_not_open_refill_room() {
    let h = harness(3);
    h.manager.refill(&partition()).await.unwrap();
    h.make_all_ready().await;

    // Available entries still occupy their slots.
    let report = h.manager.refill(&partition()).await.unwrap();
    assert_eq!(report.attempts, 0);
    assert_eq!(h.occupancy().await, 3);
}

#[tokio::test]
async fn assignment_frees_capacity_for_the_next_refill() {
    let h = harness(3);
    h.manager.refill(&partition()).await.unwrap();
    h.make_all_ready().await;

    h.manager.assign(&partition(), "user-1").await.unwrap();
    assert_eq!(h.occupancy().await, 2);

    let report = h.manager.refill(&partition()).await.unwrap();
    assert_eq!(report.attempts, 1);
    assert_eq!(h.occupancy().await, 3);
}

#[tokio::test]
async fn partitions_have_independent_capacities() {
    let registered = partition();
    let controlled = PartitionKey::from("controlled");

    let mut config = BufferConfig::default();
    config.capacities.insert(registered.clone(), 2);
    config.capacities.insert(controlled.clone(), 4);

    let manager = BufferManager::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(FakeProvisioner::new()),
        Arc::new(MemoryLock::new()),
        Arc::new(ManualClock::default()),
    )
    .unwrap();

    manager.refill(&registered).await.unwrap();
    manager.refill(&controlled).await.unwrap();

    assert_eq!(manager.status(&registered).await.unwrap().occupancy(), 2);
    assert_eq!(manager.status(&controlled).await.unwrap().occupancy(), 4);

    // Filling one partition never blocks the other.
    let report = manager.refill(&controlled).await.unwrap();
    assert_eq!(report.attempts, 0);
}
