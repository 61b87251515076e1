//! Concurrent assignment: many callers racing for a small pool must
//! each get a distinct entry or a clean empty-pool error.

use std::collections::HashSet;
use std::sync::Arc;

use cumulus_buffer::testing::{FakeProvisioner, ManualClock, MemoryStore};
use cumulus_buffer::{
    BufferConfig, BufferEntry, BufferManager, EntryStatus, Error, PartitionKey, ProvisionStatus,
    Result,
};
use cumulus_lock::MemoryLock;

fn partition() -> PartitionKey {
    PartitionKey::from("registered")
}

struct Harness {
    manager: Arc<BufferManager>,
    store: Arc<MemoryStore>,
    provisioner: Arc<FakeProvisioner>,
}

fn harness(capacity: usize) -> Harness {
    let mut config = BufferConfig::default();
    config.capacities.insert(partition(), capacity);

    let store = Arc::new(MemoryStore::new());
    let provisioner = Arc::new(FakeProvisioner::new());
    let manager = BufferManager::new(
        config,
        Arc::clone(&store) as _,
        Arc::clone(&provisioner) as _,
        Arc::new(MemoryLock::new()),
        Arc::new(ManualClock::default()),
    )
    .unwrap();

    Harness {
        manager: Arc::new(manager),
        store,
        provisioner,
    }
}

impl Harness {
    /// Refill and promote `ready` of the created entries to Available.
    async fn fill_ready(&self, ready: usize) {
        self.manager.refill(&partition()).await.unwrap();
        for name in self.provisioner.create_calls().iter().take(ready) {
            self.provisioner.set_status(name, ProvisionStatus::Ready);
        }
        let report = self.manager.sync().await.unwrap();
        assert_eq!(report.available, ready);
    }

    async fn race(&self, callers: usize) -> Vec<Result<BufferEntry>> {
        let mut handles = Vec::with_capacity(callers);
        for i in 0..callers {
            let manager = Arc::clone(&self.manager);
            handles.push(tokio::spawn(async move {
                manager.assign(&partition(), &format!("user-{i}")).await
            }));
        }
        let mut results = Vec::with_capacity(callers);
        for handle in handles {
            results.push(handle.await.unwrap());
        }
        results
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assigns_never_share_an_entry() {
    let h = harness(5);
    h.fill_ready(4).await;

    let results = h.race(10).await;

    let mut winners = HashSet::new();
    let mut empty = 0;
    for result in results {
        match result {
            Ok(entry) => {
                assert_eq!(entry.status, EntryStatus::Assigned);
                assert!(
                    winners.insert(entry.external_name.clone()),
                    "entry {} handed out twice",
                    entry.external_name
                );
            }
            Err(Error::EmptyPool { .. }) => empty += 1,
            Err(other) => panic!("unexpected assignment error: {other}"),
        }
    }

    assert_eq!(winners.len(), 4);
    assert_eq!(empty, 6);

    // Every winner's entry is Assigned exactly once in the store.
    let assigned: Vec<_> = h
        .store
        .dump()
        .into_iter()
        .filter(|e| e.status == EntryStatus::Assigned)
        .collect();
    assert_eq!(assigned.len(), 4);
    for entry in assigned {
        assert!(winners.contains(&entry.external_name));
        assert!(entry.assigned_subject.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_assigns_on_one_entry_produce_one_winner() {
    let h = harness(1);
    h.fill_ready(1).await;

    let results = h.race(8).await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one caller may win the entry");
    assert!(
        results
            .iter()
            .filter(|r| r.is_err())
            .all(|r| matches!(r, Err(Error::EmptyPool { .. })))
    );
}
