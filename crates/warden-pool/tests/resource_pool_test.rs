// Integration tests for ResourcePool
// Exercises allocation rules end to end through the persisted pool mutex

use std::collections::HashSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use warden_common::{MutexSettings, PoolSettings, StoreSettings, WardenError};
use warden_mutex::MutexContext;
use warden_pool::filters::{any, excluding, of_kind, on_host};
use warden_pool::{Requester, ResourcePool, ResourceRecord};
use warden_store::{MemoryStore, PersistenceStore};

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::with_settings(StoreSettings {
        reap_dead_holders: false,
        ..Default::default()
    }))
}

fn settings() -> PoolSettings {
    PoolSettings {
        mutex_timeout: Duration::from_secs(10),
        ..Default::default()
    }
}

/// A pool handle with its own mutex context, as a separate process would have
fn pool_on(store: &Arc<MemoryStore>) -> ResourcePool {
    let context = Arc::new(MutexContext::new(store.clone(), MutexSettings::default()));
    ResourcePool::new(context, store.clone(), settings())
}

fn records(count: usize) -> Vec<ResourceRecord> {
    (1..=count)
        .map(|i| ResourceRecord::new(format!("node-{i}"), "ERBS").with_host(format!("netsim-{}", i % 2)))
        .collect()
}

#[test]
fn test_exclusive_record_is_skipped_by_everyone_else() -> anyhow::Result<()> {
    let pool = pool_on(&store());
    pool.add(records(2))?;

    let first = pool.allocate(&Requester::exclusive("O1"), any(), 1)?;
    assert_eq!(first[0].id, "node-1");
    assert!(first[0].exclusive);

    let second = pool.allocate(&Requester::shared("O2"), any(), 1)?;
    assert_eq!(second[0].id, "node-2");

    let err = pool.allocate(&Requester::shared("O3"), of_kind("ERBS"), 2).unwrap_err();
    assert!(err.is_insufficient_resources());
    Ok(())
}

#[test]
fn test_allocation_is_all_or_nothing() -> anyhow::Result<()> {
    let pool = pool_on(&store());
    pool.add(records(3))?;
    let before = pool.snapshot()?;

    let err = pool.allocate(&Requester::shared("O"), any(), 5).unwrap_err();
    assert!(matches!(
        err,
        WardenError::InsufficientResources { requested: 5, available: 3, .. }
    ));
    assert_eq!(pool.snapshot()?, before);
    assert!(pool.allocated_to("O")?.is_empty());
    Ok(())
}

#[test]
fn test_shared_records_have_several_owners() -> anyhow::Result<()> {
    let pool = pool_on(&store());
    pool.add(records(1))?;

    pool.allocate(&Requester::shared("A"), any(), 1)?;
    pool.allocate(&Requester::shared("B"), any(), 1)?;
    let record = pool.snapshot()?.get("node-1").cloned();
    assert_eq!(record.map(|r| r.owners), Some(vec!["A".to_string(), "B".to_string()]));

    // Held by anyone means unavailable to an exclusive requester
    assert!(pool.allocate(&Requester::exclusive("C"), any(), 1).is_err());

    let held = pool.allocated_to("A")?;
    assert_eq!(pool.release("A", &held)?, 1);
    assert_eq!(pool.release("A", &held)?, 0);
    assert_eq!(pool.allocated_to("B")?.len(), 1);

    assert_eq!(pool.deallocate("B")?, 1);
    assert!(!pool.snapshot()?.is_in_use());
    let exclusive = pool.allocate(&Requester::exclusive("C"), any(), 1)?;
    assert_eq!(exclusive.len(), 1);
    Ok(())
}

#[test]
fn test_predicates_select_records() -> anyhow::Result<()> {
    let pool = pool_on(&store());
    pool.add(records(4))?;

    let on_zero = pool.allocate(&Requester::shared("A"), on_host("netsim-0"), 2)?;
    let ids: Vec<&str> = on_zero.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["node-2", "node-4"]);

    let rest = pool.allocate(&Requester::shared("B"), excluding(["node-1"]), 1)?;
    assert_eq!(rest[0].id, "node-2");
    Ok(())
}

#[test]
fn test_exchange_failure_keeps_previous_allocation() -> anyhow::Result<()> {
    let pool = pool_on(&store());
    pool.add(records(3))?;
    pool.allocate(&Requester::exclusive("A"), any(), 2)?;

    let err = pool.exchange(&Requester::exclusive("A"), any(), 4).unwrap_err();
    assert!(err.is_insufficient_resources());
    assert_eq!(pool.allocated_to("A")?.len(), 2);

    let swapped = pool.exchange(&Requester::exclusive("A"), excluding(["node-1"]), 2)?;
    let ids: Vec<&str> = swapped.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["node-2", "node-3"]);
    assert!(!pool.snapshot()?.get("node-1").is_some_and(|r| r.is_allocated()));
    Ok(())
}

#[test]
fn test_remove_reset_and_clear() -> anyhow::Result<()> {
    let store = store();
    let pool = pool_on(&store);
    assert_eq!(pool.add(records(3))?, 3);
    assert_eq!(pool.add(records(3))?, 0);
    pool.allocate(&Requester::exclusive("gone"), any(), 1)?;

    let err = pool.remove(&["node-1"], false).unwrap_err();
    assert!(matches!(err, WardenError::ResourceInUse { .. }));
    assert_eq!(pool.remove(&["node-3"], false)?.len(), 1);

    assert_eq!(pool.reset(&["still-running"])?, 1);
    assert!(!pool.snapshot()?.is_in_use());

    assert!(pool.clear()?);
    assert!(!store.has_key(&pool.settings().key)?);
    assert!(pool.snapshot()?.is_empty());
    Ok(())
}

#[test]
fn test_mutations_hold_the_pool_mutex() -> anyhow::Result<()> {
    let store = store();
    let pool = pool_on(&store);
    assert_eq!(pool.lock_name().as_str(), "mutex-node-mgr-pool-operation");

    // Another process sits on the pool mutex
    let blocker = MutexContext::new(store.clone(), MutexSettings::default());
    let held = blocker.lock(
        pool.lock_name().as_str(),
        &warden_mutex::MutexOptions::persisted(),
    )?;

    let impatient = ResourcePool::new(
        Arc::new(MutexContext::new(store.clone(), MutexSettings::default())),
        store.clone(),
        PoolSettings {
            mutex_timeout: Duration::from_millis(30),
            ..Default::default()
        },
    );
    let err = impatient.add(records(1)).unwrap_err();
    assert!(err.is_timeout());
    assert!(impatient.snapshot()?.is_empty());

    drop(held);
    assert_eq!(impatient.add(records(1))?, 1);
    Ok(())
}

#[test]
fn test_concurrent_exclusive_allocations_never_overlap() -> anyhow::Result<()> {
    let store = store();
    pool_on(&store).add(records(16))?;

    let allocations: Vec<Vec<ResourceRecord>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let pool = pool_on(&store);
                scope.spawn(move || {
                    let requester = Requester::exclusive(format!("worker-{worker}"));
                    pool.allocate(&requester, any(), 4)
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap().unwrap())
            .collect()
    });

    let mut seen = HashSet::new();
    for record in allocations.iter().flatten() {
        assert!(seen.insert(record.id.clone()), "{} allocated twice", record.id);
    }
    assert_eq!(seen.len(), 16);
    Ok(())
}
