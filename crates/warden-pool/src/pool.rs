// Resource pool allocator
// Every mutation runs load -> mutate -> persist inside the pool-wide persisted mutex

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use warden_common::{PoolSettings, Result, WardenError};
use warden_mutex::{LockName, MutexContext, MutexOptions};
use warden_store::{PersistenceStore, PersistenceStoreExt};

use crate::record::{Requester, ResourceRecord};

/// The persisted document: every record in pool order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolState {
    #[serde(default)]
    pub records: Vec<ResourceRecord>,
}

impl PoolState {
    pub fn get(&self, id: &str) -> Option<&ResourceRecord> {
        self.records.iter().find(|record| record.id == id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether any record is held by anyone
    pub fn is_in_use(&self) -> bool {
        self.records.iter().any(ResourceRecord::is_allocated)
    }

    pub fn allocated_to(&self, name: &str) -> Vec<ResourceRecord> {
        self.records
            .iter()
            .filter(|record| record.is_owned_by(name))
            .cloned()
            .collect()
    }

    /// Records `requester` could take right now, in pool order.
    ///
    /// Records it already holds are left out.
    pub fn available_for<'a, P>(
        &'a self,
        requester: &'a Requester,
        predicate: P,
    ) -> impl Iterator<Item = &'a ResourceRecord> + 'a
    where
        P: Fn(&ResourceRecord) -> bool + 'a,
    {
        self.records.iter().filter(move |record| {
            !record.is_owned_by(&requester.name) && !record.is_used_for(requester) && predicate(*record)
        })
    }

    /// Append records whose id is not in the pool yet; returns how many were added
    fn add(&mut self, records: Vec<ResourceRecord>) -> usize {
        let mut added = 0;
        for record in records {
            if self.get(&record.id).is_some() {
                debug!(id = %record.id, "Record already in pool, skipping");
                continue;
            }
            self.records.push(record);
            added += 1;
        }
        added
    }

    fn remove(&mut self, ids: &[&str], force: bool) -> Result<Vec<ResourceRecord>> {
        for id in ids {
            let record = self
                .get(id)
                .ok_or_else(|| WardenError::ResourceNotFound(id.to_string()))?;
            if record.is_allocated() && !force {
                return Err(WardenError::ResourceInUse {
                    id: record.id.clone(),
                    owners: record.owners.clone(),
                });
            }
        }

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.records)
            .into_iter()
            .partition(|record| ids.contains(&record.id.as_str()));
        self.records = kept;
        Ok(removed)
    }

    /// Give `requester` the first `count` records it can take that match `predicate`.
    ///
    /// Nothing changes unless all `count` records are found.
    fn allocate<P>(
        &mut self,
        requester: &Requester,
        predicate: P,
        count: usize,
        now: i64,
    ) -> Result<Vec<ResourceRecord>>
    where
        P: Fn(&ResourceRecord) -> bool,
    {
        let selected: Vec<String> = self
            .available_for(requester, &predicate)
            .take(count)
            .map(|record| record.id.clone())
            .collect();
        if selected.len() < count {
            return Err(WardenError::InsufficientResources {
                requester: requester.name.clone(),
                requested: count,
                available: selected.len(),
            });
        }

        let mut allocated = Vec::with_capacity(count);
        for record in self.records.iter_mut() {
            if selected.contains(&record.id) {
                record.assign(requester, now);
                allocated.push(record.clone());
            }
        }
        Ok(allocated)
    }

    fn release(&mut self, name: &str, ids: &[&str]) -> usize {
        let mut released = 0;
        for id in ids {
            match self.records.iter_mut().find(|record| record.id == *id) {
                Some(record) => {
                    if record.unassign(name) {
                        released += 1;
                    } else {
                        debug!(id = %id, requester = %name, "Record not held by requester");
                    }
                }
                None => warn!(id = %id, requester = %name, "Cannot release record missing from pool"),
            }
        }
        released
    }

    fn deallocate(&mut self, name: &str) -> usize {
        self.records
            .iter_mut()
            .map(|record| record.unassign(name))
            .filter(|released| *released)
            .count()
    }

    /// Clear allocations left behind by requesters no longer active.
    ///
    /// With no active requesters, or nothing in use, every record is cleared.
    /// Otherwise only exclusive records whose single owner is not in `active`
    /// are cleared, so running requesters keep what they hold.
    fn reset(&mut self, active: &[&str]) -> usize {
        let everything = active.is_empty() || !self.is_in_use();
        let mut cleared = 0;
        for record in self.records.iter_mut().filter(|record| record.is_allocated()) {
            let abandoned = record.exclusive
                && record.owners.len() <= 1
                && record
                    .owners
                    .first()
                    .is_none_or(|owner| !active.contains(&owner.as_str()));
            if everything || abandoned {
                record.reset();
                cleared += 1;
            }
        }
        cleared
    }
}

/// Shared pool of resource records, serialized through one persisted mutex.
///
/// All mutating operations block for the pool mutex (bounded by the
/// configured timeout) and commit only if they succeed as a whole. Reads
/// through [`ResourcePool::snapshot`] and [`ResourcePool::allocated_to`]
/// skip the mutex and may observe stale state.
pub struct ResourcePool {
    mutex: Arc<MutexContext>,
    store: Arc<dyn PersistenceStore>,
    settings: PoolSettings,
}

impl ResourcePool {
    pub fn new(
        mutex: Arc<MutexContext>,
        store: Arc<dyn PersistenceStore>,
        settings: PoolSettings,
    ) -> Self {
        Self {
            mutex,
            store,
            settings,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    /// The name every mutation locks on
    pub fn lock_name(&self) -> LockName {
        LockName::from_identifier(&self.settings.mutex)
    }

    fn mutex_options(&self) -> MutexOptions {
        MutexOptions::persisted()
            .with_timeout(self.settings.mutex_timeout)
            .with_log_output(self.settings.log_output)
    }

    fn load(&self) -> Result<PoolState> {
        Ok(self
            .store
            .get_json::<PoolState>(&self.settings.key)?
            .unwrap_or_default())
    }

    /// Run `f` on the current state under the pool mutex, persisting only on success
    fn mutate<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut PoolState) -> Result<T>,
    {
        self.mutex
            .with_mutex(&self.settings.mutex, &self.mutex_options(), || {
                let mut state = self.load()?;
                let value = f(&mut state)?;
                self.store.set_json(&self.settings.key, &state, None)?;
                Ok(value)
            })
    }

    /// Populate the pool; records whose id is already present are ignored
    pub fn add(&self, records: Vec<ResourceRecord>) -> Result<usize> {
        let added = self.mutate(|state| Ok(state.add(records)))?;
        info!(added, "Added records to pool");
        Ok(added)
    }

    /// Remove records by id.
    ///
    /// Fails without removing anything if an id is unknown, or if a record is
    /// held and `force` is not set.
    pub fn remove(&self, ids: &[&str], force: bool) -> Result<Vec<ResourceRecord>> {
        let removed = self.mutate(|state| state.remove(ids, force))?;
        info!(removed = removed.len(), force, "Removed records from pool");
        Ok(removed)
    }

    /// Allocate `count` records matching `predicate` to `requester`, all or nothing.
    pub fn allocate<P>(
        &self,
        requester: &Requester,
        predicate: P,
        count: usize,
    ) -> Result<Vec<ResourceRecord>>
    where
        P: Fn(&ResourceRecord) -> bool,
    {
        if count == 0 {
            return Ok(Vec::new());
        }
        let now = Utc::now().timestamp_millis();
        let allocated = self.mutate(|state| state.allocate(requester, predicate, count, now))?;
        info!(
            requester = %requester.name,
            exclusive = requester.exclusive,
            count = allocated.len(),
            "Allocated records"
        );
        Ok(allocated)
    }

    /// Give `records` back on behalf of `requester`; returns how many it actually held
    pub fn release(&self, requester: &str, records: &[ResourceRecord]) -> Result<usize> {
        let ids: Vec<&str> = records.iter().map(|record| record.id.as_str()).collect();
        let released = self.mutate(|state| Ok(state.release(requester, &ids)))?;
        info!(requester = %requester, released, "Released records");
        Ok(released)
    }

    /// Release every record `requester` holds
    pub fn deallocate(&self, requester: &str) -> Result<usize> {
        let released = self.mutate(|state| Ok(state.deallocate(requester)))?;
        if released == 0 {
            debug!(requester = %requester, "Requester holds no records");
        } else {
            info!(requester = %requester, released, "Deallocated records");
        }
        Ok(released)
    }

    /// Swap everything `requester` holds for a fresh allocation in one critical section.
    ///
    /// On failure the previous allocation is kept.
    pub fn exchange<P>(
        &self,
        requester: &Requester,
        predicate: P,
        count: usize,
    ) -> Result<Vec<ResourceRecord>>
    where
        P: Fn(&ResourceRecord) -> bool,
    {
        let now = Utc::now().timestamp_millis();
        let allocated = self.mutate(|state| {
            state.deallocate(&requester.name);
            state.allocate(requester, predicate, count, now)
        })?;
        info!(requester = %requester.name, count = allocated.len(), "Exchanged records");
        Ok(allocated)
    }

    /// Clear stale allocations; see [`PoolState`] reset rules. Returns records cleared.
    pub fn reset(&self, active: &[&str]) -> Result<usize> {
        let cleared = self.mutate(|state| Ok(state.reset(active)))?;
        info!(cleared, "Reset pool allocations");
        Ok(cleared)
    }

    /// Drop the persisted pool entirely
    pub fn clear(&self) -> Result<bool> {
        let existed = self
            .mutex
            .with_mutex(&self.settings.mutex, &self.mutex_options(), || {
                self.store.remove(&self.settings.key)
            })?;
        info!(key = %self.settings.key, existed, "Cleared pool");
        Ok(existed)
    }

    /// Unguarded read of the whole pool
    pub fn snapshot(&self) -> Result<PoolState> {
        self.load()
    }

    /// Unguarded read of the records held by `requester`
    pub fn allocated_to(&self, requester: &str) -> Result<Vec<ResourceRecord>> {
        Ok(self.load()?.allocated_to(requester))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::{any, of_kind};

    fn state(ids: &[&str]) -> PoolState {
        PoolState {
            records: ids.iter().map(|id| ResourceRecord::new(*id, "ERBS")).collect(),
        }
    }

    #[test]
    fn test_allocate_takes_first_matching_in_order() {
        let mut pool = state(&["n1", "n2", "n3"]);
        pool.records[1].kind = "RadioNode".to_string();

        let got = pool
            .allocate(&Requester::shared("A"), of_kind("ERBS"), 2, 5)
            .unwrap();
        let ids: Vec<&str> = got.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["n1", "n3"]);
        assert_eq!(pool.allocated_to("A").len(), 2);
    }

    #[test]
    fn test_allocate_shortfall_changes_nothing() {
        let mut pool = state(&["n1", "n2", "n3"]);
        let before = pool.clone();

        let err = pool
            .allocate(&Requester::exclusive("A"), any(), 5, 5)
            .unwrap_err();
        assert!(matches!(
            err,
            WardenError::InsufficientResources { requested: 5, available: 3, .. }
        ));
        assert_eq!(pool, before);
    }

    #[test]
    fn test_allocate_skips_records_already_held_by_requester() {
        let mut pool = state(&["n1", "n2"]);
        pool.allocate(&Requester::shared("A"), any(), 1, 5).unwrap();

        let second = pool.allocate(&Requester::shared("A"), any(), 1, 5).unwrap();
        assert_eq!(second[0].id, "n2");
        assert!(pool.allocate(&Requester::shared("A"), any(), 1, 5).is_err());
    }

    #[test]
    fn test_remove_refuses_held_records_unless_forced() {
        let mut pool = state(&["n1", "n2"]);
        pool.allocate(&Requester::shared("A"), any(), 1, 5).unwrap();

        let err = pool.remove(&["n1", "n2"], false).unwrap_err();
        assert!(matches!(err, WardenError::ResourceInUse { ref id, .. } if id == "n1"));
        assert_eq!(pool.len(), 2);

        assert!(matches!(
            pool.remove(&["missing"], true),
            Err(WardenError::ResourceNotFound(_))
        ));

        let removed = pool.remove(&["n1"], true).unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_reset_keeps_active_owners() {
        let mut pool = state(&["n1", "n2", "n3"]);
        pool.allocate(&Requester::exclusive("live"), any(), 1, 5).unwrap();
        pool.allocate(&Requester::exclusive("gone"), any(), 1, 5).unwrap();
        pool.allocate(&Requester::shared("shared"), any(), 1, 5).unwrap();

        assert_eq!(pool.reset(&["live", "shared"]), 1);
        assert_eq!(pool.get("n1").unwrap().owners, vec!["live"]);
        assert!(!pool.get("n2").unwrap().is_allocated());
        assert_eq!(pool.get("n3").unwrap().owners, vec!["shared"]);

        assert_eq!(pool.reset(&[]), 2);
        assert!(!pool.is_in_use());
    }

    #[test]
    fn test_release_counts_only_held_records() {
        let mut pool = state(&["n1", "n2", "n3"]);
        pool.allocate(&Requester::shared("A"), any(), 2, 5).unwrap();
        pool.allocate(&Requester::shared("B"), any(), 1, 5).unwrap();

        // n3 is not held by A, "missing" is not in the pool
        assert_eq!(pool.release("A", &["n1", "n3", "missing"]), 1);
        assert_eq!(pool.get("n1").unwrap().owners, vec!["B"]);
        assert_eq!(pool.allocated_to("A").len(), 1);

        assert_eq!(pool.release("A", &["n2"]), 1);
        assert!(!pool.get("n2").unwrap().is_allocated());
        assert_eq!(pool.release("A", &["n2"]), 0);
    }

    #[test]
    fn test_add_ignores_duplicates() {
        let mut pool = state(&["n1"]);
        let added = pool.add(vec![
            ResourceRecord::new("n1", "ERBS"),
            ResourceRecord::new("n2", "ERBS"),
        ]);
        assert_eq!(added, 1);
        assert_eq!(pool.len(), 2);
    }
}
