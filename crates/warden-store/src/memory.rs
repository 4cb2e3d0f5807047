//! In-memory persistence store
//!
//! Holds values in a DashMap and mutex holders in a single table guarded by a
//! `parking_lot` mutex. Waiters sleep on a condition variable and are woken as
//! soon as any token is pushed back, when a lease runs out, or when a
//! stale-holder check is due.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info};

use warden_common::{Result, StoreSettings, WardenError};

use crate::holder::{self, HolderProbe, MIN_STALE_CHECK_INTERVAL, SysinfoProbe};
use crate::{DistributedToken, PersistenceStore};

struct ValueEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl ValueEntry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }
}

/// Earlier of two optional instants, `None` meaning never
fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, None) => a,
        (None, b) => b,
    }
}

struct HolderEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl HolderEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

/// Process-local store implementing the full collaborator contract
pub struct MemoryStore {
    values: DashMap<String, ValueEntry>,
    holders: Mutex<HashMap<String, HolderEntry>>,
    released: Condvar,
    settings: StoreSettings,
    probe: Arc<dyn HolderProbe>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_settings(StoreSettings::default())
    }

    pub fn with_settings(settings: StoreSettings) -> Self {
        Self {
            values: DashMap::new(),
            holders: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            settings,
            probe: Arc::new(SysinfoProbe),
        }
    }

    /// Replace the liveness probe used for stale-holder checks
    pub fn with_probe(mut self, probe: Arc<dyn HolderProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Record an existing holder for `key`, as left behind by another process.
    pub fn insert_holder(&self, key: impl Into<String>, value: impl Into<String>) {
        self.holders.lock().insert(
            key.into(),
            HolderEntry {
                value: value.into(),
                expires_at: None,
            },
        );
    }

    /// Current holder id for `key`, if held
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.holders
            .lock()
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Keys currently held by any token
    pub fn held_keys(&self) -> Vec<String> {
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .holders
            .lock()
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        keys
    }

    /// Drop the current holder of `key` if its process is no longer running.
    ///
    /// The probe runs with the holder table unlocked; the entry is only removed
    /// if it still carries the value that was probed.
    fn reap_if_holder_dead(
        &self,
        holders: &mut MutexGuard<'_, HashMap<String, HolderEntry>>,
        key: &str,
    ) -> bool {
        let Some(current) = holders.get(key).map(|entry| entry.value.clone()) else {
            return false;
        };
        let Some(pid) = holder::parse_holder_pid(&current) else {
            return false;
        };

        let (alive, process_name) = MutexGuard::unlocked(holders, || {
            (self.probe.is_alive(pid), self.probe.describe(pid))
        });
        debug!(
            lock = %key,
            pid,
            process = ?process_name,
            holder = %current,
            "Still waiting for lock to be released"
        );
        if alive {
            return false;
        }

        let still_current = holders
            .get(key)
            .is_some_and(|entry| entry.value == current);
        if still_current {
            holders.remove(key);
            info!(lock = %key, pid, holder = %current, "Released lock held by a process that is no longer running");
        }
        true
    }
}

impl PersistenceStore for MemoryStore {
    fn mutex_pop(&self, key: &str, timeout: Duration) -> Result<DistributedToken> {
        let value = holder::unique_holder_id();
        let deadline = Instant::now().checked_add(timeout);
        let stale_interval = self.settings.stale_check_interval.max(MIN_STALE_CHECK_INTERVAL);
        let mut next_stale_check = Instant::now().checked_add(stale_interval);

        let mut holders = self.holders.lock();
        loop {
            let now = Instant::now();
            if holders.get(key).is_some_and(|entry| entry.is_expired(now)) {
                holders.remove(key);
                debug!(lock = %key, "Lease on lock ran out");
            }

            let Some(current) = holders.get(key) else {
                holders.insert(
                    key.to_string(),
                    HolderEntry {
                        value: value.clone(),
                        expires_at: self.settings.lease.and_then(|lease| now.checked_add(lease)),
                    },
                );
                return Ok(DistributedToken::new(key, value));
            };
            let lease_end = current.expires_at;

            if deadline.is_some_and(|deadline| now >= deadline) {
                return Err(WardenError::AcquisitionTimeout {
                    name: key.to_string(),
                    timeout,
                });
            }

            if self.settings.reap_dead_holders && next_stale_check.is_some_and(|at| now >= at) {
                next_stale_check = now.checked_add(stale_interval);
                if self.reap_if_holder_dead(&mut holders, key) {
                    continue;
                }
            }

            let mut wake_at = deadline;
            if self.settings.reap_dead_holders {
                wake_at = earliest(wake_at, next_stale_check);
            }
            wake_at = earliest(wake_at, lease_end);
            match wake_at {
                Some(at) => {
                    self.released.wait_until(&mut holders, at);
                }
                None => self.released.wait(&mut holders),
            }
        }
    }

    fn mutex_push(&self, token: &DistributedToken) -> Result<()> {
        let mut holders = self.holders.lock();
        let is_current = holders
            .get(token.key())
            .is_some_and(|entry| entry.value == token.value());
        if is_current {
            holders.remove(token.key());
            self.released.notify_all();
        } else {
            debug!(lock = %token.key(), holder = %token.value(), "Token is no longer current, nothing to release");
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(entry) = self.values.get(key)
            && !entry.is_expired()
        {
            return Ok(Some(entry.value.clone()));
        }
        self.values.remove_if(key, |_, entry| entry.is_expired());
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        self.values.insert(
            key.to_string(),
            ValueEntry {
                value: value.to_string(),
                expires_at: ttl.and_then(|ttl| Instant::now().checked_add(ttl)),
            },
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<bool> {
        Ok(self
            .values
            .remove(key)
            .is_some_and(|(_, entry)| !entry.is_expired()))
    }

    fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.get(key)?.is_some() || self.holder(key).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PersistenceStoreExt;

    struct DeadProbe;

    impl HolderProbe for DeadProbe {
        fn is_alive(&self, _pid: u32) -> bool {
            false
        }
    }

    /// Reports every holder alive and counts the checks
    #[derive(Default)]
    struct CountingLiveness {
        calls: std::sync::atomic::AtomicUsize,
    }

    impl HolderProbe for CountingLiveness {
        fn is_alive(&self, _pid: u32) -> bool {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            true
        }
    }

    fn fast_settings() -> StoreSettings {
        StoreSettings {
            stale_check_interval: Duration::from_millis(20),
            reap_dead_holders: false,
            ..Default::default()
        }
    }

    #[test]
    fn test_pop_and_push() {
        let store = MemoryStore::with_settings(fast_settings());

        let token = store
            .mutex_pop("mutex-a", Duration::from_millis(50))
            .unwrap();
        assert_eq!(token.key(), "mutex-a");
        assert_eq!(token.holder_pid(), Some(std::process::id()));
        assert_eq!(store.holder("mutex-a").as_deref(), Some(token.value()));

        store.mutex_push(&token).unwrap();
        assert!(store.holder("mutex-a").is_none());

        // Available again without waiting
        let again = store.mutex_pop("mutex-a", Duration::ZERO).unwrap();
        assert_ne!(again.value(), token.value());
    }

    #[test]
    fn test_pop_times_out_while_held() {
        let store = MemoryStore::with_settings(fast_settings());
        let _held = store.mutex_pop("mutex-a", Duration::ZERO).unwrap();

        let start = Instant::now();
        let err = store
            .mutex_pop("mutex-a", Duration::from_millis(40))
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_push_of_stale_token_is_ignored() {
        let store = MemoryStore::with_settings(fast_settings());
        let token = store.mutex_pop("mutex-a", Duration::ZERO).unwrap();

        let stale = DistributedToken::new("mutex-a", "pid1_other");
        store.mutex_push(&stale).unwrap();
        assert_eq!(store.holder("mutex-a").as_deref(), Some(token.value()));
    }

    #[test]
    fn test_push_wakes_waiter() {
        let store = Arc::new(MemoryStore::with_settings(fast_settings()));
        let token = store.mutex_pop("mutex-a", Duration::ZERO).unwrap();

        let waiter = {
            let store = store.clone();
            std::thread::spawn(move || store.mutex_pop("mutex-a", Duration::from_secs(5)))
        };
        std::thread::sleep(Duration::from_millis(20));
        store.mutex_push(&token).unwrap();

        let next = waiter.join().unwrap().unwrap();
        assert_eq!(store.holder("mutex-a").as_deref(), Some(next.value()));
    }

    #[test]
    fn test_dead_holder_is_reaped() {
        let settings = StoreSettings {
            reap_dead_holders: true,
            ..fast_settings()
        };
        let store = MemoryStore::with_settings(settings).with_probe(Arc::new(DeadProbe));
        store.insert_holder("mutex-a", "pid4000000_gone");

        let token = store
            .mutex_pop("mutex-a", Duration::from_secs(2))
            .unwrap();
        assert_eq!(store.holder("mutex-a").as_deref(), Some(token.value()));
    }

    #[test]
    fn test_dead_holder_kept_when_reaping_disabled() {
        let store = MemoryStore::with_settings(fast_settings()).with_probe(Arc::new(DeadProbe));
        store.insert_holder("mutex-a", "pid4000000_gone");

        let err = store
            .mutex_pop("mutex-a", Duration::from_millis(60))
            .unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_lease_expiry_frees_lock() {
        let settings = StoreSettings {
            lease: Some(Duration::from_millis(30)),
            ..fast_settings()
        };
        let store = MemoryStore::with_settings(settings);
        let first = store.mutex_pop("mutex-a", Duration::ZERO).unwrap();

        let second = store
            .mutex_pop("mutex-a", Duration::from_secs(2))
            .unwrap();
        assert_ne!(first.value(), second.value());
    }

    #[test]
    fn test_unbounded_timeout_waits_for_push() {
        let store = Arc::new(MemoryStore::with_settings(fast_settings()));
        assert!(store.mutex_pop("mutex-free", Duration::MAX).is_ok());

        let token = store.mutex_pop("mutex-a", Duration::MAX).unwrap();
        let waiter = {
            let store = store.clone();
            std::thread::spawn(move || store.mutex_pop("mutex-a", Duration::MAX))
        };
        std::thread::sleep(Duration::from_millis(20));
        store.mutex_push(&token).unwrap();

        assert!(waiter.join().unwrap().is_ok());
    }

    #[test]
    fn test_unbounded_lease_and_ttl_never_expire() {
        let settings = StoreSettings {
            lease: Some(Duration::MAX),
            ..fast_settings()
        };
        let store = MemoryStore::with_settings(settings);
        let token = store.mutex_pop("mutex-a", Duration::ZERO).unwrap();
        assert_eq!(store.holder("mutex-a").as_deref(), Some(token.value()));
        assert!(store.mutex_pop("mutex-a", Duration::from_millis(10)).is_err());

        store.set("k", "v", Some(Duration::MAX)).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_zero_stale_interval_does_not_spin() {
        let settings = StoreSettings {
            stale_check_interval: Duration::ZERO,
            reap_dead_holders: true,
            ..fast_settings()
        };
        let liveness = Arc::new(CountingLiveness::default());
        let store = MemoryStore::with_settings(settings).with_probe(liveness.clone());
        store.insert_holder("mutex-a", "pid4000000_alive");

        let err = store
            .mutex_pop("mutex-a", Duration::from_millis(60))
            .unwrap_err();
        assert!(err.is_timeout());
        // One check per 10ms floor, plus slack for scheduling
        assert!(liveness.calls.load(std::sync::atomic::Ordering::SeqCst) <= 10);
    }

    #[test]
    fn test_values_with_ttl() {
        let store = MemoryStore::new();
        store.set("k", "v", None).unwrap();
        store
            .set("short", "v", Some(Duration::from_millis(10)))
            .unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("v"));
        assert!(store.has_key("short").unwrap());

        std::thread::sleep(Duration::from_millis(20));
        assert!(store.get("short").unwrap().is_none());
        assert!(!store.has_key("short").unwrap());

        assert!(store.remove("k").unwrap());
        assert!(!store.remove("k").unwrap());
    }

    #[test]
    fn test_json_helpers() {
        let store = MemoryStore::new();
        store.set_json("nums", &vec![1, 2, 3], None).unwrap();
        let nums: Option<Vec<u32>> = store.get_json("nums").unwrap();
        assert_eq!(nums, Some(vec![1, 2, 3]));

        let missing: Option<Vec<u32>> = store.get_json("missing").unwrap();
        assert!(missing.is_none());
    }
}
