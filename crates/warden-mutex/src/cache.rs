//! Named-lock cache
//!
//! Maps each lock name to one `LocalLock`, created on first use and kept for
//! the life of the process. A single bootstrap lock guards the table; it is
//! only held to look up or insert an entry, never while waiting on the
//! `LocalLock` itself, so unrelated names do not queue behind each other.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use warden_common::{Result, WardenError};

use crate::local::LocalLock;
use crate::name::LockName;
use crate::reporter::ErrorReporter;

#[derive(Debug, Default)]
pub struct NamedLockCache {
    bootstrap: Mutex<HashMap<LockName, Arc<LocalLock>>>,
    wait_timeout: Option<Duration>,
}

impl NamedLockCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every local wait by `timeout`; `None` waits forever
    pub fn with_wait_timeout(timeout: Option<Duration>) -> Self {
        Self {
            bootstrap: Mutex::new(HashMap::new()),
            wait_timeout: timeout,
        }
    }

    fn fetch_or_create(&self, name: &LockName) -> Arc<LocalLock> {
        self.bootstrap
            .lock()
            .entry(name.clone())
            .or_insert_with(|| {
                trace!(lock = %name, "Creating local lock");
                Arc::new(LocalLock::new())
            })
            .clone()
    }

    /// Acquire the local lock for `name`, blocking until it is free.
    ///
    /// Only fails when a wait timeout is configured and runs out.
    pub fn acquire_local(&self, name: &LockName) -> Result<()> {
        let lock = self.fetch_or_create(name);

        if !lock.acquire(self.wait_timeout) {
            return Err(WardenError::AcquisitionTimeout {
                name: name.to_string(),
                timeout: self.wait_timeout.unwrap_or_default(),
            });
        }

        self.bootstrap
            .lock()
            .entry(name.clone())
            .or_insert(lock);
        Ok(())
    }

    /// Release the local lock for `name`.
    ///
    /// Failures (unknown name, double release) go to `reporter` and are
    /// otherwise ignored.
    pub fn release_local(&self, name: &LockName, reporter: &dyn ErrorReporter) {
        let lock = self.bootstrap.lock().get(name).cloned();
        let Some(lock) = lock else {
            reporter.report(&WardenError::ReleaseFailure {
                name: name.to_string(),
                reason: "no local lock with this name".to_string(),
            });
            return;
        };

        if let Err(reason) = lock.release() {
            reporter.report(&WardenError::ReleaseFailure {
                name: name.to_string(),
                reason: reason.to_string(),
            });
        }
    }

    pub fn is_locked(&self, name: &LockName) -> bool {
        self.bootstrap
            .lock()
            .get(name)
            .is_some_and(|lock| lock.is_locked())
    }

    pub fn len(&self) -> usize {
        self.bootstrap.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.bootstrap.lock().is_empty()
    }
}
