use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use warden_common::{Result, WardenError};
use warden_store::{DistributedToken, PersistenceStore};

use crate::name::LockName;
use crate::registry::HeldMutexRegistry;
use crate::reporter::ErrorReporter;

/// Obtains and hands back cross-process tokens through the shared store,
/// keeping the held-mutex registry in step.
pub struct DistributedMutexClient {
    store: Arc<dyn PersistenceStore>,
    registry: Arc<HeldMutexRegistry>,
}

impl DistributedMutexClient {
    pub fn new(store: Arc<dyn PersistenceStore>, registry: Arc<HeldMutexRegistry>) -> Self {
        Self { store, registry }
    }

    /// Wait up to `timeout` for the token of `name`.
    ///
    /// Fails with `AcquisitionTimeout` when no token became available, or
    /// with whatever error the store raised. Nothing is recorded on failure.
    pub fn acquire_distributed(&self, name: &LockName, timeout: Duration) -> Result<DistributedToken> {
        let token = self.store.mutex_pop(name.as_str(), timeout)?;
        debug!(lock = %name, holder = %token.value(), "Distributed lock obtained");
        self.registry.record(token.clone());
        Ok(token)
    }

    /// Push `token` back and drop it from the registry.
    ///
    /// Store failures go to `reporter`; the registry entry is removed regardless.
    pub fn release_distributed(&self, token: &DistributedToken, reporter: &dyn ErrorReporter) {
        if let Err(e) = self.store.mutex_push(token) {
            reporter.report(&WardenError::ReleaseFailure {
                name: token.key().to_string(),
                reason: e.to_string(),
            });
        }
        self.registry.forget(token);
    }

    pub fn registry(&self) -> &HeldMutexRegistry {
        &self.registry
    }
}
