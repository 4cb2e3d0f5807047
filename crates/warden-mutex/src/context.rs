//! Scoped mutex facade
//!
//! `MutexContext` is the single entry point for protecting a critical
//! section. It normalizes the identifier, picks the local or distributed
//! strategy, and releases on every exit path: normal return, returned error,
//! or panic. Release failures are reported and suppressed; errors raised
//! by the protected block are logged and handed back unchanged.
//!
//! Lifecycle of one use: idle, acquiring, held, releasing, idle. Only the
//! acquiring step can fail in a way the caller sees.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info};

use warden_common::{DEFAULT_MUTEX_TIMEOUT_SECS, MutexSettings, Result, WardenError};
use warden_store::{DistributedToken, PersistenceStore};

use crate::cache::NamedLockCache;
use crate::distributed::DistributedMutexClient;
use crate::name::LockName;
use crate::registry::HeldMutexRegistry;
use crate::reporter::{ErrorReporter, TracingReporter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutexMode {
    /// In-process only, backed by the named-lock cache
    Local,
    /// Cross-process, backed by a token in the shared store
    Distributed,
}

/// Per-call options for the facade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutexOptions {
    /// Use a distributed token instead of a local lock
    pub persisted: bool,
    /// Maximum wait for a distributed token
    pub timeout: Duration,
    /// Emit acquire/release progress at debug level
    pub log_output: bool,
}

impl Default for MutexOptions {
    fn default() -> Self {
        Self {
            persisted: false,
            timeout: Duration::from_secs(DEFAULT_MUTEX_TIMEOUT_SECS),
            log_output: false,
        }
    }
}

impl MutexOptions {
    pub fn local() -> Self {
        Self::default()
    }

    pub fn persisted() -> Self {
        Self {
            persisted: true,
            ..Default::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_log_output(mut self, log_output: bool) -> Self {
        self.log_output = log_output;
        self
    }

    pub fn mode(&self) -> MutexMode {
        if self.persisted {
            MutexMode::Distributed
        } else {
            MutexMode::Local
        }
    }
}

/// Process-wide mutex state: the named-lock cache, the distributed client
/// and its held-token registry.
///
/// Build one at startup, share it by reference (or `Arc`), and call
/// [`MutexContext::terminate_all`] from the shutdown sequence.
pub struct MutexContext {
    locals: NamedLockCache,
    distributed: DistributedMutexClient,
    reporter: Arc<dyn ErrorReporter>,
    settings: MutexSettings,
}

impl MutexContext {
    pub fn new(store: Arc<dyn PersistenceStore>, settings: MutexSettings) -> Self {
        let registry = Arc::new(HeldMutexRegistry::new());
        Self {
            locals: NamedLockCache::with_wait_timeout(settings.local_timeout),
            distributed: DistributedMutexClient::new(store, registry),
            reporter: Arc::new(TracingReporter),
            settings,
        }
    }

    /// Replace the sink for suppressed release errors
    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Local-mode options carrying the configured defaults
    pub fn options(&self) -> MutexOptions {
        MutexOptions {
            persisted: false,
            timeout: self.settings.default_timeout,
            log_output: self.settings.log_output,
        }
    }

    pub fn settings(&self) -> &MutexSettings {
        &self.settings
    }

    pub fn locals(&self) -> &NamedLockCache {
        &self.locals
    }

    pub fn registry(&self) -> &HeldMutexRegistry {
        self.distributed.registry()
    }

    /// Acquire the mutex for `identifier` and return a guard that releases it on drop.
    pub fn lock(&self, identifier: &str, options: &MutexOptions) -> Result<ScopedMutexGuard<'_>> {
        let name = LockName::from_identifier(identifier);
        let mode = options.mode();
        if options.log_output {
            debug!(lock = %name, mode = ?mode, "Attempting to acquire mutex");
        }

        let held = match mode {
            MutexMode::Local => {
                self.locals.acquire_local(&name)?;
                Held::Local
            }
            MutexMode::Distributed => {
                Held::Distributed(self.distributed.acquire_distributed(&name, options.timeout)?)
            }
        };

        if options.log_output {
            debug!(lock = %name, mode = ?mode, "Mutex acquired");
        }
        Ok(ScopedMutexGuard {
            context: self,
            name,
            mode,
            held: Some(held),
            log_output: options.log_output,
        })
    }

    /// Run `f` while holding the mutex for `identifier`.
    ///
    /// An error returned by `f` is logged with the lock name and mode, then
    /// returned unchanged after the mutex has been released.
    pub fn with_mutex<T, E, F>(
        &self,
        identifier: &str,
        options: &MutexOptions,
        f: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> std::result::Result<T, E>,
        E: From<WardenError> + fmt::Display,
    {
        let guard = self.lock(identifier, options)?;
        let result = f();
        if let Err(e) = &result {
            error!(
                lock = %guard.name(),
                mode = ?guard.mode(),
                error = %e,
                "Error raised while holding mutex"
            );
        }
        guard.release();
        result
    }

    /// Push back every distributed token this process still holds.
    ///
    /// Meant for the controlled shutdown sequence only. A process that exits
    /// without calling this leaves its tokens held in the store, and every
    /// later waiter on those names times out until the holder is reaped or an
    /// operator clears the key.
    pub fn terminate_all(&self) -> usize {
        let tokens = self.registry().snapshot();
        for token in &tokens {
            self.distributed
                .release_distributed(token, self.reporter.as_ref());
        }
        self.registry().clear();
        if !tokens.is_empty() {
            info!(count = tokens.len(), "Released all held distributed mutexes");
        }
        tokens.len()
    }
}

enum Held {
    Local,
    Distributed(DistributedToken),
}

/// Holds one mutex until dropped or explicitly released
#[must_use = "the mutex is released as soon as the guard is dropped"]
pub struct ScopedMutexGuard<'a> {
    context: &'a MutexContext,
    name: LockName,
    mode: MutexMode,
    held: Option<Held>,
    log_output: bool,
}

impl ScopedMutexGuard<'_> {
    pub fn name(&self) -> &LockName {
        &self.name
    }

    pub fn mode(&self) -> MutexMode {
        self.mode
    }

    /// The distributed token backing this guard, if any
    pub fn token(&self) -> Option<&DistributedToken> {
        match &self.held {
            Some(Held::Distributed(token)) => Some(token),
            _ => None,
        }
    }

    pub fn release(mut self) {
        self.release_held();
    }

    fn release_held(&mut self) {
        let Some(held) = self.held.take() else {
            return;
        };
        let reporter = self.context.reporter.as_ref();
        match held {
            Held::Local => self.context.locals.release_local(&self.name, reporter),
            Held::Distributed(token) => self.context.distributed.release_distributed(&token, reporter),
        }
        if self.log_output {
            debug!(lock = %self.name, mode = ?self.mode, "Mutex released");
        }
    }
}

impl Drop for ScopedMutexGuard<'_> {
    fn drop(&mut self) {
        if self.held.is_some() && std::thread::panicking() {
            error!(lock = %self.name, mode = ?self.mode, "Panic raised while holding mutex");
        }
        self.release_held();
    }
}

impl fmt::Debug for ScopedMutexGuard<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedMutexGuard")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("held", &self.held.is_some())
            .finish()
    }
}
