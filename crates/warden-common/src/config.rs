//! Configuration management for Warden
//!
//! Values come from an optional configuration file layered under
//! `WARDEN_`-prefixed environment variables (`WARDEN_MUTEX__TIMEOUT_SECS=10`
//! maps to `mutex.timeout_secs`). Every getter falls back to a default.

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment};

use crate::error::Result;
use crate::{DEFAULT_MUTEX_TIMEOUT_SECS, DEFAULT_POOL_KEY, DEFAULT_POOL_MUTEX};

pub const MUTEX_TIMEOUT_SECS: &str = "mutex.timeout_secs";
pub const MUTEX_LOCAL_TIMEOUT_MS: &str = "mutex.local_timeout_ms";
pub const MUTEX_LOG_OUTPUT: &str = "mutex.log_output";
pub const STORE_POLL_INTERVAL_MS: &str = "store.poll_interval_ms";
pub const STORE_STALE_CHECK_INTERVAL_SECS: &str = "store.stale_check_interval_secs";
pub const STORE_REAP_DEAD_HOLDERS: &str = "store.reap_dead_holders";
pub const STORE_LEASE_MS: &str = "store.lease_ms";
pub const STORE_REDIS_URL: &str = "store.redis_url";
pub const POOL_KEY: &str = "pool.key";
pub const POOL_MUTEX: &str = "pool.mutex";
pub const POOL_MUTEX_TIMEOUT_SECS: &str = "pool.mutex_timeout_secs";
pub const POOL_LOG_OUTPUT: &str = "pool.log_output";

/// Application configuration loaded from a config file and the environment
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration from an optional file plus `WARDEN_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix("WARDEN")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        Ok(Self {
            config: builder.build()?,
        })
    }

    /// Create a new configuration from a Config instance
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    // ===================== Mutex Configuration =====================

    /// Default wait for a distributed mutex (default: 30s)
    pub fn mutex_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64(MUTEX_TIMEOUT_SECS, DEFAULT_MUTEX_TIMEOUT_SECS))
    }

    /// Bound on local lock waits; `None` (the default, `0`) waits forever
    pub fn local_lock_timeout(&self) -> Option<Duration> {
        match self.get_u64(MUTEX_LOCAL_TIMEOUT_MS, 0) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn mutex_log_output(&self) -> bool {
        self.config.get_bool(MUTEX_LOG_OUTPUT).unwrap_or(false)
    }

    // ===================== Store Configuration =====================

    /// Delay between set-if-absent attempts while waiting on a token (default: 200ms)
    pub fn store_poll_interval(&self) -> Duration {
        Duration::from_millis(self.get_u64(STORE_POLL_INTERVAL_MS, 200))
    }

    /// How often a waiter checks whether the current holder is still alive (default: 30s)
    pub fn store_stale_check_interval(&self) -> Duration {
        Duration::from_secs(self.get_u64(STORE_STALE_CHECK_INTERVAL_SECS, 30))
    }

    pub fn store_reap_dead_holders(&self) -> bool {
        self.config.get_bool(STORE_REAP_DEAD_HOLDERS).unwrap_or(true)
    }

    /// Token lease; `None` (the default, `0`) means tokens never expire
    pub fn store_lease(&self) -> Option<Duration> {
        match self.get_u64(STORE_LEASE_MS, 0) {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    pub fn store_redis_url(&self) -> Option<String> {
        self.config.get_string(STORE_REDIS_URL).ok()
    }

    // ===================== Pool Configuration =====================

    pub fn pool_key(&self) -> String {
        self.config
            .get_string(POOL_KEY)
            .unwrap_or_else(|_| DEFAULT_POOL_KEY.to_string())
    }

    pub fn pool_mutex(&self) -> String {
        self.config
            .get_string(POOL_MUTEX)
            .unwrap_or_else(|_| DEFAULT_POOL_MUTEX.to_string())
    }

    /// Wait for the pool mutex (default: 300s, allocations may hold it for a while)
    pub fn pool_mutex_timeout(&self) -> Duration {
        Duration::from_secs(self.get_u64(POOL_MUTEX_TIMEOUT_SECS, 300))
    }

    /// Log pool mutex acquire/release at debug level (default: true)
    pub fn pool_log_output(&self) -> bool {
        self.config.get_bool(POOL_LOG_OUTPUT).unwrap_or(true)
    }

    // ===================== Typed Settings =====================

    pub fn mutex_settings(&self) -> MutexSettings {
        MutexSettings {
            default_timeout: self.mutex_timeout(),
            local_timeout: self.local_lock_timeout(),
            log_output: self.mutex_log_output(),
        }
    }

    pub fn store_settings(&self) -> StoreSettings {
        StoreSettings {
            poll_interval: self.store_poll_interval(),
            stale_check_interval: self.store_stale_check_interval(),
            reap_dead_holders: self.store_reap_dead_holders(),
            lease: self.store_lease(),
        }
    }

    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            key: self.pool_key(),
            mutex: self.pool_mutex(),
            mutex_timeout: self.pool_mutex_timeout(),
            log_output: self.pool_log_output(),
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> u64 {
        self.config
            .get_int(key)
            .ok()
            .and_then(|v| u64::try_from(v).ok())
            .unwrap_or(default)
    }
}

/// Settings for the scoped mutex facade
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutexSettings {
    /// Wait applied when a caller does not pass its own timeout
    pub default_timeout: Duration,
    /// Optional bound on local lock waits
    pub local_timeout: Option<Duration>,
    /// Emit acquire/release progress at debug level by default
    pub log_output: bool,
}

impl Default for MutexSettings {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_secs(DEFAULT_MUTEX_TIMEOUT_SECS),
            local_timeout: None,
            log_output: false,
        }
    }
}

/// Settings for persistence store implementations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreSettings {
    /// Retry delay for polling backends (Redis); the memory store is woken
    /// directly on release and ignores it
    pub poll_interval: Duration,
    /// How often a waiter checks whether the holder process is still running,
    /// never more often than every 10ms
    pub stale_check_interval: Duration,
    pub reap_dead_holders: bool,
    pub lease: Option<Duration>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            stale_check_interval: Duration::from_secs(30),
            reap_dead_holders: true,
            lease: None,
        }
    }
}

/// Settings for the resource pool allocator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolSettings {
    /// Store key holding the serialized pool
    pub key: String,
    /// Identifier of the pool-wide mutex (normalized like any other)
    pub mutex: String,
    pub mutex_timeout: Duration,
    pub log_output: bool,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            key: DEFAULT_POOL_KEY.to_string(),
            mutex: DEFAULT_POOL_MUTEX.to_string(),
            mutex_timeout: Duration::from_secs(300),
            log_output: true,
        }
    }
}
