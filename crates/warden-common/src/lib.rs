//! Warden Common - Shared types and utilities
//!
//! This crate provides the foundational pieces used across all Warden components:
//! - Error taxonomy (`WardenError`)
//! - Configuration loading and typed settings
//! - Logging initialization

pub mod config;
pub mod error;
pub mod logging;

// Re-exports for convenience
pub use config::{Configuration, MutexSettings, PoolSettings, StoreSettings};
pub use error::{Result, WardenError};

/// Prefix applied to identifiers that do not already name a mutex
pub const MUTEX_PREFIX: &str = "mutex-";

/// Marker substring that makes an identifier a lock name as-is
pub const MUTEX_MARKER: &str = "mutex";

/// Default facade wait for a distributed mutex, in seconds
pub const DEFAULT_MUTEX_TIMEOUT_SECS: u64 = 30;

/// Default persistence key of the resource pool
pub const DEFAULT_POOL_KEY: &str = "workload_pool";

/// Default identifier of the pool-wide mutex
pub const DEFAULT_POOL_MUTEX: &str = "node-mgr-pool-operation";
