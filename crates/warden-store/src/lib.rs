//! Warden Store - the shared persistence collaborator
//!
//! Mutexes and pools coordinate across processes only through a store that
//! offers two things:
//! - a blocking pop/push pair handing out one ownership token per key
//! - plain key/value reads and writes with an optional TTL
//!
//! Backends:
//! - [`MemoryStore`]: process-local, always available (tests, single process)
//! - `RedisStore`: shared between hosts (feature: `redis-backend`)

pub mod holder;
pub mod memory;
pub mod token;

#[cfg(feature = "redis-backend")]
pub mod redis;

use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;

use warden_common::Result;

pub use holder::{HolderProbe, SysinfoProbe};
pub use memory::MemoryStore;
pub use token::DistributedToken;

#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;

/// Contract of the external persistence store
pub trait PersistenceStore: Send + Sync {
    /// Block until the token for `key` is available, or fail with
    /// `AcquisitionTimeout` once `timeout` elapses.
    fn mutex_pop(&self, key: &str, timeout: Duration) -> Result<DistributedToken>;

    /// Hand the token back so the next waiter can take it.
    ///
    /// Only removes the key while it still carries the token's value; pushing
    /// a token that is no longer current is a no-op.
    fn mutex_push(&self, token: &DistributedToken) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write a value; `ttl` of `None` keeps it until removed.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Returns whether the key existed
    fn remove(&self, key: &str) -> Result<bool>;

    fn has_key(&self, key: &str) -> Result<bool>;
}

/// Typed JSON helpers over any store
pub trait PersistenceStoreExt: PersistenceStore {
    fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw, ttl)
    }
}

impl<S: PersistenceStore + ?Sized> PersistenceStoreExt for S {}
