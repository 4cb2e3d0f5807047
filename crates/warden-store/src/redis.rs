//! Redis-backed persistence store.
//!
//! Tokens are plain keys written with `SET key holder-id NX [PX lease]`. A
//! waiter retries every `poll_interval` until the set succeeds or its timeout
//! runs out. Pushing a token runs a compare-and-delete script so a holder can
//! never release a lock that has since passed to someone else.

use std::sync::Arc;
use std::time::{Duration, Instant};

use redis::{Client, Connection, Script};
use tracing::{debug, info};

use warden_common::{Result, StoreSettings, WardenError};

use crate::holder::{self, HolderProbe, MIN_STALE_CHECK_INTERVAL, SysinfoProbe};
use crate::{DistributedToken, PersistenceStore};

const UNLOCK_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end"#;

fn store_err(e: redis::RedisError) -> WardenError {
    WardenError::StoreError(e.to_string())
}

/// `PX` argument for a duration. Redis rejects `PX 0`, so sub-millisecond
/// durations round up to one millisecond.
fn px_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// Store shared by every process pointing at the same Redis instance
pub struct RedisStore {
    client: Client,
    settings: StoreSettings,
    probe: Arc<dyn HolderProbe>,
}

impl RedisStore {
    /// Create a store for the given URL.
    ///
    /// Example URLs:
    /// - `redis://127.0.0.1/`
    /// - `redis://127.0.0.1:6379/2`
    pub fn open(url: &str, settings: StoreSettings) -> Result<Self> {
        let client = Client::open(url).map_err(store_err)?;
        Ok(Self {
            client,
            settings,
            probe: Arc::new(SysinfoProbe),
        })
    }

    pub fn with_probe(mut self, probe: Arc<dyn HolderProbe>) -> Self {
        self.probe = probe;
        self
    }

    fn connection(&self) -> Result<Connection> {
        self.client.get_connection().map_err(store_err)
    }

    fn try_set_nx(&self, conn: &mut Connection, key: &str, value: &str) -> Result<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(lease) = self.settings.lease {
            cmd.arg("PX").arg(px_millis(lease));
        }
        let reply: Option<String> = cmd.query(conn).map_err(store_err)?;
        Ok(reply.is_some())
    }

    fn compare_and_delete(conn: &mut Connection, key: &str, value: &str) -> Result<bool> {
        let deleted: i64 = Script::new(UNLOCK_SCRIPT)
            .key(key)
            .arg(value)
            .invoke(conn)
            .map_err(store_err)?;
        Ok(deleted == 1)
    }

    fn release_if_holder_not_running(&self, conn: &mut Connection, key: &str) -> Result<()> {
        let current: Option<String> = redis::cmd("GET")
            .arg(key)
            .query(conn)
            .map_err(store_err)?;
        let Some(current) = current else {
            return Ok(());
        };
        let Some(pid) = holder::parse_holder_pid(&current) else {
            return Ok(());
        };

        debug!(
            lock = %key,
            pid,
            process = ?self.probe.describe(pid),
            holder = %current,
            "Still waiting for lock to be released"
        );
        if !self.probe.is_alive(pid) && Self::compare_and_delete(conn, key, &current)? {
            info!(lock = %key, pid, holder = %current, "Released lock held by a process that is no longer running");
        }
        Ok(())
    }
}

impl PersistenceStore for RedisStore {
    fn mutex_pop(&self, key: &str, timeout: Duration) -> Result<DistributedToken> {
        let mut conn = self.connection()?;
        let value = holder::unique_holder_id();
        let deadline = Instant::now().checked_add(timeout);
        let stale_interval = self.settings.stale_check_interval.max(MIN_STALE_CHECK_INTERVAL);
        let mut next_stale_check = Instant::now().checked_add(stale_interval);

        loop {
            if self.try_set_nx(&mut conn, key, &value)? {
                return Ok(DistributedToken::new(key, value));
            }

            let now = Instant::now();
            if deadline.is_some_and(|deadline| now >= deadline) {
                return Err(WardenError::AcquisitionTimeout {
                    name: key.to_string(),
                    timeout,
                });
            }

            if self.settings.reap_dead_holders && next_stale_check.is_some_and(|at| now >= at) {
                next_stale_check = now.checked_add(stale_interval);
                self.release_if_holder_not_running(&mut conn, key)?;
                continue;
            }

            let nap = match deadline {
                Some(deadline) => self.settings.poll_interval.min(deadline - now),
                None => self.settings.poll_interval,
            };
            std::thread::sleep(nap);
        }
    }

    fn mutex_push(&self, token: &DistributedToken) -> Result<()> {
        let mut conn = self.connection()?;
        if !Self::compare_and_delete(&mut conn, token.key(), token.value())? {
            debug!(lock = %token.key(), holder = %token.value(), "Token is no longer current, nothing to release");
        }
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection()?;
        redis::cmd("GET").arg(key).query(&mut conn).map_err(store_err)
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(ttl) = ttl {
            cmd.arg("PX").arg(px_millis(ttl));
        }
        cmd.query::<()>(&mut conn).map_err(store_err)
    }

    fn remove(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        let removed: i64 = redis::cmd("DEL")
            .arg(key)
            .query(&mut conn)
            .map_err(store_err)?;
        Ok(removed > 0)
    }

    fn has_key(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection()?;
        let exists: i64 = redis::cmd("EXISTS")
            .arg(key)
            .query(&mut conn)
            .map_err(store_err)?;
        Ok(exists > 0)
    }
}
