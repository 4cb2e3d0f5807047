use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Reusable in-process lock that is acquired and released by name rather
/// than through a borrowed guard, so acquire and release may happen in
/// different calls.
#[derive(Debug, Default)]
pub struct LocalLock {
    locked: Mutex<bool>,
    available: Condvar,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then take it.
    ///
    /// With a `timeout`, gives up and returns `false` once it elapses. A
    /// timeout too large to represent as an instant waits without bound.
    pub fn acquire(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.and_then(|timeout| Instant::now().checked_add(timeout));
        let mut locked = self.locked.lock();
        while *locked {
            match deadline {
                None => self.available.wait(&mut locked),
                Some(deadline) => {
                    if self.available.wait_until(&mut locked, deadline).timed_out() && *locked {
                        return false;
                    }
                }
            }
        }
        *locked = true;
        true
    }

    /// Take the lock only if it is free right now
    pub fn try_acquire(&self) -> bool {
        let mut locked = self.locked.lock();
        if *locked {
            return false;
        }
        *locked = true;
        true
    }

    /// Release the lock and wake one waiter.
    ///
    /// Fails when the lock is not held, e.g. on a double release.
    pub fn release(&self) -> Result<(), &'static str> {
        let mut locked = self.locked.lock();
        if !*locked {
            return Err("lock is not held");
        }
        *locked = false;
        self.available.notify_one();
        Ok(())
    }

    pub fn is_locked(&self) -> bool {
        *self.locked.lock()
    }
}
