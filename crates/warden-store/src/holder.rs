//! Holder identity for distributed tokens.
//!
//! Every pop writes a unique holder id of the form `pid<PID>_<uuid>` as the
//! token value. Waiters use the PID to tell whether the current holder is
//! still running on this host.

use std::time::Duration;

use sysinfo::{Pid, ProcessesToUpdate, System};

/// Floor for the stale-holder check interval, so a zero setting cannot
/// turn a wait loop into a busy loop over the process table
pub(crate) const MIN_STALE_CHECK_INTERVAL: Duration = Duration::from_millis(10);

/// Generate a fresh holder id for the current process
pub fn unique_holder_id() -> String {
    format!("pid{}_{}", std::process::id(), uuid::Uuid::new_v4().simple())
}

/// Extract the PID from a holder id, `None` for foreign values
pub fn parse_holder_pid(value: &str) -> Option<u32> {
    value
        .strip_prefix("pid")?
        .split('_')
        .next()
        .and_then(|pid| pid.parse().ok())
}

/// Liveness check for the process behind a holder id
pub trait HolderProbe: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;

    /// Human readable name of the process, for logs
    fn describe(&self, _pid: u32) -> Option<String> {
        None
    }
}

/// Probe backed by the local process table
#[derive(Debug, Default, Clone, Copy)]
pub struct SysinfoProbe;

impl SysinfoProbe {
    fn lookup(pid: u32) -> Option<String> {
        let pid = Pid::from_u32(pid);
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        sys.process(pid)
            .map(|process| process.name().to_string_lossy().into_owned())
    }
}

impl HolderProbe for SysinfoProbe {
    fn is_alive(&self, pid: u32) -> bool {
        Self::lookup(pid).is_some()
    }

    fn describe(&self, pid: u32) -> Option<String> {
        Self::lookup(pid)
    }
}
