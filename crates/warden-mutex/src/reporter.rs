use tracing::warn;

use warden_common::WardenError;

/// Sink for non-fatal errors raised while cleaning up a mutex.
///
/// Release failures are handed here instead of being returned, so a bad
/// release never interrupts the caller's control flow.
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &WardenError);
}

/// Reports through `tracing` at warn level
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, error: &WardenError) {
        warn!(error = %error, "Suppressed error during mutex release");
    }
}
