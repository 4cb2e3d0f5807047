//! Warden Mutex - scoped local and distributed mutual exclusion
//!
//! This crate provides:
//! - Lock name normalization (`LockName`)
//! - A named cache of reusable in-process locks (`NamedLockCache`)
//! - A client for cross-process tokens held in a shared store (`DistributedMutexClient`)
//! - The registry of tokens this process still holds (`HeldMutexRegistry`)
//! - The facade every caller goes through (`MutexContext`)
//!
//! A `MutexContext` is built once per process and shared by reference:
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use warden_common::MutexSettings;
//! use warden_mutex::{MutexContext, MutexOptions};
//! use warden_store::MemoryStore;
//!
//! let context = MutexContext::new(Arc::new(MemoryStore::new()), MutexSettings::default());
//! let total = context.with_mutex("persist-node-1", &MutexOptions::persisted(), || {
//!     Ok::<_, warden_common::WardenError>(1 + 1)
//! })?;
//! assert_eq!(total, 2);
//! context.terminate_all();
//! # Ok::<(), warden_common::WardenError>(())
//! ```

mod cache;
mod context;
mod distributed;
mod local;
mod name;
mod registry;
mod reporter;

pub use cache::NamedLockCache;
pub use context::{MutexContext, MutexMode, MutexOptions, ScopedMutexGuard};
pub use distributed::DistributedMutexClient;
pub use local::LocalLock;
pub use name::{LockName, normalize};
pub use registry::HeldMutexRegistry;
pub use reporter::{ErrorReporter, TracingReporter};
