//! Warden Pool - allocation of scarce shared resources
//!
//! A pool is an ordered list of [`ResourceRecord`]s persisted as one JSON
//! document in the shared store. Every mutation is a read-modify-write done
//! while holding the pool-wide distributed mutex, so processes on different
//! hosts see a consistent view between mutations.
//!
//! Ownership rules:
//! - a record may be shared by several non-exclusive requesters
//! - a requester demanding exclusivity only gets records nobody holds
//! - once held exclusively, a record is used with respect to everyone else
//!   until its last owner releases it

pub mod filters;
pub mod pool;
pub mod record;

pub use pool::{PoolState, ResourcePool};
pub use record::{Requester, ResourceRecord};
