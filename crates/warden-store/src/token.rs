use std::fmt;

use serde::{Deserialize, Serialize};

use crate::holder;

/// Ownership credential for a cross-process mutex.
///
/// `key` is the lock name, `value` the unique holder id written by the pop
/// that produced it. Both are needed to push it back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DistributedToken {
    key: String,
    value: String,
}

impl DistributedToken {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// PID of the process that popped this token, if the value is a holder id
    pub fn holder_pid(&self) -> Option<u32> {
        holder::parse_holder_pid(&self.value)
    }
}

impl fmt::Display for DistributedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.key, self.value)
    }
}
