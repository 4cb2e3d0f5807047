use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A party asking the pool for records
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requester {
    pub name: String,
    pub exclusive: bool,
}

impl Requester {
    pub fn shared(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exclusive: false,
        }
    }

    pub fn exclusive(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            exclusive: true,
        }
    }
}

/// One allocatable unit in the pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRecord {
    pub id: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Names of the requesters currently holding this record
    #[serde(default)]
    pub owners: Vec<String>,
    /// Set when an exclusive requester took the record; cleared with the last owner
    #[serde(default)]
    pub exclusive: bool,
    /// Unix milliseconds of the first current owner's allocation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allocated_at: Option<i64>,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            host: None,
            owners: Vec::new(),
            exclusive: false,
            allocated_at: None,
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    pub fn is_allocated(&self) -> bool {
        !self.owners.is_empty()
    }

    pub fn allocated_since(&self) -> Option<DateTime<Utc>> {
        self.allocated_at.and_then(DateTime::from_timestamp_millis)
    }

    pub fn is_owned_by(&self, name: &str) -> bool {
        self.owners.iter().any(|owner| owner == name)
    }

    /// Whether this record is unavailable to `requester`.
    ///
    /// A held record is used if it is exclusive, or if the requester itself
    /// wants exclusivity. Exclusivity only ever blocks in one direction.
    pub fn is_used_for(&self, requester: &Requester) -> bool {
        self.is_allocated() && (self.exclusive || requester.exclusive)
    }

    pub(crate) fn assign(&mut self, requester: &Requester, now: i64) {
        if self.is_owned_by(&requester.name) {
            return;
        }
        if self.owners.is_empty() {
            self.allocated_at = Some(now);
        }
        self.owners.push(requester.name.clone());
        self.exclusive |= requester.exclusive;
    }

    /// Drop `name` from the owners; returns whether it was an owner
    pub(crate) fn unassign(&mut self, name: &str) -> bool {
        let before = self.owners.len();
        self.owners.retain(|owner| owner != name);
        if self.owners.is_empty() {
            self.exclusive = false;
            self.allocated_at = None;
        }
        self.owners.len() != before
    }

    pub(crate) fn reset(&mut self) {
        self.owners.clear();
        self.exclusive = false;
        self.allocated_at = None;
    }
}
