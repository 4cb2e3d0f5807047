use std::fmt;

use warden_common::{MUTEX_MARKER, MUTEX_PREFIX};

/// Map a business identifier to its lock name.
///
/// Identifiers that already contain `"mutex"` are used verbatim, anything
/// else gets the `"mutex-"` prefix. An identifier that merely happens to
/// contain the marker is not prefixed.
pub fn normalize(identifier: &str) -> String {
    if identifier.contains(MUTEX_MARKER) {
        identifier.to_string()
    } else {
        format!("{}{}", MUTEX_PREFIX, identifier)
    }
}

/// Normalized key identifying a mutex, local or distributed
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockName(String);

impl LockName {
    pub fn from_identifier(identifier: &str) -> Self {
        Self(normalize(identifier))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
