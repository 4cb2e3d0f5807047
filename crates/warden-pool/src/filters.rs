//! Reusable record predicates for `ResourcePool::allocate`.
//!
//! Predicates are plain closures, so they compose with `&&` inside a new
//! closure: `|r| of_kind("ERBS")(r) && on_host("netsim-1")(r)`.

use std::collections::HashSet;

use crate::record::ResourceRecord;

pub fn any() -> impl Fn(&ResourceRecord) -> bool {
    |_| true
}

pub fn of_kind(kind: impl Into<String>) -> impl Fn(&ResourceRecord) -> bool {
    let kind = kind.into();
    move |record| record.kind == kind
}

pub fn on_host(host: impl Into<String>) -> impl Fn(&ResourceRecord) -> bool {
    let host = host.into();
    move |record| record.host.as_deref() == Some(host.as_str())
}

/// Matches every record whose id is not in `ids`
pub fn excluding<I, S>(ids: I) -> impl Fn(&ResourceRecord) -> bool
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids: HashSet<String> = ids.into_iter().map(Into::into).collect();
    move |record| !ids.contains(&record.id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicates() {
        let record = ResourceRecord::new("node-1", "ERBS").with_host("netsim-1");

        assert!(any()(&record));
        assert!(of_kind("ERBS")(&record));
        assert!(!of_kind("RadioNode")(&record));
        assert!(on_host("netsim-1")(&record));
        assert!(!on_host("netsim-2")(&record));
        assert!(!on_host("netsim-1")(&ResourceRecord::new("node-2", "ERBS")));
        assert!(!excluding(["node-1"])(&record));
        assert!(excluding(Vec::<String>::new())(&record));
    }
}
