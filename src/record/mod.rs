//! Frame records and dotted-path field access.
//!
//! A record is one hierarchical per-frame document from the log. We keep it
//! as a `serde_json::Value` map so every component sees one scalar model
//! with sorted keys. The `Derived.` namespace is virtual: it is never stored
//! in the record, `extract_field` routes it to the derived-field resolver.

pub mod llsd;
pub mod parse;

pub use parse::FrameReader;

use crate::Result;
use serde_json::Value;

pub type Record = Value;

/// Resolve a dotted key path against a record.
///
/// Returns `Ok(None)` when any path segment is absent; the caller supplies
/// its own default. The only error is a `Derived.Avatar.Attachments` key
/// naming an unrecognized property, which indicates a typo in a requested
/// field and should abort the run.
pub fn extract_field(record: &Record, path: &str) -> Result<Option<Value>> {
    match path.strip_prefix("Derived.") {
        Some(rest) => crate::derived::resolve(record, rest, None),
        None => Ok(lookup(record, path).cloned()),
    }
}

/// Walk nested maps segment by segment. None the instant a segment is
/// missing or the node at that level is not a map.
pub fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut node = record;
    for segment in path.split('.') {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn lookup_walks_nested_maps() {
        let rec = json!({"Timers": {"Frame": {"Calls": 1, "Time": 0.01}}});
        assert_eq!(lookup(&rec, "Timers.Frame.Time"), Some(&json!(0.01)));
        assert_eq!(lookup(&rec, "Timers.Frame"), Some(&json!({"Calls": 1, "Time": 0.01})));
    }

    #[test]
    fn lookup_missing_segment_is_none() {
        let rec = json!({"Timers": {"Frame": {"Time": 0.01}}});
        assert_eq!(lookup(&rec, "Timers.Render.Time"), None);
        assert_eq!(lookup(&rec, "Nope"), None);
        // Not a map at that level: also None, not an error.
        assert_eq!(lookup(&rec, "Timers.Frame.Time.Extra"), None);
    }

    #[test]
    fn extract_field_returns_exact_nested_value() {
        let rec = json!({"Session": {"UniqueHostID": "abcdef123"}});
        let got = extract_field(&rec, "Session.UniqueHostID").unwrap();
        assert_eq!(got, Some(json!("abcdef123")));
        assert_eq!(extract_field(&rec, "Session.Missing").unwrap(), None);
    }

    #[test]
    fn extract_field_routes_derived_prefix() {
        let rec = json!({"Timers": {"Frame": {"Time": 0.02}}});
        let got = extract_field(&rec, "Derived.Timers.Frame").unwrap();
        assert_eq!(got, Some(json!(0.02)));
    }
}
