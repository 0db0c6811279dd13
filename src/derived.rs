//! Derived (computed) fields overlaid on raw frame records.
//!
//! Derived values are pure functions of the record, addressed through the
//! same dotted-path namespace as raw fields (`Derived.Timers.Frame`,
//! `Derived.Avatar.Attachments.alpha`, ...). One resolver function
//! dispatches on the path prefix to a strategy: self timers net of child
//! time, or aggregates over the avatar attachment list. Nothing is cached;
//! attachment lists are small enough to rescan per key.

use crate::Result;
use crate::record::{Record, lookup};
use anyhow::bail;
use serde_json::Value;
use std::collections::BTreeMap;

/// Attachment properties reported as the fraction of total high-LOD
/// triangles carried by attachments that have the property.
pub const BOOL_GRAPHIC_PROPERTIES: &[&str] = &[
    "alpha",
    "animtex",
    "bump",
    "flexi",
    "glow",
    "invisi",
    "particles",
    "planar",
    "produces_light",
    "shiny",
    "weighted_mesh",
    "specmap",
    "normalmap",
    "materials",
];

/// Attachment properties reported as a plain sum across all attachments.
pub const SUM_GRAPHIC_PROPERTIES: &[&str] = &["media_faces"];

const ATTACHMENTS_KEY: &str = "Avatars.Self.Attachments";
const TRIANGLE_KEYS: &[&str] = &["triangles_high"];

/// Optional timer name -> child timer names, for exclusive-time breakdowns.
pub type TimerChildren = BTreeMap<String, Vec<String>>;

/// Resolve a derived path (everything after the `Derived.` prefix).
///
/// The first segment selects the strategy: `Avatar` keys go to the
/// attachment aggregates, `Timers` and any unrecognized prefix fall back to
/// the self-timer strategy. Absent inputs resolve to `None`; the only error
/// is an unrecognized attachment property name.
pub fn resolve(
    record: &Record,
    path: &str,
    children: Option<&TimerChildren>,
) -> Result<Option<Value>> {
    match path.split_once('.') {
        Some(("Avatar", rest)) => avatar_field(record, rest),
        Some((_, timer)) => Ok(self_timer(record, timer, children)),
        None => Ok(None),
    }
}

/// A timer's recorded time minus the time of its configured children that
/// are present in the record. With no configured children this is exactly
/// the raw recorded time.
fn self_timer(record: &Record, name: &str, children: Option<&TimerChildren>) -> Option<Value> {
    let mut time = lookup(record, &format!("Timers.{name}.Time"))?.as_f64()?;
    if let Some(children) = children {
        for child in children.get(name).into_iter().flatten() {
            // A configured child absent from the record contributes zero.
            if let Some(t) =
                lookup(record, &format!("Timers.{child}.Time")).and_then(Value::as_f64)
            {
                time -= t;
            }
        }
    }
    Some(Value::from(time))
}

fn avatar_field(record: &Record, key: &str) -> Result<Option<Value>> {
    if key == "AttachmentCount" {
        let count = attachments(record).map(|list| Value::from(list.len() as u64));
        return Ok(count);
    }
    match key.split_once('.') {
        Some(("Attachments", prop)) => attachment_field(record, prop),
        // Unknown avatar-level derived keys resolve like absent data.
        _ => Ok(None),
    }
}

fn attachment_field(record: &Record, prop: &str) -> Result<Option<Value>> {
    let Some(list) = attachments(record) else {
        return Ok(None);
    };

    let value = if prop == "Count" {
        Value::from(list.len() as u64)
    } else if prop == "MeshCount" {
        let meshes = list
            .iter()
            .filter(|att| lookup(att, "isMesh").is_some_and(truthy))
            .count();
        Value::from(meshes as u64)
    } else if TRIANGLE_KEYS.contains(&prop) || SUM_GRAPHIC_PROPERTIES.contains(&prop) {
        let total: f64 = list.iter().map(|att| streaming_cost(att, prop)).sum();
        Value::from(total)
    } else if BOOL_GRAPHIC_PROPERTIES.contains(&prop) {
        let grand_total: f64 = list
            .iter()
            .map(|att| streaming_cost(att, "triangles_high"))
            .sum();
        let with_property: f64 = list
            .iter()
            .filter(|att| lookup(att, prop).is_some_and(truthy))
            .map(|att| streaming_cost(att, "triangles_high"))
            .sum();
        let fraction = if grand_total > 0.0 {
            with_property / grand_total
        } else {
            0.0
        };
        Value::from(fraction)
    } else {
        bail!("unknown derived attachment property: {}", prop);
    };
    Ok(Some(value))
}

fn attachments(record: &Record) -> Option<&Vec<Value>> {
    lookup(record, ATTACHMENTS_KEY)?.as_array()
}

fn streaming_cost(att: &Value, prop: &str) -> f64 {
    lookup(att, &format!("StreamingCost.{prop}"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn record_with_attachments() -> Record {
        json!({
            "Avatars": {"Self": {"Attachments": [
                {
                    "isMesh": true,
                    "alpha": true,
                    "StreamingCost": {"triangles_high": 600.0, "media_faces": 2.0},
                },
                {
                    "isMesh": false,
                    "alpha": false,
                    "StreamingCost": {"triangles_high": 400.0},
                },
            ]}}
        })
    }

    #[test]
    fn self_timer_without_children_is_raw_time() {
        let rec = json!({"Timers": {"Frame": {"Time": 0.25}}});
        assert_eq!(
            resolve(&rec, "Timers.Frame", None).unwrap(),
            Some(json!(0.25))
        );
    }

    #[test]
    fn self_timer_subtracts_present_children_only() {
        let rec = json!({"Timers": {
            "Frame": {"Time": 1.0},
            "Render": {"Time": 0.3},
        }});
        let children: TimerChildren = BTreeMap::from([(
            "Frame".to_string(),
            vec!["Render".to_string(), "Network".to_string()],
        )]);
        // "Network" is configured but absent: contributes zero.
        assert_eq!(
            resolve(&rec, "Timers.Frame", Some(&children)).unwrap(),
            Some(json!(0.7))
        );
    }

    #[test]
    fn unknown_prefix_falls_back_to_self_timer() {
        let rec = json!({"Timers": {"Frame": {"Time": 0.5}}});
        assert_eq!(
            resolve(&rec, "Whatever.Frame", None).unwrap(),
            Some(json!(0.5))
        );
    }

    #[test]
    fn missing_timer_resolves_to_none() {
        let rec = json!({"Timers": {}});
        assert_eq!(resolve(&rec, "Timers.Frame", None).unwrap(), None);
    }

    #[test]
    fn attachment_counts() {
        let rec = record_with_attachments();
        assert_eq!(
            resolve(&rec, "Avatar.Attachments.Count", None).unwrap(),
            Some(json!(2))
        );
        assert_eq!(
            resolve(&rec, "Avatar.Attachments.MeshCount", None).unwrap(),
            Some(json!(1))
        );
        assert_eq!(
            resolve(&rec, "Avatar.AttachmentCount", None).unwrap(),
            Some(json!(2))
        );
    }

    #[test]
    fn triangle_and_sum_aggregates() {
        let rec = record_with_attachments();
        assert_eq!(
            resolve(&rec, "Avatar.Attachments.triangles_high", None).unwrap(),
            Some(json!(1000.0))
        );
        assert_eq!(
            resolve(&rec, "Avatar.Attachments.media_faces", None).unwrap(),
            Some(json!(2.0))
        );
    }

    #[test]
    fn bool_property_is_triangle_fraction() {
        let rec = record_with_attachments();
        assert_eq!(
            resolve(&rec, "Avatar.Attachments.alpha", None).unwrap(),
            Some(json!(0.6))
        );
        // No glow anywhere: fraction is zero, still in [0, 1].
        assert_eq!(
            resolve(&rec, "Avatar.Attachments.glow", None).unwrap(),
            Some(json!(0.0))
        );
    }

    #[test]
    fn bool_property_with_zero_triangles_is_zero() {
        let rec = json!({
            "Avatars": {"Self": {"Attachments": [
                {"alpha": true, "StreamingCost": {"triangles_high": 0.0}},
            ]}}
        });
        assert_eq!(
            resolve(&rec, "Avatar.Attachments.alpha", None).unwrap(),
            Some(json!(0.0))
        );
    }

    #[test]
    fn absent_attachment_list_is_none() {
        let rec = json!({"Avatars": {"Self": {}}});
        assert_eq!(resolve(&rec, "Avatar.Attachments.Count", None).unwrap(), None);
        assert_eq!(resolve(&rec, "Avatar.AttachmentCount", None).unwrap(), None);
    }

    #[test]
    fn unknown_attachment_property_is_an_error() {
        let rec = record_with_attachments();
        assert!(resolve(&rec, "Avatar.Attachments.sparkle", None).is_err());
    }
}
