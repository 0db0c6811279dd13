//! Grammar for one tag-delimited record substring.
//!
//! Records are nested maps/arrays of scalars, e.g.:
//!
//! `<llsd><map><key>Frame</key><map><key>Calls</key><integer>1</integer>
//! <key>Time</key><real>0.016</real></map></map></llsd>`
//!
//! The streaming reader hands us one complete `<llsd>...</llsd>` substring
//! at a time; this module turns it into a hierarchical value.

use crate::Result;
use anyhow::{Context, bail};
use serde_json::{Map, Number, Value};

/// Parse one `<llsd>...</llsd>` substring into a record value.
pub fn parse_record(text: &str) -> Result<Value> {
    let mut s = Scanner::new(text);
    s.skip_ws();

    let (name, closed) = s.open_tag()?;
    if name != "llsd" {
        bail!("expected <llsd> record, found <{}>", name);
    }
    if closed {
        return Ok(Value::Null);
    }

    s.skip_ws();
    if s.at_close_tag() {
        s.close_tag("llsd")?;
        return Ok(Value::Null);
    }

    let value = parse_value(&mut s)?;
    s.close_tag("llsd")?;
    Ok(value)
}

fn parse_value(s: &mut Scanner) -> Result<Value> {
    s.skip_ws();
    let (name, closed) = s.open_tag()?;

    match name {
        "map" => {
            let mut map = Map::new();
            if !closed {
                loop {
                    s.skip_ws();
                    if s.at_close_tag() {
                        s.close_tag("map")?;
                        break;
                    }
                    let (kname, kclosed) = s.open_tag()?;
                    if kname != "key" {
                        bail!("expected <key> inside <map>, found <{}>", kname);
                    }
                    let key = if kclosed {
                        String::new()
                    } else {
                        let raw = s.text_until_tag();
                        s.close_tag("key")?;
                        unescape(raw)
                    };
                    map.insert(key, parse_value(s)?);
                }
            }
            Ok(Value::Object(map))
        }
        "array" => {
            let mut items = Vec::new();
            if !closed {
                loop {
                    s.skip_ws();
                    if s.at_close_tag() {
                        s.close_tag("array")?;
                        break;
                    }
                    items.push(parse_value(s)?);
                }
            }
            Ok(Value::Array(items))
        }
        _ => {
            let raw = if closed {
                String::new()
            } else {
                let t = s.text_until_tag();
                s.close_tag(name)?;
                unescape(t)
            };
            scalar(name, &raw)
        }
    }
}

/// Leaf elements. Empty integer/real bodies mean zero by convention.
/// String-like content is kept exactly as written (minus escapes).
fn scalar(name: &str, raw: &str) -> Result<Value> {
    let value = match name {
        "integer" => {
            let body = raw.trim();
            let n: i64 = if body.is_empty() {
                0
            } else {
                body.parse()
                    .with_context(|| format!("bad integer value: {body:?}"))?
            };
            Value::from(n)
        }
        "real" => {
            let body = raw.trim();
            let x: f64 = if body.is_empty() {
                0.0
            } else {
                body.parse()
                    .with_context(|| format!("bad real value: {body:?}"))?
            };
            Number::from_f64(x)
                .map(Value::Number)
                .ok_or_else(|| anyhow::anyhow!("non-finite real value: {body:?}"))?
        }
        "boolean" => Value::Bool(matches!(raw.trim(), "1" | "true" | "TRUE" | "True")),
        "string" | "uuid" | "date" | "uri" | "binary" => Value::String(raw.to_string()),
        "undef" => Value::Null,
        other => bail!("unexpected element <{}> in record", other),
    };
    Ok(value)
}

struct Scanner<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    fn rest(&self) -> &'a str {
        &self.text[self.pos..]
    }

    fn skip_ws(&mut self) {
        let rest = self.rest();
        let trimmed = rest.trim_start();
        self.pos += rest.len() - trimmed.len();
    }

    fn at_close_tag(&self) -> bool {
        self.rest().starts_with("</")
    }

    /// Consume `<name>` or `<name/>` (attributes tolerated and dropped).
    /// Returns the element name and whether the tag was self-closing.
    fn open_tag(&mut self) -> Result<(&'a str, bool)> {
        let rest = self.rest();
        if !rest.starts_with('<') {
            bail!("expected a tag at: {:?}", clip(rest));
        }
        let end = rest
            .find('>')
            .ok_or_else(|| anyhow::anyhow!("unterminated tag at: {:?}", clip(rest)))?;
        let inner = rest[1..end].trim_end();
        let self_closed = inner.ends_with('/');
        let name = inner
            .trim_end_matches('/')
            .split_whitespace()
            .next()
            .unwrap_or("");
        if name.is_empty() || name.starts_with('/') {
            bail!("malformed tag at: {:?}", clip(rest));
        }
        self.pos += end + 1;
        Ok((name, self_closed))
    }

    fn close_tag(&mut self, expected: &str) -> Result<()> {
        self.skip_ws();
        let rest = self.rest();
        if !rest.starts_with("</") {
            bail!("expected </{}> at: {:?}", expected, clip(rest));
        }
        let end = rest
            .find('>')
            .ok_or_else(|| anyhow::anyhow!("unterminated closing tag at: {:?}", clip(rest)))?;
        let name = rest[2..end].trim();
        if name != expected {
            bail!("expected </{}>, found </{}>", expected, name);
        }
        self.pos += end + 1;
        Ok(())
    }

    /// Raw character data up to the next tag (may be empty).
    fn text_until_tag(&mut self) -> &'a str {
        let rest = self.rest();
        let end = rest.find('<').unwrap_or(rest.len());
        self.pos += end;
        &rest[..end]
    }
}

fn unescape(raw: &str) -> String {
    raw.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

fn clip(s: &str) -> String {
    s.chars().take(40).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn parses_nested_timer_map() {
        let text = "<llsd><map><key>Timers</key><map>\
                    <key>Frame</key><map><key>Calls</key><integer>1</integer>\
                    <key>Time</key><real>0.016</real></map>\
                    </map></map></llsd>";
        let rec = parse_record(text).unwrap();
        assert_eq!(
            rec,
            json!({"Timers": {"Frame": {"Calls": 1, "Time": 0.016}}})
        );
    }

    #[test]
    fn parses_scalars_and_arrays() {
        let text = "<llsd><map>\
                    <key>Name</key><string>Ruth &amp; co</string>\
                    <key>Mesh</key><boolean>1</boolean>\
                    <key>When</key><date>2026-01-02T03:04:05Z</date>\
                    <key>Empty</key><undef/>\
                    <key>List</key><array><integer>3</integer><integer>4</integer></array>\
                    </map></llsd>";
        let rec = parse_record(text).unwrap();
        assert_eq!(
            rec,
            json!({
                "Name": "Ruth & co",
                "Mesh": true,
                "When": "2026-01-02T03:04:05Z",
                "Empty": null,
                "List": [3, 4],
            })
        );
    }

    #[test]
    fn empty_numeric_bodies_are_zero() {
        let rec = parse_record("<llsd><map><key>N</key><integer/><key>T</key><real></real></map></llsd>")
            .unwrap();
        assert_eq!(rec, json!({"N": 0, "T": 0.0}));
    }

    #[test]
    fn rejects_unknown_elements() {
        assert!(parse_record("<llsd><widget>7</widget></llsd>").is_err());
        assert!(parse_record("<map></map>").is_err());
    }

    #[test]
    fn tolerates_surrounding_whitespace() {
        let text = "\n  <llsd>\n  <map>\n  <key>A</key>\n  <integer>5</integer>\n  </map>\n  </llsd>\n";
        assert_eq!(parse_record(text).unwrap(), json!({"A": 5}));
    }
}
