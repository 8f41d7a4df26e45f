//! Structured-path evaluation over JSON documents
//!
//! Grammar: optional leading `$` or `$.`, dotted field names, `[N]` array
//! indices, `[*]` wildcards and `['quoted.name']` fields, e.g.
//! `info.version`, `[0].tag_name`, `versions[*].num`.

use serde_json::Value;

use crate::extract::error::ExtractionError;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Field(String),
    Index(usize),
    Wildcard,
}

/// A parsed structured path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(path: &str) -> Result<Self, ExtractionError> {
        let invalid = |reason: &str| ExtractionError::InvalidPath {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let mut rest = path.trim();
        rest = rest.strip_prefix('$').unwrap_or(rest);

        let mut segments = Vec::new();
        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('.') {
                rest = after;
                if rest.is_empty() || rest.starts_with('.') {
                    return Err(invalid("empty field name"));
                }
                continue;
            }

            if let Some(after) = rest.strip_prefix('[') {
                let end = after.find(']').ok_or_else(|| invalid("unclosed bracket"))?;
                let inner = after[..end].trim();
                segments.push(match inner {
                    "*" => Segment::Wildcard,
                    _ if is_quoted(inner) => Segment::Field(inner[1..inner.len() - 1].to_string()),
                    _ => Segment::Index(
                        inner
                            .parse()
                            .map_err(|_| invalid("index must be a non-negative integer or *"))?,
                    ),
                });
                rest = &after[end + 1..];
                continue;
            }

            let end = rest.find(['.', '[']).unwrap_or(rest.len());
            let name = &rest[..end];
            segments.push(if name == "*" {
                Segment::Wildcard
            } else {
                Segment::Field(name.to_string())
            });
            rest = &rest[end..];
        }

        if segments.is_empty() {
            return Err(invalid("path is empty"));
        }

        Ok(Self {
            raw: path.to_string(),
            segments,
        })
    }

    fn has_wildcard(&self) -> bool {
        self.segments.contains(&Segment::Wildcard)
    }

    /// All values the path resolves to, in document order
    pub fn select<'a>(&self, root: &'a Value) -> Vec<&'a Value> {
        let mut out = Vec::new();
        select_into(root, &self.segments, &mut out);
        out
    }

    /// First string (or number, rendered) the path resolves to
    pub fn first_version(&self, root: &Value) -> Result<String, ExtractionError> {
        self.select(root)
            .into_iter()
            .find_map(scalar_to_string)
            .ok_or_else(|| ExtractionError::PathNotFound(self.raw.clone()))
    }

    /// Up to `limit` string leaves in document order.
    ///
    /// A path without wildcard that ends on an array yields that array's strings.
    pub fn versions(&self, root: &Value, limit: usize) -> Vec<String> {
        let selected = self.select(root);
        let leaves: Vec<&Value> = match selected.as_slice() {
            [Value::Array(items)] if !self.has_wildcard() => items.iter().collect(),
            _ => selected.clone(),
        };

        leaves
            .into_iter()
            .filter_map(|value| value.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .take(limit)
            .collect()
    }
}

fn is_quoted(s: &str) -> bool {
    s.len() >= 2
        && ((s.starts_with('\'') && s.ends_with('\'')) || (s.starts_with('"') && s.ends_with('"')))
}

fn select_into<'a>(value: &'a Value, segments: &[Segment], out: &mut Vec<&'a Value>) {
    let Some((head, tail)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match head {
        Segment::Field(name) => {
            if let Some(child) = value.get(name.as_str()) {
                select_into(child, tail, out);
            }
        }
        Segment::Index(i) => {
            if let Some(child) = value.get(*i) {
                select_into(child, tail, out);
            }
        }
        Segment::Wildcard => match value {
            Value::Array(items) => items.iter().for_each(|item| select_into(item, tail, out)),
            Value::Object(map) => map.values().for_each(|item| select_into(item, tail, out)),
            _ => {}
        },
    }
}

fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn releases() -> Value {
        json!([
            {"tag_name": "v2.0.0", "prerelease": false},
            {"tag_name": "v1.9.0", "prerelease": false},
            {"name": "untagged"},
            {"tag_name": "v1.8.0", "prerelease": false}
        ])
    }

    #[rstest]
    #[case("info.version", json!({"info": {"version": "2.31.0"}}), "2.31.0")]
    #[case("$.info.version", json!({"info": {"version": "2.31.0"}}), "2.31.0")]
    #[case("[0].tag_name", releases(), "v2.0.0")]
    #[case("dist-tags.latest", json!({"dist-tags": {"latest": "5.4.2"}}), "5.4.2")]
    #[case("crate.max_stable_version", json!({"crate": {"max_stable_version": "1.0.210"}}), "1.0.210")]
    #[case("build", json!({"build": 42}), "42")]
    #[case("['dotted.key']", json!({"dotted.key": "1.0"}), "1.0")]
    #[case("[*].tag_name", releases(), "v2.0.0")]
    #[case("a[1][0]", json!({"a": [["x"], ["y"]]}), "y")]
    fn first_version_resolves_path(#[case] path: &str, #[case] doc: Value, #[case] expected: &str) {
        let path = JsonPath::parse(path).unwrap();

        assert_eq!(path.first_version(&doc).unwrap(), expected);
    }

    #[rstest]
    #[case("info.missing", json!({"info": {}}))]
    #[case("[5].tag_name", releases())]
    #[case("info", json!({"info": {"version": "1"}}))]
    #[case("flag", json!({"flag": true}))]
    fn first_version_reports_unresolved_path(#[case] path: &str, #[case] doc: Value) {
        let path = JsonPath::parse(path).unwrap();

        assert!(matches!(
            path.first_version(&doc),
            Err(ExtractionError::PathNotFound(_))
        ));
    }

    #[rstest]
    #[case("")]
    #[case("$")]
    #[case("a..b")]
    #[case("a[")]
    #[case("a[x]")]
    #[case("a.")]
    fn parse_rejects_malformed_paths(#[case] path: &str) {
        assert!(matches!(
            JsonPath::parse(path),
            Err(ExtractionError::InvalidPath { .. })
        ));
    }

    #[test]
    fn versions_skips_missing_and_non_string_leaves() {
        let path = JsonPath::parse("[*].tag_name").unwrap();

        assert_eq!(
            path.versions(&releases(), 10),
            vec!["v2.0.0", "v1.9.0", "v1.8.0"]
        );
    }

    #[test]
    fn versions_expands_array_at_end_of_plain_path() {
        let doc = json!({"versions": ["3.0", 7, "2.0", "1.0"]});
        let path = JsonPath::parse("versions").unwrap();

        assert_eq!(path.versions(&doc, 10), vec!["3.0", "2.0", "1.0"]);
    }

    #[test]
    fn versions_stops_at_limit_in_source_order() {
        let releases: Vec<Value> = (0..15).map(|i| json!({"v": format!("1.{i}")})).collect();
        let doc = json!({ "releases": releases });
        let path = JsonPath::parse("releases[*].v").unwrap();

        let versions = path.versions(&doc, 10);

        assert_eq!(versions.len(), 10);
        assert_eq!(versions.first().map(String::as_str), Some("1.0"));
        assert_eq!(versions.last().map(String::as_str), Some("1.9"));
    }
}
