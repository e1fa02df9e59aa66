//! The universal, format-agnostic document value.
//!
//! Every flow step (parse, map, merge, serialize) operates on [`Doc`]
//! rather than on `serde_json::Value` directly, so the flow engine and map
//! pipeline never need to care whether a document originated as JSON,
//! JSONC, YAML, TOML, or a Markdown frontmatter block.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A parsed document, in a shape common to every supported source/target
/// format.
///
/// Object key order is preserved (`IndexMap`) because several formats
/// (TOML, YAML, Markdown frontmatter) are order-sensitive on round-trip,
/// and the save engine's semantic-equivalence check wants a faithful
/// canonical form to hash, not a reordered one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Doc {
    /// Absence of a value (used for `$unset` results and empty files).
    Null,
    /// A boolean scalar.
    Bool(bool),
    /// A numeric scalar. Kept as `f64`/`i64`-agnostic via `serde_json::Number`
    /// semantics so integers round-trip without a `.0` suffix.
    Number(serde_json::Number),
    /// A string scalar.
    String(String),
    /// An ordered array of values.
    Array(Vec<Doc>),
    /// An ordered mapping of string keys to values.
    Object(IndexMap<String, Doc>),
}

impl Doc {
    /// The canonical empty document for a mapping-shaped format.
    pub fn empty_object() -> Self {
        Doc::Object(IndexMap::new())
    }

    /// The canonical empty document for an array-shaped format.
    pub fn empty_array() -> Self {
        Doc::Array(Vec::new())
    }

    /// True if this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Doc::Null)
    }

    /// True if this is an empty string, empty array, or empty mapping.
    ///
    /// Used by the map pipeline's `$transform` step: a step sequence whose
    /// last result is empty in this sense unsets the field instead of
    /// assigning the empty value (spec boundary behavior).
    pub fn is_empty_value(&self) -> bool {
        match self {
            Doc::String(s) => s.is_empty(),
            Doc::Array(a) => a.is_empty(),
            Doc::Object(o) => o.is_empty(),
            _ => false,
        }
    }

    /// Borrow this value as an object, if it is one.
    pub fn as_object(&self) -> Option<&IndexMap<String, Doc>> {
        match self {
            Doc::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Mutably borrow this value as an object, if it is one.
    pub fn as_object_mut(&mut self) -> Option<&mut IndexMap<String, Doc>> {
        match self {
            Doc::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Borrow this value as an array, if it is one.
    pub fn as_array(&self) -> Option<&Vec<Doc>> {
        match self {
            Doc::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow this value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Doc::String(s) => Some(s),
            _ => None,
        }
    }

    /// Look up a dotted path (`a.b.c`) inside this document, returning
    /// `None` if any segment is missing or not an object.
    pub fn get_path(&self, path: &str) -> Option<&Doc> {
        let mut cur = self;
        for segment in path.split('.') {
            cur = cur.as_object()?.get(segment)?;
        }
        Some(cur)
    }

    /// Set a dotted path inside this document, creating intermediate
    /// objects as needed. Fails silently (overwriting) if an intermediate
    /// segment exists but isn't an object.
    pub fn set_path(&mut self, path: &str, value: Doc) {
        let segments: Vec<&str> = path.split('.').collect();
        set_path_segments(self, &segments, value);
    }

    /// Remove a dotted path from this document. Returns the removed value,
    /// if present.
    pub fn remove_path(&mut self, path: &str) -> Option<Doc> {
        let segments: Vec<&str> = path.split('.').collect();
        remove_path_segments(self, &segments)
    }

    /// Enumerate every leaf (non-object) key path in this document, in
    /// depth-first, insertion order. Used by the flow engine's key-tracking
    /// snapshot step (spec §4.4 step 7) and by the uninstall engine.
    pub fn leaf_key_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        if let Doc::Object(map) = self {
            collect_leaf_paths(map, "", &mut out);
        }
        out
    }
}

fn collect_leaf_paths(map: &IndexMap<String, Doc>, prefix: &str, out: &mut Vec<String>) {
    for (key, value) in map {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        match value {
            Doc::Object(inner) if !inner.is_empty() => collect_leaf_paths(inner, &path, out),
            _ => out.push(path),
        }
    }
}

fn set_path_segments(doc: &mut Doc, segments: &[&str], value: Doc) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if !matches!(doc, Doc::Object(_)) {
        *doc = Doc::empty_object();
    }
    let Doc::Object(map) = doc else { unreachable!() };
    if rest.is_empty() {
        map.insert((*head).to_string(), value);
    } else {
        let entry = map
            .entry((*head).to_string())
            .or_insert_with(Doc::empty_object);
        set_path_segments(entry, rest, value);
    }
}

fn remove_path_segments(doc: &mut Doc, segments: &[&str]) -> Option<Doc> {
    let (head, rest) = segments.split_first()?;
    let map = doc.as_object_mut()?;
    if rest.is_empty() {
        map.shift_remove(*head)
    } else {
        let child = map.get_mut(*head)?;
        remove_path_segments(child, rest)
    }
}

impl fmt::Display for Doc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string_pretty(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => write!(f, "<unprintable document>"),
        }
    }
}

impl Default for Doc {
    fn default() -> Self {
        Doc::Null
    }
}

impl From<serde_json::Value> for Doc {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Doc::Null,
            serde_json::Value::Bool(b) => Doc::Bool(b),
            serde_json::Value::Number(n) => Doc::Number(n),
            serde_json::Value::String(s) => Doc::String(s),
            serde_json::Value::Array(items) => Doc::Array(items.into_iter().map(Doc::from).collect()),
            serde_json::Value::Object(map) => {
                Doc::Object(map.into_iter().map(|(k, v)| (k, Doc::from(v))).collect())
            }
        }
    }
}

impl From<Doc> for serde_json::Value {
    fn from(doc: Doc) -> Self {
        match doc {
            Doc::Null => serde_json::Value::Null,
            Doc::Bool(b) => serde_json::Value::Bool(b),
            Doc::Number(n) => serde_json::Value::Number(n),
            Doc::String(s) => serde_json::Value::String(s),
            Doc::Array(items) => serde_json::Value::Array(items.into_iter().map(Into::into).collect()),
            Doc::Object(map) => {
                serde_json::Value::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// The format a source or target file is parsed from / serialized to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DocFormat {
    /// Plain JSON.
    Json,
    /// JSON with `//`/`/* */` comments and trailing commas.
    Jsonc,
    /// YAML.
    Yaml,
    /// TOML.
    Toml,
    /// Markdown with an optional YAML frontmatter block.
    Markdown,
    /// Anything else: treated as an opaque string, never structurally
    /// mapped.
    Text,
}

impl DocFormat {
    /// Infer a format from a file's extension (including the dot, e.g.
    /// `.json`). Unknown extensions fall back to [`DocFormat::Text`].
    pub fn from_extension(ext: &str) -> Self {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "json" => DocFormat::Json,
            "jsonc" => DocFormat::Jsonc,
            "yml" | "yaml" => DocFormat::Yaml,
            "toml" => DocFormat::Toml,
            "md" | "markdown" => DocFormat::Markdown,
            _ => DocFormat::Text,
        }
    }

    /// The canonical empty document for this format.
    pub fn empty_doc(self) -> Doc {
        match self {
            DocFormat::Json | DocFormat::Jsonc | DocFormat::Yaml | DocFormat::Toml => {
                Doc::empty_object()
            }
            DocFormat::Markdown => {
                let mut map = IndexMap::new();
                map.insert("frontmatter".to_string(), Doc::empty_object());
                map.insert("body".to_string(), Doc::String(String::new()));
                Doc::Object(map)
            }
            DocFormat::Text => Doc::String(String::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_and_get_path_roundtrip() {
        let mut doc = Doc::empty_object();
        doc.set_path("mcpServers.tech.url", Doc::String("https://t".into()));
        assert_eq!(
            doc.get_path("mcpServers.tech.url"),
            Some(&Doc::String("https://t".into()))
        );
    }

    #[test]
    fn leaf_key_paths_are_dotted_and_ordered() {
        let mut doc = Doc::empty_object();
        doc.set_path("mcpServers.tech.url", Doc::String("https://t".into()));
        doc.set_path("mcpServers.tech.scope", Doc::String("project".into()));
        assert_eq!(
            doc.leaf_key_paths(),
            vec!["mcpServers.tech.url", "mcpServers.tech.scope"]
        );
    }

    #[test]
    fn remove_path_drops_leaf() {
        let mut doc = Doc::empty_object();
        doc.set_path("a.b", Doc::String("x".into()));
        doc.set_path("a.c", Doc::String("y".into()));
        assert_eq!(doc.remove_path("a.b"), Some(Doc::String("x".into())));
        assert_eq!(doc.leaf_key_paths(), vec!["a.c"]);
    }

    #[test]
    fn transform_emptiness_detection() {
        assert!(Doc::String(String::new()).is_empty_value());
        assert!(Doc::Array(vec![]).is_empty_value());
        assert!(Doc::empty_object().is_empty_value());
        assert!(!Doc::String("x".into()).is_empty_value());
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(DocFormat::from_extension(".JSONC"), DocFormat::Jsonc);
        assert_eq!(DocFormat::from_extension("yaml"), DocFormat::Yaml);
        assert_eq!(DocFormat::from_extension(".rs"), DocFormat::Text);
    }
}
