//! Markdown-with-YAML-frontmatter parse/serialize: a document parses to
//! `{frontmatter, body}`.

use indexmap::IndexMap;
use opkg_schema::Doc;

use crate::errors::{OpkgError, Result};

/// Parse a Markdown document. A leading `---\n...\n---` block is parsed as
/// YAML frontmatter; everything after it (minus one leading newline) is
/// the body. A document with no frontmatter delimiters gets an empty
/// frontmatter object and the whole content as its body.
pub fn parse(content: &str) -> Result<Doc> {
    if let Some(rest) = content.strip_prefix("---\n") {
        if let Some(end) = rest.find("\n---") {
            let yaml_part = &rest[..end];
            let after_marker = &rest[end + 4..];
            let body = after_marker.strip_prefix('\n').unwrap_or(after_marker);
            let frontmatter: Doc = if yaml_part.trim().is_empty() {
                Doc::empty_object()
            } else {
                serde_yml::from_str(yaml_part).map_err(|details| OpkgError::Parse {
                    path: "<markdown frontmatter>".into(),
                    format: "yaml".to_string(),
                    details: Some(Box::new(details)),
                })?
            };
            return Ok(frame(frontmatter, body.to_string()));
        }
    }
    Ok(frame(Doc::empty_object(), content.to_string()))
}

/// Re-serialize a `{frontmatter, body}` document. If `frontmatter` is
/// empty, no `---` block is emitted at all.
pub fn serialize(doc: &Doc) -> Result<String> {
    let obj = doc.as_object().ok_or_else(|| {
        OpkgError::validation("markdown document must be an object with frontmatter/body")
    })?;
    let frontmatter = obj.get("frontmatter").cloned().unwrap_or_default();
    let body = obj.get("body").and_then(Doc::as_str).unwrap_or("");

    if frontmatter.is_empty_value() {
        return Ok(body.to_string());
    }

    let yaml = serde_yml::to_string(&frontmatter).map_err(|e| {
        OpkgError::Internal(format!("failed to serialize markdown frontmatter: {e}"))
    })?;
    Ok(format!("---\n{yaml}---\n{body}"))
}

fn frame(frontmatter: Doc, body: String) -> Doc {
    let mut map = IndexMap::new();
    map.insert("frontmatter".to_string(), frontmatter);
    map.insert("body".to_string(), Doc::String(body));
    Doc::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_frontmatter_and_body() {
        let doc = parse("---\ntitle: Hello\n---\nBody text\n").unwrap();
        let obj = doc.as_object().unwrap();
        assert_eq!(
            obj.get("frontmatter").unwrap().get_path("title"),
            Some(&Doc::String("Hello".to_string()))
        );
        assert_eq!(obj.get("body").unwrap().as_str(), Some("Body text\n"));
    }

    #[test]
    fn no_frontmatter_is_whole_body() {
        let doc = parse("Just text\n").unwrap();
        let obj = doc.as_object().unwrap();
        assert!(obj.get("frontmatter").unwrap().is_empty_value());
        assert_eq!(obj.get("body").unwrap().as_str(), Some("Just text\n"));
    }

    #[test]
    fn round_trips_through_serialize() {
        let original = parse("---\nname: tech\n---\nhello\n").unwrap();
        let rendered = serialize(&original).unwrap();
        let reparsed = parse(&rendered).unwrap();
        assert_eq!(original, reparsed);
    }

    #[test]
    fn empty_frontmatter_emits_no_marker() {
        let doc = parse("plain body").unwrap();
        let rendered = serialize(&doc).unwrap();
        assert_eq!(rendered, "plain body");
    }
}
