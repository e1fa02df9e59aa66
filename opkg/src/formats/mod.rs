//! Parse/serialize layer: turns file bytes into a [`Doc`] and back,
//! format inferred from a file extension.

mod jsonc;
mod markdown;

use camino::Utf8Path;
use opkg_schema::{Doc, DocFormat};

use crate::errors::{OpkgError, Result};

/// Infer a [`DocFormat`] from a path's extension.
pub fn format_for_path(path: &Utf8Path) -> DocFormat {
    match path.extension() {
        Some(ext) => DocFormat::from_extension(ext),
        None => DocFormat::Text,
    }
}

/// Parse `content` as `format`. Empty content parses to the format's
/// canonical empty value.
pub fn parse(content: &str, format: DocFormat) -> Result<Doc> {
    if content.trim().is_empty() && !matches!(format, DocFormat::Markdown) {
        return Ok(format.empty_doc());
    }

    match format {
        DocFormat::Json => serde_json::from_str(content).map_err(|details| OpkgError::Parse {
            path: "<in-memory>".into(),
            format: "json".to_string(),
            details: Some(Box::new(details)),
        }),
        DocFormat::Jsonc => {
            let stripped = jsonc::strip_comments(content);
            serde_json::from_str(&stripped).map_err(|details| OpkgError::Parse {
                path: "<in-memory>".into(),
                format: "jsonc".to_string(),
                details: Some(Box::new(details)),
            })
        }
        DocFormat::Yaml => serde_yml::from_str(content).map_err(|details| OpkgError::Parse {
            path: "<in-memory>".into(),
            format: "yaml".to_string(),
            details: Some(Box::new(details)),
        }),
        DocFormat::Toml => {
            toml_edit::de::from_str(content).map_err(|details| OpkgError::Parse {
                path: "<in-memory>".into(),
                format: "toml".to_string(),
                details: Some(Box::new(details)),
            })
        }
        DocFormat::Markdown => markdown::parse(content),
        DocFormat::Text => Ok(Doc::String(content.to_string())),
    }
}

/// Serialize `doc` as `format`.
pub fn serialize(doc: &Doc, format: DocFormat) -> Result<String> {
    match format {
        DocFormat::Json | DocFormat::Jsonc => serde_json::to_string_pretty(doc).map_err(|e| {
            OpkgError::Internal(format!("failed to serialize document as json: {e}"))
        }),
        DocFormat::Yaml => serde_yml::to_string(doc)
            .map_err(|e| OpkgError::Internal(format!("failed to serialize document as yaml: {e}"))),
        DocFormat::Toml => toml_edit::ser::to_string_pretty(doc)
            .map_err(|e| OpkgError::Internal(format!("failed to serialize document as toml: {e}"))),
        DocFormat::Markdown => markdown::serialize(doc),
        DocFormat::Text => Ok(doc.as_str().unwrap_or_default().to_string()),
    }
}

/// A named format/codec transform run post-merge by a `$pipe` map op
///. The pipeline replaces the
/// in-memory document with a serialized string at this point, so `pipe`
/// returns a `String` rather than a `Doc`.
pub fn pipe(name: &str, doc: &Doc) -> Result<String> {
    match name {
        "json-to-toml" => serialize(doc, DocFormat::Toml),
        "toml-to-json" => {
            let as_toml = serialize(doc, DocFormat::Toml)?;
            let reparsed = parse(&as_toml, DocFormat::Toml)?;
            serialize(&reparsed, DocFormat::Json)
        }
        "json-to-yaml" => serialize(doc, DocFormat::Yaml),
        "yaml-to-json" => serialize(doc, DocFormat::Json),
        other => Err(OpkgError::validation(format!(
            "unknown $pipe transform `{other}`"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_parses_to_empty_object() {
        let doc = parse("", DocFormat::Json).unwrap();
        assert_eq!(doc, Doc::empty_object());
    }

    #[test]
    fn jsonc_strips_comments_before_parsing() {
        let doc = parse("{\n // hi\n \"a\": 1\n}", DocFormat::Jsonc).unwrap();
        assert_eq!(doc.get_path("a"), Some(&Doc::from(serde_json::json!(1))));
    }

    #[test]
    fn toml_round_trips() {
        let doc = parse("name = \"tech\"\n", DocFormat::Toml).unwrap();
        let rendered = serialize(&doc, DocFormat::Toml).unwrap();
        let reparsed = parse(&rendered, DocFormat::Toml).unwrap();
        assert_eq!(doc, reparsed);
    }

    #[test]
    fn json_to_toml_pipe_produces_a_string() {
        let doc = parse(r#"{"name": "tech"}"#, DocFormat::Json).unwrap();
        let rendered = pipe("json-to-toml", &doc).unwrap();
        assert!(rendered.contains("name"));
    }
}
