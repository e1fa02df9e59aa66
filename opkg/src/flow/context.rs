//! The flow context: the small bag of variables a flow's `when` condition,
//! `$set` map op, and target-path substitution can all read from — package
//! name, version, priority, `$$targetRoot`, `$$platform`, `$$source`.

use camino::{Utf8Path, Utf8PathBuf};
use opkg_schema::{Doc, PackageName, PlatformId};

/// Everything a single flow run needs to know about the package, the
/// platform it's installing for, and the source file currently being
/// processed.
#[derive(Debug, Clone)]
pub struct FlowContext {
    /// The installing package's normalized name.
    pub package_name: PackageName,
    /// The installing package's resolved version, if any.
    pub package_version: Option<semver::Version>,
    /// This package's priority for conflict arbitration;
    /// lower wins.
    pub priority: i64,
    /// The platform this flow belongs to.
    pub platform: PlatformId,
    /// A short discriminant of the package's source variant
    /// (`registry`/`git`/`local-path`), exposed as `$$source`.
    pub source_kind: &'static str,
    /// The workspace root flows are materializing into, exposed as
    /// `$$targetRoot`.
    pub target_root: Utf8PathBuf,
    /// The source file path currently being processed, relative to the
    /// package's base. Used to derive `$$filename`/`$$dirname`/`$$path`/
    /// `$$ext`.
    pub source_file: Utf8PathBuf,
    /// Whether this run is a dry run (no files are actually written).
    pub dry_run: bool,
}

impl FlowContext {
    /// Resolve one of the flow context's well-known `$$variable` names, or
    /// `None` if `name` isn't recognized (callers then try named
    /// key-value pairs from elsewhere, e.g. `$set`'s literal fallback).
    pub fn resolve_variable(&self, name: &str) -> Option<Doc> {
        match name {
            "$$platform" => Some(Doc::String(self.platform.as_str().to_string())),
            "$$source" => Some(Doc::String(self.source_kind.to_string())),
            "$$targetRoot" => Some(Doc::String(self.target_root.as_str().to_string())),
            "$$filename" => Some(Doc::String(file_stem_with_ext(&self.source_file))),
            "$$dirname" => Some(Doc::String(
                self.source_file
                    .parent()
                    .map(Utf8Path::as_str)
                    .unwrap_or("")
                    .to_string(),
            )),
            "$$path" => Some(Doc::String(self.source_file.as_str().to_string())),
            "$$ext" => Some(Doc::String(extension_with_dot(&self.source_file))),
            "$$packageName" => Some(Doc::String(self.package_name.as_str().to_string())),
            "$$packageVersion" => self
                .package_version
                .as_ref()
                .map(|v| Doc::String(v.to_string())),
            _ => None,
        }
    }

    /// Resolve a literal-or-variable [`Doc`] value: a string starting with
    /// `$$` is substituted via [`Self::resolve_variable`]; everything else
    /// (including non-string `Doc`s) passes through unchanged. An
    /// unrecognized `$$name` passes through as its original string rather
    /// than erroring — a typo in a manifest's variable reference shouldn't
    /// take down the whole install.
    pub fn resolve_value(&self, value: &Doc) -> Doc {
        match value {
            Doc::String(s) if s.starts_with("$$") => {
                self.resolve_variable(s).unwrap_or_else(|| value.clone())
            }
            other => other.clone(),
        }
    }
}

fn file_stem_with_ext(path: &Utf8Path) -> String {
    path.file_name().unwrap_or("").to_string()
}

fn extension_with_dot(path: &Utf8Path) -> String {
    match path.extension() {
        Some(ext) => format!(".{ext}"),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> FlowContext {
        FlowContext {
            package_name: PackageName::normalize("tech"),
            package_version: None,
            priority: 0,
            platform: PlatformId::new("cursor"),
            source_kind: "registry",
            target_root: Utf8PathBuf::from("/work"),
            source_file: Utf8PathBuf::from("agents/linter.md"),
            dry_run: false,
        }
    }

    #[test]
    fn resolves_filename_and_ext() {
        let c = ctx();
        assert_eq!(
            c.resolve_variable("$$filename"),
            Some(Doc::String("linter.md".into()))
        );
        assert_eq!(c.resolve_variable("$$ext"), Some(Doc::String(".md".into())));
        assert_eq!(
            c.resolve_variable("$$dirname"),
            Some(Doc::String("agents".into()))
        );
    }

    #[test]
    fn resolve_value_passes_through_non_variables() {
        let c = ctx();
        assert_eq!(c.resolve_value(&Doc::String("literal".into())), Doc::String("literal".into()));
        assert_eq!(
            c.resolve_value(&Doc::String("$$platform".into())),
            Doc::String("cursor".into())
        );
    }
}
