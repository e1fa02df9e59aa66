//! Evaluates a flow's `when` condition: a small
//! boolean grammar over `$eq`/`$ne`/`$and`/`$or`/`$not`/`exists`, expressed
//! as a raw [`Doc`] rather than a closed Rust enum (see
//! `opkg_schema::flow::WhenExpr`'s doc comment for why).

use opkg_schema::{Doc, WhenExpr};

use crate::errors::{OpkgError, Result};
use crate::flow::context::FlowContext;

/// Evaluate `expr` against `ctx`.
///
/// Condition evaluation runs before a flow's source
/// file is parsed (step 3), so `exists` can't check a path inside a
/// not-yet-parsed document — it checks filesystem existence instead, via
/// `exists_check`, which callers supply as a workspace-relative path
/// predicate (typically "does this target file already exist").
/// `$eq`/`$ne` compare resolved values (literals or `$$variable`s) via
/// [`FlowContext::resolve_value`].
pub fn eval(expr: &WhenExpr, ctx: &FlowContext, exists_check: &dyn Fn(&str) -> bool) -> Result<bool> {
    let obj = expr.as_object().ok_or_else(|| {
        OpkgError::validation("`when` expression must be an object with exactly one operator key")
    })?;
    if obj.len() != 1 {
        return Err(OpkgError::validation(
            "`when` expression must have exactly one operator key",
        ));
    }
    let (op, arg) = obj.iter().next().unwrap();
    match op.as_str() {
        "$eq" => {
            let (lhs, rhs) = binary_args(arg)?;
            Ok(ctx.resolve_value(lhs) == ctx.resolve_value(rhs))
        }
        "$ne" => {
            let (lhs, rhs) = binary_args(arg)?;
            Ok(ctx.resolve_value(lhs) != ctx.resolve_value(rhs))
        }
        "$and" => {
            let list = list_args(arg)?;
            for item in list {
                if !eval(item, ctx, exists_check)? {
                    return Ok(false);
                }
            }
            Ok(true)
        }
        "$or" => {
            let list = list_args(arg)?;
            for item in list {
                if eval(item, ctx, exists_check)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        "$not" => Ok(!eval(arg, ctx, exists_check)?),
        "exists" => {
            let path = arg
                .as_str()
                .ok_or_else(|| OpkgError::validation("`exists` expects a string path"))?;
            Ok(exists_check(path))
        }
        other => Err(OpkgError::validation(format!(
            "unknown `when` operator `{other}`"
        ))),
    }
}

fn binary_args(arg: &Doc) -> Result<(&Doc, &Doc)> {
    let items = arg
        .as_array()
        .ok_or_else(|| OpkgError::validation("expected a 2-element array"))?;
    match items.as_slice() {
        [lhs, rhs] => Ok((lhs, rhs)),
        _ => Err(OpkgError::validation("expected exactly 2 operands")),
    }
}

fn list_args(arg: &Doc) -> Result<&[Doc]> {
    arg.as_array()
        .map(Vec::as_slice)
        .ok_or_else(|| OpkgError::validation("expected an array of sub-expressions"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use opkg_schema::PackageName;

    fn ctx() -> FlowContext {
        FlowContext {
            package_name: PackageName::normalize("tech"),
            package_version: None,
            priority: 0,
            platform: opkg_schema::PlatformId::new("cursor"),
            source_kind: "registry",
            target_root: "/work".into(),
            source_file: "a.json".into(),
            dry_run: false,
        }
    }

    fn obj(json: serde_json::Value) -> Doc {
        Doc::from(json)
    }

    fn no_targets_exist(_: &str) -> bool {
        false
    }

    #[test]
    fn eq_against_platform_variable() {
        let expr = obj(serde_json::json!({"$eq": ["$$platform", "cursor"]}));
        assert!(eval(&expr, &ctx(), &no_targets_exist).unwrap());
    }

    #[test]
    fn and_requires_all_true() {
        let expr = obj(serde_json::json!({
            "$and": [
                {"$eq": ["$$platform", "cursor"]},
                {"$eq": ["$$source", "registry"]}
            ]
        }));
        assert!(eval(&expr, &ctx(), &no_targets_exist).unwrap());
    }

    #[test]
    fn not_negates() {
        let expr = obj(serde_json::json!({"$not": {"$eq": ["$$platform", "windsurf"]}}));
        assert!(eval(&expr, &ctx(), &no_targets_exist).unwrap());
    }

    #[test]
    fn exists_checks_via_caller_predicate() {
        let expr = obj(serde_json::json!({"exists": ".cursor/mcp.json"}));
        assert!(eval(&expr, &ctx(), &|p| p == ".cursor/mcp.json").unwrap());
        assert!(!eval(&expr, &ctx(), &no_targets_exist).unwrap());
    }
}
