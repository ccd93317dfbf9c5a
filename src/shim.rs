//! Output shim: post-processes raw backend output uniformly regardless of
//! backend: extracts any trailing source-map directive, wraps the remainder
//! in an IIFE that installs the shared module cache and publishes the
//! workflow namespace, then re-appends the directive as the last
//! non-whitespace content.

pub const MODULE_CACHE_GLOBAL: &str = "__MODULE_CACHE__";
pub const NAMESPACE_GLOBAL: &str = "__WORKFLOW_NAMESPACE__";

#[derive(Debug, Clone)]
pub struct ShimmedOutput {
    pub code: String,
}

/// Applies the shim to `raw_code`.
pub fn shim(raw_code: &str) -> ShimmedOutput {
    let (body, directive) = extract_trailing_source_map_directive(raw_code);

    let mut out = String::with_capacity(body.len() + 512);
    out.push_str("(function () {\n");
    out.push_str("  const globalObject = typeof globalThis !== 'undefined' ? globalThis : global;\n");
    out.push_str(&format!(
        "  if (!globalObject.{MODULE_CACHE_GLOBAL}) {{ globalObject.{MODULE_CACHE_GLOBAL} = Object.create(null); }}\n"
    ));
    out.push_str("  const module = { exports: {} };\n");
    out.push_str("  const exports = module.exports;\n");
    out.push_str(body.trim_end());
    out.push('\n');
    out.push_str(&format!("  globalObject.{NAMESPACE_GLOBAL} = module.exports;\n"));
    out.push_str("})();");

    if let Some(directive) = directive {
        out.push('\n');
        out.push_str(&directive);
    }

    ShimmedOutput { code: out }
}

/// Finds the *last* non-whitespace occurrence of a `//#` or `/*#` inline
/// source-map directive and splits it off, returning `(remainder, directive)`.
fn extract_trailing_source_map_directive(raw_code: &str) -> (&str, Option<String>) {
    let trimmed_end = raw_code.trim_end();

    if let Some(pos) = trimmed_end.rfind("//# sourceMappingURL=") {
        if is_trailing(trimmed_end, pos) {
            return (&raw_code[..pos], Some(trimmed_end[pos..].to_string()));
        }
    }
    if let Some(pos) = trimmed_end.rfind("/*# sourceMappingURL=") {
        if trimmed_end[pos..].trim_end().ends_with("*/") && is_trailing(trimmed_end, pos) {
            return (&raw_code[..pos], Some(trimmed_end[pos..].to_string()));
        }
    }

    (raw_code, None)
}

/// A directive occurrence counts as "trailing" only if nothing but
/// whitespace follows its line in the source, i.e. it is the last
/// non-whitespace content.
fn is_trailing(code: &str, directive_start: usize) -> bool {
    code[directive_start..].lines().count() <= 1 || {
        let after_first_line = code[directive_start..].splitn(2, '\n').nth(1).unwrap_or("");
        after_first_line.trim().is_empty()
    }
}

/// Verifies the layout invariant: the shimmed output must contain both fixed
/// identifiers.
pub fn validate_shimmed_output(code: &str) -> bool {
    code.contains(MODULE_CACHE_GLOBAL) && code.contains(NAMESPACE_GLOBAL)
}
