//! Path-alias resolution. Locates and parses a `tsconfig.json`-style
//! configuration (with `extends` chains and comment/trailing-comma
//! tolerance), compiles its `paths` patterns, and resolves alias specifiers
//! to real files on disk.

use crate::error::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

const MAX_UPWARD_LEVELS: usize = 6;
const CANDIDATE_EXTENSIONS: &[&str] = &[".ts", ".tsx", ".js", ".jsx"];

static TRAILING_COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r",(?P<valid>\s*[}\]])").unwrap());

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawTsConfig {
    extends: Option<String>,
    #[serde(default)]
    compiler_options: RawCompilerOptions,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawCompilerOptions {
    base_url: Option<String>,
    #[serde(default)]
    paths: HashMap<String, Vec<String>>,
}

/// Strips `//` and `/* */` comments and trailing commas, then parses as
/// JSON.
fn parse_jsonc(content: &str) -> Result<RawTsConfig> {
    let stripped_trailing_commas = TRAILING_COMMA.replace_all(content, "$valid");
    let stripped = json_comments::StripComments::new(stripped_trailing_commas.as_bytes());
    let parsed: RawTsConfig = serde_json::from_reader(stripped)?;
    Ok(parsed)
}

/// A compiled `paths` entry: the regex-equivalent matcher plus its
/// replacement templates, in declared order.
#[derive(Debug, Clone)]
struct CompiledPattern {
    /// `None` means an exact-match pattern (no `*`).
    prefix_suffix: Option<(String, String)>,
    exact: Option<String>,
    templates: Vec<String>,
}

impl CompiledPattern {
    fn compile(pattern: &str, templates: Vec<String>) -> Self {
        if let Some(star) = pattern.find('*') {
            let prefix = pattern[..star].to_string();
            let suffix = pattern[star + 1..].to_string();
            Self { prefix_suffix: Some((prefix, suffix)), exact: None, templates }
        } else {
            Self { prefix_suffix: None, exact: Some(pattern.to_string()), templates }
        }
    }

    /// Returns the capture (the text matched by `*`) if this pattern matches
    /// `specifier`, or `None`.
    fn matches<'a>(&self, specifier: &'a str) -> Option<&'a str> {
        match (&self.prefix_suffix, &self.exact) {
            (Some((prefix, suffix)), _) => specifier
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_suffix(suffix.as_str())),
            (None, Some(exact)) => (specifier == exact).then_some(""),
            _ => None,
        }
    }

    fn candidates(&self, captured: &str) -> Vec<String> {
        self.templates.iter().map(|t| t.replacen('*', captured, 1)).collect()
    }
}

/// The resolved, merged path-alias configuration for a project.
#[derive(Debug, Clone)]
pub struct TsConfigPaths {
    base_url: PathBuf,
    patterns: Vec<(String, CompiledPattern)>,
}

impl TsConfigPaths {
    /// Walks upward from `start_dir` up to [`MAX_UPWARD_LEVELS`] looking for
    /// `tsconfig.json`, then loads and merges its `extends` chain.
    pub fn locate_and_load(start_dir: &Path) -> Result<Option<Self>> {
        let mut dir = Some(start_dir.to_path_buf());
        for _ in 0..=MAX_UPWARD_LEVELS {
            let Some(candidate_dir) = dir.clone() else { break };
            let candidate = candidate_dir.join("tsconfig.json");
            if candidate.is_file() {
                return Self::load(&candidate).map(Some);
            }
            dir = candidate_dir.parent().map(Path::to_path_buf);
        }
        Ok(None)
    }

    /// Loads an explicit tsconfig path, merging its `extends` chain with
    /// child-wins semantics.
    pub fn load(path: &Path) -> Result<Self> {
        let merged = Self::load_merged(path, &mut Vec::new())?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let base_url = merged
            .compiler_options
            .base_url
            .as_ref()
            .map(|b| dir.join(b))
            .unwrap_or_else(|| dir.to_path_buf());

        let mut patterns = Vec::new();
        for (pattern, templates) in merged.compiler_options.paths {
            let resolved_templates = templates.iter().map(|t| t.clone()).collect();
            patterns.push((pattern.clone(), CompiledPattern::compile(&pattern, resolved_templates)));
        }
        // HashMap iteration order is not stable, so sort by pattern
        // specificity (longest literal prefix first) as a deterministic
        // tie-break for first-match-wins semantics.
        patterns.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

        Ok(Self { base_url, patterns })
    }

    fn load_merged(path: &Path, seen: &mut Vec<PathBuf>) -> Result<RawTsConfig> {
        let canonical = dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
        if seen.contains(&canonical) {
            return Err(Error::ConfigInvalid(format!(
                "circular tsconfig `extends` chain at {}",
                path.display()
            )));
        }
        seen.push(canonical);

        let content = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let mut config = parse_jsonc(&content)?;

        if let Some(extends) = config.extends.take() {
            let parent_path = resolve_extends_path(path, &extends);
            let mut parent = Self::load_merged(&parent_path, seen)?;
            // Child overrides parent: start from parent, overlay child.
            if config.compiler_options.base_url.is_some() {
                parent.compiler_options.base_url = config.compiler_options.base_url;
            }
            for (k, v) in config.compiler_options.paths {
                parent.compiler_options.paths.insert(k, v);
            }
            return Ok(parent);
        }

        Ok(config)
    }

    /// Resolves an alias specifier to an existing file, probing candidates in
    /// declared pattern order and, per candidate, the bare path then each
    /// extension then the `index.*` forms.
    pub fn resolve(&self, specifier: &str) -> Option<PathBuf> {
        if is_ambient_or_node_modules(specifier) {
            return None;
        }

        for (_pattern, compiled) in &self.patterns {
            let Some(captured) = compiled.matches(specifier) else { continue };
            for candidate in compiled.candidates(captured) {
                let base = self.base_url.join(&candidate);
                if let Some(found) = probe(&base) {
                    return Some(found);
                }
            }
        }
        None
    }
}

fn is_ambient_or_node_modules(specifier: &str) -> bool {
    specifier.contains("node_modules") || specifier.starts_with("@types/")
}

fn resolve_extends_path(from: &Path, extends: &str) -> PathBuf {
    let dir = from.parent().unwrap_or_else(|| Path::new("."));
    let mut candidate = dir.join(extends);
    if candidate.extension().is_none() {
        candidate.set_extension("json");
    }
    candidate
}

fn probe(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    for ext in CANDIDATE_EXTENSIONS {
        let mut with_ext = path.as_os_str().to_os_string();
        with_ext.push(ext);
        let with_ext = PathBuf::from(with_ext);
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    for ext in CANDIDATE_EXTENSIONS {
        let candidate = path.join(format!("index{ext}"));
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn parses_jsonc_with_comments_and_trailing_commas() {
        let json = r#"{
            // a comment
            "compilerOptions": {
                "baseUrl": "src",
                "paths": { "@utils/*": ["utils/*"], },
            },
        }"#;
        let parsed = parse_jsonc(json).unwrap();
        assert_eq!(parsed.compiler_options.base_url.as_deref(), Some("src"));
        assert_eq!(parsed.compiler_options.paths.get("@utils/*").unwrap(), &vec!["utils/*".to_string()]);
    }

    #[test]
    fn resolves_wildcard_alias_to_existing_ts_file() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/utils")).unwrap();
        fs::write(dir.path().join("src/utils/greet.ts"), "export const greet = () => {};").unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"compilerOptions":{"baseUrl":"src","paths":{"@utils/*":["utils/*"]}}}"#,
        )
        .unwrap();

        let cfg = TsConfigPaths::load(&dir.path().join("tsconfig.json")).unwrap();
        let resolved = cfg.resolve("@utils/greet").unwrap();
        assert!(resolved.ends_with("src/utils/greet.ts"));
    }

    #[test]
    fn extends_chain_child_overrides_parent() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("base.json"),
            r#"{"compilerOptions":{"baseUrl":"src","paths":{"@a/*":["a/*"]}}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"extends":"./base","compilerOptions":{"paths":{"@a/*":["overridden/*"]}}}"#,
        )
        .unwrap();
        fs::create_dir_all(dir.path().join("src/overridden")).unwrap();
        fs::write(dir.path().join("src/overridden/x.ts"), "export {};").unwrap();

        let cfg = TsConfigPaths::load(&dir.path().join("tsconfig.json")).unwrap();
        let resolved = cfg.resolve("@a/x").unwrap();
        assert!(resolved.ends_with("src/overridden/x.ts"));
    }

    #[test]
    fn ambient_node_modules_specifiers_are_skipped() {
        let dir = tempdir().unwrap();
        fs::write(
            dir.path().join("tsconfig.json"),
            r#"{"compilerOptions":{"baseUrl":".","paths":{"*":["node_modules/*"]}}}"#,
        )
        .unwrap();
        let cfg = TsConfigPaths::load(&dir.path().join("tsconfig.json")).unwrap();
        assert!(cfg.resolve("node_modules/lodash").is_none());
    }
}
