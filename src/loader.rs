//! Bundle loader: reads a previously-produced bundle file from disk,
//! recovers its embedded metadata header, and verifies structure.

use crate::bundle::{WorkflowBundle, WorkflowBundleMetadata};
use crate::error::{Error, IoResultExt, Result};
use crate::validator::{self, ValidatorOptions};
use semver::Version;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default)]
pub struct LoadBundleOptions {
    pub path: PathBuf,
    pub expected_sdk_version: Option<Version>,
    pub strict: bool,
}

impl LoadBundleOptions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), expected_sdk_version: None, strict: false }
    }

    #[must_use]
    pub fn expected_sdk_version(mut self, version: Version) -> Self {
        self.expected_sdk_version = Some(version);
        self
    }

    #[must_use]
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }
}

#[derive(Debug, Clone)]
pub struct LoadedBundle {
    pub bundle: WorkflowBundle,
    pub metadata: Option<WorkflowBundleMetadata>,
}

/// Reads and validates the script at `opts.path`. A missing or unreadable
/// source map is not fatal; only the primary script is required to exist.
#[tracing::instrument(fields(path = %opts.path.display()))]
pub fn load_bundle(opts: LoadBundleOptions) -> Result<LoadedBundle> {
    let script = std::fs::read_to_string(&opts.path).with_path(opts.path.clone())?;
    let (metadata, code) = WorkflowBundle::from_script(&script);

    let source_map = read_sibling_source_map(&opts.path);

    let bundle = WorkflowBundle { code: code.to_string(), source_map, metadata: metadata.clone() };

    let validator_options = ValidatorOptions {
        expected_sdk_version: opts.expected_sdk_version,
        expected_bundler_version: None,
        strict: opts.strict,
    };
    let report = validator::validate(&bundle, &validator_options);
    for warning in &report.warnings {
        tracing::warn!(%warning, path = %opts.path.display(), "bundle load warning");
    }
    if !report.valid {
        tracing::error!(errors = ?report.errors, path = %opts.path.display(), "loaded bundle failed validation");
        return Err(Error::ValidationFailed(report.errors));
    }

    Ok(LoadedBundle { bundle, metadata })
}

fn read_sibling_source_map(bundle_path: &Path) -> Option<String> {
    let sibling = crate::bundle::source_map_sibling_path(bundle_path);
    std::fs::read_to_string(sibling).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::BackendKind;
    use tempfile::tempdir;

    fn sample_metadata() -> WorkflowBundleMetadata {
        WorkflowBundleMetadata {
            timestamp_ms: 1,
            backend: BackendKind::E,
            entry_hash: "a".repeat(16),
            bundler_version: "0.1.0".into(),
            sdk_version: Some("1.9.0".into()),
            ignored_modules: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn loads_a_bundle_with_embedded_metadata() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.js");
        let bundle = WorkflowBundle {
            code: format!("(function(){{global.__MODULE_CACHE__={{}};global.__WORKFLOW_NAMESPACE__={{}};}})();"),
            source_map: None,
            metadata: Some(sample_metadata()),
        };
        std::fs::write(&path, bundle.to_script()).unwrap();

        let loaded = load_bundle(LoadBundleOptions::new(&path)).unwrap();
        assert_eq!(loaded.metadata.unwrap().entry_hash, "a".repeat(16));
    }

    #[test]
    fn loads_a_sibling_source_map_when_present() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bundle.js");
        let bundle = WorkflowBundle {
            code: "(function(){global.__MODULE_CACHE__={};global.__WORKFLOW_NAMESPACE__={};})();".into(),
            source_map: None,
            metadata: None,
        };
        std::fs::write(&path, bundle.to_script()).unwrap();
        std::fs::write(dir.path().join("bundle.js.map"), "{\"version\":3}").unwrap();

        let loaded = load_bundle(LoadBundleOptions::new(&path)).unwrap();
        assert_eq!(loaded.bundle.source_map.as_deref(), Some("{\"version\":3}"));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempdir().unwrap();
        let result = load_bundle(LoadBundleOptions::new(dir.path().join("missing.js")));
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
