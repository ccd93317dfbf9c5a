//! `WorkflowBundle` and its metadata: the pipeline's output data model.

use crate::options::BackendKind;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Immutable record attached to a produced or loaded bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowBundleMetadata {
    /// Caller-supplied wall-clock timestamp (milliseconds); never computed
    /// internally so the pipeline stays a pure function of its inputs.
    pub timestamp_ms: u64,
    pub backend: BackendKind,
    pub entry_hash: String,
    pub bundler_version: String,
    pub sdk_version: Option<String>,
    pub ignored_modules: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowBundle {
    pub code: String,
    pub source_map: Option<String>,
    pub metadata: Option<WorkflowBundleMetadata>,
}

/// Sentinel prefix the validator looks for when recovering an embedded JSON
/// metadata header from a bundle file on disk.
pub const METADATA_SENTINEL: &str = "// __WORKFLOW_BUNDLE_METADATA__ ";

impl WorkflowBundle {
    /// Serializes the bundle to its on-disk form: a single UTF-8 script,
    /// with metadata (if present) embedded as an initial comment so the file
    /// remains directly executable.
    pub fn to_script(&self) -> String {
        let mut out = String::new();
        if let Some(metadata) = &self.metadata {
            let json = serde_json::to_string(metadata).unwrap_or_default();
            out.push_str(METADATA_SENTINEL);
            out.push_str(&json);
            out.push('\n');
        }
        out.push_str(&self.code);
        out
    }

    /// Recovers `(metadata, code)` from a previously serialized script.
    pub fn from_script(script: &str) -> (Option<WorkflowBundleMetadata>, &str) {
        if let Some(rest) = script.strip_prefix(METADATA_SENTINEL) {
            if let Some((json_line, code)) = rest.split_once('\n') {
                if let Ok(metadata) = serde_json::from_str(json_line) {
                    return (Some(metadata), code);
                }
            }
        }
        (None, script)
    }
}

/// Where an external source map is written relative to the bundle file.
pub fn source_map_sibling_path(bundle_path: &std::path::Path) -> PathBuf {
    let mut os = bundle_path.as_os_str().to_os_string();
    os.push(".map");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> WorkflowBundleMetadata {
        WorkflowBundleMetadata {
            timestamp_ms: 12345,
            backend: BackendKind::E,
            entry_hash: "abcd1234abcd1234".into(),
            bundler_version: "0.1.0".into(),
            sdk_version: Some("1.9.0".into()),
            ignored_modules: vec!["fs".into()],
            warnings: vec![],
        }
    }

    #[test]
    fn round_trip_metadata_through_script_embedding() {
        let bundle = WorkflowBundle {
            code: "exports.a = 1;".into(),
            source_map: None,
            metadata: Some(sample_metadata()),
        };
        let script = bundle.to_script();
        let (recovered, code) = WorkflowBundle::from_script(&script);
        assert_eq!(recovered.unwrap().entry_hash, bundle.metadata.unwrap().entry_hash);
        assert_eq!(code, "exports.a = 1;");
    }

    #[test]
    fn script_without_metadata_round_trips_as_plain_code() {
        let bundle = WorkflowBundle { code: "exports.a = 1;".into(), source_map: None, metadata: None };
        let script = bundle.to_script();
        let (recovered, code) = WorkflowBundle::from_script(&script);
        assert!(recovered.is_none());
        assert_eq!(code, "exports.a = 1;");
    }
}
