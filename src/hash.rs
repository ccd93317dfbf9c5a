//! Content hashing: a deep content hash over the transitive closure of input
//! files reached from the entrypoint, for cache-key derivation.

use crate::error::{Error, Result};
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// A single resolved input to be folded into the content hash: either a
/// first/third-party project file, or a third-party package identified by
/// name and version (trusting lockfile discipline instead of hashing
/// `node_modules` contents).
#[derive(Debug, Clone)]
pub enum HashInput {
    ProjectFile(PathBuf),
    Package { name: String, version: String },
}

/// Computes a deterministic content hash: sort inputs lexicographically by
/// their path-relative-to-root (or `name@version` for packages), hash each
/// file's content, and fold `(relPath ‖ size ‖ fileHash)` into a running
/// SHA-256.
pub fn content_hash(root: &Path, inputs: &[HashInput]) -> Result<String> {
    let mut entries: Vec<(String, Vec<u8>)> = inputs
        .par_iter()
        .map(|input| hash_one(root, input))
        .collect::<Result<Vec<_>>>()?;

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    let mut hasher = Sha256::new();
    for (key, file_hash) in entries {
        hasher.update(key.as_bytes());
        hasher.update(b"\0");
        hasher.update(&file_hash);
    }

    Ok(hex::encode(hasher.finalize()))
}

fn hash_one(root: &Path, input: &HashInput) -> Result<(String, Vec<u8>)> {
    match input {
        HashInput::ProjectFile(path) => {
            let content = std::fs::read(path).map_err(|e| Error::io(path.clone(), e))?;
            let rel = relative_to(root, path);
            let mut hasher = Sha256::new();
            hasher.update(&content);
            let file_hash = hasher.finalize();
            let key = format!("{}\0{}", rel, content.len());
            Ok((key, file_hash.to_vec()))
        }
        HashInput::Package { name, version } => {
            let key = format!("{name}@{version}");
            let mut hasher = Sha256::new();
            hasher.update(key.as_bytes());
            Ok((key, hasher.finalize().to_vec()))
        }
    }
}

fn relative_to(root: &Path, path: &Path) -> String {
    use path_slash::PathExt;
    path.strip_prefix(root).unwrap_or(path).to_slash_lossy().into_owned()
}

/// A cheap short hash used for Backend-B's per-bundle module-cache
/// namespace, not the full content hash.
pub fn short_hash(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    hex::encode(hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn hash_sensitivity_changes_on_any_byte() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.ts");
        fs::write(&file, "export const a = 1;").unwrap();

        let before = content_hash(dir.path(), &[HashInput::ProjectFile(file.clone())]).unwrap();

        fs::write(&file, "export const a = 2;").unwrap();
        let after = content_hash(dir.path(), &[HashInput::ProjectFile(file)]).unwrap();

        assert_ne!(before, after);
    }

    #[test]
    fn hash_is_order_independent_across_input_list() {
        let dir = tempdir().unwrap();
        let a = dir.path().join("a.ts");
        let b = dir.path().join("b.ts");
        fs::write(&a, "a").unwrap();
        fs::write(&b, "b").unwrap();

        let h1 = content_hash(dir.path(), &[HashInput::ProjectFile(a.clone()), HashInput::ProjectFile(b.clone())])
            .unwrap();
        let h2 = content_hash(dir.path(), &[HashInput::ProjectFile(b), HashInput::ProjectFile(a)]).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn package_inputs_hash_by_name_and_version_not_contents() {
        let dir = tempdir().unwrap();
        let h1 = content_hash(
            dir.path(),
            &[HashInput::Package { name: "lodash".into(), version: "4.17.21".into() }],
        )
        .unwrap();
        let h2 = content_hash(
            dir.path(),
            &[HashInput::Package { name: "lodash".into(), version: "4.17.21".into() }],
        )
        .unwrap();
        assert_eq!(h1, h2);
    }
}
