//! Utilities for creating and tearing down scratch workspaces in tests:
//! a temporary directory seeded with a workflow entry module, a handful of
//! interceptor modules, and (optionally) a copy of an existing fixture tree.
//! Gated behind the `project-util` feature.

use crate::error::{Error, Result};
use crate::options::{BundleOptions, BundleOptionsBuilder};
use rand::Rng;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// A scratch project rooted in a fresh temporary directory, deleted on drop.
///
/// Construct with [`TempWorkspace::new`] and add files with
/// [`TempWorkspace::add_workflow`] / [`TempWorkspace::add_interceptor`]
/// before handing `options()` to a [`crate::PipelineOrchestrator`].
pub struct TempWorkspace {
    dir: TempDir,
    workflows_path: Option<PathBuf>,
    interceptor_modules: Vec<PathBuf>,
}

impl TempWorkspace {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix("workflow-bundler-")
            .tempdir()
            .map_err(|e| Error::ConfigInvalid(format!("failed to create temp workspace: {e}")))?;
        Ok(Self { dir, workflows_path: None, interceptor_modules: Vec::new() })
    }

    /// Copies an existing fixture directory's contents into the workspace
    /// root, for tests that start from a checked-in sample project.
    pub fn seed_from(fixture_dir: &Path) -> Result<Self> {
        let workspace = Self::new()?;
        let options = fs_extra::dir::CopyOptions::new().content_only(true).overwrite(true);
        fs_extra::dir::copy(fixture_dir, workspace.dir.path(), &options)
            .map_err(|e| Error::ConfigInvalid(format!("failed to seed temp workspace: {e}")))?;
        Ok(workspace)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Writes `source` to a uniquely-named file under the workspace root and
    /// records it as the workflow entrypoint.
    pub fn add_workflow(&mut self, source: &str) -> Result<&Path> {
        let path = self.write_unique_file("workflows", source)?;
        self.workflows_path = Some(path);
        Ok(self.workflows_path.as_deref().unwrap())
    }

    /// Writes `source` to a uniquely-named file under the workspace root and
    /// appends it to the interceptor module list.
    pub fn add_interceptor(&mut self, source: &str) -> Result<&Path> {
        let path = self.write_unique_file("interceptor", source)?;
        self.interceptor_modules.push(path);
        Ok(self.interceptor_modules.last().unwrap())
    }

    fn write_unique_file(&self, prefix: &str, source: &str) -> Result<PathBuf> {
        let suffix: u32 = rand::thread_rng().gen();
        let path = self.dir.path().join(format!("{prefix}-{suffix:08x}.ts"));
        std::fs::write(&path, source)
            .map_err(|e| Error::ConfigInvalid(format!("failed to write {}: {e}", path.display())))?;
        Ok(path)
    }

    /// Builds a [`BundleOptions`] builder pre-populated with the workflow
    /// entrypoint and interceptors added so far.
    pub fn options(&self) -> Result<BundleOptionsBuilder> {
        let workflows_path = self
            .workflows_path
            .clone()
            .ok_or_else(|| Error::ConfigInvalid("temp workspace has no workflow entrypoint yet".into()))?;
        let builder = BundleOptions::builder(workflows_path).interceptor_modules(self.interceptor_modules.clone());
        Ok(builder)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_tracks_a_workflow_entrypoint() {
        let mut workspace = TempWorkspace::new().unwrap();
        let path = workspace.add_workflow("export function greet() {}").unwrap().to_path_buf();
        assert!(path.is_file());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "export function greet() {}");
    }

    #[test]
    fn options_requires_a_workflow_entrypoint_first() {
        let workspace = TempWorkspace::new().unwrap();
        assert!(workspace.options().is_err());
    }

    #[test]
    fn interceptors_are_tracked_in_add_order() {
        let mut workspace = TempWorkspace::new().unwrap();
        workspace.add_workflow("export function greet() {}").unwrap();
        workspace.add_interceptor("export const interceptors = () => ({});").unwrap();
        let builder = workspace.options().unwrap();
        let options = builder.build().unwrap();
        assert_eq!(options.workflow_interceptor_modules.len(), 1);
    }
}
