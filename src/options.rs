//! `BundleOptions` and its builder: a plain data struct plus a
//! `#[must_use]`-chained builder that validates and normalizes on `build()`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceMapMode {
    Inline,
    External,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackendKind {
    E,
    B,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TsconfigPathOption {
    Auto,
    Explicit(PathBuf),
    Disabled,
}

/// A user build plugin, sorted by `priority` (lower first, stable for ties)
/// before being handed to the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildPlugin {
    pub name: String,
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BundleOptions {
    pub workflows_path: PathBuf,
    pub workflow_interceptor_modules: Vec<PathBuf>,
    pub payload_converter_path: Option<PathBuf>,
    pub failure_converter_path: Option<PathBuf>,
    pub ignore_modules: BTreeSet<String>,
    pub source_map: SourceMapMode,
    pub backend: BackendKind,
    pub tree_shaking: bool,
    pub tsconfig_path: TsconfigPathOption,
    pub externals: Vec<String>,
    pub build_plugins: Vec<BuildPlugin>,
}

impl BundleOptions {
    pub fn builder(workflows_path: impl Into<PathBuf>) -> BundleOptionsBuilder {
        BundleOptionsBuilder::new(workflows_path)
    }

    /// Normalizes all paths to absolute and deduplicates the interceptor
    /// list order-preservingly.
    pub fn normalized(mut self, cwd: &Path) -> Result<Self> {
        self.workflows_path = absolutize(cwd, &self.workflows_path);
        if !self.workflows_path.is_file() {
            return Err(Error::EntrypointNotFound(self.workflows_path));
        }

        let mut seen = BTreeSet::new();
        let mut deduped = Vec::with_capacity(self.workflow_interceptor_modules.len());
        for path in self.workflow_interceptor_modules {
            let abs = absolutize(cwd, &path);
            if seen.insert(abs.clone()) {
                deduped.push(abs);
            }
        }
        self.workflow_interceptor_modules = deduped;

        self.payload_converter_path = self.payload_converter_path.map(|p| absolutize(cwd, &p));
        self.failure_converter_path = self.failure_converter_path.map(|p| absolutize(cwd, &p));
        if let TsconfigPathOption::Explicit(p) = &self.tsconfig_path {
            self.tsconfig_path = TsconfigPathOption::Explicit(absolutize(cwd, p));
        }

        Ok(self)
    }
}

fn absolutize(cwd: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        cwd.join(path)
    }
}

#[derive(Debug, Clone)]
pub struct BundleOptionsBuilder {
    workflows_path: PathBuf,
    workflow_interceptor_modules: Vec<PathBuf>,
    payload_converter_path: Option<PathBuf>,
    failure_converter_path: Option<PathBuf>,
    ignore_modules: BTreeSet<String>,
    source_map: SourceMapMode,
    backend: BackendKind,
    tree_shaking: bool,
    tsconfig_path: TsconfigPathOption,
    externals: Vec<String>,
    build_plugins: Vec<BuildPlugin>,
}

impl BundleOptionsBuilder {
    fn new(workflows_path: impl Into<PathBuf>) -> Self {
        Self {
            workflows_path: workflows_path.into(),
            workflow_interceptor_modules: Vec::new(),
            payload_converter_path: None,
            failure_converter_path: None,
            ignore_modules: BTreeSet::new(),
            source_map: SourceMapMode::None,
            backend: BackendKind::E,
            tree_shaking: true,
            tsconfig_path: TsconfigPathOption::Auto,
            externals: Vec::new(),
            build_plugins: Vec::new(),
        }
    }

    #[must_use]
    pub fn interceptor_modules(mut self, modules: impl IntoIterator<Item = PathBuf>) -> Self {
        self.workflow_interceptor_modules.extend(modules);
        self
    }

    #[must_use]
    pub fn payload_converter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.payload_converter_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn failure_converter_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.failure_converter_path = Some(path.into());
        self
    }

    #[must_use]
    pub fn ignore_modules(mut self, modules: impl IntoIterator<Item = String>) -> Self {
        self.ignore_modules.extend(modules);
        self
    }

    #[must_use]
    pub fn source_map(mut self, mode: SourceMapMode) -> Self {
        self.source_map = mode;
        self
    }

    #[must_use]
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    #[must_use]
    pub fn tree_shaking(mut self, enabled: bool) -> Self {
        self.tree_shaking = enabled;
        self
    }

    #[must_use]
    pub fn tsconfig_path(mut self, option: TsconfigPathOption) -> Self {
        self.tsconfig_path = option;
        self
    }

    #[must_use]
    pub fn externals(mut self, externals: impl IntoIterator<Item = String>) -> Self {
        self.externals.extend(externals);
        self
    }

    #[must_use]
    pub fn build_plugin(mut self, plugin: BuildPlugin) -> Self {
        self.build_plugins.push(plugin);
        self
    }

    pub fn build(mut self) -> Result<BundleOptions> {
        if self.workflows_path.as_os_str().is_empty() {
            return Err(Error::ConfigInvalid("workflows_path must not be empty".into()));
        }
        self.build_plugins.sort_by_key(|p| p.priority);

        Ok(BundleOptions {
            workflows_path: self.workflows_path,
            workflow_interceptor_modules: self.workflow_interceptor_modules,
            payload_converter_path: self.payload_converter_path,
            failure_converter_path: self.failure_converter_path,
            ignore_modules: self.ignore_modules,
            source_map: self.source_map,
            backend: self.backend,
            tree_shaking: self.tree_shaking,
            tsconfig_path: self.tsconfig_path,
            externals: self.externals,
            build_plugins: self.build_plugins,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plugins_sorted_by_priority_stable_for_ties() {
        let opts = BundleOptions::builder("a.ts")
            .build_plugin(BuildPlugin { name: "c".into(), priority: 5 })
            .build_plugin(BuildPlugin { name: "a".into(), priority: 1 })
            .build_plugin(BuildPlugin { name: "b".into(), priority: 1 })
            .build()
            .unwrap();
        let names: Vec<_> = opts.build_plugins.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
