//! Pipeline orchestrator. The single public entry point, implemented as a
//! chain of consuming-method stages: normalize options, synthesize the
//! entrypoint, check the cache, invoke the backend, shim the output, attach
//! metadata, validate, and persist to the cache.

use crate::backend::{self, BundleRequest};
use crate::bundle::{WorkflowBundle, WorkflowBundleMetadata};
use crate::cache::{CacheValue, DiskCache};
use crate::entrypoint::{self, SynthesizedEntrypoint};
use crate::error::{Error, Result};
use crate::hash::{content_hash, HashInput};
use crate::options::{BundleOptions, TsconfigPathOption};
use crate::shim;
use crate::tracker::{DependencyTracker, ResolutionKind};
use crate::tsconfig::TsConfigPaths;
use crate::validator::{self, ValidatorOptions};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

pub const BUNDLER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Process-wide, immutable once frozen. Shared across concurrently-running
/// builds without any other shared mutable state.
#[derive(Clone)]
pub struct PipelineConfig {
    pub project_root: PathBuf,
    pub cache: Option<Arc<DiskCache>>,
    pub expected_sdk_version: Option<semver::Version>,
    pub strict_validation: bool,
}

impl PipelineConfig {
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineConfigBuilder {
    project_root: Option<PathBuf>,
    cache_dir: Option<PathBuf>,
    cache_max_age_ms: u64,
    cache_max_bytes: u64,
    expected_sdk_version: Option<semver::Version>,
    strict_validation: bool,
}

impl PipelineConfigBuilder {
    pub fn new() -> Self {
        Self { cache_max_age_ms: 24 * 60 * 60 * 1000, cache_max_bytes: 512 * 1024 * 1024, ..Default::default() }
    }

    #[must_use]
    pub fn project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    #[must_use]
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    /// Points the cache at the platform cache directory (`~/.cache/workflow-bundler`
    /// on Linux, etc.), falling back to no caching if the platform has none.
    #[must_use]
    pub fn default_cache_dir(mut self) -> Self {
        self.cache_dir = dirs::cache_dir().map(|dir| dir.join("workflow-bundler"));
        self
    }

    #[must_use]
    pub fn cache_max_age_ms(mut self, max_age_ms: u64) -> Self {
        self.cache_max_age_ms = max_age_ms;
        self
    }

    #[must_use]
    pub fn cache_max_bytes(mut self, max_bytes: u64) -> Self {
        self.cache_max_bytes = max_bytes;
        self
    }

    #[must_use]
    pub fn expected_sdk_version(mut self, version: semver::Version) -> Self {
        self.expected_sdk_version = Some(version);
        self
    }

    #[must_use]
    pub fn strict_validation(mut self, strict: bool) -> Self {
        self.strict_validation = strict;
        self
    }

    pub fn build(self) -> Result<PipelineConfig> {
        let project_root = self
            .project_root
            .ok_or_else(|| Error::ConfigInvalid("project_root is required".into()))?;
        let cache = self
            .cache_dir
            .map(|dir| Arc::new(DiskCache::new(dir, self.cache_max_age_ms, self.cache_max_bytes)));

        Ok(PipelineConfig {
            project_root,
            cache,
            expected_sdk_version: self.expected_sdk_version,
            strict_validation: self.strict_validation,
        })
    }
}

/// The long-lived handle around which individual builds run: holds the
/// frozen configuration that every build shares (project root, cache,
/// expected SDK version, strict-validation flag).
pub struct PipelineOrchestrator {
    config: PipelineConfig,
}

impl PipelineOrchestrator {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Runs one build end to end, invoked with a caller-supplied timestamp so
    /// the pipeline remains a pure function of its inputs.
    #[tracing::instrument(skip(self, options), fields(workflows_path = %options.workflows_path.display()))]
    pub fn run(&self, options: BundleOptions, timestamp_ms: u64) -> Result<WorkflowBundle> {
        self.run_sync(options, timestamp_ms)
    }

    fn run_sync(&self, options: BundleOptions, timestamp_ms: u64) -> Result<WorkflowBundle> {
        let normalized = NormalizedRequest::new(options, &self.config)?;
        let synthesized = normalized.synthesize()?;

        match synthesized.check_cache(timestamp_ms) {
            Some(hit) => {
                tracing::debug!(entry_hash = %hit.metadata.as_ref().map(|m| m.entry_hash.as_str()).unwrap_or(""), "cache hit");
                Ok(hit)
            }
            None => {
                let built = synthesized.invoke_backend()?;
                let shimmed = built.shim();
                let finalized = shimmed.finalize(timestamp_ms)?;
                finalized.validate(&self.config)?;
                finalized.store_in_cache(timestamp_ms);
                Ok(finalized.bundle)
            }
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(feature = "async")] {
        impl PipelineOrchestrator {
            /// Async counterpart of [`PipelineOrchestrator::run`]: the filesystem-heavy
            /// stages (content hashing, disk cache I/O, backend subprocess) all run
            /// synchronously already, so this wraps the whole pipeline in
            /// `spawn_blocking` rather than threading `.await` through every stage.
            pub async fn run_async(&self, options: BundleOptions, timestamp_ms: u64) -> Result<WorkflowBundle> {
                let config = self.config.clone();
                tokio::task::spawn_blocking(move || PipelineOrchestrator::new(config).run_sync(options, timestamp_ms))
                    .await
                    .map_err(|e| Error::BuildFailed {
                        message: format!("bundling task panicked: {e}"),
                        aborted: true,
                    })?
            }
        }

        /// Async counterpart of [`bundle_workflow_code`].
        pub async fn bundle_workflow_code_async(
            orchestrator: &PipelineOrchestrator,
            options: BundleOptions,
            timestamp_ms: u64,
        ) -> Result<WorkflowBundle> {
            orchestrator.run_async(options, timestamp_ms).await
        }
    }
}

/// Stage 1: options normalized, paths absolutized, interceptors deduped.
struct NormalizedRequest {
    options: BundleOptions,
    tsconfig: Option<TsConfigPaths>,
    config: PipelineConfig,
}

impl NormalizedRequest {
    fn new(options: BundleOptions, config: &PipelineConfig) -> Result<Self> {
        let options = options.normalized(&config.project_root)?;

        let tsconfig = match &options.tsconfig_path {
            TsconfigPathOption::Disabled => None,
            TsconfigPathOption::Explicit(path) => Some(TsConfigPaths::load(path)?),
            TsconfigPathOption::Auto => {
                let start = options.workflows_path.parent().unwrap_or(&config.project_root);
                TsConfigPaths::locate_and_load(start)?
            }
        };

        Ok(Self { options, tsconfig, config: config.clone() })
    }

    /// Steps 2-3: initialize the resolver, synthesize the entrypoint, compute
    /// `entryHash`.
    fn synthesize(self) -> Result<SynthesizedState> {
        let entrypoint = entrypoint::synthesize(
            &self.options.workflows_path,
            &self.options.workflow_interceptor_modules,
        );
        Ok(SynthesizedState { options: self.options, tsconfig: self.tsconfig, entrypoint, config: self.config })
    }
}

struct SynthesizedState {
    options: BundleOptions,
    tsconfig: Option<TsConfigPaths>,
    entrypoint: SynthesizedEntrypoint,
    config: PipelineConfig,
}

impl SynthesizedState {
    fn cache_key(&self) -> String {
        format!(
            "{:?}-{}-{}",
            self.options.backend,
            self.entrypoint.entry_hash,
            crate::hash::short_hash(&format!("{:?}", self.options.build_plugins.iter().map(|p| &p.name).collect::<Vec<_>>()))
        )
    }

    /// Step 4: cache lookup.
    fn check_cache(&self, timestamp_ms: u64) -> Option<WorkflowBundle> {
        let cache = self.config.cache.as_ref()?;
        let entry = cache.get(&self.cache_key(), timestamp_ms)?;
        let metadata: Option<WorkflowBundleMetadata> = serde_json::from_value(entry.metadata).ok();
        Some(WorkflowBundle { code: entry.code, source_map: entry.source_map, metadata })
    }

    /// Steps 5-6: build the resolver plugin, invoke the selected backend.
    fn invoke_backend(self) -> Result<BuiltState> {
        let backend = backend::for_kind(self.options.backend);
        let mut tracker = DependencyTracker::new(self.entrypoint.workflows_path.clone());
        let cache_key = self.cache_key();

        let request = BundleRequest {
            entrypoint: &self.entrypoint,
            plugins: &self.options.build_plugins,
            externals: &self.options.externals,
            source_map: self.options.source_map,
            tree_shaking: self.options.tree_shaking,
            ignore_modules: &self.options.ignore_modules,
            tsconfig: self.tsconfig.as_ref(),
        };

        let output = backend.bundle(request, &mut tracker)?;

        Ok(BuiltState {
            options: self.options,
            entrypoint: self.entrypoint,
            config: self.config,
            cache_key,
            output,
            tracker,
        })
    }
}

struct BuiltState {
    options: BundleOptions,
    entrypoint: SynthesizedEntrypoint,
    config: PipelineConfig,
    cache_key: String,
    output: backend::BackendOutput,
    tracker: DependencyTracker,
}

impl BuiltState {
    /// Step 7: shim the output.
    fn shim(self) -> ShimmedState {
        let shimmed = shim::shim(&self.output.code);
        ShimmedState {
            options: self.options,
            entrypoint: self.entrypoint,
            config: self.config,
            cache_key: self.cache_key,
            code: shimmed.code,
            source_map: self.output.source_map,
            warnings: self.output.warnings,
            tracker: self.tracker,
        }
    }
}

struct ShimmedState {
    options: BundleOptions,
    entrypoint: SynthesizedEntrypoint,
    config: PipelineConfig,
    cache_key: String,
    code: String,
    source_map: Option<String>,
    warnings: Vec<String>,
    tracker: DependencyTracker,
}

impl ShimmedState {
    /// Attaches metadata, surfacing any ignored module the backend actually
    /// resolved through as a warning (or, under strict validation, failing
    /// the build outright).
    fn finalize(self, timestamp_ms: u64) -> Result<FinalizedBundle> {
        let inputs = project_file_inputs(&self.entrypoint, &self.tracker);
        let entry_hash = content_hash(&self.config.project_root, &inputs).unwrap_or(self.entrypoint.entry_hash.clone());

        let mut warnings = self.warnings;
        let mut seen = BTreeSet::new();
        for edge in self.tracker.edges() {
            if edge.kind != ResolutionKind::StubIgnored || !seen.insert(edge.specifier.clone()) {
                continue;
            }
            if self.config.strict_validation {
                return Err(Error::IgnoredModuleUsed { specifier: edge.specifier.clone() });
            }
            warnings.push(format!("ignored module `{}` was imported and stubbed out", edge.specifier));
        }

        let metadata = WorkflowBundleMetadata {
            timestamp_ms,
            backend: self.options.backend,
            entry_hash,
            bundler_version: BUNDLER_VERSION.to_string(),
            sdk_version: None,
            ignored_modules: self.options.ignore_modules.iter().cloned().collect(),
            warnings,
        };

        Ok(FinalizedBundle {
            bundle: WorkflowBundle { code: self.code, source_map: self.source_map, metadata: Some(metadata) },
            config: self.config,
            cache_key: self.cache_key,
        })
    }
}

struct FinalizedBundle {
    bundle: WorkflowBundle,
    config: PipelineConfig,
    cache_key: String,
}

impl FinalizedBundle {
    /// Step 9 (validate side): run the bundle validator; a strict-mode
    /// failure aborts the build rather than shipping a bad bundle.
    fn validate(&self, config: &PipelineConfig) -> Result<()> {
        let options = ValidatorOptions {
            expected_sdk_version: config.expected_sdk_version.clone(),
            expected_bundler_version: None,
            strict: config.strict_validation,
        };
        let report = validator::validate(&self.bundle, &options);
        for warning in &report.warnings {
            tracing::warn!(%warning, "bundle validation warning");
        }
        if !report.valid {
            return Err(Error::ValidationFailed(report.errors));
        }
        Ok(())
    }

    /// Step 9 (store side): persist to the cache if enabled.
    fn store_in_cache(&self, timestamp_ms: u64) {
        let Some(cache) = &self.config.cache else { return };
        let metadata_json = self
            .bundle
            .metadata
            .as_ref()
            .map(|m| serde_json::to_value(m).unwrap_or_default())
            .unwrap_or_default();
        let value = CacheValue {
            code: self.bundle.code.clone(),
            source_map: self.bundle.source_map.clone(),
            metadata: metadata_json,
        };
        if let Err(error) = cache.put(&self.cache_key, &value, timestamp_ms) {
            tracing::warn!(%error, "failed to persist bundle to disk cache; continuing without it");
        }
    }
}

fn project_file_inputs(entrypoint: &SynthesizedEntrypoint, tracker: &DependencyTracker) -> Vec<HashInput> {
    let mut inputs = vec![HashInput::ProjectFile(entrypoint.workflows_path.clone())];
    inputs.extend(entrypoint.interceptor_modules.iter().cloned().map(HashInput::ProjectFile));
    for edge in tracker.edges() {
        if let Some(resolved) = &edge.resolved_path {
            if resolved.is_file() {
                inputs.push(HashInput::ProjectFile(resolved.clone()));
            }
        }
    }
    inputs
}

/// Convenience free function for a one-off build against an existing
/// orchestrator, without going through [`WorkflowCodeBundler`].
pub fn bundle_workflow_code(
    orchestrator: &PipelineOrchestrator,
    options: BundleOptions,
    timestamp_ms: u64,
) -> Result<WorkflowBundle> {
    orchestrator.run(options, timestamp_ms)
}

/// The long-lived handle exposing `create_bundle`/`create_context`.
pub struct WorkflowCodeBundler {
    orchestrator: PipelineOrchestrator,
}

impl WorkflowCodeBundler {
    pub fn new(config: PipelineConfig) -> Self {
        Self { orchestrator: PipelineOrchestrator::new(config) }
    }

    pub fn create_bundle(&self, options: BundleOptions, timestamp_ms: u64) -> Result<WorkflowBundle> {
        self.orchestrator.run(options, timestamp_ms)
    }

    /// Reusable resolver + plugin state across multiple build invocations
    /// for a test suite. There is deliberately no file-watch integration
    /// here; that belongs to whatever file-notification collaborator the
    /// caller already uses.
    pub fn create_context(&self) -> BundlerContext<'_> {
        BundlerContext { orchestrator: &self.orchestrator }
    }
}

pub struct BundlerContext<'a> {
    orchestrator: &'a PipelineOrchestrator,
}

impl BundlerContext<'_> {
    pub fn build(&self, options: BundleOptions, timestamp_ms: u64) -> Result<WorkflowBundle> {
        self.orchestrator.run(options, timestamp_ms)
    }
}
