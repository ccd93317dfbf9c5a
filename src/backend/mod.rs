//! Backend abstraction: two interchangeable build backends behind one
//! capability, `BuildBackend::bundle`, each driving an external subprocess
//! that does the actual parsing and bundling.

mod backend_b;
mod backend_e;

pub use backend_b::BackendB;
pub use backend_e::BackendE;

use crate::classifier::{classify, Classification};
use crate::entrypoint::SynthesizedEntrypoint;
use crate::error::{Error, ErrorContext, Offender, Result};
use crate::options::{BackendKind, BuildPlugin, SourceMapMode};
use crate::tracker::{DependencyTracker, ResolutionKind, ResolutionRecord};
use crate::tsconfig::TsConfigPaths;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Inputs to a single `bundle()` invocation, built by the orchestrator.
pub struct BundleRequest<'a> {
    pub entrypoint: &'a SynthesizedEntrypoint,
    pub plugins: &'a [BuildPlugin],
    pub externals: &'a [String],
    pub source_map: SourceMapMode,
    pub tree_shaking: bool,
    pub ignore_modules: &'a BTreeSet<String>,
    pub tsconfig: Option<&'a TsConfigPaths>,
}

/// Raw backend output, before the output shim is applied.
#[derive(Debug, Clone)]
pub struct BackendOutput {
    pub code: String,
    pub source_map: Option<String>,
    pub warnings: Vec<String>,
}

/// The capability both backends implement. `resolve_specifier` is the shared
/// onResolve-equivalent hook: it consults the classifier, records the edge in
/// the tracker, and returns the resolve decision each backend applies in its
/// own idiom (onResolve callback for Backend-E, specifier-loader for
/// Backend-B).
pub trait BuildBackend: Send + Sync {
    fn id(&self) -> BackendKind;
    fn bundle(&self, request: BundleRequest<'_>, tracker: &mut DependencyTracker) -> Result<BackendOutput>;
}

/// A resolve decision shared by both backends' plugin adapters.
pub enum ResolveDecision {
    /// Let the backend's default resolver proceed.
    Continue,
    /// Rewrite the specifier to this resolved, on-disk path before letting
    /// the backend's default resolver proceed (a `tsconfig.json` path alias).
    Resolved(PathBuf),
    /// Replace with a virtual empty-exports stub module. Also used for a
    /// forbidden specifier: the build keeps driving so every offender in the
    /// graph gets recorded, and the whole thing is failed in one shot once
    /// the backend finishes.
    Stub,
}

/// Shared resolve-hook logic used by both backend adapters: classify the
/// specifier, attempt alias resolution for bare specifiers, record the edge,
/// and translate the verdict into a [`ResolveDecision`].
pub(crate) fn resolve_hook(
    specifier: &str,
    importer: &Path,
    ignore_modules: &BTreeSet<String>,
    eraseable: bool,
    tsconfig: Option<&TsConfigPaths>,
    tracker: &mut DependencyTracker,
) -> ResolveDecision {
    let classification = classify(specifier, ignore_modules, crate::classifier::EraseableHint(eraseable));

    if let Classification::Bare = &classification {
        if let Some(aliased) = tsconfig.and_then(|cfg| cfg.resolve(specifier)) {
            tracker.record(ResolutionRecord {
                specifier: specifier.to_string(),
                importer: importer.to_path_buf(),
                kind: ResolutionKind::Aliased,
                resolved_path: Some(aliased.clone()),
                alternative: None,
            });
            return ResolveDecision::Resolved(aliased);
        }
    }

    let (kind, resolved_path, alternative) = match &classification {
        Classification::PassThrough => (ResolutionKind::Relative, None, None),
        Classification::Stub => (ResolutionKind::StubIgnored, Some(virtual_path(specifier)), None),
        Classification::Forbidden(decision) => {
            let alt = match decision {
                crate::policy::PolicyDecision::Forbidden(alt) => alt.clone(),
                _ => None,
            };
            (ResolutionKind::Forbidden, Some(virtual_path(specifier)), alt)
        }
        Classification::AllowedBuiltinStub => (ResolutionKind::BareRuntime, Some(virtual_path(specifier)), None),
        Classification::Bare => (ResolutionKind::BarePackage, None, None),
    };

    tracker.record(ResolutionRecord {
        specifier: specifier.to_string(),
        importer: importer.to_path_buf(),
        kind,
        resolved_path,
        alternative,
    });

    match classification {
        Classification::PassThrough | Classification::Bare => ResolveDecision::Continue,
        Classification::Stub | Classification::AllowedBuiltinStub | Classification::Forbidden(_) => ResolveDecision::Stub,
    }
}

fn virtual_path(specifier: &str) -> PathBuf {
    PathBuf::from(format!("<virtual:{specifier}>"))
}

/// Scans every edge the tracker recorded during a build for forbidden
/// specifiers and, if any were seen, aggregates them into one error instead
/// of failing on whichever offender happened to resolve first.
pub(crate) fn forbidden_modules_error(tracker: &DependencyTracker) -> Option<Error> {
    let mut seen = BTreeSet::new();
    let mut offenders = Vec::new();

    for edge in tracker.edges() {
        if edge.kind != ResolutionKind::Forbidden {
            continue;
        }
        if !seen.insert((edge.specifier.clone(), edge.importer.clone())) {
            continue;
        }
        let chain = tracker.shortest_chain_to(&virtual_path(&edge.specifier));
        offenders.push(Offender { specifier: edge.specifier.clone(), chain, alternative: edge.alternative.clone() });
    }

    if offenders.is_empty() {
        None
    } else {
        Some(Error::ForbiddenModules { context: ErrorContext { offenders } })
    }
}

/// Constructs the concrete backend for a [`BackendKind`].
pub fn for_kind(kind: BackendKind) -> Box<dyn BuildBackend> {
    match kind {
        BackendKind::E => Box::new(BackendE::default()),
        BackendKind::B => Box::new(BackendB::default()),
    }
}
