#![doc = include_str!("../README.md")]
#![warn(rustdoc::all)]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![deny(unused_must_use, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

#[macro_use]
extern crate tracing;

pub mod error;
pub use error::{Error, Result};

pub mod policy;
pub mod classifier;
pub mod tsconfig;
pub mod tracker;

pub mod options;
pub use options::{BackendKind, BuildPlugin, BundleOptions, BundleOptionsBuilder, SourceMapMode, TsconfigPathOption};

pub mod entrypoint;

pub mod backend;
pub use backend::{BuildBackend, BackendOutput};

pub mod shim;

pub mod hash;

pub mod cache;
pub use cache::{now_ms, DiskCache};

pub mod bundle;
pub use bundle::{WorkflowBundle, WorkflowBundleMetadata};

pub mod validator;
pub use validator::{ValidationReport, ValidatorOptions};

/// Utilities for creating and tearing down scratch workspaces in tests.
#[cfg(feature = "project-util")]
pub mod project_util;

mod orchestrator;
pub use orchestrator::{
    bundle_workflow_code, BundlerContext, PipelineConfig, PipelineConfigBuilder, PipelineOrchestrator,
    WorkflowCodeBundler,
};
#[cfg(feature = "async")]
pub use orchestrator::bundle_workflow_code_async;

mod loader;
pub use loader::{load_bundle, LoadBundleOptions, LoadedBundle};

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn end_to_end_requires_a_workflow_file() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::builder().project_root(dir.path()).build().unwrap();
        let orchestrator = PipelineOrchestrator::new(config);

        let options = BundleOptions::builder(dir.path().join("missing.ts")).build().unwrap();
        let result = orchestrator.run(options, 0);
        assert!(matches!(result, Err(Error::EntrypointNotFound(_))));
    }

    #[test]
    fn forbidden_builtin_is_rejected_by_the_classifier_directly() {
        // Exercises the same classifier the orchestrator relies on during a
        // backend's resolve callback, without needing a live backend process.
        let ignore = Default::default();
        let classification =
            classifier::classify("node:fs", &ignore, classifier::EraseableHint(false));
        assert!(matches!(classification, classifier::Classification::Forbidden(_)));
    }

    #[test]
    fn bundle_round_trips_through_to_script_and_from_script() {
        let bundle = WorkflowBundle {
            code: "exports.x = 1;".into(),
            source_map: None,
            metadata: None,
        };
        let script = bundle.to_script();
        let (metadata, code) = WorkflowBundle::from_script(&script);
        assert!(metadata.is_none());
        assert_eq!(code, "exports.x = 1;");
    }
}
