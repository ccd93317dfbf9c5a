//! End-to-end tests against the crate's public surface. A real build
//! requires spawning a backend subprocess that won't exist in a test
//! environment, so these cover everything upstream and downstream of that
//! boundary: option normalization, tsconfig alias resolution, content
//! hashing, the disk cache, and the bundle/validator/loader round trip.

use std::fs;
use tempfile::tempdir;
use workflow_bundler::{
    hash::{content_hash, HashInput},
    load_bundle, now_ms,
    options::{BackendKind, TsconfigPathOption},
    BundleOptions, DiskCache, Error, LoadBundleOptions, PipelineConfig, PipelineOrchestrator,
    WorkflowBundle, WorkflowBundleMetadata,
};

#[test]
fn missing_workflow_entrypoint_fails_before_touching_a_backend() {
    let dir = tempdir().unwrap();
    let config = PipelineConfig::builder().project_root(dir.path()).build().unwrap();
    let orchestrator = PipelineOrchestrator::new(config);

    let options = BundleOptions::builder(dir.path().join("does-not-exist.ts")).build().unwrap();
    let result = orchestrator.run(options, now_ms());

    assert!(matches!(result, Err(Error::EntrypointNotFound(_))));
}

#[test]
fn duplicate_interceptor_paths_are_deduplicated_order_preserving() {
    let dir = tempdir().unwrap();
    let workflows = dir.path().join("workflows.ts");
    let interceptor = dir.path().join("interceptor.ts");
    fs::write(&workflows, "export function greet() {}").unwrap();
    fs::write(&interceptor, "export const interceptors = () => ({});").unwrap();

    let options = BundleOptions::builder(&workflows)
        .interceptor_modules([interceptor.clone(), interceptor.clone()])
        .build()
        .unwrap()
        .normalized(dir.path())
        .unwrap();

    assert_eq!(options.workflow_interceptor_modules.len(), 1);
    assert_eq!(options.workflow_interceptor_modules[0], interceptor);
}

#[test]
fn tsconfig_alias_resolves_through_an_extends_chain() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("src/utils")).unwrap();
    fs::write(
        dir.path().join("tsconfig.base.json"),
        r#"{ "compilerOptions": { "baseUrl": "." } }"#,
    )
    .unwrap();
    fs::write(
        dir.path().join("tsconfig.json"),
        r#"{
            "extends": "./tsconfig.base.json",
            "compilerOptions": { "paths": { "@utils/*": ["src/utils/*"] } }
        }"#,
    )
    .unwrap();
    fs::write(dir.path().join("src/utils/format.ts"), "export const fmt = (x) => x;").unwrap();

    let options = BundleOptions::builder(dir.path().join("src/utils/format.ts"))
        .tsconfig_path(TsconfigPathOption::Explicit(dir.path().join("tsconfig.json")))
        .build()
        .unwrap();

    let loaded = workflow_bundler::tsconfig::TsConfigPaths::load(dir.path().join("tsconfig.json").as_path()).unwrap();
    let resolved = loaded.resolve("@utils/format").unwrap();
    assert_eq!(resolved, dir.path().join("src/utils/format.ts"));

    // The explicit tsconfig path survives option normalization unchanged.
    assert_eq!(options.tsconfig_path, TsconfigPathOption::Explicit(dir.path().join("tsconfig.json")));
}

#[test]
fn content_hash_is_sensitive_to_any_input_file_change_across_a_tree() {
    let dir = tempdir().unwrap();
    let a = dir.path().join("a.ts");
    let b = dir.path().join("b.ts");
    fs::write(&a, "export const a = 1;").unwrap();
    fs::write(&b, "export const b = 2;").unwrap();

    let inputs = vec![HashInput::ProjectFile(a.clone()), HashInput::ProjectFile(b.clone())];
    let before = content_hash(dir.path(), &inputs).unwrap();

    fs::write(&b, "export const b = 3;").unwrap();
    let after = content_hash(dir.path(), &inputs).unwrap();

    assert_ne!(before, after);
}

#[test]
fn disk_cache_public_round_trip_honors_ttl() {
    let dir = tempdir().unwrap();
    let cache = DiskCache::new(dir.path(), 60_000, 10 * 1024 * 1024);
    let value = workflow_bundler::cache::CacheValue {
        code: "exports.x = 1;".into(),
        source_map: None,
        metadata: serde_json::json!({"entryHash": "deadbeef"}),
    };

    cache.put("key-a", &value, 1_000).unwrap();
    assert_eq!(cache.get("key-a", 1_500).unwrap().code, "exports.x = 1;");
    assert!(cache.get("key-a", 1_000 + 60_001).is_none());
}

#[test]
fn bundle_written_then_loaded_round_trips_and_validates() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bundle.js");
    let bundle = WorkflowBundle {
        code: "(function(){global.__MODULE_CACHE__={};global.__WORKFLOW_NAMESPACE__={};})();".into(),
        source_map: None,
        metadata: Some(WorkflowBundleMetadata {
            timestamp_ms: 42,
            backend: BackendKind::E,
            entry_hash: "f".repeat(16),
            bundler_version: "0.1.0".into(),
            sdk_version: None,
            ignored_modules: vec!["fs".into()],
            warnings: vec![],
        }),
    };
    fs::write(&path, bundle.to_script()).unwrap();

    let loaded = load_bundle(LoadBundleOptions::new(&path)).unwrap();
    assert_eq!(loaded.metadata.unwrap().entry_hash, "f".repeat(16));
    assert_eq!(loaded.bundle.code, bundle.code);
}

#[test]
fn loading_a_structurally_broken_bundle_fails_validation() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("broken.js");
    fs::write(&path, "console.log('not a real bundle');").unwrap();

    let result = load_bundle(LoadBundleOptions::new(&path));
    assert!(matches!(result, Err(Error::ValidationFailed(_))));
}
