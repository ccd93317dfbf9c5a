//! Entrypoint synthesis: emits the synthetic CommonJS module that wires the
//! workflow SDK's worker interface, applies global overrides, and exposes
//! the user workflow module plus interceptors.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// The generated synthetic entrypoint, plus the inputs it was derived from
/// (kept around so later stages can report them in diagnostics).
#[derive(Debug, Clone)]
pub struct SynthesizedEntrypoint {
    pub source: String,
    pub workflows_path: PathBuf,
    pub interceptor_modules: Vec<PathBuf>,
    pub entry_hash: String,
}

/// Generates the synthetic module source per the fixed ordering the shim and
/// Worker runtime rely on: `api` binding, global overrides, then the two
/// exported factory functions.
pub fn synthesize(workflows_path: &Path, interceptor_modules: &[PathBuf]) -> SynthesizedEntrypoint {
    let workflows_require = require_literal(workflows_path);
    let mut source = String::new();

    source.push_str("const { api } = require('@temporalio/workflow/lib/worker-interface');\n");
    source.push_str("exports.api = api;\n");
    source.push_str(
        "const { overrideGlobals } = require('@temporalio/workflow/lib/global-overrides');\n",
    );
    source.push_str("overrideGlobals();\n\n");

    source.push_str("function stabilizeWorkflowNames(mod) {\n");
    source.push_str("  const out = {};\n");
    source.push_str("  for (const key of Object.keys(mod)) {\n");
    source.push_str("    const value = mod[key];\n");
    source.push_str("    if (typeof value === 'function') {\n");
    source.push_str(
        "      Object.defineProperty(value, 'name', { value: key, writable: false, configurable: true });\n",
    );
    source.push_str("    }\n");
    source.push_str("    out[key] = value;\n");
    source.push_str("  }\n");
    source.push_str("  return out;\n");
    source.push_str("}\n\n");

    source.push_str("exports.importWorkflows = function importWorkflows() {\n");
    source.push_str(&format!("  return stabilizeWorkflowNames(require({workflows_require}));\n"));
    source.push_str("};\n\n");

    source.push_str("exports.importInterceptors = function importInterceptors() {\n");
    source.push_str("  const interceptors = [];\n");
    for module in interceptor_modules {
        source.push_str(&format!(
            "  interceptors.push(...require({}));\n",
            require_literal(module)
        ));
    }
    source.push_str("  return interceptors;\n");
    source.push_str("};\n");

    let entry_hash = hash_entrypoint(workflows_path, interceptor_modules);

    SynthesizedEntrypoint {
        source,
        workflows_path: workflows_path.to_path_buf(),
        interceptor_modules: interceptor_modules.to_vec(),
        entry_hash,
    }
}

fn require_literal(path: &Path) -> String {
    format!("{:?}", path.to_string_lossy())
}

/// `hashEntrypoint`: a pure function of `workflowsPath` and the
/// deduplicated, order-preserved interceptor list. 16 hex characters.
pub fn hash_entrypoint(workflows_path: &Path, interceptor_modules: &[PathBuf]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(workflows_path.to_string_lossy().as_bytes());
    for module in interceptor_modules {
        hasher.update(b"\0");
        hasher.update(module.to_string_lossy().as_bytes());
    }
    let digest = hasher.finalize();
    hex::encode(digest)[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_source_has_fixed_ordering() {
        let entry = synthesize(Path::new("/wf.ts"), &[]);
        let api_pos = entry.source.find("exports.api").unwrap();
        let overrides_pos = entry.source.find("overrideGlobals()").unwrap();
        let workflows_pos = entry.source.find("exports.importWorkflows").unwrap();
        let interceptors_pos = entry.source.find("exports.importInterceptors").unwrap();
        assert!(api_pos < overrides_pos);
        assert!(overrides_pos < workflows_pos);
        assert!(workflows_pos < interceptors_pos);
    }

    #[test]
    fn hash_entrypoint_is_pure_and_order_sensitive() {
        let a = hash_entrypoint(Path::new("/wf.ts"), &[PathBuf::from("/a.ts"), PathBuf::from("/b.ts")]);
        let b = hash_entrypoint(Path::new("/wf.ts"), &[PathBuf::from("/a.ts"), PathBuf::from("/b.ts")]);
        let c = hash_entrypoint(Path::new("/wf.ts"), &[PathBuf::from("/b.ts"), PathBuf::from("/a.ts")]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 16);
    }
}
