//! Backend-B: the alternate engine. Same `BuildBackend` contract as
//! Backend-E, but specifier handling for some classes goes through a shallow
//! specifier-loader rather than an onResolve callback, and the output is
//! namespaced by a per-bundle hash to avoid module-cache collisions across
//! isolate instances.

use super::{forbidden_modules_error, resolve_hook, BackendOutput, BuildBackend, BundleRequest, ResolveDecision};
use crate::error::{Error, Result};
use crate::options::{BackendKind, SourceMapMode};
use crate::tracker::DependencyTracker;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

const DEFAULT_BIN: &str = "backend-b-bundle";

#[derive(Default)]
pub struct BackendB {
    binary: Option<PathBuf>,
}

impl BackendB {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: Some(binary.into()) }
    }

    fn binary_path(&self) -> PathBuf {
        self.binary.clone().unwrap_or_else(|| {
            std::env::var_os("BACKEND_B_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_BIN))
        })
    }
}

#[derive(Serialize)]
struct EntrypointMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    source: &'a str,
    namespace: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum LoadReply {
    Continue,
    Resolved { path: String },
    Stub,
    Fail { reason: String },
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverEvent {
    Load { specifier: String, importer: String, eraseable: bool },
    Done { code: String, source_map: Option<String>, warnings: Vec<String> },
    /// A bare specifier exhausted every alias/node resolution strategy.
    ResolutionFailed { specifier: String, importer: String },
    /// A `require`/`import()` call whose argument is not a string literal.
    DynamicImport { file: String },
    Error { message: String },
}

impl BuildBackend for BackendB {
    fn id(&self) -> BackendKind {
        BackendKind::B
    }

    #[tracing::instrument(skip_all, fields(backend = "B"))]
    fn bundle(&self, request: BundleRequest<'_>, tracker: &mut DependencyTracker) -> Result<BackendOutput> {
        let namespace_hash = crate::hash::short_hash(&request.entrypoint.source);

        let mut child = Command::new(self.binary_path())
            .arg("--protocol")
            .arg("jsonl-stdio")
            .arg("--tree-shaking")
            .arg(request.tree_shaking.to_string())
            .arg("--source-map")
            .arg(source_map_flag(request.source_map))
            .args(request.externals.iter().flat_map(|e| ["--external".to_string(), e.clone()]))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::BuildFailed { message: format!("failed to spawn backend-b: {e}"), aborted: false })?;

        let entry_line = serde_json::to_string(&EntrypointMessage {
            kind: "entrypoint",
            source: &request.entrypoint.source,
            namespace: &namespace_hash,
        })?;
        {
            let stdin = child.stdin.as_mut().expect("piped stdin");
            stdin
                .write_all(entry_line.as_bytes())
                .and_then(|_| stdin.write_all(b"\n"))
                .map_err(|e| Error::BuildFailed { message: e.to_string(), aborted: false })?;
        }

        let stdout = child.stdout.take().expect("piped stdout");
        let reader = BufReader::new(stdout);

        for line in reader.lines() {
            let line = line.map_err(|e| Error::BuildFailed { message: e.to_string(), aborted: false })?;
            if line.trim().is_empty() {
                continue;
            }
            let event: DriverEvent = serde_json::from_str(&line)?;
            match event {
                DriverEvent::Load { specifier, importer, eraseable } => {
                    let decision = resolve_hook(
                        &specifier,
                        &PathBuf::from(importer),
                        request.ignore_modules,
                        eraseable,
                        request.tsconfig,
                        tracker,
                    );
                    let reply = match decision {
                        ResolveDecision::Continue => LoadReply::Continue,
                        ResolveDecision::Resolved(path) => LoadReply::Resolved { path: path.to_string_lossy().into_owned() },
                        ResolveDecision::Stub => LoadReply::Stub,
                    };
                    let stdin = child.stdin.as_mut().expect("piped stdin");
                    let json = serde_json::to_string(&reply)?;
                    stdin
                        .write_all(json.as_bytes())
                        .and_then(|_| stdin.write_all(b"\n"))
                        .map_err(|e| Error::BuildFailed { message: e.to_string(), aborted: false })?;
                }
                DriverEvent::Done { code, source_map, warnings } => {
                    let _ = child.wait();
                    if let Some(err) = forbidden_modules_error(tracker) {
                        return Err(err);
                    }
                    return Ok(BackendOutput { code, source_map, warnings });
                }
                DriverEvent::ResolutionFailed { specifier, importer } => {
                    let _ = child.wait();
                    return Err(Error::ResolutionFailed { specifier, importer: PathBuf::from(importer) });
                }
                DriverEvent::DynamicImport { file } => {
                    let _ = child.wait();
                    return Err(Error::DynamicImport { file: PathBuf::from(file) });
                }
                DriverEvent::Error { message } => {
                    let _ = child.wait();
                    return Err(Error::BuildFailed { message, aborted: false });
                }
            }
        }

        let status = child.wait().map_err(|e| Error::BuildFailed { message: e.to_string(), aborted: false })?;
        Err(Error::BuildFailed {
            message: format!("backend-b exited without a result (status: {status})"),
            aborted: false,
        })
    }
}

fn source_map_flag(mode: SourceMapMode) -> &'static str {
    match mode {
        SourceMapMode::Inline => "inline",
        SourceMapMode::External => "external",
        SourceMapMode::None => "none",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_path_resolution_prefers_explicit_over_env() {
        std::env::set_var("BACKEND_B_BIN", "/opt/env-bin");
        assert_eq!(BackendB::with_binary("/explicit").binary_path(), PathBuf::from("/explicit"));
        assert_eq!(BackendB::default().binary_path(), PathBuf::from("/opt/env-bin"));
        std::env::remove_var("BACKEND_B_BIN");
    }
}
