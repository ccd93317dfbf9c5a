//! Backend-E: a Node-like single-file CommonJS bundler, invoked as an
//! external subprocess that exchanges a line-delimited JSON resolve protocol
//! over stdio.

use super::{forbidden_modules_error, resolve_hook, BuildBackend, BundleRequest, BackendOutput, ResolveDecision};
use crate::error::{Error, Result};
use crate::options::{BackendKind, SourceMapMode};
use crate::tracker::DependencyTracker;
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

/// Name of the external driver binary. Overridable via `BACKEND_E_BIN` for
/// test environments that vendor a specific build.
const DEFAULT_BIN: &str = "backend-e-bundle";

#[derive(Default)]
pub struct BackendE {
    binary: Option<PathBuf>,
}

impl BackendE {
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self { binary: Some(binary.into()) }
    }

    fn binary_path(&self) -> PathBuf {
        self.binary.clone().unwrap_or_else(|| {
            std::env::var_os("BACKEND_E_BIN").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(DEFAULT_BIN))
        })
    }
}

#[derive(Serialize)]
struct EntrypointMessage<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    source: &'a str,
}

#[derive(Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ResolveReply {
    Continue,
    Resolved { path: String },
    Stub,
    Fail { reason: String },
}

#[derive(Deserialize)]
struct DriverEvent {
    #[serde(flatten)]
    kind: DriverEventKind,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverEventKind {
    Resolve { specifier: String, importer: String, eraseable: bool },
    Done { code: String, source_map: Option<String>, warnings: Vec<String> },
    /// A bare specifier exhausted every alias/node resolution strategy.
    ResolutionFailed { specifier: String, importer: String },
    /// A `require`/`import()` call whose argument is not a string literal.
    DynamicImport { file: String },
    Error { message: String },
}

impl BuildBackend for BackendE {
    fn id(&self) -> BackendKind {
        BackendKind::E
    }

    #[tracing::instrument(skip_all, fields(backend = "E"))]
    fn bundle(&self, request: BundleRequest<'_>, tracker: &mut DependencyTracker) -> Result<BackendOutput> {
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
            .map_err(|e| Error::BuildFailed { message: format!("failed to spawn backend-e: {e}"), aborted: false })?;

        let entry_line = serde_json::to_string(&EntrypointMessage {
            kind: "entrypoint",
            source: &request.entrypoint.source,
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
            match event.kind {
                DriverEventKind::Resolve { specifier, importer, eraseable } => {
                    let decision = resolve_hook(
                        &specifier,
                        &PathBuf::from(importer),
                        request.ignore_modules,
                        eraseable,
                        request.tsconfig,
                        tracker,
                    );
                    let reply = match decision {
                        ResolveDecision::Continue => ResolveReply::Continue,
                        ResolveDecision::Resolved(path) => ResolveReply::Resolved { path: path.to_string_lossy().into_owned() },
                        ResolveDecision::Stub => ResolveReply::Stub,
                    };
                    send_reply(&mut child, &reply)?;
                }
                DriverEventKind::Done { code, source_map, warnings } => {
                    let _ = child.wait();
                    if let Some(err) = forbidden_modules_error(tracker) {
                        return Err(err);
                    }
                    return Ok(BackendOutput { code, source_map, warnings });
                }
                DriverEventKind::ResolutionFailed { specifier, importer } => {
                    let _ = child.wait();
                    return Err(Error::ResolutionFailed { specifier, importer: PathBuf::from(importer) });
                }
                DriverEventKind::DynamicImport { file } => {
                    let _ = child.wait();
                    return Err(Error::DynamicImport { file: PathBuf::from(file) });
                }
                DriverEventKind::Error { message } => {
                    let _ = child.wait();
                    return Err(Error::BuildFailed { message, aborted: false });
                }
            }
        }

        let status = child.wait().map_err(|e| Error::BuildFailed { message: e.to_string(), aborted: false })?;
        Err(Error::BuildFailed {
            message: format!("backend-e exited without a result (status: {status})"),
            aborted: false,
        })
    }
}

fn send_reply(child: &mut std::process::Child, reply: &ResolveReply) -> Result<()> {
    let stdin = child.stdin.as_mut();
    if let Some(stdin) = stdin {
        let json = serde_json::to_string(reply)?;
        stdin
            .write_all(json.as_bytes())
            .and_then(|_| stdin.write_all(b"\n"))
            .map_err(|e| Error::BuildFailed { message: e.to_string(), aborted: false })?;
    }
    Ok(())
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
    fn default_binary_name_is_overridable_by_env() {
        std::env::set_var("BACKEND_E_BIN", "/opt/custom/backend-e");
        let backend = BackendE::default();
        assert_eq!(backend.binary_path(), PathBuf::from("/opt/custom/backend-e"));
        std::env::remove_var("BACKEND_E_BIN");
    }

    #[test]
    fn explicit_binary_overrides_env() {
        let backend = BackendE::with_binary("/explicit/bin");
        assert_eq!(backend.binary_path(), PathBuf::from("/explicit/bin"));
    }
}
