//! Structured error type shared by every stage of the pipeline.

use std::{fmt, path::PathBuf};

/// Convenience alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A suggested replay-safe replacement for a forbidden module, drawn from the
/// [`crate::policy::DeterminismPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Alternative {
    pub replacement: String,
    pub import_from: String,
    pub reason: String,
    pub example: Option<String>,
}

/// A single forbidden-module offender, with the chain that led to it.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Offender {
    pub specifier: String,
    pub chain: Vec<PathBuf>,
    pub alternative: Option<Alternative>,
}

/// Extra diagnostic context attached to an [`Error`].
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ErrorContext {
    pub offenders: Vec<Offender>,
}

/// The crate's error type. One variant per distinct failure a build can end
/// in, plus an `Io` variant carrying path context the way [`std::io::Error`]
/// never does on its own.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid bundle options: {0}")]
    ConfigInvalid(String),

    #[error("workflow entrypoint not found: {0}")]
    EntrypointNotFound(PathBuf),

    #[error("{} forbidden module(s) imported", .context.offenders.len())]
    ForbiddenModules { context: ErrorContext },

    #[error("ignored module `{specifier}` was exercised at runtime")]
    IgnoredModuleUsed { specifier: String },

    #[error("could not resolve specifier `{specifier}` imported from {importer}")]
    ResolutionFailed { specifier: String, importer: PathBuf },

    #[error("dynamic import/require with a non-literal argument in {file}")]
    DynamicImport { file: PathBuf },

    #[error("backend build failed: {message}")]
    BuildFailed { message: String, aborted: bool },

    #[error("bundle validation failed: {0:?}")]
    ValidationFailed(Vec<String>),

    #[error(transparent)]
    Io(#[from] IoErrorContext),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Machine-readable `code` field identifying the failure class, stable
    /// across releases so callers can match on it instead of the message.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::ConfigInvalid(_) => "CONFIG_INVALID",
            Self::EntrypointNotFound(_) => "ENTRYPOINT_NOT_FOUND",
            Self::ForbiddenModules { .. } => "FORBIDDEN_MODULES",
            Self::IgnoredModuleUsed { .. } => "IGNORED_MODULE_USED",
            Self::ResolutionFailed { .. } => "RESOLUTION_FAILED",
            Self::DynamicImport { .. } => "DYNAMIC_IMPORT",
            Self::BuildFailed { .. } => "BUILD_FAILED",
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::Io(_) => "IO",
            Self::Json(_) => "JSON",
        }
    }

    pub fn msg(msg: impl Into<String>) -> Self {
        Self::ConfigInvalid(msg.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io(IoErrorContext { path: path.into(), source })
    }
}

/// An [`std::io::Error`] annotated with the path that caused it.
#[derive(Debug)]
pub struct IoErrorContext {
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl fmt::Display for IoErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for IoErrorContext {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

pub(crate) trait IoResultExt<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::result::Result<T, std::io::Error> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|source| Error::io(path, source))
    }
}
