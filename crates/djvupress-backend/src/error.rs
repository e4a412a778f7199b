use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("{command} not available to perform conversion (searched PATH: {search_path})")]
    NotInstalled { command: String, search_path: String },

    #[error("{backend} does not support .{extension} files (supported: {})", .allowed.join(", "))]
    UnsupportedFiletype {
        backend: String,
        extension: String,
        allowed: Vec<String>,
    },

    #[error("converter exited with {} - output:\n{output}", .code.map_or_else(|| "no status (killed)".to_string(), |c| format!("status {c}")))]
    ExecutionFailed { code: Option<i32>, output: String },

    #[error("conversion cancelled")]
    Cancelled,

    #[error("unknown backend {name} (known backends: {})", .known.join(", "))]
    UnknownBackend { name: String, known: Vec<String> },

    #[error("download verification failed for version {requested}{}", .fallback.as_ref().map_or_else(String::new, |v| format!(" (fallback {v} also failed)")))]
    DownloadVerificationFailed {
        requested: String,
        fallback: Option<String>,
    },

    #[error("failed to extract {}: {details}", .archive.display())]
    ExtractionFailed { archive: PathBuf, details: String },

    #[error("extracted binary reports version {reported}, expected {requested}")]
    VersionMismatch { requested: String, reported: String },

    #[error("configuration inconsistency: {details}")]
    ConfigurationInconsistency { details: String },

    #[error("{backend} has no managed releases; {hint}")]
    InstallUnsupported { backend: String, hint: String },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{context}: {details}")]
    Network {
        context: &'static str,
        details: String,
    },
}

impl BackendError {
    #[must_use]
    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn network<E: std::fmt::Display>(context: &'static str, error: E) -> Self {
        Self::Network {
            context,
            details: error.to_string(),
        }
    }

    pub fn inconsistency(details: impl Into<String>) -> Self {
        Self::ConfigurationInconsistency {
            details: details.into(),
        }
    }

    /// Stable kind name, written to stderr alongside the message by the CLI.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotInstalled { .. } => "NotInstalled",
            Self::UnsupportedFiletype { .. } => "UnsupportedFiletype",
            Self::ExecutionFailed { .. } => "BackendExecutionError",
            Self::Cancelled => "Cancelled",
            Self::UnknownBackend { .. } => "UnknownBackend",
            Self::DownloadVerificationFailed { .. } => "DownloadVerificationFailed",
            Self::ExtractionFailed { .. } => "ExtractionFailed",
            Self::VersionMismatch { .. } => "VersionMismatch",
            Self::ConfigurationInconsistency { .. } => "ConfigurationInconsistency",
            Self::InstallUnsupported { .. } => "InstallUnsupported",
            Self::Io { .. } => "Io",
            Self::Network { .. } => "Network",
        }
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::Io {
            context: "io error",
            source: err,
        }
    }
}
