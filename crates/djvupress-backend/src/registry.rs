use std::ffi::OsString;
use std::path::Path;

use crate::error::BackendError;
use crate::progress::ProgressUpdate;

/// Builds the argument vector for one conversion:
/// `[executable, ...userFlags, ...backend-specific positional args]`.
pub type CommandBuilder =
    fn(executable: &Path, source: &Path, flags: &[String], output: &Path) -> Vec<OsString>;

/// Maps one raw output line to an optional progress update. The fraction, if
/// any, is relative to the conversion phase (0.0 = first page, 1.0 = last),
/// computed against the page count the raster classifier reported.
pub type ProgressParser = fn(line: &str, total_pages: u32) -> Option<ProgressUpdate>;

/// Where managed release archives for a backend come from.
#[derive(Debug, Clone, Copy)]
pub struct ReleaseSource {
    /// Redirect-based "latest" URL; the final resolved path segment is the
    /// version tag.
    pub latest_url: &'static str,
    /// Archive URL for a concrete version, platform-appropriate format.
    pub archive_url: fn(version: &str) -> String,
    /// Version known to exist upstream, retried once when the requested
    /// version fails download verification.
    pub fallback_version: &'static str,
}

/// A registered external converter and its invocation metadata. Immutable
/// once registered.
#[derive(Clone, Copy)]
pub struct Backend {
    pub name: &'static str,
    pub display_name: &'static str,
    pub supported_extensions: &'static [&'static str],
    pub output_extension: &'static str,
    pub command_builder: CommandBuilder,
    pub progress_parser: Option<ProgressParser>,
    pub release_source: Option<ReleaseSource>,
    /// Manual installation guidance, surfaced when no release source exists.
    pub install_hint: &'static str,
}

impl Backend {
    #[must_use]
    pub fn supports_extension(&self, extension: &str) -> bool {
        self.supported_extensions
            .iter()
            .any(|supported| supported.eq_ignore_ascii_case(extension))
    }

    #[must_use]
    pub fn build_command(
        &self,
        executable: &Path,
        source: &Path,
        flags: &[String],
        output: &Path,
    ) -> Vec<OsString> {
        (self.command_builder)(executable, source, flags, output)
    }
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Backend")
            .field("name", &self.name)
            .field("supported_extensions", &self.supported_extensions)
            .finish_non_exhaustive()
    }
}

/// Registry of available backends. Registration order is preserved: it is the
/// listing order shown to users, and the first registered backend is the
/// default when none is configured.
#[derive(Debug, Default)]
pub struct BackendRegistry {
    backends: Vec<Backend>,
}

impl BackendRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, backend: Backend) {
        debug_assert!(
            !self.backends.iter().any(|b| b.name == backend.name),
            "backend {} registered twice",
            backend.name
        );
        self.backends.push(backend);
    }

    /// Look up a backend by name.
    ///
    /// # Errors
    /// Returns [`BackendError::UnknownBackend`] listing the known names when
    /// no backend matches.
    pub fn resolve(&self, name: &str) -> Result<&Backend, BackendError> {
        self.backends
            .iter()
            .find(|backend| backend.name == name)
            .ok_or_else(|| BackendError::UnknownBackend {
                name: name.to_string(),
                known: self.names().iter().map(ToString::to_string).collect(),
            })
    }

    #[must_use]
    pub fn names(&self) -> Vec<&'static str> {
        self.backends.iter().map(|backend| backend.name).collect()
    }

    /// The first registered backend, used when none is configured.
    #[must_use]
    pub fn default_backend(&self) -> Option<&Backend> {
        self.backends.first()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Backend> {
        self.backends.iter()
    }
}
