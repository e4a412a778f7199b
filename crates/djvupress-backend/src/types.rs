use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Dotted-integer converter version, for example `0.9.19` or `1.10`.
///
/// Any number of components is accepted; ordering is componentwise numeric,
/// then by length, so `1.2 < 1.2.0 < 1.10.0` (missing components are NOT
/// padded with zeros).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolVersion {
    components: Vec<u32>,
}

impl ToolVersion {
    #[must_use]
    pub fn new(components: Vec<u32>) -> Self {
        Self { components }
    }

    #[must_use]
    pub fn components(&self) -> &[u32] {
        &self.components
    }
}

impl Ord for ToolVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for ToolVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for ToolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for component in &self.components {
            if !first {
                write!(f, ".")?;
            }
            write!(f, "{component}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionParseError {
    #[error("Expected dotted integer version, got: {input}")]
    InvalidFormat { input: String },
    #[error("Invalid version component: {value}")]
    InvalidComponent { value: String },
}

impl FromStr for ToolVersion {
    type Err = VersionParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('v').unwrap_or(s);

        if s.is_empty() {
            return Err(VersionParseError::InvalidFormat {
                input: s.to_string(),
            });
        }

        let components = s
            .split('.')
            .map(|part| {
                part.parse::<u32>()
                    .map_err(|_| VersionParseError::InvalidComponent {
                        value: part.to_string(),
                    })
            })
            .collect::<Result<Vec<u32>, _>>()?;

        Ok(ToolVersion::new(components))
    }
}

/// Per-backend persisted state. Created with defaults the first time a
/// backend is looked at, overwritten on install/set/flag changes, never
/// deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendState {
    #[serde(default)]
    pub installed: bool,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub flags: Vec<String>,
}

/// Outcome of one discovery pass. `resolved_path` is the executable the next
/// invocation should use; the three version fields are informational so a
/// caller can distinguish "not found anywhere" from "found but unversioned".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryResult {
    pub resolved_path: Option<PathBuf>,
    pub saved_version: Option<String>,
    pub best_installed_version: Option<String>,
    pub path_version: Option<String>,
}

impl DiscoveryResult {
    #[must_use]
    pub fn found(&self) -> bool {
        self.resolved_path.is_some()
    }

    /// The version of whichever managed copy discovery would use, if any.
    #[must_use]
    pub fn managed_version(&self) -> Option<&str> {
        self.saved_version
            .as_deref()
            .or(self.best_installed_version.as_deref())
    }
}

/// How subprocess output reaches the line sink. Callers running under a log
/// redirection context pick `Buffered` so interleaved writes cannot corrupt
/// the structured sink; interactive callers pick `Lines`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamingMode {
    Lines,
    Buffered,
}
