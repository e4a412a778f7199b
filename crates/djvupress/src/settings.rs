use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use djvupress_backend::BackendState;

fn default_backend_name() -> String {
    "djvudigital".to_string()
}

/// Persisted preferences. The file is the unit of consistency: every
/// mutation becomes visible to other readers only through [`commit`],
/// which writes the whole object at once.
///
/// [`commit`]: Preferences::commit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(skip)]
    path: PathBuf,

    /// Name of the backend `convert` uses.
    #[serde(default = "default_backend_name")]
    pub backend: String,

    #[serde(default)]
    pub library_dir: Option<PathBuf>,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default)]
    pub backends: BTreeMap<String, BackendState>,
}

impl Preferences {
    /// Load preferences from `path`, tolerating a missing or corrupt file.
    pub fn load(path: PathBuf) -> Self {
        let mut prefs: Self = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_else(|| Self {
                path: PathBuf::new(),
                backend: default_backend_name(),
                library_dir: None,
                debug_logging: false,
                backends: BTreeMap::new(),
            });
        prefs.path = path;
        prefs
    }

    /// Write the whole preferences object to disk. This is the only
    /// mutation point other readers can observe, so a half-applied change
    /// is never visible.
    ///
    /// # Errors
    /// Returns an error when the file or its parent directory cannot be
    /// written.
    pub fn commit(&self) -> Result<(), std::io::Error> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Mutable state for one backend, created with durable defaults when the
    /// key is absent.
    pub fn backend_state_mut(&mut self, name: &str) -> &mut BackendState {
        self.backends.entry(name.to_string()).or_default()
    }
}
