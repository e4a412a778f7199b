use std::ffi::OsString;

/// Bin directories Homebrew and MacPorts install converters into; macOS GUI
/// processes inherit a PATH that does not include them.
#[cfg(target_os = "macos")]
const EXTRA_BIN_DIRS: &[&str] = &["/opt/homebrew/bin", "/usr/local/bin"];

/// Effective search path for converter subprocesses: the ambient `PATH`,
/// prefixed with the platform package manager's bin directories where those
/// live outside the default search path.
#[must_use]
pub fn tool_search_path() -> OsString {
    let ambient = std::env::var_os("PATH").unwrap_or_default();

    #[cfg(target_os = "macos")]
    {
        let mut dirs: Vec<std::path::PathBuf> = EXTRA_BIN_DIRS
            .iter()
            .map(std::path::PathBuf::from)
            .filter(|dir| !std::env::split_paths(&ambient).any(|entry| entry == *dir))
            .collect();
        dirs.extend(std::env::split_paths(&ambient));
        std::env::join_paths(dirs).unwrap_or(ambient)
    }

    #[cfg(not(target_os = "macos"))]
    {
        ambient
    }
}

/// Environment overrides applied to every converter subprocess, on top of the
/// inherited ambient environment.
#[must_use]
pub fn tool_env() -> Vec<(OsString, OsString)> {
    vec![(OsString::from("PATH"), tool_search_path())]
}
