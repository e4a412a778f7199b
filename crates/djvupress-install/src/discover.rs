use std::path::{Path, PathBuf};

use log::{debug, warn};
use tokio::process::Command;

use djvupress_backend::{Backend, BackendState, DiscoveryResult, ToolVersion};
use djvupress_platform::ConsoleHidden;

fn executable_name(backend_name: &str) -> String {
    if cfg!(windows) {
        format!("{backend_name}.exe")
    } else {
        backend_name.to_string()
    }
}

/// Conventional location of a managed install:
/// `{scan_dir}/{name}-{version}/{name}`.
#[must_use]
pub fn versioned_tool_path(scan_dir: &Path, backend_name: &str, version: &str) -> PathBuf {
    scan_dir
        .join(format!("{backend_name}-{version}"))
        .join(executable_name(backend_name))
}

/// Extract the version from typical `--version` output: the second
/// whitespace-delimited token of the first line
/// (`pdf2djvu 0.9.19 (DjVuLibre ...)` → `0.9.19`).
#[must_use]
pub fn version_from_output(output: &str) -> Option<String> {
    output
        .lines()
        .next()?
        .split_whitespace()
        .nth(1)
        .map(str::to_string)
}

/// Run `executable --version` and parse the reported version. Any failure
/// (missing binary, nonzero exit, unparseable banner) yields `None`; it
/// fails only this candidate, never the overall scan.
pub async fn query_tool_version(executable: &Path) -> Option<String> {
    let output = Command::new(executable)
        .arg("--version")
        .hide_console()
        .output()
        .await
        .ok()?;

    if !output.status.success() {
        return None;
    }

    // Several converters print their banner on stderr.
    let banner = if output.stdout.is_empty() {
        output.stderr
    } else {
        output.stdout
    };
    version_from_output(&String::from_utf8_lossy(&banner))
}

fn best_installed_version(scan_dir: &Path, backend_name: &str) -> Option<String> {
    let entries = std::fs::read_dir(scan_dir).ok()?;
    let prefix = format!("{backend_name}-");

    let mut best: Option<ToolVersion> = None;
    for entry in entries.flatten() {
        if !entry.path().is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let Some(version_str) = name.strip_prefix(&prefix) else {
            continue;
        };
        let Ok(version) = version_str.parse::<ToolVersion>() else {
            debug!("{backend_name}: ignoring unparseable version directory {name}");
            continue;
        };
        if best.as_ref().is_none_or(|current| version > *current) {
            best = Some(version);
        }
    }
    best.map(|version| version.to_string())
}

/// Locate an installed, version-tagged binary for `backend`.
///
/// Strict precedence, short-circuiting on the first match while still
/// populating the informational fields:
/// 1. the saved pinned version under `scan_dir`, revalidated by running it;
/// 2. the greatest version-tagged subdirectory of `scan_dir`;
/// 3. a `--version`-answering binary on the search path.
///
/// Side effect: a saved version that no longer executes is cleared from
/// `state` (the caller owns committing the corrected settings object).
pub async fn discover(
    backend: &Backend,
    state: &mut BackendState,
    scan_dir: &Path,
) -> DiscoveryResult {
    let mut result = DiscoveryResult::default();

    if let Some(saved) = state.version.clone() {
        let pinned = versioned_tool_path(scan_dir, backend.name, &saved);
        match query_tool_version(&pinned).await {
            Some(version) => {
                result.saved_version = Some(version);
                result.resolved_path = Some(pinned);
            }
            None => {
                warn!(
                    "{}: saved version {saved} no longer executes, clearing it",
                    backend.name
                );
                state.version = None;
            }
        }
    }

    result.best_installed_version = best_installed_version(scan_dir, backend.name);
    if result.resolved_path.is_none()
        && let Some(best) = &result.best_installed_version
    {
        result.resolved_path = Some(versioned_tool_path(scan_dir, backend.name, best));
    }

    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    if let Ok(on_path) = which::which_in(
        executable_name(backend.name),
        Some(djvupress_platform::tool_search_path()),
        cwd,
    ) && let Some(version) = query_tool_version(&on_path).await
    {
        result.path_version = Some(version);
        if result.resolved_path.is_none() {
            result.resolved_path = Some(on_path);
        }
    }

    debug!(
        "{}: discovery: resolved={:?} saved={:?} best={:?} path={:?}",
        backend.name,
        result.resolved_path,
        result.saved_version,
        result.best_installed_version,
        result.path_version
    );
    result
}

#[cfg(test)]
mod tests {
    use super::version_from_output;

    #[test]
    fn version_from_output_takes_second_token_of_first_line() {
        assert_eq!(
            version_from_output("pdf2djvu 0.9.19 (DjVuLibre 3.5.28)\nCopyright ...").as_deref(),
            Some("0.9.19")
        );
        assert_eq!(
            version_from_output("djvudigital 3.5.28").as_deref(),
            Some("3.5.28")
        );
    }

    #[test]
    fn version_from_output_fails_on_single_token_or_empty_output() {
        assert_eq!(version_from_output("pdf2djvu"), None);
        assert_eq!(version_from_output(""), None);
    }
}
