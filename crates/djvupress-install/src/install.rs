use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use log::info;
use tokio_util::sync::CancellationToken;

use djvupress_backend::{Backend, BackendError, BackendState, ReleaseSource, ToolVersion};

use crate::archive::{Fetched, download_archive, extract_archive};
use crate::discover::{discover, query_tool_version, versioned_tool_path};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub installed: bool,
    pub version: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum CompareDecision {
    Download,
    AlreadyCurrent { offer_redownload: bool },
}

fn compare_with_remote(
    local: Option<&str>,
    has_managed_copy: bool,
    remote: &str,
) -> Result<CompareDecision, BackendError> {
    let Some(local) = local else {
        return Ok(CompareDecision::Download);
    };

    let local_version: ToolVersion = local
        .parse()
        .map_err(|_| BackendError::inconsistency(format!("unparseable local version {local}")))?;
    let remote_version: ToolVersion = remote.parse().map_err(|_| {
        BackendError::inconsistency(format!("unparseable upstream version {remote}"))
    })?;

    match remote_version.cmp(&local_version) {
        Ordering::Greater => Ok(CompareDecision::Download),
        Ordering::Equal => Ok(CompareDecision::AlreadyCurrent {
            offer_redownload: !has_managed_copy,
        }),
        Ordering::Less => Err(BackendError::inconsistency(format!(
            "local version {local} is newer than the latest upstream release {remote}; refusing to downgrade"
        ))),
    }
}

/// Resolve the latest published version from the redirect-based "latest"
/// release URL: the final path segment of the resolved URL is the tag.
async fn query_latest_version(
    client: &reqwest::Client,
    source: &ReleaseSource,
) -> Result<String, BackendError> {
    let response = client
        .get(source.latest_url)
        .send()
        .await
        .map_err(|error| BackendError::network("failed to query latest release", error))?;

    if !response.status().is_success() {
        return Err(BackendError::network(
            "latest release query failed",
            format!("HTTP {}", response.status()),
        ));
    }

    let resolved = response.url().clone();
    let tag = resolved
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| {
            BackendError::network("latest release URL has no version segment", resolved.as_str())
        })?;
    Ok(tag.trim_start_matches('v').to_string())
}

/// Fetch the archive for `version`, falling back once to the release
/// source's known-good version when verification rejects the download.
/// Returns the archive path and the version it actually holds.
async fn fetch_verified_archive(
    client: &reqwest::Client,
    source: &ReleaseSource,
    version: &str,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<(PathBuf, String), BackendError> {
    match download_archive(client, &(source.archive_url)(version), dest_dir, cancel).await? {
        Fetched::Accepted(path) => Ok((path, version.to_string())),
        Fetched::Rejected => {
            if version == source.fallback_version {
                return Err(BackendError::DownloadVerificationFailed {
                    requested: version.to_string(),
                    fallback: None,
                });
            }
            info!(
                "retrying with known-good fallback version {}",
                source.fallback_version
            );
            match download_archive(
                client,
                &(source.archive_url)(source.fallback_version),
                dest_dir,
                cancel,
            )
            .await?
            {
                Fetched::Accepted(path) => Ok((path, source.fallback_version.to_string())),
                Fetched::Rejected => Err(BackendError::DownloadVerificationFailed {
                    requested: version.to_string(),
                    fallback: Some(source.fallback_version.to_string()),
                }),
            }
        }
    }
}

/// Run `--version` against the freshly extracted binary; a corrupt or
/// mismatched archive fails here instead of at the next conversion.
async fn revalidate(
    backend_name: &str,
    scan_dir: &Path,
    version: &str,
) -> Result<(), BackendError> {
    let executable = versioned_tool_path(scan_dir, backend_name, version);
    match query_tool_version(&executable).await {
        Some(reported) if reported == version => Ok(()),
        Some(reported) => Err(BackendError::VersionMismatch {
            requested: version.to_string(),
            reported,
        }),
        None => Err(BackendError::VersionMismatch {
            requested: version.to_string(),
            reported: "none (binary did not execute)".to_string(),
        }),
    }
}

async fn download_and_install(
    client: &reqwest::Client,
    backend_name: &str,
    source: &ReleaseSource,
    version: &str,
    scan_dir: &Path,
    cancel: &CancellationToken,
) -> Result<String, BackendError> {
    let (archive, effective_version) =
        fetch_verified_archive(client, source, version, scan_dir, cancel).await?;

    extract_archive(&archive, scan_dir).await?;
    tokio::fs::remove_file(&archive)
        .await
        .map_err(|error| BackendError::io("failed to remove downloaded archive", error))?;

    revalidate(backend_name, scan_dir, &effective_version).await?;
    info!("extraction verified for {backend_name} {effective_version}");
    Ok(effective_version)
}

/// Install (or update) a backend's managed copy under `scan_dir`.
///
/// `CheckLocal → QueryRemoteLatest → Compare → {Skip | Confirm+Download →
/// Verify → Extract → Revalidate}`, blocking and not reentrant-safe for a
/// single backend+directory pair; `confirm` is the caller's yes/no prompt.
/// Mutations of `state` (adopted on-disk version, successful install) are the
/// caller's to persist with one settings commit.
///
/// # Errors
/// See [`BackendError`]: notably `InstallUnsupported`,
/// `DownloadVerificationFailed`, `ExtractionFailed`, `VersionMismatch`, and
/// `ConfigurationInconsistency` when the local copy is newer than upstream.
pub async fn install_backend(
    client: &reqwest::Client,
    backend: &Backend,
    state: &mut BackendState,
    scan_dir: &Path,
    confirm: &mut dyn FnMut(&str) -> bool,
    cancel: &CancellationToken,
) -> Result<InstallOutcome, BackendError> {
    let Some(source) = backend.release_source else {
        return Err(BackendError::InstallUnsupported {
            backend: backend.name.to_string(),
            hint: backend.install_hint.to_string(),
        });
    };

    let found = discover(backend, state, scan_dir).await;

    let has_managed_copy =
        found.saved_version.is_some() || found.best_installed_version.is_some();
    let local_version: Option<String> = if has_managed_copy {
        // Prefer the best on-disk copy when it is newer than the pinned one,
        // and pin it.
        let effective = match (&found.saved_version, &found.best_installed_version) {
            (Some(saved), Some(best)) => {
                let best_is_newer = matches!(
                    (saved.parse::<ToolVersion>(), best.parse::<ToolVersion>()),
                    (Ok(saved_version), Ok(best_version)) if best_version > saved_version
                );
                if best_is_newer { best.clone() } else { saved.clone() }
            }
            (Some(saved), None) => saved.clone(),
            (None, Some(best)) => best.clone(),
            (None, None) => unreachable!("has_managed_copy checked above"),
        };
        if found.saved_version.as_ref() != Some(&effective) {
            state.version = Some(effective.clone());
        }
        info!(
            "version {effective} of {} was found in the managed directory",
            backend.name
        );
        Some(effective)
    } else {
        info!("{} was not found in the managed directory", backend.name);
        if let Some(path_version) = &found.path_version {
            info!(
                "version {path_version} of {} was found on the search path",
                backend.name
            );
        } else {
            info!("{} was not found on the search path", backend.name);
        }
        found.path_version.clone()
    };

    info!("checking upstream for the current {} release...", backend.name);
    let remote_version = query_latest_version(client, &source).await?;
    info!(
        "version {remote_version} of {} is available upstream",
        backend.name
    );

    match compare_with_remote(local_version.as_deref(), has_managed_copy, &remote_version)? {
        CompareDecision::Download => {
            let question = if local_version.is_some() {
                format!(
                    "Download newer version {remote_version} of {}?",
                    backend.name
                )
            } else {
                format!(
                    "Download current version {remote_version} of {}?",
                    backend.name
                )
            };
            if !confirm(&question) {
                return Ok(InstallOutcome {
                    installed: false,
                    version: None,
                });
            }

            let installed_version = download_and_install(
                client,
                backend.name,
                &source,
                &remote_version,
                scan_dir,
                cancel,
            )
            .await?;
            state.installed = true;
            state.version = Some(installed_version.clone());
            Ok(InstallOutcome {
                installed: true,
                version: Some(installed_version),
            })
        }
        CompareDecision::AlreadyCurrent { offer_redownload } => {
            info!("local copy of {} is already current", backend.name);
            if offer_redownload {
                let question = format!(
                    "Redownload current version {remote_version} of {} into the managed directory? (not strictly necessary)",
                    backend.name
                );
                if !confirm(&question) {
                    return Ok(InstallOutcome {
                        installed: false,
                        version: None,
                    });
                }
                let installed_version = download_and_install(
                    client,
                    backend.name,
                    &source,
                    &remote_version,
                    scan_dir,
                    cancel,
                )
                .await?;
                state.installed = true;
                state.version = Some(installed_version.clone());
                return Ok(InstallOutcome {
                    installed: true,
                    version: Some(installed_version),
                });
            }

            state.installed = true;
            Ok(InstallOutcome {
                installed: true,
                version: local_version,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use djvupress_backend::BackendError;

    use super::{CompareDecision, compare_with_remote};

    #[test]
    fn missing_local_copy_downloads() {
        let decision = compare_with_remote(None, false, "0.9.5")
            .expect("comparison against no local copy should succeed");

        assert_eq!(decision, CompareDecision::Download);
    }

    #[test]
    fn older_local_copy_downloads() {
        let decision = compare_with_remote(Some("0.9.4"), true, "0.9.5")
            .expect("comparison should succeed");

        assert_eq!(decision, CompareDecision::Download);
    }

    #[test]
    fn equal_versions_report_already_current() {
        let managed = compare_with_remote(Some("0.9.5"), true, "0.9.5")
            .expect("comparison should succeed");
        assert_eq!(
            managed,
            CompareDecision::AlreadyCurrent {
                offer_redownload: false
            }
        );

        let path_only = compare_with_remote(Some("0.9.5"), false, "0.9.5")
            .expect("comparison should succeed");
        assert_eq!(
            path_only,
            CompareDecision::AlreadyCurrent {
                offer_redownload: true
            }
        );
    }

    #[test]
    fn newer_local_copy_is_a_configuration_inconsistency() {
        let error = compare_with_remote(Some("1.0.0"), true, "0.9.5")
            .expect_err("downgrade should be refused");

        assert!(matches!(
            error,
            BackendError::ConfigurationInconsistency { ref details }
                if details.contains("1.0.0") && details.contains("0.9.5")
        ));
    }

    #[test]
    fn comparison_is_numeric_per_component() {
        let decision = compare_with_remote(Some("0.9.9"), true, "0.10.0")
            .expect("comparison should succeed");

        assert_eq!(decision, CompareDecision::Download);
    }
}

#[cfg(all(test, unix))]
mod revalidate_tests {
    use std::path::Path;

    use djvupress_backend::BackendError;

    use super::revalidate;
    use crate::discover::versioned_tool_path;

    fn write_fake_tool(scan_dir: &Path, name: &str, dir_version: &str, reported_version: &str) {
        use std::os::unix::fs::PermissionsExt;

        let path = versioned_tool_path(scan_dir, name, dir_version);
        std::fs::create_dir_all(path.parent().expect("tool path should have a parent"))
            .expect("version directory should be created");
        std::fs::write(
            &path,
            format!("#!/bin/sh\necho '{name} {reported_version}'\n"),
        )
        .expect("fake tool should be written");
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))
            .expect("fake tool should be executable");
    }

    #[tokio::test]
    async fn matching_version_revalidates() {
        let scan = tempfile::tempdir().expect("scan dir should be created");
        write_fake_tool(scan.path(), "alpha", "0.9.5", "0.9.5");

        revalidate("alpha", scan.path(), "0.9.5")
            .await
            .expect("matching version should revalidate");
    }

    #[tokio::test]
    async fn mismatched_version_is_rejected() {
        let scan = tempfile::tempdir().expect("scan dir should be created");
        write_fake_tool(scan.path(), "alpha", "0.9.5", "0.9.4");

        let error = revalidate("alpha", scan.path(), "0.9.5")
            .await
            .expect_err("mismatched version should fail revalidation");

        assert!(matches!(
            error,
            BackendError::VersionMismatch { ref requested, ref reported }
                if requested == "0.9.5" && reported == "0.9.4"
        ));
    }

    #[tokio::test]
    async fn missing_binary_is_rejected() {
        let scan = tempfile::tempdir().expect("scan dir should be created");

        let error = revalidate("alpha", scan.path(), "0.9.5")
            .await
            .expect_err("missing binary should fail revalidation");

        assert!(matches!(error, BackendError::VersionMismatch { .. }));
    }
}
