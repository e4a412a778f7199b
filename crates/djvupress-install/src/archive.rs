use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;

use djvupress_backend::BackendError;
use djvupress_platform::ConsoleHidden;

/// Outcome of one archive fetch attempt. `Rejected` is recoverable, the
/// installer retries it against the fallback version; hard transport and IO
/// failures come back as errors.
pub(crate) enum Fetched {
    Accepted(PathBuf),
    Rejected,
}

/// The upstream release contract: a real archive comes back as a non-empty
/// binary attachment whose filename matches the one requested. Anything else
/// (an HTML error page, an empty body) is rejected before a byte is kept.
pub(crate) fn archive_response_verified(
    headers: &reqwest::header::HeaderMap,
    file_name: &str,
) -> bool {
    use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};

    let length_ok = headers
        .get(CONTENT_LENGTH)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<u64>().ok())
        .is_some_and(|length| length > 0);

    let type_ok = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.split('/').next() == Some("application"));

    let disposition_ok = headers
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| {
            let mut parts = value.split(';').map(str::trim);
            parts.next() == Some("attachment")
                && parts.any(|part| part == format!("filename={file_name}"))
        });

    length_ok && type_ok && disposition_ok
}

/// Download one release archive into `dest_dir`, verifying the response
/// headers before accepting it. Cancellation aborts the transfer and removes
/// the partial file.
pub(crate) async fn download_archive(
    client: &reqwest::Client,
    url: &str,
    dest_dir: &Path,
    cancel: &CancellationToken,
) -> Result<Fetched, BackendError> {
    let file_name = url.rsplit('/').next().unwrap_or("archive");

    info!("downloading {url}");
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|error| BackendError::network("archive download request failed", error))?;

    if !response.status().is_success() {
        warn!("download of {file_name} answered HTTP {}", response.status());
        return Ok(Fetched::Rejected);
    }
    if !archive_response_verified(response.headers(), file_name) {
        warn!("download of {file_name} is not a well-formed archive attachment");
        return Ok(Fetched::Rejected);
    }

    std::fs::create_dir_all(dest_dir)
        .map_err(|error| BackendError::io("failed to create managed backend directory", error))?;
    let path = dest_dir.join(file_name);
    let mut file = tokio::fs::File::create(&path)
        .await
        .map_err(|error| BackendError::io("failed to create archive file", error))?;

    let mut stream = response.bytes_stream();
    loop {
        tokio::select! {
            chunk = stream.next() => match chunk {
                Some(Ok(chunk)) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|error| BackendError::io("failed to write archive data", error))?;
                }
                Some(Err(error)) => {
                    drop(file);
                    let _ = tokio::fs::remove_file(&path).await;
                    return Err(BackendError::network("archive download stream failed", error));
                }
                None => break,
            },
            () = cancel.cancelled() => {
                drop(file);
                let _ = tokio::fs::remove_file(&path).await;
                return Err(BackendError::Cancelled);
            }
        }
    }

    file.flush()
        .await
        .map_err(|error| BackendError::io("failed to flush archive file", error))?;
    debug!("downloaded {}", path.display());
    Ok(Fetched::Accepted(path))
}

/// Unpack `archive` into `dest_dir`. Zip archives (the Windows release
/// format) are expanded in-process; `.tar.xz` archives are handed to the
/// system `tar`, which is how the original release archives are meant to be
/// unpacked on Unix.
pub(crate) async fn extract_archive(archive: &Path, dest_dir: &Path) -> Result<(), BackendError> {
    let is_zip = archive
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    if is_zip {
        extract_zip(archive, dest_dir)
    } else {
        extract_tar(archive, dest_dir).await
    }
}

fn extract_zip(archive: &Path, dest_dir: &Path) -> Result<(), BackendError> {
    let extraction_failed = |details: String| BackendError::ExtractionFailed {
        archive: archive.to_path_buf(),
        details,
    };

    let file = std::fs::File::open(archive).map_err(|error| extraction_failed(error.to_string()))?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|error| extraction_failed(error.to_string()))?;

    for index in 0..zip.len() {
        let mut entry = zip
            .by_index(index)
            .map_err(|error| extraction_failed(error.to_string()))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("skipping archive entry with unsafe path");
            continue;
        };
        let out_path = dest_dir.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|error| extraction_failed(error.to_string()))?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|error| extraction_failed(error.to_string()))?;
            }
            let mut out_file = std::fs::File::create(&out_path)
                .map_err(|error| extraction_failed(error.to_string()))?;
            std::io::copy(&mut entry, &mut out_file)
                .map_err(|error| extraction_failed(error.to_string()))?;

            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                if let Some(mode) = entry.unix_mode() {
                    let _ =
                        std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
                }
            }
        }
    }

    debug!("extracted {} to {}", archive.display(), dest_dir.display());
    Ok(())
}

async fn extract_tar(archive: &Path, dest_dir: &Path) -> Result<(), BackendError> {
    let output = tokio::process::Command::new("tar")
        .arg("xf")
        .arg(archive)
        .arg("-C")
        .arg(dest_dir)
        .hide_console()
        .output()
        .await
        .map_err(|error| BackendError::io("failed to run tar", error))?;

    if output.status.success() {
        debug!("extracted {} to {}", archive.display(), dest_dir.display());
        Ok(())
    } else {
        Err(BackendError::ExtractionFailed {
            archive: archive.to_path_buf(),
            details: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
