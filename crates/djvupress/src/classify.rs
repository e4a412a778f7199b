use std::path::Path;

use log::{debug, warn};
use tokio::process::Command;

use djvupress_backend::BackendError;
use djvupress_platform::{ConsoleHidden, tool_env, tool_search_path};

/// Pages sampled for the raster test; parsing giant PDFs wholesale wastes
/// time, and scanner frontends add pure-text preambles, so page 1 is skipped.
const SAMPLE_FIRST_PAGE: &str = "2";
const SAMPLE_LAST_PAGE: &str = "30";

/// How far the last image ordinal may drift from its page ordinal while the
/// document still counts as one-scan-per-page.
const ORDINAL_SLACK: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RasterVerdict {
    pub is_raster: bool,
    pub pages: u32,
    pub images: u32,
}

/// Decide whether `path` is a raster document (a scan) rather than a
/// digitally authored text+graphics document: a scan carries roughly one
/// image object per page.
///
/// # Errors
/// [`BackendError::NotInstalled`] when poppler's `pdfimages` is missing;
/// [`BackendError::ExecutionFailed`] when it rejects the document.
pub async fn is_raster_document(path: &Path) -> Result<RasterVerdict, BackendError> {
    let mut command = Command::new("pdfimages");
    command
        .args(["-f", SAMPLE_FIRST_PAGE, "-l", SAMPLE_LAST_PAGE, "-q", "-list"])
        .arg(path);
    for (key, value) in tool_env() {
        command.env(key, value);
    }
    command.hide_console();

    let output = match command.output().await {
        Ok(output) => output,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
            warn!("pdfimages not found; install poppler-utils");
            return Err(BackendError::NotInstalled {
                command: format!("pdfimages -list {}", path.display()),
                search_path: tool_search_path().to_string_lossy().into_owned(),
            });
        }
        Err(error) => return Err(BackendError::io("failed to run pdfimages", error)),
    };

    if !output.status.success() {
        return Err(BackendError::ExecutionFailed {
            code: output.status.code(),
            output: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }

    let verdict = parse_pdfimages_listing(&String::from_utf8_lossy(&output.stdout));
    debug!(
        "{}: raster={} pages={} images={}",
        path.display(),
        verdict.is_raster,
        verdict.pages,
        verdict.images
    );
    Ok(verdict)
}

/// Parse `pdfimages -list` output: two header lines, then one row per image
/// object whose first three columns are `page num type`. Only real `image`
/// rows count; masks and other entities are ignored.
fn parse_pdfimages_listing(listing: &str) -> RasterVerdict {
    let mut pages = 0u32;
    let mut images = 0u32;
    let mut last_page = 0u32;
    let mut last_num = 0u32;

    for line in listing.lines().skip(2) {
        let mut fields = line.split_whitespace();
        let (Some(page), Some(num), Some(kind)) = (fields.next(), fields.next(), fields.next())
        else {
            continue;
        };
        if kind != "image" {
            continue;
        }
        let (Ok(page), Ok(num)) = (page.parse::<u32>(), num.parse::<u32>()) else {
            continue;
        };

        images += 1;
        pages = pages.max(page);
        last_page = page;
        last_num = num;
    }

    let is_raster = images > 0 && last_page.abs_diff(last_num) < ORDINAL_SLACK;
    RasterVerdict {
        is_raster,
        pages,
        images,
    }
}
