//! The `pdf2djvu` backend. PDF input only, but self-contained binaries are
//! published per release, so this is the one backend with a managed release
//! source.

use std::ffi::OsString;
use std::path::Path;

use djvupress_backend::{Backend, ProgressUpdate, ReleaseSource};

const RELEASES: &str = "https://github.com/jwilk/pdf2djvu/releases";

/// `pdf2djvu [flags] --verbose -o <output> <source>`; `--verbose` makes the
/// converter report per-page markers the progress parser feeds on.
fn build_command(
    executable: &Path,
    source: &Path,
    flags: &[String],
    output: &Path,
) -> Vec<OsString> {
    let mut argv = vec![executable.as_os_str().to_os_string()];
    argv.extend(flags.iter().map(OsString::from));
    argv.push(OsString::from("--verbose"));
    argv.push(OsString::from("-o"));
    argv.push(output.as_os_str().to_os_string());
    argv.push(source.as_os_str().to_os_string());
    argv
}

/// Verbose pdf2djvu prints `page #N -> #M` per converted page.
#[allow(clippy::cast_precision_loss)]
fn parse_progress(line: &str, total_pages: u32) -> Option<ProgressUpdate> {
    let rest = line.trim_start().strip_prefix("page #")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    let page: u32 = digits.parse().ok()?;

    if total_pages == 0 {
        return Some(ProgressUpdate {
            fraction: None,
            message: Some(format!("page {page}")),
        });
    }
    Some(ProgressUpdate {
        fraction: Some(page as f32 / total_pages as f32),
        message: Some(format!("page {page} of {total_pages}")),
    })
}

fn archive_url(version: &str) -> String {
    if cfg!(windows) {
        format!("{RELEASES}/download/{version}/pdf2djvu-win32-{version}.zip")
    } else {
        format!("{RELEASES}/download/{version}/pdf2djvu-{version}.tar.xz")
    }
}

#[must_use]
pub fn backend() -> Backend {
    Backend {
        name: "pdf2djvu",
        display_name: "pdf2djvu",
        supported_extensions: &["pdf"],
        output_extension: "djvu",
        command_builder: build_command,
        progress_parser: Some(parse_progress),
        release_source: Some(ReleaseSource {
            latest_url: "https://github.com/jwilk/pdf2djvu/releases/latest",
            archive_url,
            fallback_version: "0.9.5",
        }),
        install_hint: "download a release archive from \
                       https://github.com/jwilk/pdf2djvu/releases and unpack \
                       it into the managed backend directory",
    }
}
