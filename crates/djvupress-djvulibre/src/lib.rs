//! The `djvudigital` backend: DjVuLibre's Ghostscript-based converter. Only
//! supports PostScript-family inputs, tricky to get compiled with DjVu
//! support, but the fastest converter available.

use std::ffi::OsString;
use std::path::Path;

use djvupress_backend::{Backend, ProgressUpdate};

/// `djvudigital [flags] <source> <output>`
fn build_command(
    executable: &Path,
    source: &Path,
    flags: &[String],
    output: &Path,
) -> Vec<OsString> {
    let mut argv = vec![executable.as_os_str().to_os_string()];
    argv.extend(flags.iter().map(OsString::from));
    argv.push(source.as_os_str().to_os_string());
    argv.push(output.as_os_str().to_os_string());
    argv
}

/// Ghostscript reports `Page N` as it rasterizes each page.
#[allow(clippy::cast_precision_loss)]
fn parse_progress(line: &str, total_pages: u32) -> Option<ProgressUpdate> {
    let rest = line.strip_prefix("Page ")?;
    let page: u32 = rest.split_whitespace().next()?.parse().ok()?;

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

#[must_use]
pub fn backend() -> Backend {
    Backend {
        name: "djvudigital",
        display_name: "djvudigital (DjVuLibre)",
        supported_extensions: &["pdf", "ps", "eps"],
        output_extension: "djvu",
        command_builder: build_command,
        progress_parser: Some(parse_progress),
        release_source: None,
        install_hint: "install DjVuLibre with a DjVu-enabled Ghostscript \
                       (macOS: `brew install --with-djvu ghostscript`, \
                       Gentoo: `emerge ghostscript-gpl` with the djvu USE flag)",
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::OsString;
    use std::path::Path;

    use super::{backend, build_command, parse_progress};

    #[test]
    fn command_places_flags_before_positional_args() {
        let argv = build_command(
            Path::new("/usr/local/bin/djvudigital"),
            Path::new("scan.pdf"),
            &["--words".to_string(), "--dpi=300".to_string()],
            Path::new("/tmp/scan.djvu"),
        );

        assert_eq!(
            argv,
            vec![
                OsString::from("/usr/local/bin/djvudigital"),
                OsString::from("--words"),
                OsString::from("--dpi=300"),
                OsString::from("scan.pdf"),
                OsString::from("/tmp/scan.djvu"),
            ]
        );
    }

    #[test]
    fn parser_reads_ghostscript_page_markers() {
        let update =
            parse_progress("Page 3", 10).expect("page marker should yield an update");

        let fraction = update.fraction.expect("page count known, fraction expected");
        assert!((fraction - 0.3).abs() < f32::EPSILON);
        assert_eq!(update.message.as_deref(), Some("page 3 of 10"));
    }

    #[test]
    fn parser_without_page_count_yields_message_only() {
        let update =
            parse_progress("Page 3", 0).expect("page marker should yield an update");

        assert_eq!(update.fraction, None);
        assert_eq!(update.message.as_deref(), Some("page 3"));
    }

    #[test]
    fn parser_ignores_non_page_lines() {
        assert!(parse_progress("GPL Ghostscript 10.0.0 (2022-09-21)", 10).is_none());
        assert!(parse_progress("Page not-a-number", 10).is_none());
        assert!(parse_progress("", 10).is_none());
    }

    #[test]
    fn backend_supports_postscript_family_only() {
        let backend = backend();

        assert!(backend.supports_extension("pdf"));
        assert!(backend.supports_extension("ps"));
        assert!(backend.supports_extension("eps"));
        assert!(!backend.supports_extension("djvu"));
        assert!(backend.release_source.is_none());
    }
}
