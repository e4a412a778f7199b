use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use log::info;
use tokio_util::sync::CancellationToken;

use djvupress_backend::{Backend, BackendError, EventSink, ProgressScale, StreamingMode};
use djvupress_platform::tool_env;

use crate::command::ToolCommand;
use crate::runner::run_tool;

pub struct InvokeOptions<'a> {
    /// User-configured flags, inserted between the executable and the
    /// backend's positional arguments.
    pub flags: &'a [String],
    /// Page count reported by the raster classifier; 0 when unknown, in
    /// which case only startup and completion fractions are emitted.
    pub page_count: u32,
    pub mode: StreamingMode,
    pub sink: EventSink,
    pub cancel: CancellationToken,
}

/// Convert `source` with `backend`, resolved to `executable`.
///
/// The output is written to a uniquely named scratch file derived from the
/// source document's base name. On success the scratch file's ownership
/// transfers to the caller via the returned path; on every other exit path
/// (failure, cancellation) the file is removed before returning.
///
/// # Errors
/// [`BackendError::UnsupportedFiletype`] when the source extension is not in
/// the backend's supported set; otherwise whatever [`run_tool`] classified.
pub async fn invoke_backend(
    backend: &Backend,
    executable: &Path,
    source: &Path,
    scratch_dir: &Path,
    options: InvokeOptions<'_>,
) -> Result<PathBuf, BackendError> {
    let extension = source
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or_default()
        .to_ascii_lowercase();
    if !backend.supports_extension(&extension) {
        return Err(BackendError::UnsupportedFiletype {
            backend: backend.name.to_string(),
            extension,
            allowed: backend
                .supported_extensions
                .iter()
                .map(ToString::to_string)
                .collect(),
        });
    }

    std::fs::create_dir_all(scratch_dir)
        .map_err(|error| BackendError::io("failed to create scratch directory", error))?;

    let stem = source
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("document");
    // Held as a TempPath: dropped on any failure path, kept only on success.
    let output = tempfile::Builder::new()
        .prefix(&format!("{stem}-"))
        .suffix(&format!(".{}", backend.output_extension))
        .tempfile_in(scratch_dir)
        .map_err(|error| BackendError::io("failed to create scratch output file", error))?
        .into_temp_path();

    let argv = backend.build_command(executable, source, options.flags, &output);
    let command = ToolCommand::from_argv(argv)
        .ok_or_else(|| BackendError::io(
            "backend produced an empty command",
            std::io::Error::other(backend.name),
        ))?
        .with_envs(tool_env());

    info!("{}: subprocess: {}", backend.name, command.rendered());

    let mut scale = ProgressScale::new();
    let sink = options.sink;
    sink.progress(
        scale.started(),
        Some(format!("starting {}", backend.display_name)),
    );

    let parser = backend.progress_parser;
    let page_count = options.page_count;
    let result = run_tool(&command, options.mode, &options.cancel, |line| {
        sink.output(line);
        if let Some(parser) = parser
            && let Some(update) = parser(line, page_count)
            && let Some(inner) = update.fraction
        {
            sink.progress(scale.conversion(inner), update.message);
        }
    })
    .await;

    match result {
        Ok(()) => {
            sink.progress(scale.finished(), None);
            let kept = output
                .keep()
                .map_err(|error| BackendError::io("failed to retain output file", error.error))?;
            Ok(kept)
        }
        Err(error) => Err(error),
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::ffi::OsString;
    use std::path::Path;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use djvupress_backend::{
        Backend, BackendError, ConvertEvent, EventSink, ProgressUpdate, StreamingMode,
    };

    use super::{InvokeOptions, invoke_backend};

    #[allow(clippy::cast_precision_loss)]
    fn page_parser(line: &str, total_pages: u32) -> Option<ProgressUpdate> {
        let page: u32 = line.strip_prefix("Page ")?.trim().parse().ok()?;
        if total_pages == 0 {
            return None;
        }
        Some(ProgressUpdate {
            fraction: Some(page as f32 / total_pages as f32),
            message: Some(format!("page {page} of {total_pages}")),
        })
    }

    /// Runs `/bin/sh -c <first flag> fake <source> <output>`, so each test
    /// supplies its converter script through the flags it passes in.
    fn script_builder(
        executable: &Path,
        source: &Path,
        flags: &[String],
        output: &Path,
    ) -> Vec<OsString> {
        let script = flags.first().cloned().unwrap_or_default();
        vec![
            executable.as_os_str().to_os_string(),
            OsString::from("-c"),
            OsString::from(script),
            OsString::from("fake"),
            source.as_os_str().to_os_string(),
            output.as_os_str().to_os_string(),
        ]
    }

    fn fake_converter() -> Backend {
        Backend {
            name: "fake",
            display_name: "fake converter",
            supported_extensions: &["pdf"],
            output_extension: "djvu",
            command_builder: script_builder,
            progress_parser: Some(page_parser),
            release_source: None,
            install_hint: "n/a",
        }
    }

    fn scratch() -> tempfile::TempDir {
        tempfile::tempdir().expect("scratch dir should be created")
    }

    fn source_in(dir: &Path, name: &str) -> std::path::PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"%PDF-1.4 stub").expect("source fixture should be written");
        path
    }

    fn script(text: &str) -> Vec<String> {
        vec![text.to_string()]
    }

    fn options<'a>(
        flags: &'a [String],
        sink: EventSink,
        cancel: CancellationToken,
    ) -> InvokeOptions<'a> {
        InvokeOptions {
            flags,
            page_count: 2,
            mode: StreamingMode::Lines,
            sink,
            cancel,
        }
    }

    #[tokio::test]
    async fn rejects_unsupported_extension_before_spawning() {
        let backend = fake_converter();
        let dir = scratch();
        let source = source_in(dir.path(), "doc.ps");
        let flags = script("exit 0");

        let error = invoke_backend(
            &backend,
            Path::new("/bin/sh"),
            &source,
            dir.path(),
            options(&flags, EventSink::stdout(), CancellationToken::new()),
        )
        .await
        .expect_err("ps input should be rejected by a pdf-only backend");

        assert!(matches!(
            error,
            BackendError::UnsupportedFiletype { ref backend, ref extension, ref allowed }
                if backend == "fake" && extension == "ps" && allowed == &["pdf".to_string()]
        ));
    }

    #[tokio::test]
    async fn success_returns_scratch_path_with_converter_output() {
        let backend = fake_converter();
        let dir = scratch();
        let source = source_in(dir.path(), "book.pdf");
        let scratch_dir = dir.path().join("work");
        let flags = script("echo 'Page 1'; echo 'Page 2'; echo converted > \"$2\"");

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let output = invoke_backend(
            &backend,
            Path::new("/bin/sh"),
            &source,
            &scratch_dir,
            options(&flags, EventSink::channel(tx), CancellationToken::new()),
        )
        .await
        .expect("fake conversion should succeed");

        let contents =
            std::fs::read_to_string(&output).expect("converter output should be readable");
        assert_eq!(contents.trim(), "converted");
        let name = output
            .file_name()
            .expect("output should have a file name")
            .to_string_lossy()
            .into_owned();
        assert!(name.starts_with("book-"), "got {name}");
        assert!(name.ends_with(".djvu"), "got {name}");

        let mut fractions = Vec::new();
        let mut lines = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                ConvertEvent::Progress { fraction, .. } => fractions.push(fraction),
                ConvertEvent::Output(line) => lines.push(line),
            }
        }
        assert!(lines.contains(&"Page 1".to_string()));
        assert!(lines.contains(&"Page 2".to_string()));
        assert!(fractions.windows(2).all(|pair| pair[0] <= pair[1]));
        assert!((fractions.last().copied().expect("progress should be emitted") - 1.0).abs()
            < f32::EPSILON);

        std::fs::remove_file(output).expect("kept output should be deletable");
    }

    #[tokio::test]
    async fn failure_removes_scratch_output() {
        let backend = fake_converter();
        let dir = scratch();
        let source = source_in(dir.path(), "book.pdf");
        let scratch_dir = dir.path().join("work");
        let flags = script("echo broken; exit 7");

        let error = invoke_backend(
            &backend,
            Path::new("/bin/sh"),
            &source,
            &scratch_dir,
            options(&flags, EventSink::stdout(), CancellationToken::new()),
        )
        .await
        .expect_err("exit 7 should fail the invocation");

        assert!(matches!(
            error,
            BackendError::ExecutionFailed { code: Some(7), .. }
        ));
        let leftovers: Vec<_> = std::fs::read_dir(&scratch_dir)
            .expect("scratch dir should exist")
            .collect();
        assert!(leftovers.is_empty(), "scratch file should be cleaned up");
    }

    #[tokio::test]
    async fn cancellation_returns_cancelled_and_leaves_no_output() {
        let backend = fake_converter();
        let dir = scratch();
        let source = source_in(dir.path(), "book.pdf");
        let scratch_dir = dir.path().join("work");

        let cancel = CancellationToken::new();
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let invocation = tokio::spawn({
            let cancel = cancel.clone();
            let scratch_dir = scratch_dir.clone();
            async move {
                let flags = script("echo started; sleep 600");
                invoke_backend(
                    &backend,
                    Path::new("/bin/sh"),
                    &source,
                    &scratch_dir,
                    InvokeOptions {
                        flags: &flags,
                        page_count: 0,
                        mode: StreamingMode::Lines,
                        sink: EventSink::channel(tx),
                        cancel,
                    },
                )
                .await
            }
        });

        // Wait for the converter to prove it is running, then abort it.
        loop {
            match rx.recv().await.expect("events should arrive before cancel") {
                ConvertEvent::Output(line) if line == "started" => break,
                _ => {}
            }
        }
        cancel.cancel();

        let result = tokio::time::timeout(Duration::from_secs(10), invocation)
            .await
            .expect("cancelled invocation should settle quickly")
            .expect("invocation task should not panic");
        assert!(matches!(result, Err(BackendError::Cancelled)));

        let leftovers: Vec<_> = std::fs::read_dir(&scratch_dir)
            .expect("scratch dir should exist")
            .collect();
        assert!(leftovers.is_empty(), "no partial output should remain");
    }
}
