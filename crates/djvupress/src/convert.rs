use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use log::{info, warn};
use tokio_util::sync::CancellationToken;

use djvupress_backend::{BackendError, BackendRegistry, ConvertEvent, EventSink, StreamingMode};
use djvupress_install::discover;
use djvupress_platform::AppPaths;
use djvupress_runner::{InvokeOptions, invoke_backend};

use crate::classify::is_raster_document;
use crate::library::promote_output;
use crate::settings::Preferences;

/// Convert one document with the configured backend. Returns the promoted
/// output path, or `None` when the raster gate decided the document is
/// markup-based and not worth converting.
pub async fn convert_document(
    registry: &BackendRegistry,
    prefs: &mut Preferences,
    paths: &AppPaths,
    source: &Path,
    force: bool,
    cancel: &CancellationToken,
) -> Result<Option<PathBuf>, BackendError> {
    let backend = registry.resolve(&prefs.backend)?;

    // A vector/markup PDF gains nothing from a DJVU rendition.
    let mut page_count = 0u32;
    let is_pdf = source
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    if is_pdf {
        let verdict = is_raster_document(source).await?;
        page_count = verdict.pages;
        if !verdict.is_raster {
            if force {
                warn!(
                    "{}: not a raster document, converting anyway",
                    source.display()
                );
            } else {
                info!(
                    "{}: markup-based document, not converting to DJVU",
                    source.display()
                );
                return Ok(None);
            }
        }
    }

    let scan_dir = paths.backends_dir();
    let state = prefs.backend_state_mut(backend.name);
    let saved_before = state.version.clone();
    let found = discover(backend, state, &scan_dir).await;
    let corrected = state.version != saved_before;
    let flags = state.flags.clone();
    if corrected && let Err(error) = prefs.commit() {
        warn!("failed to persist corrected backend state: {error}");
    }

    let Some(executable) = found.resolved_path else {
        return Err(BackendError::NotInstalled {
            command: backend.name.to_string(),
            search_path: format!(
                "{}:{}",
                scan_dir.display(),
                djvupress_platform::tool_search_path().to_string_lossy()
            ),
        });
    };

    info!(
        "converting {} with {}",
        source.display(),
        backend.display_name
    );

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                ConvertEvent::Output(line) => println!("djvupress: {line}"),
                ConvertEvent::Progress { fraction, message } => {
                    let percent = (f64::from(fraction) * 100.0).round();
                    match message {
                        Some(message) => info!("[{percent:>3}%] {message}"),
                        None => info!("[{percent:>3}%]"),
                    }
                }
            }
        }
    });

    // Detached callers (log redirection, cron) get the whole transcript in
    // one batch instead of interleaving with the structured log.
    let mode = if std::io::stdout().is_terminal() {
        StreamingMode::Lines
    } else {
        StreamingMode::Buffered
    };

    let result = invoke_backend(
        backend,
        &executable,
        source,
        &paths.scratch_dir(),
        InvokeOptions {
            flags: &flags,
            page_count,
            mode,
            sink: EventSink::channel(tx),
            cancel: cancel.clone(),
        },
    )
    .await;
    let _ = printer.await;

    let scratch_output = result?;
    let destination = promote_output(&scratch_output, source)
        .map_err(|error| BackendError::io("failed to promote converted output", error))?;
    Ok(Some(destination))
}
