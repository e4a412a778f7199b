use std::process::Stdio;

use log::{debug, error};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use djvupress_backend::{BackendError, StreamingMode};
use djvupress_platform::ConsoleHidden;

use crate::command::ToolCommand;

/// Run a converter subprocess, delivering its combined stdout+stderr to
/// `on_line` one completed line at a time.
///
/// Both output streams share a single pipe so diagnostics keep their emission
/// order relative to each other; the trailing partial line, if any, is
/// flushed after the process exits. In [`StreamingMode::Buffered`] no line is
/// delivered until the process has exited.
///
/// Cancellation is cooperative: the token is checked between lines, and a
/// cancelled run kills the subprocess outright (converters are not expected
/// to handle termination signals) and returns [`BackendError::Cancelled`].
///
/// # Errors
/// - [`BackendError::NotInstalled`] when the executable cannot be found,
///   carrying the attempted command and the active search path.
/// - [`BackendError::ExecutionFailed`] on nonzero exit, carrying the exit
///   code and the full captured output.
/// - [`BackendError::Cancelled`] when the token fires mid-run.
pub async fn run_tool<F>(
    command: &ToolCommand,
    mode: StreamingMode,
    cancel: &CancellationToken,
    mut on_line: F,
) -> Result<(), BackendError>
where
    F: FnMut(&str),
{
    let (reader, writer) =
        std::io::pipe().map_err(|error| BackendError::io("failed to create output pipe", error))?;
    let stderr_writer = writer
        .try_clone()
        .map_err(|error| BackendError::io("failed to share output pipe", error))?;

    let mut cmd = Command::new(&command.program);
    cmd.args(&command.args);
    for (key, value) in &command.envs {
        cmd.env(key, value);
    }
    if let Some(dir) = &command.current_dir {
        cmd.current_dir(dir);
    }
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::from(writer));
    cmd.stderr(Stdio::from(stderr_writer));
    cmd.hide_console();
    cmd.kill_on_drop(true);

    let spawned = cmd.spawn();
    // The Command retains the pipe write ends; release them so the reader
    // sees EOF once the child exits.
    drop(cmd);

    let mut child = match spawned {
        Ok(child) => child,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            error!(
                "converter not found: {} (PATH: {})",
                command.rendered(),
                command.search_path()
            );
            return Err(BackendError::NotInstalled {
                command: command.rendered(),
                search_path: command.search_path(),
            });
        }
        Err(err) => return Err(BackendError::io("failed to spawn converter", err)),
    };

    let (line_tx, mut line_rx) = tokio::sync::mpsc::unbounded_channel::<String>();
    std::thread::spawn(move || {
        use std::io::BufRead;
        for line in std::io::BufReader::new(reader).lines() {
            let Ok(line) = line else { break };
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });

    let mut transcript: Vec<String> = Vec::new();
    loop {
        tokio::select! {
            received = line_rx.recv() => match received {
                Some(line) => {
                    if mode == StreamingMode::Lines {
                        on_line(&line);
                    }
                    transcript.push(line);
                }
                None => break,
            },
            () = cancel.cancelled() => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                return Err(BackendError::Cancelled);
            }
        }
    }

    let status = tokio::select! {
        status = child.wait() => {
            status.map_err(|error| BackendError::io("failed to wait for converter", error))?
        }
        () = cancel.cancelled() => {
            let _ = child.start_kill();
            let _ = child.wait().await;
            return Err(BackendError::Cancelled);
        }
    };

    if mode == StreamingMode::Buffered {
        for line in &transcript {
            on_line(line);
        }
    }

    debug!("converter exited with {status}");

    if status.success() {
        Ok(())
    } else {
        Err(BackendError::ExecutionFailed {
            code: status.code(),
            output: transcript.join("\n"),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::ffi::OsString;
    use std::time::Duration;

    use tokio_util::sync::CancellationToken;

    use djvupress_backend::{BackendError, StreamingMode};

    use super::run_tool;
    use crate::command::ToolCommand;

    fn shell(script: &str) -> ToolCommand {
        ToolCommand::from_argv(vec![
            OsString::from("/bin/sh"),
            OsString::from("-c"),
            OsString::from(script),
        ])
        .expect("shell argv should produce a command")
    }

    #[tokio::test]
    async fn streams_stdout_and_stderr_in_emission_order() {
        let mut lines = Vec::new();

        run_tool(
            &shell("echo one; echo two >&2; echo three"),
            StreamingMode::Lines,
            &CancellationToken::new(),
            |line| lines.push(line.to_string()),
        )
        .await
        .expect("script should run to completion");

        assert_eq!(lines, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn flushes_trailing_partial_line() {
        let mut lines = Vec::new();

        run_tool(
            &shell("printf 'no trailing newline'"),
            StreamingMode::Lines,
            &CancellationToken::new(),
            |line| lines.push(line.to_string()),
        )
        .await
        .expect("script should run to completion");

        assert_eq!(lines, ["no trailing newline"]);
    }

    #[tokio::test]
    async fn buffered_mode_delivers_all_lines_after_exit() {
        let mut lines = Vec::new();

        run_tool(
            &shell("echo alpha; echo beta"),
            StreamingMode::Buffered,
            &CancellationToken::new(),
            |line| lines.push(line.to_string()),
        )
        .await
        .expect("script should run to completion");

        assert_eq!(lines, ["alpha", "beta"]);
    }

    #[tokio::test]
    async fn nonzero_exit_carries_code_and_output() {
        let error = run_tool(
            &shell("echo usage; exit 10"),
            StreamingMode::Lines,
            &CancellationToken::new(),
            |_| {},
        )
        .await
        .expect_err("nonzero exit should fail");

        assert!(matches!(
            error,
            BackendError::ExecutionFailed { code: Some(10), ref output } if output == "usage"
        ));
    }

    #[tokio::test]
    async fn missing_binary_reports_not_installed_with_search_path() {
        let command = ToolCommand::from_argv(vec![OsString::from(
            "djvupress-test-binary-that-does-not-exist",
        )])
        .expect("argv should produce a command");

        let error = run_tool(&command, StreamingMode::Lines, &CancellationToken::new(), |_| {})
            .await
            .expect_err("missing binary should fail");

        assert!(matches!(
            error,
            BackendError::NotInstalled { ref command, ref search_path }
                if command.contains("djvupress-test-binary-that-does-not-exist")
                    && !search_path.is_empty()
        ));
    }

    #[tokio::test]
    async fn cancellation_kills_long_running_subprocess() {
        let cancel = CancellationToken::new();
        let cancel_on_first_line = cancel.clone();

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            run_tool(
                &shell("echo started; sleep 600; echo finished"),
                StreamingMode::Lines,
                &cancel,
                move |_| cancel_on_first_line.cancel(),
            ),
        )
        .await
        .expect("cancellation should return well before the sleep finishes");

        assert!(matches!(result, Err(BackendError::Cancelled)));
    }
}
