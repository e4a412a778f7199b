#[cfg(windows)]
use std::os::windows::process::CommandExt;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Suppress the console window that Windows pops up for child processes
/// spawned from a GUI-less context. No-op elsewhere.
pub trait ConsoleHidden {
    fn hide_console(&mut self) -> &mut Self;
}

impl ConsoleHidden for tokio::process::Command {
    #[cfg(windows)]
    fn hide_console(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(not(windows))]
    fn hide_console(&mut self) -> &mut Self {
        self
    }
}

impl ConsoleHidden for std::process::Command {
    #[cfg(windows)]
    fn hide_console(&mut self) -> &mut Self {
        self.creation_flags(CREATE_NO_WINDOW)
    }

    #[cfg(not(windows))]
    fn hide_console(&mut self) -> &mut Self {
        self
    }
}
