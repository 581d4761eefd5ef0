//! Child process helpers for the external media tools (`mp4decrypt`, `ffmpeg`).
//!
//! Commands built here never flash a console window on Windows, and
//! [`run_with_logs`] streams their output into `tracing` while capturing it
//! for error reporting.

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// Suppress the console window of a spawned tool. No-op off Windows.
pub trait NoWindowExt {
    fn no_window(&mut self) -> &mut Self;
}

#[cfg(feature = "tokio")]
impl NoWindowExt for tokio::process::Command {
    fn no_window(&mut self) -> &mut Self {
        #[cfg(windows)]
        {
            use std::os::windows::process::CommandExt;
            self.as_std_mut().creation_flags(CREATE_NO_WINDOW);
        }
        self
    }
}

/// Async command for `program` with the window flag already applied.
#[cfg(feature = "tokio")]
pub fn tokio_command(program: impl AsRef<std::ffi::OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.no_window();
    cmd
}

#[cfg(feature = "tokio")]
mod runner;

#[cfg(feature = "tokio")]
pub use runner::{CommandOutput, OutputLine, OutputStream, run_with_logs};
