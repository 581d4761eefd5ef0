use std::process::{ExitStatus, Stdio};
use std::time::Instant;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Exit status and captured output of a finished tool run.
#[derive(Debug)]
pub struct CommandOutput {
    pub status: ExitStatus,
    pub duration: f64,
    pub lines: Vec<OutputLine>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// Last non-empty stderr line, the usual place tools put their failure reason.
    pub fn last_error_line(&self) -> Option<&str> {
        self.lines
            .iter()
            .rev()
            .filter(|l| l.stream == OutputStream::Stderr)
            .map(|l| l.text.trim())
            .find(|t| !t.is_empty())
    }
}

/// Run `command` to completion, forwarding its stdout/stderr lines to `tracing`.
///
/// `tool` names the program in log fields. Spawn and wait failures are
/// returned as-is; a non-zero exit is reported through `CommandOutput::status`.
pub async fn run_with_logs(tool: &str, command: &mut Command) -> std::io::Result<CommandOutput> {
    let start = Instant::now();

    command.stdin(Stdio::null());
    command.stdout(Stdio::piped());
    command.stderr(Stdio::piped());
    command.kill_on_drop(true);

    let mut child = command.spawn()?;

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(forward_lines(
            tool.to_string(),
            stdout,
            OutputStream::Stdout,
            tx.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(forward_lines(
            tool.to_string(),
            stderr,
            OutputStream::Stderr,
            tx.clone(),
        )));
    }
    // Receiver finishes once both readers hit EOF.
    drop(tx);

    let status = child.wait().await?;
    for reader in readers {
        let _ = reader.await;
    }

    let mut lines = Vec::new();
    while let Some(line) = rx.recv().await {
        lines.push(line);
    }

    let duration = start.elapsed().as_secs_f64();
    debug!(tool, status = %status, duration, "Tool finished");

    Ok(CommandOutput {
        status,
        duration,
        lines,
    })
}

async fn forward_lines<R>(
    tool: String,
    reader: R,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<OutputLine>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(text)) = lines.next_line().await {
        match stream {
            OutputStream::Stdout => debug!(tool = %tool, "stdout: {}", text),
            // Tools print progress on stderr too; only lines mentioning errors are raised.
            OutputStream::Stderr if text.to_lowercase().contains("error") => {
                warn!(tool = %tool, "stderr: {}", text)
            }
            OutputStream::Stderr => debug!(tool = %tool, "stderr: {}", text),
        }
        let _ = tx.send(OutputLine { stream, text });
    }
}
