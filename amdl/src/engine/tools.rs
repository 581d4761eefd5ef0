use std::path::{Path, PathBuf};

use async_trait::async_trait;
use catalog_parser::TrackMetadata;
use process_utils::{CommandOutput, run_with_logs, tokio_command};
use tracing::{debug, instrument};

use super::{EngineJob, MediaEngine};
use crate::error::DecryptionError;
use crate::keys::DecryptionKey;

const DECRYPTED_FILE_NAME: &str = "decrypted.mp4";
const REMUXED_STEM: &str = "remuxed";

/// Locations of the external tools.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    pub mp4decrypt: PathBuf,
    pub ffmpeg: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            mp4decrypt: std::env::var_os("MP4DECRYPT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("mp4decrypt")),
            ffmpeg: std::env::var_os("FFMPEG_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ffmpeg")),
        }
    }
}

/// Arguments for `mp4decrypt --key <slot>:<key> <input> <output>`.
pub fn decrypt_args(key: &DecryptionKey, input: &Path, output: &Path) -> Vec<String> {
    vec![
        "--key".to_string(),
        key.decrypter_spec(),
        input.to_string_lossy().into_owned(),
        output.to_string_lossy().into_owned(),
    ]
}

/// ffmpeg arguments copying the audio stream into `output` with the track tags.
pub fn remux_args(input: &Path, metadata: &TrackMetadata, output: &Path) -> Vec<String> {
    let mut args = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-nostats".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-i".to_string(),
        input.to_string_lossy().into_owned(),
        "-map".to_string(),
        "0:a".to_string(),
        "-c".to_string(),
        "copy".to_string(),
    ];

    for (key, value) in metadata.tags() {
        args.extend(["-metadata".to_string(), format!("{key}={value}")]);
    }

    // Only MP4-family muxers understand movflags.
    let faststart = matches!(
        output
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref(),
        Some("mp4" | "m4a" | "mov")
    );
    if faststart {
        args.extend(["-movflags".to_string(), "+faststart".to_string()]);
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

/// [`MediaEngine`] running `mp4decrypt` followed by an ffmpeg remux.
#[derive(Debug, Clone, Default)]
pub struct ToolEngine {
    paths: ToolPaths,
}

impl ToolEngine {
    pub fn new(paths: ToolPaths) -> Self {
        Self { paths }
    }

    async fn run(&self, program: &Path, args: Vec<String>, output: &Path) -> Result<(), DecryptionError> {
        let tool = program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| program.display().to_string());

        let mut command = tokio_command(program);
        command.args(&args);

        let result: CommandOutput = run_with_logs(&tool, &mut command)
            .await
            .map_err(|source| DecryptionError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !result.success() {
            return Err(DecryptionError::ToolFailed {
                tool,
                status: result.status.to_string(),
                message: result
                    .last_error_line()
                    .unwrap_or("no diagnostic output")
                    .to_string(),
            });
        }

        let produced = tokio::fs::metadata(output)
            .await
            .map(|m| m.is_file() && m.len() > 0)
            .unwrap_or(false);
        if !produced {
            return Err(DecryptionError::MissingOutput {
                tool,
                path: output.to_path_buf(),
            });
        }

        debug!(tool = %tool, duration = result.duration, "Tool step complete");
        Ok(())
    }
}

#[async_trait]
impl MediaEngine for ToolEngine {
    #[instrument(skip(self, job), fields(slot = %job.key.slot()))]
    async fn process(&self, job: &EngineJob<'_>) -> Result<PathBuf, DecryptionError> {
        let decrypted = job.workspace.join(DECRYPTED_FILE_NAME);
        self.run(
            &self.paths.mp4decrypt,
            decrypt_args(job.key, job.input, &decrypted),
            &decrypted,
        )
        .await?;

        let remuxed = job
            .workspace
            .join(format!("{REMUXED_STEM}{}", job.extension));
        self.run(
            &self.paths.ffmpeg,
            remux_args(&decrypted, job.metadata, &remuxed),
            &remuxed,
        )
        .await?;

        Ok(remuxed)
    }
}
