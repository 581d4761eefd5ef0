//! Decrypt-and-remux engine and the final atomic placement of artifacts.

mod tools;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use catalog_parser::TrackMetadata;
use tracing::debug;

use crate::error::DecryptionError;
use crate::keys::DecryptionKey;

pub use tools::{ToolEngine, ToolPaths, decrypt_args, remux_args};

const STAGING_SUFFIX: &str = ".part";

/// Everything the engine needs to turn an encrypted download into a tagged file.
#[derive(Debug)]
pub struct EngineJob<'a> {
    pub input: &'a Path,
    pub key: &'a DecryptionKey,
    pub metadata: &'a TrackMetadata,
    /// Invocation scratch directory; intermediates go here.
    pub workspace: &'a Path,
    /// Extension of the finished container, including the dot.
    pub extension: &'a str,
}

/// Produces a finished, tagged container from an encrypted download.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Decrypt and remux `job.input`, returning the path of the finished
    /// artifact inside `job.workspace`.
    async fn process(&self, job: &EngineJob<'_>) -> Result<PathBuf, DecryptionError>;
}

/// Move a finished artifact to `destination` without ever exposing a partial file there.
///
/// Each call stages into its own uniquely named `.part` sibling and renames it
/// over `destination`, so concurrent installs of the same track all succeed and
/// the last one wins. Falls back to copying when the workspace lives on another
/// filesystem. A failed call removes only its own staging file.
pub async fn install(artifact: &Path, destination: &Path) -> Result<(), DecryptionError> {
    let parent = destination
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|e| DecryptionError::io("creating directory", parent, e))?;

    let stem = destination
        .file_name()
        .map(|n| format!(".{}.", n.to_string_lossy()))
        .unwrap_or_else(|| ".artifact.".to_string());
    let staged = tempfile::Builder::new()
        .prefix(&stem)
        .suffix(STAGING_SUFFIX)
        .tempfile_in(parent)
        .map_err(|e| DecryptionError::io("staging in", parent, e))?
        .into_temp_path();

    if tokio::fs::rename(artifact, &staged).await.is_err() {
        tokio::fs::copy(artifact, &staged)
            .await
            .map_err(|e| DecryptionError::io("copying", &staged, e))?;
    }

    staged
        .persist(destination)
        .map_err(|e| DecryptionError::io("renaming", destination, e.error))?;

    debug!(path = %destination.display(), "Artifact installed");
    Ok(())
}
