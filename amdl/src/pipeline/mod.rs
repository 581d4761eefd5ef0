//! Acquisition orchestrator.
//!
//! One [`Pipeline::run`] takes a catalog URL through resolution, variant
//! selection, the cache check, download, key acquisition and decryption.
//! Every run gets its own scratch directory under the temp root, removed on
//! every exit path.

mod state;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use catalog_parser::{
    CatalogError, CatalogService, Resolver, StreamVariant, TrackId, TrackInfo, TrackMetadata,
};
use dashmap::DashMap;
use serde::Serialize;
use tempfile::TempDir;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use crate::cache;
use crate::codec::SongCodec;
use crate::engine::{self, EngineJob, MediaEngine};
use crate::error::{FetchError, KeyAcquisitionError, PipelineError, ResolutionError};
use crate::fetcher::StreamFetcher;
use crate::keys::KeyProvider;
use crate::selector;

pub use state::{PipelineStage, StageTracker};

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AcquiredTrack {
    pub path: PathBuf,
    pub metadata: TrackMetadata,
    pub track_id: TrackId,
    /// The file already existed; nothing was downloaded.
    pub cache_hit: bool,
}

pub type PipelineResult = Result<AcquiredTrack, PipelineError>;

/// Per-pipeline settings.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub codec: SongCodec,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub fetch_timeout: Option<Duration>,
    pub key_timeout: Option<Duration>,
    /// Serialize concurrent runs that target the same output file.
    pub dedupe_in_flight: bool,
}

impl PipelineSettings {
    pub fn new(codec: SongCodec, output_dir: impl Into<PathBuf>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            codec,
            output_dir: output_dir.into(),
            temp_dir: temp_dir.into(),
            fetch_timeout: None,
            key_timeout: None,
            dedupe_in_flight: false,
        }
    }
}

pub struct Pipeline {
    resolver: Resolver,
    fetcher: Arc<dyn StreamFetcher>,
    keys: Arc<dyn KeyProvider>,
    engine: Arc<dyn MediaEngine>,
    settings: PipelineSettings,
    in_flight: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl Pipeline {
    pub fn new(
        resolver: Resolver,
        fetcher: Arc<dyn StreamFetcher>,
        keys: Arc<dyn KeyProvider>,
        engine: Arc<dyn MediaEngine>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            resolver,
            fetcher,
            keys,
            engine,
            settings,
            in_flight: DashMap::new(),
        }
    }

    fn catalog(&self) -> &dyn CatalogService {
        self.resolver.service().as_ref()
    }

    /// Acquire the first track `url` refers to.
    pub async fn run(&self, url: &str) -> PipelineResult {
        let mut tracker = StageTracker::new();
        let result = self.run_stages(url, &mut tracker).await;
        match &result {
            Ok(track) => {
                tracker.advance(PipelineStage::Done);
                info!(
                    path = %track.path.display(),
                    cache_hit = track.cache_hit,
                    "Track acquired"
                );
            }
            Err(e) => {
                let failed_at = tracker.current();
                tracker.advance(PipelineStage::Failed);
                warn!(stage = %failed_at, error = %e, "Acquisition failed");
            }
        }
        result
    }

    async fn run_stages(&self, url: &str, tracker: &mut StageTracker) -> PipelineResult {
        let codec = self.settings.codec;
        let track = self.resolve_first(url).await?;
        debug!(track_id = %track.id, title = %track.metadata.title, "Resolved track");

        let variant = selector::select(self.catalog(), &track.id, codec).await?;
        tracker.advance(PipelineStage::VariantSelected);
        debug!(variant = %variant, "Selected variant");

        let destination =
            cache::final_path(&self.settings.output_dir, &track.metadata, codec.file_extension());

        let guard = self.lock_destination(&destination).await;
        let outcome = self
            .acquire_uncached(&track, &variant, &destination, tracker)
            .await;
        drop(guard);
        self.release_destination(&destination);

        outcome.map(|cache_hit| AcquiredTrack {
            path: destination,
            metadata: track.metadata,
            track_id: track.id,
            cache_hit,
        })
    }

    /// Produce `destination` unless it already exists. Returns whether it did.
    async fn acquire_uncached(
        &self,
        track: &TrackInfo,
        variant: &StreamVariant,
        destination: &Path,
        tracker: &mut StageTracker,
    ) -> Result<bool, PipelineError> {
        if cache::is_cached(destination).await {
            debug!(path = %destination.display(), "Cache hit");
            return Ok(true);
        }

        let workspace = self.create_workspace().await?;
        let outcome = self
            .acquire_into(workspace.path(), track, variant, destination, tracker)
            .await;

        let workspace_path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            warn!(path = %workspace_path.display(), error = %e, "Failed to remove workspace");
        }
        outcome.map(|()| false)
    }

    async fn resolve_first(&self, url: &str) -> Result<TrackInfo, PipelineError> {
        let tracks = self
            .resolver
            .resolve(url)
            .await
            .map_err(|source| ResolutionError {
                url: url.to_string(),
                source,
            })?;
        if tracks.len() > 1 {
            debug!(skipped = tracks.len() - 1, "Only the first track is acquired");
        }
        tracks.into_iter().next().ok_or_else(|| {
            ResolutionError {
                url: url.to_string(),
                source: CatalogError::TrackNotFound(url.to_string()),
            }
            .into()
        })
    }

    async fn acquire_into(
        &self,
        workspace: &Path,
        track: &TrackInfo,
        variant: &StreamVariant,
        destination: &Path,
        tracker: &mut StageTracker,
    ) -> Result<(), PipelineError> {
        tracker.advance(PipelineStage::Fetching);
        let fetched = with_timeout(
            self.settings.fetch_timeout,
            self.fetcher.fetch(variant, workspace),
            FetchError::Timeout,
        )
        .await?;

        let Some(locator) = fetched.locator else {
            tracker.advance(PipelineStage::Decrypting);
            debug!("Stream is unprotected; moving into place");
            engine::install(&fetched.path, destination).await?;
            return Ok(());
        };

        tracker.advance(PipelineStage::KeyAcquiring);
        let key = with_timeout(
            self.settings.key_timeout,
            self.keys.acquire_key(&track.id, &locator),
            KeyAcquisitionError::Timeout,
        )
        .await?;

        tracker.advance(PipelineStage::Decrypting);
        let job = EngineJob {
            input: &fetched.path,
            key: &key,
            metadata: &track.metadata,
            workspace,
            extension: self.settings.codec.file_extension(),
        };
        let artifact = self.engine.process(&job).await?;
        engine::install(&artifact, destination).await?;

        // Intermediates go with the workspace, but drop the ciphertext early.
        if let Err(e) = tokio::fs::remove_file(&fetched.path).await {
            debug!(error = %e, "Encrypted intermediate already gone");
        }
        Ok(())
    }

    async fn create_workspace(&self) -> Result<TempDir, PipelineError> {
        let root = &self.settings.temp_dir;
        tokio::fs::create_dir_all(root)
            .await
            .map_err(|e| PipelineError::io("creating temp root", root, e))?;
        tempfile::Builder::new()
            .prefix("amdl-")
            .tempdir_in(root)
            .map_err(|e| PipelineError::io("creating workspace in", root, e))
    }

    async fn lock_destination(&self, destination: &Path) -> Option<OwnedMutexGuard<()>> {
        if !self.settings.dedupe_in_flight {
            return None;
        }
        let lock = self
            .in_flight
            .entry(destination.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        Some(lock.lock_owned().await)
    }

    fn release_destination(&self, destination: &Path) {
        if self.settings.dedupe_in_flight {
            self.in_flight
                .remove_if(destination, |_, lock| Arc::strong_count(lock) == 1);
        }
    }
}

/// Run `fut` under an optional timeout, mapping expiry to the stage's error.
async fn with_timeout<T, E, F>(
    timeout: Option<Duration>,
    fut: F,
    on_timeout: fn(Duration) -> E,
) -> Result<T, PipelineError>
where
    F: Future<Output = Result<T, E>>,
    PipelineError: From<E>,
{
    match timeout {
        Some(limit) => match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(PipelineError::from),
            Err(_) => Err(PipelineError::from(on_timeout(limit))),
        },
        None => fut.await.map_err(PipelineError::from),
    }
}
