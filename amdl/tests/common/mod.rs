//! Fakes for every pipeline seam plus a harness wiring them together.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use amdl::engine::{EngineJob, MediaEngine};
use amdl::error::{DecryptionError, FetchError, KeyAcquisitionError};
use amdl::fetcher::{ENCRYPTED_FILE_NAME, FetchedStream, StreamFetcher};
use amdl::keys::{DecryptionKey, KeyProvider, KeySlot};
use amdl::{Pipeline, PipelineSettings, SongCodec};
use async_trait::async_trait;
use catalog_parser::{
    CatalogError, CatalogService, CatalogUrl, Protection, ProtectionLocator, Resolver,
    StreamVariant, TrackId, TrackInfo, TrackMetadata, UrlMatcher,
};
use tempfile::TempDir;

pub const HOST: &str = "music.example";
pub const SCENARIO_URL: &str = "https://music.example/us/album/x/1";
pub const KEY: &str = "00112233445566778899aabbccddeeff";
pub const PAYLOAD: &[u8] = b"\x00\x00\x00\x18ftypmp42 fake encrypted payload";
pub const DECRYPTED_PREFIX: &[u8] = b"DECRYPTED:";

pub fn scenario_metadata() -> TrackMetadata {
    TrackMetadata::from_parts(
        Some("Song".into()),
        Some("Artist".into()),
        Some("Album".into()),
        Some(1),
    )
}

pub fn url_for(id: &str) -> String {
    format!("https://music.example/us/album/x/{id}")
}

/// Catalog answering from fixed tables. Tracks are keyed by the URL id.
#[derive(Default)]
pub struct FakeCatalog {
    pub tracks: HashMap<String, Vec<TrackInfo>>,
    pub variants: Vec<StreamVariant>,
    pub legacy_variants: Vec<StreamVariant>,
    pub fail_variants: bool,
    pub modern_calls: AtomicUsize,
    pub legacy_calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with_track(mut self, url_id: &str, metadata: TrackMetadata) -> Self {
        self.tracks.entry(url_id.to_string()).or_default().push(TrackInfo {
            id: TrackId::new(format!("track-{url_id}")),
            metadata,
        });
        self
    }

    pub fn with_variant(mut self, variant: StreamVariant) -> Self {
        self.variants.push(variant);
        self
    }

    pub fn with_legacy_variant(mut self, variant: StreamVariant) -> Self {
        self.legacy_variants.push(variant);
        self
    }
}

#[async_trait]
impl CatalogService for FakeCatalog {
    fn name(&self) -> &str {
        "fake"
    }

    async fn lookup_tracks(&self, url: &CatalogUrl) -> Result<Vec<TrackInfo>, CatalogError> {
        Ok(self.tracks.get(&url.id).cloned().unwrap_or_default())
    }

    async fn stream_variants(&self, _track: &TrackId) -> Result<Vec<StreamVariant>, CatalogError> {
        self.modern_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_variants {
            return Err(CatalogError::HttpStatus {
                status: 503,
                url: "https://api.music.example/".into(),
            });
        }
        Ok(self.variants.clone())
    }

    async fn webplayback_variants(
        &self,
        _track: &TrackId,
    ) -> Result<Vec<StreamVariant>, CatalogError> {
        self.legacy_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.legacy_variants.clone())
    }
}

/// Writes a fixed payload into the workspace.
#[derive(Default)]
pub struct FakeFetcher {
    pub locator: Option<ProtectionLocator>,
    pub fail: bool,
    pub delay: Option<Duration>,
    pub calls: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub fetched_urls: Mutex<Vec<String>>,
    pub written: Mutex<Vec<PathBuf>>,
}

impl FakeFetcher {
    pub fn protected() -> Self {
        Self {
            locator: Some(ProtectionLocator::Header("AAAAW3Bzc2g=".into())),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_written(&self) -> Option<PathBuf> {
        self.written.lock().unwrap().last().cloned()
    }

    async fn write_payload(
        &self,
        variant: &StreamVariant,
        workspace: &Path,
    ) -> Result<FetchedStream, FetchError> {
        let path = workspace.join(ENCRYPTED_FILE_NAME);
        tokio::fs::write(&path, PAYLOAD)
            .await
            .map_err(|e| FetchError::io("writing", &path, e))?;
        self.written.lock().unwrap().push(path.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(FetchError::Status {
                url: variant.stream_url.clone(),
                status: 500,
            });
        }
        Ok(FetchedStream {
            path,
            locator: self.locator.clone(),
        })
    }
}

#[async_trait]
impl StreamFetcher for FakeFetcher {
    async fn fetch(
        &self,
        variant: &StreamVariant,
        workspace: &Path,
    ) -> Result<FetchedStream, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        self.fetched_urls
            .lock()
            .unwrap()
            .push(variant.stream_url.clone());

        let result = self.write_payload(variant, workspace).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

#[derive(Default)]
pub struct FakeKeys {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeKeys {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl KeyProvider for FakeKeys {
    async fn acquire_key(
        &self,
        _track: &TrackId,
        _locator: &ProtectionLocator,
    ) -> Result<DecryptionKey, KeyAcquisitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(KeyAcquisitionError::Denied {
                status: 403,
                message: "not entitled".into(),
            });
        }
        DecryptionKey::new(KEY, KeySlot::Index(1))
    }
}

/// "Decrypts" by prefixing the input with a marker.
#[derive(Default)]
pub struct FakeEngine {
    pub fail: bool,
    pub calls: AtomicUsize,
}

impl FakeEngine {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaEngine for FakeEngine {
    async fn process(&self, job: &EngineJob<'_>) -> Result<PathBuf, DecryptionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let input = tokio::fs::read(job.input)
            .await
            .map_err(|e| DecryptionError::io("reading", job.input, e))?;

        let decrypted = job.workspace.join("decrypted.mp4");
        let mut body = DECRYPTED_PREFIX.to_vec();
        body.extend_from_slice(&input);
        tokio::fs::write(&decrypted, &body)
            .await
            .map_err(|e| DecryptionError::io("writing", &decrypted, e))?;

        if self.fail {
            return Err(DecryptionError::ToolFailed {
                tool: "ffmpeg".into(),
                status: "exit status: 1".into(),
                message: "Invalid data found when processing input".into(),
            });
        }

        let output = job.workspace.join(format!("remuxed{}", job.extension));
        tokio::fs::rename(&decrypted, &output)
            .await
            .map_err(|e| DecryptionError::io("renaming", &output, e))?;
        Ok(output)
    }
}

pub struct Harness {
    pub output: TempDir,
    pub temp: TempDir,
    pub catalog: Arc<FakeCatalog>,
    pub fetcher: Arc<FakeFetcher>,
    pub keys: Arc<FakeKeys>,
    pub engine: Arc<FakeEngine>,
    pub pipeline: Arc<Pipeline>,
}

impl Harness {
    pub fn new(codec: SongCodec, catalog: FakeCatalog, fetcher: FakeFetcher) -> Self {
        Self::build(codec, catalog, fetcher, FakeKeys::default(), FakeEngine::default(), |_| {})
    }

    pub fn build(
        codec: SongCodec,
        catalog: FakeCatalog,
        fetcher: FakeFetcher,
        keys: FakeKeys,
        engine: FakeEngine,
        tweak: impl FnOnce(&mut PipelineSettings),
    ) -> Self {
        let output = tempfile::tempdir().unwrap();
        let temp = tempfile::tempdir().unwrap();

        let catalog = Arc::new(catalog);
        let fetcher = Arc::new(fetcher);
        let keys = Arc::new(keys);
        let engine = Arc::new(engine);

        let mut settings = PipelineSettings::new(codec, output.path(), temp.path().join("work"));
        tweak(&mut settings);

        let resolver = Resolver::new(
            UrlMatcher::with_host(HOST).unwrap(),
            catalog.clone() as Arc<dyn CatalogService>,
        );
        let pipeline = Pipeline::new(
            resolver,
            fetcher.clone() as Arc<dyn StreamFetcher>,
            keys.clone() as Arc<dyn KeyProvider>,
            engine.clone() as Arc<dyn MediaEngine>,
            settings,
        );

        Self {
            output,
            temp,
            catalog,
            fetcher,
            keys,
            engine,
            pipeline: Arc::new(pipeline),
        }
    }

    pub fn temp_root(&self) -> PathBuf {
        self.temp.path().join("work")
    }

    /// Entries left in the temp root; a missing root counts as empty.
    pub fn temp_entries(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(self.temp_root()) {
            Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn output_files(&self) -> Vec<PathBuf> {
        files_under(self.output.path())
    }
}

pub fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();
    let Ok(entries) = std::fs::read_dir(root) else {
        return files;
    };
    for entry in entries {
        let path = entry.unwrap().path();
        if path.is_dir() {
            files.extend(files_under(&path));
        } else {
            files.push(path);
        }
    }
    files
}

pub fn aac_variant(url: &str, protection: Protection) -> StreamVariant {
    StreamVariant::new(SongCodec::Aac.flavor(), url, protection)
}
