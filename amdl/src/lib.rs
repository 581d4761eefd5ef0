//! amdl library crate.
//!
//! Turns catalog URLs into decrypted, tagged audio files on disk. The
//! [`pipeline`] drives one track through resolution, variant selection,
//! download, key acquisition and decryption; [`service`] runs pipelines
//! concurrently for callers.

pub mod cache;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod fetcher;
pub mod keys;
pub mod logging;
pub mod pipeline;
pub mod selector;
pub mod service;

use std::sync::Arc;

use catalog_parser::platforms::apple_music::AppleMusicApi;
use catalog_parser::{Resolver, UrlMatcher};
use tracing::{debug, info};

pub use codec::{CodecFamily, SongCodec};
pub use config::AppConfig;
pub use error::{Error, PipelineError, Result};
pub use pipeline::{AcquiredTrack, Pipeline, PipelineResult, PipelineSettings};
pub use service::{AcquireService, UserContext};

/// Wire the HTTP catalog backend, fetcher, license client and tool engine
/// into a ready [`AcquireService`].
pub async fn build_service(config: &AppConfig) -> Result<AcquireService> {
    let client = catalog_parser::client::default_client(config.request_timeout())
        .map_err(|e| Error::Other(format!("building HTTP client: {e}")))?;
    // Streams can be large; only the connect phase is bounded here.
    let stream_client = catalog_parser::client::default_client(None)
        .map_err(|e| Error::Other(format!("building HTTP client: {e}")))?;

    let mut catalog = AppleMusicApi::new(config.apple_music_config(), client.clone());
    if let Some(path) = &config.catalog.cookies_path {
        let count = catalog.load_cookies(path).await?;
        debug!(path = %path.display(), count, "Loaded catalog cookies");
    }

    let matcher = UrlMatcher::with_host(&config.catalog.host)?;
    let resolver = Resolver::new(matcher, Arc::new(catalog));

    let mut license = keys::LicenseClient::new(
        client,
        config.license.endpoint.clone(),
        config.license.token.clone(),
    );
    if let Some(timeout) = config.request_timeout() {
        license = license.with_timeout(timeout);
    }

    let pipeline = Pipeline::new(
        resolver,
        Arc::new(fetcher::HttpFetcher::new(stream_client)),
        Arc::new(license),
        Arc::new(engine::ToolEngine::new(config.tool_paths())),
        config.pipeline_settings(),
    );

    info!(
        codec = %config.codec,
        output = %config.output_dir.display(),
        max_concurrent = config.max_concurrent,
        "Acquisition service ready"
    );
    Ok(AcquireService::new(Arc::new(pipeline), config.max_concurrent))
}
