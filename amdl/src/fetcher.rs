//! Download of the encrypted bitstream of a variant.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use catalog_parser::hls::{is_playlist, segment_plan};
use catalog_parser::{Protection, ProtectionLocator, StreamVariant};
use futures::StreamExt;
use reqwest::{Client, Response};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::error::FetchError;

/// Name of the downloaded file inside the invocation workspace.
pub const ENCRYPTED_FILE_NAME: &str = "encrypted.mp4";

/// Result of a fetch: the raw file and the protection locator, if any.
///
/// `locator == None` means the file is already the final payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedStream {
    pub path: PathBuf,
    pub locator: Option<ProtectionLocator>,
}

#[async_trait]
pub trait StreamFetcher: Send + Sync {
    /// Download `variant` into `workspace` and resolve its protection locator.
    async fn fetch(
        &self,
        variant: &StreamVariant,
        workspace: &Path,
    ) -> Result<FetchedStream, FetchError>;
}

/// [`StreamFetcher`] over HTTP, handling both single files and segmented playlists.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn get(&self, url: &str) -> Result<Response, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Stream `response` into `file`, returning the number of bytes written.
    async fn copy_body(
        url: &str,
        response: Response,
        file: &mut File,
        path: &Path,
    ) -> Result<u64, FetchError> {
        let mut written = 0u64;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
            file.write_all(&chunk)
                .await
                .map_err(|e| FetchError::io("writing", path, e))?;
            written += chunk.len() as u64;
        }
        Ok(written)
    }

    /// Download every part of a media playlist, in order, into one file.
    ///
    /// Returns the playlist key URI, if any, and the number of bytes written.
    async fn fetch_segments(
        &self,
        playlist_url: &str,
        body: &[u8],
        file: &mut File,
        path: &Path,
    ) -> Result<(Option<String>, u64), FetchError> {
        let plan = segment_plan(body, playlist_url).map_err(|source| FetchError::Playlist {
            url: playlist_url.to_string(),
            source,
        })?;
        debug!(
            segments = plan.segments.len(),
            has_init = plan.init.is_some(),
            has_key = plan.key_uri.is_some(),
            "Fetching segmented stream"
        );

        let mut written = 0;
        for url in plan.init.iter().chain(plan.segments.iter()) {
            let response = self.get(url).await?;
            written += Self::copy_body(url, response, file, path).await?;
        }
        Ok((plan.key_uri, written))
    }
}

#[async_trait]
impl StreamFetcher for HttpFetcher {
    #[instrument(skip(self, variant, workspace), fields(flavor = %variant.flavor))]
    async fn fetch(
        &self,
        variant: &StreamVariant,
        workspace: &Path,
    ) -> Result<FetchedStream, FetchError> {
        let path = workspace.join(ENCRYPTED_FILE_NAME);
        let mut file = File::create(&path)
            .await
            .map_err(|e| FetchError::io("creating", &path, e))?;

        let url = variant.stream_url.as_str();
        let response = self.get(url).await?;
        let mut stream = response.bytes_stream();

        let mut head = Vec::new();
        let mut playlist_key = None;
        let mut written = 0u64;
        if let Some(first) = stream.next().await {
            let first = first.map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
            if is_playlist(&first) {
                head.extend_from_slice(&first);
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|source| FetchError::Http {
                        url: url.to_string(),
                        source,
                    })?;
                    head.extend_from_slice(&chunk);
                }
                (playlist_key, written) = self.fetch_segments(url, &head, &mut file, &path).await?;
            } else {
                file.write_all(&first)
                    .await
                    .map_err(|e| FetchError::io("writing", &path, e))?;
                written += first.len() as u64;
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|source| FetchError::Http {
                        url: url.to_string(),
                        source,
                    })?;
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| FetchError::io("writing", &path, e))?;
                    written += chunk.len() as u64;
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| FetchError::io("flushing", &path, e))?;

        if written == 0 {
            return Err(FetchError::EmptyBody {
                url: url.to_string(),
            });
        }

        let locator = match &variant.protection {
            Protection::Unprotected => None,
            Protection::Header(header) => Some(ProtectionLocator::Header(header.clone())),
            Protection::PlaylistKey => playlist_key.map(ProtectionLocator::KeyUri),
        };
        debug!(path = %path.display(), bytes = written, protected = locator.is_some(), "Fetch complete");

        Ok(FetchedStream { path, locator })
    }
}
