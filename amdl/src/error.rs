//! Stage errors and the single error type surfaced by a pipeline run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use catalog_parser::CatalogError;
use thiserror::Error;

/// Library-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// URL rejected or no tracks found for it.
#[derive(Error, Debug)]
#[error("could not resolve {url}")]
pub struct ResolutionError {
    pub url: String,
    #[source]
    pub source: CatalogError,
}

/// No upstream variant carries the requested flavor.
#[derive(Error, Debug)]
#[error("no variant with flavor {flavor} among {available:?}")]
pub struct VariantNotFoundError {
    pub flavor: String,
    pub available: Vec<String>,
}

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("http error while fetching {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("request for {url} failed with HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("unusable playlist at {url}: {source}")]
    Playlist {
        url: String,
        #[source]
        source: CatalogError,
    },

    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("empty response body from {url}")]
    EmptyBody { url: String },

    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl FetchError {
    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Error, Debug)]
pub enum KeyAcquisitionError {
    #[error("license request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("license server answered HTTP {status}: {message}")]
    Denied { status: u16, message: String },

    #[error("malformed license response: {0}")]
    Malformed(String),

    #[error("malformed protection locator: {0}")]
    InvalidLocator(String),

    #[error("no license endpoint configured")]
    NotConfigured,

    #[error("key acquisition timed out after {0:?}")]
    Timeout(Duration),
}

#[derive(Error, Debug)]
pub enum DecryptionError {
    #[error("failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{tool} exited with {status}: {message}")]
    ToolFailed {
        tool: String,
        status: String,
        message: String,
    },

    #[error("{tool} produced no output at {}", .path.display())]
    MissingOutput { tool: String, path: PathBuf },

    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DecryptionError {
    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Error surfaced by one acquisition, preserving the failing stage and its cause.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("variant lookup failed: {0}")]
    VariantLookup(#[source] CatalogError),

    #[error(transparent)]
    VariantNotFound(#[from] VariantNotFoundError),

    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("key acquisition failed: {0}")]
    KeyAcquisition(#[from] KeyAcquisitionError),

    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    #[error("{op} {}: {source}", .path.display())]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("acquisition task aborted: {0}")]
    Aborted(String),
}

impl PipelineError {
    pub fn io(op: &'static str, path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            op,
            path: path.to_path_buf(),
            source,
        }
    }

    /// Name of the stage that failed.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Resolution(_) => "resolve",
            Self::VariantLookup(_) | Self::VariantNotFound(_) => "select",
            Self::Fetch(_) => "fetch",
            Self::KeyAcquisition(_) => "key",
            Self::Decryption(_) => "decrypt",
            Self::Io { .. } => "workspace",
            Self::Aborted(_) => "task",
        }
    }

    /// One line suitable for showing to the person who asked for the track.
    pub fn user_message(&self) -> String {
        match self {
            Self::Resolution(e) => match &e.source {
                CatalogError::InvalidUrl(_) => "That link is not a supported catalog URL.".to_string(),
                _ => "Could not find that track in the catalog.".to_string(),
            },
            Self::VariantLookup(_) => "Could not list the available streams for this track.".to_string(),
            Self::VariantNotFound(e) => {
                format!("This track is not available in the requested format ({}).", e.flavor)
            }
            Self::Fetch(_) => "Downloading the track failed.".to_string(),
            Self::KeyAcquisition(_) => "Could not obtain a license for this track.".to_string(),
            Self::Decryption(_) => "Processing the downloaded track failed.".to_string(),
            Self::Io { .. } | Self::Aborted(_) => "An internal error occurred.".to_string(),
        }
    }
}

/// Errors outside a pipeline run (configuration, logging setup).
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
