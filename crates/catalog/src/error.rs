use thiserror::Error;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("regex error: {0}")]
    RegexError(String),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("request failed with HTTP {status} for {url}")]
    HttpStatus { status: u16, url: String },
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("playlist error: {0}")]
    PlaylistError(String),
    #[error("developer token not found")]
    TokenNotFound,
    #[error("playback denied: {0}")]
    PlaybackDenied(String),
    #[error("track not found: {0}")]
    TrackNotFound(String),
    #[error("no streams found")]
    NoStreamsFound,
    #[error("other: {0}")]
    Other(String),
}

impl CatalogError {
    pub fn http_status(status: reqwest::StatusCode, url: impl Into<String>) -> Self {
        Self::HttpStatus {
            status: status.as_u16(),
            url: url.into(),
        }
    }

    pub fn playlist(reason: impl Into<String>) -> Self {
        Self::PlaylistError(reason.into())
    }
}
