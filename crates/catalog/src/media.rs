//! Track and stream data model shared by the resolver and the pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel used for every text field the upstream catalog leaves empty.
pub const UNKNOWN: &str = "Unknown";

/// Track number used when the catalog does not report one.
pub const DEFAULT_TRACK_NUMBER: u32 = 1;

/// Opaque handle identifying one track in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(String);

impl TrackId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TrackId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Descriptive tags of a track.
///
/// Used both for container tags and for the canonical output filename, so two
/// equal values must always produce the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artist: String,
    pub album: String,
    pub track_number: u32,
}

impl TrackMetadata {
    /// Build metadata from optional upstream fields, applying the sentinel defaults.
    ///
    /// Blank strings count as absent.
    pub fn from_parts(
        title: Option<String>,
        artist: Option<String>,
        album: Option<String>,
        track_number: Option<u32>,
    ) -> Self {
        Self {
            title: or_unknown(title),
            artist: or_unknown(artist),
            album: or_unknown(album),
            track_number: track_number
                .filter(|n| *n > 0)
                .unwrap_or(DEFAULT_TRACK_NUMBER),
        }
    }

    /// Tag pairs in the order they are written into the container.
    pub fn tags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("title", self.title.clone()),
            ("artist", self.artist.clone()),
            ("album", self.album.clone()),
            ("track", self.track_number.to_string()),
        ]
    }
}

impl Default for TrackMetadata {
    fn default() -> Self {
        Self::from_parts(None, None, None, None)
    }
}

fn or_unknown(value: Option<String>) -> String {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// One resolved catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackInfo {
    pub id: TrackId,
    pub metadata: TrackMetadata,
}

/// What a catalog URL points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Song,
    Album,
    Playlist,
}

impl CatalogKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CatalogKind::Song => "song",
            CatalogKind::Album => "album",
            CatalogKind::Playlist => "playlist",
        }
    }

    /// Collection name used by the catalog API (`songs`, `albums`, `playlists`).
    pub fn api_collection(&self) -> &'static str {
        match self {
            CatalogKind::Song => "songs",
            CatalogKind::Album => "albums",
            CatalogKind::Playlist => "playlists",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind.to_ascii_lowercase().as_str() {
            "song" => Some(CatalogKind::Song),
            "album" => Some(CatalogKind::Album),
            "playlist" => Some(CatalogKind::Playlist),
            _ => None,
        }
    }
}

/// How a stream variant is protected, as far as the variant query can tell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Protection {
    /// No key system; the fetched bytes are already the final payload.
    Unprotected,
    /// Key-system header (base64 PSSH) carried inline by the stream manifest.
    Header(String),
    /// The first key declaration of the stream's own segmented playlist names the key.
    PlaylistKey,
}

/// A resolved protection locator handed to the key provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ProtectionLocator {
    Header(String),
    KeyUri(String),
}

/// One encoded variant of a track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamVariant {
    /// Upstream flavor tag, e.g. `audio-stereo-256` or `28:ctrp256`.
    pub flavor: String,
    pub stream_url: String,
    pub protection: Protection,
}

impl StreamVariant {
    pub fn new(flavor: impl Into<String>, stream_url: impl Into<String>, protection: Protection) -> Self {
        Self {
            flavor: flavor.into(),
            stream_url: stream_url.into(),
            protection,
        }
    }
}

impl fmt::Display for StreamVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let protection = match &self.protection {
            Protection::Unprotected => "clear",
            Protection::Header(_) => "header",
            Protection::PlaylistKey => "playlist-key",
        };
        write!(f, "{} ({})", self.flavor, protection)
    }
}
