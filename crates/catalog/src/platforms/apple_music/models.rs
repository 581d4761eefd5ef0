use serde::Deserialize;

use crate::error::CatalogError;
use crate::media::{Protection, StreamVariant, TrackId, TrackInfo, TrackMetadata};

#[derive(Debug, Deserialize)]
pub struct CatalogResponse {
    #[serde(default)]
    pub data: Vec<Resource>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Option<Attributes>,
    #[serde(default)]
    pub relationships: Option<Relationships>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attributes {
    pub name: Option<String>,
    pub artist_name: Option<String>,
    pub album_name: Option<String>,
    pub track_number: Option<u32>,
    pub extended_asset_urls: Option<ExtendedAssetUrls>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtendedAssetUrls {
    pub enhanced_hls: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Relationships {
    pub tracks: Option<TrackRelationship>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrackRelationship {
    #[serde(default)]
    pub data: Vec<Resource>,
}

impl Resource {
    pub fn is_song(&self) -> bool {
        self.kind == "songs"
    }

    /// Metadata of a song resource. `album_fallback` fills a missing album name.
    pub fn track_info(&self, album_fallback: Option<&str>) -> TrackInfo {
        let attrs = self.attributes.clone().unwrap_or_default();
        let album = attrs
            .album_name
            .or_else(|| album_fallback.map(str::to_string));
        TrackInfo {
            id: TrackId::new(self.id.clone()),
            metadata: TrackMetadata::from_parts(
                attrs.name,
                attrs.artist_name,
                album,
                attrs.track_number,
            ),
        }
    }

    /// Songs of a collection resource in upstream order.
    pub fn song_tracks(&self) -> Vec<TrackInfo> {
        let album = self.attributes.as_ref().and_then(|a| a.name.as_deref());
        let fallback = if self.kind == "albums" { album } else { None };
        self.relationships
            .as_ref()
            .and_then(|r| r.tracks.as_ref())
            .map(|t| {
                t.data
                    .iter()
                    .filter(|r| r.is_song())
                    .map(|r| r.track_info(fallback))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn enhanced_hls(&self) -> Option<&str> {
        self.attributes
            .as_ref()?
            .extended_asset_urls
            .as_ref()?
            .enhanced_hls
            .as_deref()
            .filter(|u| !u.is_empty())
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebplaybackResponse {
    #[serde(default)]
    pub song_list: Vec<WebplaybackSong>,
    pub failure_type: Option<String>,
    pub customer_message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WebplaybackSong {
    #[serde(default)]
    pub assets: Vec<WebplaybackAsset>,
}

#[derive(Debug, Deserialize)]
pub struct WebplaybackAsset {
    pub flavor: String,
    #[serde(rename = "URL")]
    pub url: String,
}

impl WebplaybackResponse {
    /// Assets of the first song. Their protection lives in each asset's playlist.
    pub fn into_variants(self) -> Result<Vec<StreamVariant>, CatalogError> {
        if let Some(failure) = self.failure_type {
            let message = self.customer_message.unwrap_or(failure);
            return Err(CatalogError::PlaybackDenied(message));
        }
        let song = self
            .song_list
            .into_iter()
            .next()
            .ok_or(CatalogError::NoStreamsFound)?;
        Ok(song
            .assets
            .into_iter()
            .map(|a| StreamVariant::new(a.flavor, a.url, Protection::PlaylistKey))
            .collect())
    }
}
