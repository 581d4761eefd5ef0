//! HLS playlist helpers used for variant discovery and segmented downloads.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use m3u8_rs::{KeyMethod, MasterPlaylist, MediaPlaylist, parse_playlist_res};
use tracing::debug;

use crate::error::CatalogError;
use crate::media::{Protection, StreamVariant};
use crate::utils::join_url;

/// KEYFORMAT of Widevine key declarations.
pub const WIDEVINE_KEYFORMAT: &str = "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed";

/// True when `body` looks like an HLS playlist rather than a media file.
pub fn is_playlist(body: &[u8]) -> bool {
    let body = body.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(body);
    let start = body
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(body.len());
    body[start..].starts_with(b"#EXTM3U")
}

/// Download plan extracted from a media playlist, with absolute URLs.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SegmentPlan {
    /// `EXT-X-MAP` initialization section, written before the first segment.
    pub init: Option<String>,
    pub segments: Vec<String>,
    /// URI of the first usable `EXT-X-KEY`, if any.
    pub key_uri: Option<String>,
}

pub fn parse_master_playlist(body: &[u8]) -> Result<MasterPlaylist, CatalogError> {
    match parse_playlist_res(body) {
        Ok(m3u8_rs::Playlist::MasterPlaylist(pl)) => Ok(pl),
        Ok(m3u8_rs::Playlist::MediaPlaylist(_)) => Err(CatalogError::playlist(
            "Expected Master Playlist, got Media",
        )),
        Err(e) => Err(CatalogError::playlist(format!(
            "Failed to parse master playlist: {e}"
        ))),
    }
}

pub fn parse_media_playlist(body: &[u8]) -> Result<MediaPlaylist, CatalogError> {
    match parse_playlist_res(body) {
        Ok(m3u8_rs::Playlist::MediaPlaylist(pl)) => Ok(pl),
        Ok(m3u8_rs::Playlist::MasterPlaylist(_)) => Err(CatalogError::playlist(
            "Expected Media Playlist, got Master",
        )),
        Err(e) => Err(CatalogError::playlist(format!(
            "Failed to parse media playlist: {e}"
        ))),
    }
}

/// Build the download plan of a media playlist fetched from `playlist_url`.
pub fn segment_plan(body: &[u8], playlist_url: &str) -> Result<SegmentPlan, CatalogError> {
    let playlist = parse_media_playlist(body)?;

    let init = playlist
        .segments
        .iter()
        .find_map(|s| s.map.as_ref().map(|m| m.uri.clone()))
        .map(|uri| join_url(playlist_url, &uri));

    let segments = playlist
        .segments
        .iter()
        .map(|s| join_url(playlist_url, &s.uri))
        .collect();

    Ok(SegmentPlan {
        init,
        segments,
        key_uri: first_key_uri(&playlist),
    })
}

/// URI of the first key declaration that actually names a key.
///
/// `METHOD=NONE` entries and keys without a URI are skipped. The URI is
/// returned verbatim since it is a key locator, not a fetchable resource.
pub fn first_key_uri(playlist: &MediaPlaylist) -> Option<String> {
    playlist
        .segments
        .iter()
        .filter_map(|s| s.key.as_ref())
        .filter(|k| k.method != KeyMethod::None)
        .find_map(|k| k.uri.clone().filter(|u| !u.is_empty()))
}

/// Base64 Widevine header carried by the master playlist's session keys.
pub fn widevine_session_header(master: &MasterPlaylist) -> Option<String> {
    master
        .session_key
        .iter()
        .map(|sk| &sk.0)
        .filter(|k| {
            k.keyformat
                .as_deref()
                .is_some_and(|f| f.eq_ignore_ascii_case(WIDEVINE_KEYFORMAT))
        })
        .find_map(|k| k.uri.as_deref().and_then(header_from_data_uri))
}

fn header_from_data_uri(uri: &str) -> Option<String> {
    let payload = match uri.strip_prefix("data:") {
        Some(rest) => rest.split_once(',').map(|(_, data)| data)?,
        None => uri,
    };
    let payload = payload.trim();
    if payload.is_empty() || STANDARD.decode(payload).is_err() {
        debug!("Ignoring undecodable session key payload");
        return None;
    }
    Some(payload.to_string())
}

/// Upstream flavor of an AUDIO group id.
///
/// Lossless groups carry the sample rate and bit depth as a suffix
/// (`audio-alac-stereo-44100-24`); they all map to one flavor.
pub fn flavor_from_group_id(group_id: &str) -> String {
    const ALAC: &str = "audio-alac-stereo";
    if group_id.starts_with(ALAC) {
        return ALAC.to_string();
    }
    group_id.to_string()
}

/// Stream variants listed by an enhanced master playlist, in playlist order.
///
/// Variants without an AUDIO group are skipped; each flavor is listed once.
pub fn variants_from_master(
    body: &[u8],
    master_url: &str,
) -> Result<Vec<StreamVariant>, CatalogError> {
    let master = parse_master_playlist(body)?;
    let protection = match widevine_session_header(&master) {
        Some(header) => Protection::Header(header),
        None => Protection::Unprotected,
    };

    let mut variants: Vec<StreamVariant> = Vec::new();
    for variant in master.variants.iter().filter(|v| !v.is_i_frame) {
        let Some(group) = variant.audio.as_deref() else {
            debug!(uri = %variant.uri, "Skipping variant without audio group");
            continue;
        };
        let flavor = flavor_from_group_id(group);
        if variants.iter().any(|v| v.flavor == flavor) {
            continue;
        }
        variants.push(StreamVariant::new(
            flavor,
            join_url(master_url, &variant.uri),
            protection.clone(),
        ));
    }
    Ok(variants)
}
