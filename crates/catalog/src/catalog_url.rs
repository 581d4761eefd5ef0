use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::CatalogError;
use crate::media::CatalogKind;

pub const DEFAULT_CATALOG_HOST: &str = "music.apple.com";

pub static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| build_regex(DEFAULT_CATALOG_HOST).unwrap());

fn build_regex(host: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^https?://(?:www\.)?{}/(\w+)/(song|album|playlist)/(?:[^/?#\s]+/)?([^/?#\s]+)",
        regex::escape(host)
    ))
}

/// Validates and classifies catalog URLs for one catalog host.
#[derive(Debug, Clone)]
pub struct UrlMatcher {
    host: String,
    regex: Regex,
}

impl Default for UrlMatcher {
    fn default() -> Self {
        Self {
            host: DEFAULT_CATALOG_HOST.to_string(),
            regex: URL_REGEX.clone(),
        }
    }
}

impl UrlMatcher {
    pub fn with_host(host: &str) -> Result<Self, CatalogError> {
        let host = host.trim().trim_end_matches('/');
        if host.is_empty() {
            return Err(CatalogError::InvalidUrl("empty catalog host".to_string()));
        }
        let regex = build_regex(host).map_err(|e| CatalogError::RegexError(e.to_string()))?;
        Ok(Self {
            host: host.to_string(),
            regex,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn matches(&self, url: &str) -> bool {
        self.regex.is_match(url.trim())
    }

    /// Parse `url` into its storefront, kind and identifier.
    pub fn parse(&self, url: &str) -> Result<CatalogUrl, CatalogError> {
        let url = url.trim();
        let caps = self
            .regex
            .captures(url)
            .ok_or_else(|| CatalogError::InvalidUrl(url.to_string()))?;

        let storefront = caps[1].to_ascii_lowercase();
        let kind = CatalogKind::parse(&caps[2]).ok_or_else(|| CatalogError::InvalidUrl(url.to_string()))?;
        let id = caps[3].to_string();

        // `?i=<song id>` on an album page points at one track of that album.
        let song_id = url::Url::parse(url).ok().and_then(|parsed| {
            parsed
                .query_pairs()
                .find(|(k, v)| k == "i" && !v.is_empty())
                .map(|(_, v)| v.into_owned())
        });

        Ok(CatalogUrl {
            url: url.to_string(),
            storefront,
            kind,
            id,
            song_id,
        })
    }
}

/// A validated catalog URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogUrl {
    pub url: String,
    pub storefront: String,
    pub kind: CatalogKind,
    pub id: String,
    pub song_id: Option<String>,
}

impl CatalogUrl {
    /// The kind and id that should actually be looked up.
    pub fn target(&self) -> (CatalogKind, &str) {
        match (&self.kind, &self.song_id) {
            (CatalogKind::Album, Some(song)) => (CatalogKind::Song, song.as_str()),
            _ => (self.kind, self.id.as_str()),
        }
    }
}
