use std::path::Path;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::sync::OnceCell;
use tracing::{debug, instrument};

use super::models::{CatalogResponse, WebplaybackResponse};
use crate::catalog_url::CatalogUrl;
use crate::error::CatalogError;
use crate::extractor::Extractor;
use crate::hls::variants_from_master;
use crate::media::{CatalogKind, StreamVariant, TrackId, TrackInfo};
use crate::service::CatalogService;
use crate::utils::capture_group_1_owned;

pub const DEFAULT_API_BASE: &str = "https://amp-api.music.apple.com";
pub const DEFAULT_WEB_BASE: &str = "https://music.apple.com";
pub const DEFAULT_WEBPLAYBACK_URL: &str =
    "https://play.itunes.apple.com/WebObjects/MZPlay.woa/wa/webPlayback";

const MEDIA_USER_TOKEN: &str = "media-user-token";

static INDEX_JS_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"/(assets/index(?:-legacy)?[~-][^/"]+\.js)"#).unwrap());
static TOKEN_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r#"(eyJh[^"]*)"#).unwrap());

/// Endpoints and session settings of the catalog backend.
#[derive(Debug, Clone)]
pub struct AppleMusicConfig {
    pub api_base: String,
    pub web_base: String,
    pub webplayback_url: String,
    /// Storefront used for stream lookups that carry no URL.
    pub storefront: String,
    pub language: String,
    /// Bearer token for the catalog API; discovered from the web app when `None`.
    pub developer_token: Option<String>,
}

impl Default for AppleMusicConfig {
    fn default() -> Self {
        Self {
            api_base: DEFAULT_API_BASE.to_string(),
            web_base: DEFAULT_WEB_BASE.to_string(),
            webplayback_url: DEFAULT_WEBPLAYBACK_URL.to_string(),
            storefront: "us".to_string(),
            language: "en-US".to_string(),
            developer_token: None,
        }
    }
}

pub struct AppleMusicApi {
    extractor: Extractor,
    config: AppleMusicConfig,
    token: OnceCell<String>,
}

impl AppleMusicApi {
    pub fn new(config: AppleMusicConfig, client: Client) -> Self {
        let mut extractor = Extractor::new("AppleMusic", client);
        extractor.set_origin_and_referer(config.web_base.trim_end_matches('/'));

        let token = OnceCell::new();
        if let Some(configured) = config.developer_token.clone().filter(|t| !t.is_empty()) {
            // A fresh cell cannot already be set.
            let _ = token.set(configured);
        }

        Self {
            extractor,
            config,
            token,
        }
    }

    /// Load the session cookies and forward the user token header.
    pub async fn load_cookies(&mut self, path: &Path) -> Result<usize, CatalogError> {
        let count = self
            .extractor
            .load_netscape_cookies(path, "apple.com")
            .await?;
        self.apply_user_token();
        Ok(count)
    }

    pub fn set_cookies_from_string(&mut self, cookies: &str) {
        self.extractor.set_cookies_from_string(cookies);
        self.apply_user_token();
    }

    fn apply_user_token(&mut self) {
        if let Some(token) = self.extractor.get_cookie(MEDIA_USER_TOKEN).cloned() {
            self.extractor.add_header("Media-User-Token", token);
        }
    }

    async fn developer_token(&self) -> Result<&str, CatalogError> {
        self.token
            .get_or_try_init(|| self.discover_token())
            .await
            .map(String::as_str)
    }

    /// Scrape the developer token out of the web app bundle.
    #[instrument(skip(self))]
    async fn discover_token(&self) -> Result<String, CatalogError> {
        let web_base = self.config.web_base.trim_end_matches('/');
        let home = self.send_text(self.extractor.get(web_base)).await?;
        let script = capture_group_1_owned(&INDEX_JS_REGEX, &home).ok_or(CatalogError::TokenNotFound)?;
        let bundle = self
            .send_text(self.extractor.get(&format!("{web_base}/{script}")))
            .await?;
        let token = capture_group_1_owned(&TOKEN_REGEX, &bundle).ok_or(CatalogError::TokenNotFound)?;
        debug!(script = %script, "Discovered developer token");
        Ok(token)
    }

    async fn authorized(&self, builder: RequestBuilder) -> Result<RequestBuilder, CatalogError> {
        let token = self.developer_token().await?;
        Ok(builder.bearer_auth(token))
    }

    async fn checked(builder: RequestBuilder) -> Result<Response, CatalogError> {
        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let url = response.url().to_string();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(CatalogError::TrackNotFound(url));
            }
            return Err(CatalogError::http_status(status, url));
        }
        Ok(response)
    }

    async fn send_text(&self, builder: RequestBuilder) -> Result<String, CatalogError> {
        Ok(Self::checked(builder).await?.text().await?)
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, CatalogError> {
        let body = Self::checked(builder).await?.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    fn catalog_url(&self, storefront: &str, kind: CatalogKind, id: &str) -> String {
        format!(
            "{}/v1/catalog/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            storefront,
            kind.api_collection(),
            id
        )
    }

    async fn fetch_resource(
        &self,
        storefront: &str,
        kind: CatalogKind,
        id: &str,
    ) -> Result<CatalogResponse, CatalogError> {
        let url = self.catalog_url(storefront, kind, id);
        let mut query = vec![("l", self.config.language.as_str())];
        if kind == CatalogKind::Song {
            query.push(("extend", "extendedAssetUrls"));
        }
        let builder = self.authorized(self.extractor.get(&url).query(&query)).await?;
        self.send_json(builder).await
    }
}

#[async_trait]
impl CatalogService for AppleMusicApi {
    fn name(&self) -> &str {
        &self.extractor.platform_name
    }

    #[instrument(skip(self, url), fields(url = %url.url))]
    async fn lookup_tracks(&self, url: &CatalogUrl) -> Result<Vec<TrackInfo>, CatalogError> {
        let (kind, id) = url.target();
        let response = self.fetch_resource(&url.storefront, kind, id).await?;
        let Some(resource) = response.data.into_iter().next() else {
            return Ok(Vec::new());
        };

        let tracks = match kind {
            CatalogKind::Song => vec![resource.track_info(None)],
            CatalogKind::Album | CatalogKind::Playlist => resource.song_tracks(),
        };
        debug!(count = tracks.len(), "Catalog lookup finished");
        Ok(tracks)
    }

    #[instrument(skip(self))]
    async fn stream_variants(&self, track: &TrackId) -> Result<Vec<StreamVariant>, CatalogError> {
        let response = self
            .fetch_resource(&self.config.storefront, CatalogKind::Song, track.as_str())
            .await?;
        let master_url = response
            .data
            .first()
            .and_then(|r| r.enhanced_hls())
            .map(str::to_string)
            .ok_or(CatalogError::NoStreamsFound)?;

        let body = Self::checked(self.extractor.get(&master_url))
            .await?
            .bytes()
            .await?;
        let variants = variants_from_master(&body, &master_url)?;
        debug!(count = variants.len(), "Parsed master playlist variants");
        Ok(variants)
    }

    #[instrument(skip(self))]
    async fn webplayback_variants(
        &self,
        track: &TrackId,
    ) -> Result<Vec<StreamVariant>, CatalogError> {
        let builder = self
            .authorized(
                self.extractor
                    .post(&self.config.webplayback_url)
                    .json(&json!({ "salableAdamId": track.as_str(), "language": self.config.language })),
            )
            .await?;
        let response: WebplaybackResponse = self.send_json(builder).await?;
        response.into_variants()
    }
}
