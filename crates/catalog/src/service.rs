use async_trait::async_trait;

use crate::catalog_url::CatalogUrl;
use crate::error::CatalogError;
use crate::media::{StreamVariant, TrackId, TrackInfo};

/// Upstream catalog queries needed to acquire a track.
#[async_trait]
pub trait CatalogService: Send + Sync {
    /// Backend name used in logs.
    fn name(&self) -> &str;

    /// Ordered tracks a catalog URL refers to. Single songs yield one entry.
    async fn lookup_tracks(&self, url: &CatalogUrl) -> Result<Vec<TrackInfo>, CatalogError>;

    /// Variants advertised by the stream-info lookup, in upstream order.
    async fn stream_variants(&self, track: &TrackId) -> Result<Vec<StreamVariant>, CatalogError>;

    /// Variants advertised by the web playback asset list, in upstream order.
    async fn webplayback_variants(
        &self,
        track: &TrackId,
    ) -> Result<Vec<StreamVariant>, CatalogError>;
}
