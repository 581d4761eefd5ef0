use std::sync::Arc;

use tracing::{debug, instrument};

use crate::catalog_url::{CatalogUrl, UrlMatcher};
use crate::error::CatalogError;
use crate::media::TrackInfo;
use crate::service::CatalogService;

/// Turns a catalog URL into the ordered list of tracks it names.
#[derive(Clone)]
pub struct Resolver {
    matcher: UrlMatcher,
    service: Arc<dyn CatalogService>,
}

impl Resolver {
    pub fn new(matcher: UrlMatcher, service: Arc<dyn CatalogService>) -> Self {
        Self { matcher, service }
    }

    pub fn service(&self) -> &Arc<dyn CatalogService> {
        &self.service
    }

    pub fn parse(&self, url: &str) -> Result<CatalogUrl, CatalogError> {
        self.matcher.parse(url)
    }

    /// Validate `url` and fetch its tracks. An empty result is an error.
    #[instrument(skip(self), fields(platform = self.service.name()))]
    pub async fn resolve(&self, url: &str) -> Result<Vec<TrackInfo>, CatalogError> {
        let parsed = self.parse(url)?;
        let tracks = self.service.lookup_tracks(&parsed).await?;
        if tracks.is_empty() {
            return Err(CatalogError::TrackNotFound(parsed.url));
        }
        debug!(count = tracks.len(), kind = parsed.kind.as_str(), "Resolved catalog url");
        Ok(tracks)
    }
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("host", &self.matcher.host())
            .field("service", &self.service.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{StreamVariant, TrackId, TrackMetadata};
    use async_trait::async_trait;

    struct FixedCatalog(Vec<TrackInfo>);

    #[async_trait]
    impl CatalogService for FixedCatalog {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn lookup_tracks(&self, _url: &CatalogUrl) -> Result<Vec<TrackInfo>, CatalogError> {
            Ok(self.0.clone())
        }

        async fn stream_variants(&self, _: &TrackId) -> Result<Vec<StreamVariant>, CatalogError> {
            Ok(Vec::new())
        }

        async fn webplayback_variants(
            &self,
            _: &TrackId,
        ) -> Result<Vec<StreamVariant>, CatalogError> {
            Ok(Vec::new())
        }
    }

    fn track(id: &str) -> TrackInfo {
        TrackInfo {
            id: TrackId::new(id),
            metadata: TrackMetadata::default(),
        }
    }

    #[tokio::test]
    async fn resolves_in_upstream_order() {
        let resolver = Resolver::new(
            UrlMatcher::default(),
            Arc::new(FixedCatalog(vec![track("1"), track("2")])),
        );
        let tracks = resolver
            .resolve("https://music.apple.com/us/album/x/99")
            .await
            .unwrap();
        assert_eq!(tracks[0].id.as_str(), "1");
        assert_eq!(tracks[1].id.as_str(), "2");
    }

    #[tokio::test]
    async fn empty_lookup_is_an_error() {
        let resolver = Resolver::new(UrlMatcher::default(), Arc::new(FixedCatalog(Vec::new())));
        let err = resolver
            .resolve("https://music.apple.com/us/song/x/1")
            .await
            .unwrap_err();
        assert!(matches!(err, CatalogError::TrackNotFound(_)));
    }

    #[tokio::test]
    async fn invalid_url_never_reaches_service() {
        let resolver = Resolver::new(UrlMatcher::default(), Arc::new(FixedCatalog(vec![track("1")])));
        let err = resolver.resolve("https://example.com/nope").await.unwrap_err();
        assert!(matches!(err, CatalogError::InvalidUrl(_)));
    }
}
