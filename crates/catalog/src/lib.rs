//! Catalog side of the track acquisition pipeline.
//!
//! Validates catalog URLs, resolves them to track metadata and lists the
//! encoded stream variants of a track. Upstream access goes through the
//! [`CatalogService`] trait; [`platforms::apple_music`] is the HTTP backend.

pub mod catalog_url;
pub mod client;
pub mod error;
pub mod extractor;
pub mod hls;
pub mod media;
pub mod platforms;
pub mod resolver;
pub mod service;
pub mod utils;

pub use catalog_url::{CatalogUrl, DEFAULT_CATALOG_HOST, UrlMatcher};
pub use error::CatalogError;
pub use media::{
    CatalogKind, Protection, ProtectionLocator, StreamVariant, TrackId, TrackInfo, TrackMetadata,
};
pub use resolver::Resolver;
pub use service::CatalogService;
