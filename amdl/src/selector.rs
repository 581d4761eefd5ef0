//! Variant selection by codec preference.

use catalog_parser::{CatalogService, StreamVariant, TrackId};
use tracing::debug;

use crate::codec::{CodecFamily, SongCodec};
use crate::error::{PipelineError, VariantNotFoundError};

/// First variant whose flavor is exactly `flavor`, scanning in upstream order.
pub fn select_variant(
    variants: Vec<StreamVariant>,
    flavor: &str,
) -> Result<StreamVariant, VariantNotFoundError> {
    let available: Vec<String> = variants.iter().map(|v| v.flavor.clone()).collect();
    variants
        .into_iter()
        .find(|v| v.flavor == flavor)
        .ok_or_else(|| VariantNotFoundError {
            flavor: flavor.to_string(),
            available,
        })
}

/// Query the variants for `codec`'s family and pick the matching one.
///
/// Modern codecs list variants through the stream-info lookup, legacy codecs
/// through the web playback assets.
pub async fn select(
    catalog: &dyn CatalogService,
    track: &TrackId,
    codec: SongCodec,
) -> Result<StreamVariant, PipelineError> {
    let variants = match codec.family() {
        CodecFamily::Modern => catalog.stream_variants(track).await,
        CodecFamily::Legacy => catalog.webplayback_variants(track).await,
    }
    .map_err(PipelineError::VariantLookup)?;

    debug!(
        count = variants.len(),
        wanted = codec.flavor(),
        "Listed stream variants"
    );
    Ok(select_variant(variants, codec.flavor())?)
}
