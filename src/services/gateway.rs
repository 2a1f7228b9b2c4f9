//! Interfaces to the external detection, translation and rendering services.

use async_trait::async_trait;

use crate::core::errors::{DetectionResult, RenderingResult, TranslationResult};
use crate::core::types::{OcrConfig, OverlayStyle, PageImage, TextRegion, TranslatedRegion};

/// Finds text regions on a page image.
#[async_trait]
pub trait RegionDetector: Send + Sync + 'static {
    async fn detect_regions(
        &self,
        image: &PageImage,
        config: &OcrConfig,
    ) -> DetectionResult<Vec<TextRegion>>;
}

/// Annotates detected regions with translated text.
///
/// Implementations must return one region per input region, in input order.
#[async_trait]
pub trait RegionTranslator: Send + Sync + 'static {
    async fn translate_regions(
        &self,
        regions: &[TextRegion],
    ) -> TranslationResult<Vec<TranslatedRegion>>;
}

/// Draws translated text over a page image and returns the encoded result.
#[async_trait]
pub trait OverlayCompositor: Send + Sync + 'static {
    async fn render_overlay(
        &self,
        image: &PageImage,
        regions: &[TranslatedRegion],
        style: &OverlayStyle,
    ) -> RenderingResult<Vec<u8>>;
}
