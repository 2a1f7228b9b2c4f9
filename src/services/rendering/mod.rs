use async_trait::async_trait;
use std::time::Instant;
use tracing::debug;

use crate::core::errors::{RenderingError, RenderingResult};
use crate::core::types::{OverlayMode, OverlayStyle, PageImage, TranslatedRegion};
use crate::services::gateway::OverlayCompositor;
use crate::utils::image_ops::{decode_rgba, encode_png, fill_plate, require_color};

/// Compositor that paints a padded background plate behind every region and
/// returns the page as PNG.
///
/// Glyph layout is left to font-aware compositors, so `font` and
/// `text_color` are not read here, and `OverlayMode::Both` paints the same
/// plates as `Translation`. Only `Original` differs: it paints nothing.
#[derive(Debug, Clone, Default)]
pub struct PlateCompositor;

impl PlateCompositor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl OverlayCompositor for PlateCompositor {
    async fn render_overlay(
        &self,
        image: &PageImage,
        regions: &[TranslatedRegion],
        style: &OverlayStyle,
    ) -> RenderingResult<Vec<u8>> {
        // Reject a bad colour before decoding
        let plate = require_color(&style.background_color)?;

        let start = Instant::now();
        let bytes = image.bytes.clone();
        let boxes: Vec<_> = match style.mode {
            OverlayMode::Original => Vec::new(),
            OverlayMode::Translation | OverlayMode::Both => {
                regions.iter().map(|r| r.bbox).collect()
            }
        };
        let padding = style.padding;

        let png = tokio::task::spawn_blocking(move || {
            let mut canvas = decode_rgba(&bytes)?;
            for bbox in &boxes {
                fill_plate(&mut canvas, bbox, padding, plate);
            }
            encode_png(canvas)
        })
        .await
        .map_err(|e| RenderingError::TaskFailed(e.to_string()))??;

        debug!(
            "Rendered overlay with {} plates in {:.2}ms",
            regions.len(),
            start.elapsed().as_secs_f64() * 1000.0
        );
        Ok(png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TextRegion;
    use image::{Rgba, RgbaImage};

    fn page(width: u32, height: u32) -> PageImage {
        let img = RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 255]));
        PageImage::new(encode_png(img).unwrap())
    }

    fn region(bbox: [i32; 4]) -> TranslatedRegion {
        TranslatedRegion::from_region(TextRegion::new(bbox, "Hola"), "Hello")
    }

    #[tokio::test]
    async fn test_plates_cover_regions() {
        let style = OverlayStyle {
            background_color: "#ffffff".to_string(),
            padding: 0,
            ..OverlayStyle::default()
        };

        let png = PlateCompositor::new()
            .render_overlay(&page(20, 20), &[region([2, 2, 6, 6])], &style)
            .await
            .unwrap();

        let rendered = decode_rgba(&png).unwrap();
        assert_eq!(*rendered.get_pixel(3, 3), Rgba([255, 255, 255, 255]));
        assert_eq!(*rendered.get_pixel(10, 10), Rgba([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_original_mode_leaves_page_untouched() {
        let style = OverlayStyle {
            background_color: "#ffffff".to_string(),
            mode: OverlayMode::Original,
            ..OverlayStyle::default()
        };

        let png = PlateCompositor::new()
            .render_overlay(&page(8, 8), &[region([0, 0, 8, 8])], &style)
            .await
            .unwrap();

        let rendered = decode_rgba(&png).unwrap();
        assert_eq!(*rendered.get_pixel(4, 4), Rgba([0, 0, 0, 255]));
    }

    #[tokio::test]
    async fn test_invalid_color_and_bad_image() {
        let style = OverlayStyle {
            background_color: "not-a-colour".to_string(),
            ..OverlayStyle::default()
        };
        let err = PlateCompositor::new()
            .render_overlay(&page(4, 4), &[], &style)
            .await
            .unwrap_err();
        assert!(matches!(err, RenderingError::InvalidColor(_)));

        let err = PlateCompositor::new()
            .render_overlay(&PageImage::new(vec![1, 2, 3]), &[], &OverlayStyle::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RenderingError::ImageError(_)));
    }

    #[tokio::test]
    async fn test_text_settings_do_not_change_plates() {
        let regions = [region([1, 1, 5, 5])];
        let plain = OverlayStyle {
            background_color: "#ffffff".to_string(),
            ..OverlayStyle::default()
        };
        let both = OverlayStyle {
            text_color: "no colour at all".to_string(),
            mode: OverlayMode::Both,
            ..plain.clone()
        };

        let compositor = PlateCompositor::new();
        let a = compositor.render_overlay(&page(8, 8), &regions, &plain).await.unwrap();
        let b = compositor.render_overlay(&page(8, 8), &regions, &both).await.unwrap();
        assert_eq!(a, b);
    }
}
