use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
use std::io::Cursor;

use crate::core::errors::{RenderingError, RenderingResult};
use crate::core::types::BoundingBox;

/// Decode page bytes (any enabled format) into RGBA.
pub fn decode_rgba(bytes: &[u8]) -> RenderingResult<RgbaImage> {
    Ok(image::load_from_memory(bytes)?.to_rgba8())
}

/// Encode an RGBA image as PNG bytes.
pub fn encode_png(img: RgbaImage) -> RenderingResult<Vec<u8>> {
    let mut png_bytes = Vec::new();
    DynamicImage::ImageRgba8(img).write_to(&mut Cursor::new(&mut png_bytes), ImageFormat::Png)?;
    Ok(png_bytes)
}

/// Parse the CSS colour notations used by overlay styles.
///
/// Accepts `#rgb`, `#rrggbb`, `#rrggbbaa`, `rgb(r,g,b)`, `rgba(r,g,b,a)` with `a`
/// in `[0, 1]`, and the keywords `white`, `black`, `transparent`.
pub fn parse_css_color(value: &str) -> Option<Rgba<u8>> {
    let value = value.trim().to_ascii_lowercase();

    match value.as_str() {
        "white" => return Some(Rgba([255, 255, 255, 255])),
        "black" => return Some(Rgba([0, 0, 0, 255])),
        "transparent" => return Some(Rgba([0, 0, 0, 0])),
        _ => {}
    }

    if let Some(hex) = value.strip_prefix('#') {
        let digit = |i: usize| u8::from_str_radix(hex.get(i..i + 1)?, 16).ok();
        let pair = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        return match hex.len() {
            3 => Some(Rgba([digit(0)? * 17, digit(1)? * 17, digit(2)? * 17, 255])),
            6 => Some(Rgba([pair(0)?, pair(2)?, pair(4)?, 255])),
            8 => Some(Rgba([pair(0)?, pair(2)?, pair(4)?, pair(6)?])),
            _ => None,
        };
    }

    let (args, has_alpha) = if let Some(rest) = value.strip_prefix("rgba(") {
        (rest.strip_suffix(')')?, true)
    } else if let Some(rest) = value.strip_prefix("rgb(") {
        (rest.strip_suffix(')')?, false)
    } else {
        return None;
    };

    let parts: Vec<&str> = args.split(',').map(str::trim).collect();
    let expected = if has_alpha { 4 } else { 3 };
    if parts.len() != expected {
        return None;
    }
    let r: u8 = parts[0].parse().ok()?;
    let g: u8 = parts[1].parse().ok()?;
    let b: u8 = parts[2].parse().ok()?;
    let a = if has_alpha {
        let alpha: f32 = parts[3].parse().ok()?;
        if !(0.0..=1.0).contains(&alpha) {
            return None;
        }
        (alpha * 255.0).round() as u8
    } else {
        255
    };
    Some(Rgba([r, g, b, a]))
}

/// Paint a plate of `color` over `bbox` grown by `padding`, alpha-blended onto `img`.
///
/// The box is clamped to the image; boxes entirely outside are ignored.
pub fn fill_plate(img: &mut RgbaImage, bbox: &BoundingBox, padding: u32, color: Rgba<u8>) {
    let (img_width, img_height) = img.dimensions();
    let pad = padding as i32;
    let [x1, y1, x2, y2] = *bbox;

    let x1 = (x1 - pad).clamp(0, img_width as i32) as u32;
    let y1 = (y1 - pad).clamp(0, img_height as i32) as u32;
    let x2 = (x2 + pad).clamp(0, img_width as i32) as u32;
    let y2 = (y2 + pad).clamp(0, img_height as i32) as u32;

    let alpha = color[3] as u32;
    for y in y1..y2 {
        for x in x1..x2 {
            let pixel = img.get_pixel_mut(x, y);
            for c in 0..3 {
                pixel[c] =
                    ((color[c] as u32 * alpha + pixel[c] as u32 * (255 - alpha)) / 255) as u8;
            }
            pixel[3] = pixel[3].max(color[3]);
        }
    }
}

/// Ensure a colour string is usable, for surfacing style errors before rendering.
pub fn require_color(value: &str) -> RenderingResult<Rgba<u8>> {
    parse_css_color(value).ok_or_else(|| RenderingError::InvalidColor(value.to_string()))
}
