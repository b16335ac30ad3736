//! Image post-processing applied to each rasterized slide.
//!
//! The stages run in this order: [`make_background_transparent`],
//! [`erase_region`], [`autocrop`], [`downscale`]. All of them work on RGBA8
//! buffers so the alpha channel is always present in the output.

use crate::types::RelativeBox;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Rgba, RgbaImage};

/// Channel value above which a pixel counts as background white.
pub const WHITE_THRESHOLD: u8 = 250;

/// Size of the placeholder crop returned for fully transparent images.
pub const EMPTY_CROP_SIZE: u32 = 100;

/// Fully transparent white, used for every erased pixel.
const TRANSPARENT_WHITE: Rgba<u8> = Rgba([255, 255, 255, 0]);

/// Promote any decoded image to RGBA8.
pub fn to_rgba(image: DynamicImage) -> RgbaImage {
    image.into_rgba8()
}

/// Make near-white pixels fully transparent.
///
/// A pixel whose red, green and blue values all exceed [`WHITE_THRESHOLD`]
/// becomes transparent white. Every other pixel keeps its color and alpha.
/// This is a per-pixel test, so white areas enclosed by content are cleared
/// as well.
pub fn make_background_transparent(mut image: RgbaImage) -> RgbaImage {
    for pixel in image.pixels_mut() {
        let [r, g, b, _] = pixel.0;
        if r > WHITE_THRESHOLD && g > WHITE_THRESHOLD && b > WHITE_THRESHOLD {
            *pixel = TRANSPARENT_WHITE;
        }
    }
    image
}

/// Pixel rectangle `[x, x + width) × [y, y + height)` inside an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    /// Whether the rectangle covers no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Map a relative box onto an image of `image_width × image_height`, grow it
/// by `margin` pixels on every side and clamp it to the image.
///
/// Returns `None` when nothing of the rectangle lies inside the image.
pub fn region_to_pixels(
    bbox: &RelativeBox,
    image_width: u32,
    image_height: u32,
    margin: u32,
) -> Option<PixelRect> {
    let w = i64::from(image_width);
    let h = i64::from(image_height);
    let m = i64::from(margin);

    // Float to int casts saturate; keep the margin arithmetic saturating too.
    let x = ((bbox.left * w as f64).floor() as i64).saturating_sub(m);
    let y = ((bbox.top * h as f64).floor() as i64).saturating_sub(m);
    let width = ((bbox.width * w as f64).floor() as i64).saturating_add(2 * m);
    let height = ((bbox.height * h as f64).floor() as i64).saturating_add(2 * m);

    let x = x.max(0);
    let y = y.max(0);
    let width = width.min(w - x);
    let height = height.min(h - y);

    if width <= 0 || height <= 0 {
        return None;
    }

    Some(PixelRect {
        x: x as u32,
        y: y as u32,
        width: width as u32,
        height: height as u32,
    })
}

/// Clear the area of a relative box, plus `margin` pixels around it.
///
/// The box is scaled to the image's pixel size, which differs from the slide's
/// vector size after rasterization. A missing box leaves the image untouched.
pub fn erase_region(mut image: RgbaImage, bbox: Option<&RelativeBox>, margin: u32) -> RgbaImage {
    let Some(bbox) = bbox else {
        return image;
    };

    let Some(rect) = region_to_pixels(bbox, image.width(), image.height(), margin) else {
        log::debug!("Title region lies outside the image, nothing to erase");
        return image;
    };

    for y in rect.y..rect.y + rect.height {
        for x in rect.x..rect.x + rect.width {
            image.put_pixel(x, y, TRANSPARENT_WHITE);
        }
    }

    image
}

/// Tight bounding box of all pixels with non-zero alpha.
pub fn content_bounds(image: &RgbaImage) -> Option<PixelRect> {
    let mut min_x = u32::MAX;
    let mut min_y = u32::MAX;
    let mut max_x = 0;
    let mut max_y = 0;
    let mut found = false;

    for (x, y, pixel) in image.enumerate_pixels() {
        if pixel.0[3] != 0 {
            found = true;
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }
    }

    found.then(|| PixelRect {
        x: min_x,
        y: min_y,
        width: max_x - min_x + 1,
        height: max_y - min_y + 1,
    })
}

/// Crop to the visible content, keeping `margin` pixels around it.
///
/// A fully transparent image yields a [`EMPTY_CROP_SIZE`] square taken from
/// the origin; any part of that square beyond the source stays transparent.
pub fn autocrop(image: RgbaImage, margin: u32) -> RgbaImage {
    let Some(bounds) = content_bounds(&image) else {
        log::debug!("Image is fully transparent, using {0}x{0} placeholder", EMPTY_CROP_SIZE);
        let mut placeholder = RgbaImage::new(EMPTY_CROP_SIZE, EMPTY_CROP_SIZE);
        for y in 0..EMPTY_CROP_SIZE.min(image.height()) {
            for x in 0..EMPTY_CROP_SIZE.min(image.width()) {
                placeholder.put_pixel(x, y, *image.get_pixel(x, y));
            }
        }
        return placeholder;
    };

    let left = bounds.x.saturating_sub(margin);
    let top = bounds.y.saturating_sub(margin);
    let right = (bounds.x + bounds.width).saturating_add(margin).min(image.width());
    let bottom = (bounds.y + bounds.height).saturating_add(margin).min(image.height());

    imageops::crop_imm(&image, left, top, right - left, bottom - top).to_image()
}

/// Shrink the image to `scale_percent` of its size with Lanczos resampling.
///
/// Scales of 100 or more return the image unchanged. Each side is at least
/// one pixel.
pub fn downscale(image: RgbaImage, scale_percent: u32) -> RgbaImage {
    if scale_percent >= 100 {
        return image;
    }

    let (width, height) = scaled_dimensions(image.width(), image.height(), scale_percent);
    imageops::resize(&image, width, height, FilterType::Lanczos3)
}

/// `floor(dimension * scale / 100)` for both sides, never below 1.
pub fn scaled_dimensions(width: u32, height: u32, scale_percent: u32) -> (u32, u32) {
    let scale = |dim: u32| ((u64::from(dim) * u64::from(scale_percent)) / 100).max(1) as u32;
    (scale(width), scale(height))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPAQUE_RED: Rgba<u8> = Rgba([200, 0, 0, 255]);

    fn blank(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]))
    }

    fn transparent(width: u32, height: u32) -> RgbaImage {
        RgbaImage::from_pixel(width, height, TRANSPARENT_WHITE)
    }

    #[test]
    fn test_to_rgba_promotes_rgb() {
        let rgb = image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]));
        let rgba = to_rgba(DynamicImage::ImageRgb8(rgb));
        assert_eq!(rgba.dimensions(), (3, 2));
        assert_eq!(rgba.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_transparency_threshold() {
        let mut image = RgbaImage::new(5, 1);
        image.put_pixel(0, 0, Rgba([251, 251, 251, 255]));
        image.put_pixel(1, 0, Rgba([250, 255, 255, 255]));
        image.put_pixel(2, 0, Rgba([255, 255, 255, 128]));
        image.put_pixel(3, 0, Rgba([10, 20, 30, 77]));
        image.put_pixel(4, 0, Rgba([252, 253, 254, 255]));

        let result = make_background_transparent(image);

        assert_eq!(result.get_pixel(0, 0), &TRANSPARENT_WHITE);
        assert_eq!(result.get_pixel(1, 0), &Rgba([250, 255, 255, 255]));
        assert_eq!(result.get_pixel(2, 0), &TRANSPARENT_WHITE);
        assert_eq!(result.get_pixel(3, 0), &Rgba([10, 20, 30, 77]));
        assert_eq!(result.get_pixel(4, 0), &TRANSPARENT_WHITE);
    }

    #[test]
    fn test_transparency_every_channel_value() {
        let mut image = RgbaImage::new(256, 1);
        for v in 0..=255u32 {
            image.put_pixel(v, 0, Rgba([v as u8, 255, 255, 200]));
        }

        let result = make_background_transparent(image);

        for v in 0..=255u32 {
            let alpha = result.get_pixel(v, 0).0[3];
            if v > 250 {
                assert_eq!(alpha, 0, "value {}", v);
            } else {
                assert_eq!(alpha, 200, "value {}", v);
            }
        }
    }

    #[test]
    fn test_transparency_clears_enclosed_white() {
        let mut image = RgbaImage::from_pixel(3, 3, OPAQUE_RED);
        image.put_pixel(1, 1, Rgba([255, 255, 255, 255]));

        let result = make_background_transparent(image);

        assert_eq!(result.get_pixel(1, 1).0[3], 0);
        assert_eq!(result.get_pixel(0, 0), &OPAQUE_RED);
    }

    #[test]
    fn test_region_to_pixels_basic() {
        let bbox = RelativeBox { left: 0.1, top: 0.2, width: 0.5, height: 0.1 };
        let rect = region_to_pixels(&bbox, 1000, 500, 15).unwrap();
        assert_eq!(rect, PixelRect { x: 85, y: 85, width: 530, height: 80 });
    }

    #[test]
    fn test_region_to_pixels_clamped() {
        let bbox = RelativeBox { left: 0.0, top: 0.0, width: 1.0, height: 1.0 };
        let rect = region_to_pixels(&bbox, 200, 100, 15).unwrap();
        assert_eq!(rect, PixelRect { x: 0, y: 0, width: 200, height: 100 });

        let bbox = RelativeBox { left: 0.9, top: 0.9, width: 0.5, height: 0.5 };
        let rect = region_to_pixels(&bbox, 200, 100, 10).unwrap();
        assert_eq!(rect, PixelRect { x: 170, y: 80, width: 30, height: 20 });
    }

    #[test]
    fn test_region_to_pixels_never_out_of_bounds() {
        let boxes = [
            RelativeBox { left: -0.5, top: -0.5, width: 2.0, height: 2.0 },
            RelativeBox { left: 0.99, top: 0.99, width: 0.5, height: 0.5 },
            RelativeBox { left: 0.5, top: 0.0, width: 0.0, height: 0.0 },
            RelativeBox { left: 0.0, top: 0.5, width: 1.0, height: 0.01 },
        ];
        for bbox in &boxes {
            for margin in [0, 1, 15, 500] {
                if let Some(rect) = region_to_pixels(bbox, 64, 48, margin) {
                    assert!(rect.x + rect.width <= 64, "{:?} margin {}", bbox, margin);
                    assert!(rect.y + rect.height <= 48, "{:?} margin {}", bbox, margin);
                    assert!(!rect.is_empty());
                }
            }
        }
    }

    #[test]
    fn test_region_outside_image() {
        let bbox = RelativeBox { left: 2.0, top: 2.0, width: 0.1, height: 0.1 };
        assert_eq!(region_to_pixels(&bbox, 100, 100, 5), None);
    }

    #[test]
    fn test_region_to_pixels_extreme_values() {
        let bbox = RelativeBox { left: -1e300, top: 0.0, width: 0.5, height: 0.5 };
        let rect = region_to_pixels(&bbox, 100, 100, 15).unwrap();
        assert_eq!(rect, PixelRect { x: 0, y: 0, width: 80, height: 80 });

        let bbox = RelativeBox { left: 0.1, top: 0.1, width: 1e300, height: f64::INFINITY };
        let rect = region_to_pixels(&bbox, 100, 100, 15).unwrap();
        assert_eq!(rect, PixelRect { x: 0, y: 0, width: 100, height: 100 });

        let bbox = RelativeBox { left: 1e300, top: 0.0, width: 0.5, height: 0.5 };
        assert_eq!(region_to_pixels(&bbox, 100, 100, 15), None);

        let bbox = RelativeBox { left: 0.0, top: 0.0, width: f64::NEG_INFINITY, height: 0.5 };
        assert_eq!(region_to_pixels(&bbox, 100, 100, u32::MAX), None);
    }

    #[test]
    fn test_erase_region_none_is_noop() {
        let image = blank(10, 10);
        let result = erase_region(image.clone(), None, 15);
        assert_eq!(result, image);
    }

    #[test]
    fn test_erase_region_fills_rect() {
        let image = RgbaImage::from_pixel(100, 100, OPAQUE_RED);
        let bbox = RelativeBox { left: 0.2, top: 0.2, width: 0.2, height: 0.1 };

        let result = erase_region(image, Some(&bbox), 5);

        // Erased: x in [15, 45), y in [15, 35)
        assert_eq!(result.get_pixel(15, 15), &TRANSPARENT_WHITE);
        assert_eq!(result.get_pixel(44, 34), &TRANSPARENT_WHITE);
        assert_eq!(result.get_pixel(45, 34), &OPAQUE_RED);
        assert_eq!(result.get_pixel(44, 35), &OPAQUE_RED);
        assert_eq!(result.get_pixel(14, 15), &OPAQUE_RED);
    }

    #[test]
    fn test_erase_region_at_edge() {
        let image = RgbaImage::from_pixel(50, 50, OPAQUE_RED);
        let bbox = RelativeBox { left: 0.8, top: 0.8, width: 0.5, height: 0.5 };

        let result = erase_region(image, Some(&bbox), 15);

        assert_eq!(result.get_pixel(49, 49), &TRANSPARENT_WHITE);
        assert_eq!(result.get_pixel(25, 25), &TRANSPARENT_WHITE);
        assert_eq!(result.get_pixel(24, 24), &OPAQUE_RED);
    }

    #[test]
    fn test_content_bounds() {
        let mut image = transparent(20, 10);
        image.put_pixel(3, 2, OPAQUE_RED);
        image.put_pixel(7, 8, Rgba([0, 0, 0, 1]));

        let bounds = content_bounds(&image).unwrap();
        assert_eq!(bounds, PixelRect { x: 3, y: 2, width: 5, height: 7 });
    }

    #[test]
    fn test_autocrop_tight() {
        let mut image = transparent(40, 30);
        for y in 10..15 {
            for x in 5..25 {
                image.put_pixel(x, y, OPAQUE_RED);
            }
        }

        let cropped = autocrop(image, 0);
        assert_eq!(cropped.dimensions(), (20, 5));
        assert!(cropped.pixels().all(|p| *p == OPAQUE_RED));
    }

    #[test]
    fn test_autocrop_margin_clamped() {
        let mut image = transparent(40, 30);
        image.put_pixel(2, 20, OPAQUE_RED);
        image.put_pixel(30, 27, OPAQUE_RED);

        let cropped = autocrop(image, 5);

        // left 2-5 -> 0, top 20-5 = 15, right 31+5 = 36, bottom 28+5 -> 30
        assert_eq!(cropped.dimensions(), (36, 15));
        assert_eq!(cropped.get_pixel(2, 5), &OPAQUE_RED);
    }

    #[test]
    fn test_autocrop_fully_transparent() {
        let cropped = autocrop(transparent(400, 300), 20);
        assert_eq!(cropped.dimensions(), (EMPTY_CROP_SIZE, EMPTY_CROP_SIZE));
        assert!(cropped.pixels().all(|p| p.0[3] == 0));
    }

    #[test]
    fn test_autocrop_fully_transparent_small_source() {
        let cropped = autocrop(transparent(30, 20), 0);
        assert_eq!(cropped.dimensions(), (EMPTY_CROP_SIZE, EMPTY_CROP_SIZE));
    }

    #[test]
    fn test_downscale_never_upscales() {
        let image = blank(123, 45);
        assert_eq!(downscale(image.clone(), 100).dimensions(), (123, 45));
        assert_eq!(downscale(image, 250).dimensions(), (123, 45));
    }

    #[test]
    fn test_downscale_floor() {
        let image = blank(123, 45);
        assert_eq!(downscale(image.clone(), 50).dimensions(), (61, 22));
        assert_eq!(downscale(image, 20).dimensions(), (24, 9));
    }

    #[test]
    fn test_scaled_dimensions_minimum() {
        assert_eq!(scaled_dimensions(10, 3, 10), (1, 1));
        assert_eq!(scaled_dimensions(1000, 800, 0), (1, 1));
    }

    #[test]
    fn test_downscale_keeps_alpha() {
        let image = transparent(40, 40);
        let result = downscale(image, 50);
        assert_eq!(result.dimensions(), (20, 20));
        assert!(result.pixels().all(|p| p.0[3] == 0));
    }
}
