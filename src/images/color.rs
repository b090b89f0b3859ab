//! Background color extraction for cover icons.
//!
//! After a bunch of experimentation the best estimator of an icon's
//! background turned out to be the median edge color: the middle-most
//! color, by RGB vector length, of all opaque pixels found on the image
//! border. A median resists a minority of foreground-colored edge pixels
//! where a mean would smear them in, and it is deterministic.

use image::{Rgba, RgbaImage};

/// Pixels with alpha below `255 * threshold` count as transparent.
const MIN_OPACITY: f32 = 0.8;

fn is_transparent(pixel: Rgba<u8>, threshold: f32) -> bool {
    (pixel[3] as f32) < 255.0 * threshold
}

/// Euclidean length of the RGB vector; alpha is ignored.
fn color_length(pixel: Rgba<u8>) -> f64 {
    let [r, g, b, _] = pixel.0;
    ((r as f64).powi(2) + (g as f64).powi(2) + (b as f64).powi(2)).sqrt()
}

/// `#rrggbb` encoding; alpha is dropped.
fn hex_color(pixel: Rgba<u8>) -> String {
    format!("#{:02x}{:02x}{:02x}", pixel[0], pixel[1], pixel[2])
}

/// Walk inward from an edge pixel one step at a time until an opaque pixel
/// is found; a ray that exits the image contributes nothing.
fn find_non_transparent(
    image: &RgbaImage,
    start: (i64, i64),
    step: (i64, i64),
) -> Option<Rgba<u8>> {
    let (width, height) = (image.width() as i64, image.height() as i64);
    let (mut x, mut y) = start;
    loop {
        let pixel = *image.get_pixel(x as u32, y as u32);
        if !is_transparent(pixel, MIN_OPACITY) {
            return Some(pixel);
        }
        x += step.0;
        y += step.1;
        if x < 0 || y < 0 || x >= width || y >= height {
            return None;
        }
    }
}

/// Dominant background color of a decoded icon, or `None` when no border
/// ray finds an opaque pixel.
///
/// Scans every border pixel: both vertical edges across all rows and both
/// horizontal edges across all columns, each ray walking inward. The
/// collected colors are sorted by RGB vector length and the median is
/// hex-encoded.
pub fn background_color(image: &RgbaImage) -> Option<String> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }
    let (width, height) = (image.width() as i64, image.height() as i64);
    let mut colors = Vec::new();

    for y in 0..height {
        if let Some(c) = find_non_transparent(image, (0, y), (1, 0)) {
            colors.push(c);
        }
        if let Some(c) = find_non_transparent(image, (width - 1, y), (-1, 0)) {
            colors.push(c);
        }
    }
    for x in 0..width {
        if let Some(c) = find_non_transparent(image, (x, 0), (0, 1)) {
            colors.push(c);
        }
        if let Some(c) = find_non_transparent(image, (x, height - 1), (0, -1)) {
            colors.push(c);
        }
    }

    if colors.is_empty() {
        return None;
    }
    colors.sort_by(|a, b| {
        color_length(*a)
            .partial_cmp(&color_length(*b))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Some(hex_color(colors[colors.len() / 2]))
}
