//! Converts rendered BGRA buffers into PNG files

use std::path::Path;

use anyhow::{Context, Result, bail};
use image::RgbaImage;

use crate::pdf::{BYTES_PER_PIXEL, BufferDimensions};

/// Builds an opaque RGBA image from a BGRA buffer, blending every pixel
/// over `background` (a BGRA word).
pub fn to_rgba_image(
    pixels: &[u8],
    dimensions: BufferDimensions,
    background: u32,
) -> Result<RgbaImage> {
    let BufferDimensions {
        width,
        height,
        stride,
    } = dimensions;
    if width <= 0 || height <= 0 {
        bail!("cannot export an empty {width}x{height} image");
    }
    if stride < width * BYTES_PER_PIXEL || pixels.len() < dimensions.byte_len() {
        bail!(
            "buffer of {} bytes is too small for {width}x{height} with stride {stride}",
            pixels.len()
        );
    }

    let [bg_b, bg_g, bg_r, _] = background.to_le_bytes();
    let row_bytes = (width * BYTES_PER_PIXEL) as usize;
    let mut out = Vec::with_capacity(row_bytes * height as usize);
    for row in pixels.chunks(stride as usize).take(height as usize) {
        for px in row[..row_bytes].chunks_exact(4) {
            let alpha = u16::from(px[3]);
            out.extend_from_slice(&[
                blend(px[2], bg_r, alpha),
                blend(px[1], bg_g, alpha),
                blend(px[0], bg_b, alpha),
                0xFF,
            ]);
        }
    }

    RgbaImage::from_raw(width as u32, height as u32, out)
        .context("pixel count does not match image size")
}

fn blend(src: u8, bg: u8, alpha: u16) -> u8 {
    let mixed = u16::from(src) * alpha + u16::from(bg) * (255 - alpha);
    ((mixed + 127) / 255) as u8
}

pub fn save_png(
    pixels: &[u8],
    dimensions: BufferDimensions,
    background: u32,
    path: &Path,
) -> Result<()> {
    let image = to_rgba_image(pixels, dimensions, background)?;
    image
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("Failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn swaps_channels_and_fills_transparent_pixels() {
        // Row 0: opaque blue, transparent. Row 1 padded to stride 12.
        let pixels = [
            0xFF, 0x00, 0x00, 0xFF, 0x00, 0x00, 0x00, 0x00, 9, 9, 9, 9, //
            0x00, 0x00, 0xFF, 0xFF, 0x00, 0xFF, 0x00, 0xFF, 9, 9, 9, 9,
        ];
        let dims = BufferDimensions {
            width: 2,
            height: 2,
            stride: 12,
        };
        let image = to_rgba_image(&pixels, dims, 0xFF10_2030).unwrap();

        assert_eq!(image.get_pixel(0, 0).0, [0x00, 0x00, 0xFF, 0xFF]);
        assert_eq!(image.get_pixel(1, 0).0, [0x10, 0x20, 0x30, 0xFF]);
        assert_eq!(image.get_pixel(0, 1).0, [0xFF, 0x00, 0x00, 0xFF]);
        assert_eq!(image.get_pixel(1, 1).0, [0x00, 0xFF, 0x00, 0xFF]);
    }

    #[test]
    fn rejects_short_buffers() {
        let dims = BufferDimensions::packed(4, 4);
        assert!(to_rgba_image(&[0; 16], dims, 0).is_err());
        assert!(to_rgba_image(&[], BufferDimensions::packed(0, 0), 0).is_err());
    }

    #[test]
    fn writes_a_png() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("out.png");
        let dims = BufferDimensions::packed(3, 2);
        save_png(&[0xFF; 24], dims, 0, &path).unwrap();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (3, 2));
    }
}
