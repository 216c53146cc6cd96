// src/snapshot.rs
//
// JPEG evidence attached to alerts.

use anyhow::{anyhow, Context, Result};
use image::{ImageBuffer, RgbImage};
use std::io::Cursor;

/// Encode a packed RGB raster as JPEG.
pub fn encode_rgb_to_jpeg(rgb_data: &[u8], width: usize, height: usize, quality: u8) -> Result<Vec<u8>> {
    let expected_len = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| anyhow!("raster dimensions {}x{} overflow", width, height))?;
    let (w, h) = (
        u32::try_from(width).context("raster width exceeds u32")?,
        u32::try_from(height).context("raster height exceeds u32")?,
    );
    if rgb_data.len() < expected_len {
        return Err(anyhow!(
            "raster too short: {} bytes for {}x{}",
            rgb_data.len(),
            width,
            height
        ));
    }

    let img: RgbImage = ImageBuffer::from_raw(w, h, rgb_data[..expected_len].to_vec())
        .ok_or_else(|| anyhow!("invalid raster dimensions {}x{}", width, height))?;

    let mut buf = Cursor::new(Vec::new());
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality);
    img.write_with_encoder(encoder).context("JPEG encoding failed")?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encodes_jpeg_header() {
        let rgb = vec![128u8; 16 * 8 * 3];
        let jpeg = encode_rgb_to_jpeg(&rgb, 16, 8, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xff, 0xd8]);
    }

    #[test]
    fn test_short_raster_rejected() {
        assert!(encode_rgb_to_jpeg(&[0u8; 10], 16, 8, 80).is_err());
    }

    #[test]
    fn test_oversized_dimensions_rejected() {
        assert!(encode_rgb_to_jpeg(&[0u8; 3], usize::MAX / 2, 3, 80).is_err());
    }
}
