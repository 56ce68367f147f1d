//! Resize and JPEG encoding for bus payloads.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;

use trinetra_core::config::constants::ingest;
use trinetra_core::error::SourceError;
use trinetra_core::traits::RawFrame;

/// Resize a decoded frame to the 640x640 inference resolution (bilinear)
/// and JPEG-encode it at quality 85.
pub fn resize_and_encode(raw: &RawFrame) -> Result<Vec<u8>, SourceError> {
    let image = RgbImage::from_raw(raw.width, raw.height, raw.pixels.clone())
        .ok_or_else(|| SourceError::Decode("pixel buffer does not match dimensions".into()))?;

    let resized = image::imageops::resize(
        &image,
        ingest::FRAME_EDGE,
        ingest::FRAME_EDGE,
        FilterType::Triangle,
    );

    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, ingest::JPEG_QUALITY)
        .encode_image(&resized)
        .map_err(|e| SourceError::Decode(format!("jpeg encode: {e}")))?;
    Ok(jpeg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_to_jpeg_at_inference_size() {
        let raw = RawFrame {
            width: 320,
            height: 240,
            pixels: (0..320 * 240 * 3).map(|i| (i % 251) as u8).collect(),
            frame_ts: None,
        };
        let jpeg = resize_and_encode(&raw).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "JPEG SOI marker");

        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 640);
        assert_eq!(decoded.height(), 640);
    }

    #[test]
    fn rejects_mismatched_buffer() {
        let raw = RawFrame {
            width: 100,
            height: 100,
            pixels: vec![0; 10],
            frame_ts: None,
        };
        assert!(resize_and_encode(&raw).is_err());
    }
}
