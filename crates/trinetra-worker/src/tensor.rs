//! CPU-side tensor assembly: JPEG decode, batching, face crops.

use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;

use trinetra_core::config::constants::worker;

/// Decode a JPEG payload. `None` means the bytes are corrupted; the caller
/// acks and drops the frame rather than retrying into the same failure.
pub fn decode_jpeg(bytes: &[u8]) -> Option<RgbImage> {
    image::load_from_memory(bytes).ok().map(|img| img.to_rgb8())
}

/// Stack decoded frames into the detector's `(B, 3, H, W)` input, scaled
/// to [0, 1].
pub fn frames_to_tensor(frames: &[RgbImage]) -> Array4<f32> {
    let (height, width) = frames
        .first()
        .map(|f| (f.height() as usize, f.width() as usize))
        .unwrap_or((0, 0));
    let mut tensor = Array4::<f32>::zeros((frames.len(), 3, height, width));
    for (b, frame) in frames.iter().enumerate() {
        for (x, y, pixel) in frame.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[b, 0, y, x]] = f32::from(pixel[0]) / 255.0;
            tensor[[b, 1, y, x]] = f32::from(pixel[1]) / 255.0;
            tensor[[b, 2, y, x]] = f32::from(pixel[2]) / 255.0;
        }
    }
    tensor
}

/// Extract the face region of a detection, resized to 112x112. Returns
/// `None` when the clamped box has no area (detections at the frame edge).
pub fn face_crop(frame: &RgbImage, bbox: [f32; 4]) -> Option<RgbImage> {
    let (w, h) = (frame.width() as f32, frame.height() as f32);
    let x1 = bbox[0].clamp(0.0, w) as u32;
    let y1 = bbox[1].clamp(0.0, h) as u32;
    let x2 = bbox[2].clamp(0.0, w) as u32;
    let y2 = bbox[3].clamp(0.0, h) as u32;
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    let crop = image::imageops::crop_imm(frame, x1, y1, x2 - x1, y2 - y1).to_image();
    Some(image::imageops::resize(
        &crop,
        worker::CROP_EDGE,
        worker::CROP_EDGE,
        FilterType::Triangle,
    ))
}

/// Stack face crops into the embedder's `(C, 3, 112, 112)` input with the
/// midpoint normalization `(x - 127.5) / 127.5`, range [-1, 1]. Using any
/// other normalization silently degrades embedding quality.
pub fn crops_to_tensor(crops: &[RgbImage]) -> Array4<f32> {
    let edge = worker::CROP_EDGE as usize;
    let mid = worker::CROP_NORM_MIDPOINT;
    let mut tensor = Array4::<f32>::zeros((crops.len(), 3, edge, edge));
    for (c, crop) in crops.iter().enumerate() {
        for (x, y, pixel) in crop.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            tensor[[c, 0, y, x]] = (f32::from(pixel[0]) - mid) / mid;
            tensor[[c, 1, y, x]] = (f32::from(pixel[1]) - mid) / mid;
            tensor[[c, 2, y, x]] = (f32::from(pixel[2]) - mid) / mid;
        }
    }
    tensor
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_frame(edge: u32, value: u8) -> RgbImage {
        RgbImage::from_pixel(edge, edge, image::Rgb([value, value, value]))
    }

    fn jpeg_of(frame: &RgbImage) -> Vec<u8> {
        let mut out = Vec::new();
        image::codecs::jpeg::JpegEncoder::new_with_quality(&mut out, 85)
            .encode_image(frame)
            .unwrap();
        out
    }

    #[test]
    fn decode_round_trip() {
        let jpeg = jpeg_of(&test_frame(64, 100));
        let decoded = decode_jpeg(&jpeg).unwrap();
        assert_eq!(decoded.width(), 64);
    }

    #[test]
    fn garbage_bytes_decode_to_none() {
        assert!(decode_jpeg(&[0xDE, 0xAD, 0xBE, 0xEF]).is_none());
    }

    #[test]
    fn frame_tensor_is_unit_scaled() {
        let tensor = frames_to_tensor(&[test_frame(8, 255), test_frame(8, 0)]);
        assert_eq!(tensor.shape(), &[2, 3, 8, 8]);
        assert_eq!(tensor[[0, 0, 0, 0]], 1.0);
        assert_eq!(tensor[[1, 0, 0, 0]], 0.0);
    }

    #[test]
    fn crop_tensor_is_midpoint_normalized() {
        let crops = vec![test_frame(112, 255), test_frame(112, 0)];
        let tensor = crops_to_tensor(&crops);
        assert_eq!(tensor.shape(), &[2, 3, 112, 112]);
        assert!((tensor[[0, 0, 0, 0]] - 1.0).abs() < 1e-5);
        assert!((tensor[[1, 0, 0, 0]] + 1.0).abs() < 1e-5);
    }

    #[test]
    fn face_crop_clamps_and_resizes() {
        let frame = test_frame(640, 100);
        let crop = face_crop(&frame, [-50.0, -50.0, 100.0, 100.0]).unwrap();
        assert_eq!(crop.width(), 112);
        assert_eq!(crop.height(), 112);
    }

    #[test]
    fn degenerate_box_yields_no_crop() {
        let frame = test_frame(640, 100);
        assert!(face_crop(&frame, [700.0, 700.0, 800.0, 800.0]).is_none());
        assert!(face_crop(&frame, [100.0, 100.0, 100.0, 100.0]).is_none());
    }
}
