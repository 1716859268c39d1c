//! Frame encoding and pixel helpers
//!
//! Frames travel as JPEG. Legacy consumers expect the JPEG bytes wrapped in
//! base64 text, selected through [`PayloadEncoding`].

use crate::core::types::{Frame, Rotation};
use crate::error::{Error, Result};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use serde::{Deserialize, Serialize};

/// How an encoded frame is carried in the frame payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadEncoding {
    /// JPEG bytes
    #[default]
    Jpeg,
    /// Base64 text of the JPEG bytes
    Base64,
}

fn to_rgb_image(frame: &Frame) -> Result<RgbImage> {
    RgbImage::from_raw(frame.width, frame.height, frame.pixels.clone()).ok_or_else(|| {
        Error::Encoding(format!(
            "pixel buffer does not fit {}x{}",
            frame.width, frame.height
        ))
    })
}

/// Encode a frame as JPEG
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let rgb = to_rgb_image(frame)?;
    let mut buffer = Vec::with_capacity(frame.pixels.len() / 8);
    JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100)).encode_image(&rgb)?;
    Ok(buffer)
}

/// Encode a frame into a wire payload
pub fn encode_payload(frame: &Frame, quality: u8, encoding: PayloadEncoding) -> Result<Vec<u8>> {
    let jpeg = encode_jpeg(frame, quality)?;
    Ok(match encoding {
        PayloadEncoding::Jpeg => jpeg,
        PayloadEncoding::Base64 => BASE64.encode(&jpeg).into_bytes(),
    })
}

/// Rotate a frame; width and height swap for quarter turns
pub fn rotate(frame: &Frame, rotation: Rotation) -> Result<Frame> {
    if rotation == Rotation::Deg0 {
        return Ok(frame.clone());
    }
    let rgb = to_rgb_image(frame)?;
    let rotated = match rotation {
        Rotation::Deg0 => rgb,
        Rotation::Deg90 => image::imageops::rotate90(&rgb),
        Rotation::Deg180 => image::imageops::rotate180(&rgb),
        Rotation::Deg270 => image::imageops::rotate270(&rgb),
    };
    let (width, height) = rotated.dimensions();
    Ok(Frame {
        timestamp_ns: frame.timestamp_ns,
        width,
        height,
        pixels: rotated.into_raw(),
    })
}

/// Draw a rectangle outline, clipped to the frame
pub fn draw_rect(frame: &mut Frame, x0: i64, y0: i64, x1: i64, y1: i64, rgb: [u8; 3], thickness: i64) {
    let (w, h) = (frame.width as i64, frame.height as i64);
    for y in y0.max(0)..=y1.min(h - 1) {
        for x in x0.max(0)..=x1.min(w - 1) {
            let on_edge = x - x0 < thickness
                || x1 - x < thickness
                || y - y0 < thickness
                || y1 - y < thickness;
            if on_edge {
                let idx = ((y * w + x) * 3) as usize;
                frame.pixels[idx..idx + 3].copy_from_slice(&rgb);
            }
        }
    }
}
