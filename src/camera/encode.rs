use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

use super::Frame;

const QUALITY_STEP: u8 = 10;
const MIN_QUALITY: u8 = 10;

/// JPEG encoder with a hard size ceiling.
///
/// Encodes at the configured quality first; while the result exceeds
/// `max_bytes` the quality is lowered in fixed steps. The same frame and
/// settings always produce the same bytes.
#[derive(Clone, Debug)]
pub struct JpegFrameEncoder {
    quality: u8,
    max_bytes: usize,
}

impl JpegFrameEncoder {
    pub fn new(quality: u8, max_bytes: usize) -> Result<Self> {
        if !(1..=100).contains(&quality) {
            return Err(anyhow!("jpeg quality must be within 1..=100, got {}", quality));
        }
        if max_bytes == 0 {
            return Err(anyhow!("jpeg max_bytes must be greater than zero"));
        }
        Ok(Self { quality, max_bytes })
    }

    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut quality = self.quality;
        loop {
            let bytes = encode_jpeg(frame, quality)?;
            if bytes.len() <= self.max_bytes {
                return Ok(bytes);
            }
            if quality <= MIN_QUALITY {
                return Err(anyhow!(
                    "encoded frame is {} bytes at quality {}, limit is {}",
                    bytes.len(),
                    quality,
                    self.max_bytes
                ));
            }
            log::debug!(
                "jpeg at quality {} is {} bytes (> {}), lowering quality",
                quality,
                bytes.len(),
                self.max_bytes
            );
            quality = quality.saturating_sub(QUALITY_STEP).max(MIN_QUALITY);
        }
    }
}

fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode(
            frame.pixels(),
            frame.width,
            frame.height,
            ExtendedColorType::Rgb8,
        )
        .context("jpeg encode")?;
    Ok(out)
}
