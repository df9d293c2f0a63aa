//! Frame capture for the client.
//!
//! Sources:
//! - `stub://<name>` synthetic camera (always available, used by tests and dry runs)
//! - `/dev/videoN` V4L2 devices (feature: ingest-v4l2)
//!
//! Capture failures are reported per frame; the capture loop retries after a
//! short delay instead of giving up.

mod encode;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

use anyhow::{anyhow, Result};

pub use encode::JpegFrameEncoder;
pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

/// One captured frame, tightly packed RGB8.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(pixels: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "RGB frame length mismatch: expected {}, got {}",
                expected,
                pixels.len()
            ));
        }
        Ok(Self {
            pixels,
            width,
            height,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }
}

/// Anything that yields frames on demand.
pub trait FrameSource {
    fn name(&self) -> String;

    fn next_frame(&mut self) -> Result<Frame>;

    /// Release the device. Called once on shutdown; dropping must also release.
    fn release(&mut self) {}
}

/// Configuration for a camera.
#[derive(Clone, Debug)]
pub struct CameraSettings {
    /// `stub://name` or a device path such as `/dev/video0`.
    pub device: String,
    pub width: u32,
    pub height: u32,
}

impl CameraSettings {
    /// Device path for a numeric camera index.
    pub fn device_for_index(index: u32) -> String {
        format!("/dev/video{index}")
    }
}

/// Open the camera named by `settings.device`.
pub fn open_camera(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    if settings.device.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(settings.clone())));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        let mut camera = V4l2Camera::new(settings.clone());
        camera.connect()?;
        Ok(Box::new(camera))
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!(
            "camera {} requires the ingest-v4l2 feature",
            settings.device
        ))
    }
}
