use image::imageops::FilterType;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::error::DetectError;

/// Detector adapter: encoded image bytes in, raw detections out.
///
/// Decoding and resizing happen here so every backend sees the same
/// RGB8 buffer at its declared input size.
pub struct Detector {
    backend: Box<dyn DetectorBackend>,
}

impl Detector {
    pub fn new<B: DetectorBackend + 'static>(backend: B) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    pub fn from_boxed(backend: Box<dyn DetectorBackend>) -> Self {
        Self { backend }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn input_size(&self) -> (u32, u32) {
        self.backend.input_size()
    }

    pub fn warm_up(&mut self) -> anyhow::Result<()> {
        self.backend.warm_up()
    }

    /// Decode, resize, run one pass, and cap the output at the backend maximum.
    pub fn detect(&mut self, image_bytes: &[u8]) -> Result<Vec<Detection>, DetectError> {
        let decoded = image::load_from_memory(image_bytes)
            .map_err(|e| DetectError::Decode(e.to_string()))?;
        let (width, height) = self.input_size();
        let mut rgb = decoded.to_rgb8();
        if rgb.width() != width || rgb.height() != height {
            rgb = image::imageops::resize(&rgb, width, height, FilterType::Triangle);
        }

        let mut detections = self
            .backend
            .infer(rgb.as_raw(), width, height)
            .map_err(|e| DetectError::Inference(format!("{e:#}")))?;
        detections.truncate(self.backend.max_detections());
        Ok(detections)
    }
}
