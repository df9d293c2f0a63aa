use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;

const DEFAULT_INPUT_SIZE: u32 = 300;
const DEFAULT_MAX_DETECTIONS: usize = 10;

/// Backend that answers every frame with a fixed detection list.
///
/// Used for dry runs without a model and for exercising the request path.
pub struct ScriptedBackend {
    detections: Vec<Detection>,
    failure: Option<String>,
    width: u32,
    height: u32,
    max_detections: usize,
    seen: Arc<Mutex<Vec<(u32, u32, usize)>>>,
}

impl ScriptedBackend {
    pub fn new(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            failure: None,
            width: DEFAULT_INPUT_SIZE,
            height: DEFAULT_INPUT_SIZE,
            max_detections: DEFAULT_MAX_DETECTIONS,
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Backend whose every inference pass fails with `message`.
    pub fn failing(message: &str) -> Self {
        let mut backend = Self::new(Vec::new());
        backend.failure = Some(message.to_string());
        backend
    }

    pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    /// Shared record of `(width, height, byte_len)` for each pass.
    pub fn seen_sizes(&self) -> Arc<Mutex<Vec<(u32, u32, usize)>>> {
        self.seen.clone()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_detections(&self) -> usize {
        self.max_detections
    }

    fn infer(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((width, height, rgb.len()));
        }
        if let Some(message) = &self.failure {
            return Err(anyhow!("{}", message));
        }
        Ok(self.detections.clone())
    }
}
