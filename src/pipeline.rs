//! Request processing: image bytes to a spoken-style response.

use crate::detect::Detector;
use crate::error::DetectError;
use crate::labels::LabelTable;
use crate::locate::{locate_all, LocatorParams};
use crate::protocol::ResponseMessage;
use crate::sentence::{render, Language};

/// Detector, label table, and rendering settings for one server.
pub struct DescribePipeline {
    detector: Detector,
    labels: LabelTable,
    params: LocatorParams,
    language: Language,
}

impl DescribePipeline {
    pub fn new(
        detector: Detector,
        labels: LabelTable,
        params: LocatorParams,
        language: Language,
    ) -> Self {
        Self {
            detector,
            labels,
            params,
            language,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.backend_name()
    }

    /// Run detect, locate, render. Failures become `success=false` responses.
    pub fn respond(&mut self, image_bytes: &[u8]) -> ResponseMessage {
        match self.describe(image_bytes) {
            Ok(response) => response,
            Err(DetectError::Decode(msg)) => {
                ResponseMessage::failure(format!("Image processing error: {msg}"))
            }
            Err(DetectError::Inference(msg)) => {
                ResponseMessage::failure(format!("Inference error: {msg}"))
            }
        }
    }

    fn describe(&mut self, image_bytes: &[u8]) -> Result<ResponseMessage, DetectError> {
        let detections = self.detector.detect(image_bytes)?;
        let mut located = locate_all(&detections, &self.labels, &self.params);
        let object_count = located.len();
        located.truncate(self.params.max_objects);
        log::debug!(
            "{} raw detections, {} located, describing {}",
            detections.len(),
            object_count,
            located.len()
        );
        Ok(ResponseMessage::success(
            render(&located, self.language),
            object_count,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, Detection, ScriptedBackend};
    use image::{ImageBuffer, ImageFormat, Rgb};
    use std::io::Cursor;

    fn png() -> Vec<u8> {
        let img = ImageBuffer::from_pixel(16, 16, Rgb([200u8, 10, 10]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    fn pipeline(backend: ScriptedBackend, max_objects: usize) -> DescribePipeline {
        DescribePipeline::new(
            Detector::new(backend),
            LabelTable::from_entries([(16, "cat"), (17, "dog"), (61, "chair")]),
            LocatorParams {
                confidence_threshold: 0.5,
                left_bound: 0.35,
                right_bound: 0.65,
                max_objects,
            },
            Language::English,
        )
    }

    #[test]
    fn count_covers_all_located_objects_while_sentence_is_capped() {
        let backend = ScriptedBackend::new(vec![
            Detection::new(BoundingBox::new(0.0, 0.0, 0.2, 0.5), 17, 0.8),
            Detection::new(BoundingBox::new(0.4, 0.0, 0.6, 0.5), 16, 0.9),
            Detection::new(BoundingBox::new(0.8, 0.0, 1.0, 0.5), 61, 0.7),
            Detection::new(BoundingBox::new(0.4, 0.0, 0.6, 0.5), 61, 0.1),
        ]);
        let response = pipeline(backend, 2).respond(&png());
        assert!(response.success);
        assert_eq!(response.object_count, 3);
        assert_eq!(
            response.message,
            "I see a cat in front of you and a dog on your left."
        );
    }

    #[test]
    fn undecodable_bytes_yield_failure_response() {
        let response = pipeline(ScriptedBackend::new(vec![]), 3).respond(b"\x00\x01\x02");
        assert!(!response.success);
        assert!(response.message.starts_with("Image processing error"));
    }

    #[test]
    fn nothing_detected_is_still_a_success() {
        let response = pipeline(ScriptedBackend::new(vec![]), 3).respond(&png());
        assert!(response.success);
        assert_eq!(response.object_count, 0);
        assert_eq!(response.message, "I can't see anything clearly.");
    }
}
