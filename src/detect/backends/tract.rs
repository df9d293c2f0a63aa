#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};

/// Numeric format of the model's input tensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TensorInput {
    /// Quantized models take raw `u8` pixels.
    U8,
    /// Float models take pixels scaled to [-1, 1].
    F32,
}

impl TensorInput {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "u8" | "uint8" | "quantized" => Ok(TensorInput::U8),
            "f32" | "float32" | "float" => Ok(TensorInput::F32),
            other => Err(anyhow!("unsupported model input type '{}'", other)),
        }
    }
}

/// Tract-based backend for SSD-style ONNX detection models.
///
/// Expects NHWC input `[1, height, width, 3]` and the usual post-processed
/// outputs: boxes `[1, N, 4]` in `[y_min, x_min, y_max, x_max]` order,
/// classes `[1, N]`, scores `[1, N]`.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    width: u32,
    height: u32,
    input: TensorInput,
    max_detections: usize,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        width: u32,
        height: u32,
        input: TensorInput,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        let datum = match input {
            TensorInput::U8 => u8::datum_type(),
            TensorInput::F32 => f32::datum_type(),
        };
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(datum, tvec!(1, height as usize, width as usize, 3)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        log::info!(
            "tract model {} loaded, input {}x{} {:?}",
            model_path.display(),
            width,
            height,
            input
        );

        Ok(Self {
            model,
            width,
            height,
            input,
            max_detections: 10,
        })
    }

    pub fn with_max_detections(mut self, max: usize) -> Self {
        self.max_detections = max;
        self
    }

    fn build_input(&self, pixels: &[u8], width: u32, height: u32) -> Result<Tensor> {
        if width != self.width || height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                width,
                height,
                self.width,
                self.height
            ));
        }

        let expected_len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;

        if pixels.len() != expected_len {
            return Err(anyhow!(
                "expected {} RGB bytes, received {}",
                expected_len,
                pixels.len()
            ));
        }

        let width = width as usize;
        let shape = (1, height as usize, width, 3);
        let tensor = match self.input {
            TensorInput::U8 => {
                tract_ndarray::Array4::from_shape_fn(shape, |(_, y, x, c)| {
                    pixels[(y * width + x) * 3 + c]
                })
                .into_tensor()
            }
            TensorInput::F32 => {
                tract_ndarray::Array4::from_shape_fn(shape, |(_, y, x, c)| {
                    (pixels[(y * width + x) * 3 + c] as f32 - 127.5) / 127.5
                })
                .into_tensor()
            }
        };
        Ok(tensor)
    }

    fn extract_detections(&self, outputs: TVec<TValue>) -> Result<Vec<Detection>> {
        if outputs.len() < 3 {
            return Err(anyhow!(
                "model produced {} outputs, expected boxes/classes/scores",
                outputs.len()
            ));
        }
        let boxes = flatten_f32(&outputs[0]).context("boxes output")?;
        let classes = flatten_f32(&outputs[1]).context("classes output")?;
        let scores = flatten_f32(&outputs[2]).context("scores output")?;

        let count = scores
            .len()
            .min(classes.len())
            .min(boxes.len() / 4)
            .min(self.max_detections);

        let detections = (0..count)
            .map(|i| {
                let b = &boxes[i * 4..i * 4 + 4];
                Detection::new(
                    BoundingBox::from_yxyx([b[0], b[1], b[2], b[3]]),
                    classes[i].max(0.0) as u32,
                    scores[i],
                )
            })
            .collect();
        Ok(detections)
    }
}

fn flatten_f32(tensor: &Tensor) -> Result<Vec<f32>> {
    let cast = tensor
        .cast_to::<f32>()
        .context("output tensor not convertible to f32")?;
    let view = cast
        .to_array_view::<f32>()
        .context("output tensor was not f32")?;
    Ok(view.iter().copied().collect())
}

impl DetectorBackend for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn max_detections(&self) -> usize {
        self.max_detections
    }

    fn infer(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let input = self.build_input(rgb, width, height)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.extract_detections(outputs)
    }
}
