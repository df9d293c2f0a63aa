use anyhow::Result;

use crate::detect::result::Detection;

/// Opaque inference engine behind the detector adapter.
///
/// Backends receive tightly packed RGB8 pixels already resized to
/// [`DetectorBackend::input_size`]. Tensor layout and numeric format
/// (quantized `u8` or `f32`) stay inside the implementation.
///
/// Inference engines are frequently unsafe to call concurrently on one
/// instance, hence `&mut self`; shared use goes through a `Mutex`.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Model input `(width, height)`, fixed at load time.
    fn input_size(&self) -> (u32, u32);

    /// Upper bound on the detections one pass may return.
    fn max_detections(&self) -> usize;

    /// Run one inference pass. Output is unsorted.
    fn infer(&mut self, rgb: &[u8], width: u32, height: u32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
