use anyhow::Result;

use super::{CameraSettings, Frame, FrameSource};

/// Synthetic camera for `stub://` devices.
///
/// Produces a gradient background with a bright block that drifts across the
/// frame, plus a little sensor noise so consecutive frames differ.
pub struct SyntheticCamera {
    settings: CameraSettings,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(settings: CameraSettings) -> Self {
        log::info!("camera: opened {} (synthetic)", settings.device);
        Self {
            settings,
            frame_count: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let width = self.settings.width as usize;
        let height = self.settings.height as usize;
        let mut pixels = vec![0u8; width * height * 3];

        let block = (width / 5).max(1);
        let block_x = (self.frame_count as usize * 4) % width.max(1);
        let block_y = height / 3;

        for y in 0..height {
            for x in 0..width {
                let offset = (y * width + x) * 3;
                let in_block = x >= block_x && x < block_x + block && y >= block_y && y < block_y + block;
                let base = if in_block {
                    [240u8, 240, 240]
                } else {
                    [
                        ((x * 255) / width.max(1)) as u8,
                        ((y * 255) / height.max(1)) as u8,
                        96,
                    ]
                };
                let noise = rand::random::<u8>() % 8;
                for c in 0..3 {
                    pixels[offset + c] = base[c].saturating_add(noise);
                }
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticCamera {
    fn name(&self) -> String {
        self.settings.device.clone()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Frame::new(pixels, self.settings.width, self.settings.height)
    }

    fn release(&mut self) {
        log::info!("camera: released {}", self.settings.device);
    }
}
