//! V4L2 camera.
//!
//! Requests MJPEG from the device (many USB webcams stall on raw formats) and
//! decodes each buffer to RGB8. Devices that refuse MJPEG and hand back RGB3
//! are passed through unchanged.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::{CameraSettings, Frame, FrameSource};

pub struct V4l2Camera {
    settings: CameraSettings,
    state: Option<V4l2State>,
    fourcc: [u8; 4],
    active_width: u32,
    active_height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            active_width: settings.width,
            active_height: settings.height,
            settings,
            state: None,
            fourcc: *b"MJPG",
            frame_count: 0,
        }
    }

    pub fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.settings.device)
            .with_context(|| format!("open v4l2 device {}", self.settings.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.settings.width;
        format.height = self.settings.height;
        format.fourcc = v4l::FourCC::new(b"MJPG");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "camera: failed to set MJPG format on {}: {}",
                    self.settings.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };

        self.fourcc = format.fourcc.repr;
        self.active_width = format.width;
        self.active_height = format.height;

        let state = V4l2StateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);

        log::info!(
            "camera: opened {} ({}x{} {})",
            self.settings.device,
            self.active_width,
            self.active_height,
            String::from_utf8_lossy(&self.fourcc)
        );
        Ok(())
    }

    fn to_frame(&self, buf: &[u8]) -> Result<Frame> {
        match &self.fourcc {
            b"RGB3" => Frame::new(buf.to_vec(), self.active_width, self.active_height),
            b"MJPG" | b"JPEG" => {
                let decoded = image::load_from_memory(buf)
                    .context("decode mjpeg frame")?
                    .to_rgb8();
                let (width, height) = decoded.dimensions();
                Frame::new(decoded.into_raw(), width, height)
            }
            other => Err(anyhow!(
                "unsupported v4l2 pixel format {}",
                String::from_utf8_lossy(other)
            )),
        }
    }
}

impl FrameSource for V4l2Camera {
    fn name(&self) -> String {
        self.settings.device.clone()
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let buf = state
            .with_mut(|fields| fields.stream.next().map(|(buf, _meta)| buf.to_vec()))
            .map_err(|err| anyhow::Error::new(err).context("capture v4l2 frame"))?;

        self.frame_count += 1;
        self.to_frame(&buf)
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "camera: released {} after {} frames",
                self.settings.device,
                self.frame_count
            );
        }
    }
}
