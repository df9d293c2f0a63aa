//! Vision Narrator
//!
//! A two-process scene narrator for visually impaired users. A client captures
//! camera frames, ships each one as JPEG to a detection server, and speaks the
//! short sentence it gets back ("I see a cat in front of you and a chair on
//! your right.").
//!
//! # Module Structure
//!
//! Server side:
//! - `detect`: object detection backends behind [`DetectorBackend`]
//! - `labels`: class-id to label table loaded from a text file
//! - `locate`: confidence filtering and left/center/right placement
//! - `sentence`: English and Turkish sentence rendering
//! - `pipeline`: detect, locate and render one request
//! - `server`: single-threaded TCP accept loop
//!
//! Client side:
//! - `camera`: frame sources and JPEG encoding
//! - `client`: one request/response exchange per connection
//! - `speech`: speech engines, job supervision and the announcement gate
//! - `narrator`: the capture loop tying the above together
//!
//! Shared: `protocol` (wire format), `config`, `error`.

pub mod camera;
pub mod client;
pub mod config;
pub mod detect;
pub mod error;
pub mod labels;
pub mod locate;
pub mod narrator;
pub mod pipeline;
pub mod protocol;
pub mod sentence;
pub mod server;
pub mod speech;

pub use camera::{open_camera, CameraSettings, Frame, FrameSource, JpegFrameEncoder};
pub use client::DetectionClient;
pub use config::{ClientConfig, ServerConfig};
pub use detect::{BoundingBox, Detection, Detector, DetectorBackend, ScriptedBackend};
#[cfg(feature = "backend-tract")]
pub use detect::{TensorInput, TractBackend};
pub use error::{DetectError, LabelLoadError, NetworkError, NetworkErrorKind, SpeechError};
pub use labels::LabelTable;
pub use locate::{filter_and_locate, LocatedObject, Location, LocatorParams};
pub use narrator::{Clock, IterationOutcome, Narrator, NarratorSettings, SystemClock};
pub use pipeline::DescribePipeline;
pub use protocol::ResponseMessage;
pub use sentence::{render, Language};
pub use server::{handle_connection, DetectionServer, ServerHandle, ServerSettings, SessionOutcome};
pub use speech::{
    should_speak, CancelOutcome, CancelToken, CommandSpeaker, LogSpeaker, SpeechEngine,
    SpeechJob, SpeechState, SpeechSupervisor,
};
