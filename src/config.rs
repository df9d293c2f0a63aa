use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::camera::CameraSettings;
use crate::locate::LocatorParams;
use crate::server::ServerSettings;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:12345";
const DEFAULT_SERVER_ADDR: &str = "localhost:12345";
const DEFAULT_MAX_REQUEST_BYTES: usize = 8 * 1024 * 1024;
const DEFAULT_SOCKET_TIMEOUT_MS: u64 = 5_000;
const DEFAULT_MODEL_PATH: &str = "ssd_mobilenet_v1.onnx";
const DEFAULT_LABELS_PATH: &str = "labels.txt";
const DEFAULT_BACKEND: &str = "tract";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_MODEL_INPUT_TYPE: &str = "u8";
const DEFAULT_MODEL_MAX_DETECTIONS: usize = 10;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_LEFT_BOUND: f32 = 0.35;
const DEFAULT_RIGHT_BOUND: f32 = 0.65;
const DEFAULT_MAX_OBJECTS: usize = 3;
const DEFAULT_LANGUAGE: &str = "en";
const DEFAULT_CAMERA_INDEX: u32 = 0;
const DEFAULT_CAMERA_WIDTH: u32 = 640;
const DEFAULT_CAMERA_HEIGHT: u32 = 480;
const DEFAULT_LOOP_DELAY_MS: u64 = 1_000;
const DEFAULT_CAMERA_RETRY_MS: u64 = 1_000;
const DEFAULT_REFUSED_RETRY_MS: u64 = 2_000;
const DEFAULT_JPEG_QUALITY: u8 = 80;
const DEFAULT_JPEG_MAX_BYTES: usize = 2 * 1024 * 1024;
const DEFAULT_SPEECH_ENGINE: &str = "espeak";
const DEFAULT_COOLDOWN_MS: u64 = 1_500;
const DEFAULT_CANCEL_GRACE_MS: u64 = 2_000;

#[derive(Debug, Deserialize, Default)]
struct NarratorConfigFile {
    language: Option<String>,
    server: Option<ServerConfigFile>,
    model: Option<ModelConfigFile>,
    detection: Option<DetectionConfigFile>,
    client: Option<ClientConfigFile>,
    camera: Option<CameraConfigFile>,
    encoding: Option<EncodingConfigFile>,
    speech: Option<SpeechConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    bind_addr: Option<String>,
    max_request_bytes: Option<usize>,
    socket_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    backend: Option<String>,
    path: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    input_type: Option<String>,
    max_detections: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    confidence_threshold: Option<f32>,
    left_bound: Option<f32>,
    right_bound: Option<f32>,
    max_objects: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct ClientConfigFile {
    server_addr: Option<String>,
    timeout_ms: Option<u64>,
    loop_delay_ms: Option<u64>,
    camera_retry_ms: Option<u64>,
    refused_retry_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    index: Option<u32>,
    device: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct EncodingConfigFile {
    jpeg_quality: Option<u8>,
    max_bytes: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct SpeechConfigFile {
    engine: Option<String>,
    command: Option<String>,
    args: Option<Vec<String>>,
    cooldown_ms: Option<u64>,
    cancel_grace_ms: Option<u64>,
}

/// Model and label sources for the server.
#[derive(Debug, Clone)]
pub struct ModelSettings {
    /// `tract` or `scripted`.
    pub backend: String,
    pub path: PathBuf,
    pub labels_path: PathBuf,
    pub input_width: u32,
    pub input_height: u32,
    /// `u8` (quantized) or `f32`.
    pub input_type: String,
    pub max_detections: usize,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub server: ServerSettings,
    pub model: ModelSettings,
    pub detection: LocatorParams,
    pub language: String,
}

#[derive(Debug, Clone)]
pub struct EncodingSettings {
    pub jpeg_quality: u8,
    pub max_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    /// `espeak`, `command`, or `log`.
    pub engine: String,
    pub command: Option<String>,
    pub args: Vec<String>,
    pub cooldown: Duration,
    pub cancel_grace: Duration,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_addr: String,
    pub timeout: Duration,
    pub loop_delay: Duration,
    pub camera_retry_delay: Duration,
    pub refused_retry_delay: Duration,
    pub camera: CameraSettings,
    pub encoding: EncodingSettings,
    pub speech: SpeechSettings,
    pub language: String,
}

impl ServerConfig {
    /// Load from `NARRATOR_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path_from_env().as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => NarratorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: NarratorConfigFile) -> Self {
        let server = file.server.unwrap_or_default();
        let model = file.model.unwrap_or_default();
        let detection = file.detection.unwrap_or_default();
        Self {
            server: ServerSettings {
                addr: server
                    .bind_addr
                    .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string()),
                max_request_bytes: server
                    .max_request_bytes
                    .unwrap_or(DEFAULT_MAX_REQUEST_BYTES),
                socket_timeout: Duration::from_millis(
                    server.socket_timeout_ms.unwrap_or(DEFAULT_SOCKET_TIMEOUT_MS),
                ),
            },
            model: ModelSettings {
                backend: model
                    .backend
                    .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
                path: model
                    .path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
                labels_path: model
                    .labels_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_LABELS_PATH)),
                input_width: model.input_width.unwrap_or(DEFAULT_MODEL_INPUT),
                input_height: model.input_height.unwrap_or(DEFAULT_MODEL_INPUT),
                input_type: model
                    .input_type
                    .unwrap_or_else(|| DEFAULT_MODEL_INPUT_TYPE.to_string()),
                max_detections: model.max_detections.unwrap_or(DEFAULT_MODEL_MAX_DETECTIONS),
            },
            detection: LocatorParams {
                confidence_threshold: detection.confidence_threshold.unwrap_or(DEFAULT_CONFIDENCE),
                left_bound: detection.left_bound.unwrap_or(DEFAULT_LEFT_BOUND),
                right_bound: detection.right_bound.unwrap_or(DEFAULT_RIGHT_BOUND),
                max_objects: detection.max_objects.unwrap_or(DEFAULT_MAX_OBJECTS),
            },
            language: file
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_non_empty("NARRATOR_BIND_ADDR") {
            self.server.addr = addr;
        }
        if let Some(path) = env_non_empty("NARRATOR_MODEL_PATH") {
            self.model.path = PathBuf::from(path);
        }
        if let Some(path) = env_non_empty("NARRATOR_LABELS_PATH") {
            self.model.labels_path = PathBuf::from(path);
        }
        if let Some(language) = env_non_empty("NARRATOR_LANGUAGE") {
            self.language = language;
        }
        if let Some(confidence) = env_non_empty("NARRATOR_CONFIDENCE") {
            self.detection.confidence_threshold = confidence
                .parse()
                .map_err(|_| anyhow!("NARRATOR_CONFIDENCE must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate_locator(&self.detection)?;
        if self.server.max_request_bytes == 0 {
            return Err(anyhow!("server.max_request_bytes must be greater than zero"));
        }
        if self.server.socket_timeout.is_zero() {
            return Err(anyhow!("server.socket_timeout_ms must be greater than zero"));
        }
        if self.model.input_width == 0 || self.model.input_height == 0 {
            return Err(anyhow!("model input size must be non-zero"));
        }
        if self.model.max_detections == 0 {
            return Err(anyhow!("model.max_detections must be at least 1"));
        }
        match self.model.backend.as_str() {
            "tract" | "scripted" => Ok(()),
            other => Err(anyhow!(
                "unknown model backend '{}'; expected tract or scripted",
                other
            )),
        }
    }
}

impl ClientConfig {
    /// Load from `NARRATOR_CONFIG` (if set), then apply environment overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(config_path_from_env().as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => read_config_file(path)?,
            None => NarratorConfigFile::default(),
        };
        let mut cfg = Self::from_file(file);
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: NarratorConfigFile) -> Self {
        let client = file.client.unwrap_or_default();
        let camera = file.camera.unwrap_or_default();
        let encoding = file.encoding.unwrap_or_default();
        let speech = file.speech.unwrap_or_default();
        Self {
            server_addr: client
                .server_addr
                .unwrap_or_else(|| DEFAULT_SERVER_ADDR.to_string()),
            timeout: Duration::from_millis(client.timeout_ms.unwrap_or(DEFAULT_SOCKET_TIMEOUT_MS)),
            loop_delay: Duration::from_millis(client.loop_delay_ms.unwrap_or(DEFAULT_LOOP_DELAY_MS)),
            camera_retry_delay: Duration::from_millis(
                client.camera_retry_ms.unwrap_or(DEFAULT_CAMERA_RETRY_MS),
            ),
            refused_retry_delay: Duration::from_millis(
                client.refused_retry_ms.unwrap_or(DEFAULT_REFUSED_RETRY_MS),
            ),
            camera: CameraSettings {
                device: camera.device.unwrap_or_else(|| {
                    CameraSettings::device_for_index(camera.index.unwrap_or(DEFAULT_CAMERA_INDEX))
                }),
                width: camera.width.unwrap_or(DEFAULT_CAMERA_WIDTH),
                height: camera.height.unwrap_or(DEFAULT_CAMERA_HEIGHT),
            },
            encoding: EncodingSettings {
                jpeg_quality: encoding.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY),
                max_bytes: encoding.max_bytes.unwrap_or(DEFAULT_JPEG_MAX_BYTES),
            },
            speech: SpeechSettings {
                engine: speech
                    .engine
                    .unwrap_or_else(|| DEFAULT_SPEECH_ENGINE.to_string()),
                command: speech.command,
                args: speech.args.unwrap_or_default(),
                cooldown: Duration::from_millis(speech.cooldown_ms.unwrap_or(DEFAULT_COOLDOWN_MS)),
                cancel_grace: Duration::from_millis(
                    speech.cancel_grace_ms.unwrap_or(DEFAULT_CANCEL_GRACE_MS),
                ),
            },
            language: file
                .language
                .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string()),
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_non_empty("NARRATOR_SERVER_ADDR") {
            self.server_addr = addr;
        }
        if let Some(language) = env_non_empty("NARRATOR_LANGUAGE") {
            self.language = language;
        }
        if let Some(camera) = env_non_empty("NARRATOR_CAMERA") {
            self.camera.device = match camera.parse::<u32>() {
                Ok(index) => CameraSettings::device_for_index(index),
                Err(_) => camera,
            };
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.server_addr.trim().is_empty() {
            return Err(anyhow!("client.server_addr must not be empty"));
        }
        if self.timeout.is_zero() {
            return Err(anyhow!("client.timeout_ms must be greater than zero"));
        }
        if !(1..=100).contains(&self.encoding.jpeg_quality) {
            return Err(anyhow!(
                "encoding.jpeg_quality must be within 1..=100, got {}",
                self.encoding.jpeg_quality
            ));
        }
        if self.encoding.max_bytes == 0 {
            return Err(anyhow!("encoding.max_bytes must be greater than zero"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera size must be non-zero"));
        }
        match self.speech.engine.as_str() {
            "espeak" | "log" => Ok(()),
            "command" if self.speech.command.is_some() => Ok(()),
            "command" => Err(anyhow!("speech.engine 'command' requires speech.command")),
            other => Err(anyhow!(
                "unknown speech engine '{}'; expected espeak, command or log",
                other
            )),
        }
    }
}

fn validate_locator(params: &LocatorParams) -> Result<()> {
    if !(0.0..=1.0).contains(&params.confidence_threshold) {
        return Err(anyhow!(
            "detection.confidence_threshold must be within [0, 1], got {}",
            params.confidence_threshold
        ));
    }
    if !(0.0..=1.0).contains(&params.left_bound) || !(0.0..=1.0).contains(&params.right_bound) {
        return Err(anyhow!("detection bounds must be within [0, 1]"));
    }
    if params.left_bound >= params.right_bound {
        return Err(anyhow!(
            "detection.left_bound ({}) must be below detection.right_bound ({})",
            params.left_bound,
            params.right_bound
        ));
    }
    if params.max_objects == 0 {
        return Err(anyhow!("detection.max_objects must be at least 1"));
    }
    Ok(())
}

fn config_path_from_env() -> Option<PathBuf> {
    env_non_empty("NARRATOR_CONFIG").map(PathBuf::from)
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<NarratorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
