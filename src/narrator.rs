//! Client capture loop: capture -> encode -> request -> gate -> maybe speak.
//!
//! The loop never waits on speech. It reaps a finished job at the top of each
//! iteration and otherwise only checks liveness through the gate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::camera::{FrameSource, JpegFrameEncoder};
use crate::client::DetectionClient;
use crate::error::{NetworkError, NetworkErrorKind};
use crate::speech::{should_speak, CancelOutcome, SpeechState, SpeechSupervisor};

const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Time source for cooldown decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

#[derive(Clone, Debug)]
pub struct NarratorSettings {
    /// Minimum time between two announcements.
    pub cooldown: Duration,
    /// Pause between iterations.
    pub loop_delay: Duration,
    /// Pause after a frame could not be captured or encoded.
    pub camera_retry_delay: Duration,
    /// Pause after the server refused the connection.
    pub refused_retry_delay: Duration,
}

/// What one iteration did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IterationOutcome {
    CameraFailed,
    EncodeFailed,
    /// Carries the classification of the [`NetworkError`].
    NetworkFailed(NetworkErrorKind),
    /// The server answered `success=false`.
    ServerFailed(String),
    /// A description arrived but the gate kept quiet.
    Silent(String),
    /// A speech job was launched for this message.
    Spoke(String),
}

pub struct Narrator {
    camera: Box<dyn FrameSource>,
    encoder: JpegFrameEncoder,
    client: DetectionClient,
    supervisor: SpeechSupervisor,
    settings: NarratorSettings,
    clock: Arc<dyn Clock>,
    state: SpeechState,
}

impl Narrator {
    pub fn new(
        camera: Box<dyn FrameSource>,
        encoder: JpegFrameEncoder,
        client: DetectionClient,
        supervisor: SpeechSupervisor,
        settings: NarratorSettings,
    ) -> Self {
        Self {
            camera,
            encoder,
            client,
            supervisor,
            settings,
            clock: Arc::new(SystemClock),
            state: SpeechState::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn state(&self) -> &SpeechState {
        &self.state
    }

    /// Run one capture/request/speak cycle without sleeping.
    pub fn run_once(&mut self) -> IterationOutcome {
        self.state.reap_finished();

        let frame = match self.camera.next_frame() {
            Ok(frame) => frame,
            Err(err) => {
                log::warn!("could not read frame from {}: {:#}", self.camera.name(), err);
                return IterationOutcome::CameraFailed;
            }
        };

        let payload = match self.encoder.encode(&frame) {
            Ok(payload) => payload,
            Err(err) => {
                log::warn!("could not encode frame, skipping: {:#}", err);
                return IterationOutcome::EncodeFailed;
            }
        };

        let response = match self.client.request_detection(&payload) {
            Ok(response) => response,
            Err(err) => {
                report_network_error(&err, self.client.addr());
                return IterationOutcome::NetworkFailed(err.kind());
            }
        };

        if !response.success {
            log::warn!("server reported an error: {}", response.message);
            return IterationOutcome::ServerFailed(response.message);
        }
        log::info!(
            "result ({} objects): {}",
            response.object_count,
            response.message
        );

        let now = self.clock.now();
        if !should_speak(&response.message, &self.state, self.settings.cooldown, now) {
            return IterationOutcome::Silent(response.message);
        }

        self.state.record(&response.message, now);
        match self.supervisor.launch(&response.message) {
            Ok(job) => {
                log::debug!("speech job {} launched", job.id());
                self.state.active_job = Some(job);
            }
            Err(err) => log::warn!("could not start speech job: {:#}", err),
        }
        IterationOutcome::Spoke(response.message)
    }

    /// Pause to apply after `outcome`.
    pub fn delay_after(&self, outcome: &IterationOutcome) -> Duration {
        match outcome {
            IterationOutcome::CameraFailed | IterationOutcome::EncodeFailed => {
                self.settings.camera_retry_delay
            }
            IterationOutcome::NetworkFailed(NetworkErrorKind::ConnectionRefused) => {
                self.settings.refused_retry_delay
            }
            _ => self.settings.loop_delay,
        }
    }

    /// Loop until `shutdown` is set. Transient failures never end the loop.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        log::info!(
            "narrator running: camera={}, server={}, speech={}",
            self.camera.name(),
            self.client.addr(),
            self.supervisor.engine_name()
        );
        while !shutdown.load(Ordering::SeqCst) {
            let outcome = self.run_once();
            let delay = self.delay_after(&outcome);
            sleep_unless(shutdown, delay);
        }
    }

    /// Cancel any active speech job within the grace period, then release the camera.
    pub fn shutdown(mut self) -> Option<CancelOutcome> {
        let outcome = self.state.active_job.take().map(|job| {
            log::info!("cancelling speech job {}", job.id());
            job.cancel(self.supervisor.cancel_grace())
        });
        log::info!("releasing camera {}", self.camera.name());
        self.camera.release();
        outcome
    }
}

fn report_network_error(err: &NetworkError, addr: &str) {
    match err {
        NetworkError::ConnectionRefused { .. } => {
            log::warn!("[{}] connection refused; is the server running on {}?", err.kind(), addr)
        }
        _ => log::warn!("[{}] {}", err.kind(), err),
    }
}

fn sleep_unless(shutdown: &AtomicBool, total: Duration) {
    let deadline = Instant::now() + total;
    while !shutdown.load(Ordering::SeqCst) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        std::thread::sleep(remaining.min(SLEEP_SLICE));
    }
}
