use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use super::engine::{CancelToken, SpeechEngine};
use crate::error::SpeechError;

const CANCEL_POLL: Duration = Duration::from_millis(10);

/// Launches utterances as isolated background jobs.
///
/// Each job runs on its own thread: a hang inside the engine only stalls that
/// thread, and a panic is contained and reported at `join`. Keeping a single
/// job in flight is the caller's responsibility (see [`super::should_speak`]).
pub struct SpeechSupervisor {
    engine: Arc<dyn SpeechEngine>,
    cancel_grace: Duration,
    next_id: AtomicU64,
}

/// Result of cancelling a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job finished within the grace period and its thread was reaped.
    Stopped,
    /// The job was still running at the deadline; its thread was detached.
    Abandoned,
}

impl SpeechSupervisor {
    pub fn new(engine: Arc<dyn SpeechEngine>, cancel_grace: Duration) -> Self {
        Self {
            engine,
            cancel_grace,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub fn cancel_grace(&self) -> Duration {
        self.cancel_grace
    }

    /// Start speaking `message` in the background.
    pub fn launch(&self, message: &str) -> Result<SpeechJob> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let done = Arc::new(AtomicBool::new(false));
        let cancel = CancelToken::new();

        let engine = self.engine.clone();
        let text = message.to_string();
        let job_done = done.clone();
        let job_cancel = cancel.clone();
        let handle = std::thread::Builder::new()
            .name(format!("speech-{id}"))
            .spawn(move || {
                let _done = DoneGuard(job_done);
                let started = Instant::now();
                match engine.speak(&text, &job_cancel) {
                    Ok(()) => log::debug!(
                        "speech job {} finished in {:?}",
                        id,
                        started.elapsed()
                    ),
                    Err(SpeechError::Cancelled) => log::info!("speech job {} cancelled", id),
                    Err(err) => log::warn!("speech job {} failed: {}", id, err),
                }
            })
            .context("spawn speech job thread")?;

        Ok(SpeechJob {
            id,
            message: message.to_string(),
            done,
            cancel,
            handle: Some(handle),
        })
    }
}

/// Marks the job finished even when the engine panics.
struct DoneGuard(Arc<AtomicBool>);

impl Drop for DoneGuard {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Handle to one in-flight utterance.
///
/// The background thread writes `done` exactly once; the owner only reads it.
#[derive(Debug)]
pub struct SpeechJob {
    id: u64,
    message: String,
    done: Arc<AtomicBool>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl SpeechJob {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Non-blocking liveness check.
    pub fn is_alive(&self) -> bool {
        !self.done.load(Ordering::SeqCst)
    }

    /// Wait for the job to finish and release its thread.
    pub fn join(mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("speech job {} panicked", self.id);
            }
        }
    }

    /// Request cancellation and wait up to `grace` for the job to stop.
    pub fn cancel(mut self, grace: Duration) -> CancelOutcome {
        self.cancel.cancel();
        let deadline = Instant::now() + grace;
        while self.is_alive() && Instant::now() < deadline {
            std::thread::sleep(CANCEL_POLL);
        }
        if self.is_alive() {
            log::warn!(
                "speech job {} did not stop within {:?}; detaching",
                self.id,
                grace
            );
            self.handle.take();
            return CancelOutcome::Abandoned;
        }
        self.join();
        CancelOutcome::Stopped
    }
}
