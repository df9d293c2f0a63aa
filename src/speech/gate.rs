use std::time::{Duration, Instant};

use super::supervisor::SpeechJob;

/// Client speech state, owned by the capture loop.
///
/// Passed explicitly into [`should_speak`] each iteration; only the loop
/// mutates it.
#[derive(Debug, Default)]
pub struct SpeechState {
    pub last_spoken: String,
    /// `None` until the first announcement.
    pub last_spoken_at: Option<Instant>,
    pub active_job: Option<SpeechJob>,
}

impl SpeechState {
    /// Record an announcement. Must happen before the job is launched.
    pub fn record(&mut self, message: &str, now: Instant) {
        self.last_spoken = message.to_string();
        self.last_spoken_at = Some(now);
    }

    /// Reap the active job if it has finished. Returns true when a job was reaped.
    pub fn reap_finished(&mut self) -> bool {
        match self.active_job.take() {
            Some(job) if !job.is_alive() => {
                job.join();
                true
            }
            Some(job) => {
                self.active_job = Some(job);
                false
            }
            None => false,
        }
    }
}

/// Speak only a new message, after the cooldown, with no job in flight.
pub fn should_speak(candidate: &str, state: &SpeechState, cooldown: Duration, now: Instant) -> bool {
    let is_new = candidate != state.last_spoken;
    let cooled_down = state
        .last_spoken_at
        .map_or(true, |at| now.saturating_duration_since(at) > cooldown);
    is_new && cooled_down && state.active_job.is_none()
}
