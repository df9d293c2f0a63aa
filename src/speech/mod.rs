//! Speech output for the client.
//!
//! - `gate`: decides whether a new message should be spoken (dedup + cooldown + one job at a time)
//! - `engine`: text-to-speech engines behind a narrow trait
//! - `supervisor`: runs each utterance on its own thread so synthesis never blocks capture

mod engine;
mod gate;
mod supervisor;

pub use engine::{CancelToken, CommandSpeaker, LogSpeaker, SpeechEngine};
pub use gate::{should_speak, SpeechState};
pub use supervisor::{CancelOutcome, SpeechJob, SpeechSupervisor};
