use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::SpeechError;
use crate::sentence::Language;

const CHILD_POLL: Duration = Duration::from_millis(20);

/// Cooperative cancellation flag shared between a job and its owner.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Text-to-speech engine.
///
/// `speak` may block for the whole utterance. Implementations should poll
/// `cancel` and return [`SpeechError::Cancelled`] promptly once it is set.
pub trait SpeechEngine: Send + Sync {
    fn name(&self) -> &str;

    fn speak(&self, text: &str, cancel: &CancelToken) -> Result<(), SpeechError>;
}

/// Speaks by running an external synthesizer (`espeak-ng` by default).
///
/// The text is passed as the final argument. The child process is killed
/// when the job is cancelled.
#[derive(Clone, Debug)]
pub struct CommandSpeaker {
    program: String,
    args: Vec<String>,
}

impl CommandSpeaker {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// `espeak-ng -v <language>`.
    pub fn espeak(language: Language) -> Self {
        Self::new(
            "espeak-ng",
            vec!["-v".to_string(), language.code().to_string()],
        )
    }
}

impl SpeechEngine for CommandSpeaker {
    fn name(&self) -> &str {
        &self.program
    }

    fn speak(&self, text: &str, cancel: &CancelToken) -> Result<(), SpeechError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => {
                    SpeechError::Unavailable(format!("{} not found", self.program))
                }
                _ => SpeechError::Io(e),
            })?;

        loop {
            if let Some(status) = child.try_wait()? {
                if status.success() {
                    return Ok(());
                }
                return Err(SpeechError::Engine(format!(
                    "{} exited with {}",
                    self.program, status
                )));
            }
            if cancel.is_cancelled() {
                let _ = child.kill();
                let _ = child.wait();
                return Err(SpeechError::Cancelled);
            }
            std::thread::sleep(CHILD_POLL);
        }
    }
}

/// Engine that only logs the utterance.
#[derive(Clone, Debug, Default)]
pub struct LogSpeaker;

impl SpeechEngine for LogSpeaker {
    fn name(&self) -> &str {
        "log"
    }

    fn speak(&self, text: &str, _cancel: &CancelToken) -> Result<(), SpeechError> {
        log::info!("speak: {}", text);
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn missing_program_is_unavailable() {
        let speaker = CommandSpeaker::new("definitely-not-a-speech-engine", vec![]);
        let err = speaker.speak("hello", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, SpeechError::Unavailable(_)));
    }

    #[test]
    fn nonzero_exit_is_an_engine_error() {
        let speaker = CommandSpeaker::new("false", vec![]);
        let err = speaker.speak("hello", &CancelToken::new()).unwrap_err();
        assert!(matches!(err, SpeechError::Engine(_)));
    }

    #[test]
    fn successful_command_completes() {
        let speaker = CommandSpeaker::new("true", vec![]);
        speaker.speak("hello", &CancelToken::new()).expect("speak");
    }

    #[test]
    fn cancel_kills_a_long_running_child() {
        // The text lands in `$0`, so the child just sleeps.
        let speaker = CommandSpeaker::new(
            "sh",
            vec!["-c".to_string(), "sleep 30".to_string()],
        );
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            trigger.cancel();
        });
        let started = Instant::now();
        let err = speaker.speak("hello", &cancel).unwrap_err();
        assert!(matches!(err, SpeechError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
