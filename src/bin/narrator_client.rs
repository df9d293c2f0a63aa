//! narrator_client - camera capture and speech client for the vision narrator
//!
//! Captures a frame, asks the detection server to describe it, and speaks
//! new descriptions aloud until Ctrl-C.

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use vision_narrator::config::{ClientConfig, SpeechSettings};
use vision_narrator::{
    open_camera, CancelOutcome, CommandSpeaker, DetectionClient, JpegFrameEncoder, Language,
    LogSpeaker, Narrator, NarratorSettings, SpeechEngine, SpeechSupervisor,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Camera client that narrates what the server detects")]
struct Args {
    /// JSON config file (overrides NARRATOR_CONFIG).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ClientConfig::load_from(Some(path))?,
        None => ClientConfig::load()?,
    };

    let camera = open_camera(&config.camera)?;
    let encoder = JpegFrameEncoder::new(config.encoding.jpeg_quality, config.encoding.max_bytes)?;
    let client = DetectionClient::new(config.server_addr.clone(), config.timeout);
    let engine = build_engine(&config.speech, Language::from_code(&config.language));
    let supervisor = SpeechSupervisor::new(engine, config.speech.cancel_grace);
    let settings = NarratorSettings {
        cooldown: config.speech.cooldown,
        loop_delay: config.loop_delay,
        camera_retry_delay: config.camera_retry_delay,
        refused_retry_delay: config.refused_retry_delay,
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = shutdown.clone();
    ctrlc::set_handler(move || {
        shutdown_handler.store(true, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    let mut narrator = Narrator::new(camera, encoder, client, supervisor, settings);
    narrator.run(&shutdown);

    log::info!("shutdown signal received, stopping narrator...");
    match narrator.shutdown() {
        Some(CancelOutcome::Abandoned) => {
            log::warn!("speech job did not stop within the grace period; abandoned")
        }
        Some(CancelOutcome::Stopped) => log::info!("speech job stopped"),
        None => {}
    }
    Ok(())
}

fn build_engine(speech: &SpeechSettings, language: Language) -> Arc<dyn SpeechEngine> {
    match (speech.engine.as_str(), &speech.command) {
        ("command", Some(program)) => {
            Arc::new(CommandSpeaker::new(program.clone(), speech.args.clone()))
        }
        ("log", _) => Arc::new(LogSpeaker),
        _ => Arc::new(CommandSpeaker::espeak(language)),
    }
}
