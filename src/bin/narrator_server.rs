//! narrator_server - detection server for the vision narrator
//!
//! This daemon:
//! 1. Loads the label table and the detection model
//! 2. Listens for one-image-per-connection requests
//! 3. Answers each with a described scene

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::mpsc;

use vision_narrator::config::{ModelSettings, ServerConfig};
use vision_narrator::{
    DescribePipeline, DetectionServer, Detector, DetectorBackend, LabelTable, Language,
    ScriptedBackend,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Object detection server for the vision narrator")]
struct Args {
    /// JSON config file (overrides NARRATOR_CONFIG).
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => ServerConfig::load_from(Some(path))?,
        None => ServerConfig::load()?,
    };

    let labels = LabelTable::load(&config.model.labels_path)?;
    if labels.is_empty() {
        return Err(anyhow!(
            "label file {} contains no labels",
            config.model.labels_path.display()
        ));
    }

    let mut detector = Detector::from_boxed(build_backend(&config.model)?);
    detector.warm_up()?;
    let (input_width, input_height) = detector.input_size();
    log::info!(
        "detector {} ready (input {}x{})",
        detector.backend_name(),
        input_width,
        input_height
    );
    let language = Language::from_code(&config.language);
    let pipeline = DescribePipeline::new(detector, labels, config.detection.clone(), language);

    let handle = DetectionServer::new(config.server.clone(), pipeline).spawn()?;
    log::info!("narrator_server running on {}", handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("narrator_server waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping detection server...");
    handle.stop()?;
    Ok(())
}

fn build_backend(model: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    match model.backend.as_str() {
        "scripted" => {
            log::warn!("using scripted backend: every image is reported as empty");
            Ok(Box::new(
                ScriptedBackend::new(Vec::new())
                    .with_input_size(model.input_width, model.input_height)
                    .with_max_detections(model.max_detections),
            ))
        }
        "tract" => build_tract(model),
        other => Err(anyhow!("unknown model backend '{}'", other)),
    }
}

#[cfg(feature = "backend-tract")]
fn build_tract(model: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    use vision_narrator::{TensorInput, TractBackend};

    let input = TensorInput::parse(&model.input_type)?;
    log::info!("loading model {}", model.path.display());
    let backend = TractBackend::new(&model.path, model.input_width, model.input_height, input)?
        .with_max_detections(model.max_detections);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_model: &ModelSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!(
        "model backend 'tract' requires the backend-tract feature"
    ))
}
