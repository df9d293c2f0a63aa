use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use vision_narrator::{
    open_camera, BoundingBox, CameraSettings, CancelOutcome, CancelToken, DescribePipeline,
    Detection, DetectionClient, DetectionServer, Detector, IterationOutcome, JpegFrameEncoder,
    LabelTable, Language, LocatorParams, Narrator, NarratorSettings, NetworkErrorKind,
    ScriptedBackend, ServerHandle, ServerSettings, SpeechEngine, SpeechError, SpeechSupervisor,
};

const SCENE: &str = "I see a person in front of you and an umbrella on your left.";

#[derive(Default)]
struct RecordingSpeaker {
    spoken: Mutex<Vec<String>>,
}

impl SpeechEngine for RecordingSpeaker {
    fn name(&self) -> &str {
        "recording"
    }

    fn speak(&self, text: &str, _cancel: &CancelToken) -> Result<(), SpeechError> {
        self.spoken.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Speaks until cancelled.
struct EndlessSpeaker;

impl SpeechEngine for EndlessSpeaker {
    fn name(&self) -> &str {
        "endless"
    }

    fn speak(&self, _text: &str, cancel: &CancelToken) -> Result<(), SpeechError> {
        while !cancel.is_cancelled() {
            std::thread::sleep(Duration::from_millis(5));
        }
        Err(SpeechError::Cancelled)
    }
}

fn start_server() -> ServerHandle {
    let backend = ScriptedBackend::new(vec![
        Detection::new(BoundingBox::new(0.1, 0.2, 0.3, 0.9), 28, 0.77),
        Detection::new(BoundingBox::new(0.35, 0.0, 0.65, 1.0), 1, 0.95),
        Detection::new(BoundingBox::new(0.7, 0.0, 0.9, 1.0), 2, 0.2),
    ]);
    let pipeline = DescribePipeline::new(
        Detector::new(backend),
        LabelTable::parse("1  person\n2  bicycle\n28  umbrella\n"),
        LocatorParams {
            confidence_threshold: 0.5,
            left_bound: 0.35,
            right_bound: 0.65,
            max_objects: 3,
        },
        Language::English,
    );
    DetectionServer::new(
        ServerSettings {
            addr: "127.0.0.1:0".to_string(),
            max_request_bytes: 4 * 1024 * 1024,
            socket_timeout: Duration::from_secs(2),
        },
        pipeline,
    )
    .spawn()
    .unwrap()
}

fn narrator(server: &ServerHandle, engine: Arc<dyn SpeechEngine>) -> Narrator {
    let camera = open_camera(&CameraSettings {
        device: "stub://integration".to_string(),
        width: 160,
        height: 120,
    })
    .unwrap();
    Narrator::new(
        camera,
        JpegFrameEncoder::new(80, 1024 * 1024).unwrap(),
        DetectionClient::new(server.addr.to_string(), Duration::from_secs(5)),
        SpeechSupervisor::new(engine, Duration::from_millis(500)),
        NarratorSettings {
            cooldown: Duration::from_millis(50),
            loop_delay: Duration::from_millis(10),
            camera_retry_delay: Duration::from_millis(10),
            refused_retry_delay: Duration::from_millis(10),
        },
    )
}

#[test]
fn camera_frame_is_described_and_spoken_once() {
    let server = start_server();
    let speaker = Arc::new(RecordingSpeaker::default());
    let mut narrator = narrator(&server, speaker.clone());

    assert_eq!(narrator.run_once(), IterationOutcome::Spoke(SCENE.to_string()));

    let deadline = Instant::now() + Duration::from_secs(2);
    while speaker.spoken.lock().unwrap().is_empty() {
        assert!(Instant::now() < deadline, "speech never ran");
        std::thread::sleep(Duration::from_millis(10));
    }
    std::thread::sleep(Duration::from_millis(100));

    // Same scene again: past the cooldown, but nothing new to say.
    assert_eq!(narrator.run_once(), IterationOutcome::Silent(SCENE.to_string()));
    assert_eq!(speaker.spoken.lock().unwrap().as_slice(), [SCENE]);

    narrator.shutdown();
    server.stop().unwrap();
}

#[test]
fn shutdown_cancels_speech_in_flight() {
    let server = start_server();
    let mut narrator = narrator(&server, Arc::new(EndlessSpeaker));

    assert!(matches!(narrator.run_once(), IterationOutcome::Spoke(_)));
    assert!(narrator.state().active_job.is_some());

    // The job is still speaking, so nothing else may be launched.
    std::thread::sleep(Duration::from_millis(100));
    assert!(matches!(narrator.run_once(), IterationOutcome::Silent(_)));

    assert_eq!(narrator.shutdown(), Some(CancelOutcome::Stopped));
    server.stop().unwrap();
}

#[test]
fn loop_survives_a_missing_server() {
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let camera = open_camera(&CameraSettings {
        device: "stub://offline".to_string(),
        width: 32,
        height: 32,
    })
    .unwrap();
    let mut narrator = Narrator::new(
        camera,
        JpegFrameEncoder::new(80, 1024 * 1024).unwrap(),
        DetectionClient::new(addr.to_string(), Duration::from_millis(500)),
        SpeechSupervisor::new(Arc::new(RecordingSpeaker::default()), Duration::from_millis(100)),
        NarratorSettings {
            cooldown: Duration::from_millis(50),
            loop_delay: Duration::from_millis(10),
            camera_retry_delay: Duration::from_millis(10),
            refused_retry_delay: Duration::from_millis(10),
        },
    );

    for _ in 0..3 {
        assert_eq!(
            narrator.run_once(),
            IterationOutcome::NetworkFailed(NetworkErrorKind::ConnectionRefused)
        );
    }
    let stop = AtomicBool::new(true);
    narrator.run(&stop);
    assert!(narrator.shutdown().is_none());
}
