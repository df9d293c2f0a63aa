use std::io::{Cursor, Read, Write};
use std::net::{Shutdown, TcpListener, TcpStream};
use std::time::{Duration, Instant};

use image::{ImageBuffer, ImageFormat, Rgb};

use vision_narrator::{
    BoundingBox, DescribePipeline, Detection, DetectionClient, DetectionServer, Detector,
    DetectorBackend, LabelTable, Language, LocatorParams, NetworkError, NetworkErrorKind,
    ResponseMessage, ScriptedBackend, ServerHandle, ServerSettings,
};

fn png() -> Vec<u8> {
    let img = ImageBuffer::from_pixel(64, 48, Rgb([30u8, 120, 200]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

fn params() -> LocatorParams {
    LocatorParams {
        confidence_threshold: 0.5,
        left_bound: 0.35,
        right_bound: 0.65,
        max_objects: 3,
    }
}

fn labels() -> LabelTable {
    LabelTable::parse("0  person\n16  cat\n17  dog\n61  chair\n")
}

fn start(backend: impl DetectorBackend + 'static, language: Language, max_request_bytes: usize) -> ServerHandle {
    start_with_timeout(backend, language, max_request_bytes, Duration::from_secs(2))
}

fn start_with_timeout(
    backend: impl DetectorBackend + 'static,
    language: Language,
    max_request_bytes: usize,
    socket_timeout: Duration,
) -> ServerHandle {
    let pipeline = DescribePipeline::new(Detector::new(backend), labels(), params(), language);
    let settings = ServerSettings {
        addr: "127.0.0.1:0".to_string(),
        max_request_bytes,
        socket_timeout,
    };
    DetectionServer::new(settings, pipeline)
        .spawn()
        .expect("spawn server")
}

fn scene() -> ScriptedBackend {
    ScriptedBackend::new(vec![
        Detection::new(BoundingBox::new(0.40, 0.1, 0.60, 0.9), 16, 0.92),
        Detection::new(BoundingBox::new(0.70, 0.2, 0.95, 0.8), 61, 0.81),
        Detection::new(BoundingBox::new(0.05, 0.2, 0.25, 0.8), 17, 0.30),
    ])
}

/// Send raw bytes, half-close, and read whatever comes back.
fn exchange(addr: &str, payload: &[u8]) -> Vec<u8> {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    stream.write_all(payload).expect("write");
    stream.shutdown(Shutdown::Write).expect("half close");
    let mut body = Vec::new();
    stream.read_to_end(&mut body).expect("read response");
    body
}

#[test]
fn describes_a_valid_image() {
    let server = start(scene(), Language::English, 1024 * 1024);
    let client = DetectionClient::new(server.addr.to_string(), Duration::from_secs(5));

    let response = client.request_detection(&png()).expect("response");
    assert_eq!(
        response,
        ResponseMessage::success("I see a cat in front of you and a chair on your right.", 2)
    );

    server.stop().expect("stop");
}

#[test]
fn renders_turkish_sentence_structure() {
    let server = start(scene(), Language::Turkish, 1024 * 1024);
    let client = DetectionClient::new(server.addr.to_string(), Duration::from_secs(5));

    let response = client.request_detection(&png()).expect("response");
    assert!(response.success);
    assert_eq!(
        response.message,
        "Önünüzde bir cat ve sağınızda bir chair görüyorum."
    );

    server.stop().expect("stop");
}

#[test]
fn empty_connection_gets_no_reply_and_server_keeps_serving() {
    let server = start(scene(), Language::English, 1024 * 1024);
    let addr = server.addr.to_string();

    assert!(exchange(&addr, b"").is_empty());

    let body = exchange(&addr, &png());
    let response = ResponseMessage::parse(&body).expect("parse");
    assert!(response.success);

    server.stop().expect("stop");
}

#[test]
fn malformed_image_fails_then_valid_image_succeeds() {
    let server = start(scene(), Language::English, 1024 * 1024);
    let client = DetectionClient::new(server.addr.to_string(), Duration::from_secs(5));

    let bad = client.request_detection(b"definitely not a jpeg").expect("response");
    assert!(!bad.success);
    assert!(bad.message.starts_with("Image processing error"));

    let good = client.request_detection(&png()).expect("response");
    assert!(good.success);

    server.stop().expect("stop");
}

#[test]
fn oversized_request_is_rejected() {
    let server = start(scene(), Language::English, 1024);
    let body = exchange(&server.addr.to_string(), &vec![0xAB; 64 * 1024]);
    let response = ResponseMessage::parse(&body).expect("parse");
    assert!(!response.success);
    assert!(response.message.contains("too large"));

    server.stop().expect("stop");
}

#[test]
fn inference_failure_is_reported_to_the_client() {
    let server = start(
        ScriptedBackend::failing("tensor shape mismatch"),
        Language::English,
        1024 * 1024,
    );
    let client = DetectionClient::new(server.addr.to_string(), Duration::from_secs(5));

    let response = client.request_detection(&png()).expect("response");
    assert!(!response.success);
    assert!(response.message.starts_with("Inference error"));
    assert!(response.message.contains("tensor shape mismatch"));

    server.stop().expect("stop");
}

struct PanickingBackend;

impl DetectorBackend for PanickingBackend {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn input_size(&self) -> (u32, u32) {
        (32, 32)
    }

    fn max_detections(&self) -> usize {
        10
    }

    fn infer(&mut self, _rgb: &[u8], _width: u32, _height: u32) -> anyhow::Result<Vec<Detection>> {
        panic!("backend exploded");
    }
}

#[test]
fn processing_panic_becomes_failure_and_loop_survives() {
    let server = start(PanickingBackend, Language::English, 1024 * 1024);
    let client = DetectionClient::new(server.addr.to_string(), Duration::from_secs(5));

    for _ in 0..2 {
        let response = client.request_detection(&png()).expect("response");
        assert!(!response.success);
        assert!(response.message.contains("backend exploded"));
    }

    server.stop().expect("stop");
}

#[test]
fn client_classifies_refused_connection() {
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        listener.local_addr().expect("addr").to_string()
    };
    let client = DetectionClient::new(addr, Duration::from_secs(2));
    let err = client.request_detection(&png()).unwrap_err();
    assert!(matches!(err, NetworkError::ConnectionRefused { .. }), "{err:?}");
    assert_eq!(err.kind(), NetworkErrorKind::ConnectionRefused);
}

#[test]
fn client_times_out_when_server_never_answers() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let client = DetectionClient::new(addr, Duration::from_millis(300));

    let err = client.request_detection(&png()).unwrap_err();
    assert!(matches!(err, NetworkError::Timeout { .. }), "{err:?}");
    assert_eq!(err.kind(), NetworkErrorKind::Timeout);
    drop(listener);
}

#[test]
fn client_accepts_legacy_plain_text_reply() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    let responder = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut request = Vec::new();
        stream.read_to_end(&mut request).expect("read");
        stream.write_all(b"I see a dog on your left.").expect("write");
        request.len()
    });

    let client = DetectionClient::new(addr, Duration::from_secs(2));
    let payload = png();
    let response = client.request_detection(&payload).expect("response");
    assert!(response.success);
    assert_eq!(response.message, "I see a dog on your left.");
    assert_eq!(responder.join().expect("responder"), payload.len());
}

#[test]
fn stop_closes_connection_still_sending() {
    let server = start_with_timeout(
        scene(),
        Language::English,
        1024 * 1024,
        Duration::from_secs(30),
    );
    let mut stream = TcpStream::connect(server.addr).expect("connect");
    stream
        .set_read_timeout(Some(Duration::from_secs(5)))
        .expect("read timeout");
    stream.write_all(b"partial image").expect("write");
    // Let the server accept and start reading before it is stopped.
    std::thread::sleep(Duration::from_millis(200));

    let started = Instant::now();
    server.stop().expect("stop");
    assert!(
        started.elapsed() < Duration::from_secs(2),
        "stop took {:?}",
        started.elapsed()
    );

    let mut body = Vec::new();
    stream.read_to_end(&mut body).expect("read after stop");
    assert!(body.is_empty());
}

#[test]
fn client_deadline_covers_slow_upload() {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr").to_string();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut buf = vec![0u8; 16 * 1024];
        loop {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => std::thread::sleep(Duration::from_millis(100)),
            }
        }
    });

    let client = DetectionClient::new(addr, Duration::from_millis(500));
    let payload = vec![0x5A; 32 * 1024 * 1024];
    let started = Instant::now();
    let err = client.request_detection(&payload).unwrap_err();
    let elapsed = started.elapsed();

    assert_eq!(err.kind(), NetworkErrorKind::Timeout, "{err:?}");
    assert!(elapsed < Duration::from_millis(1000), "took {elapsed:?}");
}
