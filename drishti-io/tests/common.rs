//! Test utilities for DrishtiIO server tests.
//!
//! Scripted camera and detector fakes plus a blocking wire-protocol client.

#![allow(dead_code)]

use drishti_io::config::AppConfig;
use drishti_io::core::collaborator::{Camera, Detector};
use drishti_io::core::runtime::{RuntimeConfig, SharedConfig};
use drishti_io::core::types::{Frame, LensCalibration, RawDetection, Rotation};
use drishti_io::error::{Error, Result};
use drishti_io::server::{CycleReport, Server};
use drishti_io::streaming::{Codec, ControlMessage, Message};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{Read, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Fake camera
// ============================================================================

/// Shared knobs and observations for [`FakeCamera`]
#[derive(Default)]
pub struct CameraScript {
    /// Captures that should fail, by capture index
    pub fail_on: Vec<u64>,
    /// (rotation, calibration) in effect at each successful capture
    pub seen: Vec<(Rotation, LensCalibration)>,
    pub released: bool,
}

/// Camera returning one fixed image with increasing timestamps
pub struct FakeCamera {
    template: Frame,
    script: Arc<Mutex<CameraScript>>,
    rotation: Rotation,
    calibration: LensCalibration,
    captures: u64,
    pub fail_open: bool,
}

impl FakeCamera {
    pub fn new(template: Frame) -> (Self, Arc<Mutex<CameraScript>>) {
        let script = Arc::new(Mutex::new(CameraScript::default()));
        let camera = Self {
            template,
            script: Arc::clone(&script),
            rotation: Rotation::Deg0,
            calibration: LensCalibration::identity(),
            captures: 0,
            fail_open: false,
        };
        (camera, script)
    }
}

impl Camera for FakeCamera {
    fn open(&mut self) -> Result<()> {
        if self.fail_open {
            return Err(Error::Other("no device".to_string()));
        }
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame> {
        let index = self.captures;
        self.captures += 1;
        let mut script = self.script.lock();
        if script.fail_on.contains(&index) {
            return Err(Error::AcquisitionFailure(format!("scripted failure {}", index)));
        }
        script.seen.push((self.rotation, self.calibration));
        let mut frame = self.template.clone();
        frame.timestamp_ns = (index + 1) * 1_000;
        Ok(frame)
    }

    fn set_rotation(&mut self, rotation: Rotation) {
        self.rotation = rotation;
    }

    fn set_calibration(&mut self, calibration: &LensCalibration) {
        self.calibration = *calibration;
    }

    fn release(&mut self) {
        self.script.lock().released = true;
    }
}

// ============================================================================
// Fake detector
// ============================================================================

/// What [`FakeDetector`] returns from the next inferences
#[derive(Default)]
pub struct DetectorScript {
    /// Returned on every inference unless `fail` is set
    pub detections: Vec<RawDetection>,
    pub fail: bool,
    /// Render an annotated frame whose pixel buffer does not fit its size
    pub broken_render: bool,
    pub calls: usize,
}

pub struct FakeDetector {
    script: Arc<Mutex<DetectorScript>>,
}

impl FakeDetector {
    pub fn new() -> (Self, Arc<Mutex<DetectorScript>>) {
        let script = Arc::new(Mutex::new(DetectorScript::default()));
        (
            Self {
                script: Arc::clone(&script),
            },
            script,
        )
    }
}

impl Detector for FakeDetector {
    fn infer(&mut self, _frame: &Frame, _iou: f32) -> Result<Vec<RawDetection>> {
        let mut script = self.script.lock();
        script.calls += 1;
        if script.fail {
            return Err(Error::DetectionFailure("scripted".to_string()));
        }
        Ok(script.detections.clone())
    }

    fn render_annotated(&mut self, frame: &Frame, _dets: &[RawDetection]) -> Result<Frame> {
        let mut out = frame.clone();
        if self.script.lock().broken_render {
            out.pixels.truncate(out.pixels.len() / 2);
            return Ok(out);
        }
        for px in out.pixels.chunks_exact_mut(3) {
            px[1] = 255;
        }
        Ok(out)
    }
}

/// Pixel-space detection on a 100x100 frame
pub fn detection(confidence: f32, class_id: u32) -> RawDetection {
    RawDetection {
        cx: 50.0,
        cy: 25.0,
        w: 10.0,
        h: 20.0,
        confidence,
        class_id,
    }
}

// ============================================================================
// Harness
// ============================================================================

pub struct Harness {
    pub server: Server,
    pub shared: SharedConfig,
    pub camera: Arc<Mutex<CameraScript>>,
    pub detector: Arc<Mutex<DetectorScript>>,
    pub addr: SocketAddr,
}

/// Loopback config with snapshots under `snapshot_dir`
pub fn test_config(snapshot_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.network.bind_address = "127.0.0.1:0".to_string();
    config.network.send_timeout_ms = 500;
    config.network.partial_message_timeout_ms = 1000;
    config.server.error_backoff_ms = 1;
    config.snapshot.directory = snapshot_dir.to_string_lossy().into_owned();
    config.stream.jpeg_quality = 75;
    config
}

pub fn harness(app: &AppConfig, initial: RuntimeConfig, frame: Frame) -> Harness {
    let (camera, camera_script) = FakeCamera::new(frame);
    let (detector, detector_script) = FakeDetector::new();
    let shared = SharedConfig::new(initial);
    let server = Server::bind(app, Box::new(camera), Box::new(detector), shared.clone())
        .expect("server should bind");
    let addr = server.local_addr().expect("listener address");
    Harness {
        server,
        shared,
        camera: camera_script,
        detector: detector_script,
        addr,
    }
}

impl Harness {
    pub fn cycle(&mut self) -> CycleReport {
        self.server.run_cycle().expect("cycle should succeed")
    }

    /// Run cycles until `done` holds for a report
    pub fn cycle_until<F: Fn(&CycleReport, &Server) -> bool>(&mut self, done: F) -> CycleReport {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let report = self.cycle();
            if done(&report, &self.server) {
                return report;
            }
            assert!(Instant::now() < deadline, "condition not reached");
            std::thread::sleep(Duration::from_millis(2));
        }
    }

    /// Connect a client and cycle until the server admits it
    pub fn connect(&mut self) -> TestClient {
        let client = TestClient::connect(self.addr);
        let before = self.server.client_count();
        self.cycle_until(|_, s| s.client_count() > before);
        client
    }
}

// ============================================================================
// Test client
// ============================================================================

/// Blocking client speaking the wire protocol
pub struct TestClient {
    pub stream: TcpStream,
    codec: Codec,
    buffer: Vec<u8>,
    pending: VecDeque<Message>,
}

impl TestClient {
    pub fn connect(addr: SocketAddr) -> Self {
        let stream = TcpStream::connect(addr).expect("connect");
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        Self {
            stream,
            codec: Codec::default(),
            buffer: Vec::new(),
            pending: VecDeque::new(),
        }
    }

    pub fn send(&mut self, message: ControlMessage) {
        let bytes = Codec::encode_to_vec(&Message::Control {
            timestamp_ns: 0,
            message,
        });
        self.stream.write_all(&bytes).expect("send control");
    }

    pub fn send_raw(&mut self, bytes: &[u8]) {
        self.stream.write_all(bytes).expect("send raw");
    }

    /// Next message, blocking up to the read timeout
    pub fn recv(&mut self) -> Message {
        loop {
            if let Some(msg) = self.pending.pop_front() {
                return msg;
            }
            while let Some((msg, used)) = self.codec.decode(&self.buffer).expect("valid server bytes") {
                self.pending.push_back(msg);
                self.buffer.drain(..used);
            }
            if !self.pending.is_empty() {
                continue;
            }
            let mut chunk = [0u8; 64 * 1024];
            let n = self.stream.read(&mut chunk).expect("read from server");
            assert!(n > 0, "server closed connection");
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// All messages broadcast in the cycle described by `report`
    ///
    /// Skips anything from earlier cycles.
    pub fn recv_cycle(&mut self, report: &CycleReport) -> Vec<Message> {
        let expected = report.frames_sent + report.detections_sent;
        let mut out = Vec::new();
        while out.len() < expected {
            let msg = self.recv();
            if msg.timestamp_ns() == report.timestamp_ns {
                out.push(msg);
            } else {
                assert!(msg.timestamp_ns() < report.timestamp_ns, "message from the future");
            }
        }
        out
    }

    /// True once the server has closed this connection
    pub fn is_closed(&mut self) -> bool {
        self.stream
            .set_read_timeout(Some(Duration::from_millis(50)))
            .expect("read timeout");
        let mut chunk = [0u8; 64 * 1024];
        let closed = loop {
            match self.stream.read(&mut chunk) {
                Ok(0) => break true,
                Ok(_) => continue,
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    break false;
                }
                Err(_) => break true,
            }
        };
        self.stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .expect("read timeout");
        closed
    }
}
