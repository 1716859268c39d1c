//! Orchestration loop
//!
//! One thread, one pass per cycle, no parallel cycles in flight:
//!
//! ```text
//!  ┌──────┐   ┌───────────┐   ┌───────────┐   ┌───────────┐   ┌──────────────┐
//!  │ Idle │──▶│ PollingIO │──▶│ Acquiring │──▶│ Detecting │──▶│ Broadcasting │──┐
//!  └──────┘   └───────────┘   └───────────┘   └───────────┘   └──────────────┘  │
//!     ▲            accept,         capture()      infer() if      raw frame,      │
//!     │            control         (rotation +    detect_enabled  annotated,      │
//!     │            input           calibration)                   detections,     │
//!     │                                                           snapshot        │
//!     └───────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Failure handling
//!
//! | Failure | Effect |
//! |---------|--------|
//! | Malformed or closed client | That client is removed |
//! | Slow client | That client is removed |
//! | Acquisition | Rest of cycle skipped, error returned to [`Server::run`] |
//! | Detection | No detections this cycle; raw frame still sent |
//! | Raw frame encoding | Rest of cycle skipped |
//! | Annotation or its encoding | Annotated frame skipped; detections still sent |
//! | Snapshot write | Logged; one-shot flag still cleared |
//!
//! [`Server::run`] logs cycle errors, sleeps `error_backoff` and continues.
//! Only [`Server::bind`] can fail fatally.

use crate::config::{AppConfig, ServerConfig, StreamConfig};
use crate::core::collaborator::{Camera, Detector};
use crate::core::imaging;
use crate::core::runtime::{RuntimeConfig, SharedConfig};
use crate::core::types::{Frame, LensCalibration, RawDetection, Rotation};
use crate::error::{Error, ErrorScope, Result};
use crate::snapshot::{SnapshotFiles, SnapshotStore};
use crate::streaming::control::ControlHandler;
use crate::streaming::messages::{DetectionMessage, FrameKind, FrameMessage, Message};
use crate::streaming::registry::{ClientId, ConnectionRegistry};
use crate::streaming::wire::Codec;
use log::{debug, info, trace, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Orchestration loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    PollingIO,
    Acquiring,
    Detecting,
    Broadcasting,
}

/// What one cycle did
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CycleReport {
    pub timestamp_ns: u64,
    pub admitted: Vec<ClientId>,
    pub removed: Vec<ClientId>,
    pub controls_applied: usize,
    pub frames_sent: usize,
    /// Detection messages broadcast, heartbeat included
    pub detections_sent: usize,
    pub heartbeat: bool,
    pub detection_ran: bool,
    pub detection_failed: bool,
    pub snapshot: Option<SnapshotFiles>,
    /// Shutdown was requested mid-cycle
    pub interrupted: bool,
}

/// Running totals for the statistics log line
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ServerStats {
    pub cycles: u64,
    pub frames_sent: u64,
    pub detections_sent: u64,
    pub acquisition_failures: u64,
    pub detection_failures: u64,
    pub cycle_errors: u64,
    pub snapshots: u64,
}

/// Vision streaming server
pub struct Server {
    registry: ConnectionRegistry,
    control: ControlHandler,
    camera: Box<dyn Camera>,
    detector: Box<dyn Detector>,
    config: SharedConfig,
    snapshots: SnapshotStore,
    stream: StreamConfig,
    timing: ServerConfig,
    applied_rotation: Option<Rotation>,
    applied_calibration: Option<LensCalibration>,
    state: LoopState,
    stats: ServerStats,
    out_buffer: Vec<u8>,
    running: Option<Arc<AtomicBool>>,
    torn_down: bool,
}

impl Server {
    /// Open the camera and bind the listener
    ///
    /// Any failure releases what was already acquired and is returned as
    /// [`Error::FatalStartup`].
    pub fn bind(
        app: &AppConfig,
        mut camera: Box<dyn Camera>,
        detector: Box<dyn Detector>,
        config: SharedConfig,
    ) -> Result<Self> {
        if let Err(e) = camera.open() {
            camera.release();
            return Err(Error::FatalStartup(format!("camera unavailable: {}", e)));
        }

        let bind_address = &app.network.bind_address;
        let registry = match ConnectionRegistry::bind(bind_address, app.network.registry_limits()) {
            Ok(r) => r,
            Err(e) => {
                camera.release();
                return Err(Error::FatalStartup(format!(
                    "failed to bind {}: {}",
                    bind_address, e
                )));
            }
        };

        let control = ControlHandler::new(
            Codec::new(app.network.max_payload_bytes),
            config.clone(),
            app.network.partial_message_timeout(),
        );

        Ok(Self {
            registry,
            control,
            camera,
            detector,
            config,
            snapshots: SnapshotStore::new(&app.snapshot.directory, app.stream.jpeg_quality),
            stream: app.stream.clone(),
            timing: app.server.clone(),
            applied_rotation: None,
            applied_calibration: None,
            state: LoopState::Idle,
            stats: ServerStats::default(),
            out_buffer: Vec::with_capacity(256 * 1024),
            running: None,
            torn_down: false,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.registry.local_addr()
    }

    /// Handle to the runtime configuration
    pub fn shared_config(&self) -> &SharedConfig {
        &self.config
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    pub fn client_count(&self) -> usize {
        self.registry.len()
    }

    /// Install the flag checked between states
    pub fn set_running_flag(&mut self, running: Arc<AtomicBool>) {
        self.running = Some(running);
    }

    fn interrupted(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|r| !r.load(Ordering::Relaxed))
    }

    fn transition(&mut self, next: LoopState) {
        trace!("{:?} -> {:?}", self.state, next);
        self.state = next;
    }

    /// Run until the flag clears, then tear down
    pub fn run(&mut self, running: Arc<AtomicBool>) -> Result<()> {
        self.set_running_flag(Arc::clone(&running));
        info!("Serving on {}", self.local_addr()?);

        let stats_interval = Duration::from_secs(self.timing.stats_interval_secs.max(1));
        let mut last_stats = Instant::now();

        while running.load(Ordering::Relaxed) {
            let started = Instant::now();

            if let Err(e) = self.run_cycle() {
                self.stats.cycle_errors += 1;
                if e.scope() == ErrorScope::Fatal {
                    self.teardown();
                    return Err(e);
                }
                warn!("Cycle failed: {}", e);
                std::thread::sleep(self.timing.error_backoff());
            }

            if last_stats.elapsed() >= stats_interval {
                self.log_statistics();
                last_stats = Instant::now();
            }

            let elapsed = started.elapsed();
            let interval = self.timing.cycle_interval();
            if elapsed < interval {
                std::thread::sleep(interval - elapsed);
            }
        }

        info!("Shutdown requested");
        self.teardown();
        Ok(())
    }

    /// One full pass through the loop states
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let mut report = CycleReport::default();
        let result = self.cycle(&mut report);
        self.stats.cycles += 1;
        self.transition(LoopState::Idle);
        result.map(|()| report)
    }

    fn cycle(&mut self, report: &mut CycleReport) -> Result<()> {
        // PollingIO
        self.transition(LoopState::PollingIO);
        self.poll_io(report);
        if self.interrupted() {
            report.interrupted = true;
            return Ok(());
        }

        // Acquiring
        self.transition(LoopState::Acquiring);
        let config = self.config.snapshot();
        self.sync_camera(&config);
        let frame = match self.camera.capture() {
            Ok(frame) => frame,
            Err(e @ Error::AcquisitionFailure(_)) => {
                self.stats.acquisition_failures += 1;
                return Err(e);
            }
            Err(other) => {
                self.stats.acquisition_failures += 1;
                return Err(Error::AcquisitionFailure(other.to_string()));
            }
        };
        report.timestamp_ns = frame.timestamp_ns;
        if self.interrupted() {
            report.interrupted = true;
            return Ok(());
        }

        // Detecting
        let mut raw: Option<Vec<RawDetection>> = None;
        let mut outbound: Vec<DetectionMessage> = Vec::new();
        if config.detect_enabled {
            self.transition(LoopState::Detecting);
            report.detection_ran = true;
            match self.detector.infer(&frame, config.iou_threshold) {
                Ok(found) => {
                    outbound = filter_detections(&frame, &found, &config);
                    if outbound.is_empty() {
                        outbound.push(DetectionMessage::heartbeat(frame.timestamp_ns));
                        report.heartbeat = true;
                    }
                    raw = Some(found);
                }
                Err(e) => {
                    self.stats.detection_failures += 1;
                    report.detection_failed = true;
                    warn!("Detection failed: {}", e);
                }
            }
        }

        // Broadcasting
        self.transition(LoopState::Broadcasting);
        if config.stream_raw {
            let payload = imaging::encode_payload(
                &frame,
                self.stream.jpeg_quality,
                self.stream.payload_encoding,
            )?;
            self.publish_frame(FrameKind::Raw, &frame, payload, report);
        }

        if let Some(found) = &raw {
            if config.stream_annotated {
                match self.detector.render_annotated(&frame, found) {
                    Ok(annotated) => match imaging::encode_payload(
                        &annotated,
                        self.stream.jpeg_quality,
                        self.stream.payload_encoding,
                    ) {
                        Ok(payload) => {
                            self.publish_frame(FrameKind::Annotated, &annotated, payload, report)
                        }
                        Err(e) => warn!("Annotated frame encoding failed: {}", e),
                    },
                    Err(e) => warn!("Annotation failed: {}", e),
                }
            }
            for det in &outbound {
                self.publish(&Message::Detection(*det), report);
                report.detections_sent += 1;
            }
        }

        if self.config.take_snapshot_request() {
            report.snapshot = self.write_snapshot(&frame, raw.as_deref());
        }

        self.stats.frames_sent += report.frames_sent as u64;
        self.stats.detections_sent += report.detections_sent as u64;
        Ok(())
    }

    fn poll_io(&mut self, report: &mut CycleReport) {
        let events = self.registry.poll_readable();
        report.admitted = events.admitted;

        for id in events.exceptional {
            if self.registry.remove(id, &Error::ClientDisconnected) {
                report.removed.push(id);
            }
        }

        let readable: Vec<ClientId> = events
            .readable
            .into_iter()
            .filter(|id| self.registry.contains(*id))
            .collect();
        let control = self.control.service_readable(&mut self.registry, &readable);
        report.controls_applied = control.applied;
        report.removed.extend(control.removed);
        report.removed.extend(self.control.expire_partials(&mut self.registry));
        report.removed.extend(self.registry.flush_pending());
    }

    /// Forward rotation and calibration to the camera when they change
    fn sync_camera(&mut self, config: &RuntimeConfig) {
        if self.applied_rotation != Some(config.rotation) {
            debug!("Camera rotation {}°", config.rotation.degrees());
            self.camera.set_rotation(config.rotation);
            self.applied_rotation = Some(config.rotation);
        }
        if self.applied_calibration != Some(config.calibration) {
            debug!("Camera calibration updated");
            self.camera.set_calibration(&config.calibration);
            self.applied_calibration = Some(config.calibration);
        }
    }

    fn publish_frame(
        &mut self,
        kind: FrameKind,
        frame: &Frame,
        payload: Vec<u8>,
        report: &mut CycleReport,
    ) {
        let msg = Message::Frame(FrameMessage {
            kind,
            timestamp_ns: frame.timestamp_ns,
            height: frame.height,
            width: frame.width,
            payload,
        });
        self.publish(&msg, report);
        report.frames_sent += 1;
    }

    fn publish(&mut self, msg: &Message, report: &mut CycleReport) {
        self.out_buffer.clear();
        Codec::encode(msg, &mut self.out_buffer);
        report.removed.extend(self.registry.broadcast(&self.out_buffer));
    }

    fn write_snapshot(
        &mut self,
        frame: &Frame,
        detections: Option<&[RawDetection]>,
    ) -> Option<SnapshotFiles> {
        let inferred;
        let detections = match detections {
            Some(d) => d,
            None => {
                let iou = self.config.snapshot().iou_threshold;
                inferred = self.detector.infer(frame, iou).unwrap_or_else(|e| {
                    warn!("Snapshot detection failed: {}", e);
                    Vec::new()
                });
                &inferred
            }
        };
        match self.snapshots.write(frame, detections) {
            Ok(files) => {
                self.stats.snapshots += 1;
                Some(files)
            }
            Err(e) => {
                warn!(
                    "Snapshot to {} failed: {}",
                    self.snapshots.directory().display(),
                    e
                );
                None
            }
        }
    }

    fn log_statistics(&self) {
        let s = &self.stats;
        info!(
            "Stats: {} cycles, {} clients, {} frames, {} detections, {} acquisition / {} detection failures, {} snapshots",
            s.cycles,
            self.registry.len(),
            s.frames_sent,
            s.detections_sent,
            s.acquisition_failures,
            s.detection_failures,
            s.snapshots
        );
    }

    /// Close all clients and the listener, release the camera
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;
        let clients = self.registry.len();
        self.registry.close_all();
        self.registry.close_listener();
        self.camera.release();
        info!("Server stopped ({} clients closed)", clients);
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Keep detections of the target class at or above the confidence
/// threshold, normalized to frame size
pub fn filter_detections(
    frame: &Frame,
    found: &[RawDetection],
    config: &RuntimeConfig,
) -> Vec<DetectionMessage> {
    let (fw, fh) = (frame.width.max(1) as f32, frame.height.max(1) as f32);
    let target = config.target_class.class_id();
    found
        .iter()
        .filter(|d| d.confidence >= config.confidence_threshold && d.class_id == target)
        .map(|d| DetectionMessage {
            timestamp_ns: frame.timestamp_ns,
            x: d.cx / fw,
            y: d.cy / fh,
            w: d.w / fw,
            h: d.h / fh,
            confidence: d.confidence,
            class_id: d.class_id,
        })
        .collect()
}
