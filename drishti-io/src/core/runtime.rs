//! Runtime configuration shared between the control path and the loop
//!
//! One [`RuntimeConfig`] record lives behind a [`SharedConfig`] handle. The
//! orchestration loop takes a consistent copy at the start of each cycle and
//! control messages are applied inside a single write-lock critical section,
//! so a reader never observes half of a multi-field update such as a
//! calibration change.
//!
//! ```text
//!  control message ──apply()──▶ ┌───────────────────────────┐
//!                               │ RwLock<RuntimeConfig>     │
//!  orchestration loop ◀─snapshot()─ (Arc shared handle)     │
//!                               └───────────────────────────┘
//! ```

use crate::core::types::{LensCalibration, Rotation, TargetClass};
use crate::streaming::messages::ControlMessage;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// All tunables read by the orchestration loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Broadcast raw frames
    #[serde(default = "default_true")]
    pub stream_raw: bool,

    /// Broadcast detector-annotated frames
    #[serde(default)]
    pub stream_annotated: bool,

    /// Run the detector each cycle
    #[serde(default = "default_true")]
    pub detect_enabled: bool,

    /// Class reported to clients
    #[serde(default)]
    pub target_class: TargetClass,

    /// Minimum confidence for a detection to be broadcast
    #[serde(default = "default_confidence")]
    pub confidence_threshold: f32,

    /// IoU threshold passed to the detector
    #[serde(default = "default_iou")]
    pub iou_threshold: f32,

    #[serde(default)]
    pub rotation: Rotation,

    #[serde(default)]
    pub calibration: LensCalibration,

    /// One-shot snapshot request, cleared once served
    #[serde(skip)]
    pub snapshot_requested: bool,
}

fn default_true() -> bool {
    true
}

fn default_confidence() -> f32 {
    0.2
}

fn default_iou() -> f32 {
    0.3
}

impl RuntimeConfig {
    /// Apply one control message, returning whether anything changed
    pub fn apply(&mut self, msg: &ControlMessage) -> bool {
        let before = self.clone();
        match *msg {
            ControlMessage::StreamOn => self.stream_raw = true,
            ControlMessage::DetectStreamOn => self.stream_annotated = true,
            ControlMessage::StreamOff => self.stream_raw = false,
            ControlMessage::DetectStreamOff => self.stream_annotated = false,
            ControlMessage::SelectClass(class) => {
                self.detect_enabled = true;
                self.target_class = class;
            }
            ControlMessage::DetectOff => self.detect_enabled = false,
            ControlMessage::SetConfidence(v) => self.confidence_threshold = v,
            ControlMessage::SetIou(v) => self.iou_threshold = v,
            ControlMessage::SetCalibration {
                rotation,
                calibration,
            } => {
                self.rotation = rotation;
                self.calibration = calibration;
            }
            ControlMessage::CaptureSnapshot => self.snapshot_requested = true,
        }
        *self != before
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            stream_raw: true,
            stream_annotated: false,
            detect_enabled: true,
            target_class: TargetClass::Workpiece,
            confidence_threshold: default_confidence(),
            iou_threshold: default_iou(),
            rotation: Rotation::Deg0,
            calibration: LensCalibration::identity(),
            snapshot_requested: false,
        }
    }
}

/// Cloneable handle to the single runtime configuration record
#[derive(Debug, Clone, Default)]
pub struct SharedConfig {
    inner: Arc<RwLock<RuntimeConfig>>,
}

impl SharedConfig {
    pub fn new(initial: RuntimeConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(initial)),
        }
    }

    /// Consistent copy of the whole record
    pub fn snapshot(&self) -> RuntimeConfig {
        self.inner.read().clone()
    }

    /// Apply a control message under one write lock
    pub fn apply(&self, msg: &ControlMessage) -> bool {
        self.inner.write().apply(msg)
    }

    /// Read and clear the one-shot snapshot flag
    pub fn take_snapshot_request(&self) -> bool {
        let mut config = self.inner.write();
        std::mem::take(&mut config.snapshot_requested)
    }
}
