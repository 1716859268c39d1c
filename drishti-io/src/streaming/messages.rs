//! Message types carried over the wire
//!
//! Outbound: [`FrameMessage`] and [`DetectionMessage`]. Inbound:
//! [`ControlMessage`] wrapped with its header timestamp.

use crate::core::types::{LensCalibration, Rotation, TargetClass};

/// Message type tags
pub mod tag {
    pub const RAW_FRAME: u8 = 1;
    pub const ANNOTATED_FRAME: u8 = 2;
    pub const DETECTION: u8 = 3;
    pub const STREAM_ON: u8 = 4;
    pub const DETECT_STREAM_ON: u8 = 5;
    pub const STREAM_OFF: u8 = 6;
    pub const DETECT_STREAM_OFF: u8 = 7;
    pub const SELECT_WORKPIECE: u8 = 8;
    pub const SELECT_CONVEYOR: u8 = 9;
    pub const SELECT_SLIDE: u8 = 10;
    pub const DETECT_OFF: u8 = 11;
    pub const SET_CONFIDENCE: u8 = 12;
    pub const SET_IOU: u8 = 13;
    pub const SET_CALIBRATION: u8 = 14;
    pub const CAPTURE_SNAPSHOT: u8 = 15;
}

/// Which frame stream a [`FrameMessage`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Raw,
    Annotated,
}

impl FrameKind {
    pub fn tag(self) -> u8 {
        match self {
            FrameKind::Raw => tag::RAW_FRAME,
            FrameKind::Annotated => tag::ANNOTATED_FRAME,
        }
    }
}

/// Encoded image plus its dimensions
///
/// `payload` is opaque to the codec; its length is the frame length field.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameMessage {
    pub kind: FrameKind,
    pub timestamp_ns: u64,
    pub height: u32,
    pub width: u32,
    pub payload: Vec<u8>,
}

/// One detected object, coordinates as fractions of frame size
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DetectionMessage {
    pub timestamp_ns: u64,
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl DetectionMessage {
    /// Zero-valued liveness record sent when nothing passes the filter
    pub fn heartbeat(timestamp_ns: u64) -> Self {
        Self {
            timestamp_ns,
            ..Default::default()
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        *self == Self::heartbeat(self.timestamp_ns)
    }
}

/// Inbound control commands
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ControlMessage {
    /// Tag 4: start raw frame stream
    StreamOn,
    /// Tag 5: start annotated frame stream
    DetectStreamOn,
    /// Tag 6: stop raw frame stream
    StreamOff,
    /// Tag 7: stop annotated frame stream
    DetectStreamOff,
    /// Tags 8/9/10: enable detection for one class
    SelectClass(TargetClass),
    /// Tag 11
    DetectOff,
    /// Tag 12
    SetConfidence(f32),
    /// Tag 13
    SetIou(f32),
    /// Tag 14: rotation and lens calibration, always together
    SetCalibration {
        rotation: Rotation,
        calibration: LensCalibration,
    },
    /// Tag 15: persist the next frame once
    CaptureSnapshot,
}

impl ControlMessage {
    pub fn tag(&self) -> u8 {
        match self {
            ControlMessage::StreamOn => tag::STREAM_ON,
            ControlMessage::DetectStreamOn => tag::DETECT_STREAM_ON,
            ControlMessage::StreamOff => tag::STREAM_OFF,
            ControlMessage::DetectStreamOff => tag::DETECT_STREAM_OFF,
            ControlMessage::SelectClass(TargetClass::Workpiece) => tag::SELECT_WORKPIECE,
            ControlMessage::SelectClass(TargetClass::Conveyor) => tag::SELECT_CONVEYOR,
            ControlMessage::SelectClass(TargetClass::Slide) => tag::SELECT_SLIDE,
            ControlMessage::DetectOff => tag::DETECT_OFF,
            ControlMessage::SetConfidence(_) => tag::SET_CONFIDENCE,
            ControlMessage::SetIou(_) => tag::SET_IOU,
            ControlMessage::SetCalibration { .. } => tag::SET_CALIBRATION,
            ControlMessage::CaptureSnapshot => tag::CAPTURE_SNAPSHOT,
        }
    }
}

/// Any message on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Frame(FrameMessage),
    Detection(DetectionMessage),
    Control {
        timestamp_ns: u64,
        message: ControlMessage,
    },
}

impl Message {
    pub fn tag(&self) -> u8 {
        match self {
            Message::Frame(f) => f.kind.tag(),
            Message::Detection(_) => tag::DETECTION,
            Message::Control { message, .. } => message.tag(),
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        match self {
            Message::Frame(f) => f.timestamp_ns,
            Message::Detection(d) => d.timestamp_ns,
            Message::Control { timestamp_ns, .. } => *timestamp_ns,
        }
    }
}
