//! Core data types shared by the codec, the runtime configuration and the
//! camera/detector collaborators.
//!
//! - [`Frame`]: One RGB8 image plus its acquisition timestamp
//! - [`RawDetection`]: Detector output in pixel coordinates
//! - [`Rotation`], [`TargetClass`], [`LensCalibration`]: Tunables forwarded to collaborators

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Current wall-clock time in nanoseconds since the Unix epoch
#[inline]
pub fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// One acquired image, tightly packed RGB8, row-major
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub timestamp_ns: u64,
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl Frame {
    /// Create a frame, checking the pixel buffer matches the dimensions
    pub fn new(timestamp_ns: u64, width: u32, height: u32, pixels: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if pixels.len() != expected {
            return Err(Error::AcquisitionFailure(format!(
                "frame {}x{} needs {} bytes, got {}",
                width,
                height,
                expected,
                pixels.len()
            )));
        }
        Ok(Self {
            timestamp_ns,
            width,
            height,
            pixels,
        })
    }

    /// Solid-colour frame
    pub fn filled(timestamp_ns: u64, width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();
        Self {
            timestamp_ns,
            width,
            height,
            pixels,
        }
    }
}

/// Detector output: box centre and size in pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawDetection {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
    pub confidence: f32,
    pub class_id: u32,
}

/// Frame rotation applied by the camera before detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    Deg0,
    /// Clockwise quarter turn
    Deg90,
    Deg180,
    /// Counter-clockwise quarter turn
    Deg270,
}

impl Rotation {
    pub fn degrees(self) -> u32 {
        match self {
            Rotation::Deg0 => 0,
            Rotation::Deg90 => 90,
            Rotation::Deg180 => 180,
            Rotation::Deg270 => 270,
        }
    }
}

impl TryFrom<u32> for Rotation {
    type Error = Error;

    fn try_from(degrees: u32) -> Result<Self> {
        match degrees {
            0 => Ok(Rotation::Deg0),
            90 => Ok(Rotation::Deg90),
            180 => Ok(Rotation::Deg180),
            270 => Ok(Rotation::Deg270),
            other => Err(Error::MalformedMessage(format!(
                "rotation {} is not 0, 90, 180 or 270",
                other
            ))),
        }
    }
}

impl From<Rotation> for u32 {
    fn from(r: Rotation) -> u32 {
        r.degrees()
    }
}

/// Detector class reported to clients
///
/// Discriminants are the detector's label ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetClass {
    Conveyor = 0,
    Slide = 1,
    #[default]
    Workpiece = 2,
}

impl TargetClass {
    #[inline]
    pub fn class_id(self) -> u32 {
        self as u32
    }
}

/// Pinhole intrinsics before and after undistortion, plus 5 distortion terms
///
/// Field order matches the calibration message payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LensCalibration {
    pub old_ppx: f32,
    pub old_ppy: f32,
    pub old_fy: f32,
    pub old_fx: f32,
    pub new_ppx: f32,
    pub new_ppy: f32,
    pub new_fy: f32,
    pub new_fx: f32,
    pub distortion: [f32; 5],
}

impl LensCalibration {
    /// Number of f32 fields on the wire
    pub const FIELD_COUNT: usize = 13;

    /// No-op correction: identical intrinsics, zero distortion
    pub fn identity() -> Self {
        Self {
            old_ppx: 0.0,
            old_ppy: 0.0,
            old_fy: 1.0,
            old_fx: 1.0,
            new_ppx: 0.0,
            new_ppy: 0.0,
            new_fy: 1.0,
            new_fx: 1.0,
            distortion: [0.0; 5],
        }
    }

    /// Measured calibration of the Robotino camera module
    pub fn robotino() -> Self {
        Self {
            old_ppx: 247.169_92,
            old_ppy: 311.021_56,
            old_fy: 761.409_2,
            old_fx: 762.698_3,
            new_ppx: 251.008_01,
            new_ppy: 301.327_95,
            new_fy: 634.634_8,
            new_fx: 642.614_74,
            distortion: [-0.503_042_3, 0.578_251_5, -0.007_018_36, 0.003_085_24, -0.713_671_8],
        }
    }

    /// Fields in wire order
    pub fn to_array(&self) -> [f32; Self::FIELD_COUNT] {
        let k = self.distortion;
        [
            self.old_ppx,
            self.old_ppy,
            self.old_fy,
            self.old_fx,
            self.new_ppx,
            self.new_ppy,
            self.new_fy,
            self.new_fx,
            k[0],
            k[1],
            k[2],
            k[3],
            k[4],
        ]
    }

    pub fn from_array(v: [f32; Self::FIELD_COUNT]) -> Self {
        Self {
            old_ppx: v[0],
            old_ppy: v[1],
            old_fy: v[2],
            old_fx: v[3],
            new_ppx: v[4],
            new_ppy: v[5],
            new_fy: v[6],
            new_fx: v[7],
            distortion: [v[8], v[9], v[10], v[11], v[12]],
        }
    }

    pub fn is_finite(&self) -> bool {
        self.to_array().iter().all(|v| v.is_finite())
    }
}

impl Default for LensCalibration {
    fn default() -> Self {
        Self::identity()
    }
}
