//! Camera and Detector traits
//!
//! The server never touches capture hardware or model weights directly. It
//! owns one boxed [`Camera`] and one boxed [`Detector`], created by
//! [`crate::devices`] from configuration or injected by tests.

use crate::core::types::{Frame, LensCalibration, RawDetection, Rotation};
use crate::error::Result;

/// Source of successive frames
pub trait Camera: Send {
    /// Acquire the device
    ///
    /// Called once before the first capture. A failure here is fatal.
    fn open(&mut self) -> Result<()>;

    /// Capture one frame with rotation and calibration already applied
    fn capture(&mut self) -> Result<Frame>;

    /// Rotation to apply to subsequent captures
    fn set_rotation(&mut self, rotation: Rotation);

    /// Lens correction to apply to subsequent captures
    fn set_calibration(&mut self, calibration: &LensCalibration);

    /// Release the device; must be safe to call more than once
    fn release(&mut self);
}

/// Object detector
pub trait Detector: Send {
    /// Run inference on a frame
    ///
    /// Returns every detection the model produced, unfiltered.
    fn infer(&mut self, frame: &Frame, iou_threshold: f32) -> Result<Vec<RawDetection>>;

    /// Render detections onto a copy of the frame
    fn render_annotated(&mut self, frame: &Frame, detections: &[RawDetection]) -> Result<Frame>;
}
