//! Core abstractions for the vision pipeline.
//!
//! - [`collaborator`]: Camera and Detector traits to implement for new hardware
//! - [`types`]: Frames, detections and the tunables forwarded to collaborators
//! - [`runtime`]: Shared runtime configuration mutated by control messages
//! - [`imaging`]: JPEG encoding and pixel helpers

pub mod collaborator;
pub mod imaging;
pub mod runtime;
pub mod types;

pub use collaborator::{Camera, Detector};
pub use runtime::{RuntimeConfig, SharedConfig};
pub use types::{Frame, LensCalibration, RawDetection, Rotation, TargetClass};
