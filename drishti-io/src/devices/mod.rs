//! Device implementations

pub mod mock;

use crate::config::DeviceConfig;
use crate::core::collaborator::{Camera, Detector};
use crate::error::{Error, Result};
use mock::{MockCamera, MockDetector};

/// Create a camera based on configuration
pub fn create_camera(config: &DeviceConfig) -> Result<Box<dyn Camera>> {
    match config.camera.as_str() {
        "mock" => Ok(Box::new(MockCamera::new(config.mock.clone()))),
        _ => Err(Error::UnknownDevice(config.camera.clone())),
    }
}

/// Create a detector based on configuration
pub fn create_detector(config: &DeviceConfig) -> Result<Box<dyn Detector>> {
    match config.detector.as_str() {
        "mock" => Ok(Box::new(MockDetector::new(config.mock.clone()))),
        _ => Err(Error::UnknownDevice(config.detector.clone())),
    }
}
