//! Synthetic camera
//!
//! Renders a grey gradient with a red workpiece marker sliding left to right
//! and, optionally, a static blue conveyor marker. Rotation is applied to the
//! rendered frame; calibration is recorded but not applied.

use super::config::MockConfig;
use super::{CONVEYOR_RGB, WORKPIECE_RGB};
use crate::core::collaborator::Camera;
use crate::core::imaging;
use crate::core::types::{Frame, LensCalibration, Rotation, now_ns};
use crate::error::{Error, Result};
use log::{debug, info};

pub struct MockCamera {
    config: MockConfig,
    rotation: Rotation,
    calibration: LensCalibration,
    frame_index: u64,
    opened: bool,
}

impl MockCamera {
    pub fn new(config: MockConfig) -> Self {
        Self {
            config,
            rotation: Rotation::Deg0,
            calibration: LensCalibration::identity(),
            frame_index: 0,
            opened: false,
        }
    }

    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    pub fn calibration(&self) -> &LensCalibration {
        &self.calibration
    }

    /// Top-left corner of the workpiece marker for a frame index
    pub fn workpiece_origin(&self, frame_index: u64) -> (u32, u32) {
        let c = &self.config;
        let span = c.width.saturating_sub(c.box_size).max(1) as u64;
        let x = (frame_index * c.speed_px as u64 % span) as u32;
        let y = c.height.saturating_sub(c.box_size) / 2;
        (x, y)
    }

    fn render(&self, frame_index: u64, timestamp_ns: u64) -> Frame {
        let c = &self.config;
        let (w, h) = (c.width as usize, c.height as usize);
        let mut pixels = Vec::with_capacity(w * h * 3);
        for y in 0..h {
            for x in 0..w {
                let v = (64 + (x + y) % 128) as u8;
                pixels.extend_from_slice(&[v, v, v]);
            }
        }
        let mut frame = Frame {
            timestamp_ns,
            width: c.width,
            height: c.height,
            pixels,
        };

        let (bx, by) = self.workpiece_origin(frame_index);
        fill_rect(&mut frame, bx, by, c.box_size, c.box_size, WORKPIECE_RGB);

        if c.distractor {
            let side = (c.box_size / 2).max(1);
            let dy = c.height.saturating_sub(side + 4);
            fill_rect(&mut frame, 4, dy, side, side, CONVEYOR_RGB);
        }
        frame
    }
}

fn fill_rect(frame: &mut Frame, x0: u32, y0: u32, w: u32, h: u32, rgb: [u8; 3]) {
    let x1 = (x0 + w).min(frame.width);
    let y1 = (y0 + h).min(frame.height);
    for y in y0..y1 {
        for x in x0..x1 {
            let idx = ((y * frame.width + x) * 3) as usize;
            frame.pixels[idx..idx + 3].copy_from_slice(&rgb);
        }
    }
}

impl Camera for MockCamera {
    fn open(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(Error::FatalStartup(format!(
                "mock camera size {}x{} is empty",
                self.config.width, self.config.height
            )));
        }
        self.opened = true;
        info!(
            "Mock camera opened ({}x{})",
            self.config.width, self.config.height
        );
        Ok(())
    }

    fn capture(&mut self) -> Result<Frame> {
        if !self.opened {
            return Err(Error::AcquisitionFailure("camera not open".to_string()));
        }
        let index = self.frame_index;
        self.frame_index += 1;

        let every = self.config.fail_every;
        if every > 0 && index % every == every - 1 {
            return Err(Error::AcquisitionFailure(format!(
                "simulated dropout at frame {}",
                index
            )));
        }

        let frame = self.render(index, now_ns());
        imaging::rotate(&frame, self.rotation)
    }

    fn set_rotation(&mut self, rotation: Rotation) {
        debug!("Mock camera rotation -> {}°", rotation.degrees());
        self.rotation = rotation;
    }

    fn set_calibration(&mut self, calibration: &LensCalibration) {
        debug!("Mock camera calibration -> {:?}", calibration);
        self.calibration = *calibration;
    }

    fn release(&mut self) {
        if self.opened {
            self.opened = false;
            info!("Mock camera released");
        }
    }
}
