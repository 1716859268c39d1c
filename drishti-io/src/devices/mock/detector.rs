//! Colour-key detector for the synthetic scene
//!
//! Finds the bounding box of each marker colour and reports it with a
//! jittered confidence. Works on rotated frames since it only looks at pixels.

use super::config::MockConfig;
use super::noise::NoiseGenerator;
use super::{CONVEYOR_RGB, WORKPIECE_RGB};
use crate::core::collaborator::Detector;
use crate::core::imaging;
use crate::core::types::{Frame, RawDetection, TargetClass};
use crate::error::{Error, Result};
use log::trace;

/// Outline colour used for annotated frames
const ANNOTATION_RGB: [u8; 3] = [0, 255, 0];

pub struct MockDetector {
    config: MockConfig,
    noise: NoiseGenerator,
}

impl MockDetector {
    pub fn new(config: MockConfig) -> Self {
        let noise = NoiseGenerator::new(config.seed);
        Self { config, noise }
    }
}

/// Pixel bounding box of one colour, as (x0, y0, x1, y1) inclusive
fn bounding_box(frame: &Frame, rgb: [u8; 3]) -> Option<(u32, u32, u32, u32)> {
    let mut found: Option<(u32, u32, u32, u32)> = None;
    for (i, px) in frame.pixels.chunks_exact(3).enumerate() {
        if px != &rgb[..] {
            continue;
        }
        let x = i as u32 % frame.width;
        let y = i as u32 / frame.width;
        found = Some(match found {
            None => (x, y, x, y),
            Some((x0, y0, x1, y1)) => (x0.min(x), y0.min(y), x1.max(x), y1.max(y)),
        });
    }
    found
}

fn to_detection(b: (u32, u32, u32, u32), confidence: f32, class: TargetClass) -> RawDetection {
    let (x0, y0, x1, y1) = b;
    let w = (x1 - x0 + 1) as f32;
    let h = (y1 - y0 + 1) as f32;
    RawDetection {
        cx: x0 as f32 + w / 2.0,
        cy: y0 as f32 + h / 2.0,
        w,
        h,
        confidence,
        class_id: class.class_id(),
    }
}

impl Detector for MockDetector {
    fn infer(&mut self, frame: &Frame, iou_threshold: f32) -> Result<Vec<RawDetection>> {
        if frame.width == 0 || frame.pixels.len() != (frame.width * frame.height * 3) as usize {
            return Err(Error::DetectionFailure(format!(
                "unusable frame {}x{} ({} bytes)",
                frame.width,
                frame.height,
                frame.pixels.len()
            )));
        }
        trace!("Mock inference (iou {:.2})", iou_threshold);

        let mut detections = Vec::with_capacity(2);
        if let Some(b) = bounding_box(frame, WORKPIECE_RGB) {
            let conf = self.noise.jitter_unit(self.config.confidence, self.config.jitter);
            detections.push(to_detection(b, conf, TargetClass::Workpiece));
        }
        if self.config.distractor
            && let Some(b) = bounding_box(frame, CONVEYOR_RGB)
        {
            let conf = self
                .noise
                .jitter_unit(self.config.distractor_confidence, self.config.jitter);
            detections.push(to_detection(b, conf, TargetClass::Conveyor));
        }
        Ok(detections)
    }

    fn render_annotated(&mut self, frame: &Frame, detections: &[RawDetection]) -> Result<Frame> {
        let mut out = frame.clone();
        for d in detections {
            let x0 = (d.cx - d.w / 2.0).round() as i64;
            let y0 = (d.cy - d.h / 2.0).round() as i64;
            let x1 = (d.cx + d.w / 2.0).round() as i64 - 1;
            let y1 = (d.cy + d.h / 2.0).round() as i64 - 1;
            imaging::draw_rect(&mut out, x0, y0, x1, y1, ANNOTATION_RGB, 2);
        }
        Ok(out)
    }
}
