//! Mock scene configuration
//!
//! ```text
//! MockConfig
//! ├── width, height             # Frame size before rotation
//! ├── box_size, speed_px        # Moving workpiece marker
//! ├── confidence, jitter        # Reported confidence ± gaussian noise
//! ├── distractor                # Static conveyor marker (class 0)
//! ├── seed                      # 0 = random each run
//! └── fail_every                # Simulated capture dropouts (0 = never)
//! ```

use serde::{Deserialize, Serialize};

/// Synthetic camera and detector parameters
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MockConfig {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    /// Side of the workpiece marker (pixels)
    #[serde(default = "default_box_size")]
    pub box_size: u32,

    /// Horizontal marker motion per frame (pixels)
    #[serde(default = "default_speed_px")]
    pub speed_px: u32,

    /// Mean confidence reported for the workpiece marker
    #[serde(default = "default_confidence")]
    pub confidence: f32,

    /// Confidence standard deviation
    #[serde(default = "default_jitter")]
    pub jitter: f32,

    /// Draw a conveyor marker as a second, off-target detection
    #[serde(default = "default_distractor")]
    pub distractor: bool,

    /// Mean confidence for the conveyor marker
    #[serde(default = "default_distractor_confidence")]
    pub distractor_confidence: f32,

    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Fail every Nth capture
    #[serde(default)]
    pub fail_every: u64,
}

fn default_width() -> u32 {
    640
}

fn default_height() -> u32 {
    480
}

fn default_box_size() -> u32 {
    80
}

fn default_speed_px() -> u32 {
    8
}

fn default_confidence() -> f32 {
    0.85
}

fn default_jitter() -> f32 {
    0.05
}

fn default_distractor() -> bool {
    true
}

fn default_distractor_confidence() -> f32 {
    0.6
}

fn default_seed() -> u64 {
    42
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            box_size: default_box_size(),
            speed_px: default_speed_px(),
            confidence: default_confidence(),
            jitter: default_jitter(),
            distractor: default_distractor(),
            distractor_confidence: default_distractor_confidence(),
            seed: default_seed(),
            fail_every: 0,
        }
    }
}
