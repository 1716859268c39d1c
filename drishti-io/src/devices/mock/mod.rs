//! Mock camera and detector for hardware-free operation
//!
//! The mock camera renders a synthetic scene and the mock detector finds the
//! markers in it by colour, so the whole pipeline (rotation, filtering,
//! annotation, snapshots) runs end to end without a camera or model.
//!
//! # Scene
//!
//! | Marker | Colour | Class |
//! |--------|--------|-------|
//! | Workpiece (moving) | red `(255, 0, 0)` | 2 |
//! | Conveyor (static, optional) | blue `(0, 0, 255)` | 0 |
//!
//! Background is a grey gradient, so no background pixel matches a marker.
//!
//! # Configuration
//!
//! ```toml
//! [device]
//! camera = "mock"
//! detector = "mock"
//!
//! [device.mock]
//! width = 640
//! height = 480
//! box_size = 80
//! speed_px = 8
//! confidence = 0.85
//! jitter = 0.05
//! seed = 42          # 0 = random each run
//! fail_every = 0     # simulate a dropout every N captures
//! ```

pub mod camera;
pub mod config;
pub mod detector;
mod noise;

pub use camera::MockCamera;
pub use config::MockConfig;
pub use detector::MockDetector;

/// Marker colour of the workpiece
pub const WORKPIECE_RGB: [u8; 3] = [255, 0, 0];

/// Marker colour of the conveyor distractor
pub const CONVEYOR_RGB: [u8; 3] = [0, 0, 255];
