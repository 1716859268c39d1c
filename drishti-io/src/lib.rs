//! DrishtiIO - Machine-vision streaming server
//!
//! One camera and one object detector feed any number of TCP clients with
//! raw frames, annotated frames and per-object detections. Clients steer the
//! pipeline at runtime with control messages on the same connection.
//!
//! - [`streaming`]: Wire codec, connection registry, control-message handling
//! - [`core`]: Camera/Detector traits, shared runtime configuration, imaging
//! - [`server`]: The single-threaded orchestration loop
//! - [`devices`]: Camera and detector implementations (`mock`)

pub mod config;
pub mod core;
pub mod devices;
pub mod error;
pub mod server;
pub mod snapshot;
pub mod streaming;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{Error, Result};
pub use server::{CycleReport, LoopState, Server};
