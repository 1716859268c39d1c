//! TCP streaming module for DrishtiIO

pub mod control;
pub mod messages;
pub mod registry;
pub mod wire;

pub use control::{ControlHandler, ControlReport};
pub use messages::{ControlMessage, DetectionMessage, FrameKind, FrameMessage, Message};
pub use registry::{ClientId, ConnectionRegistry, PollEvents, RegistryLimits};
pub use wire::{Codec, PROTOCOL_VERSION};
