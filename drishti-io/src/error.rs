//! Error types for DrishtiIO
//!
//! Every error belongs to a recovery scope (see [`ErrorScope`]). The server
//! handles each error at the narrowest scope that can absorb it: a bad client
//! is dropped, a bad cycle is skipped, and only startup failures end the
//! process.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Where an error is recoverable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorScope {
    /// Drop the offending client, keep serving the rest
    Client,
    /// Skip the remainder of the current cycle, retry on the next
    Cycle,
    /// Release resources and terminate
    Fatal,
}

/// DrishtiIO error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration could not be parsed or is invalid
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unrecognized tag, out-of-range field or truncated message
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Peer closed the connection or the socket failed
    #[error("Client disconnected")]
    ClientDisconnected,

    /// Camera collaborator failed to deliver a frame
    #[error("Acquisition failure: {0}")]
    AcquisitionFailure(String),

    /// Detector collaborator failed
    #[error("Detection failure: {0}")]
    DetectionFailure(String),

    /// Send to one client failed or stalled
    #[error("Broadcast failure: {0}")]
    BroadcastFailure(String),

    /// Frame could not be encoded
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Unknown camera or detector type in configuration
    #[error("Unknown device type: {0}")]
    UnknownDevice(String),

    /// Listener bind or camera open failed
    #[error("Startup failed: {0}")]
    FatalStartup(String),

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Recovery scope for this error
    pub fn scope(&self) -> ErrorScope {
        match self {
            Error::MalformedMessage(_) | Error::ClientDisconnected | Error::BroadcastFailure(_) => {
                ErrorScope::Client
            }
            Error::Config(_) | Error::UnknownDevice(_) | Error::FatalStartup(_) => ErrorScope::Fatal,
            Error::Io(_)
            | Error::AcquisitionFailure(_)
            | Error::DetectionFailure(_)
            | Error::Encoding(_)
            | Error::Other(_) => ErrorScope::Cycle,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Encoding(e.to_string())
    }
}
