//! Configuration for DrishtiIO
//!
//! Loads configuration from a TOML file. Every section and field is optional;
//! anything missing falls back to the built-in defaults.
//!
//! ```toml
//! [network]
//! bind_address = "0.0.0.0:6465"
//! send_timeout_ms = 500
//!
//! [device]
//! camera = "mock"
//! detector = "mock"
//!
//! [defaults]
//! stream_annotated = true
//! target_class = "workpiece"
//! rotation = 270
//! ```

use crate::core::imaging::PayloadEncoding;
use crate::core::runtime::RuntimeConfig;
use crate::core::types::{LensCalibration, Rotation};
use crate::devices::mock::MockConfig;
use crate::error::Result;
use crate::streaming::registry::RegistryLimits;
use crate::streaming::wire::DEFAULT_MAX_PAYLOAD_BYTES;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Top-level application configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub snapshot: SnapshotConfig,
    /// Runtime configuration in effect at startup
    #[serde(default)]
    pub defaults: RuntimeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// TCP listener and per-client limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NetworkConfig {
    /// TCP bind address
    ///
    /// Examples:
    /// - `0.0.0.0:6465` - All interfaces
    /// - `127.0.0.1:6465` - Localhost only
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Longest a client may leave its outbound queue undrained (ms)
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,

    /// Outbound queue cap per client (bytes)
    #[serde(default = "default_max_pending_bytes")]
    pub max_pending_bytes: usize,

    /// Longest an incomplete control message may sit in a buffer (ms)
    #[serde(default = "default_partial_message_timeout_ms")]
    pub partial_message_timeout_ms: u64,

    /// Largest accepted frame payload (bytes)
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    #[serde(default = "default_read_chunk_bytes")]
    pub read_chunk_bytes: usize,
}

fn default_bind_address() -> String {
    "0.0.0.0:6465".to_string()
}

fn default_send_timeout_ms() -> u64 {
    500
}

fn default_max_pending_bytes() -> usize {
    32 * 1024 * 1024
}

fn default_partial_message_timeout_ms() -> u64 {
    2000
}

fn default_max_payload_bytes() -> usize {
    DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_read_chunk_bytes() -> usize {
    4096
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            send_timeout_ms: default_send_timeout_ms(),
            max_pending_bytes: default_max_pending_bytes(),
            partial_message_timeout_ms: default_partial_message_timeout_ms(),
            max_payload_bytes: default_max_payload_bytes(),
            read_chunk_bytes: default_read_chunk_bytes(),
        }
    }
}

impl NetworkConfig {
    pub fn registry_limits(&self) -> RegistryLimits {
        RegistryLimits {
            send_timeout: Duration::from_millis(self.send_timeout_ms),
            max_pending_bytes: self.max_pending_bytes,
            read_chunk_bytes: self.read_chunk_bytes,
        }
    }

    pub fn partial_message_timeout(&self) -> Duration {
        Duration::from_millis(self.partial_message_timeout_ms)
    }
}

/// Orchestration loop timing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Minimum cycle period (ms); 0 runs as fast as the camera delivers
    #[serde(default)]
    pub cycle_interval_ms: u64,

    /// Sleep after a failed cycle (ms)
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,

    /// Period of the statistics log line (s)
    #[serde(default = "default_stats_interval_secs")]
    pub stats_interval_secs: u64,
}

fn default_error_backoff_ms() -> u64 {
    100
}

fn default_stats_interval_secs() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cycle_interval_ms: 0,
            error_backoff_ms: default_error_backoff_ms(),
            stats_interval_secs: default_stats_interval_secs(),
        }
    }
}

impl ServerConfig {
    pub fn cycle_interval(&self) -> Duration {
        Duration::from_millis(self.cycle_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }
}

/// Camera and detector selection
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeviceConfig {
    /// Camera type (`mock`)
    #[serde(default = "default_device_type")]
    pub camera: String,

    /// Detector type (`mock`)
    #[serde(default = "default_device_type")]
    pub detector: String,

    /// Synthetic scene for the mock camera and detector
    #[serde(default)]
    pub mock: MockConfig,
}

fn default_device_type() -> String {
    "mock".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            camera: default_device_type(),
            detector: default_device_type(),
            mock: MockConfig::default(),
        }
    }
}

/// Outbound frame encoding
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    /// JPEG quality (1-100)
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,

    /// `jpeg` or `base64`
    #[serde(default)]
    pub payload_encoding: PayloadEncoding,
}

fn default_jpeg_quality() -> u8 {
    85
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            payload_encoding: PayloadEncoding::Jpeg,
        }
    }
}

/// Snapshot output
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SnapshotConfig {
    #[serde(default = "default_snapshot_directory")]
    pub directory: String,
}

fn default_snapshot_directory() -> String {
    "snapshots".to_string()
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self {
            directory: default_snapshot_directory(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error); `RUST_LOG` overrides
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl AppConfig {
    /// Load configuration from TOML file
    ///
    /// # Example
    /// ```no_run
    /// use drishti_io::config::AppConfig;
    ///
    /// let config = AppConfig::from_file("drishti.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load from file if it exists, otherwise built-in defaults
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::from_file(path)
        } else {
            log::warn!("Config {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// Preset for the Robotino camera mount
    ///
    /// Camera is mounted sideways, streams annotated frames and starts with
    /// detection off until a client selects a class.
    pub fn robotino_defaults() -> Self {
        Self {
            defaults: RuntimeConfig {
                stream_raw: true,
                stream_annotated: true,
                detect_enabled: false,
                rotation: Rotation::Deg270,
                calibration: LensCalibration::robotino(),
                ..RuntimeConfig::default()
            },
            ..Self::default()
        }
    }

    /// Save configuration to TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let contents = toml::to_string_pretty(self)?;
        fs::write(path, contents)?;
        Ok(())
    }
}
