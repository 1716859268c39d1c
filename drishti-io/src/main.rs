//! DrishtiIO - Machine-vision streaming daemon
//!
//! ## Protocol Architecture
//!
//! - **TCP (port 6465)**: Frames and detections out, control messages in,
//!   all on one connection per client
//!
//! Every client receives the same stream; a control message from any client
//! changes the stream for all of them.

use drishti_io::config::AppConfig;
use drishti_io::core::runtime::SharedConfig;
use drishti_io::devices::{create_camera, create_detector};
use drishti_io::error::{Error, Result};
use drishti_io::server::Server;
use drishti_io::streaming::PROTOCOL_VERSION;
use std::env;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const DEFAULT_CONFIG_PATH: &str = "/etc/drishti.toml";

/// Parse config path from command line arguments.
///
/// Supports:
/// - `drishti-io <path>` (positional)
/// - `drishti-io --config <path>` (flag-based)
/// - `drishti-io -c <path>` (short flag)
///
/// Returns `None` when no path was given.
fn parse_config_path() -> Option<String> {
    let args: Vec<String> = env::args().collect();

    // Look for --config or -c flag
    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }

    // Fall back to first positional argument (if it doesn't start with -)
    if args.len() > 1 && !args[1].starts_with('-') {
        return Some(args[1].clone());
    }

    None
}

fn main() -> Result<()> {
    // An explicit path must exist; the default path is optional
    let config = match parse_config_path() {
        Some(path) => AppConfig::from_file(&path)?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => AppConfig::from_file(DEFAULT_CONFIG_PATH)?,
        None => AppConfig::default(),
    };

    // Initialize logger
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!(
        "DrishtiIO v{} starting (protocol v{})",
        env!("CARGO_PKG_VERSION"),
        PROTOCOL_VERSION
    );
    log::info!(
        "Camera: {}, detector: {}",
        config.device.camera,
        config.device.detector
    );

    // =========================================================================
    // Collaborators
    // =========================================================================
    let camera = create_camera(&config.device)?;
    let detector = create_detector(&config.device)?;
    let shared = SharedConfig::new(config.defaults.clone());

    // =========================================================================
    // Server Setup
    // =========================================================================
    let mut server = Server::bind(&config, camera, detector, shared).inspect_err(|e| {
        log::error!("{}", e);
    })?;

    // Set up shutdown signal handler
    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Other(format!("Error setting Ctrl-C handler: {}", e)))?;

    log::info!("DrishtiIO running. Press Ctrl-C to stop.");
    server.run(running)?;

    log::info!("DrishtiIO stopped");
    Ok(())
}
