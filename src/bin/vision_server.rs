//! vision_server - MJPEG detection/tracking streams plus the ESP32 command panel
//!
//! This daemon:
//! 1. Loads configuration (VISION_CONFIG file, then VISION_* overrides)
//! 2. Builds the detector registry and picks the configured backend
//! 3. Serves the index page, the stream endpoints and the command relay
//!
//! Each stream request opens its own camera connection.

use anyhow::{anyhow, Result};
use std::sync::mpsc;

use vision_relay::api::ApiServer;
use vision_relay::detect::build_registry;
use vision_relay::AppConfig;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cfg = AppConfig::load()?;
    let registry = build_registry(&cfg.detector)?;
    let detector = registry
        .default_backend()
        .ok_or_else(|| anyhow!("no detector backend registered"))?;
    log::info!(
        "detector backends available: {:?} (using {})",
        registry.list(),
        cfg.detector.backend
    );
    log::info!("camera source: {}", cfg.camera.url);
    log::info!(
        "devices: 1 -> {}, 2 -> {}",
        cfg.devices.device_1,
        cfg.devices.device_2
    );

    let api_handle = ApiServer::new(cfg, detector).spawn()?;
    log::info!("vision server listening on http://{}", api_handle.addr);

    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;

    log::info!("vision_server waiting for shutdown signal (Ctrl-C)...");
    let _ = rx.recv();
    log::info!("shutdown signal received, stopping server...");
    api_handle.stop()?;

    Ok(())
}
