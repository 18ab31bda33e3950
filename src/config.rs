use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::relay::{DeviceEndpoint, RelayTimeouts};
use crate::sampler::SamplerSettings;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:5000";
const DEFAULT_CAMERA_URL: &str = "http://192.168.123.197:8080/video";
const DEFAULT_SNAPSHOT_INTERVAL_MS: u64 = 200;
const DEFAULT_DEVICE_1: &str = "192.168.123.83";
const DEFAULT_DEVICE_2: &str = "192.168.123.30";
const DEFAULT_DEVICE_PORT: u16 = 8080;
const DEFAULT_RELAY_TIMEOUT_MS: u64 = 3000;
const DEFAULT_SKIP_FRAMES: u64 = 5;
const DEFAULT_TARGET_FPS: f64 = 5.0;
const DEFAULT_JPEG_QUALITY: u8 = crate::encode::DEFAULT_JPEG_QUALITY;
const DEFAULT_DETECTOR: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.25;

const KNOWN_DETECTORS: &[&str] = &["stub", "tract"];

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    server: Option<ServerConfigFile>,
    camera: Option<CameraConfigFile>,
    stream: Option<StreamConfigFile>,
    devices: Option<DevicesConfigFile>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct ServerConfigFile {
    addr: Option<String>,
    layout: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    url: Option<String>,
    snapshot_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    skip_frames: Option<u64>,
    target_fps: Option<f64>,
    jpeg_quality: Option<u8>,
}

#[derive(Debug, Deserialize, Default)]
struct DevicesConfigFile {
    device_1: Option<String>,
    device_2: Option<String>,
    port: Option<u16>,
    connect_timeout_ms: Option<u64>,
    read_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    confidence: Option<f32>,
}

/// Which index page `GET /` serves.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PageLayout {
    /// One detection stream, no command panel.
    Single,
    /// Detection and tracking streams plus the two-device command panel.
    Dual,
}

impl PageLayout {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "single" => Ok(Self::Single),
            "dual" => Ok(Self::Dual),
            other => Err(anyhow!(
                "unknown page layout '{}'; expected single or dual",
                other
            )),
        }
    }
}

/// Process configuration. Built once at startup and read-only afterwards.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub camera: CameraSettings,
    pub stream: StreamSettings,
    pub devices: DeviceSettings,
    pub detector: DetectorSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: String,
    pub layout: PageLayout,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub url: String,
    /// Minimum spacing between polls when the camera serves single JPEGs.
    pub snapshot_interval: Duration,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            url: DEFAULT_CAMERA_URL.to_string(),
            snapshot_interval: Duration::from_millis(DEFAULT_SNAPSHOT_INTERVAL_MS),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    pub skip_frames: u64,
    pub target_fps: f64,
    pub jpeg_quality: u8,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            skip_frames: DEFAULT_SKIP_FRAMES,
            target_fps: DEFAULT_TARGET_FPS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl StreamSettings {
    pub fn sampler(&self) -> SamplerSettings {
        SamplerSettings {
            skip_frames: self.skip_frames,
            target_fps: self.target_fps,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeviceSettings {
    pub device_1: DeviceEndpoint,
    pub device_2: DeviceEndpoint,
    pub timeouts: RelayTimeouts,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            device_1: DeviceEndpoint::new(DEFAULT_DEVICE_1, DEFAULT_DEVICE_PORT),
            device_2: DeviceEndpoint::new(DEFAULT_DEVICE_2, DEFAULT_DEVICE_PORT),
            timeouts: RelayTimeouts::default(),
        }
    }
}

impl DeviceSettings {
    /// Endpoint for device id 1 or 2.
    pub fn endpoint(&self, id: u32) -> Option<&DeviceEndpoint> {
        match id {
            1 => Some(&self.device_1),
            2 => Some(&self.device_2),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: String,
    pub model_path: Option<PathBuf>,
    pub input_width: u32,
    pub input_height: u32,
    pub confidence: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            backend: DEFAULT_DETECTOR.to_string(),
            model_path: None,
            input_width: DEFAULT_MODEL_INPUT,
            input_height: DEFAULT_MODEL_INPUT,
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                addr: DEFAULT_BIND_ADDR.to_string(),
                layout: PageLayout::Dual,
            },
            camera: CameraSettings::default(),
            stream: StreamSettings::default(),
            devices: DeviceSettings::default(),
            detector: DetectorSettings::default(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the file named by `VISION_CONFIG`, then environment
    /// overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut file_cfg = file_cfg.unwrap_or_default();
        // VISION_DEVICE_PORT replaces the shared fallback port only; a device
        // written as `host:port` keeps its own port.
        if let Some(port) = env_device_port()? {
            file_cfg.devices.get_or_insert_with(Default::default).port = Some(port);
        }
        let mut cfg = Self::from_file(file_cfg)?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a specific file without consulting the environment.
    pub fn from_path(path: &Path) -> Result<Self> {
        let mut cfg = Self::from_file(read_config_file(path)?)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: AppConfigFile) -> Result<Self> {
        let defaults = Self::default();

        let server = file.server.unwrap_or_default();
        let layout = match server.layout.as_deref() {
            Some(layout) => PageLayout::parse(layout)?,
            None => defaults.server.layout,
        };
        let server = ServerSettings {
            addr: server.addr.unwrap_or(defaults.server.addr),
            layout,
        };

        let camera = file.camera.unwrap_or_default();
        let camera = CameraSettings {
            url: camera.url.unwrap_or(defaults.camera.url),
            snapshot_interval: camera
                .snapshot_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.camera.snapshot_interval),
        };

        let stream = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            skip_frames: stream.skip_frames.unwrap_or(defaults.stream.skip_frames),
            target_fps: stream.target_fps.unwrap_or(defaults.stream.target_fps),
            jpeg_quality: stream.jpeg_quality.unwrap_or(defaults.stream.jpeg_quality),
        };

        let devices = file.devices.unwrap_or_default();
        let port = devices.port.unwrap_or(DEFAULT_DEVICE_PORT);
        let devices = DeviceSettings {
            device_1: DeviceEndpoint::parse(
                devices.device_1.as_deref().unwrap_or(DEFAULT_DEVICE_1),
                port,
            )?,
            device_2: DeviceEndpoint::parse(
                devices.device_2.as_deref().unwrap_or(DEFAULT_DEVICE_2),
                port,
            )?,
            timeouts: RelayTimeouts {
                connect: Duration::from_millis(
                    devices.connect_timeout_ms.unwrap_or(DEFAULT_RELAY_TIMEOUT_MS),
                ),
                read: Duration::from_millis(
                    devices.read_timeout_ms.unwrap_or(DEFAULT_RELAY_TIMEOUT_MS),
                ),
            },
        };

        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector.backend.unwrap_or(defaults.detector.backend),
            model_path: detector.model_path,
            input_width: detector.input_width.unwrap_or(defaults.detector.input_width),
            input_height: detector
                .input_height
                .unwrap_or(defaults.detector.input_height),
            confidence: detector.confidence.unwrap_or(defaults.detector.confidence),
        };

        Ok(Self {
            server,
            camera,
            stream,
            devices,
            detector,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(addr) = env_value("VISION_BIND_ADDR") {
            self.server.addr = addr;
        }
        if let Some(layout) = env_value("VISION_PAGE_LAYOUT") {
            self.server.layout = PageLayout::parse(&layout)?;
        }
        if let Some(url) = env_value("VISION_CAMERA_URL") {
            self.camera.url = url;
        }
        if let Some(device) = env_value("VISION_DEVICE_1") {
            self.devices.device_1 = DeviceEndpoint::parse(&device, self.devices.device_1.port)?;
        }
        if let Some(device) = env_value("VISION_DEVICE_2") {
            self.devices.device_2 = DeviceEndpoint::parse(&device, self.devices.device_2.port)?;
        }
        if let Some(skip) = env_value("VISION_SKIP_FRAMES") {
            self.stream.skip_frames = skip
                .parse()
                .map_err(|_| anyhow!("VISION_SKIP_FRAMES must be a positive integer"))?;
        }
        if let Some(fps) = env_value("VISION_TARGET_FPS") {
            self.stream.target_fps = fps
                .parse()
                .map_err(|_| anyhow!("VISION_TARGET_FPS must be a number"))?;
        }
        if let Some(quality) = env_value("VISION_JPEG_QUALITY") {
            self.stream.jpeg_quality = quality
                .parse()
                .map_err(|_| anyhow!("VISION_JPEG_QUALITY must be an integer 1-100"))?;
        }
        if let Some(backend) = env_value("VISION_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(path) = env_value("VISION_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.server
            .addr
            .parse::<SocketAddr>()
            .map_err(|_| anyhow!("bind address '{}' is not host:port", self.server.addr))?;
        if self.stream.skip_frames == 0 {
            return Err(anyhow!("skip_frames must be at least 1"));
        }
        if !(self.stream.target_fps.is_finite() && self.stream.target_fps > 0.0) {
            return Err(anyhow!("target_fps must be a positive number"));
        }
        if !(1..=100).contains(&self.stream.jpeg_quality) {
            return Err(anyhow!("jpeg_quality must be between 1 and 100"));
        }
        if self.devices.timeouts.connect.is_zero() || self.devices.timeouts.read.is_zero() {
            return Err(anyhow!("device timeouts must be greater than zero"));
        }
        self.detector.backend = self.detector.backend.trim().to_lowercase();
        if !KNOWN_DETECTORS.contains(&self.detector.backend.as_str()) {
            return Err(anyhow!(
                "unknown detector backend '{}'; expected one of {:?}",
                self.detector.backend,
                KNOWN_DETECTORS
            ));
        }
        if self.detector.backend == "tract" && self.detector.model_path.is_none() {
            return Err(anyhow!("detector backend 'tract' requires model_path"));
        }
        Ok(())
    }
}

fn env_device_port() -> Result<Option<u16>> {
    env_value("VISION_DEVICE_PORT")
        .map(|port| {
            port.parse()
                .map_err(|_| anyhow!("VISION_DEVICE_PORT must be a port number"))
        })
        .transpose()
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_deployment_constants() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.addr, "0.0.0.0:5000");
        assert_eq!(cfg.server.layout, PageLayout::Dual);
        assert_eq!(cfg.camera.url, "http://192.168.123.197:8080/video");
        assert_eq!(cfg.devices.device_1, DeviceEndpoint::new("192.168.123.83", 8080));
        assert_eq!(cfg.devices.device_2, DeviceEndpoint::new("192.168.123.30", 8080));
        assert_eq!(cfg.stream.skip_frames, 5);
        assert_eq!(cfg.stream.target_fps, 5.0);
    }

    #[test]
    fn endpoint_lookup_only_knows_two_devices() {
        let devices = DeviceSettings::default();
        assert!(devices.endpoint(0).is_none());
        assert_eq!(devices.endpoint(1).unwrap().host, "192.168.123.83");
        assert_eq!(devices.endpoint(2).unwrap().host, "192.168.123.30");
        assert!(devices.endpoint(3).is_none());
    }

    #[test]
    fn validate_rejects_bad_stream_settings() {
        let mut cfg = AppConfig::default();
        cfg.stream.skip_frames = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.stream.target_fps = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.stream.jpeg_quality = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_requires_model_for_tract() {
        let mut cfg = AppConfig::default();
        cfg.detector.backend = "Tract".to_string();
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("model_path"));
    }

    #[test]
    fn layout_parsing() {
        assert_eq!(PageLayout::parse("Single").unwrap(), PageLayout::Single);
        assert_eq!(PageLayout::parse(" dual ").unwrap(), PageLayout::Dual);
        assert!(PageLayout::parse("triple").is_err());
    }
}
