//! Vision relay
//!
//! Streams a camera feed through an object detector and serves the annotated
//! result as a motion-JPEG multipart stream, next to a small command panel that
//! relays text commands to two ESP32 boards over raw TCP.
//!
//! # Pipeline
//!
//! Each streaming request owns one session:
//!
//! 1. `ingest`: a `FrameSource` pulls frames from the camera (HTTP MJPEG,
//!    HTTP snapshots, or a synthetic `stub://` source).
//! 2. `sampler`: frame-count modulus plus minimum interval decides which
//!    frames reach the detector.
//! 3. `detect`: a `DetectorBackend` reports detections and draws boxes.
//! 4. `overlay`: the tracking endpoint draws a short centroid trail instead.
//! 5. `encode`: JPEG compression.
//! 6. `stream`: multipart framing written to the client.
//!
//! # Module Structure
//!
//! - `config`: immutable process configuration (file + environment)
//! - `relay`: connect/write/read/close exchange with a device
//! - `api`: blocking HTTP/1.1 server exposing the page, streams and relay

pub mod api;
pub mod config;
pub mod detect;
pub mod draw;
pub mod encode;
pub mod frame;
pub mod ingest;
pub mod overlay;
pub mod relay;
pub mod sampler;
pub mod stream;

pub use config::{AppConfig, CameraSettings, DeviceSettings, PageLayout, StreamSettings};
pub use detect::{BackendRegistry, Detection, DetectorBackend, SharedDetector, StubBackend};
pub use encode::FrameEncoder;
pub use frame::Frame;
pub use ingest::{open_source, FrameSource};
pub use overlay::{TrackerOverlay, TRAIL_CAPACITY};
pub use relay::{DeviceEndpoint, RelayError, RelayTimeouts};
pub use sampler::{Sampler, SamplerSettings};
pub use stream::{SessionStats, StreamMode, StreamSession};
