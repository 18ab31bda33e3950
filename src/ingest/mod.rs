//! Frame ingestion sources.
//!
//! This module provides the sources a stream session can pull frames from:
//! - HTTP MJPEG streams (IP webcam apps, ESP32-CAM `/stream` endpoints)
//! - HTTP single-JPEG endpoints, polled as snapshots
//! - Synthetic `stub://` source (tests and demos)
//!
//! Every streaming request opens its own source; sources are never shared
//! between sessions. A source is released exactly once, when its session
//! ends.

mod http;
mod synthetic;

pub use http::{find_jpeg_bounds, HttpSource, MjpegStream};
pub use synthetic::SyntheticSource;

use anyhow::{anyhow, Context, Result};
use url::Url;

use crate::config::CameraSettings;
use crate::frame::Frame;

/// Pull-based frame producer.
pub trait FrameSource: Send {
    /// Next frame, `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Close the underlying connection. Later reads return `Ok(None)`.
    fn release(&mut self);

    /// Human-readable description for logs.
    fn describe(&self) -> String;
}

/// Open the source named by `settings.url`, dispatching on the URL scheme.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let url = Url::parse(&settings.url).context("parse camera url")?;
    match url.scheme() {
        "http" | "https" => Ok(Box::new(HttpSource::connect(settings)?)),
        "stub" => Ok(Box::new(SyntheticSource::from_url(&url)?)),
        other => Err(anyhow!(
            "unsupported camera scheme '{}'; expected http(s) or stub",
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(url: &str) -> CameraSettings {
        CameraSettings {
            url: url.to_string(),
            ..CameraSettings::default()
        }
    }

    #[test]
    fn opens_synthetic_source() {
        let mut source = open_source(&camera("stub://bench?frames=2&width=16&height=8")).unwrap();
        assert!(source.describe().contains("bench"));
        assert!(source.next_frame().unwrap().is_some());
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = open_source(&camera("rtsp://camera/stream")).err().unwrap();
        assert!(err.to_string().contains("unsupported camera scheme"));
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(open_source(&camera("not a url")).is_err());
    }
}
