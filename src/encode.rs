use anyhow::{anyhow, Result};
use image::codecs::jpeg::JpegEncoder;

use crate::frame::Frame;

pub const DEFAULT_JPEG_QUALITY: u8 = 80;

/// Lossy JPEG compression of annotated frames.
#[derive(Clone, Copy, Debug)]
pub struct FrameEncoder {
    quality: u8,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY)
    }
}

impl FrameEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    pub fn encode(&self, frame: &Frame) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(frame.pixels().len() / 8);
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode_image(frame.image())
            .map_err(|err| anyhow!("JPEG encode failed: {err}"))?;
        Ok(buffer)
    }
}
