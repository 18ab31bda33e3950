//! Synthetic frame source (`stub://`).
//!
//! Renders a bright square drifting across a dark background, paced like a
//! real camera. Query parameters:
//! - `frames`: stop after this many frames (default: unbounded)
//! - `width`, `height`: frame size (default 320x240)
//! - `fps`: pacing of produced frames (default 30, `0` disables pacing)

use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use url::Url;

use super::FrameSource;
use crate::frame::Frame;

const DEFAULT_WIDTH: u32 = 320;
const DEFAULT_HEIGHT: u32 = 240;
const DEFAULT_FPS: f64 = 30.0;
const BACKGROUND: Rgb<u8> = Rgb([24, 24, 32]);
const FOREGROUND: Rgb<u8> = Rgb([240, 240, 240]);

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    limit: Option<u64>,
    interval: Duration,
    last_frame_at: Option<Instant>,
    sequence: u64,
    released: bool,
}

impl SyntheticSource {
    pub fn new(name: &str, width: u32, height: u32, limit: Option<u64>, fps: f64) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("synthetic source needs a non-zero frame size"));
        }
        let interval = if fps.is_finite() && fps > 0.0 {
            Duration::from_secs_f64(1.0 / fps)
        } else {
            Duration::ZERO
        };
        Ok(Self {
            name: name.to_string(),
            width,
            height,
            limit,
            interval,
            last_frame_at: None,
            sequence: 0,
            released: false,
        })
    }

    pub fn from_url(url: &Url) -> Result<Self> {
        let mut width = DEFAULT_WIDTH;
        let mut height = DEFAULT_HEIGHT;
        let mut limit = None;
        let mut fps = DEFAULT_FPS;
        for (key, value) in url.query_pairs() {
            let invalid = || anyhow!("invalid stub source parameter {}={}", key, value);
            match key.as_ref() {
                "width" => width = value.parse().map_err(|_| invalid())?,
                "height" => height = value.parse().map_err(|_| invalid())?,
                "frames" => limit = Some(value.parse().map_err(|_| invalid())?),
                "fps" => fps = value.parse().map_err(|_| invalid())?,
                _ => log::warn!("ignoring unknown stub source parameter '{}'", key),
            }
        }
        let name = url.host_str().unwrap_or("synthetic");
        Self::new(name, width, height, limit, fps)
    }

    fn render(&self) -> RgbImage {
        let mut image = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        let side = (self.width.min(self.height) / 6).max(1);
        let span_x = self.width.saturating_sub(side).max(1) as u64;
        let span_y = self.height.saturating_sub(side).max(1) as u64;
        let x0 = ((self.sequence * 4) % span_x) as u32;
        let y0 = ((self.sequence * 3) % span_y) as u32;
        for y in y0..(y0 + side).min(self.height) {
            for x in x0..(x0 + side).min(self.width) {
                image.put_pixel(x, y, FOREGROUND);
            }
        }
        image
    }

    fn pace(&mut self) {
        if let Some(last) = self.last_frame_at {
            let elapsed = last.elapsed();
            if elapsed < self.interval {
                std::thread::sleep(self.interval - elapsed);
            }
        }
        self.last_frame_at = Some(Instant::now());
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.released {
            return Ok(None);
        }
        if self.limit.is_some_and(|limit| self.sequence >= limit) {
            log::info!("synthetic source {} exhausted after {} frames", self.name, self.sequence);
            return Ok(None);
        }
        self.pace();
        self.sequence += 1;
        Ok(Some(Frame::new(self.render(), self.sequence)))
    }

    fn release(&mut self) {
        self.released = true;
    }

    fn describe(&self) -> String {
        format!("stub://{} ({}x{})", self.name, self.width, self.height)
    }
}
