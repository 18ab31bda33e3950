use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// How far above the frame's mean luma a pixel must be to count as foreground.
const FOREGROUND_MARGIN: u32 = 64;

/// Model-free backend: reports one box around the pixels that stand out
/// brighter than the frame average.
///
/// Stateless, so one instance can serve any number of concurrent sessions:
/// the same frame always yields the same detections. A uniform frame yields
/// none.
#[derive(Default)]
pub struct StubBackend;

impl StubBackend {
    pub fn new() -> Self {
        Self
    }
}

fn luma(rgb: &[u8]) -> u32 {
    (rgb[0] as u32 * 299 + rgb[1] as u32 * 587 + rgb[2] as u32 * 114) / 1000
}

fn foreground_bounds(pixels: &[u8], width: u32) -> Option<(u32, u32, u32, u32)> {
    let count = pixels.len() / 3;
    if count == 0 || width == 0 {
        return None;
    }
    let mean = pixels.chunks_exact(3).map(luma).sum::<u32>() / count as u32;
    let threshold = mean + FOREGROUND_MARGIN;

    let mut bounds: Option<(u32, u32, u32, u32)> = None;
    for (index, rgb) in pixels.chunks_exact(3).enumerate() {
        if luma(rgb) < threshold {
            continue;
        }
        let x = index as u32 % width;
        let y = index as u32 / width;
        bounds = Some(match bounds {
            None => (x, y, x, y),
            Some((left, top, right, bottom)) => {
                (left.min(x), top.min(y), right.max(x), bottom.max(y))
            }
        });
    }
    bounds
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let detections = foreground_bounds(frame.pixels(), frame.width())
            .map(|(left, top, right, bottom)| {
                let box_w = (right - left + 1) as f32;
                let box_h = (bottom - top + 1) as f32;
                vec![Detection {
                    center_x: left as f32 + box_w / 2.0,
                    center_y: top as f32 + box_h / 2.0,
                    width: box_w,
                    height: box_h,
                    confidence: 0.85,
                    class_id: 0,
                }]
            })
            .unwrap_or_default();
        Ok(detections)
    }
}
