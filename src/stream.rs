//! Per-request streaming sessions and multipart framing.
//!
//! A `StreamSession` owns one frame source plus the sampler and tracker state
//! for one client. It is an iterator of encoded JPEG frames: it ends, for
//! good, when the source ends or fails. Every request builds a new session.

use std::io::Write;
use std::time::Instant;

use anyhow::Result;

use crate::config::StreamSettings;
use crate::detect::SharedDetector;
use crate::encode::FrameEncoder;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::overlay::TrackerOverlay;
use crate::sampler::Sampler;

/// Multipart boundary token.
pub const BOUNDARY: &str = "frame";
/// Response content type of every stream endpoint.
pub const MULTIPART_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamMode {
    /// Detector boxes drawn on each processed frame.
    Detection,
    /// Centroid trail drawn on the raw frame.
    Tracking,
}

impl StreamMode {
    pub fn label(&self) -> &'static str {
        match self {
            StreamMode::Detection => "detection",
            StreamMode::Tracking => "tracking",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub frames_emitted: u64,
}

pub struct StreamSession {
    mode: StreamMode,
    source: Box<dyn FrameSource>,
    sampler: Sampler,
    detector: SharedDetector,
    overlay: TrackerOverlay,
    encoder: FrameEncoder,
    stats: SessionStats,
    finished: bool,
}

impl StreamSession {
    pub fn new(
        mode: StreamMode,
        source: Box<dyn FrameSource>,
        detector: SharedDetector,
        settings: &StreamSettings,
    ) -> Self {
        let sampler = Sampler::new(settings.sampler(), Instant::now());
        Self::with_sampler(mode, source, detector, sampler, FrameEncoder::new(settings.jpeg_quality))
    }

    pub fn with_sampler(
        mode: StreamMode,
        source: Box<dyn FrameSource>,
        detector: SharedDetector,
        sampler: Sampler,
        encoder: FrameEncoder,
    ) -> Self {
        log::info!("{} stream opened on {}", mode.label(), source.describe());
        Self {
            mode,
            source,
            sampler,
            detector,
            overlay: TrackerOverlay::new(),
            encoder,
            stats: SessionStats::default(),
            finished: false,
        }
    }

    pub fn mode(&self) -> StreamMode {
        self.mode
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// End the session now, releasing the source if still held.
    pub fn close(mut self) -> SessionStats {
        self.finish();
        self.stats
    }

    fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.source.release();
        log::info!(
            "{} stream closed: read={} processed={} emitted={}",
            self.mode.label(),
            self.stats.frames_read,
            self.stats.frames_processed,
            self.stats.frames_emitted
        );
    }

    fn process(&mut self, frame: Frame) -> Result<Frame> {
        // Recover from a backend that panicked while holding the lock.
        let mut detector = self.detector.lock().unwrap_or_else(|poisoned| {
            log::warn!("{} stream: detector lock was poisoned, recovering", self.mode.label());
            poisoned.into_inner()
        });
        let detections = detector.detect(&frame)?;
        log::debug!(
            "{} stream: frame {} -> {} detections",
            self.mode.label(),
            frame.sequence,
            detections.len()
        );
        match self.mode {
            StreamMode::Detection => Ok(detector.annotate(&frame, &detections)),
            StreamMode::Tracking => {
                drop(detector);
                let mut frame = frame;
                self.overlay.update(&detections);
                self.overlay.render(frame.image_mut());
                Ok(frame)
            }
        }
    }
}

impl Iterator for StreamSession {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        if self.finished {
            return None;
        }
        loop {
            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::warn!(
                        "{} stream: camera source {} ended",
                        self.mode.label(),
                        self.source.describe()
                    );
                    self.finish();
                    return None;
                }
                Err(err) => {
                    log::warn!(
                        "{} stream: failed to read frame from {}: {:#}",
                        self.mode.label(),
                        self.source.describe(),
                        err
                    );
                    self.finish();
                    return None;
                }
            };

            self.stats.frames_read += 1;
            if !self.sampler.admit(self.stats.frames_read, Instant::now()) {
                continue;
            }
            self.stats.frames_processed += 1;

            let annotated = match self.process(frame) {
                Ok(frame) => frame,
                Err(err) => {
                    log::warn!("{} stream: detection failed: {:#}", self.mode.label(), err);
                    continue;
                }
            };

            match self.encoder.encode(&annotated) {
                Ok(jpeg) => {
                    self.stats.frames_emitted += 1;
                    return Some(jpeg);
                }
                Err(err) => {
                    log::warn!("{} stream: failed to encode frame: {:#}", self.mode.label(), err);
                }
            }
        }
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        self.finish();
    }
}

/// One multipart part: boundary, part header, JPEG bytes, trailing CRLF.
pub fn multipart_part(jpeg: &[u8]) -> Vec<u8> {
    let mut part = Vec::with_capacity(jpeg.len() + 64);
    part.extend_from_slice(b"--");
    part.extend_from_slice(BOUNDARY.as_bytes());
    part.extend_from_slice(b"\r\nContent-Type: image/jpeg\r\n\r\n");
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part
}

/// Write every frame as a multipart part, flushing after each.
///
/// Returns the number of parts written. A write error (usually the client
/// going away) stops consumption immediately.
pub fn write_multipart<W, I>(writer: &mut W, frames: I) -> Result<u64>
where
    W: Write,
    I: IntoIterator<Item = Vec<u8>>,
{
    let mut written = 0u64;
    for jpeg in frames {
        writer.write_all(&multipart_part(&jpeg))?;
        writer.flush()?;
        written += 1;
    }
    Ok(written)
}
