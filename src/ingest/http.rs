//! HTTP camera source.
//!
//! Connects to an MJPEG (`multipart/x-mixed-replace`) endpoint and splits the
//! byte stream on JPEG SOI/EOI markers. Endpoints that answer with a single
//! image are polled as snapshots instead.

use std::io::Read;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};

use super::FrameSource;
use crate::config::CameraSettings;
use crate::frame::Frame;

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Camera reached over HTTP.
pub struct HttpSource {
    url: String,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    snapshot_interval: Duration,
    last_snapshot_at: Option<Instant>,
    pending: Option<Vec<u8>>,
    sequence: u64,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    Snapshot,
}

impl HttpSource {
    /// Open the camera URL and pick MJPEG or snapshot mode from the response
    /// content type.
    pub fn connect(settings: &CameraSettings) -> Result<Self> {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout_read(READ_TIMEOUT)
            .build();
        let response = agent
            .get(&settings.url)
            .call()
            .with_context(|| format!("connect to camera stream {}", settings.url))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();

        let mut source = Self {
            url: settings.url.clone(),
            agent,
            stream: None,
            snapshot_interval: settings.snapshot_interval,
            last_snapshot_at: None,
            pending: None,
            sequence: 0,
        };
        if content_type.contains("multipart") {
            source.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
        } else {
            let mut bytes = Vec::new();
            response
                .into_reader()
                .take(MAX_JPEG_BYTES as u64)
                .read_to_end(&mut bytes)
                .context("read jpeg snapshot")?;
            source.pending = Some(bytes);
            source.last_snapshot_at = Some(Instant::now());
            source.stream = Some(HttpStream::Snapshot);
        }
        log::info!(
            "camera source connected to {} ({})",
            source.url,
            if content_type.contains("multipart") {
                "mjpeg"
            } else {
                "snapshot"
            }
        );
        Ok(source)
    }

    fn next_snapshot(&mut self) -> Result<Vec<u8>> {
        if let Some(bytes) = self.pending.take() {
            return Ok(bytes);
        }
        if let Some(last) = self.last_snapshot_at {
            let elapsed = last.elapsed();
            if elapsed < self.snapshot_interval {
                std::thread::sleep(self.snapshot_interval - elapsed);
            }
        }
        self.last_snapshot_at = Some(Instant::now());
        fetch_single_jpeg(&self.agent, &self.url)
    }
}

impl FrameSource for HttpSource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let jpeg = match self.stream.as_mut() {
                None => return Ok(None),
                Some(HttpStream::Mjpeg(stream)) => match stream.read_next_jpeg()? {
                    Some(bytes) => bytes,
                    None => return Ok(None),
                },
                Some(HttpStream::Snapshot) => self.next_snapshot()?,
            };

            self.sequence += 1;
            match Frame::decode_jpeg(&jpeg, self.sequence) {
                Ok(frame) => return Ok(Some(frame)),
                Err(err) => {
                    log::warn!(
                        "camera source {}: dropping undecodable frame {}: {:#}",
                        self.url,
                        self.sequence,
                        err
                    );
                }
            }
        }
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            log::debug!("camera source {} released", self.url);
        }
        self.pending = None;
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

fn fetch_single_jpeg(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>> {
    let response = agent
        .get(url)
        .call()
        .with_context(|| format!("fetch jpeg snapshot from {}", url))?;
    let mut bytes = Vec::new();
    response
        .into_reader()
        .take(MAX_JPEG_BYTES as u64)
        .read_to_end(&mut bytes)
        .context("read jpeg snapshot")?;
    if bytes.is_empty() {
        return Err(anyhow!("empty jpeg snapshot"));
    }
    Ok(bytes)
}

/// Splits a multipart MJPEG byte stream into individual JPEG images.
pub struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    pub fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    /// Next complete JPEG, `Ok(None)` when the stream ends.
    pub fn read_next_jpeg(&mut self) -> Result<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(Some(frame));
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Ok(None);
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Byte range of the first complete `FFD8 .. FFD9` image in `buffer`.
pub fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const FAKE_JPEG_A: &[u8] = &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9];
    const FAKE_JPEG_B: &[u8] = &[0xFF, 0xD8, 9, 0xFF, 0xD9];

    fn multipart(parts: &[&[u8]]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
            body.extend_from_slice(part);
            body.extend_from_slice(b"\r\n");
        }
        body
    }

    #[test]
    fn finds_first_complete_jpeg() {
        let data = [0x00, 0xFF, 0xD8, 7, 0xFF, 0xD9, 0x00];
        assert_eq!(find_jpeg_bounds(&data), Some((1, 6)));
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 1, 2]), None);
        assert_eq!(find_jpeg_bounds(b"--frame\r\n"), None);
    }

    #[test]
    fn soi_marker_is_not_mistaken_for_eoi() {
        assert_eq!(find_jpeg_bounds(&[0xFF, 0xD8, 0xFF, 0xD9]), Some((0, 4)));
    }

    #[test]
    fn mjpeg_stream_yields_frames_then_ends() {
        let body = multipart(&[FAKE_JPEG_A, FAKE_JPEG_B]);
        let mut stream = MjpegStream::new(Box::new(Cursor::new(body)));

        assert_eq!(stream.read_next_jpeg().unwrap().unwrap(), FAKE_JPEG_A);
        assert_eq!(stream.read_next_jpeg().unwrap().unwrap(), FAKE_JPEG_B);
        assert!(stream.read_next_jpeg().unwrap().is_none());
    }

    #[test]
    fn mjpeg_stream_handles_split_reads() {
        struct Trickle(Cursor<Vec<u8>>);
        impl Read for Trickle {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                let len = buf.len().min(3);
                self.0.read(&mut buf[..len])
            }
        }

        let body = multipart(&[FAKE_JPEG_A]);
        let mut stream = MjpegStream::new(Box::new(Trickle(Cursor::new(body))));
        assert_eq!(stream.read_next_jpeg().unwrap().unwrap(), FAKE_JPEG_A);
        assert!(stream.read_next_jpeg().unwrap().is_none());
    }
}
