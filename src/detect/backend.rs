use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::detect::result::Detection;
use crate::draw::{draw_rect, BOX_COLOR};
use crate::frame::Frame;

/// Process-wide detector handle shared by stream sessions.
///
/// `detect` takes `&mut self`, so sessions lock the backend for the duration
/// of one call.
pub type SharedDetector = Arc<Mutex<dyn DetectorBackend>>;

/// Object detector capability.
///
/// The detector is opaque to the pipeline: it maps a frame to detections and
/// can render those detections onto a copy of the frame. Calls carry no
/// timeout; a slow backend stalls the session that called it.
pub trait DetectorBackend: Send {
    /// Backend identifier used in configuration.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Copy of `frame` with a box drawn around every detection.
    fn annotate(&self, frame: &Frame, detections: &[Detection]) -> Frame {
        let mut annotated = frame.clone();
        for detection in detections {
            let (left, top, right, bottom) = detection.bounds();
            draw_rect(annotated.image_mut(), left, top, right, bottom, 2, BOX_COLOR);
        }
        annotated
    }

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
