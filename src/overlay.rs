//! Centroid trail drawn by the tracking stream.
//!
//! The history is shared by every detection in every frame of one session.
//! There is no per-object identity: when a frame carries several detections
//! the trail jumps between them.

use std::collections::VecDeque;

use image::RgbImage;

use crate::detect::Detection;
use crate::draw::{draw_line, fill_circle, TRAIL_COLOR};

/// Maximum number of retained centroids.
pub const TRAIL_CAPACITY: usize = 10;

const LINE_THICKNESS: i32 = 2;
const MARKER_RADIUS: i32 = 5;

#[derive(Clone, Debug, Default)]
pub struct TrackerOverlay {
    points: VecDeque<(i32, i32)>,
}

impl TrackerOverlay {
    pub fn new() -> Self {
        Self {
            points: VecDeque::with_capacity(TRAIL_CAPACITY + 1),
        }
    }

    /// Append one point, evicting the oldest beyond capacity.
    pub fn push(&mut self, point: (i32, i32)) {
        self.points.push_back(point);
        while self.points.len() > TRAIL_CAPACITY {
            self.points.pop_front();
        }
    }

    /// Append the centroid of every detection, in report order.
    pub fn update(&mut self, detections: &[Detection]) {
        for detection in detections {
            self.push(detection.centroid());
        }
    }

    /// Oldest first.
    pub fn points(&self) -> impl Iterator<Item = &(i32, i32)> {
        self.points.iter()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Lines between consecutive points, then a marker on every point.
    pub fn render(&self, image: &mut RgbImage) {
        for (from, to) in self.points.iter().zip(self.points.iter().skip(1)) {
            draw_line(image, *from, *to, LINE_THICKNESS, TRAIL_COLOR);
        }
        for point in &self.points {
            fill_circle(image, *point, MARKER_RADIUS, TRAIL_COLOR);
        }
    }
}
