/// One object reported by a detector, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub center_x: f32,
    pub center_y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl Detection {
    /// Integer centroid, truncated toward zero.
    pub fn centroid(&self) -> (i32, i32) {
        (self.center_x as i32, self.center_y as i32)
    }

    /// `(left, top, right, bottom)` rounded to whole pixels.
    pub fn bounds(&self) -> (i32, i32, i32, i32) {
        let half_w = self.width / 2.0;
        let half_h = self.height / 2.0;
        (
            (self.center_x - half_w).round() as i32,
            (self.center_y - half_h).round() as i32,
            (self.center_x + half_w).round() as i32,
            (self.center_y + half_h).round() as i32,
        )
    }

    pub fn area(&self) -> f32 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    /// Intersection over union of the two boxes.
    pub fn iou(&self, other: &Detection) -> f32 {
        let left = (self.center_x - self.width / 2.0).max(other.center_x - other.width / 2.0);
        let top = (self.center_y - self.height / 2.0).max(other.center_y - other.height / 2.0);
        let right = (self.center_x + self.width / 2.0).min(other.center_x + other.width / 2.0);
        let bottom =
            (self.center_y + self.height / 2.0).min(other.center_y + other.height / 2.0);
        let intersection = (right - left).max(0.0) * (bottom - top).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}
