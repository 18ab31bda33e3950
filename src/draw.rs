//! Minimal raster drawing on RGB images.
//!
//! All primitives clip silently at the image edges.

use image::{Rgb, RgbImage};

/// Color of detector bounding boxes.
pub const BOX_COLOR: Rgb<u8> = Rgb([255, 64, 64]);
/// Color of the tracking trail.
pub const TRAIL_COLOR: Rgb<u8> = Rgb([0, 255, 0]);

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x < 0 || y < 0 || x >= image.width() as i32 || y >= image.height() as i32 {
        return;
    }
    image.put_pixel(x as u32, y as u32, color);
}

fn stamp(image: &mut RgbImage, x: i32, y: i32, thickness: i32, color: Rgb<u8>) {
    let offset = thickness / 2;
    for dy in 0..thickness {
        for dx in 0..thickness {
            put(image, x + dx - offset, y + dy - offset, color);
        }
    }
}

/// Bresenham line from `from` to `to`, both endpoints included.
pub fn draw_line(
    image: &mut RgbImage,
    from: (i32, i32),
    to: (i32, i32),
    thickness: i32,
    color: Rgb<u8>,
) {
    let thickness = thickness.max(1);
    let (mut x, mut y) = from;
    let dx = (to.0 - x).abs();
    let dy = -(to.1 - y).abs();
    let sx = if x < to.0 { 1 } else { -1 };
    let sy = if y < to.1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        stamp(image, x, y, thickness, color);
        if x == to.0 && y == to.1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

/// Solid disc centred on `center`.
pub fn fill_circle(image: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let radius = radius.max(0);
    let r2 = radius * radius;
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            if dx * dx + dy * dy <= r2 {
                put(image, center.0 + dx, center.1 + dy, color);
            }
        }
    }
}

/// Rectangle outline with inclusive corners.
pub fn draw_rect(
    image: &mut RgbImage,
    left: i32,
    top: i32,
    right: i32,
    bottom: i32,
    thickness: i32,
    color: Rgb<u8>,
) {
    draw_line(image, (left, top), (right, top), thickness, color);
    draw_line(image, (right, top), (right, bottom), thickness, color);
    draw_line(image, (right, bottom), (left, bottom), thickness, color);
    draw_line(image, (left, bottom), (left, top), thickness, color);
}
