use image::{Rgb, RgbImage};

use crate::common::KeypointSet;
use crate::common::keypoints::HAND_CONNECTIONS;
use crate::pipeline::font::{self, GLYPH_HEIGHT, GLYPH_WIDTH};

const LANDMARK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const CONNECTION_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const LANDMARK_RADIUS: i64 = 2;
const OVERLAY_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const OVERLAY_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const OVERLAY_SCALE: u32 = 2;
const OVERLAY_ORIGIN: (u32, u32) = (10, 10);
const OVERLAY_PADDING: u32 = 3;
/// Normalized coordinates outside this range are treated as garbage from the
/// extractor and not drawn.
const DRAWABLE_RANGE: std::ops::RangeInclusive<f32> = -1.0..=2.0;

type Point = (f32, f32);

/// Returns a copy of `image` with the hand skeleton and landmarks drawn on it.
/// Segments are clipped to the frame before rasterizing, so the work per
/// bone is bounded by the frame size.
pub fn draw_hand(image: &RgbImage, keypoints: &KeypointSet) -> RgbImage {
    let mut annotated = image.clone();
    let (width, height) = annotated.dimensions();
    if width == 0 || height == 0 {
        return annotated;
    }
    let points: Vec<Option<Point>> = keypoints
        .landmarks()
        .iter()
        .map(|landmark| {
            let drawable = |v: f32| v.is_finite() && DRAWABLE_RANGE.contains(&v);
            (drawable(landmark.x) && drawable(landmark.y))
                .then(|| (landmark.x * width as f32, landmark.y * height as f32))
        })
        .collect();

    for &(from, to) in HAND_CONNECTIONS.iter() {
        let (Some(start), Some(end)) = (points[from], points[to]) else {
            continue;
        };
        if let Some((start, end)) = clip_segment(start, end, width, height) {
            draw_line(&mut annotated, round(start), round(end), CONNECTION_COLOR);
        }
    }
    for (cx, cy) in points.into_iter().flatten().map(round) {
        for dy in -LANDMARK_RADIUS..=LANDMARK_RADIUS {
            for dx in -LANDMARK_RADIUS..=LANDMARK_RADIUS {
                put_clipped(&mut annotated, cx + dx, cy + dy, LANDMARK_COLOR);
            }
        }
    }
    annotated
}

/// Writes `text` in the top-left corner on a dark band.
pub fn draw_overlay(image: &mut RgbImage, text: &str) {
    let (width, height) = image.dimensions();
    let (x, y) = OVERLAY_ORIGIN;
    let glyphs = text.chars().count() as u32;
    let text_width = glyphs.saturating_mul((GLYPH_WIDTH + 1) * OVERLAY_SCALE);
    let right = x.saturating_add(text_width).saturating_add(OVERLAY_PADDING).min(width);
    let bottom = (y + GLYPH_HEIGHT * OVERLAY_SCALE + OVERLAY_PADDING).min(height);
    for by in y.saturating_sub(OVERLAY_PADDING)..bottom {
        for bx in x.saturating_sub(OVERLAY_PADDING)..right {
            image.put_pixel(bx, by, OVERLAY_BACKGROUND);
        }
    }
    font::draw_text_line(image, x, y, text, OVERLAY_COLOR, OVERLAY_SCALE);
}

fn round((x, y): Point) -> (i64, i64) {
    (x.round() as i64, y.round() as i64)
}

/// Liang-Barsky clip of a segment against the pixel rectangle.
fn clip_segment(start: Point, end: Point, width: u32, height: u32) -> Option<(Point, Point)> {
    let (x_max, y_max) = ((width - 1) as f32, (height - 1) as f32);
    let (dx, dy) = (end.0 - start.0, end.1 - start.1);
    let (mut t0, mut t1) = (0.0f32, 1.0f32);
    let edges = [
        (-dx, start.0),
        (dx, x_max - start.0),
        (-dy, start.1),
        (dy, y_max - start.1),
    ];
    for (p, q) in edges {
        if p == 0.0 {
            if q < 0.0 {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < 0.0 {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    let at = |t: f32| (start.0 + t * dx, start.1 + t * dy);
    Some((at(t0), at(t1)))
}

// Bresenham
fn draw_line(image: &mut RgbImage, (x0, y0): (i64, i64), (x1, y1): (i64, i64), color: Rgb<u8>) {
    let dx = x1.saturating_sub(x0).saturating_abs();
    let dy = y1.saturating_sub(y0).saturating_abs().saturating_neg();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let (mut x, mut y) = (x0, y0);
    let mut err = dx.saturating_add(dy);
    loop {
        put_clipped(image, x, y, color);
        if x == x1 && y == y1 {
            break;
        }
        let e2 = err.saturating_mul(2);
        if e2 >= dy {
            err = err.saturating_add(dy);
            x += sx;
        }
        if e2 <= dx {
            err = err.saturating_add(dx);
            y += sy;
        }
    }
}

fn put_clipped(image: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>) {
    let (width, height) = image.dimensions();
    if x >= 0 && y >= 0 && x < i64::from(width) && y < i64::from(height) {
        image.put_pixel(x as u32, y as u32, color);
    }
}
