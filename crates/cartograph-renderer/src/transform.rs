use serde::{Deserialize, Serialize};

use cartograph_core::geometry::{BBox, Point};

/// Maps world coordinates in the map's reference system to canvas pixels.
///
/// Pixel y grows downwards, so the top edge of the extent lands on row 0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewTransform {
    pub extent: BBox,
    pub width: u32,
    pub height: u32,
    /// Pixels per world unit along x.
    pub sx: f64,
    /// Pixels per world unit along y.
    pub sy: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl ViewTransform {
    pub fn new(extent: BBox, width: u32, height: u32) -> Self {
        Self {
            extent,
            width,
            height,
            sx: width as f64 / extent.width(),
            sy: height as f64 / extent.height(),
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }

    /// Shift the output by whole-canvas pixel offsets.
    pub fn with_offset(mut self, offset_x: f64, offset_y: f64) -> Self {
        self.offset_x = offset_x;
        self.offset_y = offset_y;
        self
    }

    /// World to screen.
    pub fn forward(&self, p: Point) -> Point {
        Point::new(
            (p.x - self.extent.min.x) * self.sx - self.offset_x,
            (self.extent.max.y - p.y) * self.sy - self.offset_y,
        )
    }

    /// Screen to world.
    pub fn backward(&self, px: f64, py: f64) -> Point {
        Point::new(
            (px + self.offset_x) / self.sx + self.extent.min.x,
            self.extent.max.y - (py + self.offset_y) / self.sy,
        )
    }

    /// Pixel rectangle covered by a world box, as (left, top, width, height).
    pub fn forward_box(&self, b: &BBox) -> (f64, f64, f64, f64) {
        let top_left = self.forward(Point::new(b.min.x, b.max.y));
        (top_left.x, top_left.y, b.width() * self.sx, b.height() * self.sy)
    }

    /// World units per pixel.
    pub fn scale(&self) -> f64 {
        1.0 / self.sx
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(p: Point, x: f64, y: f64) {
        assert!((p.x - x).abs() < 1e-9 && (p.y - y).abs() < 1e-9, "{:?} != ({}, {})", p, x, y);
    }

    #[test]
    fn test_corners_map_to_canvas_edges() {
        let t = ViewTransform::new(BBox::from_coords(-180.0, -90.0, 180.0, 90.0), 600, 300);
        assert_near(t.forward(Point::new(-180.0, 90.0)), 0.0, 0.0);
        assert_near(t.forward(Point::new(180.0, -90.0)), 600.0, 300.0);
        assert_near(t.forward(Point::new(0.0, 0.0)), 300.0, 150.0);
        assert!((t.scale() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn test_round_trip_and_offset() {
        let t = ViewTransform::new(BBox::from_coords(0.0, 0.0, 100.0, 50.0), 200, 100)
            .with_offset(10.0, -5.0);
        let p = t.forward(Point::new(25.0, 10.0));
        assert_eq!(p, Point::new(40.0, 85.0));
        let back = t.backward(p.x, p.y);
        assert!((back.x - 25.0).abs() < 1e-9 && (back.y - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_forward_box() {
        let t = ViewTransform::new(BBox::from_coords(0.0, 0.0, 10.0, 10.0), 100, 100);
        assert_eq!(
            t.forward_box(&BBox::from_coords(2.0, 5.0, 4.0, 10.0)),
            (20.0, 0.0, 20.0, 50.0)
        );
    }
}
