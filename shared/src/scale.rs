use serde::{Deserialize, Serialize};

use crate::entity::Point;
use crate::extent::Extent;

/// Logical (CSS) pixel size of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PixelSize {
    pub width: f64,
    pub height: f64,
}

impl PixelSize {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Monotonic linear map from a data domain onto a pixel range. The range may be
/// descending (used for the y axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LinearScale {
    domain: (f64, f64),
    range: (f64, f64),
}

impl LinearScale {
    pub fn new(domain: (f64, f64), range: (f64, f64)) -> Self {
        Self { domain, range }
    }

    pub fn domain(&self) -> (f64, f64) {
        self.domain
    }

    pub fn range(&self) -> (f64, f64) {
        self.range
    }

    pub fn apply(&self, value: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let span = d1 - d0;
        if span == 0.0 {
            return (r0 + r1) / 2.0;
        }
        r0 + (value - d0) / span * (r1 - r0)
    }

    pub fn invert(&self, pixel: f64) -> f64 {
        let (d0, d1) = self.domain;
        let (r0, r1) = self.range;
        let span = r1 - r0;
        if span == 0.0 {
            return (d0 + d1) / 2.0;
        }
        d0 + (pixel - r0) / span * (d1 - d0)
    }
}

/// The pair of axis scales for the current extent and surface size. Holds no
/// state beyond what it was built from; rebuild it whenever either changes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinateMapper {
    pub x: LinearScale,
    pub y: LinearScale,
    extent: Extent,
    size: PixelSize,
}

impl CoordinateMapper {
    /// Data x grows to the right; data y grows upward, so the y range runs from
    /// the bottom of the plot area to the top.
    pub fn new(extent: Extent, size: PixelSize, margin: f64) -> Self {
        let extent = extent.non_degenerate();
        let margin_x = margin.min(size.width / 2.0 - 0.5).max(0.0);
        let margin_y = margin.min(size.height / 2.0 - 0.5).max(0.0);
        let right = (size.width - margin_x).max(margin_x + 1.0);
        let bottom = (size.height - margin_y).max(margin_y + 1.0);
        Self {
            x: LinearScale::new((extent.x_min, extent.x_max), (margin_x, right)),
            y: LinearScale::new((extent.y_min, extent.y_max), (bottom, margin_y)),
            extent,
            size,
        }
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn to_pixel(&self, p: Point) -> (f64, f64) {
        (self.x.apply(p.x), self.y.apply(p.y))
    }

    pub fn to_data(&self, px: f64, py: f64) -> Point {
        Point::new(self.x.invert(px), self.y.invert(py))
    }

    /// Pixel rectangle `(left, top, width, height)` covered by the full extent.
    pub fn plot_rect(&self) -> (f64, f64, f64, f64) {
        let left = self.x.apply(self.extent.x_min);
        let right = self.x.apply(self.extent.x_max);
        let top = self.y.apply(self.extent.y_max);
        let bottom = self.y.apply(self.extent.y_min);
        (left, top, right - left, bottom - top)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn forward_then_inverse_is_identity() {
        let extents = [
            Extent { x_min: -1.0, x_max: 1.0, y_min: -1.0, y_max: 1.0 },
            Extent { x_min: 0.0, x_max: 1e-3, y_min: 5.0, y_max: 900.0 },
            Extent { x_min: -250.5, x_max: 13.25, y_min: -0.75, y_max: -0.5 },
        ];
        let sizes = [PixelSize::new(800.0, 600.0), PixelSize::new(320.0, 1024.0)];
        for extent in extents {
            for size in sizes {
                let mapper = CoordinateMapper::new(extent, size, 20.0);
                for t in [0.0, 0.1, 0.5, 0.77, 1.0] {
                    let p = Point::new(
                        extent.x_min + t * extent.width(),
                        extent.y_min + (1.0 - t) * extent.height(),
                    );
                    let (px, py) = mapper.to_pixel(p);
                    let back = mapper.to_data(px, py);
                    assert!((back.x - p.x).abs() <= 1e-9 * extent.width().max(1.0));
                    assert!((back.y - p.y).abs() <= 1e-9 * extent.height().max(1.0));
                }
            }
        }
    }

    #[test]
    fn y_axis_is_inverted_and_x_is_not() {
        let extent = Extent { x_min: 0.0, x_max: 10.0, y_min: 0.0, y_max: 10.0 };
        let mapper = CoordinateMapper::new(extent, PixelSize::new(200.0, 100.0), 10.0);
        assert_close(mapper.x.apply(0.0), 10.0);
        assert_close(mapper.x.apply(10.0), 190.0);
        assert_close(mapper.y.apply(0.0), 90.0);
        assert_close(mapper.y.apply(10.0), 10.0);
    }

    #[test]
    fn zero_width_extent_still_maps() {
        let extent = Extent { x_min: 3.0, x_max: 3.0, y_min: 3.0, y_max: 3.0 };
        let mapper = CoordinateMapper::new(extent, PixelSize::new(100.0, 100.0), 0.0);
        let (px, py) = mapper.to_pixel(Point::new(3.0, 3.0));
        assert!(px.is_finite() && py.is_finite());
        assert!((px - 50.0).abs() < 1e-6);
        assert!((py - 50.0).abs() < 1e-6);
    }

    #[test]
    fn plot_rect_spans_margins() {
        let mapper = CoordinateMapper::new(Extent::UNIT, PixelSize::new(400.0, 300.0), 20.0);
        let (left, top, width, height) = mapper.plot_rect();
        assert_close(left, 20.0);
        assert_close(top, 20.0);
        assert_close(width, 360.0);
        assert_close(height, 260.0);
    }
}
