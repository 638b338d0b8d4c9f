use serde::{Deserialize, Serialize};

use crate::entity::{Point, Spatial};

/// Minimum span of either axis, relative to the axis magnitude (never less
/// than this in absolute terms). Degenerate extents are widened to it,
/// centred on the original value.
pub const EXTENT_EPSILON: f64 = 1e-6;

/// Axis-aligned bounding rectangle in data space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Extent {
    pub x_min: f64,
    pub x_max: f64,
    pub y_min: f64,
    pub y_max: f64,
}

impl Default for Extent {
    fn default() -> Self {
        Self::UNIT
    }
}

impl Extent {
    /// Used when there is nothing to plot.
    pub const UNIT: Extent = Extent {
        x_min: -1.0,
        x_max: 1.0,
        y_min: -1.0,
        y_max: 1.0,
    };

    /// Bounding box of the valid positions, or `None` when there are none.
    pub fn of<E: Spatial>(entities: &[E]) -> Option<Extent> {
        let mut positions = entities.iter().filter_map(Spatial::position);
        let first = positions.next()?;
        let mut extent = Extent {
            x_min: first.x,
            x_max: first.x,
            y_min: first.y,
            y_max: first.y,
        };
        for p in positions {
            extent.include(p);
        }
        Some(extent)
    }

    /// Combined extent of questions and chunks, falling back to the unit box.
    pub fn of_data<Q: Spatial, C: Spatial>(questions: &[Q], chunks: &[C]) -> Extent {
        match (Extent::of(questions), Extent::of(chunks)) {
            (Some(q), Some(c)) => q.union(c),
            (Some(q), None) => q,
            (None, Some(c)) => c,
            (None, None) => Extent::UNIT,
        }
    }

    pub fn include(&mut self, p: Point) {
        self.x_min = self.x_min.min(p.x);
        self.x_max = self.x_max.max(p.x);
        self.y_min = self.y_min.min(p.y);
        self.y_max = self.y_max.max(p.y);
    }

    pub fn union(self, other: Extent) -> Extent {
        Extent {
            x_min: self.x_min.min(other.x_min),
            x_max: self.x_max.max(other.x_max),
            y_min: self.y_min.min(other.y_min),
            y_max: self.y_max.max(other.y_max),
        }
    }

    pub fn width(&self) -> f64 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f64 {
        self.y_max - self.y_min
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    /// Inclusive on every edge.
    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }

    /// Widen zero-span (or inverted) axes so scales never divide by zero.
    pub fn non_degenerate(self) -> Extent {
        let (x_min, x_max) = widen(self.x_min, self.x_max);
        let (y_min, y_max) = widen(self.y_min, self.y_max);
        Extent {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }
}

fn widen(min: f64, max: f64) -> (f64, f64) {
    if !min.is_finite() || !max.is_finite() {
        return (-1.0, 1.0);
    }
    let (min, max) = if min <= max { (min, max) } else { (max, min) };
    let mid = min / 2.0 + max / 2.0;
    let span = EXTENT_EPSILON * mid.abs().max(1.0);
    if max - min >= span {
        return (min, max);
    }
    (mid - span / 2.0, mid + span / 2.0)
}
