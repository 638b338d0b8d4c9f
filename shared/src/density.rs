//! Kernel density estimation over the question point cloud.
//!
//! The field is a fixed-resolution square lattice laid over the data extent,
//! independent of zoom. `value(i, j)` is the density at lattice column `i`
//! (x axis) and row `j` (y axis, growing with data y).

use crate::entity::{Point, Spatial};
use crate::extent::Extent;

/// Bandwidth floor as a fraction of the axis span, so a tight cluster still
/// produces a visible bump instead of a single spike.
const MIN_BANDWIDTH_FRACTION: f64 = 0.01;
/// Spread of the synthetic fallback peak.
const FALLBACK_SPREAD: f64 = 0.1;

#[derive(Debug, Clone, PartialEq)]
pub struct DensityField {
    size: usize,
    values: Vec<f64>,
    min: f64,
    max: f64,
    synthetic: bool,
}

impl DensityField {
    fn from_values(size: usize, values: Vec<f64>, synthetic: bool) -> Self {
        let (min, max) = values
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let (min, max) = if min.is_finite() && max.is_finite() {
            (min, max)
        } else {
            (0.0, 0.0)
        };
        Self {
            size,
            values,
            min,
            max,
            synthetic,
        }
    }

    /// Radially symmetric peak centred on the lattice. Used whenever there are
    /// no valid question positions so the background is never empty.
    pub fn synthetic(size: usize) -> Self {
        let size = size.max(2);
        let mut values = Vec::with_capacity(size * size);
        for i in 0..size {
            for j in 0..size {
                let x = i as f64 / size as f64 - 0.5;
                let y = j as f64 / size as f64 - 0.5;
                values.push((-(x * x + y * y) / FALLBACK_SPREAD).exp());
            }
        }
        Self::from_values(size, values, true)
    }

    /// Gaussian product-kernel estimate with Scott's-rule bandwidth per axis.
    /// Never fails: an empty point set yields the synthetic field.
    pub fn estimate<E: Spatial>(
        entities: &[E],
        extent: Extent,
        resolution: usize,
        fallback_resolution: usize,
    ) -> Self {
        let points: Vec<Point> = entities.iter().filter_map(Spatial::position).collect();
        if points.is_empty() {
            tracing::debug!("no valid question positions, using synthetic density");
            return Self::synthetic(fallback_resolution);
        }

        let size = resolution.max(2);
        let extent = extent.non_degenerate();
        let n = points.len() as f64;
        let scott = n.powf(-1.0 / 6.0);
        let hx = (std_dev(points.iter().map(|p| p.x)) * scott)
            .max(extent.width() * MIN_BANDWIDTH_FRACTION);
        let hy = (std_dev(points.iter().map(|p| p.y)) * scott)
            .max(extent.height() * MIN_BANDWIDTH_FRACTION);
        let bandwidth_ok = hx.is_finite() && hy.is_finite() && hx > 0.0 && hy > 0.0;
        if !bandwidth_ok {
            tracing::warn!(hx, hy, "degenerate kernel bandwidth, using synthetic density");
            return Self::synthetic(fallback_resolution);
        }
        let norm = 1.0 / (2.0 * std::f64::consts::PI * hx * hy * n);

        let step_x = extent.width() / (size - 1) as f64;
        let step_y = extent.height() / (size - 1) as f64;
        let mut values = Vec::with_capacity(size * size);
        for i in 0..size {
            let x = extent.x_min + i as f64 * step_x;
            for j in 0..size {
                let y = extent.y_min + j as f64 * step_y;
                let sum: f64 = points
                    .iter()
                    .map(|p| {
                        let u = (x - p.x) / hx;
                        let v = (y - p.y) / hy;
                        (-0.5 * (u * u + v * v)).exp()
                    })
                    .sum();
                values.push(sum * norm);
            }
        }
        if values.iter().any(|v| !v.is_finite()) {
            tracing::warn!("non-finite density values, using synthetic density");
            return Self::synthetic(fallback_resolution);
        }
        Self::from_values(size, values, false)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn value(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.size + j]
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    /// Lattice index `(i, j)` of the largest value.
    pub fn argmax(&self) -> (usize, usize) {
        let mut best = 0;
        for (idx, v) in self.values.iter().enumerate() {
            if *v > self.values[best] {
                best = idx;
            }
        }
        (best / self.size, best % self.size)
    }

    /// `count` evenly spaced thresholds starting at `min`, `max` excluded.
    /// A flat field has a single threshold.
    pub fn thresholds(&self, count: usize) -> Vec<f64> {
        let span = self.max - self.min;
        if count == 0 {
            return Vec::new();
        }
        if span <= 0.0 {
            return vec![self.min];
        }
        let step = span / count as f64;
        (0..count).map(|k| self.min + k as f64 * step).collect()
    }
}

fn std_dev(values: impl Iterator<Item = f64> + Clone) -> f64 {
    let (count, sum) = values.clone().fold((0usize, 0.0), |(c, s), v| (c + 1, s + v));
    if count < 2 {
        return 0.0;
    }
    let mean = sum / count as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / (count - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Question;

    #[test]
    fn empty_input_falls_back_to_centered_peak() {
        let field = DensityField::estimate::<Question>(&[], Extent::UNIT, 50, 20);
        assert!(field.is_synthetic());
        assert_eq!(field.size(), 20);
        assert_eq!(field.argmax(), (10, 10));
        assert!(field.values().iter().all(|v| *v >= 0.0));
    }

    #[test]
    fn synthetic_field_is_radially_symmetric() {
        let field = DensityField::synthetic(20);
        assert_eq!(field.value(10, 5), field.value(5, 10));
        assert_eq!(field.value(10, 15), field.value(15, 10));
    }

    #[test]
    fn estimate_is_non_negative_and_peaks_at_cluster() {
        let mut questions = Vec::new();
        for k in 0..12 {
            let jitter = k as f64 * 0.01;
            questions.push(Question::new(k + 1, 0.8 + jitter, 0.8 - jitter));
        }
        questions.push(Question::new(100, -0.9, -0.9));
        let extent = Extent::of(&questions).expect("extent");
        let field = DensityField::estimate(&questions, extent, 40, 20);
        assert!(!field.is_synthetic());
        assert!(field.values().iter().all(|v| *v >= 0.0));

        let (i, j) = field.argmax();
        let step_x = extent.width() / 39.0;
        let step_y = extent.height() / 39.0;
        let peak = Point::new(
            extent.x_min + i as f64 * step_x,
            extent.y_min + j as f64 * step_y,
        );
        assert!(peak.distance(Point::new(0.85, 0.75)) < 0.3, "peak at {peak:?}");
    }

    #[test]
    fn single_point_does_not_produce_nan() {
        let questions = vec![Question::new(1, 2.0, 2.0)];
        let extent = Extent::of(&questions).expect("extent");
        let field = DensityField::estimate(&questions, extent, 10, 20);
        assert!(field.values().iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(field.max() > 0.0);
    }

    #[test]
    fn collocated_points_far_from_origin_stay_finite() {
        let questions = vec![Question::new(1, 1e11, 1e11), Question::new(2, 1e11, 1e11)];
        let extent = Extent::of(&questions).expect("extent");
        let field = DensityField::estimate(&questions, extent, 20, 20);
        assert!(field.values().iter().all(|v| v.is_finite() && *v >= 0.0));
        assert!(field.max() > field.min());
    }

    #[test]
    fn thresholds_are_evenly_spaced_from_min() {
        let field = DensityField::synthetic(20);
        let thresholds = field.thresholds(15);
        assert_eq!(thresholds.len(), 15);
        assert_eq!(thresholds[0], field.min());
        assert!(*thresholds.last().unwrap() < field.max());
        let step = (field.max() - field.min()) / 15.0;
        for pair in thresholds.windows(2) {
            assert!((pair[1] - pair[0] - step).abs() < 1e-12);
        }
    }
}
