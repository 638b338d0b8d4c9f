//! Iso-density polygons using marching squares.
//!
//! The lattice is padded with a ring of "below every threshold" samples, so each
//! traced boundary closes. Crossings are identified by the lattice edge they sit
//! on; every crossed edge is shared by exactly two squares, which makes ring
//! stitching a walk over a graph where every node has degree two.

use std::collections::{BTreeMap, BTreeSet};

use crate::density::DensityField;

/// All closed rings bounding the region `value >= threshold`. Ring coordinates
/// are in lattice units: `(i, j)` with `0 <= i, j <= size - 1`. Holes are
/// separate rings; fill with the even-odd rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ContourBand {
    pub threshold: f64,
    pub rings: Vec<Vec<(f64, f64)>>,
}

impl ContourBand {
    pub fn is_empty(&self) -> bool {
        self.rings.is_empty()
    }
}

/// `(i, j, vertical)`: the edge from padded sample `(i, j)` to `(i + 1, j)`
/// when horizontal, or to `(i, j + 1)` when vertical.
type EdgeKey = (usize, usize, bool);

pub fn contour_bands(field: &DensityField, thresholds: &[f64]) -> Vec<ContourBand> {
    thresholds
        .iter()
        .map(|&threshold| ContourBand {
            threshold,
            rings: trace(field, threshold),
        })
        .collect()
}

struct Padded<'a> {
    field: &'a DensityField,
    size: usize,
}

impl Padded<'_> {
    fn sample(&self, pi: usize, pj: usize) -> Option<f64> {
        if pi == 0 || pj == 0 || pi > self.size || pj > self.size {
            return None;
        }
        let v = self.field.value(pi - 1, pj - 1);
        if v.is_nan() { None } else { Some(v) }
    }

    fn inside(&self, pi: usize, pj: usize, threshold: f64) -> bool {
        self.sample(pi, pj).is_some_and(|v| v >= threshold)
    }

    fn crossing(&self, key: EdgeKey, threshold: f64) -> (f64, f64) {
        let (pi, pj, vertical) = key;
        let (qi, qj) = if vertical { (pi, pj + 1) } else { (pi + 1, pj) };
        let t = match (self.sample(pi, pj), self.sample(qi, qj)) {
            (Some(a), Some(b)) if (b - a).abs() > f64::EPSILON => {
                ((threshold - a) / (b - a)).clamp(0.0, 1.0)
            }
            (Some(_), Some(_)) => 0.5,
            (Some(_), None) => 0.0,
            (None, Some(_)) => 1.0,
            (None, None) => 0.5,
        };
        let x = pi as f64 + t * (qi as f64 - pi as f64) - 1.0;
        let y = pj as f64 + t * (qj as f64 - pj as f64) - 1.0;
        (x, y)
    }
}

fn trace(field: &DensityField, threshold: f64) -> Vec<Vec<(f64, f64)>> {
    let size = field.size();
    if size < 2 || !threshold.is_finite() {
        return Vec::new();
    }
    let padded = Padded { field, size };
    let mut adjacency: BTreeMap<EdgeKey, Vec<EdgeKey>> = BTreeMap::new();
    let mut link = |a: EdgeKey, b: EdgeKey| {
        adjacency.entry(a).or_default().push(b);
        adjacency.entry(b).or_default().push(a);
    };

    // Squares span padded samples 0..=size+1 on both axes.
    for ci in 0..=size {
        for cj in 0..=size {
            let a = padded.inside(ci, cj, threshold);
            let b = padded.inside(ci + 1, cj, threshold);
            let c = padded.inside(ci + 1, cj + 1, threshold);
            let d = padded.inside(ci, cj + 1, threshold);
            let case = a as u8 | (b as u8) << 1 | (c as u8) << 2 | (d as u8) << 3;

            let bottom = (ci, cj, false);
            let right = (ci + 1, cj, true);
            let top = (ci, cj + 1, false);
            let left = (ci, cj, true);

            match case {
                0 | 15 => {}
                1 | 14 => link(bottom, left),
                2 | 13 => link(bottom, right),
                3 | 12 => link(left, right),
                4 | 11 => link(right, top),
                6 | 9 => link(bottom, top),
                7 | 8 => link(left, top),
                5 | 10 => {
                    let centre_inside = [(ci, cj), (ci + 1, cj), (ci + 1, cj + 1), (ci, cj + 1)]
                        .iter()
                        .map(|&(i, j)| padded.sample(i, j))
                        .collect::<Option<Vec<f64>>>()
                        .is_some_and(|vs| vs.iter().sum::<f64>() / 4.0 >= threshold);
                    // Case 5 has `a` and `c` inside; joining them through the
                    // centre cuts off the `b` and `d` corners instead.
                    let cut_a_and_c = (case == 5) != centre_inside;
                    if cut_a_and_c {
                        link(bottom, left);
                        link(right, top);
                    } else {
                        link(bottom, right);
                        link(left, top);
                    }
                }
                _ => {}
            }
        }
    }

    let mut rings = Vec::new();
    let mut visited: BTreeSet<EdgeKey> = BTreeSet::new();
    for &start in adjacency.keys() {
        if visited.contains(&start) {
            continue;
        }
        let mut ring: Vec<(f64, f64)> = Vec::new();
        let mut prev: Option<EdgeKey> = None;
        let mut current = start;
        for _ in 0..adjacency.len() {
            visited.insert(current);
            let point = padded.crossing(current, threshold);
            if ring.last() != Some(&point) {
                ring.push(point);
            }
            let Some(neighbours) = adjacency.get(&current) else {
                break;
            };
            let next = neighbours
                .iter()
                .copied()
                .find(|n| Some(*n) != prev)
                .unwrap_or(neighbours[0]);
            prev = Some(current);
            current = next;
            if current == start {
                break;
            }
        }
        if ring.len() > 1 && ring.first() == ring.last() {
            ring.pop();
        }
        if ring.len() >= 3 {
            rings.push(ring);
        }
    }
    rings
}

/// Signed shoelace area of a ring.
pub fn ring_area(ring: &[(f64, f64)]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0;
    for (k, &(x0, y0)) in ring.iter().enumerate() {
        let (x1, y1) = ring[(k + 1) % ring.len()];
        twice += x0 * y1 - x1 * y0;
    }
    twice / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Question;
    use crate::extent::Extent;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn lowest_threshold_covers_whole_lattice() {
        let field = DensityField::synthetic(20);
        let bands = contour_bands(&field, &[field.min()]);
        assert_eq!(bands.len(), 1);
        assert_eq!(bands[0].rings.len(), 1);
        assert_close(ring_area(&bands[0].rings[0]).abs(), 19.0 * 19.0);
    }

    #[test]
    fn centred_peak_gives_one_ring_around_centre() {
        let field = DensityField::synthetic(20);
        let threshold = (field.min() + field.max()) / 2.0;
        let bands = contour_bands(&field, &[threshold]);
        let rings = &bands[0].rings;
        assert_eq!(rings.len(), 1);
        let ring = &rings[0];
        let (sx, sy) = ring
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        let cx = sx / ring.len() as f64;
        let cy = sy / ring.len() as f64;
        assert!((cx - 10.0).abs() < 0.5 && (cy - 10.0).abs() < 0.5);
        for &(x, y) in ring {
            assert!((0.0..=19.0).contains(&x) && (0.0..=19.0).contains(&y));
        }
    }

    #[test]
    fn separated_clusters_give_separate_rings() {
        let questions = vec![
            Question::new(1, 0.0, 0.0),
            Question::new(2, 0.05, 0.0),
            Question::new(3, 10.0, 10.0),
            Question::new(4, 10.0, 10.05),
        ];
        let extent = Extent::of(&questions).expect("extent");
        let field = DensityField::estimate(&questions, extent, 40, 20);
        let threshold = field.min() + (field.max() - field.min()) * 0.8;
        let bands = contour_bands(&field, &[threshold]);
        assert_eq!(bands[0].rings.len(), 2);
    }

    #[test]
    fn threshold_above_max_yields_nothing() {
        let field = DensityField::synthetic(10);
        let bands = contour_bands(&field, &[field.max() + 1.0]);
        assert!(bands[0].is_empty());
    }
}
