use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::entity::{Point, Spatial};
use crate::extent::Extent;
use crate::scale::CoordinateMapper;

/// Address of one grid cell. `i` counts columns left to right, `j` counts rows
/// top to bottom in pixel space, so row 0 holds the highest data-y band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellId {
    pub i: usize,
    pub j: usize,
}

impl CellId {
    pub const fn new(i: usize, j: usize) -> Self {
        Self { i, j }
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cell-{}-{}", self.i, self.j)
    }
}

impl FromStr for CellId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("cell-")
            .ok_or_else(|| format!("not a cell id: {s}"))?;
        let (i, j) = rest
            .split_once('-')
            .ok_or_else(|| format!("not a cell id: {s}"))?;
        let parse = |part: &str| {
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(format!("not a cell id: {s}"));
            }
            part.parse::<usize>()
                .map_err(|e| format!("bad cell index in {s}: {e}"))
        };
        Ok(CellId::new(parse(i)?, parse(j)?))
    }
}

/// A square `size × size` partition of a data extent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    extent: Extent,
    size: usize,
}

impl GridSpec {
    pub fn new(extent: Extent, size: usize) -> Self {
        Self {
            extent: extent.non_degenerate(),
            size: size.max(1),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Rows always equal columns; cells stay square under the mapper whatever
    /// the container's aspect ratio.
    pub fn size_y(&self) -> usize {
        self.size
    }

    pub fn extent(&self) -> Extent {
        self.extent
    }

    pub fn contains_cell(&self, cell: CellId) -> bool {
        cell.i < self.size && cell.j < self.size
    }

    /// Parse a `cell-<i>-<j>` id and reject indices outside this grid.
    pub fn parse_cell(&self, raw: &str) -> Option<CellId> {
        let cell = raw.parse::<CellId>().ok()?;
        self.contains_cell(cell).then_some(cell)
    }

    fn x_edge(&self, k: usize) -> f64 {
        self.extent.x_min + self.extent.width() * (k as f64 / self.size as f64)
    }

    fn y_edge(&self, k: usize) -> f64 {
        self.extent.y_min + self.extent.height() * (k as f64 / self.size as f64)
    }

    /// Data-space bounds `(x_min, x_max, y_min, y_max)` of a cell. The row
    /// index is inverted so `j = 0` is the top (highest y) band.
    pub fn cell_bounds(&self, cell: CellId) -> (f64, f64, f64, f64) {
        let y_factor = self.size - cell.j.min(self.size - 1) - 1;
        (
            self.x_edge(cell.i),
            self.x_edge(cell.i + 1),
            self.y_edge(y_factor),
            self.y_edge(y_factor + 1),
        )
    }

    /// Column/row band index along one axis. Lower bounds are inclusive and
    /// upper bounds exclusive, except the last band which also takes the global
    /// maximum edge.
    fn band(&self, v: f64, min: f64, max: f64, edge: impl Fn(usize) -> f64) -> Option<usize> {
        if !v.is_finite() || v < min || v > max {
            return None;
        }
        let span = max - min;
        let guess = ((v - min) / span * self.size as f64).floor();
        let mut k = (guess.max(0.0) as usize).min(self.size - 1);
        // Nudge to agree exactly with the edge formula used by `cell_bounds`.
        while k > 0 && v < edge(k) {
            k -= 1;
        }
        while k + 1 < self.size && v >= edge(k + 1) {
            k += 1;
        }
        Some(k)
    }

    /// The cell that owns a data point, or `None` outside the extent.
    pub fn cell_at(&self, p: Point) -> Option<CellId> {
        let e = self.extent;
        let i = self.band(p.x, e.x_min, e.x_max, |k| self.x_edge(k))?;
        let y_factor = self.band(p.y, e.y_min, e.y_max, |k| self.y_edge(k))?;
        Some(CellId::new(i, self.size - y_factor - 1))
    }

    /// Pixel rectangle `(x, y, width, height)` of a cell, before any pan/zoom.
    pub fn pixel_rect(&self, cell: CellId, mapper: &CoordinateMapper) -> (f64, f64, f64, f64) {
        let (x0, x1, y0, y1) = self.cell_bounds(cell);
        let left = mapper.x.apply(x0);
        let right = mapper.x.apply(x1);
        let top = mapper.y.apply(y1);
        let bottom = mapper.y.apply(y0);
        (left, top, right - left, bottom - top)
    }

    pub fn cells(&self) -> impl Iterator<Item = CellId> + '_ {
        (0..self.size).flat_map(move |i| (0..self.size).map(move |j| CellId::new(i, j)))
    }
}

/// Sparse cell → entities map. Only cells with at least one entity are stored;
/// entities keep their input order within a cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridAssignment<E> {
    spec: GridSpec,
    cells: BTreeMap<CellId, Vec<E>>,
}

impl<E> GridAssignment<E> {
    pub fn spec(&self) -> &GridSpec {
        &self.spec
    }

    pub fn get(&self, cell: CellId) -> &[E] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellId, &[E])> {
        self.cells.iter().map(|(id, es)| (*id, es.as_slice()))
    }

    pub fn occupied(&self) -> usize {
        self.cells.len()
    }

    pub fn total(&self) -> usize {
        self.cells.values().map(Vec::len).sum()
    }
}

/// Bucket every entity with a valid position inside `extent` into exactly one
/// cell of a `size × size` grid. Rebuilt from scratch on each call.
pub fn assign_to_grid<E: Spatial + Clone>(
    entities: &[E],
    extent: Extent,
    size: usize,
) -> GridAssignment<E> {
    let spec = GridSpec::new(extent, size);
    let mut cells: BTreeMap<CellId, Vec<E>> = BTreeMap::new();
    let mut outside = 0usize;
    for entity in entities {
        let Some(p) = entity.position() else {
            continue;
        };
        match spec.cell_at(p) {
            Some(cell) => cells.entry(cell).or_default().push(entity.clone()),
            None => outside += 1,
        }
    }
    if outside > 0 {
        tracing::debug!(outside, "entities outside the grid extent were not indexed");
    }
    GridAssignment { spec, cells }
}
