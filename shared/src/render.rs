//! Builds the five data layers of the scene from explicit inputs.
//!
//! Rebuilds are keyed: a frame with the same data version, mapper and visible
//! set as the previous one is a no-op, and the chunk layer is only redrawn when
//! the data version or mapper moved.

use std::collections::BTreeSet;
use std::fmt::Write as FmtWrite;

use crate::color::{SequentialScale, hex_css};
use crate::config::OverviewConfig;
use crate::contour::contour_bands;
use crate::density::DensityField;
use crate::entity::{Chunk, DataVersion, Question, Spatial};
use crate::extent::Extent;
use crate::grid::{GridAssignment, GridSpec, assign_to_grid};
use crate::scale::CoordinateMapper;
use crate::scene::{LayerKind, Node, NodeTag, Scene, Shape, Style, num};

pub const BACKGROUND_FILL: &str = "#d3d3d3";
pub const BACKGROUND_OPACITY: f64 = 0.4;
pub const BACKGROUND_STROKE: &str = "#fff";
pub const FOREGROUND_FILL: &str = "#1a73e8";
pub const FOREGROUND_OPACITY: f64 = 0.6;
pub const FOREGROUND_STROKE: &str = "#AAAAAA";
pub const CHUNK_FILL: &str = "#c0d6e4";
pub const CHUNK_OPACITY: f64 = 0.6;

/// Resting style of a question marker in its layer.
pub fn base_point_style(kind: LayerKind) -> Option<Style> {
    match kind {
        LayerKind::BackgroundPoints => Some(
            Style::filled(BACKGROUND_FILL, BACKGROUND_OPACITY).with_stroke(BACKGROUND_STROKE, 1.0),
        ),
        LayerKind::ForegroundPoints => Some(
            Style::filled(FOREGROUND_FILL, FOREGROUND_OPACITY).with_stroke(FOREGROUND_STROKE, 1.0),
        ),
        _ => None,
    }
}

/// Everything one render pass needs. Questions and chunks must already be
/// filtered to valid positions (chunks also truncated).
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    pub version: DataVersion,
    pub questions: &'a [Question],
    pub chunks: &'a [Chunk],
    pub visible: &'a BTreeSet<u64>,
    pub mapper: CoordinateMapper,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderOutcome {
    Unchanged,
    Rebuilt { chunks: bool },
}

#[derive(Debug, Clone, PartialEq)]
struct FrameKey {
    version: DataVersion,
    mapper: CoordinateMapper,
    visible: BTreeSet<u64>,
}

#[derive(Debug)]
pub struct SceneRenderer {
    config: OverviewConfig,
    key: Option<FrameKey>,
    chunks_key: Option<(DataVersion, CoordinateMapper)>,
    density: Option<(DataVersion, Extent, DensityField)>,
    grid: Option<GridAssignment<Chunk>>,
}

impl SceneRenderer {
    pub fn new(config: OverviewConfig) -> Self {
        Self {
            config,
            key: None,
            chunks_key: None,
            density: None,
            grid: None,
        }
    }

    pub fn config(&self) -> &OverviewConfig {
        &self.config
    }

    /// Grid built by the last rebuild.
    pub fn grid(&self) -> Option<&GridAssignment<Chunk>> {
        self.grid.as_ref()
    }

    pub fn density(&self) -> Option<&DensityField> {
        self.density.as_ref().map(|(_, _, field)| field)
    }

    /// Forget the cache so the next frame rebuilds everything.
    pub fn invalidate(&mut self) {
        self.key = None;
        self.chunks_key = None;
    }

    pub fn render(&mut self, scene: &mut Scene, frame: &Frame<'_>) -> RenderOutcome {
        let key = FrameKey {
            version: frame.version,
            mapper: frame.mapper,
            visible: frame.visible.clone(),
        };
        if self.key.as_ref() == Some(&key) {
            tracing::debug!(version = frame.version.0, "frame unchanged, skipping rebuild");
            return RenderOutcome::Unchanged;
        }

        let mapper = frame.mapper;
        let extent = mapper.extent();
        let resolution = self.config.density_resolution;
        let fallback = self.config.fallback_resolution;
        if self
            .density
            .as_ref()
            .is_some_and(|(version, cached, _)| *version != frame.version || *cached != extent)
        {
            self.density = None;
        }
        let (_, _, field) = self.density.get_or_insert_with(|| {
            (
                frame.version,
                extent,
                DensityField::estimate(frame.questions, extent, resolution, fallback),
            )
        });
        let contours = contour_nodes(field, &mapper, &self.config);
        scene.replace_layer(LayerKind::Contours, contours);

        let spec = GridSpec::new(extent, self.config.grid_size);
        scene.replace_layer(LayerKind::Cells, cell_nodes(&spec, &mapper));

        let chunks_key = (frame.version, mapper);
        let chunks_redrawn = self.chunks_key != Some(chunks_key);
        if chunks_redrawn {
            scene.replace_layer(
                LayerKind::Chunks,
                chunk_nodes(frame.chunks, &mapper, self.config.chunk_radius),
            );
            self.chunks_key = Some(chunks_key);
        }
        self.grid = Some(assign_to_grid(frame.chunks, extent, self.config.grid_size));

        let (foreground, background): (Vec<&Question>, Vec<&Question>) = frame
            .questions
            .iter()
            .filter(|q| q.position().is_some())
            .partition(|q| frame.visible.contains(&q.id));
        scene.replace_layer(
            LayerKind::BackgroundPoints,
            question_nodes(&background, LayerKind::BackgroundPoints, &mapper, &self.config),
        );
        scene.replace_layer(
            LayerKind::ForegroundPoints,
            question_nodes(&foreground, LayerKind::ForegroundPoints, &mapper, &self.config),
        );

        tracing::debug!(
            version = frame.version.0,
            foreground = foreground.len(),
            background = background.len(),
            chunks = frame.chunks.len(),
            chunks_redrawn,
            "scene rebuilt"
        );
        self.key = Some(key);
        RenderOutcome::Rebuilt {
            chunks: chunks_redrawn,
        }
    }
}

/// One even-odd path per non-empty threshold band, lattice mapped onto the
/// plot rectangle with lattice `j` growing upward.
fn contour_nodes(field: &DensityField, mapper: &CoordinateMapper, config: &OverviewConfig) -> Vec<Node> {
    let (left, top, width, height) = mapper.plot_rect();
    let bottom = top + height;
    let last = (field.size().max(2) - 1) as f64;
    let scale = SequentialScale::new(field.min(), field.max());
    let thresholds = field.thresholds(config.contour_thresholds);

    contour_bands(field, &thresholds)
        .into_iter()
        .filter(|band| !band.is_empty())
        .map(|band| {
            let mut d = String::new();
            for ring in &band.rings {
                for (k, &(i, j)) in ring.iter().enumerate() {
                    let x = left + i / last * width;
                    let y = bottom - j / last * height;
                    let _ = write!(d, "{}{},{}", if k == 0 { 'M' } else { 'L' }, num(x), num(y));
                }
                d.push('Z');
            }
            let mut style = Style::filled(hex_css(scale.color(band.threshold)), config.contour_opacity);
            style.even_odd = true;
            Node::new("contour", Shape::Path { d }, style)
        })
        .collect()
}

fn cell_nodes(spec: &GridSpec, mapper: &CoordinateMapper) -> Vec<Node> {
    spec.cells()
        .map(|cell| {
            let (x, y, width, height) = spec.pixel_rect(cell, mapper);
            Node::new(
                "grid-cell",
                Shape::Rect { x, y, width, height, rx: 0.0 },
                Style::filled("transparent", 1.0).with_stroke("transparent", 1.0),
            )
            .tagged(NodeTag::Cell(cell.to_string()))
        })
        .collect()
}

fn chunk_nodes(chunks: &[Chunk], mapper: &CoordinateMapper, radius: f64) -> Vec<Node> {
    chunks
        .iter()
        .enumerate()
        .filter_map(|(index, chunk)| {
            let (cx, cy) = mapper.to_pixel(chunk.position()?);
            Some(
                Node::new(
                    "chunk-point",
                    Shape::Circle { cx, cy, r: radius },
                    Style::filled(CHUNK_FILL, CHUNK_OPACITY),
                )
                .tagged(NodeTag::Chunk(index)),
            )
        })
        .collect()
}

fn question_nodes(
    questions: &[&Question],
    kind: LayerKind,
    mapper: &CoordinateMapper,
    config: &OverviewConfig,
) -> Vec<Node> {
    let class = match kind {
        LayerKind::ForegroundPoints => "foreground-point data-point",
        _ => "background-point data-point",
    };
    let Some(style) = base_point_style(kind) else {
        return Vec::new();
    };
    questions
        .iter()
        .filter_map(|q| {
            let (cx, cy) = mapper.to_pixel(q.position()?);
            Some(
                Node::new(
                    class,
                    Shape::Circle { cx, cy, r: config.question_radius },
                    style.clone(),
                )
                .tagged(NodeTag::Entity(q.id)),
            )
        })
        .collect()
}
