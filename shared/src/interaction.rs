//! Pan/zoom, hover, hit testing, tooltip ownership and the two overlays.
//!
//! The controller is the only writer of the transform and the tooltip. It
//! never reads application state; the current selection is passed in.

use crate::config::OverviewConfig;
use crate::entity::{Chunk, Spatial};
use crate::grid::{CellId, GridAssignment, GridSpec};
use crate::render::base_point_style;
use crate::scale::CoordinateMapper;
use crate::scene::{LayerKind, Node, NodeTag, Scene, Shape, Style};
use crate::tooltip::{TimerTicket, Tooltip, TooltipContent};
use crate::transform::Transform;

/// Extra hit radius around markers, in screen pixels.
const HIT_SLOP: f64 = 2.0;
const HOVER_STROKE_WIDTH: f64 = 2.0;
const SELECTED_STROKE: &str = "#ff0";
const SELECTED_STROKE_WIDTH: f64 = 3.0;
const HIGHLIGHT_STROKE: &str = "#4285F4";
const HIGHLIGHT_STROKE_WIDTH: f64 = 3.0;
const HIGHLIGHT_CORNER: f64 = 8.0;

const POINT_LAYERS: [LayerKind; 2] = [LayerKind::ForegroundPoints, LayerKind::BackgroundPoints];

/// What is under the pointer, topmost first.
#[derive(Debug, Clone, PartialEq)]
pub enum Hit {
    Question { id: u64, layer: LayerKind, index: usize },
    Chunk(Chunk),
    Cell(CellId),
}

#[derive(Debug, Clone)]
pub struct InteractionController {
    transform: Transform,
    tooltip: Tooltip,
    hovered: Option<(LayerKind, usize)>,
    config: OverviewConfig,
}

impl InteractionController {
    pub fn new(config: OverviewConfig) -> Self {
        Self {
            transform: Transform::IDENTITY,
            tooltip: Tooltip::new(config.tooltip_dismiss_distance),
            hovered: None,
            config,
        }
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn tooltip(&self) -> &Tooltip {
        &self.tooltip
    }

    pub fn tooltip_mut(&mut self) -> &mut Tooltip {
        &mut self.tooltip
    }

    // --- pan / zoom ---

    pub fn zoom_at(&mut self, scene: &mut Scene, factor: f64, sx: f64, sy: f64) -> Transform {
        let (min_k, max_k) = (self.config.min_zoom, self.config.max_zoom);
        self.transform.zoom_at(factor, sx, sy, min_k, max_k);
        self.apply_transform(scene)
    }

    /// Zoom to an absolute scale about the surface centre.
    pub fn zoom_to(&mut self, scene: &mut Scene, k: f64) -> Transform {
        let size = scene.size();
        let (min_k, max_k) = (self.config.min_zoom, self.config.max_zoom);
        self.transform
            .scale_to(k, size.width / 2.0, size.height / 2.0, min_k, max_k);
        self.apply_transform(scene)
    }

    pub fn pan(&mut self, scene: &mut Scene, dx: f64, dy: f64) -> Transform {
        self.transform.pan(dx, dy);
        self.apply_transform(scene)
    }

    pub fn reset_transform(&mut self, scene: &mut Scene) -> Transform {
        self.transform = Transform::IDENTITY;
        self.apply_transform(scene)
    }

    fn apply_transform(&self, scene: &mut Scene) -> Transform {
        scene.set_transform(self.transform);
        self.transform
    }

    // --- hit testing ---

    /// Hit test a viewBox point against questions, then chunks, then cells.
    pub fn hit_test(
        &self,
        scene: &Scene,
        grid: Option<&GridAssignment<Chunk>>,
        mapper: &CoordinateMapper,
        sx: f64,
        sy: f64,
    ) -> Option<Hit> {
        let (px, py) = self.transform.invert(sx, sy);
        let slop = HIT_SLOP / self.transform.k;

        for kind in POINT_LAYERS {
            let nodes = &scene.layer(kind).nodes;
            for (index, node) in nodes.iter().enumerate().rev() {
                if let (Shape::Circle { cx, cy, r }, Some(id)) = (&node.shape, node.entity_id()) {
                    if (px - cx).hypot(py - cy) <= r + slop {
                        return Some(Hit::Question { id, layer: kind, index });
                    }
                }
            }
        }

        let grid = grid?;
        let cell = grid.spec().cell_at(mapper.to_data(px, py))?;
        let reach = self.config.chunk_radius + slop;
        let mut best: Option<(f64, &Chunk)> = None;
        for neighbour in neighbourhood(grid.spec(), cell) {
            for chunk in grid.get(neighbour) {
                let Some(p) = chunk.position() else { continue };
                let (cx, cy) = mapper.to_pixel(p);
                let d = (px - cx).hypot(py - cy);
                if d <= reach && best.is_none_or(|(bd, _)| d < bd) {
                    best = Some((d, chunk));
                }
            }
        }
        if let Some((_, chunk)) = best {
            return Some(Hit::Chunk(chunk.clone()));
        }
        Some(Hit::Cell(cell))
    }

    // --- hover ---

    /// Move hover emphasis to `target` (a question marker) or clear it.
    /// The selected marker keeps its emphasis when the pointer leaves.
    pub fn set_hover(
        &mut self,
        scene: &mut Scene,
        target: Option<(LayerKind, usize)>,
        selected: Option<u64>,
    ) {
        if self.hovered == target {
            return;
        }
        if let Some((kind, index)) = self.hovered.take() {
            self.leave(scene, kind, index, selected);
        }
        if let Some((kind, index)) = target {
            let level = match kind {
                LayerKind::ForegroundPoints => self.config.hover_opacity_foreground,
                _ => self.config.hover_opacity_background,
            };
            if let Some(node) = scene.node_mut(kind, index) {
                node.style.opacity = level;
                node.style.stroke_width = HOVER_STROKE_WIDTH;
                self.hovered = Some((kind, index));
            }
        }
    }

    fn leave(&self, scene: &mut Scene, kind: LayerKind, index: usize, selected: Option<u64>) {
        let Some(base) = base_point_style(kind) else {
            return;
        };
        let is_selected = scene
            .layer(kind)
            .nodes
            .get(index)
            .and_then(Node::entity_id)
            .is_some_and(|id| Some(id) == selected);
        if is_selected {
            return;
        }
        if let Some(node) = scene.node_mut(kind, index) {
            node.style = base;
        }
    }

    /// Put the marker for `id` back to its layer's base style, unless the
    /// pointer is currently over it.
    pub fn restore_base(&self, scene: &mut Scene, id: u64) -> bool {
        let Some((kind, index)) = scene.find_entity(id, &POINT_LAYERS) else {
            return false;
        };
        if self.hovered == Some((kind, index)) {
            return false;
        }
        let (Some(base), Some(node)) = (base_point_style(kind), scene.node_mut(kind, index)) else {
            return false;
        };
        node.style = base;
        true
    }

    /// Drop hover bookkeeping after the point layers were rebuilt.
    pub fn forget_hover(&mut self) {
        self.hovered = None;
    }

    // --- tooltip ---

    pub fn show_tooltip(
        &mut self,
        content: TooltipContent,
        client: (f64, f64),
        page: (f64, f64),
    ) -> TimerTicket {
        self.tooltip
            .show(content, client, page, self.config.tooltip_timeout_ms)
    }

    // --- overlays ---

    /// Draw the single selection marker. Returns `false` (and leaves the
    /// overlay empty) when `id` has no rendered marker.
    pub fn update_selected_point(&self, scene: &mut Scene, id: Option<u64>) -> bool {
        let Some(id) = id else {
            scene.clear_layer(LayerKind::SelectedPoint);
            return false;
        };
        let found = scene
            .find_entity(id, &POINT_LAYERS)
            .and_then(|(kind, index)| scene.layer(kind).nodes.get(index));
        let marker = match found {
            Some(Node {
                shape: Shape::Circle { cx, cy, .. },
                style,
                ..
            }) => Node::new(
                "selected-point",
                Shape::Circle {
                    cx: *cx,
                    cy: *cy,
                    r: self.config.selected_radius,
                },
                Style::filled(style.fill.clone(), 1.0)
                    .with_stroke(SELECTED_STROKE, SELECTED_STROKE_WIDTH),
            )
            .tagged(NodeTag::Entity(id)),
            _ => {
                tracing::warn!(id, "no rendered point to highlight");
                scene.clear_layer(LayerKind::SelectedPoint);
                return false;
            }
        };
        scene.replace_layer(LayerKind::SelectedPoint, vec![marker]);
        true
    }

    /// Draw the rounded border around `cell_id`. Stroke width and corner
    /// radius are divided by `k` so the border keeps its screen thickness.
    pub fn highlight_cell(
        &self,
        scene: &mut Scene,
        spec: &GridSpec,
        mapper: &CoordinateMapper,
        cell_id: Option<&str>,
    ) -> bool {
        let Some(raw) = cell_id else {
            scene.clear_layer(LayerKind::HighlightBorder);
            return false;
        };
        let Some(cell) = spec.parse_cell(raw) else {
            tracing::warn!(cell = raw, "ignoring invalid grid cell id");
            scene.clear_layer(LayerKind::HighlightBorder);
            return false;
        };
        let k = self.transform.k;
        let (x, y, width, height) = spec.pixel_rect(cell, mapper);
        let border = Node::new(
            "highlight-border",
            Shape::Rect {
                x,
                y,
                width,
                height,
                rx: HIGHLIGHT_CORNER / k,
            },
            Style::filled("transparent", 1.0).with_stroke(HIGHLIGHT_STROKE, HIGHLIGHT_STROKE_WIDTH / k),
        )
        .tagged(NodeTag::Cell(cell.to_string()));
        scene.replace_layer(LayerKind::HighlightBorder, vec![border]);
        true
    }
}

fn neighbourhood(spec: &GridSpec, cell: CellId) -> impl Iterator<Item = CellId> + '_ {
    let i_range = cell.i.saturating_sub(1)..=cell.i + 1;
    i_range.flat_map(move |i| {
        (cell.j.saturating_sub(1)..=cell.j + 1)
            .map(move |j| CellId { i, j })
            .filter(move |c| spec.contains_cell(*c))
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::entity::{DataVersion, Question};
    use crate::extent::Extent;
    use crate::render::{Frame, SceneRenderer};
    use crate::scale::PixelSize;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    struct Fixture {
        scene: Scene,
        renderer: SceneRenderer,
        mapper: CoordinateMapper,
        controller: InteractionController,
    }

    fn fixture(questions: &[Question], chunks: &[Chunk], visible: &[u64]) -> Fixture {
        let config = OverviewConfig::default();
        let size = PixelSize::new(400.0, 400.0);
        let mapper = CoordinateMapper::new(Extent::of_data(questions, chunks), size, 20.0);
        let visible: BTreeSet<u64> = visible.iter().copied().collect();
        let mut scene = Scene::new(size);
        let mut renderer = SceneRenderer::new(config.clone());
        renderer.render(
            &mut scene,
            &Frame {
                version: DataVersion::of(questions, chunks),
                questions,
                chunks,
                visible: &visible,
                mapper,
            },
        );
        Fixture {
            scene,
            renderer,
            mapper,
            controller: InteractionController::new(config),
        }
    }

    fn two_questions() -> Vec<Question> {
        vec![Question::new(1, 0.0, 0.0), Question::new(2, 1.0, 1.0)]
    }

    #[test]
    fn selecting_twice_leaves_one_marker_at_latest() {
        let mut f = fixture(&two_questions(), &[], &[1]);
        assert!(f.controller.update_selected_point(&mut f.scene, Some(1)));
        assert!(f.controller.update_selected_point(&mut f.scene, Some(2)));

        let nodes = &f.scene.layer(LayerKind::SelectedPoint).nodes;
        assert_eq!(nodes.len(), 1);
        let (px, py) = f.mapper.to_pixel(crate::entity::Point::new(1.0, 1.0));
        let Shape::Circle { cx, cy, r } = nodes[0].shape else {
            panic!("marker should be a circle");
        };
        assert_close(cx, px);
        assert_close(cy, py);
        assert_close(r, 8.0);
        assert_eq!(nodes[0].style.fill, crate::render::BACKGROUND_FILL);
        assert_eq!(nodes[0].style.stroke.as_deref(), Some("#ff0"));
    }

    #[test]
    fn selecting_unknown_id_creates_no_marker() {
        let mut f = fixture(&two_questions(), &[], &[]);
        assert!(!f.controller.update_selected_point(&mut f.scene, Some(42)));
        assert!(f.scene.layer(LayerKind::SelectedPoint).nodes.is_empty());
    }

    #[test]
    fn zoom_request_is_clamped() {
        let mut f = fixture(&two_questions(), &[], &[]);
        let t = f.controller.zoom_to(&mut f.scene, 20.0);
        assert_close(t.k, 8.0);
        assert_eq!(f.scene.transform(), t);
        let t = f.controller.zoom_to(&mut f.scene, 0.1);
        assert_close(t.k, 0.5);
    }

    #[test]
    fn hover_revert_respects_selection() {
        let mut f = fixture(&two_questions(), &[], &[1]);
        let (fg, _) = f
            .scene
            .find_entity(1, &[LayerKind::ForegroundPoints])
            .expect("question 1 in foreground");
        assert_eq!(fg, LayerKind::ForegroundPoints);

        f.controller
            .set_hover(&mut f.scene, Some((LayerKind::ForegroundPoints, 0)), None);
        assert_close(f.scene.layer(fg).nodes[0].style.opacity, 0.8);
        f.controller.set_hover(&mut f.scene, None, None);
        assert_close(f.scene.layer(fg).nodes[0].style.opacity, 0.6);

        f.controller
            .set_hover(&mut f.scene, Some((LayerKind::BackgroundPoints, 0)), Some(2));
        assert_close(f.scene.layer(LayerKind::BackgroundPoints).nodes[0].style.opacity, 0.7);
        f.controller.set_hover(&mut f.scene, None, Some(2));
        assert_close(f.scene.layer(LayerKind::BackgroundPoints).nodes[0].style.opacity, 0.7);
    }

    #[test]
    fn restoring_base_skips_the_hovered_marker() {
        let mut f = fixture(&two_questions(), &[], &[1]);
        f.controller
            .set_hover(&mut f.scene, Some((LayerKind::BackgroundPoints, 0)), Some(2));
        f.controller.set_hover(&mut f.scene, None, Some(2));
        assert!(f.controller.restore_base(&mut f.scene, 2));
        assert_close(f.scene.layer(LayerKind::BackgroundPoints).nodes[0].style.opacity, 0.4);

        f.controller
            .set_hover(&mut f.scene, Some((LayerKind::ForegroundPoints, 0)), Some(1));
        assert!(!f.controller.restore_base(&mut f.scene, 1));
        assert_close(f.scene.layer(LayerKind::ForegroundPoints).nodes[0].style.opacity, 0.8);
        assert!(!f.controller.restore_base(&mut f.scene, 42));
    }

    #[test]
    fn hit_test_follows_transform_and_z_order() {
        let questions = two_questions();
        let chunks = vec![Chunk::new(0.5, 0.5, "middle")];
        let mut f = fixture(&questions, &chunks, &[2]);
        f.controller.zoom_to(&mut f.scene, 2.0);
        let t = f.controller.transform();
        let grid = f.renderer.grid();

        let (px, py) = f.mapper.to_pixel(crate::entity::Point::new(1.0, 1.0));
        let (sx, sy) = t.apply(px, py);
        assert_eq!(
            f.controller.hit_test(&f.scene, grid, &f.mapper, sx + 3.0, sy),
            Some(Hit::Question { id: 2, layer: LayerKind::ForegroundPoints, index: 0 })
        );

        let (px, py) = f.mapper.to_pixel(crate::entity::Point::new(0.5, 0.5));
        let (sx, sy) = t.apply(px, py);
        assert_eq!(
            f.controller.hit_test(&f.scene, grid, &f.mapper, sx, sy),
            Some(Hit::Chunk(chunks[0].clone()))
        );

        let (px, py) = f.mapper.to_pixel(crate::entity::Point::new(0.25, 0.75));
        let (sx, sy) = t.apply(px, py);
        assert!(matches!(
            f.controller.hit_test(&f.scene, grid, &f.mapper, sx, sy),
            Some(Hit::Cell(_))
        ));
        assert_eq!(f.controller.hit_test(&f.scene, grid, &f.mapper, -500.0, -500.0), None);
    }

    #[test]
    fn highlight_border_keeps_screen_thickness() {
        let mut f = fixture(&two_questions(), &[], &[]);
        let spec = GridSpec::new(f.mapper.extent(), 13);
        assert!(f.controller.highlight_cell(&mut f.scene, &spec, &f.mapper, Some("cell-3-4")));
        let width_at_1 = f.scene.layer(LayerKind::HighlightBorder).nodes[0].style.stroke_width;

        f.controller.zoom_to(&mut f.scene, 4.0);
        f.controller.highlight_cell(&mut f.scene, &spec, &f.mapper, Some("cell-3-4"));
        let nodes = &f.scene.layer(LayerKind::HighlightBorder).nodes;
        assert_eq!(nodes.len(), 1);
        assert_close(nodes[0].style.stroke_width, width_at_1 / 4.0);
        let Shape::Rect { rx, .. } = nodes[0].shape else {
            panic!("border should be a rect");
        };
        assert_close(rx, 2.0);

        assert!(!f.controller.highlight_cell(&mut f.scene, &spec, &f.mapper, Some("cell-13-0")));
        assert!(f.scene.layer(LayerKind::HighlightBorder).nodes.is_empty());
    }
}
