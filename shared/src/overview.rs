//! The engine facade the host drives.
//!
//! `Overview` holds the current data snapshot and the (optional) surface. All
//! entry points are no-ops while there is no surface. Application state is only
//! ever touched through [`OverviewSink`].

use std::collections::{BTreeSet, VecDeque};

use crate::bootstrap::{Surface, bootstrap};
use crate::config::OverviewConfig;
use crate::entity::{Chunk, DataVersion, Question, Spatial, valid_chunks, valid_questions};
use crate::extent::Extent;
use crate::grid::{CellId, GridSpec};
use crate::interaction::Hit;
use crate::render::{Frame, RenderOutcome};
use crate::scale::{CoordinateMapper, PixelSize};
use crate::scene::{Scene, SceneDelta};
use crate::tooltip::{TimerTicket, Tooltip, TooltipContent};
use crate::transform::Transform;

/// Pointer position of an input event in the three coordinate systems the
/// engine cares about.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PointerInfo {
    /// Surface viewBox coordinates.
    pub view: (f64, f64),
    /// Browser viewport coordinates.
    pub client: (f64, f64),
    /// Document coordinates.
    pub page: (f64, f64),
    /// Raised by the engine itself rather than by the user.
    pub synthetic: bool,
}

impl PointerInfo {
    pub fn synthetic() -> Self {
        Self {
            synthetic: true,
            ..Self::default()
        }
    }
}

/// Write side of the application stores.
pub trait OverviewSink {
    fn point_clicked(&mut self, event: &PointerInfo, question: &Question);
    fn cell_clicked(&mut self, cell: CellId, chunks: &[Chunk]);
    fn set_grid_chunks(&mut self, cell: CellId, chunks: &[Chunk]);
}

/// Selection mirrored from the stores.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HighlightState {
    pub selected: Option<u64>,
    pub active_cell: Option<String>,
}

/// Work that must run after the current render pass has finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deferred {
    ReplayClick(u64),
}

/// Result of routing a pointer move.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoverOutcome {
    pub hit: Option<Hit>,
    /// A tooltip was shown; the host must schedule this auto-hide.
    pub ticket: Option<TimerTicket>,
}

#[derive(Debug)]
pub struct Overview {
    config: OverviewConfig,
    surface: Option<Surface>,
    questions: Vec<Question>,
    chunks: Vec<Chunk>,
    version: DataVersion,
    visible: BTreeSet<u64>,
    highlight: HighlightState,
    hover_target: Option<Hit>,
    deferred: VecDeque<Deferred>,
}

impl Overview {
    pub fn new(config: OverviewConfig) -> Self {
        let config = config.sanitized();
        Self {
            config,
            surface: None,
            questions: Vec::new(),
            chunks: Vec::new(),
            version: DataVersion::of(&[], &[]),
            visible: BTreeSet::new(),
            highlight: HighlightState::default(),
            hover_target: None,
            deferred: VecDeque::new(),
        }
    }

    pub fn config(&self) -> &OverviewConfig {
        &self.config
    }

    pub fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.surface.as_ref().map(Surface::scene)
    }

    pub fn tooltip(&self) -> Option<&Tooltip> {
        self.surface.as_ref().map(|s| s.controller.tooltip())
    }

    pub fn transform(&self) -> Option<Transform> {
        self.surface.as_ref().map(|s| s.controller.transform())
    }

    pub fn highlight(&self) -> &HighlightState {
        &self.highlight
    }

    pub fn version(&self) -> DataVersion {
        self.version
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// (Re)create the surface for a container of the given size.
    pub fn bootstrap(&mut self, container: Option<PixelSize>) -> bool {
        self.hover_target = None;
        bootstrap(&mut self.surface, container, &self.config)
    }

    /// Replace the data snapshot. Invalid records are dropped here; chunks are
    /// truncated to the configured limit.
    pub fn set_data(&mut self, questions: &[Question], chunks: &[Chunk]) {
        self.questions = valid_questions(questions);
        self.chunks = valid_chunks(chunks, self.config.chunk_limit);
        self.version = DataVersion::of(&self.questions, &self.chunks);
        tracing::debug!(
            version = self.version.0,
            questions = self.questions.len(),
            dropped_questions = questions.len() - self.questions.len(),
            chunks = self.chunks.len(),
            "data snapshot replaced"
        );
    }

    /// Ids of the filtered question subset drawn in the foreground.
    pub fn set_visible(&mut self, ids: impl IntoIterator<Item = u64>) {
        self.visible = ids.into_iter().collect();
    }

    fn mapper(&self, size: PixelSize) -> CoordinateMapper {
        let extent = Extent::of_data(&self.questions, &self.chunks);
        CoordinateMapper::new(extent, size, self.config.margin)
    }

    /// Current mapper, if there is a surface.
    pub fn current_mapper(&self) -> Option<CoordinateMapper> {
        self.surface.as_ref().map(|s| self.mapper(s.size()))
    }

    /// Build layers 1–5 if anything they depend on changed, publish the grid
    /// and redraw the overlays.
    pub fn render(&mut self, sink: &mut dyn OverviewSink) -> RenderOutcome {
        let Some(size) = self.surface.as_ref().map(Surface::size) else {
            tracing::debug!("render requested without a surface");
            return RenderOutcome::Unchanged;
        };
        let mapper = self.mapper(size);
        let Some(surface) = self.surface.as_mut() else {
            return RenderOutcome::Unchanged;
        };
        let frame = Frame {
            version: self.version,
            questions: &self.questions,
            chunks: &self.chunks,
            visible: &self.visible,
            mapper,
        };
        let outcome = surface.renderer.render(&mut surface.scene, &frame);
        if outcome == RenderOutcome::Unchanged {
            return outcome;
        }

        surface.controller.forget_hover();
        self.hover_target = None;
        if let Some(grid) = surface.renderer.grid() {
            for (cell, chunks) in grid.iter() {
                sink.set_grid_chunks(cell, chunks);
            }
        }
        self.redraw_overlays();

        if self.highlight.active_cell.is_some() {
            if let Some(id) = self.highlight.selected {
                self.deferred.push_back(Deferred::ReplayClick(id));
            }
        }
        outcome
    }

    fn redraw_overlays(&mut self) {
        self.redraw_selected();
        self.redraw_highlight();
    }

    fn redraw_selected(&mut self) -> bool {
        let selected = self.highlight.selected;
        match self.surface.as_mut() {
            Some(surface) => surface
                .controller
                .update_selected_point(&mut surface.scene, selected),
            None => false,
        }
    }

    fn redraw_highlight(&mut self) -> bool {
        let Some(size) = self.surface.as_ref().map(Surface::size) else {
            return false;
        };
        let mapper = self.mapper(size);
        let spec = GridSpec::new(mapper.extent(), self.config.grid_size);
        let cell = self.highlight.active_cell.clone();
        match self.surface.as_mut() {
            Some(surface) => surface.controller.highlight_cell(
                &mut surface.scene,
                &spec,
                &mapper,
                cell.as_deref(),
            ),
            None => false,
        }
    }

    /// Mirror the store's selected question. Returns whether a marker is drawn.
    pub fn set_selected(&mut self, id: Option<u64>) -> bool {
        let previous = std::mem::replace(&mut self.highlight.selected, id);
        // A selected marker keeps its hover emphasis; drop it once deselected.
        if let Some(old) = previous.filter(|old| Some(*old) != id)
            && let Some(surface) = self.surface.as_mut()
        {
            surface.controller.restore_base(&mut surface.scene, old);
        }
        self.redraw_selected()
    }

    /// Mirror the store's active grid cell. Returns whether a border is drawn.
    pub fn set_active_cell(&mut self, cell: Option<String>) -> bool {
        self.highlight.active_cell = cell;
        self.redraw_highlight()
    }

    pub fn take_delta(&mut self) -> Option<SceneDelta> {
        self.surface.as_mut().map(|s| s.scene.take_delta())
    }

    // --- input ---

    fn hit_at(&self, view: (f64, f64)) -> Option<Hit> {
        let surface = self.surface.as_ref()?;
        let mapper = self.mapper(surface.size());
        surface.controller.hit_test(
            &surface.scene,
            surface.renderer.grid(),
            &mapper,
            view.0,
            view.1,
        )
    }

    fn question(&self, id: u64) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }

    /// Pointer moved over the surface: update hover emphasis and show a
    /// tooltip when a new point is entered.
    pub fn pointer_move(&mut self, pointer: &PointerInfo) -> HoverOutcome {
        if self.surface.is_none() {
            return HoverOutcome::default();
        }
        let hit = self.hit_at(pointer.view);
        let target = hit.clone().filter(|h| !matches!(h, Hit::Cell(_)));
        let hover = match &target {
            Some(Hit::Question { layer, index, .. }) => Some((*layer, *index)),
            _ => None,
        };
        let selected = self.highlight.selected;
        let entered = target.is_some() && target != self.hover_target;
        let content = if entered {
            match &target {
                Some(Hit::Question { id, .. }) => self.question(*id).map(TooltipContent::question),
                Some(Hit::Chunk(chunk)) => Some(TooltipContent::chunk(chunk)),
                _ => None,
            }
        } else {
            None
        };

        let Some(surface) = self.surface.as_mut() else {
            return HoverOutcome::default();
        };
        surface.controller.set_hover(&mut surface.scene, hover, selected);
        let ticket = content.map(|content| {
            surface
                .controller
                .show_tooltip(content, pointer.client, pointer.page)
        });
        self.hover_target = target;
        HoverOutcome { hit, ticket }
    }

    /// Pointer left the surface.
    pub fn pointer_leave(&mut self) {
        self.hover_target = None;
        let selected = self.highlight.selected;
        if let Some(surface) = self.surface.as_mut() {
            surface.controller.set_hover(&mut surface.scene, None, selected);
        }
    }

    /// Document-wide pointer tracking while a tooltip is up. Returns `true`
    /// when the tooltip was dismissed.
    pub fn track_pointer(&mut self, client_x: f64, client_y: f64) -> bool {
        self.surface
            .as_mut()
            .is_some_and(|s| s.controller.tooltip_mut().pointer_moved(client_x, client_y))
    }

    pub fn expire_tooltip(&mut self, generation: u64) -> bool {
        self.surface
            .as_mut()
            .is_some_and(|s| s.controller.tooltip_mut().expire(generation))
    }

    pub fn hide_tooltip(&mut self) -> bool {
        self.surface
            .as_mut()
            .is_some_and(|s| s.controller.tooltip_mut().hide())
    }

    /// Route a click. Questions go to `point_clicked`; chunks and empty space
    /// select their grid cell.
    pub fn click(&mut self, pointer: &PointerInfo, sink: &mut dyn OverviewSink) -> Option<Hit> {
        let hit = self.hit_at(pointer.view)?;
        match &hit {
            Hit::Question { id, .. } => match self.question(*id) {
                Some(question) => sink.point_clicked(pointer, question),
                None => tracing::warn!(id, "clicked marker has no question"),
            },
            Hit::Chunk(chunk) => {
                let cell = self.surface.as_ref().and_then(|s| {
                    let grid = s.renderer.grid()?;
                    let cell = grid.spec().cell_at(chunk.position()?)?;
                    Some((cell, grid.get(cell)))
                });
                if let Some((cell, chunks)) = cell {
                    sink.cell_clicked(cell, chunks);
                }
            }
            Hit::Cell(cell) => {
                let chunks = self
                    .surface
                    .as_ref()
                    .and_then(|s| s.renderer.grid())
                    .map(|grid| grid.get(*cell))
                    .unwrap_or(&[]);
                sink.cell_clicked(*cell, chunks);
            }
        }
        Some(hit)
    }

    /// Wheel zoom about the pointer. The highlight border is redrawn because
    /// its stroke depends on `k`.
    pub fn wheel(&mut self, delta_y: f64, view: (f64, f64)) -> Option<Transform> {
        let surface = self.surface.as_mut()?;
        let t = surface.controller.zoom_at(
            &mut surface.scene,
            Transform::wheel_factor(delta_y),
            view.0,
            view.1,
        );
        self.redraw_highlight();
        Some(t)
    }

    /// Zoom by a factor about the surface centre.
    pub fn zoom_by(&mut self, factor: f64) -> Option<Transform> {
        let surface = self.surface.as_mut()?;
        let k = surface.controller.transform().k * factor;
        let t = surface.controller.zoom_to(&mut surface.scene, k);
        self.redraw_highlight();
        Some(t)
    }

    pub fn pan(&mut self, dx: f64, dy: f64) -> Option<Transform> {
        let surface = self.surface.as_mut()?;
        Some(surface.controller.pan(&mut surface.scene, dx, dy))
    }

    pub fn reset_view(&mut self) -> Option<Transform> {
        let surface = self.surface.as_mut()?;
        let t = surface.controller.reset_transform(&mut surface.scene);
        self.redraw_highlight();
        Some(t)
    }

    // --- deferred work ---

    pub fn has_deferred(&self) -> bool {
        !self.deferred.is_empty()
    }

    /// Run queued post-render work. The host calls this on a later tick than
    /// the render that queued it.
    pub fn run_deferred(&mut self, sink: &mut dyn OverviewSink) -> usize {
        let mut ran = 0;
        while let Some(job) = self.deferred.pop_front() {
            match job {
                Deferred::ReplayClick(id) => match self.question(id) {
                    Some(question) => {
                        sink.point_clicked(&PointerInfo::synthetic(), question);
                        ran += 1;
                    }
                    None => tracing::warn!(id, "selected question vanished before replay"),
                },
            }
        }
        ran
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::LayerKind;

    #[derive(Default)]
    struct RecordingSink {
        clicked: Vec<(u64, bool)>,
        cells: Vec<(String, usize)>,
        published: Vec<(String, usize)>,
    }

    impl OverviewSink for RecordingSink {
        fn point_clicked(&mut self, event: &PointerInfo, question: &Question) {
            self.clicked.push((question.id, event.synthetic));
        }

        fn cell_clicked(&mut self, cell: CellId, chunks: &[Chunk]) {
            self.cells.push((cell.to_string(), chunks.len()));
        }

        fn set_grid_chunks(&mut self, cell: CellId, chunks: &[Chunk]) {
            self.published.push((cell.to_string(), chunks.len()));
        }
    }

    fn loaded() -> Overview {
        let mut overview = Overview::new(OverviewConfig::default());
        overview.set_data(
            &[
                Question::new(1, 0.0, 0.0).with_text("first"),
                Question::new(2, 1.0, 1.0).with_text("second"),
                Question::new(3, f64::NAN, 0.0),
            ],
            &[
                Chunk::new(0.5, 0.5, "c1"),
                Chunk::new(0.51, 0.5, "c2"),
                Chunk::new(0.9, 0.1, "c3"),
            ],
        );
        overview.set_visible([1]);
        overview
    }

    fn view_of(overview: &Overview, x: f64, y: f64) -> PointerInfo {
        let mapper = overview.current_mapper().expect("mapper");
        let t = overview.transform().expect("transform");
        let (px, py) = mapper.to_pixel(crate::entity::Point::new(x, y));
        PointerInfo {
            view: t.apply(px, py),
            client: (px, py),
            page: (px, py),
            synthetic: false,
        }
    }

    #[test]
    fn entry_points_are_noops_without_surface() {
        let mut overview = loaded();
        let mut sink = RecordingSink::default();
        assert_eq!(overview.render(&mut sink), RenderOutcome::Unchanged);
        assert!(!overview.set_selected(Some(1)));
        assert!(overview.click(&PointerInfo::default(), &mut sink).is_none());
        assert!(overview.wheel(-100.0, (0.0, 0.0)).is_none());
        assert_eq!(overview.pointer_move(&PointerInfo::default()), HoverOutcome::default());
        assert!(overview.take_delta().is_none());
        assert!(sink.published.is_empty());
    }

    #[test]
    fn render_publishes_grid_and_invalid_questions_are_dropped() {
        let mut overview = loaded();
        let mut sink = RecordingSink::default();
        assert!(overview.bootstrap(Some(PixelSize::new(500.0, 500.0))));
        assert!(matches!(overview.render(&mut sink), RenderOutcome::Rebuilt { .. }));
        assert_eq!(overview.questions().len(), 2);

        let published: usize = sink.published.iter().map(|(_, n)| n).sum();
        assert_eq!(published, 3);
        assert_eq!(sink.published.len(), 2);

        sink.published.clear();
        assert_eq!(overview.render(&mut sink), RenderOutcome::Unchanged);
        assert!(sink.published.is_empty());
    }

    #[test]
    fn click_routes_questions_and_cells() {
        let mut overview = loaded();
        let mut sink = RecordingSink::default();
        overview.bootstrap(Some(PixelSize::new(500.0, 500.0)));
        overview.render(&mut sink);

        let hit = overview.click(&view_of(&overview, 1.0, 1.0), &mut sink);
        assert!(matches!(hit, Some(Hit::Question { id: 2, .. })));
        assert_eq!(sink.clicked, vec![(2, false)]);

        overview.click(&view_of(&overview, 0.5, 0.5), &mut sink);
        assert_eq!(sink.cells, vec![("cell-6-6".to_string(), 2)]);
    }

    #[test]
    fn selection_survives_rebuild_and_replays_after_render() {
        let mut overview = loaded();
        let mut sink = RecordingSink::default();
        overview.bootstrap(Some(PixelSize::new(500.0, 500.0)));
        overview.render(&mut sink);

        assert!(overview.set_selected(Some(2)));
        assert!(overview.set_active_cell(Some("cell-6-6".into())));
        assert!(!overview.has_deferred());

        overview.set_visible([1, 2]);
        overview.render(&mut sink);
        let scene = overview.scene().expect("scene");
        assert_eq!(scene.layer(LayerKind::SelectedPoint).nodes.len(), 1);
        assert_eq!(scene.layer(LayerKind::HighlightBorder).nodes.len(), 1);
        assert!(sink.clicked.is_empty(), "replay must wait for the next tick");

        assert_eq!(overview.run_deferred(&mut sink), 1);
        assert_eq!(sink.clicked, vec![(2, true)]);
        assert!(!overview.has_deferred());
    }

    #[test]
    fn hovering_a_point_shows_one_tooltip() {
        let mut overview = loaded();
        let mut sink = RecordingSink::default();
        overview.bootstrap(Some(PixelSize::new(500.0, 500.0)));
        overview.render(&mut sink);

        let first = overview.pointer_move(&view_of(&overview, 0.0, 0.0));
        let ticket = first.ticket.expect("tooltip shown");
        assert_eq!(ticket.delay_ms, 3000);
        let again = overview.pointer_move(&view_of(&overview, 0.0, 0.0));
        assert!(again.ticket.is_none(), "staying on the point keeps the tooltip");

        let second = overview.pointer_move(&view_of(&overview, 1.0, 1.0));
        assert!(second.ticket.is_some());
        let tooltip = overview.tooltip().expect("tooltip");
        assert_eq!(
            tooltip.active().map(|t| t.content.title.as_str()),
            Some("Question #2")
        );
        assert!(!overview.expire_tooltip(ticket.generation));
        assert!(overview.tooltip().is_some_and(Tooltip::is_visible));
    }

    #[test]
    fn moving_selection_clears_emphasis_on_previous_marker() {
        let mut overview = loaded();
        let mut sink = RecordingSink::default();
        overview.bootstrap(Some(PixelSize::new(500.0, 500.0)));
        overview.render(&mut sink);

        overview.set_selected(Some(2));
        overview.pointer_move(&view_of(&overview, 1.0, 1.0));
        overview.pointer_leave();
        let opacity_of_2 = |overview: &Overview| {
            let scene = overview.scene().expect("scene");
            let (kind, index) = scene
                .find_entity(2, &[LayerKind::BackgroundPoints])
                .expect("question 2 in background");
            scene.layer(kind).nodes[index].style.opacity
        };
        assert_eq!(opacity_of_2(&overview), 0.7);

        overview.set_selected(Some(1));
        assert_eq!(opacity_of_2(&overview), 0.4);
    }

    #[test]
    fn wheel_zoom_rescales_highlight_border() {
        let mut overview = loaded();
        let mut sink = RecordingSink::default();
        overview.bootstrap(Some(PixelSize::new(500.0, 500.0)));
        overview.render(&mut sink);
        overview.set_active_cell(Some("cell-0-0".into()));

        for _ in 0..50 {
            overview.wheel(-500.0, (250.0, 250.0));
        }
        let t = overview.transform().expect("transform");
        assert_eq!(t.k, 8.0);
        let scene = overview.scene().expect("scene");
        let border = &scene.layer(LayerKind::HighlightBorder).nodes[0];
        assert!((border.style.stroke_width - 3.0 / 8.0).abs() < 1e-12);
    }
}
