use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use gloo_timers::callback::Timeout;
use leptos::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen::prelude::Closure;
use web_sys::{MouseEvent, PointerEvent, WheelEvent};

use ragmap_shared::scene::ZOOM_GROUP_ID;
use ragmap_shared::{
    CellId, Chunk, LayerKind, Overview, OverviewConfig, OverviewSink, PixelSize, PointerInfo,
    Question, RenderOutcome, TimerTicket, UpdateLock,
};

use crate::app::{
    Chunks, Config, CurrentGridCell, CurrentQuestion, GridChunks, Questions, VisibleIds,
};
use crate::render_loop::FrameScheduler;

const CLICK_SLOP_PX: f64 = 5.0;
const ZOOM_STEP: f64 = 1.5;
const PINCH_WHEEL_GAIN: f64 = 2.0;

const TOOLTIP_STYLE: &str = "position: fixed; display: none; pointer-events: none; z-index: 1000; \
     max-width: 320px; padding: 6px 8px; background: rgba(255,255,255,0.96); \
     border: 1px solid #ccc; border-radius: 4px; box-shadow: 0 2px 6px rgba(0,0,0,0.15); \
     font-size: 12px; line-height: 1.4;";
const CONTROL_STYLE: &str = "width: 28px; height: 28px; border: 1px solid #ccc; \
     background: #fff; border-radius: 4px; cursor: pointer;";

#[derive(Clone, Copy)]
struct Stores {
    current_question: RwSignal<Option<u64>>,
    current_cell: RwSignal<Option<String>>,
    grid_chunks: RwSignal<BTreeMap<String, Vec<Chunk>>>,
}

#[derive(Debug, PartialEq)]
enum StoreWrite {
    SelectQuestion(u64),
    SelectCell(String, Vec<Chunk>),
}

/// Engine writes collected while the engine is borrowed. Signals are only
/// touched in [`StoreBuffer::apply`], after the borrow is released.
#[derive(Debug, Default)]
struct StoreBuffer {
    writes: Vec<StoreWrite>,
    grid: Option<BTreeMap<String, Vec<Chunk>>>,
}

impl OverviewSink for StoreBuffer {
    fn point_clicked(&mut self, _event: &PointerInfo, question: &Question) {
        self.writes.push(StoreWrite::SelectQuestion(question.id));
    }

    fn cell_clicked(&mut self, cell: CellId, chunks: &[Chunk]) {
        self.writes
            .push(StoreWrite::SelectCell(cell.to_string(), chunks.to_vec()));
    }

    fn set_grid_chunks(&mut self, cell: CellId, chunks: &[Chunk]) {
        self.grid
            .get_or_insert_with(BTreeMap::new)
            .insert(cell.to_string(), chunks.to_vec());
    }
}

impl StoreBuffer {
    /// A rebuild that published nothing still replaces the grid map.
    fn rebuilt(&mut self) {
        self.grid.get_or_insert_with(BTreeMap::new);
    }

    fn apply(self, stores: Stores) {
        if let Some(grid) = self.grid {
            stores.grid_chunks.set(grid);
        }
        for write in self.writes {
            match write {
                StoreWrite::SelectQuestion(id) => stores.current_question.set(Some(id)),
                StoreWrite::SelectCell(cell, chunks) => {
                    stores.grid_chunks.update(|m| {
                        m.insert(cell.clone(), chunks);
                    });
                    stores.current_cell.set(Some(cell));
                }
            }
        }
    }
}

/// A window event listener removed again on drop.
struct WindowListener {
    window: web_sys::Window,
    event: &'static str,
    handler: Closure<dyn FnMut(web_sys::Event)>,
}

impl WindowListener {
    fn attach(event: &'static str, handler: impl FnMut(web_sys::Event) + 'static) -> Option<Self> {
        let window = web_sys::window()?;
        let handler = Closure::<dyn FnMut(web_sys::Event)>::new(handler);
        window
            .add_event_listener_with_callback(event, handler.as_ref().unchecked_ref())
            .ok()?;
        Some(Self {
            window,
            event,
            handler,
        })
    }
}

impl Drop for WindowListener {
    fn drop(&mut self) {
        let _ = self
            .window
            .remove_event_listener_with_callback(self.event, self.handler.as_ref().unchecked_ref());
    }
}

/// Map a client position into surface viewBox units.
fn to_view(client: (f64, f64), rect: (f64, f64, f64, f64), view: PixelSize) -> (f64, f64) {
    let (left, top, width, height) = rect;
    let sx = if width > 0.0 { view.width / width } else { 1.0 };
    let sy = if height > 0.0 { view.height / height } else { 1.0 };
    ((client.0 - left) * sx, (client.1 - top) * sy)
}

/// Page anchor to `position: fixed` coordinates.
fn fixed_position(anchor: (f64, f64), scroll: (f64, f64)) -> (f64, f64) {
    (anchor.0 - scroll.0, anchor.1 - scroll.1)
}

fn beyond_slop(from: (f64, f64), to: (f64, f64)) -> bool {
    (to.0 - from.0).abs() >= CLICK_SLOP_PX || (to.1 - from.1).abs() >= CLICK_SLOP_PX
}

fn css_err(e: wasm_bindgen::JsValue) -> String {
    format!("style error: {e:?}")
}

struct CanvasState {
    engine: RefCell<Overview>,
    lock: UpdateLock,
    stores: Stores,
    surface_ref: NodeRef<leptos::html::Div>,
    tooltip_ref: NodeRef<leptos::html::Div>,
    scheduler: RefCell<Option<FrameScheduler>>,
    tooltip_timer: RefCell<Option<Timeout>>,
    deferred_timer: RefCell<Option<Timeout>>,
    pointer_binding: RefCell<Option<WindowListener>>,
    resize_binding: RefCell<Option<WindowListener>>,
    drag_last: Cell<Option<(f64, f64)>>,
    press: Cell<(f64, f64)>,
    dragged: Cell<bool>,
    pinch_dist: Cell<f64>,
}

impl CanvasState {
    fn with_engine<R>(&self, f: impl FnOnce(&mut Overview) -> R) -> Option<R> {
        match self.engine.try_borrow_mut() {
            Ok(mut engine) => Some(f(&mut engine)),
            Err(_) => {
                web_sys::console::warn_1(&"overview engine busy, update skipped".into());
                None
            }
        }
    }

    fn request_flush(&self) {
        if let Some(scheduler) = self.scheduler.borrow().as_ref() {
            scheduler.request();
        }
    }

    fn container_size(&self) -> Option<PixelSize> {
        let el = self.surface_ref.get_untracked()?;
        Some(PixelSize::new(
            el.client_width() as f64,
            el.client_height() as f64,
        ))
    }

    /// Client position in surface viewBox units; `None` without a surface.
    fn view_point(&self, client: (f64, f64)) -> Option<(f64, f64)> {
        let el = self.surface_ref.get_untracked()?;
        let view_size = self
            .engine
            .try_borrow()
            .ok()?
            .scene()
            .map(|scene| scene.size())?;
        let rect = el.get_bounding_client_rect();
        Some(to_view(
            client,
            (rect.left(), rect.top(), rect.width(), rect.height()),
            view_size,
        ))
    }

    fn pointer_info(&self, e: &MouseEvent) -> Option<PointerInfo> {
        let client = (e.client_x() as f64, e.client_y() as f64);
        Some(PointerInfo {
            view: self.view_point(client)?,
            client,
            page: (e.page_x() as f64, e.page_y() as f64),
            synthetic: false,
        })
    }

    /// New snapshot or config: rebuild what depends on it and redraw.
    fn load(
        self: &Rc<Self>,
        config: OverviewConfig,
        questions: &[Question],
        chunks: &[Chunk],
        visible: Vec<u64>,
    ) {
        let size = self.container_size();
        let selected = self.stores.current_question.get_untracked();
        let active = self.stores.current_cell.get_untracked();
        self.with_engine(|engine| {
            if engine.config() != &config.clone().sanitized() {
                *engine = Overview::new(config);
            }
            engine.set_data(questions, chunks);
            engine.set_visible(visible);
            if !engine.has_surface() {
                engine.bootstrap(size);
            }
            engine.set_selected(selected);
            engine.set_active_cell(active);
        });
        self.render();
    }

    /// Container resized: recreate the surface at the new size.
    fn rebootstrap(self: &Rc<Self>) {
        let size = self.container_size();
        self.with_engine(|engine| engine.bootstrap(size));
        self.tooltip_timer.borrow_mut().take();
        self.render();
    }

    fn render(self: &Rc<Self>) {
        let mut buffer = StoreBuffer::default();
        let outcome = self.with_engine(|engine| engine.render(&mut buffer));
        if let Some(RenderOutcome::Rebuilt { .. }) = outcome {
            buffer.rebuilt();
        }
        buffer.apply(self.stores);
        self.schedule_deferred();
        self.request_flush();
    }

    fn update(&self, f: impl FnOnce(&mut Overview)) {
        if self.with_engine(f).is_some() {
            self.request_flush();
        }
    }

    /// Post-render work runs on a later tick than the render that queued it.
    fn schedule_deferred(self: &Rc<Self>) {
        let pending = self
            .engine
            .try_borrow()
            .map(|engine| engine.has_deferred())
            .unwrap_or(false);
        if !pending {
            return;
        }
        let weak = Rc::downgrade(self);
        let timer = Timeout::new(0, move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let mut buffer = StoreBuffer::default();
            let ran = state.with_engine(|engine| engine.run_deferred(&mut buffer));
            if ran.unwrap_or(0) > 0 {
                buffer.apply(state.stores);
                state.request_flush();
            }
        });
        *self.deferred_timer.borrow_mut() = Some(timer);
    }

    fn schedule_tooltip_expiry(self: &Rc<Self>, ticket: TimerTicket) {
        let weak = Rc::downgrade(self);
        let timer = Timeout::new(ticket.delay_ms, move || {
            let Some(state) = weak.upgrade() else {
                return;
            };
            if state
                .with_engine(|engine| engine.expire_tooltip(ticket.generation))
                .unwrap_or(false)
            {
                state.request_flush();
            }
        });
        *self.tooltip_timer.borrow_mut() = Some(timer);

        if self.pointer_binding.borrow().is_some() {
            return;
        }
        let weak = Rc::downgrade(self);
        let binding = WindowListener::attach("mousemove", move |e: web_sys::Event| {
            let Some(state) = weak.upgrade() else {
                return;
            };
            let Some(e) = e.dyn_ref::<MouseEvent>() else {
                return;
            };
            let client = (e.client_x() as f64, e.client_y() as f64);
            if state
                .with_engine(|engine| engine.track_pointer(client.0, client.1))
                .unwrap_or(false)
            {
                state.request_flush();
            }
        });
        *self.pointer_binding.borrow_mut() = binding;
    }

    /// Write pending scene changes to the DOM. Returns `true` when the lock
    /// was held and the frame has to be retried.
    fn flush(&self) -> bool {
        let Some(surface) = self.surface_ref.get_untracked() else {
            return false;
        };
        let tooltip = self.tooltip_ref.get_untracked();
        let mut tooltip_visible = false;
        let applied = self.lock.run(|| {
            let mut engine = self
                .engine
                .try_borrow_mut()
                .map_err(|_| "overview engine busy".to_string())?;
            write_delta(&mut engine, &surface)?;
            tooltip_visible = engine.tooltip().is_some_and(|t| t.is_visible());
            match tooltip.as_ref() {
                Some(el) => write_tooltip(&engine, el),
                None => Ok(()),
            }
        });
        if !tooltip_visible {
            // Listener and timer callbacks never run inside a frame callback,
            // so dropping them here is safe.
            self.pointer_binding.borrow_mut().take();
            self.tooltip_timer.borrow_mut().take();
        }
        !applied && self.lock.is_locked()
    }
}

fn write_delta(engine: &mut Overview, surface: &web_sys::Element) -> Result<(), String> {
    let Some(delta) = engine.take_delta() else {
        surface.set_inner_html("");
        return Ok(());
    };
    let Some(scene) = engine.scene() else {
        return Ok(());
    };
    if delta.full {
        surface.set_inner_html(&scene.to_svg());
        return Ok(());
    }
    for kind in &delta.layers {
        let layer = surface
            .query_selector(&format!("#{}", kind.dom_id()))
            .map_err(|e| format!("selector error: {e:?}"))?;
        let Some(layer) = layer else {
            // Surface markup went missing; write it out whole.
            surface.set_inner_html(&scene.to_svg());
            return Ok(());
        };
        layer.set_inner_html(&scene.layer_markup(*kind));
    }
    if delta.transform {
        let transform = scene.transform().to_svg();
        let targets = [
            ZOOM_GROUP_ID,
            LayerKind::HighlightBorder.dom_id(),
            LayerKind::SelectedPoint.dom_id(),
        ];
        for id in targets {
            if let Ok(Some(el)) = surface.query_selector(&format!("#{id}")) {
                el.set_attribute("transform", &transform)
                    .map_err(|e| format!("attribute error: {e:?}"))?;
            }
        }
    }
    Ok(())
}

fn write_tooltip(engine: &Overview, el: &web_sys::HtmlDivElement) -> Result<(), String> {
    let style = web_sys::HtmlElement::style(el);
    let Some(active) = engine.tooltip().and_then(|t| t.active()) else {
        return style.set_property("display", "none").map_err(css_err);
    };
    let scroll = web_sys::window()
        .map(|w| (w.scroll_x().unwrap_or(0.0), w.scroll_y().unwrap_or(0.0)))
        .unwrap_or((0.0, 0.0));
    let (left, top) = fixed_position(active.anchor, scroll);
    el.set_inner_html(&active.content.to_html());
    style
        .set_property("left", &format!("{left}px"))
        .map_err(css_err)?;
    style
        .set_property("top", &format!("{top}px"))
        .map_err(css_err)?;
    style.set_property("display", "block").map_err(css_err)
}

/// The embedding overview: density contours, chunk cloud, question markers,
/// with pan/zoom, hover tooltips and click selection.
#[component]
pub fn OverviewCanvas() -> impl IntoView {
    let Questions(questions) = expect_context();
    let Chunks(chunks) = expect_context();
    let Config(config) = expect_context();
    let VisibleIds(visible) = expect_context();
    let CurrentQuestion(current_question) = expect_context();
    let CurrentGridCell(current_cell) = expect_context();
    let GridChunks(grid_chunks) = expect_context();

    let surface_ref = NodeRef::<leptos::html::Div>::new();
    let tooltip_ref = NodeRef::<leptos::html::Div>::new();

    let state = Rc::new(CanvasState {
        engine: RefCell::new(Overview::new(config.get_untracked())),
        lock: UpdateLock::new(),
        stores: Stores {
            current_question,
            current_cell,
            grid_chunks,
        },
        surface_ref,
        tooltip_ref,
        scheduler: RefCell::new(None),
        tooltip_timer: RefCell::new(None),
        deferred_timer: RefCell::new(None),
        pointer_binding: RefCell::new(None),
        resize_binding: RefCell::new(None),
        drag_last: Cell::new(None),
        press: Cell::new((0.0, 0.0)),
        dragged: Cell::new(false),
        pinch_dist: Cell::new(0.0),
    });

    let weak = Rc::downgrade(&state);
    let scheduler = FrameScheduler::new(move || weak.upgrade().is_some_and(|s| s.flush()));
    *state.scheduler.borrow_mut() = Some(scheduler);

    let weak = Rc::downgrade(&state);
    *state.resize_binding.borrow_mut() = WindowListener::attach("resize", move |_| {
        if let Some(state) = weak.upgrade() {
            state.rebootstrap();
        }
    });

    // --- Store -> engine ---

    Effect::new({
        let state = state.clone();
        move || {
            let config = config.get();
            let visible_ids = visible.get_untracked();
            questions.with(|qs| {
                chunks.with(|cs| state.load(config, qs, cs, visible_ids));
            });
        }
    });

    Effect::new({
        let state = state.clone();
        move || {
            let ids = visible.get();
            state.with_engine(|engine| engine.set_visible(ids));
            state.render();
        }
    });

    Effect::new({
        let state = state.clone();
        move || {
            let id = current_question.get();
            state.update(|engine| {
                engine.set_selected(id);
            });
        }
    });

    Effect::new({
        let state = state.clone();
        move || {
            let cell = current_cell.get();
            state.update(|engine| {
                engine.set_active_cell(cell);
            });
        }
    });

    // --- Input handlers ---

    let on_wheel = {
        let state = state.clone();
        move |e: WheelEvent| {
            e.prevent_default();
            let Some(info) = state.pointer_info(&e) else {
                return;
            };
            state.update(|engine| {
                engine.wheel(e.delta_y(), info.view);
            });
        }
    };

    let on_pointer_down = {
        let state = state.clone();
        move |e: PointerEvent| {
            let client = (e.client_x() as f64, e.client_y() as f64);
            state.press.set(client);
            state.drag_last.set(Some(client));
            state.dragged.set(false);

            if let Some(target) = e.current_target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.set_pointer_capture(e.pointer_id()).ok();
                el.style().set_property("cursor", "grabbing").ok();
            }
        }
    };

    let on_pointer_move = {
        let state = state.clone();
        move |e: PointerEvent| {
            let client = (e.client_x() as f64, e.client_y() as f64);
            if let Some(last) = state.drag_last.get() {
                if beyond_slop(state.press.get(), client) {
                    state.dragged.set(true);
                }
                if state.dragged.get()
                    && let (Some(from), Some(to)) =
                        (state.view_point(last), state.view_point(client))
                {
                    state.drag_last.set(Some(client));
                    state.update(|engine| {
                        engine.pan(to.0 - from.0, to.1 - from.1);
                    });
                }
                return;
            }

            let Some(info) = state.pointer_info(&e) else {
                return;
            };
            let outcome = state.with_engine(|engine| engine.pointer_move(&info));
            if let Some(ticket) = outcome.and_then(|o| o.ticket) {
                state.schedule_tooltip_expiry(ticket);
            }
            state.request_flush();
        }
    };

    let on_pointer_up = {
        let state = state.clone();
        move |e: PointerEvent| {
            state.drag_last.set(None);
            if let Some(target) = e.current_target()
                && let Ok(el) = target.dyn_into::<web_sys::HtmlElement>()
            {
                el.style().set_property("cursor", "grab").ok();
            }
        }
    };

    let on_pointer_leave = {
        let state = state.clone();
        move |_: PointerEvent| {
            state.drag_last.set(None);
            state.update(Overview::pointer_leave);
        }
    };

    let on_click = {
        let state = state.clone();
        move |e: MouseEvent| {
            if state.dragged.replace(false) {
                return;
            }
            let Some(info) = state.pointer_info(&e) else {
                return;
            };
            let mut buffer = StoreBuffer::default();
            state.with_engine(|engine| engine.click(&info, &mut buffer));
            buffer.apply(state.stores);
            state.request_flush();
        }
    };

    let on_touch_start = {
        let state = state.clone();
        move |e: web_sys::TouchEvent| {
            let touches = e.touches();
            if touches.length() == 2 {
                e.prevent_default();
                let (Some(t0), Some(t1)) = (touches.get(0), touches.get(1)) else {
                    return;
                };
                let dx = (t1.client_x() - t0.client_x()) as f64;
                let dy = (t1.client_y() - t0.client_y()) as f64;
                state.pinch_dist.set((dx * dx + dy * dy).sqrt());
            }
        }
    };

    let on_touch_move = {
        let state = state.clone();
        move |e: web_sys::TouchEvent| {
            let touches = e.touches();
            if touches.length() != 2 {
                return;
            }
            e.prevent_default();
            let (Some(t0), Some(t1)) = (touches.get(0), touches.get(1)) else {
                return;
            };
            let dx = (t1.client_x() - t0.client_x()) as f64;
            let dy = (t1.client_y() - t0.client_y()) as f64;
            let new_dist = (dx * dx + dy * dy).sqrt();
            let old_dist = state.pinch_dist.replace(new_dist);
            if old_dist <= 0.0 {
                return;
            }
            let mid = (
                (t0.client_x() + t1.client_x()) as f64 / 2.0,
                (t0.client_y() + t1.client_y()) as f64 / 2.0,
            );
            let Some(view) = state.view_point(mid) else {
                return;
            };
            let delta = -(new_dist - old_dist) * PINCH_WHEEL_GAIN;
            state.update(|engine| {
                engine.wheel(delta, view);
            });
        }
    };

    let zoom_in = {
        let state = state.clone();
        move |e: MouseEvent| {
            e.stop_propagation();
            state.update(|engine| {
                engine.zoom_by(ZOOM_STEP);
            });
        }
    };
    let zoom_out = {
        let state = state.clone();
        move |e: MouseEvent| {
            e.stop_propagation();
            state.update(|engine| {
                engine.zoom_by(1.0 / ZOOM_STEP);
            });
        }
    };
    let reset = {
        let state = state.clone();
        move |e: MouseEvent| {
            e.stop_propagation();
            state.update(|engine| {
                engine.reset_view();
            });
        }
    };
    let stop = |e: PointerEvent| e.stop_propagation();

    view! {
        <div
            class="overview-canvas"
            style="position: relative; width: 100%; height: 100%; overflow: hidden; touch-action: none; cursor: grab;"
            on:wheel=on_wheel
            on:pointerdown=on_pointer_down
            on:pointermove=on_pointer_move
            on:pointerup=on_pointer_up
            on:pointerleave=on_pointer_leave
            on:click=on_click
            on:touchstart=on_touch_start
            on:touchmove=on_touch_move
        >
            <div node_ref=surface_ref style="position: absolute; inset: 0;"></div>
            <div
                class="zoom-controls"
                style="position: absolute; right: 12px; bottom: 12px; display: flex; gap: 4px;"
                on:pointerdown=stop
            >
                <button style=CONTROL_STYLE title="Zoom in" on:click=zoom_in>"+"</button>
                <button style=CONTROL_STYLE title="Zoom out" on:click=zoom_out>"−"</button>
                <button style=CONTROL_STYLE title="Reset view" on:click=reset>"⟲"</button>
            </div>
        </div>
        <div node_ref=tooltip_ref class="point-tooltip" style=TOOLTIP_STYLE></div>
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_maps_into_view_units() {
        let view = PixelSize::new(800.0, 600.0);
        assert_eq!(
            to_view((110.0, 70.0), (10.0, 20.0, 800.0, 600.0), view),
            (100.0, 50.0)
        );
        // Surface shown at half size.
        assert_eq!(
            to_view((60.0, 45.0), (10.0, 20.0, 400.0, 300.0), view),
            (100.0, 50.0)
        );
        // Collapsed rect falls back to unit scale.
        assert_eq!(to_view((5.0, 5.0), (0.0, 0.0, 0.0, 0.0), view), (5.0, 5.0));
    }

    #[test]
    fn tooltip_anchor_accounts_for_scroll() {
        assert_eq!(fixed_position((210.0, 490.0), (0.0, 400.0)), (210.0, 90.0));
    }

    #[test]
    fn small_moves_stay_clicks() {
        assert!(!beyond_slop((100.0, 100.0), (104.0, 96.0)));
        assert!(beyond_slop((100.0, 100.0), (105.0, 100.0)));
        assert!(beyond_slop((100.0, 100.0), (100.0, 94.0)));
    }

    #[test]
    fn buffer_collects_sink_writes() {
        let mut buffer = StoreBuffer::default();
        let chunk = Chunk::new(0.5, 0.5, "tidal forces");
        buffer.set_grid_chunks(CellId::new(2, 3), std::slice::from_ref(&chunk));
        buffer.point_clicked(&PointerInfo::synthetic(), &Question::new(9, 0.0, 0.0));
        buffer.cell_clicked(CellId::new(2, 3), std::slice::from_ref(&chunk));

        let grid = buffer.grid.as_ref().expect("grid published");
        assert_eq!(grid.get("cell-2-3").map(Vec::len), Some(1));
        assert_eq!(
            buffer.writes,
            vec![
                StoreWrite::SelectQuestion(9),
                StoreWrite::SelectCell("cell-2-3".into(), vec![chunk]),
            ]
        );
    }

    #[test]
    fn empty_rebuild_still_replaces_grid() {
        let mut buffer = StoreBuffer::default();
        assert!(buffer.grid.is_none());
        buffer.rebuilt();
        assert_eq!(buffer.grid, Some(BTreeMap::new()));
    }
}
