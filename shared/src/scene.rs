//! Retained, SVG-equivalent scene.
//!
//! The scene is a fixed stack of layers. Layers 1–5 live inside the pannable
//! zoom group; the two overlays sit above it with their own copy of the
//! transform so they stay topmost regardless of what the data layers do.

use std::cell::Cell;
use std::collections::BTreeSet;
use std::fmt::Write as FmtWrite;

use crate::scale::PixelSize;
use crate::transform::Transform;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LayerKind {
    Contours,
    Cells,
    Chunks,
    BackgroundPoints,
    ForegroundPoints,
    HighlightBorder,
    SelectedPoint,
}

impl LayerKind {
    /// Bottom to top.
    pub const ALL: [LayerKind; 7] = [
        LayerKind::Contours,
        LayerKind::Cells,
        LayerKind::Chunks,
        LayerKind::BackgroundPoints,
        LayerKind::ForegroundPoints,
        LayerKind::HighlightBorder,
        LayerKind::SelectedPoint,
    ];

    pub fn class(self) -> &'static str {
        match self {
            LayerKind::Contours => "contours-group",
            LayerKind::Cells => "cells-group",
            LayerKind::Chunks => "chunk-points-group",
            LayerKind::BackgroundPoints => "background-points-group",
            LayerKind::ForegroundPoints => "foreground-points-group",
            LayerKind::HighlightBorder => "top-highlight-group",
            LayerKind::SelectedPoint => "selected-point-group",
        }
    }

    /// DOM id of the layer's `<g>` element.
    pub fn dom_id(self) -> &'static str {
        match self {
            LayerKind::Contours => "layer-contours",
            LayerKind::Cells => "layer-cells",
            LayerKind::Chunks => "layer-chunks",
            LayerKind::BackgroundPoints => "layer-background",
            LayerKind::ForegroundPoints => "layer-foreground",
            LayerKind::HighlightBorder => "layer-highlight",
            LayerKind::SelectedPoint => "layer-selected",
        }
    }

    pub fn is_overlay(self) -> bool {
        matches!(self, LayerKind::HighlightBorder | LayerKind::SelectedPoint)
    }

    fn index(self) -> usize {
        self as usize
    }
}

pub const ZOOM_GROUP_ID: &str = "zoom-group";

#[derive(Debug, Clone, PartialEq)]
pub enum Shape {
    Circle { cx: f64, cy: f64, r: f64 },
    Rect { x: f64, y: f64, width: f64, height: f64, rx: f64 },
    Path { d: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Style {
    pub fill: String,
    pub opacity: f64,
    pub stroke: Option<String>,
    pub stroke_width: f64,
    pub even_odd: bool,
}

impl Style {
    pub fn filled(fill: impl Into<String>, opacity: f64) -> Self {
        Self {
            fill: fill.into(),
            opacity,
            stroke: None,
            stroke_width: 0.0,
            even_odd: false,
        }
    }

    pub fn with_stroke(mut self, stroke: impl Into<String>, width: f64) -> Self {
        self.stroke = Some(stroke.into());
        self.stroke_width = width;
        self
    }
}

/// What a node's `data-*` attribute refers to.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeTag {
    None,
    Entity(u64),
    Chunk(usize),
    Cell(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub class: &'static str,
    pub shape: Shape,
    pub style: Style,
    pub tag: NodeTag,
}

impl Node {
    pub fn new(class: &'static str, shape: Shape, style: Style) -> Self {
        Self {
            class,
            shape,
            style,
            tag: NodeTag::None,
        }
    }

    pub fn tagged(mut self, tag: NodeTag) -> Self {
        self.tag = tag;
        self
    }

    pub fn entity_id(&self) -> Option<u64> {
        match self.tag {
            NodeTag::Entity(id) => Some(id),
            _ => None,
        }
    }

    fn write_svg(&self, out: &mut String) {
        match &self.shape {
            Shape::Circle { cx, cy, r } => {
                let _ = write!(
                    out,
                    r#"<circle class="{}" cx="{}" cy="{}" r="{}""#,
                    self.class,
                    num(*cx),
                    num(*cy),
                    num(*r)
                );
            }
            Shape::Rect { x, y, width, height, rx } => {
                let _ = write!(
                    out,
                    r#"<rect class="{}" x="{}" y="{}" width="{}" height="{}""#,
                    self.class,
                    num(*x),
                    num(*y),
                    num(*width),
                    num(*height)
                );
                if *rx > 0.0 {
                    let _ = write!(out, r#" rx="{0}" ry="{0}""#, num(*rx));
                }
            }
            Shape::Path { d } => {
                let _ = write!(out, r#"<path class="{}" d="{}""#, self.class, d);
            }
        }
        match &self.tag {
            NodeTag::None => {}
            NodeTag::Entity(id) => {
                let _ = write!(out, r#" data-id="{id}""#);
            }
            NodeTag::Chunk(index) => {
                let _ = write!(out, r#" data-chunk="{index}""#);
            }
            NodeTag::Cell(cell) => {
                let _ = write!(out, r#" data-cell-id="{}""#, escape_attr(cell));
            }
        }
        let style = &self.style;
        let _ = write!(
            out,
            r#" fill="{}" opacity="{}""#,
            escape_attr(&style.fill),
            num(style.opacity)
        );
        match &style.stroke {
            Some(stroke) => {
                let _ = write!(
                    out,
                    r#" stroke="{}" stroke-width="{}""#,
                    escape_attr(stroke),
                    num(style.stroke_width)
                );
            }
            None => out.push_str(r#" stroke="none""#),
        }
        if style.even_odd {
            out.push_str(r#" fill-rule="evenodd""#);
        }
        out.push_str("/>");
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Layer {
    pub nodes: Vec<Node>,
}

/// Changes accumulated since the last `take_delta`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SceneDelta {
    /// The surface was (re)created; remount everything.
    pub full: bool,
    /// Layers whose contents changed.
    pub layers: Vec<LayerKind>,
    /// The pan/zoom transform changed.
    pub transform: bool,
}

impl SceneDelta {
    pub fn is_empty(&self) -> bool {
        !self.full && !self.transform && self.layers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scene {
    size: PixelSize,
    transform: Transform,
    layers: [Layer; 7],
    dirty: BTreeSet<LayerKind>,
    remount: bool,
    transform_dirty: bool,
}

impl Scene {
    pub fn new(size: PixelSize) -> Self {
        Self {
            size,
            transform: Transform::IDENTITY,
            layers: Default::default(),
            dirty: BTreeSet::new(),
            remount: true,
            transform_dirty: false,
        }
    }

    pub fn size(&self) -> PixelSize {
        self.size
    }

    pub fn transform(&self) -> Transform {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        if self.transform != transform {
            self.transform = transform;
            self.transform_dirty = true;
        }
    }

    pub fn layer(&self, kind: LayerKind) -> &Layer {
        &self.layers[kind.index()]
    }

    /// Atomically swap in a new layer body.
    pub fn replace_layer(&mut self, kind: LayerKind, nodes: Vec<Node>) {
        self.layers[kind.index()] = Layer { nodes };
        self.dirty.insert(kind);
    }

    pub fn clear_layer(&mut self, kind: LayerKind) {
        if !self.layers[kind.index()].nodes.is_empty() {
            self.replace_layer(kind, Vec::new());
        }
    }

    /// Mutable access to one node; marks its layer dirty.
    pub fn node_mut(&mut self, kind: LayerKind, index: usize) -> Option<&mut Node> {
        let node = self.layers[kind.index()].nodes.get_mut(index)?;
        self.dirty.insert(kind);
        Some(node)
    }

    /// Locate an entity marker in the given layers, first match wins.
    pub fn find_entity(&self, id: u64, kinds: &[LayerKind]) -> Option<(LayerKind, usize)> {
        kinds.iter().find_map(|&kind| {
            self.layer(kind)
                .nodes
                .iter()
                .position(|n| n.entity_id() == Some(id))
                .map(|index| (kind, index))
        })
    }

    pub fn take_delta(&mut self) -> SceneDelta {
        let delta = SceneDelta {
            full: self.remount,
            layers: std::mem::take(&mut self.dirty).into_iter().collect(),
            transform: self.transform_dirty,
        };
        self.remount = false;
        self.transform_dirty = false;
        delta
    }

    pub fn layer_markup(&self, kind: LayerKind) -> String {
        let nodes = &self.layer(kind).nodes;
        let mut out = String::with_capacity(nodes.len() * 96);
        for node in nodes {
            node.write_svg(&mut out);
        }
        out
    }

    fn write_layer(&self, kind: LayerKind, out: &mut String) {
        let _ = write!(out, r#"<g id="{}" class="{}""#, kind.dom_id(), kind.class());
        if kind.is_overlay() {
            let _ = write!(
                out,
                r#" pointer-events="none" transform="{}""#,
                self.transform.to_svg()
            );
        }
        out.push('>');
        out.push_str(&self.layer_markup(kind));
        out.push_str("</g>");
    }

    /// Serialize the whole surface. The `viewBox` uses logical pixels so the
    /// drawing scales with its container.
    pub fn to_svg(&self) -> String {
        let mut out = String::new();
        let _ = write!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="100%" height="100%" viewBox="0 0 {} {}" style="width:100%;height:100%;display:block">"#,
            num(self.size.width),
            num(self.size.height)
        );
        let _ = write!(
            out,
            r#"<g id="{ZOOM_GROUP_ID}" transform="{}">"#,
            self.transform.to_svg()
        );
        for kind in LayerKind::ALL.iter().filter(|k| !k.is_overlay()) {
            self.write_layer(*kind, &mut out);
        }
        out.push_str("</g>");
        for kind in LayerKind::ALL.iter().filter(|k| k.is_overlay()) {
            self.write_layer(*kind, &mut out);
        }
        out.push_str("</svg>");
        out
    }
}

/// Advisory guard around batched surface updates. A nested `run` while one is
/// in progress is refused rather than interleaved. Single-threaded only.
#[derive(Debug, Default)]
pub struct UpdateLock {
    locked: Cell<bool>,
}

impl UpdateLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_locked(&self) -> bool {
        self.locked.get()
    }

    /// Returns `false` when the update was skipped or failed.
    pub fn run(&self, update: impl FnOnce() -> Result<(), String>) -> bool {
        if self.locked.replace(true) {
            tracing::warn!("surface update already in progress, skipping");
            return false;
        }
        let result = update();
        self.locked.set(false);
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "surface update failed");
                false
            }
        }
    }
}

/// Coordinates are written with millipixel precision.
pub fn num(v: f64) -> f64 {
    let rounded = (v * 1000.0).round() / 1000.0;
    if rounded == 0.0 { 0.0 } else { rounded }
}

fn escape_attr(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            _ => out.push(ch),
        }
    }
    out
}
