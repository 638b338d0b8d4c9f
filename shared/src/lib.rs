pub mod bootstrap;
pub mod color;
pub mod config;
pub mod contour;
pub mod density;
pub mod entity;
pub mod extent;
pub mod grid;
pub mod interaction;
pub mod overview;
pub mod render;
pub mod scale;
pub mod scene;
pub mod tooltip;
pub mod transform;

pub use config::OverviewConfig;
pub use entity::*;
pub use extent::Extent;
pub use grid::{CellId, GridAssignment, GridSpec, assign_to_grid};
pub use interaction::Hit;
pub use overview::{Deferred, HighlightState, HoverOutcome, Overview, OverviewSink, PointerInfo};
pub use render::RenderOutcome;
pub use scale::{CoordinateMapper, PixelSize};
pub use scene::{LayerKind, Scene, SceneDelta, UpdateLock};
pub use tooltip::{TimerTicket, Tooltip, TooltipContent};
pub use transform::Transform;
