use serde::{Deserialize, Serialize};

pub const DEFAULT_GRID_SIZE: usize = 13;
pub const DEFAULT_DENSITY_RESOLUTION: usize = 50;
pub const DEFAULT_FALLBACK_RESOLUTION: usize = 20;
pub const DEFAULT_CONTOUR_THRESHOLDS: usize = 15;
pub const DEFAULT_CONTOUR_OPACITY: f64 = 0.2;
pub const DEFAULT_CHUNK_LIMIT: usize = 15_000;
pub const DEFAULT_MARGIN: f64 = 20.0;
pub const DEFAULT_MIN_ZOOM: f64 = 0.5;
pub const DEFAULT_MAX_ZOOM: f64 = 8.0;
pub const DEFAULT_TOOLTIP_TIMEOUT_MS: u32 = 3000;
pub const DEFAULT_TOOLTIP_DISMISS_DISTANCE: f64 = 100.0;
pub const DEFAULT_QUESTION_RADIUS: f64 = 6.0;
pub const DEFAULT_CHUNK_RADIUS: f64 = 1.0;
pub const DEFAULT_SELECTED_RADIUS: f64 = 8.0;
pub const DEFAULT_HOVER_OPACITY_BACKGROUND: f64 = 0.7;
pub const DEFAULT_HOVER_OPACITY_FOREGROUND: f64 = 0.8;

/// Upper bounds for the lattice and grid sizes; the KDE cost grows with
/// resolution² × points and runs on the UI thread.
pub const MAX_GRID_SIZE: usize = 100;
pub const MAX_DENSITY_RESOLUTION: usize = 200;
pub const MAX_CONTOUR_THRESHOLDS: usize = 64;

/// Tunables for the overview map. Every field falls back to its default when
/// absent from the JSON document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverviewConfig {
    pub grid_size: usize,
    pub density_resolution: usize,
    pub fallback_resolution: usize,
    pub contour_thresholds: usize,
    pub contour_opacity: f64,
    pub chunk_limit: usize,
    pub margin: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub tooltip_timeout_ms: u32,
    pub tooltip_dismiss_distance: f64,
    pub question_radius: f64,
    pub chunk_radius: f64,
    pub selected_radius: f64,
    pub hover_opacity_background: f64,
    pub hover_opacity_foreground: f64,
}

impl Default for OverviewConfig {
    fn default() -> Self {
        Self {
            grid_size: DEFAULT_GRID_SIZE,
            density_resolution: DEFAULT_DENSITY_RESOLUTION,
            fallback_resolution: DEFAULT_FALLBACK_RESOLUTION,
            contour_thresholds: DEFAULT_CONTOUR_THRESHOLDS,
            contour_opacity: DEFAULT_CONTOUR_OPACITY,
            chunk_limit: DEFAULT_CHUNK_LIMIT,
            margin: DEFAULT_MARGIN,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
            tooltip_timeout_ms: DEFAULT_TOOLTIP_TIMEOUT_MS,
            tooltip_dismiss_distance: DEFAULT_TOOLTIP_DISMISS_DISTANCE,
            question_radius: DEFAULT_QUESTION_RADIUS,
            chunk_radius: DEFAULT_CHUNK_RADIUS,
            selected_radius: DEFAULT_SELECTED_RADIUS,
            hover_opacity_background: DEFAULT_HOVER_OPACITY_BACKGROUND,
            hover_opacity_foreground: DEFAULT_HOVER_OPACITY_FOREGROUND,
        }
    }
}

impl OverviewConfig {
    pub fn from_json(raw: &str) -> Result<Self, String> {
        serde_json::from_str::<Self>(raw)
            .map(Self::sanitized)
            .map_err(|e| format!("config parse error: {e}"))
    }

    /// Reset or clamp values the engine cannot work with.
    pub fn sanitized(mut self) -> Self {
        if self.grid_size == 0 {
            self.grid_size = DEFAULT_GRID_SIZE;
        }
        self.grid_size = self.grid_size.min(MAX_GRID_SIZE);
        if self.density_resolution < 2 {
            self.density_resolution = DEFAULT_DENSITY_RESOLUTION;
        }
        self.density_resolution = self.density_resolution.min(MAX_DENSITY_RESOLUTION);
        if self.fallback_resolution < 2 {
            self.fallback_resolution = DEFAULT_FALLBACK_RESOLUTION;
        }
        self.fallback_resolution = self.fallback_resolution.min(MAX_DENSITY_RESOLUTION);
        if self.contour_thresholds == 0 {
            self.contour_thresholds = DEFAULT_CONTOUR_THRESHOLDS;
        }
        self.contour_thresholds = self.contour_thresholds.min(MAX_CONTOUR_THRESHOLDS);
        if self.tooltip_timeout_ms == 0 {
            self.tooltip_timeout_ms = DEFAULT_TOOLTIP_TIMEOUT_MS;
        }
        self.question_radius = positive_or(self.question_radius, DEFAULT_QUESTION_RADIUS);
        self.chunk_radius = positive_or(self.chunk_radius, DEFAULT_CHUNK_RADIUS);
        self.selected_radius = positive_or(self.selected_radius, DEFAULT_SELECTED_RADIUS);
        self.hover_opacity_background =
            unit_or(self.hover_opacity_background, DEFAULT_HOVER_OPACITY_BACKGROUND);
        self.hover_opacity_foreground =
            unit_or(self.hover_opacity_foreground, DEFAULT_HOVER_OPACITY_FOREGROUND);
        let zoom_ok = self.min_zoom.is_finite()
            && self.max_zoom.is_finite()
            && self.min_zoom > 0.0
            && self.min_zoom <= self.max_zoom;
        if !zoom_ok {
            self.min_zoom = DEFAULT_MIN_ZOOM;
            self.max_zoom = DEFAULT_MAX_ZOOM;
        }
        if !self.margin.is_finite() || self.margin < 0.0 {
            self.margin = DEFAULT_MARGIN;
        }
        if !self.tooltip_dismiss_distance.is_finite() || self.tooltip_dismiss_distance <= 0.0 {
            self.tooltip_dismiss_distance = DEFAULT_TOOLTIP_DISMISS_DISTANCE;
        }
        self.contour_opacity = unit_or(self.contour_opacity, DEFAULT_CONTOUR_OPACITY);
        self
    }
}

fn positive_or(value: f64, default: f64) -> f64 {
    if value.is_finite() && value > 0.0 { value } else { default }
}

fn unit_or(value: f64, default: f64) -> f64 {
    if value.is_finite() { value.clamp(0.0, 1.0) } else { default }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = OverviewConfig::from_json("{}").expect("config should parse");
        assert_eq!(config, OverviewConfig::default());
        assert_eq!(config.grid_size, 13);
        assert_eq!(config.chunk_limit, 15_000);
    }

    #[test]
    fn partial_document_keeps_other_defaults() {
        let config = OverviewConfig::from_json(r#"{"grid_size": 20, "max_zoom": 4.0}"#)
            .expect("config should parse");
        assert_eq!(config.grid_size, 20);
        assert_eq!(config.max_zoom, 4.0);
        assert_eq!(config.min_zoom, DEFAULT_MIN_ZOOM);
        assert_eq!(config.tooltip_timeout_ms, DEFAULT_TOOLTIP_TIMEOUT_MS);
    }

    #[test]
    fn inverted_zoom_range_is_reset() {
        let config = OverviewConfig::from_json(r#"{"min_zoom": 9.0, "max_zoom": 2.0, "grid_size": 0}"#)
            .expect("config should parse");
        assert_eq!(config.min_zoom, DEFAULT_MIN_ZOOM);
        assert_eq!(config.max_zoom, DEFAULT_MAX_ZOOM);
        assert_eq!(config.grid_size, DEFAULT_GRID_SIZE);
    }

    #[test]
    fn out_of_range_values_are_bounded() {
        let config = OverviewConfig::from_json(
            r#"{
                "density_resolution": 10000,
                "contour_thresholds": 5000,
                "grid_size": 100000,
                "tooltip_timeout_ms": 0,
                "question_radius": -4.0,
                "chunk_radius": 0.0,
                "selected_radius": -1.0,
                "hover_opacity_foreground": 3.0,
                "contour_opacity": -0.5
            }"#,
        )
        .expect("config should parse");
        assert_eq!(config.density_resolution, MAX_DENSITY_RESOLUTION);
        assert_eq!(config.contour_thresholds, MAX_CONTOUR_THRESHOLDS);
        assert_eq!(config.grid_size, MAX_GRID_SIZE);
        assert_eq!(config.tooltip_timeout_ms, DEFAULT_TOOLTIP_TIMEOUT_MS);
        assert_eq!(config.question_radius, DEFAULT_QUESTION_RADIUS);
        assert_eq!(config.chunk_radius, DEFAULT_CHUNK_RADIUS);
        assert_eq!(config.selected_radius, DEFAULT_SELECTED_RADIUS);
        assert_eq!(config.hover_opacity_foreground, 1.0);
        assert_eq!(config.contour_opacity, 0.0);
    }

    #[test]
    fn malformed_document_is_an_error() {
        let err = OverviewConfig::from_json("{ grid_size: ").unwrap_err();
        assert!(err.starts_with("config parse error"));
    }
}
