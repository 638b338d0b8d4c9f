/// Pan/zoom state of the zoom group: `screen = data_px * k + (x, y)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f64,
    pub y: f64,
    pub k: f64,
}

const ZOOM_SENSITIVITY: f64 = 0.002;

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform { x: 0.0, y: 0.0, k: 1.0 };

    /// Plot pixel to viewBox coordinates.
    pub fn apply(&self, px: f64, py: f64) -> (f64, f64) {
        (px * self.k + self.x, py * self.k + self.y)
    }

    /// ViewBox coordinates to plot pixel.
    pub fn invert(&self, sx: f64, sy: f64) -> (f64, f64) {
        ((sx - self.x) / self.k, (sy - self.y) / self.k)
    }

    /// Multiplicative zoom for a wheel delta, in the browser's pixel delta mode.
    pub fn wheel_factor(delta_y: f64) -> f64 {
        (-delta_y * ZOOM_SENSITIVITY).exp()
    }

    /// Zoom by `factor` about a focus point (viewBox coordinates), keeping the
    /// point under the cursor fixed. `k` is clamped to `[min_k, max_k]`.
    pub fn zoom_at(&mut self, factor: f64, sx: f64, sy: f64, min_k: f64, max_k: f64) {
        if !factor.is_finite() || factor <= 0.0 {
            return;
        }
        self.scale_to(self.k * factor, sx, sy, min_k, max_k);
    }

    /// Set `k` directly (clamped) about a focus point.
    pub fn scale_to(&mut self, k: f64, sx: f64, sy: f64, min_k: f64, max_k: f64) {
        if !k.is_finite() {
            return;
        }
        let new_k = k.clamp(min_k, max_k);
        let ratio = new_k / self.k;
        self.x = sx - (sx - self.x) * ratio;
        self.y = sy - (sy - self.y) * ratio;
        self.k = new_k;
    }

    /// Pan by a viewBox-space delta.
    pub fn pan(&mut self, dx: f64, dy: f64) {
        if dx.is_finite() && dy.is_finite() {
            self.x += dx;
            self.y += dy;
        }
    }

    pub fn to_svg(&self) -> String {
        format!(
            "translate({},{}) scale({})",
            crate::scene::num(self.x),
            crate::scene::num(self.y),
            crate::scene::num(self.k)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: f64, expected: f64) {
        let diff = (actual - expected).abs();
        assert!(
            diff < 1e-9,
            "expected {expected}, got {actual} (diff: {diff})"
        );
    }

    #[test]
    fn zoom_is_clamped_to_range() {
        let mut t = Transform::IDENTITY;
        t.scale_to(20.0, 0.0, 0.0, 0.5, 8.0);
        assert_close(t.k, 8.0);
        t.zoom_at(0.001, 0.0, 0.0, 0.5, 8.0);
        assert_close(t.k, 0.5);
    }

    #[test]
    fn zoom_keeps_focus_point_fixed() {
        let mut t = Transform { x: 12.0, y: -4.0, k: 1.5 };
        let focus = (300.0, 200.0);
        let before = t.invert(focus.0, focus.1);
        t.zoom_at(1.7, focus.0, focus.1, 0.5, 8.0);
        let after = t.invert(focus.0, focus.1);
        assert_close(before.0, after.0);
        assert_close(before.1, after.1);
    }

    #[test]
    fn apply_and_invert_round_trip() {
        let t = Transform { x: -30.0, y: 45.5, k: 2.25 };
        let (sx, sy) = t.apply(17.0, 99.0);
        let (px, py) = t.invert(sx, sy);
        assert_close(px, 17.0);
        assert_close(py, 99.0);
    }

    #[test]
    fn wheel_up_zooms_in() {
        assert!(Transform::wheel_factor(-100.0) > 1.0);
        assert!(Transform::wheel_factor(100.0) < 1.0);
        assert_close(Transform::wheel_factor(0.0), 1.0);
    }

    #[test]
    fn svg_attribute_format() {
        let t = Transform { x: 10.0, y: -2.5, k: 2.0 };
        assert_eq!(t.to_svg(), "translate(10,-2.5) scale(2)");
        assert_eq!(Transform::IDENTITY.to_svg(), "translate(0,0) scale(1)");
    }

    #[test]
    fn non_finite_input_is_ignored() {
        let mut t = Transform::IDENTITY;
        t.zoom_at(f64::NAN, 0.0, 0.0, 0.5, 8.0);
        t.pan(f64::INFINITY, 1.0);
        assert_eq!(t, Transform::IDENTITY);
    }
}
