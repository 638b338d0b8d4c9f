/// Stops of the sequential blue ramp used for density contours (light to dark).
const BLUES: &[(f64, (u8, u8, u8))] = &[
    (0.000, (247, 251, 255)),
    (0.125, (222, 235, 247)),
    (0.250, (198, 219, 239)),
    (0.375, (158, 202, 225)),
    (0.500, (107, 174, 214)),
    (0.625, (66, 146, 198)),
    (0.750, (33, 113, 181)),
    (0.875, (8, 81, 156)),
    (1.000, (8, 48, 107)),
];

fn lerp_u8(a: u8, b: u8, t: f64) -> u8 {
    let t = t.clamp(0.0, 1.0);
    let value = a as f64 + (b as f64 - a as f64) * t;
    value.round().clamp(0.0, 255.0) as u8
}

pub fn blues_for_intensity(intensity: f64) -> (u8, u8, u8) {
    let intensity = if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    for window in BLUES.windows(2) {
        let (left_pos, left_color) = window[0];
        let (right_pos, right_color) = window[1];
        if intensity >= left_pos && intensity <= right_pos {
            let span = (right_pos - left_pos).max(f64::EPSILON);
            let t = (intensity - left_pos) / span;
            return (
                lerp_u8(left_color.0, right_color.0, t),
                lerp_u8(left_color.1, right_color.1, t),
                lerp_u8(left_color.2, right_color.2, t),
            );
        }
    }

    BLUES
        .last()
        .map(|(_, color)| *color)
        .unwrap_or((8, 48, 107))
}

/// Sequential scale over `[min, max]`. A flat domain maps everything to the
/// lightest stop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SequentialScale {
    min: f64,
    max: f64,
}

impl SequentialScale {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn color(&self, value: f64) -> (u8, u8, u8) {
        let span = self.max - self.min;
        if span <= 0.0 {
            return blues_for_intensity(0.0);
        }
        blues_for_intensity((value - self.min) / span)
    }
}

pub fn hex_css((r, g, b): (u8, u8, u8)) -> String {
    format!("#{r:02x}{g:02x}{b:02x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ramp_matches_edges() {
        assert_eq!(blues_for_intensity(0.0), (247, 251, 255));
        assert_eq!(blues_for_intensity(0.5), (107, 174, 214));
        assert_eq!(blues_for_intensity(1.0), (8, 48, 107));
    }

    #[test]
    fn ramp_clamps_out_of_range_and_nan() {
        assert_eq!(blues_for_intensity(-3.0), blues_for_intensity(0.0));
        assert_eq!(blues_for_intensity(7.0), blues_for_intensity(1.0));
        assert_eq!(blues_for_intensity(f64::NAN), blues_for_intensity(0.0));
    }

    #[test]
    fn ramp_darkens_monotonically() {
        let mut last = u32::MAX;
        for step in 0..=20 {
            let (r, g, b) = blues_for_intensity(step as f64 / 20.0);
            let sum = r as u32 + g as u32 + b as u32;
            assert!(sum <= last, "step {step} got brighter");
            last = sum;
        }
    }

    #[test]
    fn flat_scale_uses_lightest_stop() {
        let scale = SequentialScale::new(2.0, 2.0);
        assert_eq!(scale.color(2.0), (247, 251, 255));
    }

    #[test]
    fn css_formatting() {
        assert_eq!(hex_css((26, 115, 232)), "#1a73e8");
    }
}
