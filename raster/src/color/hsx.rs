//! Hue-based color models.
//!
//! Float-only helpers for shader code that wants to work in HSV or HSL and
//! hand the pipeline an RGB value. Hue is in degrees, `[0, 360)`; the other
//! channels are normalized.

use super::types::ColorRgb;

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ColorHsv {
    pub h: f32,
    pub s: f32,
    pub v: f32,
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ColorHsl {
    pub h: f32,
    pub s: f32,
    pub l: f32,
}

fn hue_to_rgb(h: f32, c: f32, x: f32) -> (f32, f32, f32) {
    match (h / 60.0) as u32 {
        0 => (c, x, 0.0),
        1 => (x, c, 0.0),
        2 => (0.0, c, x),
        3 => (0.0, x, c),
        4 => (x, 0.0, c),
        _ => (c, 0.0, x),
    }
}

fn rgb_to_hue(rgb: ColorRgb<f32>, max: f32, delta: f32) -> f32 {
    if delta == 0.0 {
        return 0.0;
    }

    let h = if max == rgb.r {
        ((rgb.g - rgb.b) / delta).rem_euclid(6.0)
    } else if max == rgb.g {
        (rgb.b - rgb.r) / delta + 2.0
    } else {
        (rgb.r - rgb.g) / delta + 4.0
    };

    h * 60.0
}

impl ColorHsv {
    pub fn to_rgb(self) -> ColorRgb<f32> {
        let c = self.v * self.s;
        let h = self.h.rem_euclid(360.0);
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = self.v - c;

        let (r, g, b) = hue_to_rgb(h, c, x);
        ColorRgb::new(r + m, g + m, b + m)
    }

    pub fn from_rgb(rgb: ColorRgb<f32>) -> Self {
        let max = rgb.r.max(rgb.g).max(rgb.b);
        let min = rgb.r.min(rgb.g).min(rgb.b);
        let delta = max - min;

        Self {
            h: rgb_to_hue(rgb, max, delta),
            s: if max == 0.0 { 0.0 } else { delta / max },
            v: max,
        }
    }
}

impl ColorHsl {
    pub fn to_rgb(self) -> ColorRgb<f32> {
        let c = (1.0 - (2.0 * self.l - 1.0).abs()) * self.s;
        let h = self.h.rem_euclid(360.0);
        let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
        let m = self.l - c * 0.5;

        let (r, g, b) = hue_to_rgb(h, c, x);
        ColorRgb::new(r + m, g + m, b + m)
    }

    pub fn from_rgb(rgb: ColorRgb<f32>) -> Self {
        let max = rgb.r.max(rgb.g).max(rgb.b);
        let min = rgb.r.min(rgb.g).min(rgb.b);
        let delta = max - min;
        let l = (max + min) * 0.5;

        Self {
            h: rgb_to_hue(rgb, max, delta),
            s: if delta == 0.0 {
                0.0
            } else {
                delta / (1.0 - (2.0 * l - 1.0).abs())
            },
            l,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ColorHsl, ColorHsv};
    use crate::color::ColorRgb;

    fn close(a: ColorRgb<f32>, b: ColorRgb<f32>) -> bool {
        (a.r - b.r).abs() < 1e-4 && (a.g - b.g).abs() < 1e-4 && (a.b - b.b).abs() < 1e-4
    }

    #[test]
    fn hsv_primaries() {
        let red = ColorHsv { h: 0.0, s: 1.0, v: 1.0 };
        assert!(close(red.to_rgb(), ColorRgb::new(1.0, 0.0, 0.0)));

        let green = ColorHsv { h: 120.0, s: 1.0, v: 1.0 };
        assert!(close(green.to_rgb(), ColorRgb::new(0.0, 1.0, 0.0)));

        let blue = ColorHsv { h: 240.0, s: 1.0, v: 1.0 };
        assert!(close(blue.to_rgb(), ColorRgb::new(0.0, 0.0, 1.0)));
    }

    #[test]
    fn hsv_round_trip() {
        for rgb in [
            ColorRgb::new(0.25, 0.5, 0.75),
            ColorRgb::new(1.0, 1.0, 1.0),
            ColorRgb::new(0.1, 0.9, 0.3),
        ] {
            let hsv = ColorHsv::from_rgb(rgb);
            assert!(close(hsv.to_rgb(), rgb));
        }
    }

    #[test]
    fn hsl_round_trip() {
        for rgb in [ColorRgb::new(0.25, 0.5, 0.75), ColorRgb::new(0.6, 0.2, 0.2)] {
            let hsl = ColorHsl::from_rgb(rgb);
            assert!(close(hsl.to_rgb(), rgb));
        }
    }

    #[test]
    fn grey_has_no_hue() {
        let hsv = ColorHsv::from_rgb(ColorRgb::new(0.5, 0.5, 0.5));
        assert_eq!(hsv.h, 0.0);
        assert_eq!(hsv.s, 0.0);
    }
}
