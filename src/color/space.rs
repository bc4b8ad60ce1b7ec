//! Color interpolation spaces.
//!
//! Conversions follow the d3-color definitions: HSL carries NaN hue for
//! achromatic colors and Lab uses the D50 reference white with the sRGB
//! transfer curve.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterpolationMode {
    #[default]
    #[serde(rename = "rgb")]
    Rgb,
    /// HSL along the shorter hue arc.
    #[serde(rename = "hsl")]
    Hsl,
    /// HSL along the longer hue arc.
    #[serde(rename = "hslLong", alias = "hsl-long")]
    HslLong,
    #[serde(rename = "lab")]
    Lab,
}

impl InterpolationMode {
    /// Stable identifier used by the shader generator.
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            InterpolationMode::Rgb => 0,
            InterpolationMode::Hsl => 1,
            InterpolationMode::HslLong => 2,
            InterpolationMode::Lab => 3,
        }
    }
}

const XN: f64 = 0.964_22;
const YN: f64 = 1.0;
const ZN: f64 = 0.825_21;
const T0: f64 = 4.0 / 29.0;
const T1: f64 = 6.0 / 29.0;
const T2: f64 = 3.0 * T1 * T1;
const T3: f64 = T1 * T1 * T1;

/// RGB in `0..=1` to (hue degrees, saturation, lightness).
///
/// Hue is NaN for grays. Saturation is NaN for black and white.
#[must_use]
pub fn rgb_to_hsl(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let min = r.min(g).min(b);
    let max = r.max(g).max(b);
    let l = (max + min) / 2.0;
    let mut h = f64::NAN;
    let mut s = max - min;
    if s != 0.0 {
        h = if r == max {
            (g - b) / s + if g < b { 6.0 } else { 0.0 }
        } else if g == max {
            (b - r) / s + 2.0
        } else {
            (r - g) / s + 4.0
        };
        s /= if l < 0.5 { max + min } else { 2.0 - max - min };
        h *= 60.0;
    } else if !(l > 0.0 && l < 1.0) {
        s = f64::NAN;
    }
    (h, s, l)
}

/// (hue degrees, saturation, lightness) to RGB in `0..=1`.
#[must_use]
pub fn hsl_to_rgb(h: f64, s: f64, l: f64) -> (f64, f64, f64) {
    let h = h.rem_euclid(360.0);
    let s = if h.is_nan() || s.is_nan() { 0.0 } else { s };
    let m2 = l + (if l < 0.5 { l } else { 1.0 - l }) * s;
    let m1 = 2.0 * l - m2;
    let hue = |h: f64| {
        let h = if h.is_nan() { 0.0 } else { h };
        let v = if h < 60.0 {
            m1 + (m2 - m1) * h / 60.0
        } else if h < 180.0 {
            m2
        } else if h < 240.0 {
            m1 + (m2 - m1) * (240.0 - h) / 60.0
        } else {
            m1
        };
        v.clamp(0.0, 1.0)
    };
    let wrap = |h: f64| if h >= 360.0 { h - 360.0 } else if h < 0.0 { h + 360.0 } else { h };
    (hue(wrap(h + 120.0)), hue(h), hue(wrap(h - 120.0)))
}

fn srgb_to_linear(x: f64) -> f64 {
    if x <= 0.040_45 { x / 12.92 } else { ((x + 0.055) / 1.055).powf(2.4) }
}

fn linear_to_srgb(x: f64) -> f64 {
    if x <= 0.003_130_8 { 12.92 * x } else { 1.055 * x.powf(1.0 / 2.4) - 0.055 }
}

fn xyz_to_lab_f(t: f64) -> f64 {
    if t > T3 { t.cbrt() } else { t / T2 + T0 }
}

fn lab_to_xyz_f(t: f64) -> f64 {
    if t > T1 { t * t * t } else { T2 * (t - T0) }
}

/// RGB in `0..=1` to CIE Lab.
#[must_use]
pub fn rgb_to_lab(r: f64, g: f64, b: f64) -> (f64, f64, f64) {
    let r = srgb_to_linear(r);
    let g = srgb_to_linear(g);
    let b = srgb_to_linear(b);
    let y = xyz_to_lab_f((0.222_504_5 * r + 0.716_878_6 * g + 0.060_616_9 * b) / YN);
    let (x, z) = if r == g && g == b {
        (y, y)
    } else {
        (
            xyz_to_lab_f((0.436_074_7 * r + 0.385_064_9 * g + 0.143_080_4 * b) / XN),
            xyz_to_lab_f((0.013_932_2 * r + 0.097_104_5 * g + 0.714_173_3 * b) / ZN),
        )
    };
    (116.0 * y - 16.0, 500.0 * (x - y), 200.0 * (y - z))
}

/// CIE Lab to RGB in `0..=1`, clamped.
#[must_use]
pub fn lab_to_rgb(l: f64, a: f64, b: f64) -> (f64, f64, f64) {
    let y = (l + 16.0) / 116.0;
    let x = XN * lab_to_xyz_f(y + a / 500.0);
    let z = ZN * lab_to_xyz_f(y - b / 200.0);
    let y = YN * lab_to_xyz_f(y);
    let ch = |v: f64| linear_to_srgb(v).clamp(0.0, 1.0);
    (
        ch(3.133_856_1 * x - 1.616_866_7 * y - 0.490_614_6 * z),
        ch(-0.978_768_4 * x + 1.916_141_5 * y + 0.033_454_0 * z),
        ch(0.071_945_3 * x - 0.228_991_4 * y + 1.405_242_7 * z),
    )
}

/// Color in `mode`'s space as `[c0, c1, c2, alpha]`; HSL channels may be NaN.
#[must_use]
pub fn to_space(rgba: [f64; 4], mode: InterpolationMode) -> [f64; 4] {
    let [r, g, b, a] = rgba;
    match mode {
        InterpolationMode::Rgb => rgba,
        InterpolationMode::Hsl | InterpolationMode::HslLong => {
            let (h, s, l) = rgb_to_hsl(r, g, b);
            [h, s, l, a]
        }
        InterpolationMode::Lab => {
            let (l, a_, b_) = rgb_to_lab(r, g, b);
            [l, a_, b_, a]
        }
    }
}

/// Inverse of [`to_space`].
#[must_use]
pub fn from_space(v: [f64; 4], mode: InterpolationMode) -> [f64; 4] {
    match mode {
        InterpolationMode::Rgb => v,
        InterpolationMode::Hsl | InterpolationMode::HslLong => {
            let (r, g, b) = hsl_to_rgb(v[0], v[1], v[2]);
            [r, g, b, v[3]]
        }
        InterpolationMode::Lab => {
            let (r, g, b) = lab_to_rgb(v[0], v[1], v[2]);
            [r, g, b, v[3]]
        }
    }
}

/// Resolve NaN channels and hue wrap-around so that plain linear
/// interpolation between the returned endpoints matches `mode`.
#[must_use]
pub fn segment_endpoints(start: [f64; 4], end: [f64; 4], mode: InterpolationMode) -> ([f64; 4], [f64; 4]) {
    let mut a = start;
    let mut b = end;
    for i in 0..4 {
        match (a[i].is_nan(), b[i].is_nan()) {
            (true, true) => {
                a[i] = 0.0;
                b[i] = 0.0;
            }
            (true, false) => a[i] = b[i],
            (false, true) => b[i] = a[i],
            (false, false) => {}
        }
    }
    if matches!(mode, InterpolationMode::Hsl | InterpolationMode::HslLong) {
        if start[0].is_nan() && end[0].is_nan() {
            // achromatic on both ends, hue carries no information
            a[1] = 0.0;
            b[1] = 0.0;
        }
        if mode == InterpolationMode::Hsl {
            let d = b[0] - a[0];
            if !(-180.0..=180.0).contains(&d) {
                b[0] = a[0] + d - 360.0 * (d / 360.0).round();
            }
        }
    }
    (a, b)
}
