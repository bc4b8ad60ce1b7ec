//! Colors, CSS color strings and piecewise color ramps.

pub mod named;
pub mod ramp;
pub mod space;

pub use ramp::{ColorRamp, RampKind, Segment};
pub use space::InterpolationMode;

/// Straight-alpha color with channels in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: f64,
    pub g: f64,
    pub b: f64,
    pub a: f64,
}

impl Rgba {
    pub const TRANSPARENT: Rgba = Rgba::new(0.0, 0.0, 0.0, 0.0);
    pub const BLACK: Rgba = Rgba::new(0.0, 0.0, 0.0, 1.0);
    pub const WHITE: Rgba = Rgba::new(1.0, 1.0, 1.0, 1.0);

    #[must_use]
    pub const fn new(r: f64, g: f64, b: f64, a: f64) -> Self {
        Self { r, g, b, a }
    }

    #[must_use]
    pub fn from_bytes(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self::new(
            f64::from(r) / 255.0,
            f64::from(g) / 255.0,
            f64::from(b) / 255.0,
            f64::from(a) / 255.0,
        )
    }

    /// Channels as bytes, rounding `v * 255`.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; 4] {
        [
            unit_to_byte(self.r),
            unit_to_byte(self.g),
            unit_to_byte(self.b),
            unit_to_byte(self.a),
        ]
    }

    #[must_use]
    pub fn to_array(&self) -> [f64; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Parse a CSS color string.
    ///
    /// Accepts named colors, `transparent`, `#rgb`, `#rgba`, `#rrggbb`,
    /// `#rrggbbaa`, `rgb()`/`rgba()` and `hsl()`/`hsla()`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let text = input.trim().to_ascii_lowercase();
        if let Some(hex) = text.strip_prefix('#') {
            return parse_hex(hex).ok_or_else(|| format!("invalid hex color '{input}'"));
        }
        if let Some((name, args)) = text.split_once('(') {
            let args = args
                .strip_suffix(')')
                .ok_or_else(|| format!("unterminated color function '{input}'"))?;
            return parse_function(name.trim(), args).ok_or_else(|| format!("invalid color '{input}'"));
        }
        named::lookup(&text).ok_or_else(|| format!("unknown color name '{input}'"))
    }
}

#[inline]
#[must_use]
pub fn unit_to_byte(v: f64) -> u8 {
    if v.is_nan() {
        return 0;
    }
    (v * 255.0).round().clamp(0.0, 255.0) as u8
}

fn parse_hex(hex: &str) -> Option<Rgba> {
    let digit = |i: usize| u8::from_str_radix(hex.get(i..=i)?, 16).ok();
    let pair = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
    match hex.len() {
        3 | 4 => {
            let r = digit(0)? * 17;
            let g = digit(1)? * 17;
            let b = digit(2)? * 17;
            let a = if hex.len() == 4 { digit(3)? * 17 } else { 255 };
            Some(Rgba::from_bytes(r, g, b, a))
        }
        6 | 8 => {
            let a = if hex.len() == 8 { pair(6)? } else { 255 };
            Some(Rgba::from_bytes(pair(0)?, pair(2)?, pair(4)?, a))
        }
        _ => None,
    }
}

fn parse_function(name: &str, args: &str) -> Option<Rgba> {
    let parts: Vec<&str> = args
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let alpha = match parts.get(3) {
        Some(a) => parse_unit(a, 1.0)?,
        None => 1.0,
    };
    match name {
        "rgb" | "rgba" => Some(Rgba::new(
            parse_unit(parts[0], 255.0)?,
            parse_unit(parts[1], 255.0)?,
            parse_unit(parts[2], 255.0)?,
            alpha,
        )),
        "hsl" | "hsla" => {
            let h: f64 = parts[0].trim_end_matches("deg").parse().ok()?;
            let s = parse_unit(parts[1], 1.0)?;
            let l = parse_unit(parts[2], 1.0)?;
            let (r, g, b) = space::hsl_to_rgb(h, s, l);
            Some(Rgba::new(r, g, b, alpha))
        }
        _ => None,
    }
}

/// Parse a number or percentage into `0..=1`, dividing plain numbers by `scale`.
fn parse_unit(text: &str, scale: f64) -> Option<f64> {
    let value = if let Some(pct) = text.strip_suffix('%') {
        pct.parse::<f64>().ok()? / 100.0
    } else {
        text.parse::<f64>().ok()? / scale
    };
    Some(value.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn approx_color(a: Rgba, b: Rgba) -> bool {
        (a.r - b.r).abs() < EPS && (a.g - b.g).abs() < EPS && (a.b - b.b).abs() < EPS && (a.a - b.a).abs() < EPS
    }

    #[test]
    fn test_parse_named() {
        assert_eq!(Rgba::parse("black").unwrap(), Rgba::BLACK);
        assert_eq!(Rgba::parse(" White ").unwrap(), Rgba::WHITE);
        assert_eq!(Rgba::parse("transparent").unwrap(), Rgba::TRANSPARENT);
        assert!(Rgba::parse("notacolor").is_err());
    }

    #[test]
    fn test_parse_hex_forms() {
        assert_eq!(Rgba::parse("#f00").unwrap().to_bytes(), [255, 0, 0, 255]);
        assert_eq!(Rgba::parse("#00ff0080").unwrap().to_bytes(), [0, 255, 0, 128]);
        assert_eq!(Rgba::parse("#1a2b3c").unwrap().to_bytes(), [26, 43, 60, 255]);
        assert_eq!(Rgba::parse("#0000").unwrap().to_bytes(), [0, 0, 0, 0]);
        assert!(Rgba::parse("#12345").is_err());
        assert!(Rgba::parse("#gg0000").is_err());
    }

    #[test]
    fn test_parse_functions() {
        assert_eq!(Rgba::parse("rgb(255, 128, 0)").unwrap().to_bytes(), [255, 128, 0, 255]);
        assert_eq!(Rgba::parse("rgba(0,0,255,0.5)").unwrap().to_bytes(), [0, 0, 255, 128]);
        assert_eq!(Rgba::parse("rgb(100% 0% 0% / 25%)").unwrap().to_bytes(), [255, 0, 0, 64]);
        assert!(approx_color(Rgba::parse("hsl(120, 100%, 50%)").unwrap(), Rgba::new(0.0, 1.0, 0.0, 1.0)));
        assert!(Rgba::parse("rgb(1, 2)").is_err());
        assert!(Rgba::parse("cmyk(1, 2, 3, 4)").is_err());
        assert!(Rgba::parse("rgb(1, 2, 3").is_err());
    }

    #[test]
    fn test_to_bytes_rounds_and_clamps() {
        assert_eq!(Rgba::new(0.5, 1.2, -0.1, f64::NAN).to_bytes(), [128, 255, 0, 0]);
    }
}
