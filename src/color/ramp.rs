//! Piecewise color ramps over normalized positions.

use serde::{Deserialize, Serialize};

use super::Rgba;
use super::space::{InterpolationMode, from_space, segment_endpoints, to_space};
use crate::stats::BandDomain;

/// Largest number of stops a ramp may carry.
pub const MAX_STOPS: usize = 32;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RampKind {
    /// Interpolate between neighbouring stops.
    #[default]
    Continuous,
    /// Step function, the last stop at or below the value wins.
    Discrete,
}

/// Interval between two adjacent stops, with endpoints pre-resolved in the
/// interpolation space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub t0: f64,
    pub t1: f64,
    pub start: [f64; 4],
    pub end: [f64; 4],
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColorRamp {
    kind: RampKind,
    mode: InterpolationMode,
    positions: Vec<f64>,
    colors: Vec<Rgba>,
    segments: Vec<Segment>,
}

impl ColorRamp {
    /// Build a ramp from stops positioned in normalized `0..=1` space.
    pub fn new(mut stops: Vec<(f64, Rgba)>, kind: RampKind, mode: InterpolationMode) -> Result<Self, String> {
        if stops.is_empty() {
            return Err("color ramp needs at least one stop".into());
        }
        if stops.len() > MAX_STOPS {
            return Err(format!("color ramp has {} stops, at most {MAX_STOPS} are supported", stops.len()));
        }
        if stops.iter().any(|(t, _)| !t.is_finite()) {
            return Err("color stop positions must be finite".into());
        }
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));

        let positions: Vec<f64> = stops.iter().map(|s| s.0).collect();
        let colors: Vec<Rgba> = stops.iter().map(|s| s.1).collect();
        let segments = stops
            .windows(2)
            .map(|pair| {
                let (start, end) = segment_endpoints(
                    to_space(pair[0].1.to_array(), mode),
                    to_space(pair[1].1.to_array(), mode),
                    mode,
                );
                Segment { t0: pair[0].0, t1: pair[1].0, start, end }
            })
            .collect();

        Ok(Self { kind, mode, positions, colors, segments })
    }

    /// Build a ramp from stops given in data units.
    ///
    /// The first stop is moved down to `domain.min` when it lies above it and
    /// the last stop is repeated at `domain.max` when it lies below it.
    pub fn from_values(
        mut stops: Vec<(f64, Rgba)>,
        domain: BandDomain,
        kind: RampKind,
        mode: InterpolationMode,
    ) -> Result<Self, String> {
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(first) = stops.first_mut()
            && first.0 > domain.min
        {
            first.0 = domain.min;
        }
        if let Some(&(value, color)) = stops.last()
            && value < domain.max
        {
            stops.push((domain.max, color));
        }
        let normalized = stops.into_iter().map(|(v, c)| (domain.normalize(v), c)).collect();
        Self::new(normalized, kind, mode)
    }

    /// Build a ramp from colors spread evenly over `0..1`, each owning an
    /// equal share of the domain.
    pub fn evenly(colors: Vec<Rgba>, kind: RampKind, mode: InterpolationMode) -> Result<Self, String> {
        let step = 1.0 / colors.len().max(1) as f64;
        let stops = colors.into_iter().enumerate().map(|(i, c)| (i as f64 * step, c)).collect();
        Self::new(stops, kind, mode)
    }

    #[must_use]
    pub fn kind(&self) -> RampKind {
        self.kind
    }

    #[must_use]
    pub fn mode(&self) -> InterpolationMode {
        self.mode
    }

    #[must_use]
    pub fn positions(&self) -> &[f64] {
        &self.positions
    }

    #[must_use]
    pub fn colors(&self) -> &[Rgba] {
        &self.colors
    }

    #[must_use]
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Color at normalized position `t`.
    #[must_use]
    pub fn color_at(&self, t: f64) -> Rgba {
        match self.kind {
            RampKind::Continuous => self.continuous(t),
            RampKind::Discrete => self.discrete(t),
        }
    }

    fn continuous(&self, t: f64) -> Rgba {
        let Some(&last) = self.colors.last() else {
            return Rgba::TRANSPARENT;
        };
        let Some(index) = self.segments.iter().position(|s| t < s.t1) else {
            return last;
        };
        let seg = &self.segments[index];
        if t <= seg.t0 {
            return self.colors[index];
        }
        let span = seg.t1 - seg.t0;
        let local = if span > 0.0 { (t - seg.t0) / span } else { 0.0 };
        self.rgba_at(seg, local)
    }

    fn rgba_at(&self, seg: &Segment, local: f64) -> Rgba {
        let mut v = [0.0; 4];
        for (i, out) in v.iter_mut().enumerate() {
            *out = seg.start[i] + (seg.end[i] - seg.start[i]) * local;
        }
        let [r, g, b, a] = from_space(v, self.mode);
        Rgba::new(r, g, b, a)
    }

    fn discrete(&self, t: f64) -> Rgba {
        let index = self.positions.partition_point(|&p| p <= t);
        self.colors[index.saturating_sub(1)]
    }
}
