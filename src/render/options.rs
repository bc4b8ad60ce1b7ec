//! User-facing render configuration, loadable from JSON.

use serde::{Deserialize, Serialize};

use crate::color::{InterpolationMode, RampKind};
use crate::error::{Error, Result};
use crate::resample::ResampleMethod;

/// One entry of a single-band `colors` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ColorStopInput {
    /// `[value, "color"]` positioned in data units.
    Positioned(f64, String),
    /// `"color"`, spread evenly over the domain.
    Color(String),
}

/// Single-band colormap settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SingleBandOptions {
    /// 1-based band index.
    pub band: usize,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub colors: Option<Vec<ColorStopInput>>,
    /// Named scale used when `colors` is absent.
    pub color_scale: Option<String>,
    #[serde(rename = "type")]
    pub kind: RampKind,
    pub mode: InterpolationMode,
    pub expression: Option<String>,
    /// Inclusive `[low, high]` range of visible values.
    pub display_range: Option<[f64; 2]>,
    pub clamp_low: bool,
    /// Defaults to `clamp_low`.
    pub clamp_high: Option<bool>,
}

impl Default for SingleBandOptions {
    fn default() -> Self {
        Self {
            band: 1,
            min: None,
            max: None,
            colors: None,
            color_scale: None,
            kind: RampKind::Continuous,
            mode: InterpolationMode::Rgb,
            expression: None,
            display_range: None,
            clamp_low: true,
            clamp_high: None,
        }
    }
}

/// One output channel of an RGB composite.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandChannel {
    /// 1-based band index.
    pub band: usize,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl BandChannel {
    #[must_use]
    pub const fn band(band: usize) -> Self {
        Self { band, min: None, max: None }
    }
}

/// Band-to-channel assignment for RGB composition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiBandOptions {
    pub r: BandChannel,
    pub g: BandChannel,
    pub b: BandChannel,
}

impl Default for MultiBandOptions {
    fn default() -> Self {
        Self {
            r: BandChannel::band(1),
            g: BandChannel::band(2),
            b: BandChannel::band(3),
        }
    }
}

/// Render configuration. At most one of `single`, `multi` and
/// `convert_to_rgb` may be set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    /// Overrides the raster's own no-data value.
    pub nodata: Option<f64>,
    pub single: Option<SingleBandOptions>,
    pub multi: Option<MultiBandOptions>,
    pub convert_to_rgb: bool,
    pub resample_method: ResampleMethod,
    /// `[from, to]` CSS colors; pixels exactly matching `from` become `to`.
    pub color_mapping: Vec<(String, String)>,
}

impl RenderOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid render options: {e}")))
    }

    #[must_use]
    pub fn single(options: SingleBandOptions) -> Self {
        Self { single: Some(options), ..Self::default() }
    }

    #[must_use]
    pub fn multi(options: MultiBandOptions) -> Self {
        Self { multi: Some(options), ..Self::default() }
    }

    #[must_use]
    pub fn with_resample_method(mut self, method: ResampleMethod) -> Self {
        self.resample_method = method;
        self
    }
}
