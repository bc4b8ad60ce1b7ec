//! Render modes and their construction from [`RenderOptions`].
//!
//! The active mode is a closed enum chosen once when the provider opens.
//! Every tile request matches on it; CPU and GPU colorizers both consume the
//! same [`SingleBand`] description.

pub mod cpu;
pub mod options;
pub mod shader;

pub use options::{BandChannel, ColorStopInput, MultiBandOptions, RenderOptions, SingleBandOptions};

use crate::color::named;
use crate::color::{ColorRamp, Rgba, unit_to_byte};
use crate::error::{Error, Result};
use crate::expression::Expression;
use crate::raster::RasterSource;
use crate::resample::is_nodata;
use crate::stats::BandDomain;

const DEFAULT_COLOR_SCALE: &str = "blackwhite";

/// Single-band colormap, optionally over a derived expression value.
#[derive(Debug, Clone, PartialEq)]
pub struct SingleBand {
    /// 0-based band colorized when there is no expression.
    pub band: usize,
    pub expression: Option<Expression>,
    pub domain: BandDomain,
    pub ramp: ColorRamp,
    /// Inclusive range of visible values.
    pub display_range: Option<BandDomain>,
    pub clamp_low: bool,
    pub clamp_high: bool,
}

impl SingleBand {
    /// 0-based bands to decode, ascending.
    #[must_use]
    pub fn read_bands(&self) -> Vec<usize> {
        match &self.expression {
            Some(expr) if !expr.bands().is_empty() => expr.bands().to_vec(),
            _ => vec![self.band],
        }
    }

    /// Color of a (possibly derived) value. Non-finite values are transparent.
    #[must_use]
    pub fn color_for(&self, value: f64) -> Rgba {
        if !value.is_finite() {
            return Rgba::TRANSPARENT;
        }
        if let Some(range) = self.display_range
            && (value < range.min || value > range.max)
        {
            return Rgba::TRANSPARENT;
        }
        if (value < self.domain.min && !self.clamp_low) || (value > self.domain.max && !self.clamp_high) {
            return Rgba::TRANSPARENT;
        }
        self.ramp.color_at(self.domain.normalize(value).clamp(0.0, 1.0))
    }
}

/// Three bands rescaled into RGB channels.
#[derive(Debug, Clone, PartialEq)]
pub struct RgbComposite {
    /// 0-based bands feeding red, green and blue.
    pub bands: [usize; 3],
    pub domains: [BandDomain; 3],
    /// Band whose zero samples make a pixel transparent.
    pub alpha_band: Option<usize>,
    /// Exact RGB triples replaced by an RGBA color.
    pub color_mapping: Vec<([u8; 3], [u8; 4])>,
}

impl RgbComposite {
    /// 0-based bands to decode: red, green, blue, then alpha if present.
    #[must_use]
    pub fn read_bands(&self) -> Vec<usize> {
        let mut bands = self.bands.to_vec();
        bands.extend(self.alpha_band);
        bands
    }

    /// Compose one pixel.
    #[must_use]
    pub fn pixel(&self, rgb: [f64; 3], alpha: Option<f64>, nodata: Option<f64>) -> [u8; 4] {
        if rgb.iter().any(|&v| is_nodata(v, nodata)) {
            return [0; 4];
        }
        let r = unit_to_byte(self.domains[0].normalize(rgb[0]));
        let g = unit_to_byte(self.domains[1].normalize(rgb[1]));
        let b = unit_to_byte(self.domains[2].normalize(rgb[2]));
        let a = if alpha == Some(0.0) { 0 } else { 255 };
        self.color_mapping
            .iter()
            .find(|(from, _)| *from == [r, g, b])
            .map_or([r, g, b, a], |(_, to)| *to)
    }
}

/// Active rendering mode.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderMode {
    SingleBand(SingleBand),
    MultiBandRgb(RgbComposite),
    /// The raster's own first three bands as red, green and blue.
    ConvertRgb(RgbComposite),
}

impl RenderMode {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            RenderMode::SingleBand(_) => "single",
            RenderMode::MultiBandRgb(_) => "multi",
            RenderMode::ConvertRgb(_) => "convert_to_rgb",
        }
    }

    /// 0-based bands each tile decodes, in the order the colorizer expects.
    #[must_use]
    pub fn read_bands(&self) -> Vec<usize> {
        match self {
            RenderMode::SingleBand(single) => single.read_bands(),
            RenderMode::MultiBandRgb(rgb) | RenderMode::ConvertRgb(rgb) => rgb.read_bands(),
        }
    }
}

/// Validated mode choice, before band domains are known.
#[derive(Debug, Clone, PartialEq)]
pub enum ModeSelection {
    Single {
        options: SingleBandOptions,
        /// 0-based.
        band: usize,
        expression: Option<Expression>,
    },
    Rgb {
        /// Channels with 0-based band indices.
        channels: [BandChannel; 3],
        convert: bool,
    },
}

/// 1-based band to 0-based, checking it against the raster.
fn band_index(band: usize, samples: usize) -> Result<usize> {
    if band == 0 {
        return Err(Error::config("band indices are numbered from 1"));
    }
    let index = band - 1;
    if index >= samples {
        return Err(Error::BandOutOfRange { band: index, samples });
    }
    Ok(index)
}

impl ModeSelection {
    /// Pick exactly one mode. With none configured, rasters with at most two
    /// samples render single-band and wider ones as an RGB composite.
    pub fn from_options(options: &RenderOptions, samples: usize) -> Result<Self> {
        let configured =
            usize::from(options.single.is_some()) + usize::from(options.multi.is_some()) + usize::from(options.convert_to_rgb);
        if configured > 1 {
            return Err(Error::config("only one of single, multi and convert_to_rgb may be set"));
        }

        if options.convert_to_rgb {
            if samples < 3 {
                return Err(Error::config(format!("convert_to_rgb needs 3 bands, raster has {samples}")));
            }
            let channels = [BandChannel::band(0), BandChannel::band(1), BandChannel::band(2)];
            return Ok(ModeSelection::Rgb { channels, convert: true });
        }

        let single = match (&options.single, &options.multi) {
            (Some(single), _) => single.clone(),
            (None, Some(multi)) => return Self::rgb(multi, samples),
            (None, None) if samples <= 2 => SingleBandOptions::default(),
            (None, None) => return Self::rgb(&MultiBandOptions::default(), samples),
        };

        let band = band_index(single.band, samples)?;
        let expression = single.expression.as_deref().map(Expression::parse).transpose()?;
        if let Some(expr) = &expression
            && let Some(&band) = expr.bands().iter().find(|&&b| b >= samples)
        {
            return Err(Error::BandOutOfRange { band, samples });
        }
        Ok(ModeSelection::Single { options: single, band, expression })
    }

    fn rgb(multi: &MultiBandOptions, samples: usize) -> Result<Self> {
        let mut channels = [multi.r, multi.g, multi.b];
        for channel in &mut channels {
            channel.band = band_index(channel.band, samples)?;
        }
        Ok(ModeSelection::Rgb { channels, convert: false })
    }

    /// 0-based bands whose domain must be resolved before building the mode.
    #[must_use]
    pub fn domain_bands(&self) -> Vec<usize> {
        let mut bands: Vec<usize> = match self {
            ModeSelection::Single { options, band, .. } => {
                if options.min.is_some() && options.max.is_some() {
                    vec![]
                } else {
                    vec![*band]
                }
            }
            ModeSelection::Rgb { channels, .. } => channels
                .iter()
                .filter(|c| c.min.is_none() || c.max.is_none())
                .map(|c| c.band)
                .collect(),
        };
        bands.sort_unstable();
        bands.dedup();
        bands
    }

    /// Build the render mode.
    ///
    /// # Arguments
    /// * `options` - Options the selection was made from
    /// * `source` - Raster being rendered
    /// * `has_alpha_channel` - Treat a 4th band as alpha in RGB modes
    /// * `domain_of` - Resolved domain of a 0-based band
    pub fn build(
        self,
        options: &RenderOptions,
        source: &RasterSource,
        has_alpha_channel: bool,
        domain_of: impl Fn(usize) -> Result<BandDomain>,
    ) -> Result<RenderMode> {
        let resolve = |band: usize, min: Option<f64>, max: Option<f64>| -> Result<BandDomain> {
            match (min, max) {
                (Some(min), Some(max)) => Ok(BandDomain::new(min, max)),
                _ => {
                    let resolved = domain_of(band)?;
                    Ok(BandDomain::new(min.unwrap_or(resolved.min), max.unwrap_or(resolved.max)))
                }
            }
        };

        match self {
            ModeSelection::Single { options: single, band, expression } => {
                let domain = resolve(band, single.min, single.max)?;
                if domain.min > domain.max {
                    return Err(Error::config(format!("min {} is above max {}", domain.min, domain.max)));
                }
                let ramp = build_ramp(&single, domain)?;
                let display_range = match single.display_range {
                    Some([lo, hi]) if lo > hi => {
                        return Err(Error::config(format!("display range [{lo}, {hi}] is inverted")));
                    }
                    Some([lo, hi]) => Some(BandDomain::new(lo, hi)),
                    None => None,
                };
                Ok(RenderMode::SingleBand(SingleBand {
                    band,
                    expression,
                    domain,
                    ramp,
                    display_range,
                    clamp_low: single.clamp_low,
                    clamp_high: single.clamp_high.unwrap_or(single.clamp_low),
                }))
            }
            ModeSelection::Rgb { channels, convert } => {
                let mut domains = [BandDomain::new(0.0, 255.0); 3];
                for (domain, channel) in domains.iter_mut().zip(&channels) {
                    *domain = resolve(channel.band, channel.min, channel.max)?;
                }
                let composite = RgbComposite {
                    bands: channels.map(|c| c.band),
                    domains,
                    alpha_band: (has_alpha_channel && source.samples_per_pixel >= 4).then_some(3),
                    color_mapping: parse_color_mapping(&options.color_mapping)?,
                };
                Ok(if convert {
                    RenderMode::ConvertRgb(composite)
                } else {
                    RenderMode::MultiBandRgb(composite)
                })
            }
        }
    }
}

fn parse_color(text: &str) -> Result<Rgba> {
    Rgba::parse(text).map_err(Error::Config)
}

fn build_ramp(single: &SingleBandOptions, domain: BandDomain) -> Result<ColorRamp> {
    let ramp = match &single.colors {
        Some(colors) if colors.is_empty() => return Err(Error::config("colors must not be empty")),
        Some(colors) if colors.iter().all(|c| matches!(c, ColorStopInput::Positioned(..))) => {
            let stops = colors
                .iter()
                .filter_map(|c| match c {
                    ColorStopInput::Positioned(value, color) => Some((*value, color)),
                    ColorStopInput::Color(_) => None,
                })
                .map(|(value, color)| Ok((value, parse_color(color)?)))
                .collect::<Result<Vec<_>>>()?;
            ColorRamp::from_values(stops, domain, single.kind, single.mode)
        }
        Some(colors) if colors.iter().all(|c| matches!(c, ColorStopInput::Color(_))) => {
            let colors = colors
                .iter()
                .filter_map(|c| match c {
                    ColorStopInput::Color(color) => Some(parse_color(color)),
                    ColorStopInput::Positioned(..) => None,
                })
                .collect::<Result<Vec<_>>>()?;
            ColorRamp::evenly(colors, single.kind, single.mode)
        }
        Some(_) => return Err(Error::config("colors must be all [value, color] pairs or all plain colors")),
        None => {
            let name = single.color_scale.as_deref().unwrap_or(DEFAULT_COLOR_SCALE);
            let stops = named::scale(name).ok_or_else(|| Error::config(format!("unknown color scale '{name}'")))?;
            ColorRamp::new(stops, single.kind, single.mode)
        }
    };
    ramp.map_err(Error::Config)
}

fn parse_color_mapping(mapping: &[(String, String)]) -> Result<Vec<([u8; 3], [u8; 4])>> {
    mapping
        .iter()
        .map(|(from, to)| {
            let [r, g, b, _] = parse_color(from)?.to_bytes();
            Ok(([r, g, b], parse_color(to)?.to_bytes()))
        })
        .collect()
}
