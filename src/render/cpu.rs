//! CPU colorizer.

use super::{RenderMode, RgbComposite, SingleBand};
use crate::resample::is_nodata;

/// Colorize resampled bands into an RGBA buffer of `pixels * 4` bytes.
///
/// `bands[i]` holds the band at position `i` of [`RenderMode::read_bands`].
/// Any no-data or NaN input makes its pixel fully transparent.
#[must_use]
pub fn colorize(mode: &RenderMode, bands: &[Vec<f32>], pixels: usize, nodata: Option<f64>) -> Vec<u8> {
    match mode {
        RenderMode::SingleBand(single) => colorize_single(single, bands, pixels, nodata),
        RenderMode::MultiBandRgb(rgb) | RenderMode::ConvertRgb(rgb) => colorize_rgb(rgb, bands, pixels, nodata),
    }
}

#[inline]
fn sample(bands: &[Vec<f32>], slot: usize, pixel: usize) -> f64 {
    bands
        .get(slot)
        .and_then(|band| band.get(pixel))
        .map_or(f64::NAN, |&v| f64::from(v))
}

fn colorize_single(single: &SingleBand, bands: &[Vec<f32>], pixels: usize, nodata: Option<f64>) -> Vec<u8> {
    let read = single.read_bands();
    let width = read.iter().copied().max().unwrap_or(0) + 1;
    let mut values = vec![f64::NAN; width.max(single.band + 1)];
    let mut out = Vec::with_capacity(pixels * 4);

    for pixel in 0..pixels {
        let mut missing = false;
        for (slot, &band) in read.iter().enumerate() {
            let v = sample(bands, slot, pixel);
            if is_nodata(v, nodata) {
                missing = true;
                break;
            }
            values[band] = v;
        }
        if missing {
            out.extend_from_slice(&[0; 4]);
            continue;
        }
        let value = match &single.expression {
            Some(expr) => expr.eval(&values),
            None => values[single.band],
        };
        out.extend_from_slice(&single.color_for(value).to_bytes());
    }
    out
}

fn colorize_rgb(rgb: &RgbComposite, bands: &[Vec<f32>], pixels: usize, nodata: Option<f64>) -> Vec<u8> {
    let mut out = Vec::with_capacity(pixels * 4);
    for pixel in 0..pixels {
        let values = [sample(bands, 0, pixel), sample(bands, 1, pixel), sample(bands, 2, pixel)];
        let alpha = rgb.alpha_band.map(|_| sample(bands, 3, pixel));
        out.extend_from_slice(&rgb.pixel(values, alpha, nodata));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::color::{ColorRamp, InterpolationMode, RampKind, Rgba};
    use crate::expression::Expression;
    use crate::stats::BandDomain;

    fn gray(expression: Option<&str>, band: usize, domain: BandDomain) -> RenderMode {
        RenderMode::SingleBand(SingleBand {
            band,
            expression: expression.map(|e| Expression::parse(e).unwrap()),
            domain,
            ramp: ColorRamp::new(
                vec![(0.0, Rgba::BLACK), (1.0, Rgba::WHITE)],
                RampKind::Continuous,
                InterpolationMode::Rgb,
            )
            .unwrap(),
            display_range: None,
            clamp_low: true,
            clamp_high: true,
        })
    }

    #[test]
    fn test_single_band_nodata_is_transparent() {
        let mode = gray(None, 0, BandDomain::new(0.0, 255.0));
        let out = colorize(&mode, &[vec![0.0, -9999.0, 255.0, f32::NAN]], 4, Some(-9999.0));
        assert_eq!(out.len(), 16);
        assert_eq!(&out[0..4], &[0, 0, 0, 255]);
        assert_eq!(out[7], 0);
        assert_eq!(&out[8..12], &[255, 255, 255, 255]);
        assert_eq!(out[15], 0);
    }

    #[test]
    fn test_expression_over_two_bands() {
        // normalized difference of bands 1 and 3 mapped over [-1, 1]
        let mode = gray(Some("(b3 - b1) / (b3 + b1)"), 0, BandDomain::new(-1.0, 1.0));
        assert_eq!(mode.read_bands(), vec![0, 2]);
        let b1 = vec![1.0, 3.0, 0.0];
        let b3 = vec![1.0, 1.0, 0.0];
        let out = colorize(&mode, &[b1, b3], 3, None);
        // (1-1)/2 = 0 is mid gray, (1-3)/4 = -0.5 is a quarter
        assert_eq!(out[0], 128);
        assert_eq!(out[4], 64);
        // 0 / 0 is NaN and renders transparent
        assert_eq!(out[11], 0);
    }

    #[test]
    fn test_any_expression_band_nodata_hides_pixel() {
        let mode = gray(Some("b1 + b2"), 0, BandDomain::new(0.0, 10.0));
        let out = colorize(&mode, &[vec![1.0], vec![-1.0]], 1, Some(-1.0));
        assert_eq!(out, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_rgb_with_alpha_band() {
        let mode = RenderMode::ConvertRgb(RgbComposite {
            bands: [0, 1, 2],
            domains: [BandDomain::new(0.0, 255.0); 3],
            alpha_band: Some(3),
            color_mapping: vec![],
        });
        let bands = [vec![10.0, 10.0], vec![20.0, 20.0], vec![30.0, 30.0], vec![255.0, 0.0]];
        let out = colorize(&mode, &bands, 2, None);
        assert_eq!(out, vec![10, 20, 30, 255, 10, 20, 30, 0]);
    }
}
