//! Nearest and bilinear resampling of a decoded window to the output tile size.
//!
//! Source arrays carry `buffer` extra rows and columns on every side. The
//! 0..1 parametrization used by the sampling window covers only the inner
//! (effective) rectangle, while buffer pixels stay available as neighbors.

use serde::{Deserialize, Serialize};

/// Numeric sample stored in a band array.
///
/// Tiles are rendered from `f32` planes (see
/// [`RasterDecoder`](crate::raster::RasterDecoder)); the integer and `f64`
/// impls serve callers resampling arrays in their native type.
pub trait Sample: Copy + Send + Sync + 'static {
    fn to_f64(self) -> f64;

    /// Convert back, saturating and rounding for integer types.
    fn from_f64(value: f64) -> Self;
}

macro_rules! impl_int_sample {
    ($($t:ty),*) => {$(
        impl Sample for $t {
            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_f64(value: f64) -> Self {
                if value.is_nan() {
                    return 0;
                }
                value.round().clamp(<$t>::MIN as f64, <$t>::MAX as f64) as $t
            }
        }
    )*};
}

impl_int_sample!(u8, u16, i16, u32, i32);

impl Sample for f32 {
    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Sample for f64 {
    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64(value: f64) -> Self {
        value
    }
}

/// No-data test shared by the resampler and the colorizer.
///
/// NaN is always no-data. The sentinel is narrowed to `f32` like the decoded
/// samples, so a Float64 sentinel beyond `f32` range matches the infinity it
/// decodes to. A zero or infinite sentinel matches exactly, any other sentinel
/// matches within a relative tolerance of `1e-6`.
#[inline]
#[must_use]
pub fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    if value.is_nan() {
        return true;
    }
    let Some(raw) = nodata.filter(|nd| !nd.is_nan()) else {
        return false;
    };
    if value == raw {
        return true;
    }
    let nd = f64::from(raw as f32);
    if nd == 0.0 || nd.is_infinite() {
        value == nd
    } else {
        ((value - nd) / nd).abs() < 1e-6
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResampleMethod {
    #[default]
    Nearest,
    Bilinear,
}

/// Parameters for one resampling pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResampleParams {
    pub source_width: usize,
    pub source_height: usize,
    pub target_width: usize,
    pub target_height: usize,
    /// Fractional `[x0, y0, x1, y1]` of the effective source rectangle.
    pub window: [f64; 4],
    pub method: ResampleMethod,
    pub buffer: usize,
    pub nodata: Option<f64>,
}

/// Resample `data` with `params.method`.
#[must_use]
pub fn resample<T: Sample>(data: &[T], params: &ResampleParams) -> Vec<T> {
    match params.method {
        ResampleMethod::Nearest => resample_nearest(data, params),
        ResampleMethod::Bilinear => resample_bilinear(data, params),
    }
}

#[inline]
fn effective_size(size: usize, buffer: usize) -> f64 {
    size.saturating_sub(2 * buffer).max(1) as f64
}

/// Nearest-neighbor resampling.
#[must_use]
pub fn resample_nearest<T: Sample>(data: &[T], params: &ResampleParams) -> Vec<T> {
    let ResampleParams { source_width: sw, source_height: sh, target_width: tw, target_height: th, buffer, .. } =
        *params;
    let [x0, y0, x1, y1] = params.window;
    let eff_w = effective_size(sw, buffer);
    let eff_h = effective_size(sh, buffer);
    let fill = T::from_f64(params.nodata.unwrap_or(f64::NAN));

    if sw == 0 || sh == 0 || data.len() < sw * sh {
        return vec![fill; tw * th];
    }

    // column lookups are shared by every row
    let cols: Vec<usize> = (0..tw)
        .map(|x| {
            let mapped = x0 + x as f64 / tw as f64 * (x1 - x0);
            (buffer + (eff_w * mapped).max(0.0) as usize).min(sw - 1)
        })
        .collect();

    let mut out = Vec::with_capacity(tw * th);
    for y in 0..th {
        let mapped = y0 + y as f64 / th as f64 * (y1 - y0);
        let row = (buffer + (eff_h * mapped).max(0.0) as usize).min(sh - 1);
        let src_row = &data[row * sw..(row + 1) * sw];
        out.extend(cols.iter().map(|&col| src_row[col]));
    }
    out
}

/// Bilinear resampling tolerant of no-data neighbors.
///
/// No-data neighbors drop out of the interpolation and the remaining weights
/// are renormalized. When every neighbor is no-data the output is no-data;
/// when the valid neighbors carry no weight, the first valid neighbor in
/// (top-left, top-right, bottom-left, bottom-right) order is used.
#[must_use]
pub fn resample_bilinear<T: Sample>(data: &[T], params: &ResampleParams) -> Vec<T> {
    let ResampleParams { source_width: sw, source_height: sh, target_width: tw, target_height: th, buffer, nodata, .. } =
        *params;
    let [x0, y0, x1, y1] = params.window;
    let eff_w = effective_size(sw, buffer);
    let eff_h = effective_size(sh, buffer);
    let fill = nodata.unwrap_or(f64::NAN);

    if sw == 0 || sh == 0 || data.len() < sw * sh {
        return vec![T::from_f64(fill); tw * th];
    }

    let x_taps: Vec<(usize, usize, f64)> = (0..tw)
        .map(|x| axis_taps(x, tw, x0, x1, eff_w, buffer, sw))
        .collect();

    let mut out = Vec::with_capacity(tw * th);
    for y in 0..th {
        let (yl, yh, ty) = axis_taps(y, th, y0, y1, eff_h, buffer, sh);
        for &(xl, xh, tx) in &x_taps {
            let taps = [
                (data[yl * sw + xl].to_f64(), (1.0 - tx) * (1.0 - ty)),
                (data[yl * sw + xh].to_f64(), tx * (1.0 - ty)),
                (data[yh * sw + xl].to_f64(), (1.0 - tx) * ty),
                (data[yh * sw + xh].to_f64(), tx * ty),
            ];
            out.push(T::from_f64(blend(&taps, nodata).unwrap_or(fill)));
        }
    }
    out
}

/// Low index, high index and fraction for one output coordinate.
#[inline]
fn axis_taps(i: usize, target: usize, w0: f64, w1: f64, effective: f64, buffer: usize, size: usize) -> (usize, usize, f64) {
    let mapped = w0 + i as f64 / target as f64 * (w1 - w0);
    let raw = (effective * mapped + buffer as f64).clamp(0.0, (size - 1) as f64);
    let lo = raw.floor();
    let hi = raw.ceil().min((size - 1) as f64);
    (lo as usize, hi as usize, raw - lo)
}

/// Weighted mean over valid taps, `None` when every tap is no-data.
#[inline]
pub(crate) fn blend(taps: &[(f64, f64); 4], nodata: Option<f64>) -> Option<f64> {
    let mut sum = 0.0;
    let mut weight = 0.0;
    let mut first_valid = None;
    for &(value, w) in taps {
        if is_nodata(value, nodata) {
            continue;
        }
        first_valid.get_or_insert(value);
        sum += value * w;
        weight += w;
    }
    let first = first_valid?;
    if weight <= f64::EPSILON {
        Some(first)
    } else {
        Some(sum / weight)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    fn params(sw: usize, sh: usize, tw: usize, th: usize, method: ResampleMethod) -> ResampleParams {
        ResampleParams {
            source_width: sw,
            source_height: sh,
            target_width: tw,
            target_height: th,
            window: [0.0, 0.0, 1.0, 1.0],
            method,
            buffer: 0,
            nodata: None,
        }
    }

    #[test]
    fn test_is_nodata() {
        assert!(is_nodata(f64::NAN, None));
        assert!(!is_nodata(0.0, None));
        assert!(is_nodata(0.0, Some(0.0)));
        assert!(!is_nodata(1e-12, Some(0.0)));
        assert!(is_nodata(-9999.0, Some(-9999.0)));
        assert!(is_nodata(-9999.000_01, Some(-9999.0)));
        assert!(!is_nodata(-9998.0, Some(-9999.0)));
        // Float64 extremes decode to infinities
        assert!(is_nodata(f64::NEG_INFINITY, Some(f64::MIN)));
        assert!(is_nodata(f64::from(f64::MIN as f32), Some(f64::MIN)));
        assert!(!is_nodata(f64::INFINITY, Some(f64::MIN)));
        assert!(!is_nodata(-3.0e38, Some(f64::MIN)));
        assert!(is_nodata(f64::MIN, Some(f64::MIN)));
    }

    #[test]
    fn test_constant_input_stays_constant() {
        for method in [ResampleMethod::Nearest, ResampleMethod::Bilinear] {
            let data = vec![42.5f32; 7 * 5];
            let mut p = params(7, 5, 16, 16, method);
            p.buffer = 1;
            p.window = [0.25, 0.1, 0.8, 0.9];
            let out = resample(&data, &p);
            assert_eq!(out.len(), 256);
            assert!(out.iter().all(|&v| v == 42.5), "{method:?}");
        }
    }

    #[test]
    fn test_constant_integer_input_stays_constant() {
        let data = vec![7u8; 9];
        let out = resample(&data, &params(3, 3, 10, 10, ResampleMethod::Bilinear));
        assert!(out.iter().all(|&v| v == 7));
    }

    #[test]
    fn test_identity_copy() {
        let data: Vec<f64> = (0..16).map(f64::from).collect();
        for method in [ResampleMethod::Nearest, ResampleMethod::Bilinear] {
            let out = resample(&data, &params(4, 4, 4, 4, method));
            assert_eq!(out, data, "{method:?}");
        }
    }

    #[test]
    fn test_nearest_excludes_buffer_from_parametrization() {
        // 2x2 payload inside a 1 pixel buffer of -1
        #[rustfmt::skip]
        let data = vec![
            -1.0, -1.0, -1.0, -1.0,
            -1.0,  1.0,  2.0, -1.0,
            -1.0,  3.0,  4.0, -1.0,
            -1.0, -1.0, -1.0, -1.0,
        ];
        let mut p = params(4, 4, 2, 2, ResampleMethod::Nearest);
        p.buffer = 1;
        assert_eq!(resample_nearest(&data, &p), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_nearest_sub_quadrant() {
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let mut p = params(4, 4, 2, 2, ResampleMethod::Nearest);
        p.window = [0.5, 0.5, 1.0, 1.0];
        assert_eq!(resample_nearest(&data, &p), vec![10.0, 11.0, 14.0, 15.0]);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let data = vec![0.0f64, 10.0, 20.0, 30.0];
        // 4 target columns over 2 source columns: positions 0, 0.5, 1, 1.5
        let out = resample_bilinear(&data, &params(2, 2, 4, 4, ResampleMethod::Bilinear));
        assert!(approx_eq(out[1], 5.0));
        assert!(approx_eq(out[4 + 1], 15.0)); // row 0.5, col 0.5
    }

    #[test]
    fn test_bilinear_single_nodata_neighbor_degrades_gracefully() {
        let nd = -9999.0;
        let data = vec![10.0, nd, 10.0, 10.0];
        let mut p = params(2, 2, 4, 4, ResampleMethod::Bilinear);
        p.nodata = Some(nd);
        let out = resample_bilinear(&data, &p);
        // pixel (1,1) samples all four neighbors at fraction 0.5
        let v = out[4 + 1];
        assert!(!is_nodata(v, p.nodata));
        assert!(approx_eq(v, 10.0));
    }

    #[test]
    fn test_bilinear_float64_extreme_sentinel_on_f32_samples() {
        let nd = f64::MIN;
        let data = vec![10.0f32, nd as f32, 10.0, 10.0];
        let mut p = params(2, 2, 4, 4, ResampleMethod::Bilinear);
        p.nodata = Some(nd);
        let out = resample_bilinear(&data, &p);
        // (2, 0) lands exactly on the no-data sample
        assert!(is_nodata(f64::from(out[2]), p.nodata));
        assert_eq!(out[1], 10.0);
        assert_eq!(out[4 + 1], 10.0);
        assert_eq!(out[4 + 2], 10.0);
        assert!(out.iter().all(|&v| v == 10.0 || v == f32::NEG_INFINITY), "{out:?}");
    }

    #[test]
    fn test_native_u16_matches_working_f32() {
        let native: Vec<u16> = vec![0, 1000, 65535, 40000, 0, 12, 7, 65535, 3];
        let working: Vec<f32> = native.iter().map(|&v| f32::from(v)).collect();
        let mut p = params(3, 3, 5, 5, ResampleMethod::Bilinear);
        p.nodata = Some(0.0);
        let from_native = resample_bilinear(&native, &p);
        let from_working = resample_bilinear(&working, &p);
        for (n, w) in from_native.iter().zip(&from_working) {
            // integer output rounds the same interpolated value
            assert!((f64::from(*n) - w.to_f64()).abs() <= 0.51, "{n} vs {w}");
        }
        p.method = ResampleMethod::Nearest;
        let nearest: Vec<f32> = resample(&native, &p).into_iter().map(f32::from).collect();
        assert_eq!(nearest, resample(&working, &p));
    }

    #[test]
    fn test_bilinear_all_nodata_neighbors() {
        let nd = -9999.0;
        let data = vec![nd; 4];
        let mut p = params(2, 2, 4, 4, ResampleMethod::Bilinear);
        p.nodata = Some(nd);
        let out = resample_bilinear(&data, &p);
        assert!(out.iter().all(|&v| v == nd));
    }

    #[test]
    fn test_bilinear_renormalizes_remaining_weights() {
        let nd = 0.0;
        let data = vec![nd, 8.0, nd, 4.0];
        let mut p = params(2, 2, 4, 4, ResampleMethod::Bilinear);
        p.nodata = Some(nd);
        let out = resample_bilinear(&data, &p);
        assert!(approx_eq(out[4 + 1], 6.0));
    }

    #[test]
    fn test_blend_zero_weight_uses_first_valid() {
        let taps = [(-1.0, 1.0), (5.0, 0.0), (7.0, 0.0), (-1.0, 0.0)];
        assert_eq!(blend(&taps, Some(-1.0)), Some(5.0));
        assert_eq!(blend(&[(-1.0, 0.25); 4], Some(-1.0)), None);
    }

    #[test]
    fn test_nan_treated_as_nodata() {
        let data = vec![f32::NAN, 2.0, 2.0, 2.0];
        let out = resample_bilinear(&data, &params(2, 2, 4, 4, ResampleMethod::Bilinear));
        assert!(out[4 + 1] == 2.0);
    }

    #[test]
    fn test_short_input_yields_fill() {
        let mut p = params(4, 4, 2, 2, ResampleMethod::Nearest);
        p.nodata = Some(-1.0);
        assert_eq!(resample(&[1.0f32; 3], &p), vec![-1.0; 4]);
    }

    #[test]
    fn test_integer_conversion_saturates() {
        assert_eq!(u8::from_f64(300.0), 255);
        assert_eq!(u8::from_f64(-4.0), 0);
        assert_eq!(i16::from_f64(12.6), 13);
        assert_eq!(u16::from_f64(f64::NAN), 0);
    }
}
