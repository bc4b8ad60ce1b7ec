//! Per-pixel remapping of decoded windows from a non-native CRS onto a
//! geographic grid.
//!
//! Remapping is nearest-neighbor and runs before resampling: every output
//! pixel center is projected into the source CRS and the covering source
//! sample is copied. Pixels landing outside the source window stay no-data.

use crate::geometry::BoundingBox;
use crate::geometry::projection::Projection;
use crate::raster::PyramidLevel;
use crate::resample::Sample;
use crate::window::PixelWindow;

/// Points sampled along each edge when projecting a rectangle.
const EDGE_SAMPLES: usize = 8;

/// Describes one reprojection pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReprojectParams {
    pub source_width: usize,
    pub source_height: usize,
    /// Native extent of the source array, row 0 at `maxy`.
    pub source_bbox: BoundingBox,
    pub target_width: usize,
    pub target_height: usize,
    /// Geographic extent of the output grid in degrees, row 0 at `maxy`.
    pub target_bbox: BoundingBox,
    pub nodata: Option<f64>,
}

/// Remap `data` from `params.source_bbox` onto the geographic target grid.
pub fn reproject<T: Sample>(data: &[T], params: &ReprojectParams, projection: &dyn Projection) -> Vec<T> {
    let ReprojectParams { source_width: sw, source_height: sh, target_width: tw, target_height: th, .. } = *params;
    let fill = T::from_f64(params.nodata.unwrap_or(f64::NAN));
    let mut out = vec![fill; tw * th];
    if sw == 0 || sh == 0 || data.len() < sw * sh || tw == 0 || th == 0 {
        return out;
    }

    let src = params.source_bbox;
    let tgt = params.target_bbox;
    let step_x = src.width() / sw as f64;
    let step_y = src.height() / sh as f64;
    let step_lon = tgt.width() / tw as f64;
    let step_lat = tgt.height() / th as f64;

    let index_of = |x: f64, y: f64| -> Option<usize> {
        if !src.contains(x, y) {
            return None;
        }
        let ix = (((x - src.minx) / step_x) as usize).min(sw - 1);
        let iy = (((src.maxy - y) / step_y) as usize).min(sh - 1);
        Some(iy * sw + ix)
    };

    if projection.is_separable() {
        let mid_lat = (tgt.miny + tgt.maxy) / 2.0;
        let mid_lon = (tgt.minx + tgt.maxx) / 2.0;
        let xs: Vec<Option<f64>> = (0..tw)
            .map(|j| projection.to_native(tgt.minx + step_lon * (j as f64 + 0.5), mid_lat).map(|p| p.0))
            .collect();
        for i in 0..th {
            let lat = tgt.maxy - step_lat * (i as f64 + 0.5);
            let Some((_, y)) = projection.to_native(mid_lon, lat) else { continue };
            for (j, x) in xs.iter().enumerate() {
                if let Some(idx) = x.and_then(|x| index_of(x, y)) {
                    out[i * tw + j] = data[idx];
                }
            }
        }
    } else {
        for i in 0..th {
            let lat = tgt.maxy - step_lat * (i as f64 + 0.5);
            for j in 0..tw {
                let lon = tgt.minx + step_lon * (j as f64 + 0.5);
                let idx = projection.to_native(lon, lat).and_then(|(x, y)| index_of(x, y));
                if let Some(idx) = idx {
                    out[i * tw + j] = data[idx];
                }
            }
        }
    }
    out
}

/// Points along the edges of `bbox`, corners included.
fn edge_points(bbox: &BoundingBox) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(EDGE_SAMPLES * 4);
    for k in 0..=EDGE_SAMPLES {
        let t = k as f64 / EDGE_SAMPLES as f64;
        let x = bbox.minx + t * bbox.width();
        let y = bbox.miny + t * bbox.height();
        points.push((x, bbox.miny));
        points.push((x, bbox.maxy));
        points.push((bbox.minx, y));
        points.push((bbox.maxx, y));
    }
    points
}

/// Geographic extent of a native rectangle.
pub fn native_to_geographic(bbox: &BoundingBox, projection: &dyn Projection) -> Option<BoundingBox> {
    let projected: Vec<(f64, f64)> = edge_points(bbox)
        .into_iter()
        .filter_map(|(x, y)| projection.to_geographic(x, y))
        .collect();
    BoundingBox::enclosing(&projected)
}

/// Native extent of a geographic rectangle.
pub fn geographic_to_native(bbox: &BoundingBox, projection: &dyn Projection) -> Option<BoundingBox> {
    let projected: Vec<(f64, f64)> = edge_points(bbox)
        .into_iter()
        .filter_map(|(lon, lat)| projection.to_native(lon, lat))
        .collect();
    BoundingBox::enclosing(&projected)
}

/// Pixel window on `level` covering the geographic rectangle `target`,
/// grown by `pad` pixels.
pub fn source_window_for(
    target: &BoundingBox,
    projection: &dyn Projection,
    level: &PyramidLevel,
    raster_bbox: &BoundingBox,
    row_reversed: bool,
    pad: usize,
) -> Option<PixelWindow> {
    let native = geographic_to_native(target, projection)?;
    let sx = level.width as f64 / raster_bbox.width();
    let sy = level.height as f64 / raster_bbox.height();

    let x0 = ((native.minx - raster_bbox.minx) * sx).floor();
    let x1 = ((native.maxx - raster_bbox.minx) * sx).ceil();
    let (y0, y1) = if row_reversed {
        ((native.miny - raster_bbox.miny) * sy, (native.maxy - raster_bbox.miny) * sy)
    } else {
        ((raster_bbox.maxy - native.maxy) * sy, (raster_bbox.maxy - native.miny) * sy)
    };

    let clamp = |v: f64, size: usize| v.clamp(-1.0, size as f64 + 1.0) as i64;
    let window = PixelWindow::new(
        clamp(x0, level.width),
        clamp(y0.floor(), level.height),
        clamp(x1, level.width),
        clamp(y1.ceil(), level.height),
    );
    (window.width() > 0 && window.height() > 0).then(|| window.expand(pad))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::projection::{AffineProjection, Geographic};

    const EPS: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    /// Wraps a separable projection but reports it as non-separable.
    struct Opaque(AffineProjection);

    impl Projection for Opaque {
        fn to_native(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
            self.0.to_native(lon, lat)
        }

        fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
            self.0.to_geographic(x, y)
        }
    }

    #[test]
    fn test_affine_corner_roundtrip() {
        let proj = AffineProjection::new(111_320.0, 110_540.0, 500_000.0, -20_000.0);
        let target = BoundingBox::new(12.0, 41.0, 13.5, 42.25);
        for (lon, lat) in target.corners() {
            let (x, y) = proj.to_native(lon, lat).unwrap();
            let (lon2, lat2) = proj.to_geographic(x, y).unwrap();
            assert!((lon - lon2).abs() < 1e-9 && (lat - lat2).abs() < 1e-9);
        }

        let native = geographic_to_native(&target, &proj).unwrap();
        let back = native_to_geographic(&native, &proj).unwrap();
        assert!(approx_eq(back.minx, target.minx));
        assert!(approx_eq(back.miny, target.miny));
        assert!(approx_eq(back.maxx, target.maxx));
        assert!(approx_eq(back.maxy, target.maxy));
    }

    #[test]
    fn test_identity_reprojection_copies() {
        let data: Vec<f32> = (0..16).map(|v| v as f32).collect();
        let bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0);
        let params = ReprojectParams {
            source_width: 4,
            source_height: 4,
            source_bbox: bbox,
            target_width: 4,
            target_height: 4,
            target_bbox: bbox,
            nodata: Some(-1.0),
        };
        assert_eq!(reproject(&data, &params, &Geographic), data);
    }

    #[test]
    fn test_scaled_affine_reprojection() {
        // native units are ten times the geographic ones
        let proj = AffineProjection::new(10.0, 10.0, 0.0, 0.0);
        let data: Vec<f32> = (0..4).map(|v| v as f32).collect();
        let params = ReprojectParams {
            source_width: 2,
            source_height: 2,
            source_bbox: BoundingBox::new(0.0, 0.0, 20.0, 20.0),
            target_width: 4,
            target_height: 4,
            target_bbox: BoundingBox::new(0.0, 0.0, 2.0, 2.0),
            nodata: None,
        };
        let separable = reproject(&data, &params, &proj);
        #[rustfmt::skip]
        assert_eq!(separable, vec![
            0.0, 0.0, 1.0, 1.0,
            0.0, 0.0, 1.0, 1.0,
            2.0, 2.0, 3.0, 3.0,
            2.0, 2.0, 3.0, 3.0,
        ]);
        assert_eq!(reproject(&data, &params, &Opaque(proj)), separable);
    }

    #[test]
    fn test_outside_source_is_nodata() {
        let data = vec![5.0f64; 4];
        let params = ReprojectParams {
            source_width: 2,
            source_height: 2,
            source_bbox: BoundingBox::new(0.0, 0.0, 1.0, 1.0),
            target_width: 2,
            target_height: 1,
            target_bbox: BoundingBox::new(0.0, 0.0, 2.0, 1.0),
            nodata: Some(-9999.0),
        };
        assert_eq!(reproject(&data, &params, &Geographic), vec![5.0, -9999.0]);
    }

    #[test]
    fn test_source_window_for_target() {
        let proj = AffineProjection::new(10.0, 10.0, 0.0, 0.0);
        let level = PyramidLevel {
            index: 0,
            width: 100,
            height: 100,
            block_width: 100,
            block_height: 100,
            tiled: false,
        };
        let raster = BoundingBox::new(0.0, 0.0, 100.0, 100.0);
        let target = BoundingBox::new(1.0, 8.0, 2.0, 9.0);
        let window = source_window_for(&target, &proj, &level, &raster, false, 1).unwrap();
        assert_eq!(window, PixelWindow::new(9, 9, 21, 21));

        let reversed = source_window_for(&target, &proj, &level, &raster, true, 0).unwrap();
        assert_eq!(reversed, PixelWindow::new(10, 80, 20, 90));

        let outside = BoundingBox::new(50.0, 50.0, 60.0, 60.0);
        assert!(source_window_for(&outside, &proj, &level, &raster, false, 0).is_none());
    }
}
