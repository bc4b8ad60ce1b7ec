//! Per-band value domains used to normalize samples before colorization.

use std::sync::{Arc, RwLock};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::raster::RasterDecoder;
use crate::resample::is_nodata;
use crate::window::PixelWindow;

/// Inclusive `[min, max]` value range of a band.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BandDomain {
    pub min: f64,
    pub max: f64,
}

impl BandDomain {
    #[must_use]
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    #[inline]
    #[must_use]
    pub fn range(&self) -> f64 {
        self.max - self.min
    }

    /// Position of `value` in the domain, 0 at `min` and 1 at `max`.
    ///
    /// A zero-width domain maps everything to 0.
    #[inline]
    #[must_use]
    pub fn normalize(&self, value: f64) -> f64 {
        let range = self.range();
        if range == 0.0 { 0.0 } else { (value - self.min) / range }
    }
}

/// Where a resolved domain came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainSource {
    Embedded,
    Declared,
    Scanned,
}

/// Memoizing resolver of band domains for one provider.
pub struct BandStatistics {
    decoder: Arc<dyn RasterDecoder>,
    declared: AHashMap<usize, BandDomain>,
    memo: RwLock<AHashMap<usize, BandDomain>>,
}

impl BandStatistics {
    /// # Arguments
    /// * `decoder` - Raster the statistics describe
    /// * `declared` - Literal domains for bands with a known value range
    #[must_use]
    pub fn new(decoder: Arc<dyn RasterDecoder>, declared: AHashMap<usize, BandDomain>) -> Self {
        Self {
            decoder,
            declared,
            memo: RwLock::new(AHashMap::new()),
        }
    }

    /// Previously resolved domain for `band`, if any.
    #[must_use]
    pub fn cached(&self, band: usize) -> Option<BandDomain> {
        let memo = self.memo.read().unwrap_or_else(|e| e.into_inner());
        memo.get(&band).copied()
    }

    /// Domain of 0-based `band`, resolving and memoizing it on first use.
    ///
    /// May decode the coarsest pyramid level, so call it off the render thread.
    pub fn get_domain(&self, band: usize) -> Result<BandDomain> {
        let samples = self.decoder.source().samples_per_pixel;
        if band >= samples {
            return Err(Error::BandOutOfRange { band, samples });
        }
        if let Some(domain) = self.cached(band) {
            return Ok(domain);
        }

        let (domain, origin) = self.resolve(band)?;
        debug!(band, min = domain.min, max = domain.max, source = ?origin, "resolved band domain");

        // racing resolvers compute the same value, last writer wins
        let mut memo = self.memo.write().unwrap_or_else(|e| e.into_inner());
        memo.insert(band, domain);
        Ok(domain)
    }

    fn resolve(&self, band: usize) -> Result<(BandDomain, DomainSource)> {
        let source = self.decoder.source();
        if let Some(domain) = source.embedded_stats(band) {
            return Ok((domain, DomainSource::Embedded));
        }
        if let Some(domain) = self.declared.get(&band) {
            return Ok((*domain, DomainSource::Declared));
        }

        let level_index = source.coarsest_level();
        let level = source
            .level(level_index)
            .ok_or_else(|| Error::config("raster has no pyramid levels"))?;
        let window = PixelWindow::new(0, 0, level.width as i64, level.height as i64);
        let fill = source.nodata.map_or(f32::NAN, |v| v as f32);
        let mut bands = self
            .decoder
            .read_window(level_index, &window, &[band], fill)
            .map_err(|source| Error::Decode { level: level_index, window, source })?;
        let values = bands.pop().unwrap_or_default();

        let domain = scan_min_max(&values, source.nodata).unwrap_or(BandDomain::new(0.0, 1.0));
        Ok((domain, DomainSource::Scanned))
    }
}

/// Min and max of `values`, skipping no-data and NaN.
#[must_use]
pub fn scan_min_max(values: &[f32], nodata: Option<f64>) -> Option<BandDomain> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for &v in values {
        let v = f64::from(v);
        if is_nodata(v, nodata) || v.is_infinite() {
            continue;
        }
        min = min.min(v);
        max = max.max(v);
    }
    (min <= max).then_some(BandDomain::new(min, max))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingBox;
    use crate::raster::ArrayRaster;
    use std::thread;

    fn raster(values: Vec<f32>) -> ArrayRaster {
        let n = values.len();
        ArrayRaster::from_band(BoundingBox::new(0.0, 0.0, 1.0, 1.0), Some(4326), n, 1, values).unwrap()
    }

    #[test]
    fn test_normalize() {
        let d = BandDomain::new(0.0, 100.0);
        assert_eq!(d.normalize(50.0), 0.5);
        assert_eq!(d.normalize(150.0), 1.5);
        assert_eq!(BandDomain::new(3.0, 3.0).normalize(3.0), 0.0);
    }

    #[test]
    fn test_scan_skips_nodata_and_nan() {
        let values = [f32::NAN, -9999.0, 3.0, 8.0, -2.0];
        assert_eq!(scan_min_max(&values, Some(-9999.0)), Some(BandDomain::new(-2.0, 8.0)));
        assert_eq!(scan_min_max(&[-9999.0], Some(-9999.0)), None);
    }

    #[test]
    fn test_embedded_stats_win() {
        let decoder = raster(vec![1.0, 2.0, 3.0]).with_band_stats(0, BandDomain::new(-5.0, 5.0));
        let mut declared = AHashMap::new();
        declared.insert(0, BandDomain::new(0.0, 255.0));
        let stats = BandStatistics::new(Arc::new(decoder), declared);
        assert_eq!(stats.get_domain(0).unwrap(), BandDomain::new(-5.0, 5.0));
    }

    #[test]
    fn test_declared_before_scan() {
        let decoder = Arc::new(raster(vec![1.0, 2.0, 3.0]));
        let mut declared = AHashMap::new();
        declared.insert(0, BandDomain::new(0.0, 255.0));
        let stats = BandStatistics::new(decoder.clone(), declared);
        assert_eq!(stats.get_domain(0).unwrap(), BandDomain::new(0.0, 255.0));
        assert_eq!(decoder.read_count(), 0);
    }

    #[test]
    fn test_scan_coarsest_level_once() {
        let decoder = Arc::new(raster(vec![4.0, -9999.0, 10.0, 7.0]).with_nodata(-9999.0).with_overviews(1));
        let stats = BandStatistics::new(decoder.clone(), AHashMap::new());
        // coarsest level keeps columns 0 and 2
        assert_eq!(stats.get_domain(0).unwrap(), BandDomain::new(4.0, 10.0));
        assert_eq!(stats.get_domain(0).unwrap(), BandDomain::new(4.0, 10.0));
        assert_eq!(decoder.read_count(), 1);
        assert_eq!(stats.cached(0), Some(BandDomain::new(4.0, 10.0)));
    }

    #[test]
    fn test_band_out_of_range() {
        let stats = BandStatistics::new(Arc::new(raster(vec![1.0])), AHashMap::new());
        match stats.get_domain(3) {
            Err(Error::BandOutOfRange { band: 3, samples: 1 }) => {}
            other => panic!("unexpected {other:?}"),
        }
        assert!(stats.cached(3).is_none());
    }

    #[test]
    fn test_all_nodata_band_falls_back_to_unit_domain() {
        let decoder = raster(vec![-1.0, -1.0]).with_nodata(-1.0);
        let stats = BandStatistics::new(Arc::new(decoder), AHashMap::new());
        assert_eq!(stats.get_domain(0).unwrap(), BandDomain::new(0.0, 1.0));
    }

    #[test]
    fn test_concurrent_resolution_is_consistent() {
        let stats = Arc::new(BandStatistics::new(Arc::new(raster(vec![2.0, 9.0, 5.0])), AHashMap::new()));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let stats = Arc::clone(&stats);
                thread::spawn(move || stats.get_domain(0).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), BandDomain::new(2.0, 9.0));
        }
    }
}
