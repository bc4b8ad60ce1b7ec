//! Raster metadata and the decoder collaborator boundary.
//!
//! A [`RasterDecoder`] exposes a pyramided raster as an immutable
//! [`RasterSource`] plus windowed reads returning one `Vec<f32>` per band.
//! [`ArrayRaster`] is an in-memory implementation backed by `ndarray`.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use ndarray::{Array3, s};

use crate::error::AnyResult;
use crate::geometry::BoundingBox;
use crate::stats::BandDomain;
use crate::window::PixelWindow;

const SAMPLE_FORMAT_UINT: u16 = 1;
const SAMPLE_FORMAT_INT: u16 = 2;
const SAMPLE_FORMAT_FLOAT: u16 = 3;

/// Storage type of the raster's samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleType {
    UInt8,
    UInt16,
    UInt32,
    Int8,
    Int16,
    Int32,
    Float32,
    Float64,
}

impl SampleType {
    /// Detect data type from TIFF tags
    #[must_use]
    pub fn from_tags(bits_per_sample: u16, sample_format: u16) -> Option<Self> {
        match (sample_format, bits_per_sample) {
            (SAMPLE_FORMAT_UINT, 8) => Some(SampleType::UInt8),
            (SAMPLE_FORMAT_UINT, 16) => Some(SampleType::UInt16),
            (SAMPLE_FORMAT_UINT, 32) => Some(SampleType::UInt32),
            (SAMPLE_FORMAT_INT, 8) => Some(SampleType::Int8),
            (SAMPLE_FORMAT_INT, 16) => Some(SampleType::Int16),
            (SAMPLE_FORMAT_INT, 32) => Some(SampleType::Int32),
            (SAMPLE_FORMAT_FLOAT, 32) => Some(SampleType::Float32),
            (SAMPLE_FORMAT_FLOAT, 64) => Some(SampleType::Float64),
            // Default to unsigned if sample format not specified
            (_, 8) => Some(SampleType::UInt8),
            (_, 16) => Some(SampleType::UInt16),
            (_, 32) => Some(SampleType::UInt32),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_byte(&self) -> bool {
        matches!(self, SampleType::UInt8)
    }
}

/// One resolution tier of the pyramid. Index 0 is full resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PyramidLevel {
    pub index: usize,
    pub width: usize,
    pub height: usize,
    /// Tile width, or image width for striped levels.
    pub block_width: usize,
    /// Tile height, or rows per strip for striped levels.
    pub block_height: usize,
    pub tiled: bool,
}

impl PyramidLevel {
    #[inline]
    #[must_use]
    pub fn max_dimension(&self) -> usize {
        self.width.max(self.height)
    }
}

/// Static metadata of an opened raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSource {
    /// Extent in native CRS units.
    pub bbox: BoundingBox,
    /// EPSG code of the native CRS, when the raster declares one.
    pub epsg: Option<u32>,
    /// Levels ordered from finest (0) to coarsest.
    pub levels: Vec<PyramidLevel>,
    pub samples_per_pixel: usize,
    pub sample_type: SampleType,
    /// No-data sentinel shared by every band.
    pub nodata: Option<f64>,
    /// True when pixel row 0 is the southern edge.
    pub row_reversed: bool,
    /// Embedded per-band statistics, indexed by band.
    pub band_stats: Vec<Option<BandDomain>>,
}

impl RasterSource {
    #[must_use]
    pub fn level(&self, index: usize) -> Option<&PyramidLevel> {
        self.levels.get(index)
    }

    #[must_use]
    pub fn coarsest_level(&self) -> usize {
        self.levels.len().saturating_sub(1)
    }

    #[must_use]
    pub fn embedded_stats(&self, band: usize) -> Option<BandDomain> {
        self.band_stats.get(band).copied().flatten()
    }

    /// Check structural invariants of the pyramid.
    pub fn validate(&self) -> Result<(), String> {
        if self.levels.is_empty() {
            return Err("raster has no images".into());
        }
        if self.samples_per_pixel == 0 {
            return Err("raster has no samples per pixel".into());
        }
        for pair in self.levels.windows(2) {
            if pair[1].width > pair[0].width || pair[1].height > pair[0].height {
                return Err(format!(
                    "level {} ({}x{}) is larger than level {} ({}x{})",
                    pair[1].index, pair[1].width, pair[1].height,
                    pair[0].index, pair[0].width, pair[0].height,
                ));
            }
        }
        if !(self.bbox.width() > 0.0 && self.bbox.height() > 0.0) {
            return Err(format!("degenerate bounding box {:?}", self.bbox));
        }
        Ok(())
    }
}

/// Decoder collaborator turning pixel windows into per-band sample arrays.
///
/// Decoded samples are always `f32`, whatever [`RasterSource::sample_type`]
/// says. Integer types up to 16 bits convert exactly; wider integers and
/// `f64` are rounded to the nearest `f32`, and the no-data test narrows the
/// sentinel the same way. The tile pipeline resamples and colorizes these
/// `f32` planes; the other [`Sample`](crate::resample::Sample) types are for
/// callers resampling native arrays directly.
pub trait RasterDecoder: Send + Sync {
    fn source(&self) -> &RasterSource;

    /// Read `window` of `level` for each of `bands` (0-based).
    ///
    /// The result holds one row-major `window.width() * window.height()`
    /// array per requested band, in the order requested. Pixels of the window
    /// lying outside the image are set to `fill`.
    fn read_window(
        &self,
        level: usize,
        window: &PixelWindow,
        bands: &[usize],
        fill: f32,
    ) -> AnyResult<Vec<Vec<f32>>>;
}

/// In-memory pyramid of `[band, row, col]` arrays.
pub struct ArrayRaster {
    levels: Vec<Arc<Array3<f32>>>,
    source: RasterSource,
    reads: AtomicUsize,
}

impl ArrayRaster {
    /// Single-level raster over `bbox` from a `[band, row, col]` array.
    #[must_use]
    pub fn new(bbox: BoundingBox, epsg: Option<u32>, data: Array3<f32>) -> Self {
        let (bands, height, width) = data.dim();
        let source = RasterSource {
            bbox,
            epsg,
            levels: vec![PyramidLevel {
                index: 0,
                width,
                height,
                block_width: width,
                block_height: height,
                tiled: false,
            }],
            samples_per_pixel: bands,
            sample_type: SampleType::Float32,
            nodata: None,
            row_reversed: false,
            band_stats: vec![None; bands],
        };
        Self {
            levels: vec![Arc::new(data)],
            source,
            reads: AtomicUsize::new(0),
        }
    }

    /// Single-band raster from row-major values.
    pub fn from_band(
        bbox: BoundingBox,
        epsg: Option<u32>,
        width: usize,
        height: usize,
        values: Vec<f32>,
    ) -> AnyResult<Self> {
        let data = Array3::from_shape_vec((1, height, width), values)?;
        Ok(Self::new(bbox, epsg, data))
    }

    /// Append `count` overview levels, each half the size of the previous one.
    #[must_use]
    pub fn with_overviews(mut self, count: usize) -> Self {
        for _ in 0..count {
            let Some(last) = self.levels.last() else { break };
            let (_, height, width) = last.dim();
            if width <= 1 && height <= 1 {
                break;
            }
            let next = last.slice(s![.., ..;2, ..;2]).to_owned();
            let (_, h, w) = next.dim();
            self.source.levels.push(PyramidLevel {
                index: self.levels.len(),
                width: w,
                height: h,
                block_width: w,
                block_height: h,
                tiled: false,
            });
            self.levels.push(Arc::new(next));
        }
        self
    }

    #[must_use]
    pub fn with_nodata(mut self, nodata: f64) -> Self {
        self.source.nodata = Some(nodata);
        self
    }

    #[must_use]
    pub fn with_sample_type(mut self, sample_type: SampleType) -> Self {
        self.source.sample_type = sample_type;
        self
    }

    #[must_use]
    pub fn with_band_stats(mut self, band: usize, domain: BandDomain) -> Self {
        if let Some(slot) = self.source.band_stats.get_mut(band) {
            *slot = Some(domain);
        }
        self
    }

    /// Mark row 0 as the southern edge.
    #[must_use]
    pub fn row_reversed(mut self, reversed: bool) -> Self {
        self.source.row_reversed = reversed;
        self
    }

    /// Number of `read_window` calls served so far.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::Relaxed)
    }
}

impl RasterDecoder for ArrayRaster {
    fn source(&self) -> &RasterSource {
        &self.source
    }

    fn read_window(
        &self,
        level: usize,
        window: &PixelWindow,
        bands: &[usize],
        fill: f32,
    ) -> AnyResult<Vec<Vec<f32>>> {
        self.reads.fetch_add(1, Ordering::Relaxed);
        let data = self
            .levels
            .get(level)
            .ok_or_else(|| format!("level {level} does not exist"))?;
        let (band_count, height, width) = data.dim();
        let out_w = window.width();
        let out_h = window.height();

        let mut out = Vec::with_capacity(bands.len());
        for &band in bands {
            if band >= band_count {
                return Err(format!("band {band} out of range ({band_count} bands)").into());
            }
            let mut values = vec![fill; out_w * out_h];
            for row in 0..out_h {
                let src_y = window.y0 + row as i64;
                if src_y < 0 || src_y >= height as i64 {
                    continue;
                }
                for col in 0..out_w {
                    let src_x = window.x0 + col as i64;
                    if src_x < 0 || src_x >= width as i64 {
                        continue;
                    }
                    values[row * out_w + col] = data[[band, src_y as usize, src_x as usize]];
                }
            }
            out.push(values);
        }
        Ok(out)
    }
}
