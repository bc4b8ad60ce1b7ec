//! Tile imagery provider: the entry point a tile-based map host talks to.
//!
//! A provider is opened once per raster. Opening validates the render
//! options, builds the request level table, picks a tiling scheme for the
//! raster's CRS and resolves the band domains the render mode needs. After
//! that every tile request runs decode, row flip, reprojection and
//! resampling on the worker pool and colorizes on the calling task.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use ahash::AHashMap;
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::geometry::projection::{Geographic, Projection, WebMercator, projection_for_epsg};
use crate::levels::{LevelResolver, ResolvedLevel};
use crate::pool::{WorkerPool, default_pool_size};
use crate::raster::{PyramidLevel, RasterDecoder, RasterSource};
use crate::render::shader::{GpuSurface, ShaderProgramCache};
use crate::render::{ModeSelection, RenderMode, RenderOptions, cpu};
use crate::reproject::{ReprojectParams, native_to_geographic, reproject, source_window_for};
use crate::resample::{ResampleParams, is_nodata, resample};
use crate::stats::{BandDomain, BandStatistics};
use crate::tile_cache::{CachePolicy, TileCache, TileKey};
use crate::tiling::TilingScheme;
use crate::window::{PixelWindow, compute_window, flip_rows};

const ERROR_CHANNEL_CAPACITY: usize = 64;

/// Provider configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Output tile edge in pixels.
    pub tile_size: usize,
    pub minimum_level: u32,
    pub maximum_level: u32,
    pub enable_pick: bool,
    /// Treat a 4th band as alpha in RGB modes.
    pub has_alpha_channel: bool,
    pub cache: CachePolicy,
    /// Worker threads, `None` for the host's available parallelism and
    /// `Some(0)` to run every task on the calling thread.
    pub pool_size: Option<usize>,
    /// Edge buffer in pixels around every decoded window.
    pub buffer: usize,
    pub render: RenderOptions,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            tile_size: 256,
            minimum_level: 0,
            maximum_level: 18,
            enable_pick: true,
            has_alpha_channel: true,
            cache: CachePolicy::default(),
            pool_size: None,
            buffer: 1,
            render: RenderOptions::default(),
        }
    }
}

impl ProviderOptions {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::config(format!("invalid provider options: {e}")))
    }

    fn validate(&self) -> Result<()> {
        if self.tile_size == 0 {
            return Err(Error::config("tile_size must be positive"));
        }
        if self.minimum_level > self.maximum_level {
            return Err(Error::config(format!(
                "minimum_level {} is above maximum_level {}",
                self.minimum_level, self.maximum_level
            )));
        }
        Ok(())
    }
}

/// Rendered RGBA tile, row-major with north up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl TileImage {
    fn transparent(size: usize) -> Self {
        Self {
            width: size,
            height: size,
            rgba: vec![0; size * size * 4],
        }
    }

    /// RGBA of the pixel at `(col, row)`.
    #[must_use]
    pub fn pixel(&self, col: usize, row: usize) -> Option<[u8; 4]> {
        if col >= self.width || row >= self.height {
            return None;
        }
        let i = (row * self.width + col) * 4;
        self.rgba.get(i..i + 4).and_then(|p| p.try_into().ok())
    }
}

/// Band values under a picked position.
#[derive(Debug, Clone, PartialEq)]
pub struct PickResult {
    /// Values keyed by 1-based band number, NaN where the pixel is no-data.
    pub values: BTreeMap<usize, f64>,
    /// `(col, row)` of the sampled pixel on `level`.
    pub pixel: (usize, usize),
    pub level: usize,
}

impl PickResult {
    #[must_use]
    pub fn get(&self, band: usize) -> Option<f64> {
        self.values.get(&band).copied()
    }

    #[must_use]
    pub fn has_valid_data(&self) -> bool {
        self.values.values().any(|v| !v.is_nan())
    }
}

/// Failed tile or pick request, published on the error channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TileErrorEvent {
    pub x: u64,
    pub y: u64,
    pub z: u32,
    pub message: String,
}

/// Decode, flip and reproject steps for one tile, in native pixel space.
#[derive(Debug, Clone, Copy)]
struct ReadPlan {
    level: usize,
    window: PixelWindow,
    flip: bool,
    reproject: Option<ReprojectParams>,
    /// Grid size handed to the resampler.
    grid: (usize, usize),
}

/// Builder for [`TileImageryProvider`].
///
/// ```rust,ignore
/// let provider = TileImageryProvider::builder(decoder)
///     .options(ProviderOptions::from_json(json)?)
///     .projection(Arc::new(my_projection))
///     .open()
///     .await?;
/// ```
pub struct ProviderBuilder {
    decoder: Arc<dyn RasterDecoder>,
    options: ProviderOptions,
    projection: Option<Arc<dyn Projection>>,
    gpu: Option<Arc<dyn GpuSurface>>,
}

impl ProviderBuilder {
    #[must_use]
    pub fn new(decoder: Arc<dyn RasterDecoder>) -> Self {
        Self {
            decoder,
            options: ProviderOptions::default(),
            projection: None,
            gpu: None,
        }
    }

    #[must_use]
    pub fn options(mut self, options: ProviderOptions) -> Self {
        self.options = options;
        self
    }

    /// Projection for rasters in a CRS other than EPSG:4326 or EPSG:3857.
    #[must_use]
    pub fn projection(mut self, projection: Arc<dyn Projection>) -> Self {
        self.projection = Some(projection);
        self
    }

    /// Colorize single-band tiles with shaders on `surface`.
    #[must_use]
    pub fn gpu_surface(mut self, surface: Arc<dyn GpuSurface>) -> Self {
        self.gpu = Some(surface);
        self
    }

    pub async fn open(self) -> Result<TileImageryProvider> {
        TileImageryProvider::open(self.decoder, self.options, self.projection, self.gpu).await
    }
}

/// Georeferencing chosen for a raster when it opens.
struct Georeference {
    scheme: TilingScheme,
    projection: Arc<dyn Projection>,
    /// True when tiles are remapped from the native CRS onto a geographic grid.
    reprojected: bool,
}

fn georeference(source: &RasterSource, supplied: Option<Arc<dyn Projection>>) -> Result<Georeference> {
    match source.epsg {
        None | Some(4326) => Ok(Georeference {
            scheme: TilingScheme::geographic(source.bbox),
            projection: Arc::new(Geographic),
            reprojected: false,
        }),
        Some(3857 | 900913) => Ok(Georeference {
            scheme: TilingScheme::web_mercator(source.bbox),
            projection: Arc::new(WebMercator),
            reprojected: false,
        }),
        Some(epsg) => {
            let projection = supplied
                .or_else(|| projection_for_epsg(epsg))
                .ok_or(Error::UnsupportedCrs { epsg })?;
            let rectangle = native_to_geographic(&source.bbox, projection.as_ref())
                .ok_or_else(|| Error::config(format!("extent of EPSG:{epsg} raster cannot be projected")))?;
            Ok(Georeference {
                scheme: TilingScheme::geographic(rectangle),
                projection,
                reprojected: true,
            })
        }
    }
}

pub struct TileImageryProvider {
    decoder: Arc<dyn RasterDecoder>,
    options: ProviderOptions,
    scheme: TilingScheme,
    projection: Arc<dyn Projection>,
    reprojected: bool,
    levels: LevelResolver,
    statistics: Arc<BandStatistics>,
    mode: RenderMode,
    nodata: Option<f64>,
    pool: WorkerPool,
    cache: TileCache<TileImage>,
    shaders: Option<ShaderProgramCache>,
    errors: broadcast::Sender<TileErrorEvent>,
    disposed: AtomicBool,
}

impl TileImageryProvider {
    #[must_use]
    pub fn builder(decoder: Arc<dyn RasterDecoder>) -> ProviderBuilder {
        ProviderBuilder::new(decoder)
    }

    /// Open a provider over `decoder`. The provider is ready once this resolves.
    ///
    /// # Arguments
    /// * `decoder` - Raster collaborator
    /// * `options` - Provider and render configuration
    /// * `projection` - Projection for non-native CRS codes, resolved from
    ///   the EPSG database when `None`
    /// * `gpu` - Surface for shader colorization of single-band tiles
    pub async fn open(
        decoder: Arc<dyn RasterDecoder>,
        options: ProviderOptions,
        projection: Option<Arc<dyn Projection>>,
        gpu: Option<Arc<dyn GpuSurface>>,
    ) -> Result<Self> {
        options.validate()?;
        let source = decoder.source();
        source.validate().map_err(|e| Error::Open(e.into()))?;

        let geo = georeference(source, projection)?;
        let levels = LevelResolver::build(&source.levels, options.tile_size);
        let selection = ModeSelection::from_options(&options.render, source.samples_per_pixel)?;
        let nodata = options.render.nodata.or(source.nodata);

        // byte composites are already in display range
        let mut declared = AHashMap::new();
        if let ModeSelection::Rgb { channels, .. } = &selection
            && source.sample_type.is_byte()
        {
            for channel in channels {
                declared.insert(channel.band, BandDomain::new(0.0, 255.0));
            }
        }
        let statistics = Arc::new(BandStatistics::new(Arc::clone(&decoder), declared));

        let pool = WorkerPool::new(options.pool_size.unwrap_or_else(default_pool_size))?;
        let lookups = selection.domain_bands().into_iter().map(|band| {
            let statistics = Arc::clone(&statistics);
            pool.run(move || statistics.get_domain(band))
        });
        for domain in try_join_all(lookups).await? {
            domain?;
        }
        let mode = selection.build(&options.render, source, options.has_alpha_channel, |band| {
            statistics.get_domain(band)
        })?;

        let (errors, _) = broadcast::channel(ERROR_CHANNEL_CAPACITY);
        info!(
            epsg = ?source.epsg,
            levels = source.levels.len(),
            max_native_zoom = levels.max_native_zoom(),
            mode = mode.name(),
            reprojected = geo.reprojected,
            gpu = gpu.is_some(),
            "opened tile imagery provider"
        );

        Ok(Self {
            cache: TileCache::new(options.cache),
            shaders: gpu.map(ShaderProgramCache::new),
            decoder,
            options,
            scheme: geo.scheme,
            projection: geo.projection,
            reprojected: geo.reprojected,
            levels,
            statistics,
            mode,
            nodata,
            pool,
            errors,
            disposed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn source(&self) -> &RasterSource {
        self.decoder.source()
    }

    #[must_use]
    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    #[must_use]
    pub fn render_mode(&self) -> &RenderMode {
        &self.mode
    }

    #[must_use]
    pub fn tiling_scheme(&self) -> &TilingScheme {
        &self.scheme
    }

    #[must_use]
    pub fn level_resolver(&self) -> &LevelResolver {
        &self.levels
    }

    /// Geographic extent covered by the provider's tiles.
    #[must_use]
    pub fn rectangle(&self) -> BoundingBox {
        self.scheme.rectangle()
    }

    /// Resolved domain of a 0-based band, if it has been needed so far.
    #[must_use]
    pub fn band_domain(&self, band: usize) -> Option<BandDomain> {
        self.statistics.cached(band)
    }

    #[must_use]
    pub fn cached_tiles(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        !self.is_destroyed()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Receiver of failed tile and pick requests.
    #[must_use]
    pub fn subscribe_errors(&self) -> broadcast::Receiver<TileErrorEvent> {
        self.errors.subscribe()
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_destroyed() { Err(Error::Destroyed) } else { Ok(()) }
    }

    fn in_range(&self, x: u64, y: u64, z: u32) -> bool {
        (self.options.minimum_level..=self.options.maximum_level).contains(&z)
            && x < self.scheme.tiles_x(z)
            && y < self.scheme.tiles_y(z)
    }

    fn level(&self, index: usize) -> Result<PyramidLevel> {
        self.source()
            .level(index)
            .copied()
            .ok_or_else(|| Error::config(format!("pyramid level {index} does not exist")))
    }

    fn report(&self, x: u64, y: u64, z: u32, err: Error) -> Error {
        if !matches!(err, Error::Destroyed) {
            warn!(x, y, z, error = %err, "tile request failed");
            // no subscribers is fine
            let _ = self.errors.send(TileErrorEvent { x, y, z, message: err.to_string() });
        }
        err
    }

    /// Render tile `(x, y, z)`.
    ///
    /// Resolves to `None` for zoom levels outside the configured range and
    /// for tile indices outside the grid.
    pub async fn request_image(&self, x: u64, y: u64, z: u32) -> Result<Option<Arc<TileImage>>> {
        self.ensure_alive()?;
        if !self.in_range(x, y, z) {
            debug!(x, y, z, "tile outside valid range");
            return Ok(None);
        }

        let key = TileKey::new(x, y, z);
        if let Some(tile) = self.cache.get(&key) {
            debug!(tile = %key, "tile cache hit");
            return Ok(Some(tile));
        }
        debug!(tile = %key, "tile cache miss");

        let tile = match self.render_tile(x, y, z).await {
            Ok(tile) => tile,
            Err(err) => return Err(self.report(x, y, z, err)),
        };
        // results finished after destroy are discarded
        self.ensure_alive()?;
        let tile = Arc::new(tile);
        self.cache.put(key, Arc::clone(&tile));
        Ok(Some(tile))
    }

    /// Render several tiles concurrently, results in input order.
    pub async fn request_images(&self, tiles: &[(u64, u64, u32)]) -> Vec<Result<Option<Arc<TileImage>>>> {
        join_all(tiles.iter().map(|&(x, y, z)| self.request_image(x, y, z))).await
    }

    async fn render_tile(&self, x: u64, y: u64, z: u32) -> Result<TileImage> {
        let size = self.options.tile_size;
        let resolved = self.levels.resolve(x, y, z);
        let level = self.level(resolved.physical_level)?;
        let Some(plan) = self.plan_read(&resolved, &level) else {
            debug!(x, y, z, "tile does not overlap the raster");
            return Ok(TileImage::transparent(size));
        };

        let sampling = resolved.sub_quadrant;
        let params = ResampleParams {
            source_width: plan.grid.0,
            source_height: plan.grid.1,
            target_width: size,
            target_height: size,
            window: [sampling.x0, sampling.y0, sampling.x1, sampling.y1],
            method: self.options.render.resample_method,
            buffer: self.options.buffer,
            nodata: self.nodata,
        };
        let gpu = match (&self.mode, &self.shaders) {
            (RenderMode::SingleBand(single), Some(shaders)) => Some((single, shaders)),
            _ => None,
        };

        let decoder = Arc::clone(&self.decoder);
        let projection = Arc::clone(&self.projection);
        let bands = self.mode.read_bands();
        let nodata = self.nodata;
        // the shader samples the decoded grid itself
        let cpu_resample = gpu.is_none().then_some(params);
        let planes = self
            .pool
            .run(move || -> Result<Vec<Vec<f32>>> {
                let fill = nodata.map_or(f32::NAN, |v| v as f32);
                let mut planes = decoder
                    .read_window(plan.level, &plan.window, &bands, fill)
                    .map_err(|source| Error::Decode { level: plan.level, window: plan.window, source })?;
                for plane in &mut planes {
                    if plan.flip {
                        flip_rows(plane.as_mut_slice(), plan.window.width());
                    }
                    if let Some(params) = &plan.reproject {
                        *plane = reproject(plane.as_slice(), params, projection.as_ref());
                    }
                    if let Some(params) = &cpu_resample {
                        *plane = resample(plane.as_slice(), params);
                    }
                }
                Ok(planes)
            })
            .await??;

        self.ensure_alive()?;
        let rgba = match gpu {
            Some((single, shaders)) => shaders.render(single, &params, &planes)?,
            None => cpu::colorize(&self.mode, &planes, size * size, self.nodata),
        };
        if rgba.len() != size * size * 4 {
            return Err(Error::Gpu(
                format!("surface returned {} bytes for a {size}x{size} tile", rgba.len()).into(),
            ));
        }
        debug!(x, y, z, level = plan.level, oversampled = resolved.oversampled, "rendered tile");
        Ok(TileImage { width: size, height: size, rgba })
    }

    /// Decode window for a resolved tile, or `None` when the tile misses the raster.
    fn plan_read(&self, resolved: &ResolvedLevel, level: &PyramidLevel) -> Option<ReadPlan> {
        let source = self.source();
        let buffer = self.options.buffer;
        let (px, py, pz) = resolved.parent;

        if !self.reprojected {
            let tw = compute_window(
                level,
                resolved,
                self.scheme.tiles_x(pz),
                self.scheme.tiles_y(pz),
                buffer,
                source.row_reversed,
            );
            return Some(ReadPlan {
                level: level.index,
                window: tw.source,
                flip: tw.flip_rows,
                reproject: None,
                grid: (tw.source.width(), tw.source.height()),
            });
        }

        // remap onto a geographic grid of the tile plus its buffer
        let size = self.options.tile_size;
        let target = self.scheme.tile_rectangle(px, py, pz);
        let pad_x = target.width() / size as f64 * buffer as f64;
        let pad_y = target.height() / size as f64 * buffer as f64;
        let grid_bbox = BoundingBox::new(
            target.minx - pad_x,
            target.miny - pad_y,
            target.maxx + pad_x,
            target.maxy + pad_y,
        );
        let window = source_window_for(
            &grid_bbox,
            self.projection.as_ref(),
            level,
            &source.bbox,
            source.row_reversed,
            buffer,
        )?;
        let grid = size + 2 * buffer;
        Some(ReadPlan {
            level: level.index,
            window,
            flip: source.row_reversed,
            reproject: Some(ReprojectParams {
                source_width: window.width(),
                source_height: window.height(),
                source_bbox: window.native_bounds(level, &source.bbox, source.row_reversed),
                target_width: grid,
                target_height: grid,
                target_bbox: grid_bbox,
                nodata: self.nodata,
            }),
            grid: (grid, grid),
        })
    }

    /// Fractional position (0..1 from the west and north edges) of a point
    /// on the raster's pixel grid.
    fn raster_fraction(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        if !self.reprojected {
            return self.scheme.fraction_of(lon, lat);
        }
        let bbox = self.source().bbox;
        let (x, y) = self.projection.to_native(lon, lat)?;
        bbox.contains(x, y)
            .then(|| ((x - bbox.minx) / bbox.width(), (bbox.maxy - y) / bbox.height()))
    }

    /// Read every band at a geographic position, at the level tile
    /// `(x, y, z)` renders from.
    ///
    /// Resolves to `None` when picking is disabled, the zoom is outside the
    /// configured range or the position is outside the raster.
    pub async fn pick_value(&self, x: u64, y: u64, z: u32, lon: f64, lat: f64) -> Result<Option<PickResult>> {
        self.ensure_alive()?;
        if !self.options.enable_pick || !self.in_range(x, y, z) {
            return Ok(None);
        }
        let Some((fx, fy)) = self.raster_fraction(lon, lat) else {
            return Ok(None);
        };
        let level = match self.level(self.levels.resolve(x, y, z).physical_level) {
            Ok(level) => level,
            Err(err) => return Err(self.report(x, y, z, err)),
        };

        let col = ((fx * level.width as f64) as usize).min(level.width.saturating_sub(1));
        let north_row = ((fy * level.height as f64) as usize).min(level.height.saturating_sub(1));
        let row = if self.source().row_reversed {
            level.height - 1 - north_row
        } else {
            north_row
        };
        let window = PixelWindow::new(col as i64, row as i64, col as i64 + 1, row as i64 + 1);

        let decoder = Arc::clone(&self.decoder);
        let bands: Vec<usize> = (0..self.source().samples_per_pixel).collect();
        let fill = self.nodata.map_or(f32::NAN, |v| v as f32);
        let index = level.index;
        let read = self
            .pool
            .run(move || {
                decoder
                    .read_window(index, &window, &bands, fill)
                    .map_err(|source| Error::Decode { level: index, window, source })
            })
            .await
            .and_then(|r| r);
        let planes = match read {
            Ok(planes) => planes,
            Err(err) => return Err(self.report(x, y, z, err)),
        };
        self.ensure_alive()?;

        let values = planes
            .iter()
            .enumerate()
            .map(|(band, plane)| {
                let v = plane.first().map_or(f64::NAN, |&v| f64::from(v));
                (band + 1, if is_nodata(v, self.nodata) { f64::NAN } else { v })
            })
            .collect();
        Ok(Some(PickResult { values, pixel: (col, row), level: index }))
    }

    /// Stop the workers, clear the cache and release GPU programs.
    /// Later calls do nothing.
    pub fn destroy(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pool.shutdown();
        self.cache.clear();
        if let Some(shaders) = &self.shaders {
            shaders.release_all();
        }
        info!("destroyed tile imagery provider");
    }
}

impl Drop for TileImageryProvider {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AnyResult;
    use crate::raster::ArrayRaster;
    use crate::render::SingleBandOptions;
    use crate::resample::ResampleMethod;

    fn ramp(size: usize) -> ArrayRaster {
        let values = (0..size * size).map(|v| v as f32).collect();
        ArrayRaster::from_band(BoundingBox::new(0.0, 0.0, 10.0, 10.0), Some(4326), size, size, values).unwrap()
    }

    fn ramp_raster(size: usize) -> Arc<ArrayRaster> {
        Arc::new(ramp(size))
    }

    fn options(tile_size: usize, single: SingleBandOptions) -> ProviderOptions {
        ProviderOptions {
            tile_size,
            pool_size: Some(1),
            render: RenderOptions::single(single),
            ..ProviderOptions::default()
        }
    }

    fn gray(min: f64, max: f64) -> SingleBandOptions {
        SingleBandOptions {
            min: Some(min),
            max: Some(max),
            ..SingleBandOptions::default()
        }
    }

    async fn open(decoder: Arc<dyn RasterDecoder>, options: ProviderOptions) -> TileImageryProvider {
        TileImageryProvider::builder(decoder).options(options).open().await.unwrap()
    }

    /// Fails every window read.
    struct BrokenDecoder(RasterSource);

    impl RasterDecoder for BrokenDecoder {
        fn source(&self) -> &RasterSource {
            &self.0
        }

        fn read_window(&self, _: usize, _: &PixelWindow, _: &[usize], _: f32) -> AnyResult<Vec<Vec<f32>>> {
            Err("truncated chunk".into())
        }
    }

    #[test]
    fn test_options_defaults_from_json() {
        let options = ProviderOptions::from_json(r#"{"tile_size": 512, "render": {"convert_to_rgb": true}}"#).unwrap();
        assert_eq!(options.tile_size, 512);
        assert_eq!(options.maximum_level, 18);
        assert_eq!(options.buffer, 1);
        assert_eq!(options.cache, CachePolicy::MaxEntries(100));
        assert!(options.render.convert_to_rgb);
        assert!(ProviderOptions::from_json(r#"{"tile_size": "big"}"#).is_err());
    }

    #[tokio::test]
    async fn test_rejects_bad_configuration() {
        let raster: Arc<dyn RasterDecoder> = ramp_raster(4);
        let inverted = ProviderOptions { minimum_level: 5, maximum_level: 2, ..ProviderOptions::default() };
        assert!(matches!(
            TileImageryProvider::builder(Arc::clone(&raster)).options(inverted).open().await,
            Err(Error::Config(_))
        ));

        let band = options(4, SingleBandOptions { band: 3, ..gray(0.0, 1.0) });
        assert!(matches!(
            TileImageryProvider::builder(raster).options(band).open().await,
            Err(Error::BandOutOfRange { band: 2, samples: 1 })
        ));
    }

    #[tokio::test]
    async fn test_unknown_crs_needs_projection() {
        let raster = ArrayRaster::from_band(BoundingBox::new(0.0, 0.0, 1.0, 1.0), Some(70000), 1, 1, vec![1.0]).unwrap();
        let result = TileImageryProvider::builder(Arc::new(raster)).open().await;
        assert!(matches!(result, Err(Error::UnsupportedCrs { epsg: 70000 })));
    }

    #[tokio::test]
    async fn test_tile_shape_and_range() {
        let provider = open(ramp_raster(8), options(8, gray(0.0, 63.0))).await;
        let tile = provider.request_image(0, 0, 0).await.unwrap().unwrap();
        assert_eq!((tile.width, tile.height, tile.rgba.len()), (8, 8, 8 * 8 * 4));
        assert!(provider.request_image(0, 0, 19).await.unwrap().is_none());
        assert!(provider.request_image(2, 0, 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_decode() {
        let raster = ramp_raster(4);
        let provider = open(raster.clone(), options(4, gray(0.0, 15.0))).await;
        let first = provider.request_image(0, 0, 0).await.unwrap().unwrap();
        let reads = raster.read_count();
        let second = provider.request_image(0, 0, 0).await.unwrap().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(raster.read_count(), reads);
        assert_eq!(provider.cached_tiles(), 1);
    }

    #[tokio::test]
    async fn test_oversampled_tile_magnifies_quadrant() {
        let provider = open(ramp_raster(4), options(4, gray(0.0, 15.0))).await;
        assert_eq!(provider.level_resolver().max_native_zoom(), 0);

        // north-east quadrant of the 4x4 ramp, doubled
        let tile = provider.request_image(1, 0, 1).await.unwrap().unwrap();
        let reds: Vec<u8> = (0..4).map(|col| tile.pixel(col, 0).unwrap()[0]).collect();
        assert_eq!(reds, vec![34, 34, 51, 51]);
        assert_eq!(tile.pixel(0, 2).unwrap()[0], 102);
    }

    #[tokio::test]
    async fn test_bilinear_constant_raster_is_uniform() {
        let raster = ArrayRaster::from_band(BoundingBox::new(0.0, 0.0, 1.0, 1.0), None, 5, 3, vec![7.0; 15]).unwrap();
        let mut opts = options(16, gray(0.0, 14.0));
        opts.render = opts.render.with_resample_method(ResampleMethod::Bilinear);
        let provider = open(Arc::new(raster), opts).await;
        let tile = provider.request_image(0, 0, 0).await.unwrap().unwrap();
        for px in tile.rgba.chunks_exact(4) {
            assert_eq!(px, [128, 128, 128, 255]);
        }
    }

    #[tokio::test]
    async fn test_row_reversed_raster_renders_north_up() {
        // row 0 is the southern edge and holds the smallest values
        let values = vec![0.0, 0.0, 10.0, 10.0];
        let raster = ArrayRaster::from_band(BoundingBox::new(0.0, 0.0, 2.0, 2.0), Some(4326), 2, 2, values)
            .unwrap()
            .row_reversed(true);
        let provider = open(Arc::new(raster), options(2, gray(0.0, 10.0))).await;
        let tile = provider.request_image(0, 0, 0).await.unwrap().unwrap();
        assert_eq!(tile.pixel(0, 0).unwrap()[0], 255);
        assert_eq!(tile.pixel(0, 1).unwrap()[0], 0);

        let pick = provider.pick_value(0, 0, 0, 0.5, 1.5).await.unwrap().unwrap();
        assert_eq!(pick.get(1), Some(10.0));
        assert_eq!(pick.pixel, (0, 1));
    }

    #[tokio::test]
    async fn test_pick_value() {
        let raster = ArrayRaster::from_band(
            BoundingBox::new(0.0, 0.0, 4.0, 4.0),
            Some(4326),
            4,
            4,
            (0..16).map(|v| v as f32).collect(),
        )
        .unwrap()
        .with_nodata(5.0);
        let provider = open(Arc::new(raster), options(4, gray(0.0, 15.0))).await;

        let pick = provider.pick_value(0, 0, 0, 2.5, 3.5).await.unwrap().unwrap();
        assert_eq!(pick.pixel, (2, 0));
        assert_eq!(pick.get(1), Some(2.0));
        assert_eq!(pick.level, 0);

        let nodata = provider.pick_value(0, 0, 0, 1.5, 2.5).await.unwrap().unwrap();
        assert!(nodata.get(1).unwrap().is_nan());
        assert!(!nodata.has_valid_data());

        assert!(provider.pick_value(0, 0, 0, 9.0, 9.0).await.unwrap().is_none());
        assert!(provider.pick_value(0, 0, 30, 1.0, 1.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pick_disabled() {
        let mut opts = options(4, gray(0.0, 15.0));
        opts.enable_pick = false;
        let provider = open(ramp_raster(4), opts).await;
        assert!(provider.pick_value(0, 0, 0, 1.0, 1.0).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_decode_failure_is_reported() {
        let source = ramp(4).source().clone();
        let provider = open(Arc::new(BrokenDecoder(source)), options(4, gray(0.0, 1.0))).await;
        let mut errors = provider.subscribe_errors();

        let err = provider.request_image(0, 0, 0).await.unwrap_err();
        assert!(matches!(err, Error::Decode { level: 0, .. }));
        let event = errors.try_recv().unwrap();
        assert_eq!((event.x, event.y, event.z), (0, 0, 0));
        assert!(event.message.contains("decode"));
        assert_eq!(provider.cached_tiles(), 0);

        // the provider keeps serving requests
        assert!(provider.request_image(0, 0, 0).await.is_err());
        assert!(provider.request_image(0, 0, 25).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_domain_resolved_once_at_open() {
        let raster = Arc::new(ramp(4).with_overviews(1));
        let provider = open(raster.clone(), options(4, SingleBandOptions::default())).await;
        assert_eq!(provider.band_domain(0), Some(BandDomain::new(0.0, 10.0)));
        let reads = raster.read_count();
        provider.request_image(0, 0, 0).await.unwrap();
        provider.request_image(0, 0, 1).await.unwrap();
        // one read per tile, none for statistics
        assert_eq!(raster.read_count(), reads + 2);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent() {
        let provider = open(ramp_raster(4), options(4, gray(0.0, 15.0))).await;
        provider.request_image(0, 0, 0).await.unwrap();
        assert!(provider.is_ready());
        provider.destroy();
        provider.destroy();
        assert!(!provider.is_ready());
        assert_eq!(provider.cached_tiles(), 0);
        assert!(matches!(provider.request_image(0, 0, 0).await, Err(Error::Destroyed)));
        assert!(matches!(provider.pick_value(0, 0, 0, 1.0, 1.0).await, Err(Error::Destroyed)));
    }
}
