//! # cog-imagery - tile rendering for Cloud Optimized GeoTIFF imagery
//!
//! Turns a tiled, multi-resolution raster into RGBA map tiles on demand.
//!
//! ## Features
//!
//! - **Level selection**: Picks the pyramid level matching each zoom, oversampling
//!   quadrants of the finest level past its native resolution
//! - **Windowed reads**: Only the pixels under a tile (plus a resampling buffer) are decoded
//! - **Reprojection**: Rasters in any supported CRS are warped onto the geographic grid
//! - **Resampling**: Nearest and bilinear, with nodata-aware weighting
//! - **Colorization**: Color ramps, named scales, band expressions and RGB composites,
//!   rendered on the CPU or through generated WGSL shaders
//! - **Caching**: Rendered tiles are kept per tile coordinate (max entries or TTL)
//! - **Background work**: Decode and resample run on a fixed worker pool
//! - **Value picking**: Raw band values under a clicked coordinate
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use cog_imagery::{GeoTiffDecoder, ProviderOptions, TileImageryProvider};
//!
//! let decoder = Arc::new(GeoTiffDecoder::open("elevation.tif")?);
//! let options = ProviderOptions::from_json(r#"{"render": {"single": {"color_scale": "viridis"}}}"#)?;
//! let provider = TileImageryProvider::builder(decoder).options(options).open().await?;
//!
//! if let Some(tile) = provider.request_image(3, 2, 3).await? {
//!     println!("{}x{} tile", tile.width, tile.height);
//! }
//! let picked = provider.pick_value(3, 2, 3, 8.5, 47.2).await?;
//! provider.destroy();
//! ```
//!
//! ## Architecture
//!
//! - [`provider`]: Entry point; [`TileImageryProvider`] wires the pipeline together
//! - [`levels`]: Zoom to pyramid level mapping via [`LevelResolver`]
//! - [`window`]: Pixel windows read for each tile
//! - [`reproject`] / [`resample`]: Pixel transforms between source and tile grids
//! - [`stats`]: Per-band value domains
//! - [`render`]: Render modes with [`render::cpu`] and [`render::shader`] backends
//! - [`color`]: Color ramps, named scales and interpolation spaces
//! - [`expression`]: Band math expressions
//! - [`tile_cache`]: Rendered tile cache
//! - [`pool`]: Background worker threads
//! - [`raster`]: Raster metadata and the [`RasterDecoder`] trait
//! - [`geotiff`]: Local GeoTIFF decoder
//! - [`geometry`] / [`tiling`]: Bounding boxes, projections and tiling schemes

// ============================================================================
// Public modules
// ============================================================================

pub mod color;
pub mod error;
pub mod expression;
pub mod geometry;
pub mod geotiff;
pub mod levels;
pub mod pool;
pub mod provider;
pub mod raster;
pub mod render;
pub mod reproject;
pub mod resample;
pub mod stats;
pub mod tile_cache;
pub mod tiling;
pub mod window;

// ============================================================================
// Errors
// ============================================================================

pub use error::{AnyResult, Error, Result};

// ============================================================================
// Provider
// ============================================================================

pub use provider::{
    PickResult,
    ProviderBuilder,
    ProviderOptions,
    TileErrorEvent,
    TileImage,
    TileImageryProvider,
};

// ============================================================================
// Raster Sources
// ============================================================================

pub use geotiff::GeoTiffDecoder;
pub use raster::{ArrayRaster, PyramidLevel, RasterDecoder, RasterSource, SampleType};

// ============================================================================
// Pipeline Stages
// ============================================================================

pub use levels::{LevelResolver, ResolvedLevel};
pub use reproject::{ReprojectParams, reproject};
pub use resample::{ResampleMethod, ResampleParams, resample};
pub use stats::{BandDomain, BandStatistics};
pub use window::{PixelWindow, SamplingWindow, TileWindow, compute_window};

// ============================================================================
// Rendering
// ============================================================================

pub use color::{ColorRamp, InterpolationMode, RampKind, Rgba};
pub use expression::Expression;
pub use render::shader::{GpuSurface, ShaderProgramCache, generate_wgsl};
pub use render::{BandChannel, MultiBandOptions, RenderMode, RenderOptions, SingleBandOptions};

// ============================================================================
// Caching & Workers
// ============================================================================

pub use pool::{WorkerPool, default_pool_size};
pub use tile_cache::{CachePolicy, TileCache, TileKey};

// ============================================================================
// Geometry & Projections
// ============================================================================

pub use geometry::projection::{
    AffineProjection,
    EpsgProjection,
    Geographic,
    Projection,
    WebMercator,
    projection_for_epsg,
};
pub use geometry::BoundingBox;
pub use tiling::TilingScheme;
