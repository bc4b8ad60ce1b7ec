//! Mapping of requested zoom levels onto the raster's pyramid.
//!
//! The request table is built once when the provider opens by walking zoom
//! levels upward until the finest pyramid level is reached. Requests deeper
//! than the table are served from the finest level by zooming into the
//! sub-quadrant of an ancestor tile.

use tracing::debug;

use crate::raster::PyramidLevel;
use crate::window::SamplingWindow;

/// Per-tile pixel size a level may have while still matching a zoom level,
/// relative to the output tile size.
pub const LEVEL_TOLERANCE: f64 = 1.5;

const MAX_TABLE_DEPTH: u32 = 32;

/// Result of resolving one tile request against the pyramid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolvedLevel {
    pub physical_level: usize,
    pub oversampled: bool,
    /// Tile actually read from the pyramid, as `(x, y, z)`.
    pub parent: (u64, u64, u32),
    /// Fraction of the parent tile covered by the requested tile.
    pub sub_quadrant: SamplingWindow,
    /// Magnification of the requested tile relative to its parent.
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelResolver {
    request_levels: Vec<usize>,
}

impl LevelResolver {
    /// Build the `requestLevels` table.
    ///
    /// # Arguments
    /// * `levels` - Pyramid levels ordered finest (index 0) to coarsest
    /// * `tile_size` - Output tile edge in pixels
    #[must_use]
    pub fn build(levels: &[PyramidLevel], tile_size: usize) -> Self {
        let limit = tile_size.max(1) as f64 * LEVEL_TOLERANCE;
        let mut request_levels = Vec::new();

        if levels.is_empty() {
            return Self { request_levels: vec![0] };
        }

        for z in 0..=MAX_TABLE_DEPTH {
            let tiles = (1u64 << z) as f64;
            // scan coarsest to finest, keeping the finest level that still fits
            let mut chosen = levels.len() - 1;
            for level in levels.iter().rev() {
                if level.max_dimension() as f64 / tiles <= limit {
                    chosen = level.index;
                } else {
                    break;
                }
            }
            request_levels.push(chosen);
            if chosen == 0 {
                break;
            }
        }

        debug!(levels = ?request_levels, tile_size, "built request level table");
        Self { request_levels }
    }

    /// Deepest zoom served without oversampling.
    #[must_use]
    pub fn max_native_zoom(&self) -> u32 {
        self.request_levels.len().saturating_sub(1) as u32
    }

    #[must_use]
    pub fn request_levels(&self) -> &[usize] {
        &self.request_levels
    }

    /// Resolve tile `(x, y, z)` to a physical level and sampling sub-window.
    #[must_use]
    pub fn resolve(&self, x: u64, y: u64, z: u32) -> ResolvedLevel {
        let max_zoom = self.max_native_zoom();
        if z <= max_zoom {
            return ResolvedLevel {
                physical_level: self.request_levels[z as usize],
                oversampled: false,
                parent: (x, y, z),
                sub_quadrant: SamplingWindow::FULL,
                scale: 1.0,
            };
        }

        let dz = z - max_zoom;
        let parent_x = x.checked_shr(dz).unwrap_or(0);
        let parent_y = y.checked_shr(dz).unwrap_or(0);
        let scale = 2f64.powi(dz as i32);
        let offset_x = (x - parent_x.checked_shl(dz).unwrap_or(0)) as f64;
        let offset_y = (y - parent_y.checked_shl(dz).unwrap_or(0)) as f64;

        ResolvedLevel {
            physical_level: self.request_levels[max_zoom as usize],
            oversampled: true,
            parent: (parent_x, parent_y, max_zoom),
            sub_quadrant: SamplingWindow::new(
                offset_x / scale,
                offset_y / scale,
                (offset_x + 1.0) / scale,
                (offset_y + 1.0) / scale,
            ),
            scale,
        }
    }
}
