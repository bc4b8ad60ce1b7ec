//! Pixel windows and sampling windows for one tile.

use crate::geometry::BoundingBox;
use crate::levels::ResolvedLevel;
use crate::raster::PyramidLevel;

/// Half-open pixel rectangle `[x0, x1) x [y0, y1)` on a pyramid level.
///
/// Coordinates may extend past the image when the edge buffer is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelWindow {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl PixelWindow {
    #[must_use]
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> usize {
        (self.x1 - self.x0).max(0) as usize
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> usize {
        (self.y1 - self.y0).max(0) as usize
    }

    /// Grow by `buffer` pixels on every side.
    #[must_use]
    pub fn expand(&self, buffer: usize) -> Self {
        let b = buffer as i64;
        Self::new(self.x0 - b, self.y0 - b, self.x1 + b, self.y1 + b)
    }

    /// Mirror vertically within an image of `height` rows.
    #[must_use]
    pub fn mirror_rows(&self, height: usize) -> Self {
        let h = height as i64;
        Self::new(self.x0, h - self.y1, self.x1, h - self.y0)
    }

    /// Native-CRS extent of this window on a level spanning `bbox`.
    #[must_use]
    pub fn native_bounds(&self, level: &PyramidLevel, bbox: &BoundingBox, row_reversed: bool) -> BoundingBox {
        let fx0 = self.x0 as f64 / level.width as f64;
        let fx1 = self.x1 as f64 / level.width as f64;
        let fy0 = self.y0 as f64 / level.height as f64;
        let fy1 = self.y1 as f64 / level.height as f64;
        if row_reversed {
            // row 0 is the southern edge
            BoundingBox::new(
                bbox.minx + fx0 * bbox.width(),
                bbox.miny + fy0 * bbox.height(),
                bbox.minx + fx1 * bbox.width(),
                bbox.miny + fy1 * bbox.height(),
            )
        } else {
            bbox.sub_rect(fx0, fy0, fx1, fy1)
        }
    }
}

/// Fractional `[x0, y0, x1, y1]` sub-rectangle (0..1) of a decoded window.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingWindow {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

impl SamplingWindow {
    pub const FULL: SamplingWindow = SamplingWindow { x0: 0.0, y0: 0.0, x1: 1.0, y1: 1.0 };

    #[must_use]
    pub const fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self { x0, y0, x1, y1 }
    }
}

impl Default for SamplingWindow {
    fn default() -> Self {
        Self::FULL
    }
}

/// Source window and sampling window for one resolved tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileWindow {
    /// Window to decode, including the edge buffer.
    pub source: PixelWindow,
    /// Window matching the parent tile, without buffer and in tiling row order.
    pub tile: PixelWindow,
    pub sampling: SamplingWindow,
    pub buffer: usize,
    /// Decoded rows must be reversed to put north first.
    pub flip_rows: bool,
}

/// Compute the pixel windows for a resolved tile.
///
/// # Arguments
/// * `level` - Pyramid level chosen by the resolver
/// * `resolved` - Parent tile and sub-quadrant from the resolver
/// * `tiles_x`, `tiles_y` - Tile counts at the parent tile's zoom
/// * `buffer` - Edge buffer in pixels
/// * `row_reversed` - Whether the raster's row 0 is its southern edge
#[must_use]
pub fn compute_window(
    level: &PyramidLevel,
    resolved: &ResolvedLevel,
    tiles_x: u64,
    tiles_y: u64,
    buffer: usize,
    row_reversed: bool,
) -> TileWindow {
    let (px, py, _) = resolved.parent;
    let (x0, x1) = split_axis(level.width, tiles_x, px);
    let (y0, y1) = split_axis(level.height, tiles_y, py);
    let tile = PixelWindow::new(x0, y0, x1, y1);

    let read = if row_reversed { tile.mirror_rows(level.height) } else { tile };

    TileWindow {
        source: read.expand(buffer),
        tile,
        sampling: resolved.sub_quadrant,
        buffer,
        flip_rows: row_reversed,
    }
}

/// Pixel range of tile `index` when `size` pixels are split into `tiles` parts.
fn split_axis(size: usize, tiles: u64, index: u64) -> (i64, i64) {
    let tiles = tiles.max(1) as f64;
    let size_f = size as f64;
    let start = (index as f64 * size_f / tiles).round() as i64;
    let end = ((index + 1) as f64 * size_f / tiles).round() as i64;
    (start, end.max(start + 1))
}

/// Reverse the row order of a row-major `width`-wide array in place.
pub fn flip_rows<T>(data: &mut [T], width: usize) {
    if width == 0 {
        return;
    }
    let height = data.len() / width;
    for row in 0..height / 2 {
        let (top, bottom) = data.split_at_mut((height - 1 - row) * width);
        top[row * width..(row + 1) * width].swap_with_slice(&mut bottom[..width]);
    }
}
