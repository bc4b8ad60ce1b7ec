//! Quad-tree tiling over a raster's extent.
//!
//! Both schemes start from a single level-zero tile covering the whole raster,
//! so every zoom level `z` has `2^z` tiles along each axis. Tile rectangles are
//! always reported in geographic degrees.

use crate::geometry::BoundingBox;
use crate::geometry::projection::{lat_to_merc_y, lon_to_merc_x, merc_x_to_lon, merc_y_to_lat};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TilingScheme {
    /// Equirectangular grid over a rectangle in degrees.
    Geographic { rectangle: BoundingBox },
    /// Grid that is regular in Web Mercator meters.
    WebMercator { extent: BoundingBox },
}

impl TilingScheme {
    #[must_use]
    pub fn geographic(rectangle: BoundingBox) -> Self {
        TilingScheme::Geographic {
            rectangle: rectangle.unwrap_antimeridian(),
        }
    }

    /// Scheme over an extent given in Web Mercator meters.
    #[must_use]
    pub fn web_mercator(extent: BoundingBox) -> Self {
        TilingScheme::WebMercator { extent }
    }

    /// Number of tiles along X at `z`.
    #[inline]
    #[must_use]
    pub fn tiles_x(&self, z: u32) -> u64 {
        1u64 << z.min(62)
    }

    /// Number of tiles along Y at `z`.
    #[inline]
    #[must_use]
    pub fn tiles_y(&self, z: u32) -> u64 {
        1u64 << z.min(62)
    }

    /// Whole covered area in degrees.
    #[must_use]
    pub fn rectangle(&self) -> BoundingBox {
        match self {
            TilingScheme::Geographic { rectangle } => *rectangle,
            TilingScheme::WebMercator { extent } => mercator_to_degrees(extent),
        }
    }

    /// The scheme's own grid extent (degrees or meters).
    fn grid_extent(&self) -> BoundingBox {
        match self {
            TilingScheme::Geographic { rectangle } => *rectangle,
            TilingScheme::WebMercator { extent } => *extent,
        }
    }

    /// Geographic rectangle of tile `(x, y, z)`.
    #[must_use]
    pub fn tile_rectangle(&self, x: u64, y: u64, z: u32) -> BoundingBox {
        let extent = self.grid_extent();
        let nx = self.tiles_x(z) as f64;
        let ny = self.tiles_y(z) as f64;
        let tile = extent.sub_rect(
            x as f64 / nx,
            y as f64 / ny,
            (x + 1) as f64 / nx,
            (y + 1) as f64 / ny,
        );
        match self {
            TilingScheme::Geographic { .. } => tile,
            TilingScheme::WebMercator { .. } => mercator_to_degrees(&tile),
        }
    }

    /// Tile containing a geographic position, if the position is inside the scheme.
    #[must_use]
    pub fn position_to_tile(&self, lon: f64, lat: f64, z: u32) -> Option<(u64, u64)> {
        let (fx, fy) = self.fraction_of(lon, lat)?;
        let nx = self.tiles_x(z);
        let ny = self.tiles_y(z);
        let x = ((fx * nx as f64) as u64).min(nx - 1);
        let y = ((fy * ny as f64) as u64).min(ny - 1);
        Some((x, y))
    }

    /// Fractional position (0..1 from the west and north edges) of a geographic point.
    #[must_use]
    pub fn fraction_of(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        let extent = self.grid_extent();
        let (px, py) = match self {
            TilingScheme::Geographic { rectangle } => {
                // longitudes west of an unwrapped antimeridian rectangle wrap around
                let lon = if lon < rectangle.minx && rectangle.maxx > 180.0 {
                    lon + 360.0
                } else {
                    lon
                };
                (lon, lat)
            }
            TilingScheme::WebMercator { .. } => (lon_to_merc_x(lon), lat_to_merc_y(lat)),
        };
        if !extent.contains(px, py) || extent.width() <= 0.0 || extent.height() <= 0.0 {
            return None;
        }
        Some(((px - extent.minx) / extent.width(), (extent.maxy - py) / extent.height()))
    }
}

fn mercator_to_degrees(extent: &BoundingBox) -> BoundingBox {
    BoundingBox::new(
        merc_x_to_lon(extent.minx),
        merc_y_to_lat(extent.miny),
        merc_x_to_lon(extent.maxx),
        merc_y_to_lat(extent.maxy),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::projection::HALF_EARTH;

    const EPS: f64 = 1e-9;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < EPS
    }

    #[test]
    fn test_tile_counts() {
        let scheme = TilingScheme::geographic(BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(scheme.tiles_x(0), 1);
        assert_eq!(scheme.tiles_y(3), 8);
    }

    #[test]
    fn test_geographic_tile_rectangle() {
        let scheme = TilingScheme::geographic(BoundingBox::new(-20.0, -10.0, 20.0, 10.0));
        let root = scheme.tile_rectangle(0, 0, 0);
        assert_eq!(root, BoundingBox::new(-20.0, -10.0, 20.0, 10.0));

        let ne = scheme.tile_rectangle(1, 0, 1);
        assert!(approx_eq(ne.minx, 0.0));
        assert!(approx_eq(ne.maxx, 20.0));
        assert!(approx_eq(ne.miny, 0.0));
        assert!(approx_eq(ne.maxy, 10.0));
    }

    #[test]
    fn test_position_to_tile() {
        let scheme = TilingScheme::geographic(BoundingBox::new(-20.0, -10.0, 20.0, 10.0));
        assert_eq!(scheme.position_to_tile(5.0, -5.0, 1), Some((1, 1)));
        assert_eq!(scheme.position_to_tile(-19.0, 9.0, 2), Some((0, 0)));
        assert_eq!(scheme.position_to_tile(20.0, -10.0, 2), Some((3, 3)));
        assert_eq!(scheme.position_to_tile(25.0, 0.0, 2), None);
    }

    #[test]
    fn test_antimeridian_rectangle_wraps_positions() {
        let scheme = TilingScheme::geographic(BoundingBox::new(170.0, -10.0, -170.0, 10.0));
        assert!(approx_eq(scheme.rectangle().maxx, 190.0));
        assert_eq!(scheme.position_to_tile(-175.0, 0.0, 1), Some((1, 1)));
    }

    #[test]
    fn test_web_mercator_world() {
        let world = BoundingBox::new(-HALF_EARTH, -HALF_EARTH, HALF_EARTH, HALF_EARTH);
        let scheme = TilingScheme::web_mercator(world);
        let rect = scheme.rectangle();
        assert!((rect.minx + 180.0).abs() < 1e-9);
        assert!((rect.maxy - 85.051_128_779_806_59).abs() < 1e-6);

        // the equator splits zoom 1 evenly in mercator space
        let nw = scheme.tile_rectangle(0, 0, 1);
        assert!(nw.miny.abs() < 1e-9);
        assert_eq!(scheme.position_to_tile(10.0, 60.0, 1), Some((1, 0)));
    }
}
