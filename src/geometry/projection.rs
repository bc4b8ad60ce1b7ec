//! Coordinate conversions between geographic degrees and a raster's native CRS.
//!
//! EPSG:4326 and EPSG:3857 are handled natively with closed-form math. Every
//! other CRS goes through a [`Projection`], either supplied by the caller or
//! resolved from the crs-definitions database and evaluated with proj4rs.

use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use proj4rs::proj::Proj;
use proj4rs::transform::transform;

/// Half the earth's circumference in Web Mercator meters
pub const HALF_EARTH: f64 = 20_037_508.342_789_244;

/// Latitude limit of the square Web Mercator world.
pub const MAX_MERCATOR_LAT: f64 = 85.051_128_779_806_59;

/// Web Mercator X to longitude (degrees)
#[inline(always)]
#[must_use]
pub fn merc_x_to_lon(x: f64) -> f64 {
    x * 180.0 / HALF_EARTH
}

/// Web Mercator Y to latitude (degrees)
#[inline(always)]
#[must_use]
pub fn merc_y_to_lat(y: f64) -> f64 {
    let y_rad = y * PI / HALF_EARTH;
    (2.0 * y_rad.exp().atan() - PI / 2.0).to_degrees()
}

#[inline(always)]
#[must_use]
pub fn lon_to_merc_x(lon: f64) -> f64 {
    lon * HALF_EARTH / 180.0
}

/// Latitude (degrees) to Web Mercator Y, clamped to the square world.
#[inline(always)]
#[must_use]
pub fn lat_to_merc_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_MERCATOR_LAT, MAX_MERCATOR_LAT).to_radians();
    (PI / 4.0 + lat / 2.0).tan().ln() * HALF_EARTH / PI
}

/// Get PROJ4 string for an EPSG code using the crs-definitions database
#[inline]
#[must_use]
pub fn get_proj_string(epsg: u32) -> Option<&'static str> {
    u16::try_from(epsg)
        .ok()
        .and_then(crs_definitions::from_code)
        .map(|def| def.proj4)
}

/// Check if an EPSG code represents a geographic (lon/lat) CRS
#[inline]
#[must_use]
pub fn is_geographic_crs(epsg: u32) -> bool {
    if let Some(proj_str) = get_proj_string(epsg) {
        proj_str.contains("+proj=longlat")
    } else {
        (4000..5000).contains(&epsg)
    }
}

/// Conversion between geographic degrees and a native CRS.
pub trait Projection: Send + Sync {
    /// Geographic (lon, lat) degrees into native coordinates.
    fn to_native(&self, lon: f64, lat: f64) -> Option<(f64, f64)>;

    /// Native coordinates into geographic (lon, lat) degrees.
    fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)>;

    /// True when native x depends only on lon and native y only on lat.
    fn is_separable(&self) -> bool {
        false
    }
}

/// Identity projection for EPSG:4326 rasters.
#[derive(Debug, Clone, Copy, Default)]
pub struct Geographic;

impl Projection for Geographic {
    fn to_native(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        Some((lon, lat))
    }

    fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        Some((x, y))
    }

    fn is_separable(&self) -> bool {
        true
    }
}

/// Spherical Web Mercator (EPSG:3857 / EPSG:900913).
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercator;

impl Projection for WebMercator {
    fn to_native(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        Some((lon_to_merc_x(lon), lat_to_merc_y(lat)))
    }

    fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        Some((merc_x_to_lon(x), merc_y_to_lat(y)))
    }

    fn is_separable(&self) -> bool {
        true
    }
}

/// Axis-aligned affine mapping `native = geo * scale + offset`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineProjection {
    pub scale_x: f64,
    pub scale_y: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

impl AffineProjection {
    #[must_use]
    pub fn new(scale_x: f64, scale_y: f64, offset_x: f64, offset_y: f64) -> Self {
        Self { scale_x, scale_y, offset_x, offset_y }
    }
}

impl Projection for AffineProjection {
    fn to_native(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        Some((lon * self.scale_x + self.offset_x, lat * self.scale_y + self.offset_y))
    }

    fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        if self.scale_x == 0.0 || self.scale_y == 0.0 {
            return None;
        }
        Some(((x - self.offset_x) / self.scale_x, (y - self.offset_y) / self.scale_y))
    }

    fn is_separable(&self) -> bool {
        true
    }
}

/// Projection between WGS84 and an EPSG-coded CRS using proj4rs.
pub struct EpsgProjection {
    epsg: u32,
    wgs84: Proj,
    native: Proj,
    native_is_geographic: bool,
}

impl fmt::Debug for EpsgProjection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EpsgProjection").field("epsg", &self.epsg).finish()
    }
}

impl EpsgProjection {
    /// Build a projection for `epsg` from the crs-definitions database.
    pub fn new(epsg: u32) -> Result<Self, String> {
        let wgs84_str = get_proj_string(4326).ok_or("EPSG:4326 not supported")?;
        let native_str = get_proj_string(epsg)
            .ok_or_else(|| format!("EPSG:{epsg} is not in the crs-definitions database"))?;

        let wgs84 = Proj::from_proj_string(wgs84_str)
            .map_err(|e| format!("Invalid projection EPSG:4326: {e:?}"))?;
        let native = Proj::from_proj_string(native_str)
            .map_err(|e| format!("Invalid projection EPSG:{epsg}: {e:?}"))?;

        Ok(Self {
            epsg,
            wgs84,
            native,
            native_is_geographic: is_geographic_crs(epsg),
        })
    }

    #[must_use]
    pub fn epsg(&self) -> u32 {
        self.epsg
    }
}

impl Projection for EpsgProjection {
    fn to_native(&self, lon: f64, lat: f64) -> Option<(f64, f64)> {
        // proj4rs uses radians for geographic coordinates
        let mut point = (lon.to_radians(), lat.to_radians(), 0.0);
        transform(&self.wgs84, &self.native, &mut point).ok()?;
        if self.native_is_geographic {
            Some((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Some((point.0, point.1))
        }
    }

    fn to_geographic(&self, x: f64, y: f64) -> Option<(f64, f64)> {
        let mut point = if self.native_is_geographic {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };
        transform(&self.native, &self.wgs84, &mut point).ok()?;
        let (lon, lat) = (point.0.to_degrees(), point.1.to_degrees());
        (lon.is_finite() && lat.is_finite()).then_some((lon, lat))
    }
}

/// Projection for `epsg`, or `None` when the code is unknown.
///
/// Natively handled codes resolve to their closed-form projections.
#[must_use]
pub fn projection_for_epsg(epsg: u32) -> Option<Arc<dyn Projection>> {
    match epsg {
        4326 => Some(Arc::new(Geographic)),
        3857 | 900913 => Some(Arc::new(WebMercator)),
        _ => EpsgProjection::new(epsg)
            .ok()
            .map(|p| Arc::new(p) as Arc<dyn Projection>),
    }
}
