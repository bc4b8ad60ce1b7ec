pub mod projection;

/// Axis-aligned rectangle in a coordinate reference system.
///
/// `miny` is the southern/bottom edge and `maxy` the northern/top edge,
/// whatever the pixel row order of the raster it describes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub minx: f64,
    pub miny: f64,
    pub maxx: f64,
    pub maxy: f64,
}

impl BoundingBox {
    #[must_use]
    pub fn new(minx: f64, miny: f64, maxx: f64, maxy: f64) -> Self {
        Self { minx, miny, maxx, maxy }
    }

    #[inline]
    #[must_use]
    pub fn width(&self) -> f64 {
        self.maxx - self.minx
    }

    #[inline]
    #[must_use]
    pub fn height(&self) -> f64 {
        self.maxy - self.miny
    }

    /// Inclusive containment test.
    #[inline]
    #[must_use]
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.minx && x <= self.maxx && y >= self.miny && y <= self.maxy
    }

    /// Geographic rectangles whose west edge lies east of their east edge
    /// cross the antimeridian; unwrap them so `maxx > minx`.
    #[must_use]
    pub fn unwrap_antimeridian(self) -> Self {
        if self.maxx < self.minx {
            Self { maxx: self.maxx + 360.0, ..self }
        } else {
            self
        }
    }

    /// Sub-rectangle selected by fractional pixel-space bounds, where
    /// `fy0`/`fy1` count downward from the top edge.
    #[must_use]
    pub fn sub_rect(&self, fx0: f64, fy0: f64, fx1: f64, fy1: f64) -> Self {
        let w = self.width();
        let h = self.height();
        Self {
            minx: self.minx + fx0 * w,
            maxx: self.minx + fx1 * w,
            maxy: self.maxy - fy0 * h,
            miny: self.maxy - fy1 * h,
        }
    }

    /// Smallest box enclosing all `points`.
    #[must_use]
    pub fn enclosing(points: &[(f64, f64)]) -> Option<Self> {
        let (first, rest) = points.split_first()?;
        let mut bbox = Self::new(first.0, first.1, first.0, first.1);
        for &(x, y) in rest {
            bbox.minx = bbox.minx.min(x);
            bbox.maxx = bbox.maxx.max(x);
            bbox.miny = bbox.miny.min(y);
            bbox.maxy = bbox.maxy.max(y);
        }
        Some(bbox)
    }

    /// Corners in (west,north), (east,north), (east,south), (west,south) order.
    #[must_use]
    pub fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.minx, self.maxy),
            (self.maxx, self.maxy),
            (self.maxx, self.miny),
            (self.minx, self.miny),
        ]
    }
}
