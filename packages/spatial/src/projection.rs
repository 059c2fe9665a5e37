//! Spherical Lambert azimuthal equal-area projection.
//!
//! Areas and distances are measured in this planar frame rather than in
//! raw degrees, so a square kilometre in Hokkaido and one in Okinawa are
//! comparable. The projection is centred on the national extent; away
//! from the centre shapes distort but areas stay exact on the sphere.

use geo::{Coord, MapCoords, MultiPolygon, Point};

/// Radius of the sphere with the same surface area as the GRS80 ellipsoid.
pub const AUTHALIC_RADIUS_M: f64 = 6_371_007.181;

/// Default projection centre: longitude 137°E, latitude 38°N.
pub const JAPAN_CENTER: (f64, f64) = (137.0, 38.0);

/// Forward Lambert azimuthal equal-area projection on the authalic sphere.
///
/// Input coordinates are WGS84 longitude/latitude in degrees; output is
/// easting/northing in metres relative to the projection centre.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EqualAreaProjection {
    center_lon: f64,
    center_lat: f64,
    lon0: f64,
    sin_lat0: f64,
    cos_lat0: f64,
}

impl EqualAreaProjection {
    /// Creates a projection centred on (`center_lon`, `center_lat`) degrees.
    #[must_use]
    pub fn new(center_lon: f64, center_lat: f64) -> Self {
        let lat0 = center_lat.to_radians();
        Self {
            center_lon,
            center_lat,
            lon0: center_lon.to_radians(),
            sin_lat0: lat0.sin(),
            cos_lat0: lat0.cos(),
        }
    }

    /// The projection used for national-scale Japanese data.
    #[must_use]
    pub fn japan() -> Self {
        Self::new(JAPAN_CENTER.0, JAPAN_CENTER.1)
    }

    /// Returns the projection centre as (longitude, latitude) degrees.
    #[must_use]
    pub const fn center(&self) -> (f64, f64) {
        (self.center_lon, self.center_lat)
    }

    /// Projects one longitude/latitude coordinate to metres.
    #[must_use]
    pub fn forward(&self, coord: Coord<f64>) -> Coord<f64> {
        let lat = coord.y.to_radians();
        let dlon = coord.x.to_radians() - self.lon0;
        let (sin_lat, cos_lat) = lat.sin_cos();
        let (sin_dlon, cos_dlon) = dlon.sin_cos();

        // Guard the antipode, where the projection is undefined.
        let denom = (1.0 + self.sin_lat0 * sin_lat + self.cos_lat0 * cos_lat * cos_dlon)
            .max(f64::EPSILON);
        let k = (2.0 / denom).sqrt();

        Coord {
            x: AUTHALIC_RADIUS_M * k * cos_lat * sin_dlon,
            y: AUTHALIC_RADIUS_M * k * (self.cos_lat0 * sin_lat - self.sin_lat0 * cos_lat * cos_dlon),
        }
    }

    /// Projects a longitude/latitude point.
    #[must_use]
    pub fn project_point(&self, lon: f64, lat: f64) -> Point<f64> {
        Point(self.forward(Coord { x: lon, y: lat }))
    }

    /// Projects every vertex of a multipolygon.
    #[must_use]
    pub fn project(&self, polygon: &MultiPolygon<f64>) -> MultiPolygon<f64> {
        polygon.map_coords(|c| self.forward(c))
    }
}

impl Default for EqualAreaProjection {
    fn default() -> Self {
        Self::japan()
    }
}
