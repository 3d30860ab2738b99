use super::math;
use serde::{Deserialize, Serialize};

/// A geographic position in degrees, latitude positive north and longitude
/// positive east.
///
/// Angular arithmetic runs over the unit sphere, so distances produced here
/// are great-arc radians unless a conversion helper says otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GeoPoint {
    lat: f64,
    lon: f64,
}

impl GeoPoint {
    pub const fn new(lat: f64, lon: f64) -> Self { Self { lat, lon } }

    pub const fn lat(&self) -> f64 { self.lat }

    pub const fn lon(&self) -> f64 { self.lon }

    /// Computes the great-circle distance to `other` in great-arc radians.
    pub fn distance_to(&self, other: &Self) -> f64 {
        math::dot(self.to_unit(), other.to_unit()).clamp(-1.0, 1.0).acos()
    }

    /// Computes the great-circle distance to `other` in nautical miles.
    pub fn distance_nm(&self, other: &Self) -> f64 {
        self.distance_to(other) * super::EARTH_RADIUS_NM
    }

    /// Computes the great-circle distance to `other` in metres.
    pub fn distance_m(&self, other: &Self) -> f64 {
        self.distance_nm(other) * super::METERS_PER_NM
    }

    /// Computes the initial bearing from this point towards `other`.
    ///
    /// # Returns
    /// The bearing in degrees true, normalized to `[0, 360)`.
    pub fn bearing_to(&self, other: &Self) -> f64 {
        let (lat1, lon1) = (self.lat.to_radians(), self.lon.to_radians());
        let (lat2, lon2) = (other.lat.to_radians(), other.lon.to_radians());
        let d_lon = lon2 - lon1;
        let y = d_lon.sin() * lat2.cos();
        let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
        math::normalize_heading(y.atan2(x).to_degrees())
    }

    /// Projects this point along an initial course.
    ///
    /// # Arguments
    /// * `bearing` - Initial course in degrees true.
    /// * `distance` - Arc length in great-arc radians.
    ///
    /// # Returns
    /// The destination point.
    pub fn offset(&self, bearing: f64, distance: f64) -> Self {
        let lat1 = self.lat.to_radians();
        let lon1 = self.lon.to_radians();
        let brg = bearing.to_radians();
        let lat2 = (lat1.sin() * distance.cos() + lat1.cos() * distance.sin() * brg.cos()).asin();
        let lon2 = lon1
            + (brg.sin() * distance.sin() * lat1.cos())
                .atan2(distance.cos() - lat1.sin() * lat2.sin());
        Self::new(lat2.to_degrees(), math::normalize_lon(lon2.to_degrees()))
    }

    /// Converts to a unit position vector in earth-centred coordinates,
    /// x towards the prime meridian, z towards the north pole.
    pub(crate) fn to_unit(&self) -> [f64; 3] {
        let lat = self.lat.to_radians();
        let lon = self.lon.to_radians();
        [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
    }

    pub(crate) fn from_unit(v: [f64; 3]) -> Self {
        let lat = v[2].clamp(-1.0, 1.0).asin().to_degrees();
        let lon = v[1].atan2(v[0]).to_degrees();
        Self::new(lat, lon)
    }
}
