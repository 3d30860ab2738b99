mod circle;
pub(crate) mod math;
mod point;

#[cfg(test)]
mod tests;

pub use circle::GeoCircle;
pub use point::GeoPoint;

/// Mean earth radius in nautical miles, used to convert great-arc radians.
pub const EARTH_RADIUS_NM: f64 = 3440.065;

/// Metres per nautical mile.
pub const METERS_PER_NM: f64 = 1852.0;
