use crate::geo::{GeoPoint, math};
use serde::{Deserialize, Serialize};

/// Ownship state sampled once per update tick and shared behind a lock.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AircraftState {
    pub pos: GeoPoint,
    pub altitude_m: f64,
    /// Heading in degrees true.
    pub heading_true: f64,
    pub ground_speed_kt: f64,
    /// Local magnetic variation in degrees, positive east.
    pub magvar: f64,
    pub on_ground: bool,
}

impl AircraftState {
    /// Heading in degrees magnetic.
    pub fn heading_mag(&self) -> f64 {
        math::true_to_magnetic(self.heading_true, self.magvar)
    }
}
