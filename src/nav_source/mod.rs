//! Navigation source selection for the HSI.
//!
//! One [`NavSourceRecord`] per source (two NAV radios and the GPS channel)
//! holds everything the course needle consumes. [`NavSourceTracker`] keeps
//! the records current from host radio inputs and bus events, decides the
//! displayed sensitivity, and publishes OBS slew intents when a localizer
//! is selected.

mod tracker;

#[cfg(test)]
mod tests;

pub use tracker::NavSourceTracker;

use crate::tracking::CdiScaleLabel;
use fixed::types::I32F32;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Selectable course guidance source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
pub enum NavSourceId {
    #[strum(serialize = "NAV1")]
    Nav1,
    #[strum(serialize = "NAV2")]
    Nav2,
    #[strum(serialize = "GPS")]
    Gps,
}

impl NavSourceId {
    /// Radio index behind a NAV source, none for GPS.
    pub const fn radio(self) -> Option<u8> {
        match self {
            Self::Nav1 => Some(1),
            Self::Nav2 => Some(2),
            Self::Gps => None,
        }
    }

    pub(super) const fn index(self) -> usize {
        match self {
            Self::Nav1 => 0,
            Self::Nav2 => 1,
            Self::Gps => 2,
        }
    }
}

/// Sensitivity annunciation shown next to the course needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum NavSensitivity {
    #[strum(serialize = "DPRT")]
    Departure,
    #[strum(serialize = "TERM")]
    Terminal,
    #[default]
    #[strum(serialize = "ENR")]
    Enroute,
    #[strum(serialize = "OCN")]
    Oceanic,
    #[strum(serialize = "LNAV")]
    Lnav,
    #[strum(serialize = "LNAV+V")]
    LnavPlusV,
    #[strum(serialize = "L/VNAV")]
    LnavVnav,
    #[strum(serialize = "LP")]
    Lp,
    #[strum(serialize = "LP+V")]
    LpPlusV,
    #[strum(serialize = "LPV")]
    Lpv,
    #[strum(serialize = "VISUAL")]
    Visual,
    #[strum(serialize = "MAPR")]
    MissedApproach,
    #[strum(serialize = "VOR")]
    Vor,
    #[strum(serialize = "ILS")]
    Ils,
}

/// To/from sense of the deviation needle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum VorToFrom {
    #[default]
    Off,
    To,
    From,
}

/// Sequencing hold annunciation. OBS outranks SUSP when both apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum ObsSuspMode {
    #[default]
    None,
    #[strum(serialize = "SUSP")]
    Susp,
    #[strum(serialize = "OBS")]
    Obs,
}

/// Live state of one navigation source.
///
/// NAV radio fields come straight from host receiver inputs. The GPS record
/// is derived from tracking updates on the bus.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NavSourceRecord {
    pub source: NavSourceId,
    /// Whether the source carries usable deviation data.
    pub valid: bool,
    /// Bearing to the station or active waypoint, degrees magnetic.
    pub bearing: Option<f64>,
    pub distance_nm: Option<f64>,
    /// Lateral deviation in full-scale units, positive right of course.
    pub deviation: Option<f64>,
    /// Full-scale deflection in nautical miles.
    pub deviation_scale: f64,
    /// Scale category behind GPS sensitivity, none for NAV radios.
    pub scale_label: Option<CdiScaleLabel>,
    pub to_from: VorToFrom,
    /// Selected course, degrees magnetic. OBS-set for radios, desired track
    /// for GPS.
    pub course: Option<f64>,
    pub is_localizer_frequency: bool,
    pub has_localizer: bool,
    pub localizer_course: Option<f64>,
    pub has_glideslope: bool,
    /// Vertical deviation in full-scale units, positive fly-up.
    pub glideslope_deviation: Option<f64>,
    pub has_dme: bool,
    pub frequency_mhz: Option<I32F32>,
}

impl NavSourceRecord {
    pub(super) fn new(source: NavSourceId) -> Self {
        Self {
            source,
            valid: false,
            bearing: None,
            distance_nm: None,
            deviation: None,
            deviation_scale: 1.0,
            scale_label: None,
            to_from: VorToFrom::Off,
            course: source.radio().map(|_| 0.0),
            is_localizer_frequency: false,
            has_localizer: false,
            localizer_course: None,
            has_glideslope: false,
            glideslope_deviation: None,
            has_dme: false,
            frequency_mhz: None,
        }
    }
}
