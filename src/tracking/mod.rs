//! Lateral tracking geometry. [`TrackingComputer`] turns the director state
//! and the active plan's computed paths into the numbers a CDI consumes:
//! desired track, cross-track, bearings, distances and the full-scale
//! deflection schedule.

mod computer;

#[cfg(test)]
mod tests;

pub use computer::TrackingComputer;

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Category of the current CDI full-scale deflection, the label an HSI
/// annunciates next to the deviation bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum CdiScaleLabel {
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
}

/// Where the director is along the tracked leg's turn structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display)]
pub enum TransitionMode {
    /// On the leg body.
    #[default]
    None,
    /// Rolling in onto the leg.
    Ingress,
    /// Rolling out towards the next leg.
    Egress,
}

/// Lateral director state sampled once per tick by the host. The computer
/// never steers; it reads what the director flies and describes it.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LNavState {
    /// False while the director has no leg under guidance.
    pub is_tracking: bool,
    /// Flat index of the tracked leg in the active plan.
    pub tracked_leg_index: usize,
    /// Index of the flown vector within the tracked leg's path.
    pub vector_index: usize,
    pub transition_mode: TransitionMode,
    /// Automatic sequencing is parked, as over a hold or past the MAP.
    pub is_suspended: bool,
    /// OBS course steering engaged.
    pub obs_active: bool,
    /// Selected OBS course in degrees magnetic.
    pub obs_course: f64,
    /// Director cross-track in nautical miles, positive right of course.
    /// Read verbatim while OBS is engaged.
    pub xtk_nm: f64,
}

/// One tick of lateral guidance numbers, published as a single record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackingData {
    /// True while the active plan is long enough to sequence legs.
    pub sequencing: bool,
    /// Desired track in degrees true.
    pub dtk_true: f64,
    /// Desired track in degrees magnetic.
    pub dtk_magnetic: f64,
    /// Cross-track error in nautical miles, positive right of path.
    pub xtk_nm: f64,
    /// Bearing to the active leg terminator in degrees true.
    pub waypoint_bearing_true: f64,
    /// Bearing to the active leg terminator in degrees magnetic.
    pub waypoint_bearing_magnetic: f64,
    /// Direct distance to the active leg terminator in nautical miles.
    pub waypoint_distance_nm: f64,
    /// Initial desired track of the next leg in degrees true.
    pub next_dtk_true: Option<f64>,
    /// Initial desired track of the next leg in degrees magnetic.
    pub next_dtk_magnetic: Option<f64>,
    /// Plan distance to the end of the last non-missed leg, nautical miles.
    pub destination_distance_nm: f64,
    /// Time to destination at the present ground speed.
    pub destination_ete: Option<TimeDelta>,
    /// Distance to the start of the egress turn in nautical miles,
    /// unbounded while OBS holds sequencing.
    pub distance_to_turn_nm: f64,
    /// CDI full-scale deflection in nautical miles.
    pub cdi_scale_nm: f64,
    pub cdi_scale_label: CdiScaleLabel,
}

impl Default for TrackingData {
    fn default() -> Self {
        Self {
            sequencing: false,
            dtk_true: 0.0,
            dtk_magnetic: 0.0,
            xtk_nm: 0.0,
            waypoint_bearing_true: 0.0,
            waypoint_bearing_magnetic: 0.0,
            waypoint_distance_nm: 0.0,
            next_dtk_true: None,
            next_dtk_magnetic: None,
            destination_distance_nm: 0.0,
            destination_ete: None,
            distance_to_turn_nm: 0.0,
            cdi_scale_nm: 2.0,
            cdi_scale_label: CdiScaleLabel::Enroute,
        }
    }
}
