use super::{NavSensitivity, NavSourceId, NavSourceRecord, ObsSuspMode, VorToFrom};
use crate::event_bus::{EventBus, FmsEvent};
use crate::fms::ApproachDetails;
use crate::geo::math;
use crate::nav;
use crate::tracking::{CdiScaleLabel, TrackingData};
use fixed::types::I32F32;
use std::sync::Arc;

const GPS_INDEX: usize = NavSourceId::Gps.index();

/// Waypoints ahead of or behind the FAF by more than this are outside the
/// glidepath service volume.
const GLIDEPATH_RANGE_M: f64 = 30_000.0;

/// Nominal glidepath beam angle, degrees.
const GLIDEPATH_ANGLE_DEG: f64 = 2.0;

/// Raw CDI receiver deviation spans -127..=127.
const CDI_RECEIVER_FULL_SCALE: f64 = 127.0;

/// GPS bearings further than this off the desired track read as flying away
/// from the waypoint.
const FROM_SENSE_DEG: f64 = 120.0;

/// Keeps the per-source HSI records current and selects between them.
///
/// Radio data arrives through the `set_*` host inputs, GPS data through
/// [`FmsEvent::Tracking`] updates. The tracker owns no plan state and holds
/// no locks, the host drives it from a single task.
pub struct NavSourceTracker {
    bus: Arc<EventBus>,
    records: [NavSourceRecord; 3],
    active: usize,
    sensitivity: NavSensitivity,
    obs_active: bool,
    suspended: bool,
    missed_approach_active: bool,
    heading_magnetic: f64,
    approach: ApproachDetails,
    /// Last vertical guidance sample, glidepath deviation and along-track
    /// distance to the FAF, both metres.
    vertical: Option<(f64, f64)>,
}

impl NavSourceTracker {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            records: [
                NavSourceRecord::new(NavSourceId::Nav1),
                NavSourceRecord::new(NavSourceId::Nav2),
                NavSourceRecord::new(NavSourceId::Gps),
            ],
            active: GPS_INDEX,
            sensitivity: NavSensitivity::Enroute,
            obs_active: false,
            suspended: false,
            missed_approach_active: false,
            heading_magnetic: 0.0,
            approach: ApproachDetails::default(),
            vertical: None,
        }
    }

    pub fn record(&self, source: NavSourceId) -> &NavSourceRecord {
        &self.records[source.index()]
    }

    pub fn active_source(&self) -> NavSourceId {
        self.records[self.active].source
    }

    pub fn active_record(&self) -> &NavSourceRecord {
        &self.records[self.active]
    }

    pub const fn sensitivity(&self) -> NavSensitivity {
        self.sensitivity
    }

    pub const fn missed_approach_active(&self) -> bool {
        self.missed_approach_active
    }

    /// OBS outranks SUSP when both hold sequencing.
    pub const fn obs_susp_mode(&self) -> ObsSuspMode {
        if self.obs_active {
            ObsSuspMode::Obs
        } else if self.suspended {
            ObsSuspMode::Susp
        } else {
            ObsSuspMode::None
        }
    }

    /// Switches the course needle to another source.
    ///
    /// Selecting a NAV radio tuned to a localizer slews its OBS onto the
    /// published front course so the needle comes up sensible.
    pub fn select_source(&mut self, source: NavSourceId) {
        self.active = source.index();
        self.slew_localizer();
        self.update_sensitivity();
        nav!("CDI source {}", source);
    }

    pub fn handle_event(&mut self, event: &FmsEvent) {
        match event {
            FmsEvent::Tracking(data) => self.apply_tracking(data),
            FmsEvent::ApproachDetails(details) => {
                self.approach = *details;
                if !details.is_active {
                    self.missed_approach_active = false;
                }
                self.update_sensitivity();
                self.regate_vertical();
            }
            FmsEvent::ApproachActivated => {
                if self.approach.approach_type.is_localizer_family() {
                    self.select_source(NavSourceId::Nav1);
                }
            }
            FmsEvent::SuspendSequencing(suspended) => self.suspended = *suspended,
            _ => {}
        }
    }

    /// Tuned frequency of a NAV radio.
    pub fn set_frequency(&mut self, radio: u8, frequency_mhz: I32F32) {
        if let Some(index) = radio_index(radio) {
            self.records[index].frequency_mhz = Some(frequency_mhz);
        }
    }

    /// Whether the tuned frequency sits in the localizer band.
    pub fn set_localizer_frequency(&mut self, radio: u8, is_localizer: bool) {
        let Some(index) = radio_index(radio) else {
            return;
        };
        self.records[index].is_localizer_frequency = is_localizer;
        if index == self.active {
            self.update_sensitivity();
        }
    }

    /// Localizer signal state of a NAV radio.
    ///
    /// A localizer coming alive on the active radio slews its OBS onto the
    /// front course, the same as selecting the radio fresh.
    pub fn set_localizer(&mut self, radio: u8, has_localizer: bool, course: Option<f64>) {
        let Some(index) = radio_index(radio) else {
            return;
        };
        self.records[index].has_localizer = has_localizer;
        self.records[index].localizer_course = course;
        if index == self.active {
            if has_localizer {
                self.slew_localizer();
            }
            self.update_sensitivity();
        }
    }

    /// Raw receiver CDI deflection in -127..=127, none when no signal.
    pub fn set_cdi_deviation(&mut self, radio: u8, raw: Option<f64>) {
        if let Some(index) = radio_index(radio) {
            self.records[index].deviation = raw.map(|r| r / CDI_RECEIVER_FULL_SCALE);
            self.records[index].valid = raw.is_some();
        }
    }

    pub fn set_to_from(&mut self, radio: u8, to_from: VorToFrom) {
        if let Some(index) = radio_index(radio) {
            self.records[index].to_from = to_from;
        }
    }

    /// Glideslope signal state of a NAV radio, deviation already normalized.
    pub fn set_glideslope(&mut self, radio: u8, has_glideslope: bool, deviation: Option<f64>) {
        if let Some(index) = radio_index(radio) {
            self.records[index].has_glideslope = has_glideslope;
            self.records[index].glideslope_deviation = deviation;
        }
    }

    pub fn set_dme(&mut self, radio: u8, has_dme: bool) {
        if let Some(index) = radio_index(radio) {
            self.records[index].has_dme = has_dme;
        }
    }

    /// OBS course selected on a NAV radio, degrees magnetic.
    pub fn set_obs(&mut self, radio: u8, course: f64) {
        if let Some(index) = radio_index(radio) {
            self.records[index].course = Some(math::normalize_heading(course));
        }
    }

    /// GPS OBS hold engaged or released.
    pub fn set_obs_active(&mut self, active: bool) {
        self.obs_active = active;
    }

    /// Current magnetic heading, the course fallback while no leg is tracked.
    pub fn set_heading(&mut self, heading_magnetic: f64) {
        self.heading_magnetic = heading_magnetic;
    }

    /// Vertical guidance sample from the glidepath channel.
    ///
    /// `deviation_m` is the height above the nominal path, `to_faf_m` the
    /// along-track distance to the FAF. Gating against the loaded approach
    /// happens here, a sample alone never shows a glidepath.
    pub fn set_vertical_guidance(&mut self, deviation_m: f64, to_faf_m: f64) {
        self.vertical = Some((deviation_m, to_faf_m));
        self.regate_vertical();
    }

    fn apply_tracking(&mut self, data: &TrackingData) {
        let heading = self.heading_magnetic;
        let record = &mut self.records[GPS_INDEX];
        record.valid = data.sequencing;
        record.deviation_scale = data.cdi_scale_nm;
        record.scale_label = Some(data.cdi_scale_label);
        record.deviation = if data.cdi_scale_nm > 0.0 {
            Some(-data.xtk_nm / data.cdi_scale_nm)
        } else {
            None
        };
        record.bearing = Some(data.waypoint_bearing_magnetic);
        record.distance_nm = Some(data.waypoint_distance_nm);
        record.course = Some(if data.sequencing {
            data.dtk_magnetic
        } else {
            heading
        });
        record.to_from = if !data.sequencing {
            VorToFrom::Off
        } else if math::angle_diff(data.waypoint_bearing_magnetic, data.dtk_magnetic).abs()
            > FROM_SENSE_DEG
        {
            VorToFrom::From
        } else {
            VorToFrom::To
        };
        self.update_sensitivity();
    }

    fn update_sensitivity(&mut self) {
        let source = self.records[self.active].source;
        self.sensitivity = match source {
            NavSourceId::Gps => {
                let label = self.records[GPS_INDEX].scale_label.unwrap_or_default();
                self.gps_sensitivity(label)
            }
            NavSourceId::Nav1 | NavSourceId::Nav2 => {
                if self.records[self.active].is_localizer_frequency {
                    NavSensitivity::Ils
                } else {
                    NavSensitivity::Vor
                }
            }
        };
    }

    fn gps_sensitivity(&mut self, label: CdiScaleLabel) -> NavSensitivity {
        match label {
            CdiScaleLabel::Departure => NavSensitivity::Departure,
            CdiScaleLabel::Terminal => NavSensitivity::Terminal,
            CdiScaleLabel::Enroute => NavSensitivity::Enroute,
            CdiScaleLabel::Oceanic => NavSensitivity::Oceanic,
            CdiScaleLabel::Lnav => NavSensitivity::Lnav,
            CdiScaleLabel::LnavPlusV => NavSensitivity::LnavPlusV,
            CdiScaleLabel::LnavVnav => NavSensitivity::LnavVnav,
            CdiScaleLabel::Lp => NavSensitivity::Lp,
            CdiScaleLabel::LpPlusV => NavSensitivity::LpPlusV,
            CdiScaleLabel::Lpv => NavSensitivity::Lpv,
            CdiScaleLabel::Visual => NavSensitivity::Visual,
            CdiScaleLabel::MissedApproach => {
                self.missed_approach_active = true;
                NavSensitivity::MissedApproach
            }
        }
    }

    fn slew_localizer(&mut self) {
        let record = self.records[self.active];
        let Some(radio) = record.source.radio() else {
            return;
        };
        if record.is_localizer_frequency && record.has_localizer {
            if let Some(course) = record.localizer_course {
                let course = course.round();
                self.records[self.active].course = Some(course);
                self.bus.publish(FmsEvent::SlewObs { radio, course });
                nav!("OBS slewed to localizer course {course:.0} on NAV{radio}");
            }
        }
    }

    /// Applies the glidepath gate to the GPS record.
    ///
    /// Vertical guidance shows only for an active straight-in GPS class
    /// approach with the FAF inside the service range.
    fn regate_vertical(&mut self) {
        let gated = self
            .vertical
            .filter(|(_, to_faf_m)| {
                self.approach.glidepath_available() && to_faf_m.abs() < GLIDEPATH_RANGE_M
            });
        let record = &mut self.records[GPS_INDEX];
        match gated {
            Some((deviation_m, to_faf_m)) => {
                record.has_glideslope = true;
                record.glideslope_deviation = Some(glidepath_deviation(deviation_m, to_faf_m));
            }
            None => {
                record.has_glideslope = false;
                record.glideslope_deviation = None;
            }
        }
    }
}

fn radio_index(radio: u8) -> Option<usize> {
    match radio {
        1 => Some(NavSourceId::Nav1.index()),
        2 => Some(NavSourceId::Nav2.index()),
        _ => None,
    }
}

/// Normalizes a glidepath deviation against a beam that widens with distance
/// to the FAF, clamped between 200 m and 1000 m full scale. Positive output
/// means fly up.
fn glidepath_deviation(deviation_m: f64, to_faf_m: f64) -> f64 {
    let full_scale = (GLIDEPATH_ANGLE_DEG.to_radians().tan() * to_faf_m.abs()).clamp(200.0, 1000.0);
    deviation_m / -full_scale
}
