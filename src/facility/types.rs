use super::runway::{OneWayRunway, RunwayDesignator};
use crate::flight_plan::FlightPlanLeg;
use crate::geo::GeoPoint;
use fixed::types::I32F32;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// A tuned radio frequency. Fixed point so that equality survives
/// serialization and channel-spacing comparisons stay exact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacilityFrequency {
    pub name: String,
    pub mhz: I32F32,
}

/// Ground equipment class of an instrument approach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
pub enum ApproachType {
    #[default]
    Unknown,
    Gps,
    Vor,
    Ndb,
    Ils,
    Localizer,
    Sdf,
    Lda,
    VorDme,
    NdbDme,
    Rnav,
    LocalizerBackCourse,
    Visual,
}

impl ApproachType {
    /// Approaches flown against a localizer rather than the GPS path.
    pub const fn is_localizer_family(self) -> bool {
        matches!(
            self,
            Self::Ils | Self::Localizer | Self::Lda | Self::Sdf | Self::LocalizerBackCourse
        )
    }

    /// Approaches for which the computer may generate a glidepath.
    pub const fn supports_glidepath(self) -> bool {
        matches!(self, Self::Gps | Self::Rnav | Self::Visual)
    }
}

/// Bit set of the RNAV minima an approach is published with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RnavTypeFlags(u32);

impl RnavTypeFlags {
    pub const NONE: Self = Self(0);
    pub const LNAV: Self = Self(1);
    pub const LNAV_VNAV: Self = Self(2);
    pub const LP: Self = Self(4);
    pub const LPV: Self = Self(8);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Picks the best service level out of the published set, LPV down
    /// to LNAV.
    pub const fn best(self) -> Self {
        if self.contains(Self::LPV) {
            Self::LPV
        } else if self.contains(Self::LNAV_VNAV) {
            Self::LNAV_VNAV
        } else if self.contains(Self::LP) {
            Self::LP
        } else if self.contains(Self::LNAV) {
            Self::LNAV
        } else {
            Self::NONE
        }
    }
}

impl std::ops::BitOr for RnavTypeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A named transition of a departure, arrival or approach.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcedureTransition {
    pub name: String,
    pub legs: Vec<FlightPlanLeg>,
}

/// Runway-specific leg sequence of a departure or arrival.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunwayTransition {
    pub runway_number: u8,
    pub runway_designator: RunwayDesignator,
    pub legs: Vec<FlightPlanLeg>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DepartureProcedure {
    pub name: String,
    pub common_legs: Vec<FlightPlanLeg>,
    pub runway_transitions: Vec<RunwayTransition>,
    pub enroute_transitions: Vec<ProcedureTransition>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ArrivalProcedure {
    pub name: String,
    pub common_legs: Vec<FlightPlanLeg>,
    pub runway_transitions: Vec<RunwayTransition>,
    pub enroute_transitions: Vec<ProcedureTransition>,
}

/// A published instrument approach. A runway number of zero marks a
/// circling-only procedure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ApproachProcedure {
    pub name: String,
    pub approach_type: ApproachType,
    pub runway_number: u8,
    pub runway_designator: RunwayDesignator,
    pub transitions: Vec<ProcedureTransition>,
    pub final_legs: Vec<FlightPlanLeg>,
    pub missed_legs: Vec<FlightPlanLeg>,
    pub rnav_type_flags: RnavTypeFlags,
}

impl ApproachProcedure {
    pub const fn is_circling(&self) -> bool {
        self.runway_number == 0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirportFacility {
    pub icao: String,
    pub name: String,
    pub pos: GeoPoint,
    pub runways: Vec<OneWayRunway>,
    pub departures: Vec<DepartureProcedure>,
    pub arrivals: Vec<ArrivalProcedure>,
    pub approaches: Vec<ApproachProcedure>,
    pub frequencies: Vec<FacilityFrequency>,
}

impl AirportFacility {
    /// Field elevation in metres, taken from the first runway.
    pub fn elevation_m(&self) -> f64 {
        self.runways.first().map_or(0.0, |runway| runway.elevation_m)
    }

    pub fn runway(&self, designation: &str) -> Option<&OneWayRunway> {
        self.runways.iter().find(|runway| runway.designation == designation)
    }

    pub fn runway_for(&self, number: u8, designator: RunwayDesignator) -> Option<&OneWayRunway> {
        self.runways.iter().find(|runway| runway.matches(number, designator))
    }

    /// The frequency to tune for an approach, the localizer of its runway
    /// for localizer-family procedures.
    pub fn approach_frequency(&self, approach: &ApproachProcedure) -> Option<FacilityFrequency> {
        if !approach.approach_type.is_localizer_family() {
            return None;
        }
        self.runway_for(approach.runway_number, approach.runway_designator)
            .and_then(|runway| runway.ils_frequency.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaypointFacility {
    pub icao: String,
    pub pos: GeoPoint,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VorFacility {
    pub icao: String,
    pub pos: GeoPoint,
    pub frequency: FacilityFrequency,
    /// Station magnetic variation in degrees, positive east.
    pub magnetic_variation: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NdbFacility {
    pub icao: String,
    pub pos: GeoPoint,
    pub frequency: FacilityFrequency,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Facility {
    Airport(AirportFacility),
    Waypoint(WaypointFacility),
    Vor(VorFacility),
    Ndb(NdbFacility),
}

impl Facility {
    pub fn ident(&self) -> &str {
        match self {
            Self::Airport(f) => &f.icao,
            Self::Waypoint(f) => &f.icao,
            Self::Vor(f) => &f.icao,
            Self::Ndb(f) => &f.icao,
        }
    }

    pub fn pos(&self) -> GeoPoint {
        match self {
            Self::Airport(f) => f.pos,
            Self::Waypoint(f) => f.pos,
            Self::Vor(f) => f.pos,
            Self::Ndb(f) => f.pos,
        }
    }

    pub fn as_airport(&self) -> Option<&AirportFacility> {
        match self {
            Self::Airport(f) => Some(f),
            _ => None,
        }
    }
}

/// One fix on an airway, in airway order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AirwayFix {
    pub ident: String,
    pub pos: GeoPoint,
}

/// An airway as an ordered fix chain.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Airway {
    pub name: String,
    pub fixes: Vec<AirwayFix>,
}

impl Airway {
    pub fn position_of(&self, ident: &str) -> Option<usize> {
        self.fixes.iter().position(|fix| fix.ident == ident)
    }
}
