use super::calculator::LegCalculations;
use crate::geo::GeoPoint;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// ARINC 424 path terminator of a leg. Every consumer that interprets leg
/// geometry matches on this exhaustively, so adding a variant surfaces every
/// site that needs a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display)]
pub enum LegType {
    #[default]
    Unknown,
    /// Arc to fix.
    AF,
    /// Course to altitude.
    CA,
    /// Course to DME distance.
    CD,
    /// Course to fix.
    CF,
    /// Course to intercept.
    CI,
    /// Course to radial.
    CR,
    /// Direct to fix.
    DF,
    /// Fix to altitude.
    FA,
    /// Fix to distance on course.
    FC,
    /// Fix to DME distance.
    FD,
    /// Fix to manual termination.
    FM,
    /// Hold to altitude.
    HA,
    /// Hold, single circuit to fix.
    HF,
    /// Hold to manual termination.
    HM,
    /// Initial fix.
    IF,
    /// Procedure turn.
    PI,
    /// Constant radius arc to fix.
    RF,
    /// Track to fix.
    TF,
    /// Heading to altitude.
    VA,
    /// Heading to DME distance.
    VD,
    /// Heading to intercept.
    VI,
    /// Heading to manual termination.
    VM,
    /// Heading to radial.
    VR,
    /// Lateral discontinuity, sequencing stops.
    Discontinuity,
    /// Lateral discontinuity that sequencing may pass through.
    ThruDiscontinuity,
}

impl LegType {
    /// Whether the leg terminates at a published fix the plan can join at.
    pub const fn is_to_fix(self) -> bool {
        matches!(self, Self::IF | Self::TF | Self::DF | Self::CF)
    }

    pub const fn is_hold(self) -> bool {
        matches!(self, Self::HA | Self::HF | Self::HM)
    }

    pub const fn is_discontinuity(self) -> bool {
        matches!(self, Self::Discontinuity | Self::ThruDiscontinuity)
    }
}

/// Turn direction published with hold and arc legs.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display,
)]
pub enum LegTurnDirection {
    #[default]
    None,
    Left,
    Right,
    Either,
}

/// Bit set marking the role a fix plays inside a procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FixTypeFlags(u32);

impl FixTypeFlags {
    pub const NONE: Self = Self(0);
    /// Initial approach fix.
    pub const IAF: Self = Self(1);
    /// Intermediate fix.
    pub const IF: Self = Self(2);
    /// Missed approach point.
    pub const MAP: Self = Self(4);
    /// Final approach fix.
    pub const FAF: Self = Self(8);
    /// Missed approach holding point.
    pub const MAHP: Self = Self(16);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for FixTypeFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Bit set describing how a leg entered the plan rather than what it flies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LegFlags(u32);

impl LegFlags {
    pub const NONE: Self = Self(0);
    /// Part of an off-airway direct-to sequence.
    pub const DIRECT_TO: Self = Self(1);
    /// Belongs to the missed approach portion of the plan.
    pub const MISSED_APPROACH: Self = Self(2);
    /// Synthesized while flying an OBS course.
    pub const OBS: Self = Self(4);
    /// Synthesized vectors-to-final leg.
    pub const VECTORS_TO_FINAL: Self = Self(8);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl std::ops::BitOr for LegFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Kind of altitude restriction carried by a leg.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display,
)]
pub enum AltitudeRestrictionType {
    #[default]
    Unused,
    At,
    AtOrAbove,
    AtOrBelow,
    Between,
}

/// Vertical constraint attached to a leg, altitudes in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VerticalData {
    pub alt_desc: AltitudeRestrictionType,
    pub altitude1: f64,
    pub altitude2: f64,
}

/// A raw flight plan leg as published in procedures or synthesized by the
/// engine. Courses are degrees magnetic unless `true_degrees` is set,
/// distances and altitudes are metres.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlightPlanLeg {
    pub leg_type: LegType,
    /// Ident of the terminating fix, empty for legs without one.
    pub fix_icao: String,
    /// Ident of the referenced navaid or arc centre, empty when unused.
    pub origin_icao: String,
    /// Position of the terminating fix when known at build time.
    pub pos: Option<GeoPoint>,
    pub course: f64,
    pub true_degrees: bool,
    /// Leg length for distance-terminated legs and hold circuits.
    pub distance: f64,
    /// Hold circuit length is given in minutes instead of metres.
    pub distance_minutes: bool,
    pub turn_direction: LegTurnDirection,
    pub fix_type_flags: FixTypeFlags,
    pub alt_desc: AltitudeRestrictionType,
    pub altitude1: f64,
    pub altitude2: f64,
}

impl FlightPlanLeg {
    /// Builds the display ident for a leg, falling back to a type-specific
    /// label when the leg has no terminating fix.
    pub fn display_ident(&self) -> String {
        const METERS_PER_FOOT: f64 = 0.3048;
        match self.leg_type {
            LegType::CA | LegType::VA | LegType::FA => {
                format!("{}FT", (self.altitude1 / METERS_PER_FOOT).round())
            }
            LegType::CI | LegType::VI | LegType::PI => "INTC".to_string(),
            LegType::CR | LegType::VR => "RADIAL".to_string(),
            LegType::CD | LegType::VD | LegType::FD => "DME".to_string(),
            LegType::FM | LegType::VM => "MANSEQ".to_string(),
            LegType::Discontinuity | LegType::ThruDiscontinuity => "DISCO".to_string(),
            LegType::Unknown
            | LegType::AF
            | LegType::CF
            | LegType::DF
            | LegType::FC
            | LegType::HA
            | LegType::HF
            | LegType::HM
            | LegType::IF
            | LegType::RF
            | LegType::TF => self.fix_icao.clone(),
        }
    }
}

/// A leg as resident in a plan: the published leg plus the state the plan
/// keeps for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegDefinition {
    pub name: String,
    pub leg: FlightPlanLeg,
    pub flags: LegFlags,
    pub vertical: VerticalData,
    /// Never crosses the sync wire, the receiving side recalculates.
    #[serde(skip)]
    pub calculated: Option<LegCalculations>,
}

impl LegDefinition {
    pub fn new(leg: FlightPlanLeg, flags: LegFlags) -> Self {
        let name = leg.display_ident();
        let vertical = VerticalData {
            alt_desc: leg.alt_desc,
            altitude1: leg.altitude1,
            altitude2: leg.altitude2,
        };
        Self { name, leg, flags, vertical, calculated: None }
    }
}
