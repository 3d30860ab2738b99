use super::leg::{FlightPlanLeg, LegFlags, LegType, LegTurnDirection};
use crate::facility::{FacilityError, FacilityLoader};
use crate::geo::{self, GeoCircle, GeoPoint, math};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::sync::Arc;

/// Fallback projection length for legs that terminate on an altitude,
/// intercept or manual condition rather than a fix.
const OPEN_LEG_PROJECTION_NM: f64 = 2.0;

/// Back-projection length for a course-to-fix leg with no predecessor, as
/// synthesized for vectors-to-final.
const COURSE_LEG_ANCHOR_NM: f64 = 10.0;

/// Nominal hold leg length when the circuit is published in minutes.
const HOLD_LEG_NM: f64 = 3.0;

/// Bit set describing the role of a single path vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VectorFlags(u32);

impl VectorFlags {
    pub const NONE: Self = Self(0);
    pub const HOLD_INBOUND: Self = Self(1);
    pub const HOLD_OUTBOUND: Self = Self(2);
    pub const TURN: Self = Self(4);

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl std::ops::BitOr for VectorFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One flyable piece of a leg path: a stretch of a great or small circle
/// between two points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlightPathVector {
    pub flags: VectorFlags,
    pub start: GeoPoint,
    pub end: GeoPoint,
    pub circle: GeoCircle,
    pub distance_m: f64,
}

/// Computed geometry of one leg.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LegCalculations {
    pub start: Option<GeoPoint>,
    pub end: Option<GeoPoint>,
    /// Initial desired track in degrees magnetic.
    pub initial_dtk: Option<f64>,
    /// Length of the leg path in metres.
    pub distance_m: f64,
    /// Running plan distance through this leg in metres.
    pub cumulative_distance_m: f64,
    pub flight_path: Vec<FlightPathVector>,
    /// Turn anticipation vectors rolling out of this leg, when the
    /// calculator models them.
    pub egress: Vec<FlightPathVector>,
}

/// Immutable view of one plan leg handed to a calculator.
#[derive(Debug, Clone)]
pub struct LegSnapshot {
    pub leg: FlightPlanLeg,
    pub flags: LegFlags,
    pub calculated: Option<LegCalculations>,
}

/// A full-plan snapshot plus the window to recompute. Snapshots are taken
/// under the plan lock and the request is then evaluated without it.
#[derive(Debug, Clone)]
pub struct CalculateRequest {
    pub snapshots: Vec<LegSnapshot>,
    pub from_index: usize,
    /// Present position, anchoring legs with no predecessor path.
    pub position: GeoPoint,
    /// Local magnetic variation in degrees, positive east.
    pub magvar: f64,
}

/// Computes lateral geometry for a window of plan legs.
///
/// Implementations resolve fixes through a facility source and may model
/// turn anticipation with arbitrary fidelity. The engine only relies on the
/// per-leg start, end, track and distance fields being filled for legs that
/// have enough data to carry a path.
#[async_trait]
pub trait FlightPathCalculator: Send + Sync {
    async fn calculate(
        &self,
        request: CalculateRequest,
    ) -> Result<Vec<LegCalculations>, FacilityError>;
}

/// Great-circle calculator used when no airframe-specific implementation is
/// wired in. Altitude, intercept and manual legs are approximated with short
/// projections along their published course, holds with their inbound leg
/// only, and no turn anticipation is produced.
pub struct DefaultFlightPathCalculator {
    loader: Arc<dyn FacilityLoader>,
}

impl DefaultFlightPathCalculator {
    pub fn new(loader: Arc<dyn FacilityLoader>) -> Self {
        Self { loader }
    }

    async fn resolve(&self, ident: &str) -> Result<Option<GeoPoint>, FacilityError> {
        if ident.is_empty() {
            return Ok(None);
        }
        Ok(Some(self.loader.get_facility(ident).await?.pos()))
    }

    async fn resolve_fix(&self, leg: &FlightPlanLeg) -> Result<Option<GeoPoint>, FacilityError> {
        if let Some(pos) = leg.pos {
            return Ok(Some(pos));
        }
        self.resolve(&leg.fix_icao).await
    }

    fn course_true(leg: &FlightPlanLeg, magvar: f64) -> f64 {
        if leg.true_degrees {
            leg.course
        } else {
            math::magnetic_to_true(leg.course, magvar)
        }
    }

    /// Straight vector between two points, or none when they coincide.
    fn track_between(start: GeoPoint, end: GeoPoint, magvar: f64) -> LegCalculations {
        let distance_m = start.distance_m(&end);
        if distance_m < 1.0 {
            return LegCalculations {
                start: Some(start),
                end: Some(end),
                ..Default::default()
            };
        }
        let circle = GeoCircle::great_circle_through(&start, &end);
        LegCalculations {
            start: Some(start),
            end: Some(end),
            initial_dtk: Some(math::true_to_magnetic(circle.bearing_at(&start), magvar)),
            distance_m,
            cumulative_distance_m: 0.0,
            flight_path: vec![FlightPathVector {
                flags: VectorFlags::NONE,
                start,
                end,
                circle,
                distance_m,
            }],
            egress: Vec::new(),
        }
    }

    /// Projects a course leg a fixed length from its anchor point.
    fn project_course(start: GeoPoint, course_true: f64, distance_m: f64, magvar: f64) -> LegCalculations {
        let end = start.offset(course_true, distance_m / geo::METERS_PER_NM / geo::EARTH_RADIUS_NM);
        let mut calc = Self::track_between(start, end, magvar);
        calc.initial_dtk = Some(math::true_to_magnetic(course_true, magvar));
        calc
    }

    fn arc_to_fix(
        center: GeoPoint,
        start: GeoPoint,
        end: GeoPoint,
        turn: LegTurnDirection,
        magvar: f64,
    ) -> LegCalculations {
        let radius = center.distance_to(&end);
        let circle = match turn {
            LegTurnDirection::Right => GeoCircle::small_circle(&center, PI - radius),
            LegTurnDirection::None | LegTurnDirection::Left | LegTurnDirection::Either => {
                GeoCircle::small_circle(&center, radius)
            }
        };
        let entry = circle.closest(&start);
        let distance_m =
            circle.arc_length_between(&entry, &end) * geo::EARTH_RADIUS_NM * geo::METERS_PER_NM;
        LegCalculations {
            start: Some(entry),
            end: Some(end),
            initial_dtk: Some(math::true_to_magnetic(circle.bearing_at(&entry), magvar)),
            distance_m,
            cumulative_distance_m: 0.0,
            flight_path: vec![FlightPathVector {
                flags: VectorFlags::TURN,
                start: entry,
                end,
                circle,
                distance_m,
            }],
            egress: Vec::new(),
        }
    }

    fn hold_inbound(fix: GeoPoint, leg: &FlightPlanLeg, magvar: f64) -> LegCalculations {
        let leg_len_m = if leg.distance_minutes || leg.distance <= 0.0 {
            HOLD_LEG_NM * geo::METERS_PER_NM
        } else {
            leg.distance
        };
        let inbound_true = Self::course_true(leg, magvar);
        let start = fix.offset(
            math::normalize_heading(inbound_true + 180.0),
            leg_len_m / geo::METERS_PER_NM / geo::EARTH_RADIUS_NM,
        );
        let circle = GeoCircle::great_circle_through(&start, &fix);
        LegCalculations {
            start: Some(start),
            end: Some(fix),
            initial_dtk: Some(math::true_to_magnetic(inbound_true, magvar)),
            distance_m: leg_len_m,
            cumulative_distance_m: 0.0,
            flight_path: vec![FlightPathVector {
                flags: VectorFlags::HOLD_INBOUND,
                start,
                end: fix,
                circle,
                distance_m: leg_len_m,
            }],
            egress: Vec::new(),
        }
    }

    async fn calculate_leg(
        &self,
        snapshot: &LegSnapshot,
        prev_end: Option<GeoPoint>,
        request: &CalculateRequest,
    ) -> Result<LegCalculations, FacilityError> {
        let leg = &snapshot.leg;
        let magvar = request.magvar;
        let course_true = Self::course_true(leg, magvar);
        let open_len_m = if leg.distance > 0.0 && !leg.distance_minutes {
            leg.distance
        } else {
            OPEN_LEG_PROJECTION_NM * geo::METERS_PER_NM
        };

        let calc = match leg.leg_type {
            LegType::Unknown | LegType::Discontinuity | LegType::ThruDiscontinuity => {
                LegCalculations::default()
            }
            LegType::IF => match self.resolve_fix(leg).await? {
                Some(fix) => LegCalculations {
                    start: Some(fix),
                    end: Some(fix),
                    initial_dtk: prev_end
                        .map(|p| math::true_to_magnetic(p.bearing_to(&fix), magvar)),
                    ..Default::default()
                },
                None => LegCalculations::default(),
            },
            LegType::TF | LegType::DF => match self.resolve_fix(leg).await? {
                Some(fix) => {
                    let anchor = if leg.leg_type == LegType::DF {
                        prev_end.unwrap_or(request.position)
                    } else {
                        prev_end.unwrap_or(fix)
                    };
                    Self::track_between(anchor, fix, magvar)
                }
                None => LegCalculations::default(),
            },
            LegType::CF => match self.resolve_fix(leg).await? {
                Some(fix) => {
                    let anchor = prev_end.unwrap_or_else(|| {
                        let back_nm = if leg.distance > 0.0 {
                            leg.distance / geo::METERS_PER_NM
                        } else {
                            COURSE_LEG_ANCHOR_NM
                        };
                        fix.offset(
                            math::normalize_heading(course_true + 180.0),
                            back_nm / geo::EARTH_RADIUS_NM,
                        )
                    });
                    Self::track_between(anchor, fix, magvar)
                }
                None => LegCalculations::default(),
            },
            LegType::AF | LegType::RF => {
                let fix = self.resolve_fix(leg).await?;
                let center = self.resolve(&leg.origin_icao).await?;
                match (fix, center) {
                    (Some(fix), Some(center)) => {
                        let entry = prev_end.unwrap_or(fix);
                        Self::arc_to_fix(center, entry, fix, leg.turn_direction, magvar)
                    }
                    (Some(fix), None) => {
                        Self::track_between(prev_end.unwrap_or(fix), fix, magvar)
                    }
                    _ => LegCalculations::default(),
                }
            }
            LegType::CA | LegType::VA | LegType::CI | LegType::VI | LegType::CR
            | LegType::VR | LegType::CD | LegType::VD | LegType::VM => {
                match prev_end {
                    Some(anchor) => Self::project_course(anchor, course_true, open_len_m, magvar),
                    None => Self::project_course(
                        request.position,
                        course_true,
                        open_len_m,
                        magvar,
                    ),
                }
            }
            LegType::FA | LegType::FC | LegType::FD | LegType::FM => {
                match self.resolve_fix(leg).await?.or(prev_end) {
                    Some(anchor) => Self::project_course(anchor, course_true, open_len_m, magvar),
                    None => LegCalculations::default(),
                }
            }
            LegType::PI => match self.resolve_fix(leg).await? {
                Some(fix) => LegCalculations {
                    start: Some(fix),
                    end: Some(fix),
                    initial_dtk: Some(math::true_to_magnetic(course_true, magvar)),
                    ..Default::default()
                },
                None => LegCalculations::default(),
            },
            LegType::HA | LegType::HF | LegType::HM => match self.resolve_fix(leg).await? {
                Some(fix) => Self::hold_inbound(fix, leg, magvar),
                None => LegCalculations::default(),
            },
        };
        Ok(calc)
    }
}

#[async_trait]
impl FlightPathCalculator for DefaultFlightPathCalculator {
    async fn calculate(
        &self,
        request: CalculateRequest,
    ) -> Result<Vec<LegCalculations>, FacilityError> {
        let from = request.from_index.min(request.snapshots.len());
        let mut results = Vec::with_capacity(request.snapshots.len() - from);

        // Path end and running distance of the last computed leg before
        // the window, carried across discontinuities.
        let mut prev_end = request.snapshots[..from]
            .iter()
            .rev()
            .find_map(|s| s.calculated.as_ref().and_then(|c| c.end));
        let mut cumulative = request.snapshots[..from]
            .iter()
            .rev()
            .find_map(|s| s.calculated.as_ref().map(|c| c.cumulative_distance_m))
            .unwrap_or(0.0);

        for snapshot in &request.snapshots[from..] {
            let mut calc = self.calculate_leg(snapshot, prev_end, &request).await?;
            cumulative += calc.distance_m;
            calc.cumulative_distance_m = cumulative;
            if let Some(end) = calc.end {
                prev_end = Some(end);
            }
            results.push(calc);
        }
        Ok(results)
    }
}
