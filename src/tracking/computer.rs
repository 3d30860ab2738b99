use super::{CdiScaleLabel, LNavState, TrackingData, TransitionMode};
use crate::aircraft::AircraftState;
use crate::event_bus::{EventBus, FmsEvent};
use crate::facility::{ApproachType, FacilityLoader, RnavTypeFlags};
use crate::flight_plan::{
    FixTypeFlags, FlightPlan, LegDefinition, LegFlags, LegType, PlanRegistry, SegmentType,
    VectorFlags,
};
use crate::fms::ApproachDetails;
use crate::geo::{self, GeoCircle, GeoPoint, math};
use chrono::TimeDelta;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

/// Ground speed below which no time to destination is produced, knots.
const MIN_ETE_GROUND_SPEED_KT: f64 = 30.0;

/// Distance from the origin or destination airport inside which the scale
/// reads terminal, nautical miles. The enroute scale starts shrinking one
/// mile further out.
const TERMINAL_DISTANCE_NM: f64 = 30.0;

/// Distance beyond which both airports count as left behind and the scale
/// label reads oceanic, nautical miles.
const OCEANIC_DISTANCE_NM: f64 = 200.0;

/// An airport position held for proximity scaling, keyed by ident so a plan
/// edit swaps it out. A failed lookup is pinned too, a bad ident would
/// otherwise refetch every tick.
struct PinnedAirport {
    ident: String,
    pos: Option<GeoPoint>,
}

/// Turns the director state and the active plan's geometry into CDI
/// numbers. The computer owns no plan state: it reads the registry once per
/// tick and publishes a single [`TrackingData`] record on the bus, plus an
/// OBS-availability flag whenever the active leg type changes eligibility.
pub struct TrackingComputer {
    registry: Arc<RwLock<PlanRegistry>>,
    loader: Arc<dyn FacilityLoader>,
    bus: Arc<EventBus>,
    plane: Arc<RwLock<AircraftState>>,
    approach: RwLock<ApproachDetails>,
    origin_pin: RwLock<Option<PinnedAirport>>,
    destination_pin: RwLock<Option<PinnedAirport>>,
    obs_available: AtomicBool,
}

impl TrackingComputer {
    pub fn new(
        registry: Arc<RwLock<PlanRegistry>>,
        loader: Arc<dyn FacilityLoader>,
        bus: Arc<EventBus>,
        plane: Arc<RwLock<AircraftState>>,
    ) -> Self {
        Self {
            registry,
            loader,
            bus,
            plane,
            approach: RwLock::new(ApproachDetails::default()),
            origin_pin: RwLock::new(None),
            destination_pin: RwLock::new(None),
            obs_available: AtomicBool::new(false),
        }
    }

    /// Feeds bus events back into the computer. Only the approach snapshot
    /// is consumed, it selects the approach-phase scale label.
    pub async fn handle_event(&self, event: &FmsEvent) {
        if let FmsEvent::ApproachDetails(details) = event {
            *self.approach.write().await = *details;
        }
    }

    /// One guidance tick. Samples the aircraft and the active plan, then
    /// publishes the tracking record. Facility lookups for the proximity
    /// scale are staged before the plan lock is taken.
    pub async fn update(&self, lnav: &LNavState) {
        let plane = *self.plane.read().await;
        let approach = *self.approach.read().await;

        let (origin_ident, destination_ident) = {
            let registry = self.registry.read().await;
            match registry.active_plan() {
                Some(plan) => (
                    plan.origin_airport().map(str::to_string),
                    plan.destination_airport().map(str::to_string),
                ),
                None => (None, None),
            }
        };
        let origin_pos = self.pinned_pos(&self.origin_pin, origin_ident.as_deref()).await;
        let destination_pos =
            self.pinned_pos(&self.destination_pin, destination_ident.as_deref()).await;

        let (data, active_leg_type) = {
            let registry = self.registry.read().await;
            match registry.active_plan() {
                Some(plan) => {
                    let data =
                        Self::compute(plan, &plane, approach, lnav, origin_pos, destination_pos);
                    let leg_type =
                        plan.leg(plan.active_lateral_leg()).map(|leg| leg.leg.leg_type);
                    (data, leg_type)
                }
                None => (TrackingData::default(), None),
            }
        };

        self.publish_obs_available(active_leg_type);
        self.bus.publish(FmsEvent::Tracking(Box::new(data)));
    }

    async fn pinned_pos(
        &self,
        pin: &RwLock<Option<PinnedAirport>>,
        ident: Option<&str>,
    ) -> Option<GeoPoint> {
        let ident = ident?;
        {
            let pinned = pin.read().await;
            if let Some(airport) = pinned.as_ref() {
                if airport.ident == ident {
                    return airport.pos;
                }
            }
        }
        let pos = self.loader.get_facility(ident).await.ok().map(|facility| facility.pos());
        *pin.write().await = Some(PinnedAirport { ident: ident.to_string(), pos });
        pos
    }

    fn publish_obs_available(&self, leg_type: Option<LegType>) {
        let available = matches!(
            leg_type,
            Some(
                LegType::AF
                    | LegType::CD
                    | LegType::CF
                    | LegType::CR
                    | LegType::DF
                    | LegType::IF
                    | LegType::RF
                    | LegType::TF
            )
        );
        if self.obs_available.swap(available, Ordering::SeqCst) != available {
            self.bus.publish(FmsEvent::ObsAvailable(available));
        }
    }

    /// Builds the tick record from a plan snapshot. Pure so the schedule is
    /// testable without the bus.
    pub(super) fn compute(
        plan: &FlightPlan,
        plane: &AircraftState,
        approach: ApproachDetails,
        lnav: &LNavState,
        origin_pos: Option<GeoPoint>,
        destination_pos: Option<GeoPoint>,
    ) -> TrackingData {
        let mut data = TrackingData { sequencing: plan.leg_count() >= 2, ..Default::default() };

        let tracked = lnav.is_tracking.then(|| plan.leg(lnav.tracked_leg_index)).flatten();
        let next = lnav.is_tracking.then(|| plan.leg(lnav.tracked_leg_index + 1)).flatten();

        // While rolling out of a leg the director already flies the next
        // leg's ingress, so that is the path to describe.
        let (path_leg, path_vector, path_mode, path_index) = match (lnav.transition_mode, next) {
            (TransitionMode::Egress, Some(next_leg)) if has_path(next_leg) => {
                (Some(next_leg), 0, TransitionMode::Ingress, lnav.tracked_leg_index + 1)
            }
            _ => (tracked, lnav.vector_index, lnav.transition_mode, lnav.tracked_leg_index),
        };

        if lnav.obs_active {
            data.dtk_magnetic = lnav.obs_course;
            data.dtk_true = math::magnetic_to_true(lnav.obs_course, plane.magvar);
            data.xtk_nm = lnav.xtk_nm;
            data.distance_to_turn_nm = f64::MAX;
            if let Some(leg) = tracked {
                let active_distance = Self::active_distance_nm(leg, &plane.pos);
                data.destination_distance_nm =
                    Self::destination_distance_nm(plan, lnav.tracked_leg_index, active_distance);
            }
        } else if let Some(leg) = path_leg {
            if let Some(circle) = Self::nominal_path_circle(leg, path_vector, path_mode) {
                data.dtk_true = circle.bearing_at(&plane.pos);
                data.dtk_magnetic = math::true_to_magnetic(data.dtk_true, plane.magvar);
                data.xtk_nm = circle.cross_track(&plane.pos) * geo::EARTH_RADIUS_NM;
            }
            let active_distance = Self::active_distance_nm(leg, &plane.pos);
            data.distance_to_turn_nm = Self::turn_distance_nm(leg, &plane.pos);
            data.destination_distance_nm =
                Self::destination_distance_nm(plan, path_index, active_distance);
        }

        if let Some(end) = tracked.and_then(|leg| leg.calculated.as_ref()).and_then(|c| c.end) {
            data.waypoint_bearing_true = plane.pos.bearing_to(&end);
            data.waypoint_bearing_magnetic =
                math::true_to_magnetic(data.waypoint_bearing_true, plane.magvar);
            data.waypoint_distance_nm = plane.pos.distance_nm(&end);
        }

        if let Some(next_leg) = next {
            if let Some(dtk_magnetic) = Self::initial_dtk(next_leg, plane.magvar) {
                data.next_dtk_magnetic = Some(dtk_magnetic);
                data.next_dtk_true = Some(math::magnetic_to_true(dtk_magnetic, plane.magvar));
            }
        }

        if plane.ground_speed_kt >= MIN_ETE_GROUND_SPEED_KT && data.destination_distance_nm > 0.0 {
            let seconds = data.destination_distance_nm / plane.ground_speed_kt * 3600.0;
            if seconds.is_finite() {
                data.destination_ete = TimeDelta::try_seconds(seconds.round() as i64);
            }
        }

        Self::cdi_scaling(plan, plane, approach, origin_pos, destination_pos, &mut data);
        data
    }

    /// Circle of the path the director nominally steers. Direct legs roll
    /// their turn vector out onto the tangent at the turn exit so the
    /// cross-track does not live on the arc; holds steer the circuit leg
    /// rather than the entry turns.
    pub(super) fn nominal_path_circle(
        leg: &LegDefinition,
        vector_index: usize,
        mode: TransitionMode,
    ) -> Option<GeoCircle> {
        let vectors = &leg.calculated.as_ref()?.flight_path;
        match leg.leg.leg_type {
            LegType::DF => vectors.last().and_then(|vector| {
                if vector.flags.contains(VectorFlags::TURN) {
                    let bearing = vector.circle.bearing_at(&vector.end);
                    bearing
                        .is_finite()
                        .then(|| GeoCircle::great_circle(&vector.end, bearing))
                } else {
                    Some(vector.circle)
                }
            }),
            LegType::HA | LegType::HF | LegType::HM => {
                let start = match mode {
                    TransitionMode::None => vector_index,
                    TransitionMode::Ingress => 0,
                    // Entry vectors sit ahead of the circuit in calculators
                    // that model them.
                    TransitionMode::Egress => 3,
                };
                vectors
                    .iter()
                    .skip(start)
                    .find(|vector| {
                        vector
                            .flags
                            .intersects(VectorFlags::HOLD_INBOUND | VectorFlags::HOLD_OUTBOUND)
                    })
                    .map(|vector| vector.circle)
            }
            _ => {
                let index = match mode {
                    TransitionMode::None => vector_index,
                    TransitionMode::Ingress => 0,
                    TransitionMode::Egress => vectors.len().saturating_sub(1),
                };
                vectors.get(index).map(|vector| vector.circle)
            }
        }
    }

    /// Published initial track of a leg in degrees magnetic. Direct legs
    /// read their final vector, the published track would point at the turn
    /// entry instead of the course flown after it.
    fn initial_dtk(leg: &LegDefinition, magvar: f64) -> Option<f64> {
        let calc = leg.calculated.as_ref()?;
        match leg.leg.leg_type {
            LegType::DF => calc.flight_path.last().map(|vector| {
                let point =
                    if vector.circle.is_great_circle() { vector.start } else { vector.end };
                math::true_to_magnetic(vector.circle.bearing_at(&point), magvar)
            }),
            _ => calc.initial_dtk,
        }
    }

    /// Direct distance to the end of a leg's path, nautical miles. Zero for
    /// legs without a path, such as an initial fix.
    fn active_distance_nm(leg: &LegDefinition, pos: &GeoPoint) -> f64 {
        leg.calculated
            .as_ref()
            .and_then(|calc| calc.flight_path.last())
            .map_or(0.0, |vector| pos.distance_nm(&vector.end))
    }

    /// Distance to the start of the first egress vector, falling back to
    /// the remaining leg distance when the calculator models no egress.
    fn turn_distance_nm(leg: &LegDefinition, pos: &GeoPoint) -> f64 {
        leg.calculated.as_ref().and_then(|calc| calc.egress.first()).map_or_else(
            || Self::active_distance_nm(leg, pos),
            |vector| pos.distance_nm(&vector.start),
        )
    }

    /// Plan distance from a leg to the end of the last non-missed leg plus
    /// the remaining distance on that leg.
    pub(super) fn destination_distance_nm(
        plan: &FlightPlan,
        from_index: usize,
        active_distance_nm: f64,
    ) -> f64 {
        let total = plan
            .legs()
            .filter(|(_, leg)| !leg.flags.contains(LegFlags::MISSED_APPROACH))
            .filter_map(|(_, leg)| leg.calculated.as_ref())
            .map(|calc| calc.cumulative_distance_m)
            .last()
            .unwrap_or(0.0);
        let through_active = plan
            .leg(from_index)
            .and_then(|leg| leg.calculated.as_ref())
            .map_or(0.0, |calc| calc.cumulative_distance_m);
        (total - through_active).max(0.0) / geo::METERS_PER_NM + active_distance_nm
    }

    /// Full-scale deflection schedule over the phase of flight.
    fn cdi_scaling(
        plan: &FlightPlan,
        plane: &AircraftState,
        approach: ApproachDetails,
        origin_pos: Option<GeoPoint>,
        destination_pos: Option<GeoPoint>,
        data: &mut TrackingData,
    ) {
        data.cdi_scale_nm = 2.0;
        data.cdi_scale_label = CdiScaleLabel::Enroute;
        if plan.leg_count() == 0 {
            return;
        }
        let active_index = plan.active_lateral_leg().min(plan.leg_count() - 1);
        let Some(segment_index) = plan.segment_of(active_index) else {
            return;
        };
        let Some(segment) = plan.segment(segment_index) else {
            return;
        };
        let segment_type = segment.segment_type;
        let previous = active_index.checked_sub(1).and_then(|index| plan.leg(index));

        if segment_type == SegmentType::Departure {
            data.cdi_scale_nm = 0.3;
            data.cdi_scale_label = CdiScaleLabel::Departure;
            // Past the initial climb the departure opens up to terminal.
            if previous.is_some_and(|leg| {
                !matches!(leg.leg.leg_type, LegType::IF | LegType::CA | LegType::FA)
            }) {
                data.cdi_scale_nm = 1.0;
                data.cdi_scale_label = CdiScaleLabel::Terminal;
            }
        } else {
            let origin_distance = origin_pos.map(|pos| plane.pos.distance_nm(&pos));
            let destination_distance = destination_pos.map(|pos| plane.pos.distance_nm(&pos));
            for distance in [origin_distance, destination_distance].into_iter().flatten() {
                let captured =
                    2.0 - (TERMINAL_DISTANCE_NM + 1.0 - distance).clamp(0.0, 1.0);
                data.cdi_scale_nm = data.cdi_scale_nm.min(captured);
                if distance <= TERMINAL_DISTANCE_NM {
                    data.cdi_scale_label = CdiScaleLabel::Terminal;
                }
            }
            if origin_distance.is_some_and(|d| d > OCEANIC_DISTANCE_NM)
                && destination_distance.is_some_and(|d| d > OCEANIC_DISTANCE_NM)
            {
                data.cdi_scale_label = CdiScaleLabel::Oceanic;
            }
        }

        if segment_type == SegmentType::Arrival {
            let segment_offset = plan.segment_offset(segment_index);
            if active_index == segment_offset + 1 {
                // Blend over the first mile of the first arrival leg.
                let along = plan
                    .leg(active_index)
                    .and_then(|leg| leg.calculated.as_ref())
                    .and_then(|calc| {
                        let start = calc.start?;
                        let end = calc.end?;
                        let circle = GeoCircle::great_circle_through(&start, &end);
                        Some(
                            circle.arc_length_between(&start, &plane.pos)
                                * geo::EARTH_RADIUS_NM,
                        )
                    });
                if let Some(along) = along {
                    data.cdi_scale_nm = 2.0 - along.clamp(0.0, 1.0);
                    if along >= 1.0 {
                        data.cdi_scale_label = CdiScaleLabel::Terminal;
                    }
                }
            } else if active_index > segment_offset + 1 {
                data.cdi_scale_nm = 1.0;
                data.cdi_scale_label = CdiScaleLabel::Terminal;
            }
        }

        if segment_type == SegmentType::Approach {
            data.cdi_scale_nm = 1.0;
            data.cdi_scale_label = CdiScaleLabel::Terminal;
            let Some(faf_index) = Self::faf_index(plan) else {
                return;
            };
            if active_index == faf_index {
                let distance = plan
                    .leg(active_index)
                    .map_or(0.0, |leg| Self::active_distance_nm(leg, &plane.pos));
                data.cdi_scale_nm = 1.0 - 0.7 * ((2.0 - distance).clamp(0.0, 2.0) / 2.0);
                if distance <= 2.0 {
                    data.cdi_scale_label = Self::approach_scale_label(approach);
                }
            } else if active_index > faf_index {
                let Some(leg) = plan.leg(active_index) else {
                    return;
                };
                if leg.flags.contains(LegFlags::MISSED_APPROACH) {
                    data.cdi_scale_nm = 1.0;
                    data.cdi_scale_label = CdiScaleLabel::MissedApproach;
                } else {
                    let length_nm = leg
                        .calculated
                        .as_ref()
                        .map_or(0.0, |calc| calc.distance_m / geo::METERS_PER_NM);
                    data.cdi_scale_nm = if length_nm > 0.0 {
                        let distance = Self::active_distance_nm(leg, &plane.pos);
                        0.3 - 0.112 * ((length_nm - distance).clamp(0.0, length_nm) / length_nm)
                    } else {
                        0.3
                    };
                    data.cdi_scale_label = Self::approach_scale_label(approach);
                }
            }
        }
    }

    /// Flat index of the final approach fix, defaulting to the penultimate
    /// approach leg when none is flagged.
    pub(super) fn faf_index(plan: &FlightPlan) -> Option<usize> {
        let (segment_index, segment) = plan
            .segments()
            .enumerate()
            .find(|(_, segment)| segment.segment_type == SegmentType::Approach)?;
        let within = (0..segment.len())
            .find(|&leg_index| {
                plan.leg_in_segment(segment_index, leg_index)
                    .is_some_and(|leg| leg.leg.fix_type_flags.contains(FixTypeFlags::FAF))
            })
            .or_else(|| segment.len().checked_sub(2))?;
        Some(plan.segment_offset(segment_index) + within)
    }

    /// Scale label flown inside the final approach, from the loaded
    /// approach type and its best published minima.
    pub(super) fn approach_scale_label(approach: ApproachDetails) -> CdiScaleLabel {
        match approach.approach_type {
            ApproachType::Gps | ApproachType::Rnav => {
                let best = approach.best_rnav_type.best();
                if best == RnavTypeFlags::LPV {
                    CdiScaleLabel::Lpv
                } else if best == RnavTypeFlags::LP {
                    if approach.is_circling { CdiScaleLabel::Lp } else { CdiScaleLabel::LpPlusV }
                } else if best == RnavTypeFlags::LNAV_VNAV {
                    CdiScaleLabel::LnavVnav
                } else if approach.is_circling {
                    CdiScaleLabel::Lnav
                } else {
                    CdiScaleLabel::LnavPlusV
                }
            }
            ApproachType::Visual => CdiScaleLabel::Visual,
            _ => CdiScaleLabel::Terminal,
        }
    }
}

fn has_path(leg: &LegDefinition) -> bool {
    leg.calculated.as_ref().is_some_and(|calc| !calc.flight_path.is_empty())
}
