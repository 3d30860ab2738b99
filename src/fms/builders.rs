use super::engine::{
    airport_reference_leg, drain_all_effects, ensure_only_one_segment_of_type,
    is_duplicate_if_leg, is_duplicate_leg, plan_add_leg, plan_add_origin_destination_leg,
    plan_remove_duplicate_leg, remove_destination_fix_duplicates, remove_segments_of_type,
    runway_leg, RUNWAY_LEG_ALTITUDE_PAD_M,
};
use super::{direct_to, ApproachDetails, DirectToState, Fms, FmsError};
use crate::aircraft::AircraftState;
use crate::event_bus::FmsEvent;
use crate::facility::{
    AirportFacility, ApproachProcedure, ApproachType, Facility, FacilityFrequency, RnavTypeFlags,
};
use crate::flight_plan::{
    AltitudeRestrictionType, FixTypeFlags, FlightPlan, FlightPlanLeg, FlightPlanSegment,
    LegFlags, LegType, PlanRegistry, SegmentType, PRIMARY_PLAN, PROC_PREVIEW_PLAN,
};
use crate::geo::{math, GeoPoint, EARTH_RADIUS_NM};
use crate::nav;
use regex::Regex;
use std::sync::LazyLock;

/// Matches runway fix idents, bare (`RW22`) or airport-qualified
/// (`KBOS-RW22R`).
static RUNWAY_FIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|-)RW\d{1,2}[A-Z]?$").unwrap());

/// How far past the final fix the synthesized visual approach starts.
const VISUAL_INITIAL_EXTEND_NM: f64 = 5.0;

/// Height of the visual final fix above the runway threshold, metres.
const VISUAL_FAF_HEIGHT_M: f64 = 110.0;

/// A course reversal is skipped when the inbound bearing lies within this
/// angle of the final course.
const COURSE_REVERSAL_ALIGN_DEG: f64 = 90.0;

/// A procedure leg staged for commit, paired with the definition flags it
/// will carry in the plan.
type Candidates = Vec<(FlightPlanLeg, LegFlags)>;

/// Procedure selection for the preview slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureSelection {
    Departure {
        index: usize,
        runway_transition: Option<usize>,
        enroute_transition: Option<usize>,
    },
    Arrival {
        index: usize,
        runway_transition: Option<usize>,
        enroute_transition: Option<usize>,
    },
    Approach {
        index: usize,
        transition: Option<usize>,
    },
}

/// Collapses consecutive candidates naming the same fix where the later is
/// the IF opening the next procedure portion. The survivor keeps the later
/// leg's fix roles and altitude restriction, everything else from the
/// earlier.
fn merge_duplicate_candidates(candidates: Candidates) -> Candidates {
    let mut merged: Candidates = Vec::with_capacity(candidates.len());
    for (leg, flags) in candidates {
        let duplicate = merged
            .last()
            .is_some_and(|(prev, _)| is_duplicate_if_leg(prev, &leg));
        if duplicate {
            if let Some((prev, _)) = merged.last_mut() {
                prev.fix_type_flags = leg.fix_type_flags;
                prev.alt_desc = leg.alt_desc;
                prev.altitude1 = leg.altitude1;
                prev.altitude2 = leg.altitude2;
            }
        } else {
            merged.push((leg, flags));
        }
    }
    merged
}

/// Synthesizes an IF in front when the first leg cannot define a fixed
/// starting point. The IF adopts the displaced leg's fix roles, and for
/// holds and procedure turns its altitude restriction.
fn try_insert_if_leg(candidates: &mut Candidates) {
    let Some((first, _)) = candidates.first() else {
        return;
    };
    let fix = match first.leg_type {
        LegType::HA
        | LegType::HF
        | LegType::HM
        | LegType::PI
        | LegType::FD
        | LegType::FC => first.fix_icao.clone(),
        LegType::FM | LegType::VM => first.origin_icao.clone(),
        _ => return,
    };
    if fix.is_empty() {
        return;
    }
    let own_fix = !matches!(first.leg_type, LegType::FM | LegType::VM);
    let inherit_altitude = matches!(first.leg_type, LegType::HF | LegType::PI);
    let strip_altitude = first.leg_type != LegType::PI;
    let mut synthesized = FlightPlanLeg {
        leg_type: LegType::IF,
        fix_icao: fix,
        pos: if own_fix { first.pos } else { None },
        ..Default::default()
    };
    if first.fix_type_flags.contains(FixTypeFlags::IF) {
        synthesized.fix_type_flags.insert(FixTypeFlags::IF);
    }
    if first.fix_type_flags.contains(FixTypeFlags::IAF) {
        synthesized.fix_type_flags.insert(FixTypeFlags::IAF);
    }
    if inherit_altitude {
        synthesized.alt_desc = first.alt_desc;
        synthesized.altitude1 = first.altitude1;
        synthesized.altitude2 = first.altitude2;
    }
    {
        let (first, _) = &mut candidates[0];
        first.fix_type_flags.remove(FixTypeFlags::IF);
        first.fix_type_flags.remove(FixTypeFlags::IAF);
        if strip_altitude {
            first.alt_desc = AltitudeRestrictionType::Unused;
            first.altitude1 = 0.0;
            first.altitude2 = 0.0;
        }
    }
    candidates.insert(0, (synthesized, LegFlags::NONE));
}

/// Navdata sometimes stamps the initial approach fix on the hold or course
/// reversal itself; the role belongs on the fix the reversal is anchored
/// to, the leg before it.
fn try_reconcile_iaf_leg(candidates: &mut Candidates) {
    let Some(index) = candidates
        .iter()
        .position(|(leg, _)| leg.fix_type_flags.contains(FixTypeFlags::IAF))
    else {
        return;
    };
    if index == 0 {
        return;
    }
    let misplaced = matches!(
        candidates[index].0.leg_type,
        LegType::HA | LegType::HF | LegType::HM | LegType::PI | LegType::FC | LegType::FD
    );
    if misplaced {
        candidates[index].0.fix_type_flags.remove(FixTypeFlags::IAF);
        candidates[index - 1].0.fix_type_flags.insert(FixTypeFlags::IAF);
    }
}

/// Navdata encodes an exact-at final fix crossing altitude as at-or-above
/// with both altitude fields equal.
fn manage_faf_altitude_restriction(candidates: &mut Candidates) {
    for (leg, _) in candidates {
        if leg.fix_type_flags.contains(FixTypeFlags::FAF)
            && leg.alt_desc == AltitudeRestrictionType::AtOrAbove
            && leg.altitude1 > 0.0
            && (leg.altitude1 - leg.altitude2).abs() < f64::EPSILON
        {
            leg.alt_desc = AltitudeRestrictionType::At;
        }
    }
}

/// Drops an IF that merely repeats the fix of a hold directly before it.
fn try_cleanup_hold(candidates: &mut Candidates) {
    let mut index = 1;
    while index < candidates.len() {
        let repeat = candidates[index].0.leg_type == LegType::IF
            && candidates[index - 1].0.leg_type == LegType::HF
            && candidates[index].0.fix_icao == candidates[index - 1].0.fix_icao;
        if repeat {
            candidates.remove(index);
        } else {
            index += 1;
        }
    }
}

/// Drops the published course reversal when the aircraft is already
/// arriving roughly along the final approach course.
fn try_remove_course_reversal(candidates: &mut Candidates, plane: &AircraftState) -> bool {
    if candidates.len() < 3 {
        return false;
    }
    let reversal = matches!(
        candidates[1].0.leg_type,
        LegType::HA | LegType::HF | LegType::HM | LegType::PI
    );
    if !reversal {
        return false;
    }
    let Some(anchor) = candidates[1].0.pos.or(candidates[0].0.pos) else {
        return false;
    };
    let next = &candidates[2].0;
    let outbound = if next.leg_type == LegType::CF {
        if next.true_degrees {
            next.course
        } else {
            math::magnetic_to_true(next.course, plane.magvar)
        }
    } else if let Some(next_pos) = next.pos {
        anchor.bearing_to(&next_pos)
    } else {
        return false;
    };
    let inbound = plane.pos.bearing_to(&anchor);
    if math::angle_diff(inbound, outbound).abs() < COURSE_REVERSAL_ALIGN_DEG {
        candidates.remove(1);
        true
    } else {
        false
    }
}

/// Guarantees a missed approach point: the first runway fix, else the last
/// leg of the final approach.
fn try_insert_map(candidates: &mut Candidates) {
    if candidates
        .iter()
        .any(|(leg, _)| leg.fix_type_flags.contains(FixTypeFlags::MAP))
    {
        return;
    }
    if let Some((leg, _)) = candidates
        .iter_mut()
        .find(|(leg, _)| RUNWAY_FIX.is_match(&leg.fix_icao))
    {
        leg.fix_type_flags.insert(FixTypeFlags::MAP);
    } else if let Some((leg, _)) = candidates.last_mut() {
        leg.fix_type_flags.insert(FixTypeFlags::MAP);
    }
}

/// Builds the vectors-to-final pair, a pass-through discontinuity rolling
/// into a course leg onto the final approach fix.
///
/// # Returns
/// The two synthesized legs and the index of the FAF within the published
/// final legs.
fn build_vtf_legs(finals: &[FlightPlanLeg], magvar: f64) -> Option<(Vec<FlightPlanLeg>, usize)> {
    let faf_index = finals
        .iter()
        .position(|leg| leg.fix_type_flags.contains(FixTypeFlags::FAF))
        .or_else(|| finals.len().checked_sub(2))?;
    let faf = finals.get(faf_index)?;
    let mut vtf_faf = faf.clone();
    if faf.leg_type != LegType::CF {
        let faf_pos = faf.pos?;
        let true_course = if faf_index > 0 {
            let prev_pos = finals[..faf_index].iter().rev().find_map(|leg| leg.pos)?;
            prev_pos.bearing_to(&faf_pos)
        } else {
            let next_pos = finals[faf_index + 1..]
                .iter()
                .find(|leg| leg.leg_type.is_to_fix())
                .and_then(|leg| leg.pos)?;
            faf_pos.bearing_to(&next_pos)
        };
        vtf_faf.course = math::true_to_magnetic(true_course, magvar);
        vtf_faf.true_degrees = false;
    }
    vtf_faf.leg_type = LegType::CF;
    let disco = FlightPlanLeg { leg_type: LegType::ThruDiscontinuity, ..Default::default() };
    Some((vec![disco, vtf_faf], faf_index))
}

/// Assembles the staged leg run of a published approach: transition (or the
/// vectors-to-final pair), final legs, runway fix, the post-processing
/// passes and the missed approach.
fn stage_approach_legs(
    airport: &AirportFacility,
    approach: &ApproachProcedure,
    transition_index: Option<usize>,
    transition_start: usize,
    plane: &AircraftState,
) -> Result<Candidates, FmsError> {
    let mut candidates: Candidates = Vec::new();
    match transition_index {
        Some(index) => {
            let transition =
                approach.transitions.get(index).ok_or(FmsError::InvalidReference)?;
            for leg in transition.legs.iter().skip(transition_start) {
                candidates.push((leg.clone(), LegFlags::NONE));
            }
            for leg in &approach.final_legs {
                candidates.push((leg.clone(), LegFlags::NONE));
            }
            candidates = merge_duplicate_candidates(candidates);
        }
        None => {
            let (pair, faf_index) =
                build_vtf_legs(&approach.final_legs, plane.magvar).ok_or(FmsError::InvalidReference)?;
            for leg in pair {
                candidates.push((leg, LegFlags::VECTORS_TO_FINAL));
            }
            for leg in approach.final_legs.iter().skip(faf_index + 1) {
                candidates.push((leg.clone(), LegFlags::NONE));
            }
        }
    }
    if let Some(runway) = airport.runway_for(approach.runway_number, approach.runway_designator)
    {
        let present = candidates
            .iter()
            .any(|(leg, _)| RUNWAY_FIX.is_match(&leg.fix_icao));
        if !present {
            candidates.push((runway_leg(airport, runway, LegType::TF), LegFlags::NONE));
        }
    }
    try_insert_if_leg(&mut candidates);
    try_reconcile_iaf_leg(&mut candidates);
    manage_faf_altitude_restriction(&mut candidates);
    try_cleanup_hold(&mut candidates);
    try_remove_course_reversal(&mut candidates, plane);
    try_insert_map(&mut candidates);
    let missed_start = candidates.len();
    for leg in &approach.missed_legs {
        candidates.push((leg.clone(), LegFlags::MISSED_APPROACH));
    }
    let last_hold = (missed_start..candidates.len())
        .rev()
        .find(|&index| candidates[index].0.leg_type.is_hold());
    if let Some(index) = last_hold {
        if index > 0 {
            candidates[index - 1].0.fix_type_flags.insert(FixTypeFlags::MAHP);
        }
    }
    Ok(candidates)
}

/// Captures an active on-plan direct-to whose target sits in one of the
/// segment types about to be replaced.
fn capture_direct_to(
    registry: &PlanRegistry,
    replaced: &[SegmentType],
) -> Option<(String, Option<GeoPoint>, Option<f64>)> {
    if direct_to::state_of(registry) != DirectToState::ToExisting {
        return None;
    }
    let plan = registry.plan(PRIMARY_PLAN)?;
    let target = plan.direct_to()?;
    let hit = plan
        .segment(target.segment_index)
        .is_some_and(|segment| replaced.contains(&segment.segment_type));
    if hit {
        direct_to::existing_target_fix(registry)
    } else {
        None
    }
}

/// Reconnects a captured direct-to after a rebuild: back onto the last plan
/// leg with the same fix when one survived, otherwise off-plan at the old
/// fix with the old explicit course.
fn reactivate_direct_to(
    registry: &mut PlanRegistry,
    plane: &AircraftState,
    ident: &str,
    pos: Option<GeoPoint>,
    course: Option<f64>,
) {
    let relocated = registry.plan_mut(PRIMARY_PLAN).is_some_and(|plan| {
        let hit = plan
            .legs()
            .filter(|(_, leg)| {
                !leg.flags.contains(LegFlags::DIRECT_TO) && leg.leg.fix_icao == ident
            })
            .map(|(global, _)| global)
            .last();
        hit.and_then(|global| plan.locate(global)).is_some_and(|(segment_index, leg_index)| {
            direct_to::create_direct_to_existing_core(plan, plane, segment_index, leg_index, course)
        })
    });
    if !relocated {
        direct_to::create_direct_to_random_core(registry, plane, ident, pos, course);
    }
}

/// Everything an approach commit writes in one pass under the plan lock.
struct StagedApproach {
    legs: Candidates,
    approach_index: Option<usize>,
    transition_index: Option<usize>,
    visual_runway: Option<String>,
    destination_runway: Option<String>,
    details: ApproachDetails,
    frequency: Option<FacilityFrequency>,
}

impl Fms {
    /// Loads a departure procedure into the primary plan.
    pub async fn insert_departure(
        &self,
        airport: &AirportFacility,
        departure_index: usize,
        runway_transition_index: Option<usize>,
        enroute_transition_index: Option<usize>,
        runway: Option<&str>,
    ) -> Result<(), FmsError> {
        let departure = airport
            .departures
            .get(departure_index)
            .ok_or(FmsError::InvalidReference)?;
        let one_way = runway.and_then(|designation| airport.runway(designation));
        if runway.is_some() && one_way.is_none() {
            return Err(FmsError::InvalidReference);
        }
        let token = self.begin_op();
        let plane = *self.plane.read().await;
        let mut candidates: Candidates = Vec::new();
        candidates.push((
            one_way.map_or_else(
                || airport_reference_leg(airport, LegType::IF),
                |runway| runway_leg(airport, runway, LegType::IF),
            ),
            LegFlags::NONE,
        ));
        if let Some(index) = runway_transition_index {
            let transition = departure
                .runway_transitions
                .get(index)
                .ok_or(FmsError::InvalidReference)?;
            for leg in &transition.legs {
                candidates.push((leg.clone(), LegFlags::NONE));
            }
        }
        for leg in &departure.common_legs {
            candidates.push((leg.clone(), LegFlags::NONE));
        }
        if let Some(index) = enroute_transition_index {
            let transition = departure
                .enroute_transitions
                .get(index)
                .ok_or(FmsError::InvalidReference)?;
            for leg in &transition.legs {
                candidates.push((leg.clone(), LegFlags::NONE));
            }
        }
        let candidates = merge_duplicate_candidates(candidates);
        let drained = {
            let mut registry = self.registry.write().await;
            if self.current_op() != token {
                return Err(FmsError::StaleAsyncResult);
            }
            let segment =
                ensure_only_one_segment_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Departure, &plane)
                    .ok_or(FmsError::InvalidReference)?;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.set_origin_airport(Some(airport.icao.clone()));
            plan.update_procedure_details(|details| {
                details.origin_runway = runway.map(str::to_string);
                details.departure_index = Some(departure_index);
                details.departure_runway_transition_index = runway_transition_index;
                details.departure_transition_index = enroute_transition_index;
            });
            for (leg, flags) in candidates {
                plan_add_leg(plan, segment, leg, None, flags);
            }
            dedupe_segment_end(plan, segment);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        nav!("Departure {} loaded at {}", departure.name, airport.icao);
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Loads an arrival procedure into the primary plan, rebuilding the
    /// destination leg when no approach owns it.
    pub async fn insert_arrival(
        &self,
        airport: &AirportFacility,
        arrival_index: usize,
        runway_transition_index: Option<usize>,
        enroute_transition_index: Option<usize>,
        runway: Option<&str>,
    ) -> Result<(), FmsError> {
        let arrival = airport
            .arrivals
            .get(arrival_index)
            .ok_or(FmsError::InvalidReference)?;
        if runway.is_some_and(|designation| airport.runway(designation).is_none()) {
            return Err(FmsError::InvalidReference);
        }
        let token = self.begin_op();
        let plane = *self.plane.read().await;
        let mut candidates: Candidates = Vec::new();
        if let Some(index) = enroute_transition_index {
            let transition = arrival
                .enroute_transitions
                .get(index)
                .ok_or(FmsError::InvalidReference)?;
            for leg in &transition.legs {
                candidates.push((leg.clone(), LegFlags::NONE));
            }
        }
        for leg in &arrival.common_legs {
            candidates.push((leg.clone(), LegFlags::NONE));
        }
        if let Some(index) = runway_transition_index {
            let transition = arrival
                .runway_transitions
                .get(index)
                .ok_or(FmsError::InvalidReference)?;
            for leg in &transition.legs {
                candidates.push((leg.clone(), LegFlags::NONE));
            }
        }
        let mut candidates = merge_duplicate_candidates(candidates);
        try_insert_if_leg(&mut candidates);
        let drained = {
            let mut registry = self.registry.write().await;
            if self.current_op() != token {
                return Err(FmsError::StaleAsyncResult);
            }
            let captured = capture_direct_to(&registry, &[SegmentType::Destination]);
            if captured.is_some() {
                if let Some(plan) = registry.plan_mut(PRIMARY_PLAN) {
                    direct_to::remove_direct_to_existing_core(plan, None);
                }
            }
            let segment =
                ensure_only_one_segment_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Arrival, &plane)
                    .ok_or(FmsError::InvalidReference)?;
            let approach_loaded = registry.plan(PRIMARY_PLAN).is_some_and(|plan| {
                plan.procedure_details().approach_index.is_some()
                    || plan.procedure_details().visual_runway.is_some()
            });
            if !approach_loaded {
                ensure_only_one_segment_of_type(
                    &mut registry,
                    PRIMARY_PLAN,
                    SegmentType::Destination,
                    &plane,
                );
            }
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.update_procedure_details(|details| {
                details.arrival_index = Some(arrival_index);
                details.arrival_runway_transition_index = runway_transition_index;
                details.arrival_transition_index = enroute_transition_index;
            });
            for (leg, flags) in candidates {
                plan_add_leg(plan, segment, leg, None, flags);
            }
            if !approach_loaded {
                plan.set_destination_airport(Some(airport.icao.clone()));
                plan.update_procedure_details(|details| {
                    details.destination_runway = runway.map(str::to_string);
                });
                plan_add_origin_destination_leg(plan, false, airport, runway);
                let destination = plan
                    .segments()
                    .position(|segment| segment.segment_type == SegmentType::Destination);
                if let Some(destination) = destination {
                    dedupe_segment_start(plan, destination);
                }
            }
            dedupe_segment_start(plan, segment);
            if let Some((ident, pos, course)) = captured {
                reactivate_direct_to(&mut registry, &plane, &ident, pos, course);
            }
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        nav!("Arrival {} loaded at {}", arrival.name, airport.icao);
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Loads a published approach. A `transition_index` of `None` requests
    /// the vectors-to-final form; `transition_start` can skip into the
    /// transition's leg list.
    pub async fn insert_approach(
        &self,
        airport: &AirportFacility,
        approach_index: usize,
        transition_index: Option<usize>,
        transition_start: usize,
    ) -> Result<(), FmsError> {
        let approach = airport
            .approaches
            .get(approach_index)
            .ok_or(FmsError::InvalidReference)?;
        let token = self.begin_op();
        let plane = *self.plane.read().await;
        let legs =
            stage_approach_legs(airport, approach, transition_index, transition_start, &plane)?;
        let details = ApproachDetails {
            loaded: true,
            approach_type: approach.approach_type,
            best_rnav_type: approach.rnav_type_flags.best(),
            is_active: false,
            is_circling: approach.is_circling(),
        };
        let frequency = if approach.approach_type.is_localizer_family() {
            airport.approach_frequency(approach)
        } else {
            None
        };
        let staged = StagedApproach {
            legs,
            approach_index: Some(approach_index),
            transition_index,
            visual_runway: None,
            destination_runway: airport
                .runway_for(approach.runway_number, approach.runway_designator)
                .map(|runway| runway.designation.clone()),
            details,
            frequency,
        };
        nav!("Approach {} loaded at {}", approach.name, airport.icao);
        self.commit_approach(airport, staged, token).await
    }

    /// Synthesizes and loads a straight-in visual approach to a runway.
    pub async fn insert_visual_approach(
        &self,
        airport: &AirportFacility,
        runway_designation: &str,
        final_distance_nm: f64,
    ) -> Result<(), FmsError> {
        let runway = airport
            .runway(runway_designation)
            .ok_or(FmsError::InvalidReference)?;
        let token = self.begin_op();
        let final_nm = final_distance_nm.max(1.0);
        let reciprocal = math::normalize_heading(runway.course + 180.0);
        let initial_pos = runway
            .pos
            .offset(reciprocal, (final_nm + VISUAL_INITIAL_EXTEND_NM) / EARTH_RADIUS_NM);
        let faf_pos = runway.pos.offset(reciprocal, final_nm / EARTH_RADIUS_NM);
        let runway_fix = format!("{}-RW{}", airport.icao, runway.designation);
        let initial = FlightPlanLeg {
            leg_type: LegType::IF,
            fix_icao: "STRGHT".to_string(),
            pos: Some(initial_pos),
            ..Default::default()
        };
        let faf = FlightPlanLeg {
            leg_type: LegType::CF,
            fix_icao: "FINAL".to_string(),
            pos: Some(faf_pos),
            course: runway.course,
            true_degrees: true,
            fix_type_flags: FixTypeFlags::FAF,
            alt_desc: AltitudeRestrictionType::AtOrAbove,
            altitude1: runway.elevation_m + VISUAL_FAF_HEIGHT_M,
            ..Default::default()
        };
        let map = FlightPlanLeg {
            leg_type: LegType::CF,
            fix_icao: runway_fix.clone(),
            pos: Some(runway.pos),
            course: runway.course,
            true_degrees: true,
            fix_type_flags: FixTypeFlags::MAP,
            altitude1: runway.elevation_m + RUNWAY_LEG_ALTITUDE_PAD_M,
            ..Default::default()
        };
        let missed = FlightPlanLeg {
            leg_type: LegType::FM,
            origin_icao: runway_fix,
            course: runway.course,
            true_degrees: true,
            ..Default::default()
        };
        let staged = StagedApproach {
            legs: vec![
                (initial, LegFlags::NONE),
                (faf, LegFlags::NONE),
                (map, LegFlags::NONE),
                (missed, LegFlags::MISSED_APPROACH),
            ],
            approach_index: None,
            transition_index: None,
            visual_runway: Some(runway.designation.clone()),
            destination_runway: Some(runway.designation.clone()),
            details: ApproachDetails {
                loaded: true,
                approach_type: ApproachType::Visual,
                best_rnav_type: RnavTypeFlags::NONE,
                is_active: false,
                is_circling: false,
            },
            frequency: None,
        };
        nav!("Visual approach to runway {} at {}", runway.designation, airport.icao);
        self.commit_approach(airport, staged, token).await
    }

    /// Commits a staged approach: replaces the approach segment, takes over
    /// the destination, publishes the details and re-activates a direct-to
    /// captured from the replaced segments.
    async fn commit_approach(
        &self,
        airport: &AirportFacility,
        staged: StagedApproach,
        token: u64,
    ) -> Result<(), FmsError> {
        let StagedApproach {
            legs,
            approach_index,
            transition_index,
            visual_runway,
            destination_runway,
            details,
            frequency,
        } = staged;
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            if self.current_op() != token {
                return Err(FmsError::StaleAsyncResult);
            }
            let captured = capture_direct_to(
                &registry,
                &[SegmentType::Approach, SegmentType::Destination],
            );
            if captured.is_some() {
                if let Some(plan) = registry.plan_mut(PRIMARY_PLAN) {
                    direct_to::remove_direct_to_existing_core(plan, None);
                }
            }
            remove_segments_of_type(&mut registry, PRIMARY_PLAN, SegmentType::MissedApproach, &plane);
            let segment =
                ensure_only_one_segment_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Approach, &plane)
                    .ok_or(FmsError::InvalidReference)?;
            ensure_only_one_segment_of_type(
                &mut registry,
                PRIMARY_PLAN,
                SegmentType::Destination,
                &plane,
            );
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.set_destination_airport(Some(airport.icao.clone()));
            plan.update_procedure_details(|details| {
                details.approach_index = approach_index;
                details.approach_transition_index = transition_index;
                details.visual_runway = visual_runway;
                details.destination_runway = destination_runway;
            });
            for (leg, flags) in legs {
                plan_add_leg(plan, segment, leg, None, flags);
            }
            dedupe_segment_start(plan, segment);
            remove_destination_fix_duplicates(&mut registry, PRIMARY_PLAN, &airport.icao, &plane);
            if let Some((ident, pos, course)) = captured {
                reactivate_direct_to(&mut registry, &plane, &ident, pos, course);
            }
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        self.set_approach_data(details).await;
        self.push_approach_frequency(frequency, false).await;
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Unloads the departure and restores the plain origin leg.
    pub async fn remove_departure(&self) -> Result<(), FmsError> {
        let token = self.begin_op();
        let (origin, runway) = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            (
                plan.origin_airport().map(str::to_string),
                plan.procedure_details().origin_runway.clone(),
            )
        };
        let facility = match &origin {
            Some(icao) => Some(self.loader.get_facility(icao).await?),
            None => None,
        };
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            if self.current_op() != token {
                return Err(FmsError::StaleAsyncResult);
            }
            let segment =
                ensure_only_one_segment_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Departure, &plane)
                    .ok_or(FmsError::InvalidReference)?;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.update_procedure_details(|details| {
                details.departure_index = None;
                details.departure_runway_transition_index = None;
                details.departure_transition_index = None;
            });
            if let Some(airport) = facility.as_ref().and_then(Facility::as_airport) {
                plan_add_origin_destination_leg(plan, true, airport, runway.as_deref());
                dedupe_segment_end(plan, segment);
            }
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        nav!("Departure removed");
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Unloads the arrival and restores the plain destination leg unless an
    /// approach owns the destination.
    pub async fn remove_arrival(&self) -> Result<(), FmsError> {
        let token = self.begin_op();
        let (destination, runway) = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            (
                plan.destination_airport().map(str::to_string),
                plan.procedure_details().destination_runway.clone(),
            )
        };
        let facility = match &destination {
            Some(icao) => Some(self.loader.get_facility(icao).await?),
            None => None,
        };
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            if self.current_op() != token {
                return Err(FmsError::StaleAsyncResult);
            }
            remove_segments_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Arrival, &plane);
            let approach_loaded = registry.plan(PRIMARY_PLAN).is_some_and(|plan| {
                plan.procedure_details().approach_index.is_some()
                    || plan.procedure_details().visual_runway.is_some()
            });
            if !approach_loaded {
                ensure_only_one_segment_of_type(
                    &mut registry,
                    PRIMARY_PLAN,
                    SegmentType::Destination,
                    &plane,
                );
            }
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.update_procedure_details(|details| {
                details.arrival_index = None;
                details.arrival_runway_transition_index = None;
                details.arrival_transition_index = None;
            });
            if !approach_loaded {
                if let Some(airport) = facility.as_ref().and_then(Facility::as_airport) {
                    plan_add_origin_destination_leg(plan, false, airport, runway.as_deref());
                    let segment = plan
                        .segments()
                        .position(|segment| segment.segment_type == SegmentType::Destination);
                    if let Some(segment) = segment {
                        dedupe_segment_start(plan, segment);
                    }
                }
            }
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        nav!("Arrival removed");
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Unloads the approach, drops its missed segment and restores the
    /// plain destination leg.
    pub async fn remove_approach(&self) -> Result<(), FmsError> {
        let token = self.begin_op();
        let destination = {
            let registry = self.registry.read().await;
            let plan = registry.plan(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.destination_airport().map(str::to_string)
        };
        let facility = match &destination {
            Some(icao) => Some(self.loader.get_facility(icao).await?),
            None => None,
        };
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            if self.current_op() != token {
                return Err(FmsError::StaleAsyncResult);
            }
            remove_segments_of_type(&mut registry, PRIMARY_PLAN, SegmentType::Approach, &plane);
            remove_segments_of_type(&mut registry, PRIMARY_PLAN, SegmentType::MissedApproach, &plane);
            ensure_only_one_segment_of_type(
                &mut registry,
                PRIMARY_PLAN,
                SegmentType::Destination,
                &plane,
            );
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            plan.update_procedure_details(|details| {
                details.approach_index = None;
                details.approach_transition_index = None;
                details.visual_runway = None;
                details.destination_runway = None;
            });
            if let Some(airport) = facility.as_ref().and_then(Facility::as_airport) {
                plan_add_origin_destination_leg(plan, false, airport, None);
                let segment = plan
                    .segments()
                    .position(|segment| segment.segment_type == SegmentType::Destination);
                if let Some(segment) = segment {
                    dedupe_segment_start(plan, segment);
                }
            }
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        self.set_approach_data(ApproachDetails::default()).await;
        self.push_approach_frequency(None, false).await;
        nav!("Approach removed");
        self.recompute(PRIMARY_PLAN, 0, token).await
    }

    /// Renders a procedure into the preview slot, groups joined by
    /// discontinuities. The primary plan is untouched.
    pub async fn build_procedure_preview(
        &self,
        airport: &AirportFacility,
        selection: ProcedureSelection,
    ) -> Result<(), FmsError> {
        let groups: Vec<Vec<FlightPlanLeg>> = match selection {
            ProcedureSelection::Departure { index, runway_transition, enroute_transition } => {
                let departure =
                    airport.departures.get(index).ok_or(FmsError::InvalidReference)?;
                let mut groups = Vec::new();
                if let Some(transition) = runway_transition {
                    groups.push(
                        departure
                            .runway_transitions
                            .get(transition)
                            .ok_or(FmsError::InvalidReference)?
                            .legs
                            .clone(),
                    );
                }
                groups.push(departure.common_legs.clone());
                if let Some(transition) = enroute_transition {
                    groups.push(
                        departure
                            .enroute_transitions
                            .get(transition)
                            .ok_or(FmsError::InvalidReference)?
                            .legs
                            .clone(),
                    );
                }
                groups
            }
            ProcedureSelection::Arrival { index, runway_transition, enroute_transition } => {
                let arrival = airport.arrivals.get(index).ok_or(FmsError::InvalidReference)?;
                let mut groups = Vec::new();
                if let Some(transition) = enroute_transition {
                    groups.push(
                        arrival
                            .enroute_transitions
                            .get(transition)
                            .ok_or(FmsError::InvalidReference)?
                            .legs
                            .clone(),
                    );
                }
                groups.push(arrival.common_legs.clone());
                if let Some(transition) = runway_transition {
                    groups.push(
                        arrival
                            .runway_transitions
                            .get(transition)
                            .ok_or(FmsError::InvalidReference)?
                            .legs
                            .clone(),
                    );
                }
                groups
            }
            ProcedureSelection::Approach { index, transition } => {
                let approach = airport.approaches.get(index).ok_or(FmsError::InvalidReference)?;
                let mut groups = Vec::new();
                if let Some(transition) = transition {
                    groups.push(
                        approach
                            .transitions
                            .get(transition)
                            .ok_or(FmsError::InvalidReference)?
                            .legs
                            .clone(),
                    );
                }
                groups.push(approach.final_legs.clone());
                if !approach.missed_legs.is_empty() {
                    groups.push(approach.missed_legs.clone());
                }
                groups
            }
        };
        let token = self.current_op();
        let drained = {
            let mut registry = self.registry.write().await;
            registry.delete_plan(PROC_PREVIEW_PLAN);
            let plan = registry.create_plan(PROC_PREVIEW_PLAN);
            let segment = plan.add_segment(SegmentType::Enroute, None);
            let mut first = true;
            for group in groups {
                if group.is_empty() {
                    continue;
                }
                if !first {
                    let separator = FlightPlanLeg {
                        leg_type: LegType::ThruDiscontinuity,
                        ..Default::default()
                    };
                    plan.add_leg(segment, separator, None, LegFlags::NONE);
                }
                first = false;
                for leg in group {
                    plan.add_leg(segment, leg, None, LegFlags::NONE);
                }
            }
            drain_all_effects(&mut registry)
        };
        self.bus.publish(FmsEvent::PlanCreated { plan_index: PROC_PREVIEW_PLAN });
        self.publish_effects(drained);
        self.recompute(PROC_PREVIEW_PLAN, 0, token).await
    }

    /// Resolves an approach by name.
    ///
    /// # Returns
    /// `AmbiguousProcedure` when several published approaches match.
    pub fn find_approach_index(
        airport: &AirportFacility,
        name: &str,
    ) -> Result<usize, FmsError> {
        let mut matches = airport
            .approaches
            .iter()
            .enumerate()
            .filter(|(_, approach)| approach.name.eq_ignore_ascii_case(name))
            .map(|(index, _)| index);
        match (matches.next(), matches.next()) {
            (Some(index), None) => Ok(index),
            (Some(_), Some(_)) => Err(FmsError::AmbiguousProcedure),
            (None, _) => Err(FmsError::InvalidReference),
        }
    }
}

/// Resolves a duplicate between the last leg of `segment` and the leg
/// directly after it.
fn dedupe_segment_end(plan: &mut FlightPlan, segment: usize) {
    let len = plan.segment(segment).map_or(0, FlightPlanSegment::len);
    if len == 0 {
        return;
    }
    let last = plan.global_index(segment, len - 1);
    let duplicate = match (plan.leg(last), plan.leg(last + 1)) {
        (Some(prev), Some(next)) => {
            is_duplicate_leg(prev, next) || is_duplicate_if_leg(&prev.leg, &next.leg)
        }
        _ => false,
    };
    if duplicate {
        plan_remove_duplicate_leg(plan, last, last + 1);
    }
}

/// Resolves a duplicate between the first leg of `segment` and the leg
/// directly before it.
fn dedupe_segment_start(plan: &mut FlightPlan, segment: usize) {
    if plan.segment(segment).is_none_or(FlightPlanSegment::is_empty) {
        return;
    }
    let offset = plan.segment_offset(segment);
    if offset == 0 {
        return;
    }
    let duplicate = match (plan.leg(offset - 1), plan.leg(offset)) {
        (Some(prev), Some(next)) => {
            is_duplicate_leg(prev, next) || is_duplicate_if_leg(&prev.leg, &next.leg)
        }
        _ => false,
    };
    if duplicate {
        plan_remove_duplicate_leg(plan, offset - 1, offset);
    }
}
