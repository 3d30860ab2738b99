use super::*;
use crate::aircraft::AircraftState;
use crate::event_bus::{EventBus, FmsEvent};
use crate::facility::{AirportFacility, ApproachType, Facility, NavdataStore, RnavTypeFlags};
use crate::flight_plan::{
    FixTypeFlags, FlightPathVector, FlightPlanLeg, LegCalculations, LegFlags, LegType,
    PRIMARY_PLAN, PlanRegistry, SegmentType, VectorFlags,
};
use crate::fms::ApproachDetails;
use crate::geo::{self, GeoCircle, GeoPoint, math};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::sync::broadcast::error::TryRecvError;

fn fix_leg(leg_type: LegType, ident: &str) -> FlightPlanLeg {
    FlightPlanLeg { leg_type, fix_icao: ident.to_string(), ..Default::default() }
}

fn track_vector(start: GeoPoint, end: GeoPoint) -> FlightPathVector {
    let circle = GeoCircle::great_circle_through(&start, &end);
    FlightPathVector {
        flags: VectorFlags::NONE,
        start,
        end,
        circle,
        distance_m: start.distance_m(&end),
    }
}

fn path_calc(vectors: Vec<FlightPathVector>, cumulative_before_m: f64) -> LegCalculations {
    let distance_m: f64 = vectors.iter().map(|vector| vector.distance_m).sum();
    LegCalculations {
        start: vectors.first().map(|vector| vector.start),
        end: vectors.last().map(|vector| vector.end),
        initial_dtk: vectors.first().map(|vector| vector.circle.bearing_at(&vector.start)),
        distance_m,
        cumulative_distance_m: cumulative_before_m + distance_m,
        flight_path: vectors,
        egress: Vec::new(),
    }
}

fn fix_calc(at: GeoPoint) -> LegCalculations {
    LegCalculations { start: Some(at), end: Some(at), ..Default::default() }
}

fn plane_at(pos: GeoPoint) -> AircraftState {
    AircraftState { pos, ..Default::default() }
}

fn tracking(leg: usize) -> LNavState {
    LNavState { is_tracking: true, tracked_leg_index: leg, ..Default::default() }
}

fn airport(icao: &str, pos: GeoPoint) -> Facility {
    Facility::Airport(AirportFacility {
        icao: icao.to_string(),
        name: String::new(),
        pos,
        runways: Vec::new(),
        departures: Vec::new(),
        arrivals: Vec::new(),
        approaches: Vec::new(),
        frequencies: Vec::new(),
    })
}

/// Plan flying due north along the prime meridian: an origin fix at the
/// equator and two one-degree track legs, active on the first track leg.
fn straight_plan() -> PlanRegistry {
    let p0 = GeoPoint::new(0.0, 0.0);
    let p1 = GeoPoint::new(1.0, 0.0);
    let p2 = GeoPoint::new(2.0, 0.0);
    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let origin = plan.add_segment(SegmentType::Origin, None);
        let enroute = plan.add_segment(SegmentType::Enroute, None);
        plan.add_leg(origin, fix_leg(LegType::IF, "KXAA"), None, LegFlags::NONE);
        plan.add_leg(enroute, fix_leg(LegType::TF, "WPT01"), None, LegFlags::NONE);
        plan.add_leg(enroute, fix_leg(LegType::TF, "WPT02"), None, LegFlags::NONE);
        plan.update_leg(origin, 0, |leg| leg.calculated = Some(fix_calc(p0)));
        let first = path_calc(vec![track_vector(p0, p1)], 0.0);
        let first_cumulative = first.cumulative_distance_m;
        plan.update_leg(enroute, 0, |leg| leg.calculated = Some(first));
        plan.update_leg(enroute, 1, |leg| {
            leg.calculated = Some(path_calc(vec![track_vector(p1, p2)], first_cumulative));
        });
        plan.set_active_lateral_leg(1);
    }
    registry
}

fn compute_on(
    registry: &PlanRegistry,
    plane: &AircraftState,
    approach: ApproachDetails,
    lnav: &LNavState,
) -> TrackingData {
    let plan = registry.plan(PRIMARY_PLAN).unwrap();
    TrackingComputer::compute(plan, plane, approach, lnav, None, None)
}

#[test]
fn straight_leg_reports_course_and_cross_track() {
    let registry = straight_plan();
    let plane = plane_at(GeoPoint::new(0.5, 0.1));
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &tracking(1));

    assert!(data.sequencing);
    assert!(math::angle_diff(0.0, data.dtk_true).abs() < 0.5);
    assert!(data.xtk_nm > 5.0 && data.xtk_nm < 7.0, "xtk {}", data.xtk_nm);

    let end = GeoPoint::new(1.0, 0.0);
    assert!((data.waypoint_distance_nm - plane.pos.distance_nm(&end)).abs() < 0.01);
    assert!(data.waypoint_bearing_true > 340.0 && data.waypoint_bearing_true < 355.0);

    let expected_destination =
        plane.pos.distance_nm(&end) + end.distance_nm(&GeoPoint::new(2.0, 0.0));
    assert!((data.destination_distance_nm - expected_destination).abs() < 0.05);
    assert!((data.distance_to_turn_nm - data.waypoint_distance_nm).abs() < 0.01);
    assert!(math::angle_diff(0.0, data.next_dtk_true.unwrap()).abs() < 0.5);
    assert_eq!(data.destination_ete, None);
}

#[test]
fn time_to_destination_needs_ground_speed() {
    let registry = straight_plan();
    let mut plane = plane_at(GeoPoint::new(0.5, 0.0));
    plane.ground_speed_kt = 450.0;
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &tracking(1));

    let seconds = data.destination_ete.unwrap().num_seconds();
    let expected = (data.destination_distance_nm / 450.0 * 3600.0).round() as i64;
    assert_eq!(seconds, expected);
    assert!(seconds > 600 && seconds < 900, "ete {seconds}s");
}

#[test]
fn not_tracking_zeroes_guidance_but_keeps_scale() {
    let registry = straight_plan();
    let plane = plane_at(GeoPoint::new(0.5, 0.1));
    let data =
        compute_on(&registry, &plane, ApproachDetails::default(), &LNavState::default());

    assert!(data.sequencing);
    assert_eq!(data.dtk_true, 0.0);
    assert_eq!(data.xtk_nm, 0.0);
    assert_eq!(data.waypoint_distance_nm, 0.0);
    assert_eq!(data.destination_distance_nm, 0.0);
    assert_eq!(data.cdi_scale_nm, 2.0);
    assert_eq!(data.cdi_scale_label, CdiScaleLabel::Enroute);
}

#[test]
fn obs_reports_selected_course_verbatim() {
    let registry = straight_plan();
    let plane = plane_at(GeoPoint::new(0.5, 0.1));
    let lnav = LNavState {
        obs_active: true,
        obs_course: 215.0,
        xtk_nm: -0.4,
        ..tracking(1)
    };
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &lnav);

    assert_eq!(data.dtk_magnetic, 215.0);
    assert_eq!(data.dtk_true, 215.0);
    assert_eq!(data.xtk_nm, -0.4);
    assert_eq!(data.distance_to_turn_nm, f64::MAX);
    assert!(data.waypoint_distance_nm > 0.0);
    assert!(data.destination_distance_nm > 0.0);
}

#[test]
fn direct_leg_rolls_turn_vector_onto_tangent() {
    let turn_circle = GeoCircle::small_circle(&GeoPoint::new(0.0, 1.0), 0.01);
    let end = turn_circle.closest(&GeoPoint::new(0.0, 0.0));
    let start = turn_circle.offset_along(&end, -0.005);
    let turn = FlightPathVector {
        flags: VectorFlags::TURN,
        start,
        end,
        circle: turn_circle,
        distance_m: 0.005 * geo::EARTH_RADIUS_NM * geo::METERS_PER_NM,
    };

    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let origin = plan.add_segment(SegmentType::Origin, None);
        let enroute = plan.add_segment(SegmentType::Enroute, None);
        plan.add_leg(origin, fix_leg(LegType::IF, "KXAA"), None, LegFlags::NONE);
        plan.add_leg(enroute, fix_leg(LegType::DF, "DCT01"), None, LegFlags::NONE);
        plan.update_leg(origin, 0, |leg| leg.calculated = Some(fix_calc(start)));
        plan.update_leg(enroute, 0, |leg| leg.calculated = Some(path_calc(vec![turn], 0.0)));
        plan.set_active_lateral_leg(1);
    }

    // Ahead of the turn exit along the tangent the desired track stays on
    // the straight-out course and the cross-track stays flat; steering the
    // arc instead would bend several miles away here.
    let tangent = GeoCircle::great_circle(&end, turn_circle.bearing_at(&end));
    let plane = plane_at(tangent.offset_along(&end, 0.005));
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &tracking(1));

    let expected = tangent.bearing_at(&plane.pos);
    assert!(math::angle_diff(expected, data.dtk_true).abs() < 0.2);
    assert!(data.xtk_nm.abs() < 0.05, "xtk {}", data.xtk_nm);
}

#[test]
fn hold_steers_the_circuit_leg_not_the_entry_turn() {
    let fix = GeoPoint::new(1.0, 0.0);
    let inbound_start = GeoPoint::new(0.95, 0.0);
    let entry_circle = GeoCircle::small_circle(&GeoPoint::new(1.02, 0.02), 0.005);
    let entry = FlightPathVector {
        flags: VectorFlags::TURN,
        start: fix,
        end: inbound_start,
        circle: entry_circle,
        distance_m: 10_000.0,
    };
    let mut inbound = track_vector(inbound_start, fix);
    inbound.flags = VectorFlags::HOLD_INBOUND;

    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let origin = plan.add_segment(SegmentType::Origin, None);
        let enroute = plan.add_segment(SegmentType::Enroute, None);
        plan.add_leg(origin, fix_leg(LegType::IF, "KXAA"), None, LegFlags::NONE);
        plan.add_leg(enroute, fix_leg(LegType::HM, "WPT01"), None, LegFlags::NONE);
        plan.update_leg(origin, 0, |leg| leg.calculated = Some(fix_calc(inbound_start)));
        plan.update_leg(enroute, 0, |leg| {
            leg.calculated = Some(path_calc(vec![entry, inbound], 0.0));
        });
        plan.set_active_lateral_leg(1);
    }

    let plane = plane_at(GeoPoint::new(0.97, 0.01));
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &tracking(1));

    assert!(math::angle_diff(0.0, data.dtk_true).abs() < 0.5, "dtk {}", data.dtk_true);
    assert!(data.xtk_nm > 0.3 && data.xtk_nm < 0.9, "xtk {}", data.xtk_nm);
}

#[test]
fn egress_transition_projects_the_next_leg() {
    let p0 = GeoPoint::new(0.0, 0.0);
    let p1 = GeoPoint::new(1.0, 0.0);
    let p2 = GeoPoint::new(1.0, 1.0);
    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let origin = plan.add_segment(SegmentType::Origin, None);
        let enroute = plan.add_segment(SegmentType::Enroute, None);
        plan.add_leg(origin, fix_leg(LegType::IF, "KXAA"), None, LegFlags::NONE);
        plan.add_leg(enroute, fix_leg(LegType::TF, "WPT01"), None, LegFlags::NONE);
        plan.add_leg(enroute, fix_leg(LegType::TF, "WPT02"), None, LegFlags::NONE);
        plan.update_leg(origin, 0, |leg| leg.calculated = Some(fix_calc(p0)));
        let first = path_calc(vec![track_vector(p0, p1)], 0.0);
        let first_cumulative = first.cumulative_distance_m;
        plan.update_leg(enroute, 0, |leg| leg.calculated = Some(first));
        plan.update_leg(enroute, 1, |leg| {
            leg.calculated = Some(path_calc(vec![track_vector(p1, p2)], first_cumulative));
        });
        plan.set_active_lateral_leg(1);
    }

    let plane = plane_at(GeoPoint::new(1.0, 0.05));
    let lnav = LNavState { transition_mode: TransitionMode::Egress, ..tracking(1) };
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &lnav);

    // Desired track comes from the next leg's ingress, bearing and
    // distance still describe the tracked leg's terminator.
    assert!(math::angle_diff(90.0, data.dtk_true).abs() < 1.0, "dtk {}", data.dtk_true);
    assert!(data.waypoint_distance_nm > 2.5 && data.waypoint_distance_nm < 3.5);
    let expected_destination = plane.pos.distance_nm(&p2);
    assert!((data.destination_distance_nm - expected_destination).abs() < 0.1);
}

#[test]
fn departure_scale_opens_up_past_the_initial_climb() {
    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let origin = plan.add_segment(SegmentType::Origin, None);
        let departure = plan.add_segment(SegmentType::Departure, None);
        plan.add_segment(SegmentType::Enroute, None);
        plan.add_leg(origin, fix_leg(LegType::IF, "KXAA"), None, LegFlags::NONE);
        plan.add_leg(departure, fix_leg(LegType::IF, "KXAA-RW04"), None, LegFlags::NONE);
        plan.add_leg(departure, fix_leg(LegType::CA, ""), None, LegFlags::NONE);
        plan.add_leg(departure, fix_leg(LegType::TF, "WPT01"), None, LegFlags::NONE);
        plan.add_leg(departure, fix_leg(LegType::TF, "WPT02"), None, LegFlags::NONE);
    }
    let plane = plane_at(GeoPoint::new(0.0, 0.0));

    // Climbing out behind a CA leg the scale stays tight.
    registry.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(3);
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &LNavState::default());
    assert_eq!(data.cdi_scale_nm, 0.3);
    assert_eq!(data.cdi_scale_label, CdiScaleLabel::Departure);

    // A track leg behind the active leg opens it to terminal.
    registry.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(4);
    let data = compute_on(&registry, &plane, ApproachDetails::default(), &LNavState::default());
    assert_eq!(data.cdi_scale_nm, 1.0);
    assert_eq!(data.cdi_scale_label, CdiScaleLabel::Terminal);
}

#[test]
fn terminal_capture_interpolates_near_an_airport() {
    let registry = straight_plan();
    let origin = GeoPoint::new(0.0, 0.0);
    let destination = GeoPoint::new(2.0, 0.0);
    let plan = registry.plan(PRIMARY_PLAN).unwrap();

    let at = |nm: f64| plane_at(origin.offset(0.0, nm / geo::EARTH_RADIUS_NM));

    let between = TrackingComputer::compute(
        plan,
        &at(30.5),
        ApproachDetails::default(),
        &LNavState::default(),
        Some(origin),
        Some(destination),
    );
    assert!((between.cdi_scale_nm - 1.5).abs() < 0.02, "scale {}", between.cdi_scale_nm);
    assert_eq!(between.cdi_scale_label, CdiScaleLabel::Enroute);

    // just inside the capture radius the ramp has bottomed out
    let boundary = TrackingComputer::compute(
        plan,
        &at(30.0 - 1e-6),
        ApproachDetails::default(),
        &LNavState::default(),
        Some(origin),
        Some(destination),
    );
    assert!((boundary.cdi_scale_nm - 1.0).abs() < 0.02, "scale {}", boundary.cdi_scale_nm);
    assert_eq!(boundary.cdi_scale_label, CdiScaleLabel::Terminal);

    let inside = TrackingComputer::compute(
        plan,
        &at(25.0),
        ApproachDetails::default(),
        &LNavState::default(),
        Some(origin),
        Some(destination),
    );
    assert_eq!(inside.cdi_scale_nm, 1.0);
    assert_eq!(inside.cdi_scale_label, CdiScaleLabel::Terminal);
}

#[test]
fn oceanic_label_far_from_both_airports() {
    let registry = straight_plan();
    let plan = registry.plan(PRIMARY_PLAN).unwrap();
    let data = TrackingComputer::compute(
        plan,
        &plane_at(GeoPoint::new(0.5, 30.0)),
        ApproachDetails::default(),
        &LNavState::default(),
        Some(GeoPoint::new(0.0, 0.0)),
        Some(GeoPoint::new(2.0, 0.0)),
    );
    assert_eq!(data.cdi_scale_nm, 2.0);
    assert_eq!(data.cdi_scale_label, CdiScaleLabel::Oceanic);
}

#[test]
fn arrival_blends_over_the_first_leg_mile() {
    let p1 = GeoPoint::new(1.0, 0.0);
    let p2 = GeoPoint::new(2.0, 0.0);
    let p3 = GeoPoint::new(2.5, 0.0);
    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let origin = plan.add_segment(SegmentType::Origin, None);
        let arrival = plan.add_segment(SegmentType::Arrival, None);
        plan.add_leg(origin, fix_leg(LegType::IF, "KXAA"), None, LegFlags::NONE);
        plan.add_leg(arrival, fix_leg(LegType::IF, "ENTRY"), None, LegFlags::NONE);
        plan.add_leg(arrival, fix_leg(LegType::TF, "WPT01"), None, LegFlags::NONE);
        plan.add_leg(arrival, fix_leg(LegType::TF, "WPT02"), None, LegFlags::NONE);
        plan.update_leg(arrival, 0, |leg| leg.calculated = Some(fix_calc(p1)));
        let first = path_calc(vec![track_vector(p1, p2)], 0.0);
        let first_cumulative = first.cumulative_distance_m;
        plan.update_leg(arrival, 1, |leg| leg.calculated = Some(first));
        plan.update_leg(arrival, 2, |leg| {
            leg.calculated = Some(path_calc(vec![track_vector(p2, p3)], first_cumulative));
        });
        plan.set_active_lateral_leg(2);
    }
    let at = |nm: f64| plane_at(p1.offset(0.0, nm / geo::EARTH_RADIUS_NM));

    let early = compute_on(&registry, &at(0.5), ApproachDetails::default(), &LNavState::default());
    assert!((early.cdi_scale_nm - 1.5).abs() < 0.02, "scale {}", early.cdi_scale_nm);
    assert_eq!(early.cdi_scale_label, CdiScaleLabel::Enroute);

    let settled = compute_on(&registry, &at(5.0), ApproachDetails::default(), &LNavState::default());
    assert_eq!(settled.cdi_scale_nm, 1.0);
    assert_eq!(settled.cdi_scale_label, CdiScaleLabel::Terminal);

    registry.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(3);
    let deeper = compute_on(&registry, &at(40.0), ApproachDetails::default(), &LNavState::default());
    assert_eq!(deeper.cdi_scale_nm, 1.0);
    assert_eq!(deeper.cdi_scale_label, CdiScaleLabel::Terminal);
}

/// Approach plan: intermediate fix, flagged FAF leg, runway leg and one
/// missed leg, active leg selectable per test.
fn approach_plan() -> (PlanRegistry, GeoPoint, GeoPoint) {
    let pi = GeoPoint::new(1.0, 0.0);
    let pf = GeoPoint::new(1.2, 0.0);
    let pr = GeoPoint::new(1.3, 0.0);
    let pm = GeoPoint::new(1.5, 0.0);
    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let origin = plan.add_segment(SegmentType::Origin, None);
        let approach = plan.add_segment(SegmentType::Approach, None);
        plan.add_leg(origin, fix_leg(LegType::IF, "KXAA"), None, LegFlags::NONE);
        plan.add_leg(approach, fix_leg(LegType::IF, "INTER"), None, LegFlags::NONE);
        let mut faf = fix_leg(LegType::CF, "FINAL");
        faf.fix_type_flags = FixTypeFlags::FAF;
        plan.add_leg(approach, faf, None, LegFlags::NONE);
        plan.add_leg(approach, fix_leg(LegType::CF, "RW04"), None, LegFlags::NONE);
        plan.add_leg(approach, fix_leg(LegType::DF, "MAHWP"), None, LegFlags::MISSED_APPROACH);
        plan.update_leg(approach, 0, |leg| leg.calculated = Some(fix_calc(pi)));
        let faf_calc = path_calc(vec![track_vector(pi, pf)], 0.0);
        let faf_cumulative = faf_calc.cumulative_distance_m;
        plan.update_leg(approach, 1, |leg| leg.calculated = Some(faf_calc));
        let runway_calc = path_calc(vec![track_vector(pf, pr)], faf_cumulative);
        let runway_cumulative = runway_calc.cumulative_distance_m;
        plan.update_leg(approach, 2, |leg| leg.calculated = Some(runway_calc));
        plan.update_leg(approach, 3, |leg| {
            leg.calculated = Some(path_calc(vec![track_vector(pr, pm)], runway_cumulative));
        });
    }
    (registry, pf, pr)
}

fn lpv_details() -> ApproachDetails {
    ApproachDetails {
        loaded: true,
        approach_type: ApproachType::Rnav,
        best_rnav_type: RnavTypeFlags::LPV | RnavTypeFlags::LNAV,
        is_active: true,
        is_circling: false,
    }
}

#[test]
fn approach_scale_tightens_towards_the_faf() {
    let (mut registry, pf, _) = approach_plan();
    registry.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(2);
    let at = |nm: f64| plane_at(pf.offset(180.0, nm / geo::EARTH_RADIUS_NM));

    let outside = compute_on(&registry, &at(3.0), lpv_details(), &LNavState::default());
    assert_eq!(outside.cdi_scale_nm, 1.0);
    assert_eq!(outside.cdi_scale_label, CdiScaleLabel::Terminal);

    let capturing = compute_on(&registry, &at(1.0), lpv_details(), &LNavState::default());
    assert!((capturing.cdi_scale_nm - 0.65).abs() < 0.01, "scale {}", capturing.cdi_scale_nm);
    assert_eq!(capturing.cdi_scale_label, CdiScaleLabel::Lpv);
}

#[test]
fn past_the_faf_the_scale_floors_and_missed_legs_snap_back() {
    let (mut registry, _, pr) = approach_plan();
    registry.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(3);
    let length_nm = GeoPoint::new(1.2, 0.0).distance_nm(&pr);
    let plane = plane_at(pr.offset(180.0, 1.0 / geo::EARTH_RADIUS_NM));

    let fin = compute_on(&registry, &plane, lpv_details(), &LNavState::default());
    let expected = 0.3 - 0.112 * ((length_nm - 1.0).clamp(0.0, length_nm) / length_nm);
    assert!((fin.cdi_scale_nm - expected).abs() < 0.005, "scale {}", fin.cdi_scale_nm);
    assert_eq!(fin.cdi_scale_label, CdiScaleLabel::Lpv);

    registry.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(4);
    let missed = compute_on(&registry, &plane, lpv_details(), &LNavState::default());
    assert_eq!(missed.cdi_scale_nm, 1.0);
    assert_eq!(missed.cdi_scale_label, CdiScaleLabel::MissedApproach);
}

#[test]
fn destination_distance_stops_at_the_missed_approach() {
    let (registry, pf, pr) = approach_plan();
    let plane = plane_at(pf.offset(180.0, 2.0 / geo::EARTH_RADIUS_NM));
    let data = compute_on(&registry, &plane, lpv_details(), &tracking(2));

    // Runway leg is the last non-missed leg, the hold beyond it does not
    // stretch the remaining distance.
    let expected = plane.pos.distance_nm(&pf) + pf.distance_nm(&pr);
    assert!((data.destination_distance_nm - expected).abs() < 0.05);
}

#[test]
fn faf_defaults_to_the_penultimate_approach_leg() {
    let (registry, _, _) = approach_plan();
    assert_eq!(TrackingComputer::faf_index(registry.plan(PRIMARY_PLAN).unwrap()), Some(2));

    let mut registry = PlanRegistry::new();
    {
        let plan = registry.create_plan(PRIMARY_PLAN);
        let approach = plan.add_segment(SegmentType::Approach, None);
        plan.add_leg(approach, fix_leg(LegType::IF, "INTER"), None, LegFlags::NONE);
        plan.add_leg(approach, fix_leg(LegType::CF, "FINAL"), None, LegFlags::NONE);
        plan.add_leg(approach, fix_leg(LegType::CF, "RW04"), None, LegFlags::NONE);
    }
    assert_eq!(TrackingComputer::faf_index(registry.plan(PRIMARY_PLAN).unwrap()), Some(1));
}

#[test]
fn approach_labels_follow_type_and_minima() {
    let label = |approach_type, best, circling| {
        TrackingComputer::approach_scale_label(ApproachDetails {
            loaded: true,
            approach_type,
            best_rnav_type: best,
            is_active: true,
            is_circling: circling,
        })
    };

    assert_eq!(label(ApproachType::Gps, RnavTypeFlags::LPV, false), CdiScaleLabel::Lpv);
    assert_eq!(label(ApproachType::Rnav, RnavTypeFlags::LP, false), CdiScaleLabel::LpPlusV);
    assert_eq!(label(ApproachType::Rnav, RnavTypeFlags::LP, true), CdiScaleLabel::Lp);
    assert_eq!(
        label(ApproachType::Rnav, RnavTypeFlags::LNAV_VNAV, false),
        CdiScaleLabel::LnavVnav
    );
    assert_eq!(label(ApproachType::Rnav, RnavTypeFlags::LNAV, false), CdiScaleLabel::LnavPlusV);
    assert_eq!(label(ApproachType::Rnav, RnavTypeFlags::LNAV, true), CdiScaleLabel::Lnav);
    assert_eq!(label(ApproachType::Visual, RnavTypeFlags::NONE, false), CdiScaleLabel::Visual);
    assert_eq!(label(ApproachType::Ils, RnavTypeFlags::NONE, false), CdiScaleLabel::Terminal);
}

struct Harness {
    registry: Arc<RwLock<PlanRegistry>>,
    plane: Arc<RwLock<AircraftState>>,
    bus: Arc<EventBus>,
    computer: TrackingComputer,
}

fn harness(registry: PlanRegistry, store: NavdataStore) -> Harness {
    let registry = Arc::new(RwLock::new(registry));
    let bus = Arc::new(EventBus::new());
    let plane = Arc::new(RwLock::new(AircraftState::default()));
    let computer = TrackingComputer::new(
        Arc::clone(&registry),
        Arc::new(store),
        Arc::clone(&bus),
        Arc::clone(&plane),
    );
    Harness { registry, plane, bus, computer }
}

fn drain_events(
    receiver: &mut tokio::sync::broadcast::Receiver<FmsEvent>,
) -> Vec<FmsEvent> {
    let mut events = Vec::new();
    loop {
        match receiver.try_recv() {
            Ok(event) => events.push(event),
            Err(TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

#[tokio::test]
async fn obs_availability_follows_the_active_leg_type() {
    let mut registry = straight_plan();
    {
        let plan = registry.plan_mut(PRIMARY_PLAN).unwrap();
        plan.add_leg(1, fix_leg(LegType::CA, ""), None, LegFlags::NONE);
    }
    let harness = harness(registry, NavdataStore::new());
    let mut receiver = harness.bus.subscribe();

    // Active TF leg allows an OBS course.
    harness.computer.update(&LNavState::default()).await;
    let events = drain_events(&mut receiver);
    assert!(events.iter().any(|e| matches!(e, FmsEvent::ObsAvailable(true))));
    assert!(events.iter().any(|e| matches!(e, FmsEvent::Tracking(_))));

    // Altitude legs cannot carry one; the flag drops once and stays quiet.
    harness.registry.write().await.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(3);
    harness.computer.update(&LNavState::default()).await;
    let events = drain_events(&mut receiver);
    assert!(events.iter().any(|e| matches!(e, FmsEvent::ObsAvailable(false))));

    harness.computer.update(&LNavState::default()).await;
    let events = drain_events(&mut receiver);
    assert!(!events.iter().any(|e| matches!(e, FmsEvent::ObsAvailable(_))));
}

#[tokio::test]
async fn airport_positions_come_through_the_loader() {
    let mut registry = straight_plan();
    {
        let plan = registry.plan_mut(PRIMARY_PLAN).unwrap();
        plan.set_origin_airport(Some("KXAA".to_string()));
        plan.set_destination_airport(Some("KXBB".to_string()));
    }
    let mut store = NavdataStore::new();
    store.insert_facility(airport("KXAA", GeoPoint::new(0.0, 0.0)));
    store.insert_facility(airport("KXBB", GeoPoint::new(2.0, 0.0)));
    let harness = harness(registry, store);

    let origin = GeoPoint::new(0.0, 0.0);
    *harness.plane.write().await = plane_at(origin.offset(0.0, 25.0 / geo::EARTH_RADIUS_NM));
    let mut receiver = harness.bus.subscribe();
    harness.computer.update(&LNavState::default()).await;

    let data = drain_events(&mut receiver)
        .into_iter()
        .find_map(|event| match event {
            FmsEvent::Tracking(data) => Some(*data),
            _ => None,
        })
        .unwrap();
    assert_eq!(data.cdi_scale_nm, 1.0);
    assert_eq!(data.cdi_scale_label, CdiScaleLabel::Terminal);
}

#[tokio::test]
async fn approach_details_update_the_scale_label() {
    let (mut registry, pf, _) = approach_plan();
    registry.plan_mut(PRIMARY_PLAN).unwrap().set_active_lateral_leg(2);
    let harness = harness(registry, NavdataStore::new());
    *harness.plane.write().await = plane_at(pf.offset(180.0, 1.0 / geo::EARTH_RADIUS_NM));

    harness.computer.handle_event(&FmsEvent::ApproachDetails(lpv_details())).await;
    let mut receiver = harness.bus.subscribe();
    harness.computer.update(&LNavState::default()).await;

    let data = drain_events(&mut receiver)
        .into_iter()
        .find_map(|event| match event {
            FmsEvent::Tracking(data) => Some(*data),
            _ => None,
        })
        .unwrap();
    assert_eq!(data.cdi_scale_label, CdiScaleLabel::Lpv);
}
