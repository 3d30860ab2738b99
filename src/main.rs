#![allow(dead_code, clippy::similar_names)]
#![warn(clippy::shadow_reuse, clippy::shadow_same, clippy::builtin_type_shadow)]
mod aircraft;
mod event_bus;
mod facility;
mod flight_plan;
mod fms;
mod geo;
mod keychain;
mod logger;
mod nav_source;
mod tracking;

use crate::aircraft::AircraftState;
use crate::event_bus::FmsEvent;
use crate::facility::{
    AirportFacility, Airway, AirwayFix, ApproachProcedure, ApproachType, Facility,
    FacilityFrequency, FacilityLoader, NavdataHttpClient, NavdataStore, OneWayRunway,
    ProcedureTransition, RnavTypeFlags, RunwayDesignator, VorFacility, WaypointFacility,
};
use crate::flight_plan::{
    FixTypeFlags, FlightPlan, FlightPlanLeg, LegFlags, LegType, PRIMARY_PLAN, SegmentType,
};
use crate::fms::Fms;
use crate::geo::{EARTH_RADIUS_NM, GeoPoint};
use crate::keychain::Keychain;
use crate::nav_source::NavSourceTracker;
use crate::tracking::LNavState;
use fixed::types::I32F32;
use std::{env, sync::Arc, time::Duration};
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;

/// Wall-clock pacing of the simulation loop.
const TICK: Duration = Duration::from_millis(25);
/// Simulated seconds that pass per tick.
const TIME_COMPRESSION_S: f64 = 10.0;
/// Distance at which the demo director sequences onto the next leg.
const SEQUENCE_RADIUS_NM: f64 = 0.6;
const CRUISE_SPEED_KT: f64 = 180.0;

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    let base_url_var = env::var("NAVDATA_BASE_URL");
    let keychain = match base_url_var.as_ref() {
        Ok(url) => {
            info!("Navdata served from {url}");
            Keychain::new(Arc::new(NavdataHttpClient::new(url)))
        }
        Err(_) => {
            let store = seed_demo_world();
            info!(
                "NAVDATA_BASE_URL not set, using the built-in demo world with {} facilities",
                store.len()
            );
            Keychain::new(Arc::new(store))
        }
    };

    let token = CancellationToken::new();
    let cdi = tokio::spawn(run_cdi(
        NavSourceTracker::new(keychain.bus()),
        keychain.bus().subscribe(),
        token.clone(),
    ));

    demo_flight(&keychain).await;

    token.cancel();
    let _ = cdi.await;
}

/// Consumes bus traffic the way a cockpit HSI would: keeps the source
/// records current and logs whenever the annunciated sensitivity moves.
async fn run_cdi(
    mut tracker: NavSourceTracker,
    mut events: tokio::sync::broadcast::Receiver<FmsEvent>,
    token: CancellationToken,
) {
    let mut last_sensitivity = tracker.sensitivity();
    loop {
        let event = tokio::select! {
            () = token.cancelled() => break,
            received = events.recv() => match received {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("CDI consumer lagged, {skipped} events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            },
        };
        if let FmsEvent::TuneNavRadio { radio, frequency, activate } = &event {
            nav!(
                "NAV{radio} standby set to {} ({}), activate: {activate}",
                frequency.mhz, frequency.name
            );
        }
        tracker.handle_event(&event);
        let sensitivity = tracker.sensitivity();
        if sensitivity != last_sensitivity {
            nav!(
                "CDI {} sensitivity {sensitivity}, full scale {:.2} NM",
                tracker.active_source(),
                tracker.active_record().deviation_scale
            );
            last_sensitivity = sensitivity;
        }
    }
}

/// Builds a complete plan through the engine, then walks the aircraft down
/// it while the tracking computer reports guidance: origin and destination
/// with runways, a VOR fix, an airway stretch and an RNAV approach flown
/// through to the published missed.
async fn demo_flight(keychain: &Keychain) {
    let fms = keychain.fms();
    let loader = keychain.loader();
    let tracking = keychain.tracking();
    fms.initialize().await;

    let origin = demo_airport(&loader, "KXAA").await;
    let destination = demo_airport(&loader, "KXBB").await;
    fms.set_origin(&origin, Some("04"))
        .await
        .unwrap_or_else(|e| fatal!("Origin rejected: {e}"));
    fms.set_destination(&destination, Some("22"))
        .await
        .unwrap_or_else(|e| fatal!("Destination rejected: {e}"));

    let enroute = enroute_segment(&fms).await;
    for ident in ["DOTRA", "BRAVO"] {
        let facility = loader
            .get_facility(ident)
            .await
            .unwrap_or_else(|e| fatal!("{ident} missing from navdata: {e}"));
        fms.insert_waypoint(enroute, &facility, None)
            .await
            .unwrap_or_else(|e| fatal!("Waypoint {ident} rejected: {e}"));
    }
    let bravo = loader
        .get_facility("BRAVO")
        .await
        .unwrap_or_else(|e| fatal!("BRAVO missing from navdata: {e}"));
    fms.insert_airway_segment(&bravo, "V4", "CHARD")
        .await
        .unwrap_or_else(|e| fatal!("Airway V4 rejected: {e}"));

    let approach_index = Fms::find_approach_index(&destination, "RNAV 22")
        .unwrap_or_else(|e| fatal!("No RNAV 22 at {}: {e}", destination.icao));
    fms.insert_approach(&destination, approach_index, Some(0), 0)
        .await
        .unwrap_or_else(|e| fatal!("Approach rejected: {e}"));

    let start = origin.runway("04").map_or(origin.pos, |runway| runway.pos);
    *keychain.plane().write().await = AircraftState {
        pos: start,
        altitude_m: origin.elevation_m(),
        heading_true: 43.0,
        ground_speed_kt: CRUISE_SPEED_KT,
        magvar: 0.0,
        on_ground: false,
    };

    let leg_count = fms
        .with_plan(PRIMARY_PLAN, FlightPlan::leg_count)
        .await
        .unwrap_or(0);
    info!("Primary plan ready with {leg_count} legs");
    if let Some(ete) = fms.estimated_time_enroute().await {
        info!("Estimated time enroute {} min", ete.num_minutes());
    }

    info!("Departing {} runway 04", origin.icao);
    let mut lnav = LNavState::default();
    let mut approach_activated = false;
    let mut ticks: u64 = 0;
    let mut went_missed = false;
    loop {
        let Ok(Some((active, end, leg_name, in_approach, next_exists, next_is_missed))) = fms
            .with_plan(PRIMARY_PLAN, |plan| {
                let active = plan.active_lateral_leg();
                let leg = plan.leg(active)?;
                let calc = leg.calculated.as_ref()?;
                let in_approach = plan
                    .segment_of(active)
                    .and_then(|segment_index| plan.segment(segment_index))
                    .is_some_and(|segment| segment.segment_type == SegmentType::Approach);
                let next = plan.leg(active + 1);
                let next_is_missed =
                    next.is_some_and(|leg| leg.flags.contains(LegFlags::MISSED_APPROACH));
                Some((active, calc.end?, leg.name.clone(), in_approach, next.is_some(), next_is_missed))
            })
            .await
        else {
            warn!("Active leg has no geometry, ending the flight");
            break;
        };

        if in_approach && !approach_activated {
            approach_activated = true;
            fms.activate_approach()
                .await
                .unwrap_or_else(|e| fatal!("Approach activation failed: {e}"));
            continue;
        }

        let remaining_nm = {
            let plane_lock = keychain.plane();
            let mut plane = plane_lock.write().await;
            let bearing = plane.pos.bearing_to(&end);
            let step_nm = plane.ground_speed_kt * TIME_COMPRESSION_S / 3600.0;
            plane.pos = plane.pos.offset(bearing, step_nm / EARTH_RADIUS_NM);
            plane.heading_true = bearing;
            plane.pos.distance_nm(&end)
        };

        lnav.is_tracking = true;
        lnav.tracked_leg_index = active;
        tracking.update(&lnav).await;

        if remaining_nm <= SEQUENCE_RADIUS_NM {
            if !next_exists {
                info!("Holding at {leg_name}, flight complete");
                break;
            }
            if next_is_missed && !went_missed {
                if fms.can_missed_approach_activate().await {
                    went_missed = true;
                    info!("Going around at {leg_name}");
                    fms.activate_missed_approach()
                        .await
                        .unwrap_or_else(|e| fatal!("Missed approach rejected: {e}"));
                    continue;
                }
                info!("Arrived at {}", destination.icao);
                break;
            }
            log!("Sequencing past {leg_name}");
            let registry_lock = keychain.registry();
            let mut registry = registry_lock.write().await;
            if let Some(plan) = registry.plan_mut(PRIMARY_PLAN) {
                plan.set_active_lateral_leg(active + 1);
                let _ = plan.take_effects();
            }
        }

        ticks += 1;
        if ticks % 120 == 0 {
            if let Some(ete) = fms.estimated_time_enroute().await {
                log!("Tracking {leg_name}, ETE {} min", ete.num_minutes());
            }
        }
        tokio::time::sleep(TICK).await;
    }
    info!("Demo flight complete");
}

async fn demo_airport(loader: &Arc<dyn FacilityLoader>, icao: &str) -> AirportFacility {
    match loader.get_facility(icao).await {
        Ok(facility) => match facility.as_airport() {
            Some(airport) => airport.clone(),
            None => fatal!("{icao} is not an airport"),
        },
        Err(e) => fatal!("{icao} missing from navdata: {e}"),
    }
}

async fn enroute_segment(fms: &Fms) -> usize {
    fms.with_plan(PRIMARY_PLAN, |plan| {
        plan.segments()
            .position(|segment| segment.segment_type == SegmentType::Enroute)
    })
    .await
    .ok()
    .flatten()
    .unwrap_or_else(|| fatal!("Primary plan has no enroute segment"))
}

/// Self-contained navdata for the demo flight: two airports with runways,
/// a VOR, a low airway and an RNAV approach with LPV minima.
fn seed_demo_world() -> NavdataStore {
    let mut store = NavdataStore::new();

    store.insert_facility(Facility::Airport(AirportFacility {
        icao: "KXAA".to_string(),
        name: "Ashford Field".to_string(),
        pos: GeoPoint::new(46.90, -122.30),
        runways: vec![
            OneWayRunway {
                designation: "04".to_string(),
                pos: GeoPoint::new(46.895, -122.31),
                elevation_m: 90.0,
                course: 43.0,
                ils_frequency: None,
            },
            OneWayRunway {
                designation: "22".to_string(),
                pos: GeoPoint::new(46.905, -122.29),
                elevation_m: 90.0,
                course: 223.0,
                ils_frequency: None,
            },
        ],
        departures: Vec::new(),
        arrivals: Vec::new(),
        approaches: Vec::new(),
        frequencies: vec![FacilityFrequency {
            name: "TWR".to_string(),
            mhz: I32F32::lit("118.30"),
        }],
    }));

    let zetla = GeoPoint::new(48.40, -120.52);
    let wovak = GeoPoint::new(48.31, -120.645);
    let threshold = GeoPoint::new(48.21, -120.79);
    let rnav22 = ApproachProcedure {
        name: "RNAV 22".to_string(),
        approach_type: ApproachType::Rnav,
        runway_number: 22,
        runway_designator: RunwayDesignator::None,
        transitions: vec![ProcedureTransition {
            name: "ZETLA".to_string(),
            legs: vec![fix_leg(LegType::IF, "ZETLA", zetla, FixTypeFlags::IAF)],
        }],
        final_legs: vec![
            fix_leg(LegType::IF, "ZETLA", zetla, FixTypeFlags::IAF),
            course_leg(LegType::CF, "WOVAK", wovak, 223.0, FixTypeFlags::FAF),
            course_leg(LegType::CF, "RW22", threshold, 223.0, FixTypeFlags::MAP),
        ],
        missed_legs: vec![
            FlightPlanLeg {
                leg_type: LegType::CA,
                course: 223.0,
                altitude1: 900.0,
                ..Default::default()
            },
            fix_leg(
                LegType::DF,
                "MAHWP",
                GeoPoint::new(48.05, -121.00),
                FixTypeFlags::MAHP,
            ),
        ],
        rnav_type_flags: RnavTypeFlags::LPV | RnavTypeFlags::LNAV,
    };
    store.insert_facility(Facility::Airport(AirportFacility {
        icao: "KXBB".to_string(),
        name: "Barton Ridge Regional".to_string(),
        pos: GeoPoint::new(48.20, -120.80),
        runways: vec![
            OneWayRunway {
                designation: "04".to_string(),
                pos: GeoPoint::new(48.19, -120.81),
                elevation_m: 350.0,
                course: 43.0,
                ils_frequency: None,
            },
            OneWayRunway {
                designation: "22".to_string(),
                pos: threshold,
                elevation_m: 350.0,
                course: 223.0,
                ils_frequency: None,
            },
        ],
        departures: Vec::new(),
        arrivals: Vec::new(),
        approaches: vec![rnav22],
        frequencies: vec![FacilityFrequency {
            name: "TWR".to_string(),
            mhz: I32F32::lit("119.10"),
        }],
    }));

    store.insert_facility(Facility::Vor(VorFacility {
        icao: "DOTRA".to_string(),
        pos: GeoPoint::new(47.15, -121.95),
        frequency: FacilityFrequency {
            name: "DOTRA".to_string(),
            mhz: I32F32::lit("113.40"),
        },
        magnetic_variation: 0.0,
    }));

    let airway_fixes = [
        ("BRAVO", 47.45, -121.55),
        ("EDGAR", 47.70, -121.30),
        ("CHARD", 47.95, -121.05),
    ];
    for (ident, lat, lon) in airway_fixes {
        store.insert_facility(Facility::Waypoint(WaypointFacility {
            icao: ident.to_string(),
            pos: GeoPoint::new(lat, lon),
        }));
    }
    store.insert_airway(Airway {
        name: "V4".to_string(),
        fixes: airway_fixes
            .iter()
            .map(|(ident, lat, lon)| AirwayFix {
                ident: (*ident).to_string(),
                pos: GeoPoint::new(*lat, *lon),
            })
            .collect(),
    });

    for (ident, pos) in [
        ("ZETLA", zetla),
        ("WOVAK", wovak),
        ("MAHWP", GeoPoint::new(48.05, -121.00)),
    ] {
        store.insert_facility(Facility::Waypoint(WaypointFacility {
            icao: ident.to_string(),
            pos,
        }));
    }

    store.rebuild_airport_index();
    store
}

fn fix_leg(leg_type: LegType, ident: &str, pos: GeoPoint, flags: FixTypeFlags) -> FlightPlanLeg {
    FlightPlanLeg {
        leg_type,
        fix_icao: ident.to_string(),
        pos: Some(pos),
        fix_type_flags: flags,
        ..Default::default()
    }
}

fn course_leg(
    leg_type: LegType,
    ident: &str,
    pos: GeoPoint,
    course: f64,
    flags: FixTypeFlags,
) -> FlightPlanLeg {
    FlightPlanLeg {
        course,
        ..fix_leg(leg_type, ident, pos, flags)
    }
}
