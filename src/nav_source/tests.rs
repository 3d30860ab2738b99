use super::*;
use crate::event_bus::{EventBus, FmsEvent};
use crate::facility::{ApproachType, RnavTypeFlags};
use crate::fms::ApproachDetails;
use crate::tracking::{CdiScaleLabel, TrackingData};
use fixed::types::I32F32;
use std::sync::Arc;
use tokio::sync::broadcast::error::TryRecvError;

fn tracker() -> (NavSourceTracker, tokio::sync::broadcast::Receiver<FmsEvent>) {
    let bus = Arc::new(EventBus::new());
    let events = bus.subscribe();
    (NavSourceTracker::new(bus), events)
}

fn tracking_data(dtk_magnetic: f64, xtk_nm: f64) -> TrackingData {
    TrackingData {
        sequencing: true,
        dtk_magnetic,
        xtk_nm,
        waypoint_bearing_magnetic: dtk_magnetic,
        waypoint_distance_nm: 12.0,
        cdi_scale_nm: 2.0,
        cdi_scale_label: CdiScaleLabel::Enroute,
        ..Default::default()
    }
}

fn lpv_details() -> ApproachDetails {
    ApproachDetails {
        loaded: true,
        approach_type: ApproachType::Rnav,
        best_rnav_type: RnavTypeFlags::LPV,
        is_active: true,
        is_circling: false,
    }
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

#[test]
fn gps_record_follows_tracking_updates() {
    let (mut tracker, _events) = tracker();

    tracker.handle_event(&FmsEvent::Tracking(Box::new(tracking_data(90.0, 0.5))));

    let record = tracker.record(NavSourceId::Gps);
    assert!(record.valid);
    assert_eq!(record.course, Some(90.0));
    assert_eq!(record.deviation, Some(-0.25));
    assert_eq!(record.deviation_scale, 2.0);
    assert_eq!(record.scale_label, Some(CdiScaleLabel::Enroute));
    assert_eq!(record.to_from, VorToFrom::To);
    assert_eq!(record.bearing, Some(90.0));
    assert_eq!(record.distance_nm, Some(12.0));
    assert_eq!(tracker.active_source(), NavSourceId::Gps);
    assert_eq!(tracker.sensitivity(), NavSensitivity::Enroute);
}

#[test]
fn bearing_well_off_the_track_reads_from() {
    let (mut tracker, _events) = tracker();

    let mut data = tracking_data(90.0, 0.0);
    data.waypoint_bearing_magnetic = 200.0;
    tracker.handle_event(&FmsEvent::Tracking(Box::new(data)));
    assert_eq!(tracker.record(NavSourceId::Gps).to_from, VorToFrom::To);

    let mut data = tracking_data(90.0, 0.0);
    data.waypoint_bearing_magnetic = 250.0;
    tracker.handle_event(&FmsEvent::Tracking(Box::new(data)));
    assert_eq!(tracker.record(NavSourceId::Gps).to_from, VorToFrom::From);
}

#[test]
fn lost_guidance_falls_back_to_heading() {
    let (mut tracker, _events) = tracker();
    tracker.set_heading(123.0);

    let mut data = tracking_data(90.0, 0.5);
    data.sequencing = false;
    tracker.handle_event(&FmsEvent::Tracking(Box::new(data)));

    let record = tracker.record(NavSourceId::Gps);
    assert!(!record.valid);
    assert_eq!(record.course, Some(123.0));
    assert_eq!(record.to_from, VorToFrom::Off);
}

#[test]
fn nav_deviation_normalizes_receiver_counts() {
    let (mut tracker, _events) = tracker();

    tracker.set_cdi_deviation(1, Some(63.5));
    let record = tracker.record(NavSourceId::Nav1);
    assert!(record.valid);
    assert_eq!(record.deviation, Some(0.5));

    tracker.set_cdi_deviation(1, None);
    let record = tracker.record(NavSourceId::Nav1);
    assert!(!record.valid);
    assert_eq!(record.deviation, None);
}

#[test]
fn selecting_a_localizer_radio_slews_the_obs() {
    let (mut tracker, mut events) = tracker();

    tracker.set_frequency(1, I32F32::from_num(110.3));
    tracker.set_localizer_frequency(1, true);
    tracker.set_localizer(1, true, Some(215.4));
    assert!(drain_events(&mut events).is_empty());

    tracker.select_source(NavSourceId::Nav1);

    assert_eq!(tracker.active_source(), NavSourceId::Nav1);
    assert_eq!(tracker.sensitivity(), NavSensitivity::Ils);
    assert_eq!(tracker.record(NavSourceId::Nav1).course, Some(215.0));
    let slewed = drain_events(&mut events).into_iter().any(|event| {
        matches!(event, FmsEvent::SlewObs { radio: 1, course } if course == 215.0)
    });
    assert!(slewed);
}

#[test]
fn localizer_capture_on_the_active_radio_slews() {
    let (mut tracker, mut events) = tracker();
    tracker.select_source(NavSourceId::Nav1);
    assert_eq!(tracker.sensitivity(), NavSensitivity::Vor);
    assert!(drain_events(&mut events).is_empty());

    tracker.set_localizer_frequency(1, true);
    tracker.set_localizer(1, true, Some(88.6));

    assert_eq!(tracker.sensitivity(), NavSensitivity::Ils);
    let slewed = drain_events(&mut events).into_iter().any(|event| {
        matches!(event, FmsEvent::SlewObs { radio: 1, course } if course == 89.0)
    });
    assert!(slewed);
}

#[test]
fn gps_sensitivity_follows_the_scale_label_and_latches_missed() {
    let (mut tracker, _events) = tracker();

    let mut data = tracking_data(90.0, 0.0);
    data.cdi_scale_nm = 0.3;
    data.cdi_scale_label = CdiScaleLabel::Lpv;
    tracker.handle_event(&FmsEvent::Tracking(Box::new(data)));
    assert_eq!(tracker.sensitivity(), NavSensitivity::Lpv);
    assert!(!tracker.missed_approach_active());

    let mut data = tracking_data(90.0, 0.0);
    data.cdi_scale_label = CdiScaleLabel::MissedApproach;
    tracker.handle_event(&FmsEvent::Tracking(Box::new(data)));
    assert_eq!(tracker.sensitivity(), NavSensitivity::MissedApproach);
    assert!(tracker.missed_approach_active());

    // The latch outlives the label itself.
    let mut data = tracking_data(90.0, 0.0);
    data.cdi_scale_label = CdiScaleLabel::Terminal;
    tracker.handle_event(&FmsEvent::Tracking(Box::new(data)));
    assert_eq!(tracker.sensitivity(), NavSensitivity::Terminal);
    assert!(tracker.missed_approach_active());

    let details = ApproachDetails {
        is_active: false,
        ..lpv_details()
    };
    tracker.handle_event(&FmsEvent::ApproachDetails(details));
    assert!(!tracker.missed_approach_active());
}

#[test]
fn ils_activation_switches_the_source_to_nav1() {
    let (mut tracker, _events) = tracker();
    let details = ApproachDetails {
        loaded: true,
        approach_type: ApproachType::Ils,
        is_active: true,
        ..Default::default()
    };
    tracker.handle_event(&FmsEvent::ApproachDetails(details));

    tracker.handle_event(&FmsEvent::ApproachActivated);

    assert_eq!(tracker.active_source(), NavSourceId::Nav1);
}

#[test]
fn rnav_activation_stays_on_gps() {
    let (mut tracker, _events) = tracker();
    tracker.handle_event(&FmsEvent::ApproachDetails(lpv_details()));

    tracker.handle_event(&FmsEvent::ApproachActivated);

    assert_eq!(tracker.active_source(), NavSourceId::Gps);
}

#[test]
fn glidepath_shows_only_inside_the_gate() {
    let (mut tracker, _events) = tracker();

    // No approach loaded, the sample alone opens nothing.
    tracker.set_vertical_guidance(10.0, 20_000.0);
    assert!(!tracker.record(NavSourceId::Gps).has_glideslope);

    // Loading the approach re-gates the stored sample.
    tracker.handle_event(&FmsEvent::ApproachDetails(lpv_details()));
    let record = tracker.record(NavSourceId::Gps);
    assert!(record.has_glideslope);
    let deviation = record.glideslope_deviation.unwrap();
    let full_scale = (2.0_f64.to_radians().tan() * 20_000.0).clamp(200.0, 1000.0);
    assert!((deviation - 10.0 / -full_scale).abs() < 1e-9);
    assert!(deviation < 0.0);

    tracker.set_vertical_guidance(10.0, 40_000.0);
    assert!(!tracker.record(NavSourceId::Gps).has_glideslope);

    tracker.set_vertical_guidance(10.0, 20_000.0);
    let details = ApproachDetails {
        is_circling: true,
        ..lpv_details()
    };
    tracker.handle_event(&FmsEvent::ApproachDetails(details));
    assert!(!tracker.record(NavSourceId::Gps).has_glideslope);
}

#[test]
fn close_to_the_faf_the_beam_narrows_to_its_floor() {
    let (mut tracker, _events) = tracker();
    tracker.handle_event(&FmsEvent::ApproachDetails(lpv_details()));

    tracker.set_vertical_guidance(-50.0, 1_000.0);

    // tan(2 deg) * 1000 m sits under the 200 m floor.
    let deviation = tracker
        .record(NavSourceId::Gps)
        .glideslope_deviation
        .unwrap();
    assert!((deviation - 0.25).abs() < 1e-9);
}

#[test]
fn obs_outranks_susp() {
    let (mut tracker, _events) = tracker();
    assert_eq!(tracker.obs_susp_mode(), ObsSuspMode::None);

    tracker.handle_event(&FmsEvent::SuspendSequencing(true));
    assert_eq!(tracker.obs_susp_mode(), ObsSuspMode::Susp);

    tracker.set_obs_active(true);
    assert_eq!(tracker.obs_susp_mode(), ObsSuspMode::Obs);

    tracker.set_obs_active(false);
    assert_eq!(tracker.obs_susp_mode(), ObsSuspMode::Susp);

    tracker.handle_event(&FmsEvent::SuspendSequencing(false));
    assert_eq!(tracker.obs_susp_mode(), ObsSuspMode::None);
}

#[test]
fn radio_inputs_land_on_their_records() {
    let (mut tracker, _events) = tracker();

    tracker.set_frequency(2, I32F32::from_num(113.8));
    tracker.set_dme(2, true);
    tracker.set_to_from(2, VorToFrom::From);
    tracker.set_glideslope(2, true, Some(-0.3));
    tracker.set_obs(2, 402.0);

    let record = tracker.record(NavSourceId::Nav2);
    assert_eq!(record.frequency_mhz, Some(I32F32::from_num(113.8)));
    assert!(record.has_dme);
    assert_eq!(record.to_from, VorToFrom::From);
    assert!(record.has_glideslope);
    assert_eq!(record.glideslope_deviation, Some(-0.3));
    assert_eq!(record.course, Some(42.0));

    // Radios outside 1..=2 are ignored.
    tracker.set_dme(3, true);
    assert!(!tracker.record(NavSourceId::Nav1).has_dme);
}
