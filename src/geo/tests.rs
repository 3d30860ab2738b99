use super::math::{angle_diff, magnetic_to_true, normalize_heading, true_to_magnetic};
use super::{EARTH_RADIUS_NM, GeoCircle, GeoPoint};
use std::f64::consts::{FRAC_PI_2, PI};

const EPS: f64 = 1e-6;

#[test]
fn heading_normalization_wraps_into_range() {
    assert!((normalize_heading(370.0_f64) - 10.0).abs() < EPS);
    assert!((normalize_heading(-10.0_f64) - 350.0).abs() < EPS);
    assert!((normalize_heading(720.0_f64)).abs() < EPS);
    assert!((normalize_heading(359.5_f32) - 359.5).abs() < 1e-3);

    for _ in 0..100 {
        let raw = rand::random_range(-1000.0..1000.0);
        let norm = normalize_heading(raw);
        assert!((0.0..360.0).contains(&norm), "{raw} -> {norm}");
    }
}

#[test]
fn angle_diff_takes_shortest_rotation() {
    assert!((angle_diff(350.0_f64, 10.0) - 20.0).abs() < EPS);
    assert!((angle_diff(10.0_f64, 350.0) + 20.0).abs() < EPS);
    assert!((angle_diff(0.0_f64, 180.0) - 180.0).abs() < EPS);
    assert!((angle_diff(90.0_f64, 90.0)).abs() < EPS);
}

#[test]
fn magnetic_conversion_round_trips() {
    let course = 123.4;
    let magvar = -14.0;
    let magnetic = true_to_magnetic(course, magvar);
    assert!((magnetic_to_true(magnetic, magvar) - course).abs() < EPS);
}

#[test]
fn equatorial_bearing_and_distance() {
    let a = GeoPoint::new(0.0, 0.0);
    let b = GeoPoint::new(0.0, 1.0);
    assert!((a.bearing_to(&b) - 90.0).abs() < 1e-3);
    // one degree of longitude on the equator is sixty nautical miles
    assert!((a.distance_nm(&b) - EARTH_RADIUS_NM.to_radians()).abs() < 1e-3);
}

#[test]
fn offset_round_trips_through_bearing_and_distance() {
    let start = GeoPoint::new(42.0, -71.0);
    let dest = start.offset(137.0, 25.0 / EARTH_RADIUS_NM);
    assert!((start.distance_nm(&dest) - 25.0).abs() < 1e-3);
    assert!((start.bearing_to(&dest) - 137.0).abs() < 1e-2);
}

#[test]
fn cross_track_sign_is_positive_right_of_path() {
    // northbound path through the origin
    let path = GeoCircle::great_circle(&GeoPoint::new(0.0, 0.0), 0.0);
    let east = GeoPoint::new(0.0, 1.0);
    let west = GeoPoint::new(0.0, -1.0);
    assert!(path.cross_track(&east) > 0.0);
    assert!(path.cross_track(&west) < 0.0);
    assert!(path.cross_track(&GeoPoint::new(5.0, 0.0)).abs() < EPS);
}

#[test]
fn bearing_at_matches_construction_course() {
    let point = GeoPoint::new(51.0, 7.0);
    for course in [0.0, 45.0, 138.0, 270.5] {
        let path = GeoCircle::great_circle(&point, course);
        assert!(
            (path.bearing_at(&point) - course).abs() < 1e-6,
            "course {course}"
        );
    }
}

#[test]
fn offset_along_advances_down_the_path() {
    let path = GeoCircle::great_circle(&GeoPoint::new(0.0, 0.0), 90.0);
    let moved = path.offset_along(&GeoPoint::new(0.0, 0.0), 2.0_f64.to_radians());
    assert!((moved.lon() - 2.0).abs() < 1e-6);
    assert!(moved.lat().abs() < 1e-6);
}

#[test]
fn small_circle_radius_encodes_turn_direction() {
    // pole on the left: a small circle around the north pole heads east
    let left_turn = GeoCircle::small_circle(&GeoPoint::new(90.0, 0.0), 30.0_f64.to_radians());
    let on_path = GeoPoint::new(60.0, 0.0);
    assert!((left_turn.bearing_at(&on_path) - 90.0).abs() < 1e-6);

    // antipodal pole with the complementary radius runs the other way
    let right_turn =
        GeoCircle::small_circle(&GeoPoint::new(-90.0, 0.0), PI - 30.0_f64.to_radians());
    assert!((right_turn.bearing_at(&on_path) - 270.0).abs() < 1e-6);
    assert!(!right_turn.is_great_circle());
    assert!((right_turn.radius() - (PI - 30.0_f64.to_radians())).abs() < EPS);
}

#[test]
fn great_circle_through_two_points_passes_both() {
    let a = GeoPoint::new(40.0, -70.0);
    let b = GeoPoint::new(45.0, -60.0);
    let path = GeoCircle::great_circle_through(&a, &b);
    assert!(path.is_great_circle());
    assert!((path.radius() - FRAC_PI_2).abs() < EPS);
    assert!(path.cross_track(&a).abs() < EPS);
    assert!(path.cross_track(&b).abs() < EPS);
    // initial course matches the two-point bearing
    assert!((path.bearing_at(&a) - a.bearing_to(&b)).abs() < 1e-6);
}
