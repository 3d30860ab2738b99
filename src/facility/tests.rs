use super::*;
use crate::geo::GeoPoint;
use fixed::types::I32F32;

fn runway(designation: &str, lat: f64, lon: f64, with_ils: bool) -> OneWayRunway {
    OneWayRunway {
        designation: designation.to_string(),
        pos: GeoPoint::new(lat, lon),
        elevation_m: 6.0,
        course: 275.0,
        ils_frequency: with_ils.then(|| FacilityFrequency {
            name: "ILS".to_string(),
            mhz: I32F32::lit("110.30"),
        }),
    }
}

fn airport(icao: &str, lat: f64, lon: f64) -> AirportFacility {
    AirportFacility {
        icao: icao.to_string(),
        name: icao.to_string(),
        pos: GeoPoint::new(lat, lon),
        runways: vec![runway("28L", lat, lon, true)],
        departures: Vec::new(),
        arrivals: Vec::new(),
        approaches: Vec::new(),
        frequencies: Vec::new(),
    }
}

#[test]
fn designation_parsing_accepts_common_forms() {
    assert_eq!(parse_designation("28L"), Some((28, RunwayDesignator::Left)));
    assert_eq!(parse_designation("RW04R"), Some((4, RunwayDesignator::Right)));
    assert_eq!(parse_designation("9"), Some((9, RunwayDesignator::None)));
    assert_eq!(parse_designation("18C"), Some((18, RunwayDesignator::Center)));
    assert_eq!(parse_designation("37"), None);
    assert_eq!(parse_designation("BOSOX"), None);
    assert_eq!(parse_designation(""), None);
}

#[test]
fn runway_matching_uses_parsed_designation() {
    let rwy = runway("04R", 42.36, -71.0, false);
    assert_eq!(rwy.number(), 4);
    assert_eq!(rwy.designator(), RunwayDesignator::Right);
    assert!(rwy.matches(4, RunwayDesignator::Right));
    assert!(!rwy.matches(4, RunwayDesignator::Left));
    assert!(!rwy.matches(22, RunwayDesignator::Right));
}

#[test]
fn best_rnav_service_level_prefers_lpv() {
    let all = RnavTypeFlags::LNAV | RnavTypeFlags::LNAV_VNAV | RnavTypeFlags::LP
        | RnavTypeFlags::LPV;
    assert_eq!(all.best(), RnavTypeFlags::LPV);
    assert_eq!((RnavTypeFlags::LNAV | RnavTypeFlags::LP).best(), RnavTypeFlags::LP);
    assert_eq!(RnavTypeFlags::LNAV.best(), RnavTypeFlags::LNAV);
    assert_eq!(RnavTypeFlags::NONE.best(), RnavTypeFlags::NONE);
}

#[test]
fn approach_type_families() {
    assert!(ApproachType::Ils.is_localizer_family());
    assert!(ApproachType::LocalizerBackCourse.is_localizer_family());
    assert!(!ApproachType::Rnav.is_localizer_family());
    assert!(ApproachType::Rnav.supports_glidepath());
    assert!(ApproachType::Visual.supports_glidepath());
    assert!(!ApproachType::Ils.supports_glidepath());
}

#[test]
fn approach_frequency_comes_from_the_named_runway() {
    let mut apt = airport("KBOS", 42.36, -71.0);
    let ils_approach = ApproachProcedure {
        name: "ILS 28L".to_string(),
        approach_type: ApproachType::Ils,
        runway_number: 28,
        runway_designator: RunwayDesignator::Left,
        ..Default::default()
    };
    let rnav_approach = ApproachProcedure {
        name: "RNAV 28L".to_string(),
        approach_type: ApproachType::Rnav,
        runway_number: 28,
        runway_designator: RunwayDesignator::Left,
        ..Default::default()
    };
    apt.approaches = vec![ils_approach.clone(), rnav_approach.clone()];

    let freq = apt.approach_frequency(&ils_approach);
    assert!(freq.is_some_and(|f| f.mhz == I32F32::lit("110.30")));
    assert!(apt.approach_frequency(&rnav_approach).is_none());
}

#[tokio::test]
async fn store_lookup_round_trips() {
    let mut store = NavdataStore::new();
    store.insert_facility(Facility::Airport(airport("KBOS", 42.3656, -71.0096)));
    store.insert_facility(Facility::Waypoint(WaypointFacility {
        icao: "BOSOX".to_string(),
        pos: GeoPoint::new(42.0, -71.5),
    }));

    let found = store.get_facility("BOSOX").await;
    assert!(found.is_ok_and(|f| f.pos().lat() == 42.0));
    assert_eq!(store.get_facility("NOPE").await, Err(FacilityError::NotFound));
}

#[tokio::test]
async fn airway_lookup_round_trips() {
    let mut store = NavdataStore::new();
    store.insert_airway(Airway {
        name: "J121".to_string(),
        fixes: vec![
            AirwayFix { ident: "AAA".to_string(), pos: GeoPoint::new(40.0, -70.0) },
            AirwayFix { ident: "BBB".to_string(), pos: GeoPoint::new(41.0, -70.0) },
        ],
    });
    let airway = store.get_airway("J121").await;
    assert!(airway.is_ok_and(|a| a.position_of("BBB") == Some(1)));
    assert_eq!(store.get_airway("J999").await, Err(FacilityError::NotFound));
}

#[test]
fn nearest_airport_uses_the_spatial_index() {
    let mut store = NavdataStore::new();
    store.insert_facility(Facility::Airport(airport("KBOS", 42.3656, -71.0096)));
    store.insert_facility(Facility::Airport(airport("KJFK", 40.6413, -73.7781)));
    store.insert_facility(Facility::Airport(airport("KORD", 41.9742, -87.9073)));

    // no index yet
    assert!(store.nearest_airport(&GeoPoint::new(42.0, -71.0)).is_none());

    store.rebuild_airport_index();
    let near_boston = store.nearest_airport(&GeoPoint::new(42.0, -71.0));
    assert!(near_boston.is_some_and(|apt| apt.icao == "KBOS"));
    let near_chicago = store.nearest_airport(&GeoPoint::new(41.5, -87.0));
    assert!(near_chicago.is_some_and(|apt| apt.icao == "KORD"));
}
