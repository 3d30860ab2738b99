use super::loader::{FacilityError, FacilityLoader};
use super::types::{Airway, AirportFacility, Facility};
use crate::geo::GeoPoint;
use async_trait::async_trait;
use kiddo::{ImmutableKdTree, SquaredEuclidean};
use std::collections::HashMap;

/// Spatial index over airports, queried in earth-centred unit coordinates.
struct AirportIndex {
    tree: ImmutableKdTree<f64, 3>,
    idents: Vec<String>,
}

/// In-memory navigation database.
///
/// Facilities and airways are keyed by ident. The airport index is built
/// explicitly after seeding, nearest-airport queries before that return
/// nothing.
#[derive(Default)]
pub struct NavdataStore {
    facilities: HashMap<String, Facility>,
    airways: HashMap<String, Airway>,
    airport_index: Option<AirportIndex>,
}

impl NavdataStore {
    pub fn new() -> Self {
        Self {
            facilities: HashMap::new(),
            airways: HashMap::new(),
            airport_index: None,
        }
    }

    pub fn insert_facility(&mut self, facility: Facility) {
        self.facilities.insert(facility.ident().to_string(), facility);
    }

    pub fn insert_airway(&mut self, airway: Airway) {
        self.airways.insert(airway.name.clone(), airway);
    }

    pub fn facility(&self, ident: &str) -> Option<&Facility> {
        self.facilities.get(ident)
    }

    pub fn len(&self) -> usize {
        self.facilities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.facilities.is_empty()
    }

    /// Rebuilds the airport spatial index over the current facility set.
    /// Call after seeding, facilities inserted later are not indexed until
    /// the next rebuild.
    pub fn rebuild_airport_index(&mut self) {
        let mut idents = Vec::new();
        let mut points: Vec<[f64; 3]> = Vec::new();
        for facility in self.facilities.values() {
            if let Facility::Airport(airport) = facility {
                idents.push(airport.icao.clone());
                points.push(airport.pos.to_unit());
            }
        }
        if points.is_empty() {
            self.airport_index = None;
            return;
        }
        self.airport_index = Some(AirportIndex {
            tree: ImmutableKdTree::new_from_slice(&points),
            idents,
        });
    }

    /// Finds the airport closest to `pos`, straight-line over the sphere.
    pub fn nearest_airport(&self, pos: &GeoPoint) -> Option<&AirportFacility> {
        let index = self.airport_index.as_ref()?;
        let found = index.tree.nearest_one::<SquaredEuclidean>(&pos.to_unit());
        let ident = index.idents.get(found.item as usize)?;
        self.facilities.get(ident).and_then(Facility::as_airport)
    }
}

#[async_trait]
impl FacilityLoader for NavdataStore {
    async fn get_facility(&self, ident: &str) -> Result<Facility, FacilityError> {
        self.facilities.get(ident).cloned().ok_or(FacilityError::NotFound)
    }

    async fn get_airway(&self, name: &str) -> Result<Airway, FacilityError> {
        self.airways.get(name).cloned().ok_or(FacilityError::NotFound)
    }
}
