mod http_client;
mod loader;
mod runway;
mod store;
mod types;

#[cfg(test)]
mod tests;

pub use http_client::NavdataHttpClient;
pub use loader::{FacilityError, FacilityLoader};
pub use runway::{OneWayRunway, RunwayDesignator, parse_designation};
pub use store::NavdataStore;
pub use types::{
    Airway, AirwayFix, AirportFacility, ApproachProcedure, ApproachType, ArrivalProcedure,
    DepartureProcedure, Facility, FacilityFrequency, NdbFacility, ProcedureTransition,
    RnavTypeFlags, RunwayTransition, VorFacility, WaypointFacility,
};
