use super::types::{Airway, Facility};
use async_trait::async_trait;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FacilityError {
    /// The requested ident is not in the database.
    NotFound,
    NoConnection,
    /// The database answered with something that does not parse.
    Decode,
    Unavailable,
}

impl std::error::Error for FacilityError {}

impl From<reqwest::Error> for FacilityError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            FacilityError::Decode
        } else if value.is_connect() {
            FacilityError::NoConnection
        } else {
            FacilityError::Unavailable
        }
    }
}

/// Read access to the navigation database.
///
/// Lookups are asynchronous so implementations may sit on a wire. Callers
/// never cache across edits themselves, a looked-up facility is used to
/// build legs and then dropped.
#[async_trait]
pub trait FacilityLoader: Send + Sync {
    /// Looks up a facility by ident.
    async fn get_facility(&self, ident: &str) -> Result<Facility, FacilityError>;

    /// Looks up an airway definition by name.
    async fn get_airway(&self, name: &str) -> Result<Airway, FacilityError>;
}
