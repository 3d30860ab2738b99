//! Flight-plan management engine. All plan mutation funnels through the
//! [`Fms`] primitives here; the submodules split the surface into waypoint
//! and segment surgery, procedure builders, direct-to handling and airway
//! handling.

mod airways;
mod builders;
mod direct_to;
mod engine;


pub use airways::AirwayLegType;
pub use builders::ProcedureSelection;
pub use engine::Fms;

use crate::facility::{ApproachType, FacilityError, RnavTypeFlags};
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Number of synthetic legs a direct-to appends after its target leg.
pub const DIRECT_TO_LEG_OFFSET: usize = 3;

/// Failure modes of engine operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FmsError {
    /// A plan slot, segment, leg or procedure index pointed at nothing.
    InvalidReference,
    /// The procedure selection needs a runway or transition choice that was
    /// not supplied.
    AmbiguousProcedure,
    /// An async result arrived after a newer operation superseded it and was
    /// discarded.
    StaleAsyncResult,
    /// The geometry oracle or a facility lookup failed.
    CalculationFailure(FacilityError),
}

impl std::error::Error for FmsError {}

impl From<FacilityError> for FmsError {
    fn from(value: FacilityError) -> Self {
        Self::CalculationFailure(value)
    }
}

/// Snapshot of the loaded approach, broadcast whenever any part of it
/// changes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ApproachDetails {
    pub loaded: bool,
    pub approach_type: ApproachType,
    /// Best published RNAV service level of the loaded approach.
    pub best_rnav_type: RnavTypeFlags,
    pub is_active: bool,
    /// Circling-only procedure, no straight-in runway.
    pub is_circling: bool,
}

impl ApproachDetails {
    /// Whether vertical guidance may be generated for the loaded approach.
    pub const fn glidepath_available(self) -> bool {
        self.loaded
            && self.is_active
            && !self.is_circling
            && self.approach_type.supports_glidepath()
    }
}

/// Which kind of direct-to is currently flown, derived from plan state
/// rather than stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum DirectToState {
    Inactive,
    /// Direct to a leg that is part of the primary flight plan.
    ToExisting,
    /// Direct to an off-plan fix, flown out of the dedicated plan slot.
    ToRandom,
}
