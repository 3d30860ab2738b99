use super::arena::LegHandle;
use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// Phase of flight a block of plan legs belongs to. Segment blocks are kept
/// in this order inside a plan, except for `RandomDirectTo` which lives in
/// its own plan slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
pub enum SegmentType {
    Origin,
    Departure,
    Enroute,
    Arrival,
    Approach,
    Destination,
    MissedApproach,
    RandomDirectTo,
}

/// One contiguous block of plan legs sharing a phase of flight.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightPlanSegment {
    pub segment_type: SegmentType,
    /// Label `<airway>.<exit>` when this segment renders an airway stretch.
    pub airway: Option<String>,
    pub(crate) legs: Vec<LegHandle>,
}

impl FlightPlanSegment {
    pub fn new(segment_type: SegmentType, airway: Option<String>) -> Self {
        Self { segment_type, airway, legs: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    /// Airway name without the exit label.
    pub fn airway_name(&self) -> Option<&str> {
        self.airway.as_deref().map(|label| label.split('.').next().unwrap_or(label))
    }
}
