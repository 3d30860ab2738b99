mod arena;
mod calculator;
mod effects;
mod leg;
mod plan;
mod registry;
mod segment;

#[cfg(test)]
mod tests;

pub use arena::{LegArena, LegHandle};
pub use calculator::{
    CalculateRequest, DefaultFlightPathCalculator, FlightPathCalculator, FlightPathVector,
    LegCalculations, LegSnapshot, VectorFlags,
};
pub use effects::{ActiveLegKind, ChangeKind, PlanEffect};
pub use leg::{
    AltitudeRestrictionType, FixTypeFlags, FlightPlanLeg, LegDefinition, LegFlags, LegType,
    LegTurnDirection, VerticalData,
};
pub use plan::{DirectToTarget, FlightPlan, ProcedureDetails};
pub use registry::{
    DTO_RANDOM_PLAN, PLAN_SLOTS, PRIMARY_PLAN, PROC_PREVIEW_PLAN, PlanRegistry,
};
pub use segment::{FlightPlanSegment, SegmentType};
