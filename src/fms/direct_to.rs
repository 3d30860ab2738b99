use super::engine::drain_all_effects;
use super::{DirectToState, Fms, FmsError, DIRECT_TO_LEG_OFFSET};
use crate::aircraft::AircraftState;
use crate::event_bus::FmsEvent;
use crate::facility::Facility;
use crate::flight_plan::{
    DirectToTarget, FlightPlan, FlightPlanLeg, LegFlags, LegType, PlanRegistry, SegmentType,
    DTO_RANDOM_PLAN, PRIMARY_PLAN,
};
use crate::geo::GeoPoint;
use crate::nav;

/// The direct-to mode is read from plan structure, not from stored state:
/// the random slot being the guidance plan with a populated random segment
/// means off-plan direct-to, the primary plan pointing its active leg at
/// the synthetic direct-to leg means on-plan direct-to.
pub(super) fn state_of(registry: &PlanRegistry) -> DirectToState {
    let random = registry.active_index() == DTO_RANDOM_PLAN
        && registry.plan(DTO_RANDOM_PLAN).is_some_and(|plan| {
            plan.segment(0).is_some_and(|segment| {
                segment.segment_type == SegmentType::RandomDirectTo && !segment.is_empty()
            })
        });
    if random {
        return DirectToState::ToRandom;
    }
    let existing = registry.plan(PRIMARY_PLAN).is_some_and(|plan| {
        plan.direct_to().is_some_and(|target| {
            let global = plan.global_index(target.segment_index, target.segment_leg_index);
            plan.active_lateral_leg() == global + DIRECT_TO_LEG_OFFSET
        })
    });
    if existing {
        DirectToState::ToExisting
    } else {
        DirectToState::Inactive
    }
}

/// Fix ident, position and explicit course of the current on-plan
/// direct-to, read from its synthetic course leg.
pub(super) fn existing_target_fix(
    registry: &PlanRegistry,
) -> Option<(String, Option<GeoPoint>, Option<f64>)> {
    let plan = registry.plan(PRIMARY_PLAN)?;
    let target = plan.direct_to()?;
    let global = plan.global_index(target.segment_index, target.segment_leg_index);
    let dto_leg = plan.leg(global + DIRECT_TO_LEG_OFFSET)?;
    let course = (dto_leg.leg.leg_type == LegType::CF).then_some(dto_leg.leg.course);
    Some((dto_leg.leg.fix_icao.clone(), dto_leg.leg.pos, course))
}

/// Rebuilds the random direct-to slot with the three-leg sequence and makes
/// it the guidance plan. With an explicit course the track is the course
/// into the fix, otherwise it starts at the present position.
pub(super) fn create_direct_to_random_core(
    registry: &mut PlanRegistry,
    plane: &AircraftState,
    ident: &str,
    pos: Option<GeoPoint>,
    course: Option<f64>,
) {
    registry.delete_plan(DTO_RANDOM_PLAN);
    let plan = registry.create_plan(DTO_RANDOM_PLAN);
    plan.add_segment(SegmentType::RandomDirectTo, None);
    let disco = FlightPlanLeg { leg_type: LegType::Discontinuity, ..Default::default() };
    let origin = if course.is_some() {
        disco.clone()
    } else {
        FlightPlanLeg {
            leg_type: LegType::IF,
            pos: Some(plane.pos),
            ..Default::default()
        }
    };
    let direct = FlightPlanLeg {
        leg_type: if course.is_some() { LegType::CF } else { LegType::DF },
        fix_icao: ident.to_string(),
        pos,
        course: course.unwrap_or_default(),
        ..Default::default()
    };
    plan.add_leg(0, disco, Some(0), LegFlags::DIRECT_TO);
    plan.add_leg(0, origin, Some(1), LegFlags::DIRECT_TO);
    plan.add_leg(0, direct, Some(2), LegFlags::DIRECT_TO);
    plan.set_calculating_leg(2);
    plan.set_active_lateral_leg(2);
    registry.set_active_index(DTO_RANDOM_PLAN);
}

/// Points the primary plan directly at one of its own legs by inserting
/// the synthetic sequence behind it. A previous on-plan direct-to is
/// unwound first, the requested leg index compensated when the unwind
/// shifts it.
pub(super) fn create_direct_to_existing_core(
    plan: &mut FlightPlan,
    plane: &AircraftState,
    segment_index: usize,
    leg_index: usize,
    course: Option<f64>,
) -> bool {
    let mut leg_index = leg_index;
    if let Some(previous) = plan.direct_to() {
        if previous.segment_index == segment_index && previous.segment_leg_index < leg_index {
            leg_index -= DIRECT_TO_LEG_OFFSET;
        }
        remove_direct_to_existing_core(plan, None);
    }
    let Some(target) = plan.leg_in_segment(segment_index, leg_index) else {
        return false;
    };
    if target.flags.contains(LegFlags::DIRECT_TO) || target.leg.fix_icao.is_empty() {
        return false;
    }
    let mut flags = LegFlags::DIRECT_TO;
    if target.flags.contains(LegFlags::MISSED_APPROACH) {
        flags.insert(LegFlags::MISSED_APPROACH);
    }
    let fix_icao = target.leg.fix_icao.clone();
    let fix_pos = target.leg.pos;
    let alt_desc = target.leg.alt_desc;
    let altitude1 = target.leg.altitude1;
    let altitude2 = target.leg.altitude2;
    let vertical = target.vertical;
    let disco = FlightPlanLeg { leg_type: LegType::Discontinuity, ..Default::default() };
    let origin = if course.is_some() {
        disco.clone()
    } else {
        FlightPlanLeg {
            leg_type: LegType::IF,
            pos: Some(plane.pos),
            ..Default::default()
        }
    };
    let direct = FlightPlanLeg {
        leg_type: if course.is_some() { LegType::CF } else { LegType::DF },
        fix_icao,
        pos: fix_pos,
        course: course.unwrap_or_default(),
        alt_desc,
        altitude1,
        altitude2,
        ..Default::default()
    };
    plan.add_leg(segment_index, disco, Some(leg_index + 1), flags);
    plan.add_leg(segment_index, origin, Some(leg_index + 2), flags);
    plan.add_leg(segment_index, direct, Some(leg_index + 3), flags);
    plan.set_leg_vertical_data(segment_index, leg_index + DIRECT_TO_LEG_OFFSET, vertical);
    plan.set_direct_to(Some(DirectToTarget { segment_index, segment_leg_index: leg_index }));
    let target_global = plan.global_index(segment_index, leg_index);
    plan.set_calculating_leg(target_global + DIRECT_TO_LEG_OFFSET - 1);
    plan.set_active_lateral_leg(target_global + DIRECT_TO_LEG_OFFSET);
    true
}

/// Unwinds an on-plan direct-to: the synthetic legs disappear and the
/// requested leg, named by its index before the unwind, becomes active.
/// Without a request the active leg stays put, compensated for the
/// removals.
pub(super) fn remove_direct_to_existing_core(plan: &mut FlightPlan, activate_index: Option<usize>) {
    let Some(target) = plan.direct_to() else {
        if let Some(index) = activate_index {
            plan.set_calculating_leg(index.saturating_sub(1));
            plan.set_active_lateral_leg(index);
        }
        return;
    };
    let target_global = plan.global_index(target.segment_index, target.segment_leg_index);
    let requested = activate_index.unwrap_or_else(|| plan.active_lateral_leg());
    for _ in 0..DIRECT_TO_LEG_OFFSET {
        plan.remove_leg(target.segment_index, target.segment_leg_index + 1);
    }
    plan.set_direct_to(None);
    let compensation = requested.saturating_sub(target_global).min(DIRECT_TO_LEG_OFFSET);
    let new_active = requested - compensation;
    plan.set_calculating_leg(new_active.saturating_sub(1));
    plan.set_active_lateral_leg(new_active);
}

/// Re-locates the direct-to pointer after segment surgery moved legs
/// around, clearing it when the synthetic sequence is gone.
pub(super) fn reconcile_direct_to(plan: &mut FlightPlan) {
    let Some(target) = plan.direct_to() else {
        return;
    };
    let intact = plan
        .leg_in_segment(target.segment_index, target.segment_leg_index + 1)
        .is_some_and(|leg| {
            leg.flags.contains(LegFlags::DIRECT_TO) && leg.leg.leg_type.is_discontinuity()
        });
    if intact {
        return;
    }
    let opener = plan
        .legs()
        .find(|(_, leg)| {
            leg.flags.contains(LegFlags::DIRECT_TO) && leg.leg.leg_type.is_discontinuity()
        })
        .map(|(global, _)| global);
    match opener.and_then(|global| plan.locate(global)) {
        Some((segment_index, leg_index)) if leg_index > 0 => {
            plan.set_direct_to(Some(DirectToTarget {
                segment_index,
                segment_leg_index: leg_index - 1,
            }));
        }
        _ => plan.set_direct_to(None),
    }
}

impl Fms {
    /// Current direct-to mode.
    pub async fn direct_to_state(&self) -> DirectToState {
        let registry = self.registry.read().await;
        state_of(&registry)
    }

    /// Ident of the fix the active direct-to is flying to, if any.
    pub async fn direct_to_target_ident(&self) -> Option<String> {
        let registry = self.registry.read().await;
        match state_of(&registry) {
            DirectToState::ToRandom => registry
                .plan(DTO_RANDOM_PLAN)
                .and_then(|plan| plan.leg(2))
                .map(|leg| leg.leg.fix_icao.clone()),
            DirectToState::ToExisting => {
                existing_target_fix(&registry).map(|(ident, _, _)| ident)
            }
            DirectToState::Inactive => None,
        }
    }

    /// Flies direct from the present position to an arbitrary fix. The
    /// random slot is rebuilt and takes over guidance, the primary plan is
    /// left untouched.
    pub async fn create_direct_to_random(
        &self,
        facility: &Facility,
        course: Option<f64>,
    ) -> Result<(), FmsError> {
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            create_direct_to_random_core(
                &mut registry,
                &plane,
                facility.ident(),
                Some(facility.pos()),
                course,
            );
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        self.bus.publish(FmsEvent::SuspendSequencing(false));
        nav!("Direct-to {}", facility.ident());
        self.recompute(DTO_RANDOM_PLAN, 0, token).await
    }

    /// Flies direct to a leg of the primary plan.
    pub async fn create_direct_to_existing(
        &self,
        segment_index: usize,
        leg_index: usize,
        course: Option<f64>,
    ) -> Result<(), FmsError> {
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let drained = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            if !create_direct_to_existing_core(plan, &plane, segment_index, leg_index, course) {
                return Err(FmsError::InvalidReference);
            }
            registry.set_active_index(PRIMARY_PLAN);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.sync_active_plan().await;
        self.bus.publish(FmsEvent::SuspendSequencing(false));
        nav!("Direct-to leg {leg_index} of segment {segment_index}");
        self.recompute_active_window(PRIMARY_PLAN, token).await
    }

    /// Cancels an on-plan direct-to. `activate_index` names the leg to
    /// activate afterwards by its index before the synthetic legs vanish.
    pub async fn remove_direct_to_existing(
        &self,
        activate_index: Option<usize>,
    ) -> Result<(), FmsError> {
        let token = self.current_op();
        let drained = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            remove_direct_to_existing_core(plan, activate_index);
            drain_all_effects(&mut registry)
        };
        self.publish_effects(drained);
        self.recompute_active_window(PRIMARY_PLAN, token).await
    }

    /// Hands an OBS course back to the plan by re-issuing the equivalent
    /// direct-to with that course.
    pub async fn convert_obs_to_direct_to(&self, course: f64) -> Result<(), FmsError> {
        match self.direct_to_state().await {
            DirectToState::ToRandom => {
                let target = {
                    let registry = self.registry.read().await;
                    registry
                        .plan(DTO_RANDOM_PLAN)
                        .and_then(|plan| plan.leg(2))
                        .map(|leg| (leg.leg.fix_icao.clone(), leg.leg.pos))
                };
                let (ident, pos) = target.ok_or(FmsError::InvalidReference)?;
                let token = self.current_op();
                let plane = *self.plane.read().await;
                let drained = {
                    let mut registry = self.registry.write().await;
                    create_direct_to_random_core(
                        &mut registry,
                        &plane,
                        &ident,
                        pos,
                        Some(course),
                    );
                    drain_all_effects(&mut registry)
                };
                self.publish_effects(drained);
                self.recompute(DTO_RANDOM_PLAN, 0, token).await
            }
            DirectToState::ToExisting => {
                let target = {
                    let registry = self.registry.read().await;
                    registry
                        .plan(PRIMARY_PLAN)
                        .and_then(FlightPlan::direct_to)
                        .ok_or(FmsError::InvalidReference)?
                };
                self.create_direct_to_existing(
                    target.segment_index,
                    target.segment_leg_index,
                    Some(course),
                )
                .await
            }
            DirectToState::Inactive => {
                let located = {
                    let registry = self.registry.read().await;
                    registry
                        .plan(PRIMARY_PLAN)
                        .and_then(|plan| plan.locate(plan.active_lateral_leg()))
                };
                let (segment_index, leg_index) = located.ok_or(FmsError::InvalidReference)?;
                self.create_direct_to_existing(segment_index, leg_index, Some(course)).await
            }
        }
    }
}
