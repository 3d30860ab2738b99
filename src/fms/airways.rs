use super::engine::{
    check_and_remove_empty_segment, drain_all_effects, merge_adjacent_enroute_segments,
    plan_insert_segment, plan_remove_leg,
};
use super::{Fms, FmsError};
use crate::aircraft::AircraftState;
use crate::facility::{Airway, AirwayFix, Facility};
use crate::flight_plan::{
    FlightPlan, FlightPlanLeg, FlightPlanSegment, LegFlags, LegType, PlanRegistry, SegmentType,
    PRIMARY_PLAN,
};
use crate::nav;
use strum_macros::Display;

/// How a leg relates to the airway structure around it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum AirwayLegType {
    None,
    /// Last leg before an airway segment, the airway's entry fix.
    Entry,
    /// Last leg of an airway segment, its exit fix.
    Exit,
    /// Inside an airway segment.
    Onroute,
    /// Exit of one airway and entry of the next.
    ExitEntry,
}

pub(super) fn classify(
    plan: &FlightPlan,
    segment_index: usize,
    leg_index: usize,
) -> AirwayLegType {
    let Some(segment) = plan.segment(segment_index) else {
        return AirwayLegType::None;
    };
    let last = leg_index + 1 == segment.len();
    let next_is_airway = plan
        .segment(segment_index + 1)
        .is_some_and(|next| next.airway.is_some());
    if segment.airway.is_some() {
        match (last, next_is_airway) {
            (true, true) => AirwayLegType::ExitEntry,
            (true, false) => AirwayLegType::Exit,
            (false, _) => AirwayLegType::Onroute,
        }
    } else if last && next_is_airway {
        AirwayLegType::Entry
    } else {
        AirwayLegType::None
    }
}

fn airway_label(name: &str, exit_ident: &str) -> String {
    format!("{name}.{exit_ident}")
}

/// The airway's fix run from entry to exit inclusive, walking the fix list
/// in either direction. The first leg is an IF, the rest track between
/// fixes.
fn build_airway_legs(airway: &Airway, entry: &str, exit: &str) -> Option<Vec<FlightPlanLeg>> {
    let from = airway.position_of(entry)?;
    let to = airway.position_of(exit)?;
    if from == to {
        return None;
    }
    let fixes: Vec<&AirwayFix> = if from < to {
        airway.fixes[from..=to].iter().collect()
    } else {
        airway.fixes[to..=from].iter().rev().collect()
    };
    Some(
        fixes
            .iter()
            .enumerate()
            .map(|(index, fix)| FlightPlanLeg {
                leg_type: if index == 0 { LegType::IF } else { LegType::TF },
                fix_icao: fix.ident.clone(),
                pos: Some(fix.pos),
                ..Default::default()
            })
            .collect(),
    )
}

/// Removes a leg that participates in airway structure, keeping labels and
/// segment boundaries coherent. Plain legs fall through to the ordinary
/// removal path.
pub(super) fn remove_leg_airway_handler(
    registry: &mut PlanRegistry,
    plan_index: usize,
    segment_index: usize,
    leg_index: usize,
    plane: &AircraftState,
) -> bool {
    let Some(plan) = registry.plan_mut(plan_index) else {
        return false;
    };
    match classify(plan, segment_index, leg_index) {
        AirwayLegType::None => {
            plan_remove_leg(registry, plan_index, segment_index, leg_index, plane)
        }
        AirwayLegType::Onroute => remove_onroute_leg(plan, segment_index, leg_index),
        AirwayLegType::Entry => remove_entry_leg(plan, segment_index, leg_index),
        AirwayLegType::Exit => {
            remove_exit_leg(registry, plan_index, segment_index, leg_index, plane, false)
        }
        AirwayLegType::ExitEntry => {
            remove_exit_leg(registry, plan_index, segment_index, leg_index, plane, true)
        }
    }
}

/// Splits the airway at the removed leg. The head keeps the airway label
/// renamed to its new exit, the tail becomes a plain enroute segment led
/// by an IF.
fn remove_onroute_leg(plan: &mut FlightPlan, segment_index: usize, leg_index: usize) -> bool {
    let Some(segment) = plan.segment(segment_index) else {
        return false;
    };
    let Some(name) = segment.airway_name().map(str::to_string) else {
        return false;
    };
    let removed_global = plan.global_index(segment_index, leg_index);
    let active = plan.active_lateral_leg();
    let mut tail = Vec::new();
    while plan.segment(segment_index).map_or(0, FlightPlanSegment::len) > leg_index + 1 {
        match plan.remove_leg(segment_index, leg_index + 1) {
            Some(leg) => tail.push(leg),
            None => break,
        }
    }
    if plan.remove_leg(segment_index, leg_index).is_none() {
        return false;
    }
    if leg_index > 0 {
        if let Some(new_exit) = plan
            .leg_in_segment(segment_index, leg_index - 1)
            .map(|leg| leg.leg.fix_icao.clone())
        {
            plan.set_airway(segment_index, Some(airway_label(&name, &new_exit)));
        }
    }
    if !tail.is_empty() {
        let tail_segment = plan_insert_segment(plan, segment_index + 1, SegmentType::Enroute, None);
        for (index, definition) in tail.into_iter().enumerate() {
            let mut leg = definition.leg;
            if index == 0 {
                leg.leg_type = LegType::IF;
            }
            plan.add_leg(tail_segment, leg, None, definition.flags);
        }
    }
    if active > removed_global {
        plan.set_active_lateral_leg(active - 1);
    }
    super::direct_to::reconcile_direct_to(plan);
    check_and_remove_empty_segment(plan, segment_index);
    true
}

/// Removes an airway entry leg: the airway's first fix moves out to take
/// over as the entry, rebuilt as an IF. An emptied airway segment is
/// dropped.
fn remove_entry_leg(plan: &mut FlightPlan, segment_index: usize, leg_index: usize) -> bool {
    let airway_segment = segment_index + 1;
    let entry_global = plan.global_index(segment_index, leg_index);
    let active = plan.active_lateral_leg();
    let Some(moved) = plan.remove_leg(airway_segment, 0) else {
        return false;
    };
    if plan.remove_leg(segment_index, leg_index).is_none() {
        plan.add_leg(airway_segment, moved.leg, Some(0), moved.flags);
        return false;
    }
    let mut leg = moved.leg;
    leg.leg_type = LegType::IF;
    plan.add_leg(segment_index, leg, Some(leg_index), moved.flags);
    if active > entry_global {
        plan.set_active_lateral_leg(active - 1);
    }
    super::direct_to::reconcile_direct_to(plan);
    check_and_remove_empty_segment(plan, airway_segment);
    true
}

/// Truncates the airway at its removed exit and renames it to the new one.
/// A following airway keeps flying by rebuilding its first leg as an IF,
/// otherwise a plain enroute segment is guaranteed after the airway.
fn remove_exit_leg(
    registry: &mut PlanRegistry,
    plan_index: usize,
    segment_index: usize,
    leg_index: usize,
    plane: &AircraftState,
    next_is_airway: bool,
) -> bool {
    let Some(plan) = registry.plan_mut(plan_index) else {
        return false;
    };
    let Some(segment) = plan.segment(segment_index) else {
        return false;
    };
    let name = segment.airway_name().map(str::to_string);
    let emptied = segment.len() == 1;
    if !plan_remove_leg(registry, plan_index, segment_index, leg_index, plane) {
        return false;
    }
    let Some(plan) = registry.plan_mut(plan_index) else {
        return false;
    };
    let following = if emptied { segment_index } else { segment_index + 1 };
    if !emptied {
        let new_exit = plan
            .segment(segment_index)
            .filter(|segment| !segment.is_empty())
            .and_then(|segment| plan.leg_in_segment(segment_index, segment.len() - 1))
            .map(|leg| leg.leg.fix_icao.clone());
        if let (Some(name), Some(exit)) = (name, new_exit) {
            plan.set_airway(segment_index, Some(airway_label(&name, &exit)));
        }
    }
    if next_is_airway {
        if plan
            .segment(following)
            .is_some_and(|segment| segment.airway.is_some() && !segment.is_empty())
        {
            plan.update_leg(following, 0, |leg| leg.leg.leg_type = LegType::IF);
        }
    } else if !emptied {
        let plain_follows = plan.segment(segment_index + 1).is_some_and(|segment| {
            segment.segment_type == SegmentType::Enroute && segment.airway.is_none()
        });
        if !plain_follows {
            plan_insert_segment(plan, segment_index + 1, SegmentType::Enroute, None);
        }
    }
    super::direct_to::reconcile_direct_to(plan);
    true
}

/// Splits an airway segment around a waypoint inserted into its middle.
/// The head keeps the airway renamed to its shortened exit, the waypoint
/// lands in a plain segment, the rest of the airway continues behind it
/// under the original label.
pub(super) fn insert_waypoint_split(
    plan: &mut FlightPlan,
    segment_index: usize,
    at: usize,
    leg: FlightPlanLeg,
) -> Option<usize> {
    let segment = plan.segment(segment_index)?;
    let label = segment.airway.clone()?;
    let name = segment.airway_name()?.to_string();
    let at = at.min(segment.len());
    let active = plan.active_lateral_leg();
    let mut tail = Vec::new();
    while plan.segment(segment_index).map_or(0, FlightPlanSegment::len) > at {
        match plan.remove_leg(segment_index, at) {
            Some(leg) => tail.push(leg),
            None => break,
        }
    }
    let mut insert_at = segment_index + 1;
    if at == 0 {
        plan.remove_segment(segment_index);
        insert_at = segment_index;
    } else {
        let new_exit = plan.leg_in_segment(segment_index, at - 1)?.leg.fix_icao.clone();
        plan.set_airway(segment_index, Some(airway_label(&name, &new_exit)));
    }
    let plain = plan_insert_segment(plan, insert_at, SegmentType::Enroute, None);
    let inserted_global = plan.add_leg(plain, leg, None, LegFlags::NONE)?;
    if !tail.is_empty() {
        let rest = plan_insert_segment(plan, plain + 1, SegmentType::Enroute, Some(label));
        for definition in tail {
            plan.add_leg(rest, definition.leg, None, definition.flags);
        }
    }
    if plan.leg_count() > 1 && active >= inserted_global {
        plan.set_active_lateral_leg(active + 1);
    }
    super::direct_to::reconcile_direct_to(plan);
    merge_adjacent_enroute_segments(plan, insert_at.saturating_sub(1));
    Some(inserted_global)
}

/// Finds the plan leg serving as the airway entry, searched from the back
/// of the departure and enroute portions.
fn locate_entry_leg(plan: &FlightPlan, ident: &str) -> Option<(usize, usize)> {
    let candidates: Vec<usize> = plan
        .segments()
        .enumerate()
        .filter(|(_, segment)| {
            matches!(segment.segment_type, SegmentType::Departure | SegmentType::Enroute)
        })
        .map(|(index, _)| index)
        .collect();
    for &segment_index in candidates.iter().rev() {
        let len = plan.segment(segment_index).map_or(0, FlightPlanSegment::len);
        for leg_index in (0..len).rev() {
            let hit = plan
                .leg_in_segment(segment_index, leg_index)
                .is_some_and(|leg| leg.leg.fix_icao == ident);
            if hit {
                return Some((segment_index, leg_index));
            }
        }
    }
    None
}

/// Carves out the segment that will hold the airway legs, directly behind
/// the entry leg. Legs trailing the entry move to a plain segment behind
/// the airway, and an airway cut short mid-run renames to its new exit.
fn prepare_airway_segment(
    plan: &mut FlightPlan,
    segment_index: usize,
    leg_index: usize,
    label: String,
) -> usize {
    let head_airway = plan
        .segment(segment_index)
        .and_then(|segment| segment.airway_name().map(str::to_string));
    let entry_ident = plan
        .leg_in_segment(segment_index, leg_index)
        .map(|leg| leg.leg.fix_icao.clone());
    let mut tail = Vec::new();
    while plan.segment(segment_index).map_or(0, FlightPlanSegment::len) > leg_index + 1 {
        match plan.remove_leg(segment_index, leg_index + 1) {
            Some(leg) => tail.push(leg),
            None => break,
        }
    }
    if let (Some(name), Some(entry), false) = (head_airway, entry_ident, tail.is_empty()) {
        plan.set_airway(segment_index, Some(airway_label(&name, &entry)));
    }
    let airway_segment = plan_insert_segment(plan, segment_index + 1, SegmentType::Enroute, Some(label));
    if !tail.is_empty() {
        let tail_segment =
            plan_insert_segment(plan, airway_segment + 1, SegmentType::Enroute, None);
        for definition in tail {
            plan.add_leg(tail_segment, definition.leg, None, definition.flags);
        }
    }
    airway_segment
}

impl Fms {
    /// Inserts an airway run into the primary plan, entering at a fix the
    /// plan already contains and exiting at `exit_ident`.
    ///
    /// # Returns
    /// The index of the new airway segment.
    pub async fn insert_airway_segment(
        &self,
        entry: &Facility,
        airway_name: &str,
        exit_ident: &str,
    ) -> Result<usize, FmsError> {
        let airway = self
            .loader
            .get_airway(airway_name)
            .await
            .map_err(|_| FmsError::InvalidReference)?;
        let legs = build_airway_legs(&airway, entry.ident(), exit_ident)
            .ok_or(FmsError::InvalidReference)?;
        let token = self.current_op();
        let (airway_segment, drained) = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            let (segment_index, leg_index) =
                locate_entry_leg(plan, entry.ident()).ok_or(FmsError::InvalidReference)?;
            let entry_global = plan.global_index(segment_index, leg_index);
            let active = plan.active_lateral_leg();
            let label = airway_label(&airway.name, exit_ident);
            let airway_segment = prepare_airway_segment(plan, segment_index, leg_index, label);
            let mut added = 0;
            for leg in legs.into_iter().skip(1) {
                if plan.add_leg(airway_segment, leg, None, LegFlags::NONE).is_some() {
                    added += 1;
                }
            }
            if active > entry_global {
                plan.set_active_lateral_leg(active + added);
            }
            super::direct_to::reconcile_direct_to(plan);
            (airway_segment, drain_all_effects(&mut registry))
        };
        self.publish_effects(drained);
        nav!("Airway {airway_name} joined at {} exiting {exit_ident}", entry.ident());
        self.recompute_active_window(PRIMARY_PLAN, token).await?;
        Ok(airway_segment)
    }

    /// Collapses an airway segment out of the plan. The exit leg survives
    /// as the entry of a directly following airway.
    pub async fn remove_airway(&self, segment_index: usize) -> Result<bool, FmsError> {
        let token = self.current_op();
        let plane = *self.plane.read().await;
        let (removed, drained) = {
            let mut registry = self.registry.write().await;
            let plan = registry.plan_mut(PRIMARY_PLAN).ok_or(FmsError::InvalidReference)?;
            let Some(segment) = plan.segment(segment_index) else {
                return Err(FmsError::InvalidReference);
            };
            if segment.airway.is_none() || segment_index == 0 {
                (false, Vec::new())
            } else {
                let next_is_airway = plan
                    .segment(segment_index + 1)
                    .is_some_and(|next| next.airway.is_some());
                let exit = (!segment.is_empty())
                    .then(|| plan.leg_in_segment(segment_index, segment.len() - 1).cloned())
                    .flatten();
                super::engine::plan_remove_segment(
                    &mut registry,
                    PRIMARY_PLAN,
                    segment_index,
                    &plane,
                );
                if let Some(plan) = registry.plan_mut(PRIMARY_PLAN) {
                    if next_is_airway {
                        if let Some(exit) = exit {
                            let leg = FlightPlanLeg {
                                leg_type: LegType::TF,
                                fix_icao: exit.leg.fix_icao.clone(),
                                pos: exit.leg.pos,
                                ..Default::default()
                            };
                            let previous = segment_index.saturating_sub(1);
                            plan.add_leg(previous, leg, None, LegFlags::NONE);
                        }
                    }
                    merge_adjacent_enroute_segments(plan, segment_index.saturating_sub(1));
                    super::direct_to::reconcile_direct_to(plan);
                }
                (true, drain_all_effects(&mut registry))
            }
        };
        self.publish_effects(drained);
        if removed {
            self.sync_active_plan().await;
            nav!("Airway segment {segment_index} removed");
            self.recompute_active_window(PRIMARY_PLAN, token).await?;
        }
        Ok(removed)
    }
}
