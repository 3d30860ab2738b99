use super::arena::{LegArena, LegHandle};
use super::calculator::{LegCalculations, LegSnapshot};
use super::effects::{ActiveLegKind, ChangeKind, PlanEffect};
use super::leg::{FlightPlanLeg, LegDefinition, LegFlags, VerticalData};
use super::segment::{FlightPlanSegment, SegmentType};
use bitvec::vec::BitVec;
use serde::{Deserialize, Serialize};

/// Where in the plan a direct-to-existing points, as a stable
/// (segment, leg-in-segment) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectToTarget {
    pub segment_index: usize,
    pub segment_leg_index: usize,
}

/// Which published procedures are loaded into the plan and with which
/// selections. Indices point into the procedure lists of the origin or
/// destination airport facility.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProcedureDetails {
    /// Takeoff runway designation.
    pub origin_runway: Option<String>,
    pub departure_index: Option<usize>,
    pub departure_runway_transition_index: Option<usize>,
    pub departure_transition_index: Option<usize>,
    pub arrival_index: Option<usize>,
    pub arrival_runway_transition_index: Option<usize>,
    pub arrival_transition_index: Option<usize>,
    pub approach_index: Option<usize>,
    /// `None` with an approach loaded means vectors-to-final.
    pub approach_transition_index: Option<usize>,
    /// Landing runway designation.
    pub destination_runway: Option<String>,
    /// Runway of a loaded visual approach.
    pub visual_runway: Option<String>,
}

/// One flight plan: an ordered list of segments over a leg arena, plus the
/// pointers and procedure state that travel with it.
///
/// Every mutation appends its observable consequence to an effect journal
/// which the owning engine drains once per operation batch. The plan itself
/// never notifies anyone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlightPlan {
    index: usize,
    arena: LegArena,
    segments: Vec<FlightPlanSegment>,
    active_lateral_leg: usize,
    calculating_leg: usize,
    origin_airport: Option<String>,
    destination_airport: Option<String>,
    procedure_details: ProcedureDetails,
    direct_to: Option<DirectToTarget>,
    #[serde(skip)]
    effects: Vec<PlanEffect>,
    #[serde(skip)]
    dirty: BitVec,
}

impl FlightPlan {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            arena: LegArena::default(),
            segments: Vec::new(),
            active_lateral_leg: 0,
            calculating_leg: 0,
            origin_airport: None,
            destination_airport: None,
            procedure_details: ProcedureDetails::default(),
            direct_to: None,
            effects: Vec::new(),
            dirty: BitVec::new(),
        }
    }

    pub const fn index(&self) -> usize {
        self.index
    }

    pub fn leg_count(&self) -> usize {
        self.arena.len()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn segment(&self, segment_index: usize) -> Option<&FlightPlanSegment> {
        self.segments.get(segment_index)
    }

    pub fn segments(&self) -> impl Iterator<Item = &FlightPlanSegment> {
        self.segments.iter()
    }

    /// Flat index of the first leg of a segment.
    pub fn segment_offset(&self, segment_index: usize) -> usize {
        self.segments[..segment_index.min(self.segments.len())]
            .iter()
            .map(FlightPlanSegment::len)
            .sum()
    }

    /// Segment containing the leg at a flat index.
    pub fn segment_of(&self, global_index: usize) -> Option<usize> {
        self.locate(global_index).map(|(segment_index, _)| segment_index)
    }

    /// Splits a flat index into (segment, leg-in-segment).
    pub fn locate(&self, global_index: usize) -> Option<(usize, usize)> {
        let mut remaining = global_index;
        for (segment_index, segment) in self.segments.iter().enumerate() {
            if remaining < segment.len() {
                return Some((segment_index, remaining));
            }
            remaining -= segment.len();
        }
        None
    }

    pub fn global_index(&self, segment_index: usize, leg_index: usize) -> usize {
        self.segment_offset(segment_index) + leg_index
    }

    pub fn leg(&self, global_index: usize) -> Option<&LegDefinition> {
        let (segment_index, leg_index) = self.locate(global_index)?;
        self.leg_in_segment(segment_index, leg_index)
    }

    pub fn leg_in_segment(&self, segment_index: usize, leg_index: usize) -> Option<&LegDefinition> {
        let handle = *self.segments.get(segment_index)?.legs.get(leg_index)?;
        self.arena.get(handle)
    }

    /// Iterates legs in plan order with their flat indices.
    pub fn legs(&self) -> impl Iterator<Item = (usize, &LegDefinition)> {
        self.legs_from(0)
    }

    pub fn legs_from(&self, start: usize) -> impl Iterator<Item = (usize, &LegDefinition)> {
        self.segments
            .iter()
            .flat_map(|segment| segment.legs.iter().copied())
            .enumerate()
            .skip(start)
            .filter_map(|(index, handle)| self.arena.get(handle).map(|leg| (index, leg)))
    }

    /// Iterates legs backwards starting at `start` inclusive.
    pub fn legs_reverse_from(&self, start: usize) -> impl Iterator<Item = (usize, &LegDefinition)> {
        let handles: Vec<(usize, LegHandle)> = self
            .segments
            .iter()
            .flat_map(|segment| segment.legs.iter().copied())
            .enumerate()
            .take(start.saturating_add(1))
            .collect();
        handles
            .into_iter()
            .rev()
            .filter_map(|(index, handle)| self.arena.get(handle).map(|leg| (index, leg)))
    }

    pub fn prev_leg(&self, segment_index: usize, leg_index: usize) -> Option<(usize, &LegDefinition)> {
        let global = self.global_index(segment_index, leg_index);
        if global == 0 {
            return None;
        }
        self.leg(global - 1).map(|leg| (global - 1, leg))
    }

    pub fn next_leg(&self, segment_index: usize, leg_index: usize) -> Option<(usize, &LegDefinition)> {
        let global = self.global_index(segment_index, leg_index) + 1;
        self.leg(global).map(|leg| (global, leg))
    }

    pub fn add_segment(&mut self, segment_type: SegmentType, airway: Option<String>) -> usize {
        let segment_index = self.segments.len();
        self.segments.push(FlightPlanSegment::new(segment_type, airway));
        self.effects.push(PlanEffect::SegmentChanged {
            segment_index,
            change: ChangeKind::Added,
        });
        segment_index
    }

    pub fn insert_segment(
        &mut self,
        segment_index: usize,
        segment_type: SegmentType,
        airway: Option<String>,
    ) -> usize {
        let at = segment_index.min(self.segments.len());
        self.segments.insert(at, FlightPlanSegment::new(segment_type, airway));
        self.effects.push(PlanEffect::SegmentChanged {
            segment_index: at,
            change: ChangeKind::Inserted,
        });
        self.mark_dirty_from(self.segment_offset(at));
        at
    }

    /// Removes a segment and all its legs. Active leg pointers are not
    /// adjusted here, that is the caller's business.
    pub fn remove_segment(&mut self, segment_index: usize) -> bool {
        if segment_index >= self.segments.len() {
            return false;
        }
        let offset = self.segment_offset(segment_index);
        let segment = self.segments.remove(segment_index);
        for handle in segment.legs {
            self.arena.remove(handle);
        }
        self.effects.push(PlanEffect::SegmentChanged {
            segment_index,
            change: ChangeKind::Removed,
        });
        self.mark_dirty_from(offset);
        true
    }

    pub fn set_airway(&mut self, segment_index: usize, airway: Option<String>) -> bool {
        let Some(segment) = self.segments.get_mut(segment_index) else {
            return false;
        };
        segment.airway = airway;
        self.effects.push(PlanEffect::SegmentChanged {
            segment_index,
            change: ChangeKind::Changed,
        });
        true
    }

    /// Adds a leg to a segment, at `index` or appended.
    ///
    /// # Returns
    /// The flat index of the new leg, or `None` when the segment does not
    /// exist.
    pub fn add_leg(
        &mut self,
        segment_index: usize,
        leg: FlightPlanLeg,
        index: Option<usize>,
        flags: LegFlags,
    ) -> Option<usize> {
        let segment_len = self.segments.get(segment_index)?.len();
        let leg_index = index.unwrap_or(segment_len).min(segment_len);
        let handle = self.arena.insert(LegDefinition::new(leg, flags));
        self.segments[segment_index].legs.insert(leg_index, handle);
        let change = if leg_index == segment_len { ChangeKind::Added } else { ChangeKind::Inserted };
        self.effects.push(PlanEffect::LegChanged { segment_index, leg_index, change });
        let global = self.global_index(segment_index, leg_index);
        self.mark_dirty_from(global);
        Some(global)
    }

    pub fn remove_leg(&mut self, segment_index: usize, leg_index: usize) -> Option<LegDefinition> {
        let segment = self.segments.get_mut(segment_index)?;
        if leg_index >= segment.len() {
            return None;
        }
        let handle = segment.legs.remove(leg_index);
        let removed = self.arena.remove(handle)?;
        self.effects.push(PlanEffect::LegChanged {
            segment_index,
            leg_index,
            change: ChangeKind::Removed,
        });
        let global = self.global_index(segment_index, leg_index);
        self.mark_dirty_from(global);
        Some(removed)
    }

    /// Applies an in-place edit to a leg, journaling the change and marking
    /// the plan dirty from that leg on.
    pub fn update_leg<F>(&mut self, segment_index: usize, leg_index: usize, edit: F) -> bool
    where
        F: FnOnce(&mut LegDefinition),
    {
        let Some(segment) = self.segments.get(segment_index) else {
            return false;
        };
        let Some(&handle) = segment.legs.get(leg_index) else {
            return false;
        };
        let Some(leg) = self.arena.get_mut(handle) else {
            return false;
        };
        edit(leg);
        self.effects.push(PlanEffect::LegChanged {
            segment_index,
            leg_index,
            change: ChangeKind::Changed,
        });
        let global = self.global_index(segment_index, leg_index);
        self.mark_dirty_from(global);
        true
    }

    pub const fn active_lateral_leg(&self) -> usize {
        self.active_lateral_leg
    }

    pub fn set_active_lateral_leg(&mut self, index: usize) {
        let previous = self.active_lateral_leg;
        self.active_lateral_leg = index.min(self.leg_count());
        self.effects.push(PlanEffect::ActiveLegChanged {
            kind: ActiveLegKind::Lateral,
            index: self.active_lateral_leg,
            previous,
        });
    }

    pub const fn calculating_leg(&self) -> usize {
        self.calculating_leg
    }

    pub fn set_calculating_leg(&mut self, index: usize) {
        let previous = self.calculating_leg;
        self.calculating_leg = index.min(self.leg_count());
        self.effects.push(PlanEffect::ActiveLegChanged {
            kind: ActiveLegKind::Calculating,
            index: self.calculating_leg,
            previous,
        });
    }

    pub fn origin_airport(&self) -> Option<&str> {
        self.origin_airport.as_deref()
    }

    pub fn set_origin_airport(&mut self, airport: Option<String>) {
        self.origin_airport = airport;
        self.effects.push(PlanEffect::OriginChanged {
            airport: self.origin_airport.clone(),
        });
    }

    pub fn destination_airport(&self) -> Option<&str> {
        self.destination_airport.as_deref()
    }

    pub fn set_destination_airport(&mut self, airport: Option<String>) {
        self.destination_airport = airport;
        self.effects.push(PlanEffect::DestinationChanged {
            airport: self.destination_airport.clone(),
        });
    }

    pub const fn procedure_details(&self) -> &ProcedureDetails {
        &self.procedure_details
    }

    pub fn update_procedure_details<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut ProcedureDetails),
    {
        edit(&mut self.procedure_details);
        self.effects.push(PlanEffect::ProcedureDetailsChanged);
    }

    pub const fn direct_to(&self) -> Option<DirectToTarget> {
        self.direct_to
    }

    pub fn set_direct_to(&mut self, target: Option<DirectToTarget>) {
        self.direct_to = target;
        self.effects.push(PlanEffect::DirectToDataChanged);
    }

    /// Replaces the vertical constraint carried by a leg.
    pub fn set_leg_vertical_data(
        &mut self,
        segment_index: usize,
        leg_index: usize,
        vertical: VerticalData,
    ) -> bool {
        self.update_leg(segment_index, leg_index, |leg| leg.vertical = vertical)
    }

    /// Moves every leg of segment `first + 1` to the end of segment `first`
    /// and drops the emptied segment. The direct-to pointer follows its leg.
    pub fn merge_segments(&mut self, first: usize) -> bool {
        if first + 1 >= self.segments.len() {
            return false;
        }
        let first_len = self.segments[first].len();
        let moved = std::mem::take(&mut self.segments[first + 1].legs);
        self.segments[first].legs.extend(moved);
        self.segments.remove(first + 1);
        if let Some(mut target) = self.direct_to {
            if target.segment_index == first + 1 {
                target.segment_index = first;
                target.segment_leg_index += first_len;
                self.set_direct_to(Some(target));
            } else if target.segment_index > first + 1 {
                target.segment_index -= 1;
                self.set_direct_to(Some(target));
            }
        }
        self.effects.push(PlanEffect::SegmentChanged {
            segment_index: first,
            change: ChangeKind::Changed,
        });
        self.effects.push(PlanEffect::SegmentChanged {
            segment_index: first + 1,
            change: ChangeKind::Removed,
        });
        true
    }

    /// Deep copy of this plan for another slot. The copy starts with an
    /// empty journal and everything marked for recalculation.
    pub fn copy_to(&self, target_index: usize) -> Self {
        let mut copy = self.clone();
        copy.index = target_index;
        copy.effects = Vec::new();
        copy.dirty = BitVec::repeat(true, copy.leg_count());
        copy
    }

    /// Flat index of the first leg whose geometry is stale.
    pub fn first_dirty(&self) -> Option<usize> {
        self.dirty.first_one()
    }

    pub fn mark_all_dirty(&mut self) {
        self.mark_dirty_from(0);
    }

    fn mark_dirty_from(&mut self, from: usize) {
        let len = self.leg_count();
        self.dirty.resize(len, false);
        for index in from.min(len)..len {
            self.dirty.set(index, true);
        }
    }

    /// Snapshot of every leg for a calculator run.
    pub fn snapshots(&self) -> Vec<LegSnapshot> {
        self.legs()
            .map(|(_, leg)| LegSnapshot {
                leg: leg.leg.clone(),
                flags: leg.flags,
                calculated: leg.calculated.clone(),
            })
            .collect()
    }

    /// Writes calculator results for the window starting at `from_index`
    /// back into the legs and clears their dirty bits.
    pub fn apply_calculations(&mut self, from_index: usize, results: Vec<LegCalculations>) {
        let handles: Vec<LegHandle> = self
            .segments
            .iter()
            .flat_map(|segment| segment.legs.iter().copied())
            .skip(from_index)
            .take(results.len())
            .collect();
        self.dirty.resize(self.leg_count(), false);
        for (offset, (handle, calc)) in handles.into_iter().zip(results).enumerate() {
            if let Some(leg) = self.arena.get_mut(handle) {
                leg.calculated = Some(calc);
            }
            let global = from_index + offset;
            if global < self.dirty.len() {
                self.dirty.set(global, false);
            }
        }
        self.effects.push(PlanEffect::Calculated { from_index });
    }

    /// Drains the effect journal accumulated since the last drain.
    pub fn take_effects(&mut self) -> Vec<PlanEffect> {
        std::mem::take(&mut self.effects)
    }
}
