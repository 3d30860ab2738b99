use super::plan::FlightPlan;
use serde::{Deserialize, Serialize};

/// Slot of the primary plan being flown and edited.
pub const PRIMARY_PLAN: usize = 0;
/// Slot holding the synthetic plan of an off-plan direct-to.
pub const DTO_RANDOM_PLAN: usize = 1;
/// Slot for previewing a procedure before it is inserted.
pub const PROC_PREVIEW_PLAN: usize = 2;
/// Slots every registry starts with.
pub const PLAN_SLOTS: usize = 3;

/// Owner of all plan slots and of the active-plan pointer.
///
/// Slots are plain indices, well-known ones above. Consumers receive the
/// registry behind a lock, there is no global plan state anywhere.
#[derive(Debug, Serialize, Deserialize)]
pub struct PlanRegistry {
    plans: Vec<Option<FlightPlan>>,
    active_index: usize,
}

impl Default for PlanRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PlanRegistry {
    pub fn new() -> Self {
        Self {
            plans: (0..PLAN_SLOTS).map(|_| None).collect(),
            active_index: PRIMARY_PLAN,
        }
    }

    pub fn has_plan(&self, index: usize) -> bool {
        self.plans.get(index).is_some_and(Option::is_some)
    }

    /// Returns the plan in a slot, creating an empty one first if needed.
    /// Slots beyond the well-known three are grown on demand.
    pub fn create_plan(&mut self, index: usize) -> &mut FlightPlan {
        if index >= self.plans.len() {
            self.plans.resize_with(index + 1, || None);
        }
        self.plans[index].get_or_insert_with(|| FlightPlan::new(index))
    }

    pub fn plan(&self, index: usize) -> Option<&FlightPlan> {
        self.plans.get(index).and_then(Option::as_ref)
    }

    pub fn plan_mut(&mut self, index: usize) -> Option<&mut FlightPlan> {
        self.plans.get_mut(index).and_then(Option::as_mut)
    }

    pub fn delete_plan(&mut self, index: usize) -> bool {
        match self.plans.get_mut(index) {
            Some(slot) => slot.take().is_some(),
            None => false,
        }
    }

    /// Replaces the target slot with a deep copy of the source plan.
    pub fn copy_plan(&mut self, source: usize, target: usize) -> bool {
        let Some(copy) = self.plan(source).map(|plan| plan.copy_to(target)) else {
            return false;
        };
        if target >= self.plans.len() {
            self.plans.resize_with(target + 1, || None);
        }
        self.plans[target] = Some(copy);
        true
    }

    pub const fn active_index(&self) -> usize {
        self.active_index
    }

    /// Moves the active-plan pointer. Refused when the slot holds no plan.
    pub fn set_active_index(&mut self, index: usize) -> bool {
        if !self.has_plan(index) {
            return false;
        }
        self.active_index = index;
        true
    }

    pub fn active_plan(&self) -> Option<&FlightPlan> {
        self.plan(self.active_index)
    }

    pub fn active_plan_mut(&mut self) -> Option<&mut FlightPlan> {
        self.plan_mut(self.active_index)
    }

    /// Serializes every slot for transfer to a companion unit.
    pub fn export_snapshot(&self) -> Result<Vec<u8>, bincode::error::EncodeError> {
        bincode::serde::encode_to_vec(self, bincode::config::standard())
    }

    /// Replaces the registry content with a transferred snapshot. All legs
    /// come back without geometry and get recalculated on the next pass.
    pub fn import_snapshot(&mut self, bytes: &[u8]) -> Result<(), bincode::error::DecodeError> {
        let (mut incoming, _): (Self, usize) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        for plan in incoming.plans.iter_mut().flatten() {
            plan.mark_all_dirty();
        }
        *self = incoming;
        Ok(())
    }
}
