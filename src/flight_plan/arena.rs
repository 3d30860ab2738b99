use super::leg::LegDefinition;
use serde::{Deserialize, Serialize};

/// Stable handle to a leg in a [`LegArena`].
///
/// Handles stay valid across insertions and removals elsewhere in the arena.
/// Removing the referenced leg bumps its slot generation, so a retained
/// handle goes stale and resolves to nothing rather than to a reused slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LegHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Slot {
    generation: u32,
    leg: Option<LegDefinition>,
}

/// Generational arena owning every leg of one plan. Ordering lives in the
/// segments, the arena only owns storage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LegArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    len: usize,
}

impl LegArena {
    pub fn insert(&mut self, leg: LegDefinition) -> LegHandle {
        self.len += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.leg = Some(leg);
            LegHandle { index, generation: slot.generation }
        } else {
            let index = self.slots.len() as u32;
            self.slots.push(Slot { generation: 0, leg: Some(leg) });
            LegHandle { index, generation: 0 }
        }
    }

    pub fn get(&self, handle: LegHandle) -> Option<&LegDefinition> {
        let slot = self.slots.get(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.leg.as_ref()
    }

    pub fn get_mut(&mut self, handle: LegHandle) -> Option<&mut LegDefinition> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        slot.leg.as_mut()
    }

    pub fn remove(&mut self, handle: LegHandle) -> Option<LegDefinition> {
        let slot = self.slots.get_mut(handle.index as usize)?;
        if slot.generation != handle.generation {
            return None;
        }
        let leg = slot.leg.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        self.len -= 1;
        Some(leg)
    }

    pub const fn len(&self) -> usize {
        self.len
    }

    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}
