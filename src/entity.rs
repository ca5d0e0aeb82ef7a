use std::fmt;

use fixedbitset::FixedBitSet;

use crate::error::EcsError;

/// A generational entity handle. Uses compact u32 index + generation so
/// copies stay cheap and stale references are detectable after slot reuse.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Entity {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl Entity {
    /// Create an entity handle from raw parts (mainly for testing).
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The slot index of this entity.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// The generation of this entity (incremented on slot reuse).
    pub fn generation(&self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

/// Lifecycle state of a slot.
///
/// `PendingDestroy` keeps the slot's data and presence bits intact until the
/// next `refresh`, so destruction requested mid-iteration never reorders or
/// reclaims slots while a traversal is in flight.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum SlotState {
    Free,
    Alive,
    PendingDestroy,
}

/// Per-entity record: generation counter, lifecycle state, and the presence
/// mask over the schema's shared component+tag bit space.
pub(crate) struct Slot {
    pub(crate) generation: u32,
    pub(crate) state: SlotState,
    pub(crate) mask: FixedBitSet,
}

impl Slot {
    fn new(bits: usize) -> Self {
        Self {
            generation: 0,
            state: SlotState::Free,
            mask: FixedBitSet::with_capacity(bits),
        }
    }
}

/// Slot table with free-list recycling and generational validation.
///
/// Invariant: a slot's mask only carries bits while its state is not `Free`;
/// `finalize` clears the mask before the slot re-enters the free list.
pub(crate) struct Slots {
    slots: Vec<Slot>,
    free: Vec<u32>,
    bits: usize,
    alive: usize,
    pending: usize,
}

impl Slots {
    pub fn new(bits: usize) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            bits,
            alive: 0,
            pending: 0,
        }
    }

    /// Pre-allocate `capacity` free slots. Lowest indices are handed out
    /// first.
    pub fn with_capacity(bits: usize, capacity: usize) -> Self {
        let mut slots = Self::new(bits);
        slots.slots.reserve(capacity);
        for _ in 0..capacity {
            slots.slots.push(Slot::new(bits));
        }
        for index in (0..capacity as u32).rev() {
            slots.free.push(index);
        }
        slots
    }

    /// Claim a slot: reuse a free one if available, else append. The slot
    /// comes back `Alive` with an empty mask.
    pub fn allocate(&mut self) -> Entity {
        self.alive += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.state = SlotState::Alive;
            Entity {
                index,
                generation: slot.generation,
            }
        } else {
            let index = self.slots.len() as u32;
            let mut slot = Slot::new(self.bits);
            slot.state = SlotState::Alive;
            self.slots.push(slot);
            Entity {
                index,
                generation: 0,
            }
        }
    }

    /// Move an `Alive` slot to `PendingDestroy`. Mask, storage, and
    /// generation are untouched until `finalize`.
    pub fn mark_pending(&mut self, entity: Entity) -> Result<(), EcsError> {
        let Some(slot) = self.slots.get_mut(entity.index as usize) else {
            return Err(EcsError::StaleHandle(entity));
        };
        if slot.generation != entity.generation {
            return Err(EcsError::StaleHandle(entity));
        }
        match slot.state {
            SlotState::Alive => {
                slot.state = SlotState::PendingDestroy;
                self.alive -= 1;
                self.pending += 1;
                Ok(())
            }
            SlotState::PendingDestroy | SlotState::Free => {
                Err(EcsError::DoubleDestroy(entity))
            }
        }
    }

    /// Finalize a `PendingDestroy` slot: clear the mask, bump the
    /// generation (invalidating every outstanding handle), and recycle the
    /// index. The caller has already detached all stored data.
    pub fn finalize(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        debug_assert_eq!(slot.state, SlotState::PendingDestroy);
        slot.mask.clear();
        slot.state = SlotState::Free;
        slot.generation = slot.generation.wrapping_add(1);
        self.pending -= 1;
        self.free.push(index);
    }

    /// Validate a handle for data access: generation must match and the slot
    /// must not be free. `PendingDestroy` passes, since data stays
    /// inspectable until compaction. Returns the slot index.
    pub fn check_usable(&self, entity: Entity) -> Result<u32, EcsError> {
        let Some(slot) = self.slots.get(entity.index as usize) else {
            return Err(EcsError::StaleHandle(entity));
        };
        if slot.generation != entity.generation {
            return Err(EcsError::StaleHandle(entity));
        }
        if slot.state == SlotState::Free {
            return Err(EcsError::InvalidState(entity));
        }
        Ok(entity.index)
    }

    pub fn is_valid(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .map_or(false, |slot| {
                slot.generation == entity.generation && slot.state != SlotState::Free
            })
    }

    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots
            .get(entity.index as usize)
            .map_or(false, |slot| {
                slot.generation == entity.generation && slot.state == SlotState::Alive
            })
    }

    pub fn state_at(&self, index: u32) -> SlotState {
        self.slots[index as usize].state
    }

    pub fn handle_at(&self, index: u32) -> Entity {
        Entity {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    pub fn mask_at(&self, index: u32) -> &FixedBitSet {
        &self.slots[index as usize].mask
    }

    pub fn set_bit(&mut self, index: u32, bit: usize) {
        self.slots[index as usize].mask.insert(bit);
    }

    pub fn clear_bit(&mut self, index: u32, bit: usize) {
        self.slots[index as usize].mask.set(bit, false);
    }

    pub fn bit_set(&self, index: u32, bit: usize) -> bool {
        self.slots[index as usize].mask.contains(bit)
    }

    pub fn as_slice(&self) -> &[Slot] {
        &self.slots
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn alive_count(&self) -> usize {
        self.alive
    }

    pub fn pending_count(&self) -> usize {
        self.pending
    }

    pub fn free_count(&self) -> usize {
        self.slots.len() - self.alive - self.pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_sequential() {
        let mut slots = Slots::new(4);
        let e0 = slots.allocate();
        let e1 = slots.allocate();
        assert_eq!(e0.index, 0);
        assert_eq!(e1.index, 1);
        assert_eq!(e0.generation, 0);
        assert_eq!(slots.alive_count(), 2);
    }

    #[test]
    fn pending_then_finalize_recycles_with_new_generation() {
        let mut slots = Slots::new(4);
        let e0 = slots.allocate();
        slots.mark_pending(e0).unwrap();
        assert!(slots.is_valid(e0));
        assert!(!slots.is_alive(e0));

        slots.finalize(e0.index);
        assert!(!slots.is_valid(e0));

        let e0_reused = slots.allocate();
        assert_eq!(e0_reused.index, 0);
        assert_eq!(e0_reused.generation, 1);
        assert!(!slots.is_valid(e0));
    }

    #[test]
    fn double_destroy_is_an_error() {
        let mut slots = Slots::new(4);
        let e = slots.allocate();
        slots.mark_pending(e).unwrap();
        assert!(matches!(
            slots.mark_pending(e),
            Err(EcsError::DoubleDestroy(_))
        ));
    }

    #[test]
    fn stale_generation_is_an_error() {
        let mut slots = Slots::new(4);
        let e = slots.allocate();
        slots.mark_pending(e).unwrap();
        slots.finalize(e.index);
        let _reused = slots.allocate();
        assert!(matches!(slots.mark_pending(e), Err(EcsError::StaleHandle(_))));
        assert!(matches!(slots.check_usable(e), Err(EcsError::StaleHandle(_))));
    }

    #[test]
    fn with_capacity_hands_out_low_indices_first() {
        let mut slots = Slots::with_capacity(2, 3);
        assert_eq!(slots.free_count(), 3);
        let e = slots.allocate();
        assert_eq!(e.index, 0);
        assert_eq!(slots.free_count(), 2);
    }

    #[test]
    fn finalize_clears_mask() {
        let mut slots = Slots::new(4);
        let e = slots.allocate();
        slots.set_bit(e.index, 2);
        assert!(slots.bit_set(e.index, 2));
        slots.mark_pending(e).unwrap();
        assert!(slots.bit_set(e.index, 2));
        slots.finalize(e.index);
        assert!(!slots.bit_set(e.index, 2));
    }
}
