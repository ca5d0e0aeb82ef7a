use fixedbitset::FixedBitSet;

use crate::entity::{Entity, Slot, SlotState};

/// Lazy iterator over alive entities whose presence mask covers a kind set.
///
/// Slots are visited in ascending index order and evaluated as the iterator
/// is consumed, never snapshotted. Entities in pending-destroy state are
/// skipped even though their bits are still set: destruction intent has been
/// declared. The view borrows the manager, so structural mutation while a
/// view is live does not compile. Cloning restarts the sequence.
#[derive(Clone)]
pub struct View<'w> {
    pub(crate) slots: &'w [Slot],
    pub(crate) mask: FixedBitSet,
    pub(crate) cursor: usize,
}

impl Iterator for View<'_> {
    type Item = Entity;

    fn next(&mut self) -> Option<Entity> {
        while self.cursor < self.slots.len() {
            let index = self.cursor;
            self.cursor += 1;
            let slot = &self.slots[index];
            if slot.state == SlotState::Alive && self.mask.is_subset(&slot.mask) {
                return Some(Entity {
                    index: index as u32,
                    generation: slot.generation,
                });
            }
        }
        None
    }
}
