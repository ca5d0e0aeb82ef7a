use std::any::{type_name, TypeId};
use std::fmt;

use fixedbitset::FixedBitSet;
use tracing::{debug, trace};

use crate::bundle::{assert_distinct_kinds, ComponentBundle, KindSet, Signature};
use crate::entity::{Entity, SlotState, Slots};
use crate::error::EcsError;
use crate::schema::{KindClass, Schema};
use crate::store::{
    Component, ComponentHooks, ComponentStore, StoreMap, TagHooks, TagStore,
};
use crate::view::View;

/// The central container. Owns the frozen schema, the slot table, and one
/// store per registered kind; every lifecycle, attachment, and query
/// operation goes through it.
///
/// Single-threaded by contract: operations take `&self`/`&mut self` and
/// never block, and hooks run inline on the caller's thread in registration
/// order.
pub struct EntityManager {
    schema: Schema,
    slots: Slots,
    stores: StoreMap,
}

impl EntityManager {
    pub fn new(schema: Schema) -> Self {
        let stores = schema.make_stores();
        let slots = Slots::new(schema.bit_count());
        Self {
            schema,
            slots,
            stores,
        }
    }

    /// Like [`new`](Self::new), with `capacity` slots pre-allocated.
    pub fn with_capacity(schema: Schema, capacity: usize) -> Self {
        let stores = schema.make_stores();
        let slots = Slots::with_capacity(schema.bit_count(), capacity);
        Self {
            schema,
            slots,
            stores,
        }
    }

    /// The frozen schema this manager was built from.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    // ---- Lifecycle ----

    /// Claim a slot (recycling freed ones) and return its handle. The new
    /// entity is alive with no components or tags attached.
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.slots.allocate();
        trace!(entity = %entity, "entity created");
        entity
    }

    /// Declare destruction intent. The entity leaves every view and
    /// traversal immediately, but its data, presence bits, and handle stay
    /// intact (and inspectable) until the next [`refresh`](Self::refresh).
    ///
    /// Destroying an entity that is already pending destroy, or whose slot
    /// was freed, is reported as [`EcsError::DoubleDestroy`].
    pub fn destroy_entity(&mut self, entity: Entity) -> Result<(), EcsError> {
        self.slots.mark_pending(entity)?;
        trace!(entity = %entity, "entity pending destroy");
        Ok(())
    }

    /// Compaction: finalize every pending-destroy slot, in ascending slot
    /// order. For each one, remove hooks fire for every attached kind in
    /// bit-index order (components before tags), stored values are dropped,
    /// and the slot re-enters the free list with a bumped generation. This
    /// is the only point where outstanding handles become stale. Returns
    /// the number of slots reclaimed; a refresh with nothing pending
    /// changes nothing.
    pub fn refresh(&mut self) -> usize {
        let mut reclaimed = 0;
        for index in 0..self.slots.len() as u32 {
            if self.slots.state_at(index) != SlotState::PendingDestroy {
                continue;
            }
            let entity = self.slots.handle_at(index);
            let mask = self.slots.mask_at(index);
            for bit in mask.ones() {
                let tid = self.schema.bit_owner(bit);
                if let Some(store) = self.stores.get_mut(&tid) {
                    store.detach(entity);
                }
            }
            self.slots.finalize(index);
            reclaimed += 1;
        }
        if reclaimed > 0 {
            debug!(reclaimed, "refresh finalized pending entities");
        }
        reclaimed
    }

    /// Whether the handle still refers to its slot: the generation matches
    /// and the slot has not been freed. Pending-destroy entities are still
    /// valid until compaction.
    pub fn is_valid(&self, entity: Entity) -> bool {
        self.slots.is_valid(entity)
    }

    /// Whether the handle is valid and the entity is not pending destroy.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.slots.is_alive(entity)
    }

    pub fn entity_count(&self) -> usize {
        self.slots.alive_count()
    }

    pub fn pending_count(&self) -> usize {
        self.slots.pending_count()
    }

    pub fn free_count(&self) -> usize {
        self.slots.free_count()
    }

    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    // ---- Attachment ----

    /// Attach a component, replacing any existing value of the same kind
    /// (add hooks fire either way). Permitted on pending-destroy entities;
    /// the value is cleaned up at the next refresh. Add hooks run after the
    /// value and presence bit are committed, so a hook observing the entity
    /// sees consistent state. Returns the stored value.
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<&mut T, EcsError> {
        let bit = self
            .schema
            .component_bit(TypeId::of::<T>(), type_name::<T>())?;
        let index = self.slots.check_usable(entity)?;
        self.store_mut::<T>().insert(index, value);
        self.slots.set_bit(index, bit);
        let store = self.store_mut::<T>();
        store.fire_added(entity);
        Ok(store.get_mut(index).expect("value was just inserted"))
    }

    /// Detach a component and return its value. Remove hooks fire first,
    /// while the value is still attached; the presence bit clears
    /// immediately after the value is taken out.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<T, EcsError> {
        let bit = self
            .schema
            .component_bit(TypeId::of::<T>(), type_name::<T>())?;
        let index = self.slots.check_usable(entity)?;
        if !self.slots.bit_set(index, bit) {
            return Err(EcsError::MissingComponent {
                entity,
                kind: type_name::<T>(),
            });
        }
        let store = self.store_mut::<T>();
        store.fire_removed(entity);
        let value = store
            .take(index)
            .expect("presence bit implies a stored value");
        self.slots.clear_bit(index, bit);
        Ok(value)
    }

    /// Attach a tag. Re-adding a present tag fires add hooks again, same as
    /// re-adding a component.
    pub fn add_tag<T: 'static>(&mut self, entity: Entity) -> Result<(), EcsError> {
        let bit = self.schema.tag_bit(TypeId::of::<T>(), type_name::<T>())?;
        let index = self.slots.check_usable(entity)?;
        self.slots.set_bit(index, bit);
        self.tag_store_mut::<T>().fire_added(entity);
        Ok(())
    }

    /// Detach a tag. Remove hooks fire before the bit clears.
    pub fn remove_tag<T: 'static>(&mut self, entity: Entity) -> Result<(), EcsError> {
        let bit = self.schema.tag_bit(TypeId::of::<T>(), type_name::<T>())?;
        let index = self.slots.check_usable(entity)?;
        if !self.slots.bit_set(index, bit) {
            return Err(EcsError::MissingComponent {
                entity,
                kind: type_name::<T>(),
            });
        }
        self.tag_store_mut::<T>().fire_removed(entity);
        self.slots.clear_bit(index, bit);
        Ok(())
    }

    /// Whether the component kind is attached. `Ok(false)` for handles that
    /// are stale or freed; `Err` only if the kind is not in the schema.
    pub fn has_component<T: Component>(&self, entity: Entity) -> Result<bool, EcsError> {
        let bit = self
            .schema
            .component_bit(TypeId::of::<T>(), type_name::<T>())?;
        match self.slots.check_usable(entity) {
            Ok(index) => Ok(self.slots.bit_set(index, bit)),
            Err(_) => Ok(false),
        }
    }

    /// Whether the tag kind is attached; same conventions as
    /// [`has_component`](Self::has_component).
    pub fn has_tag<T: 'static>(&self, entity: Entity) -> Result<bool, EcsError> {
        let bit = self.schema.tag_bit(TypeId::of::<T>(), type_name::<T>())?;
        match self.slots.check_usable(entity) {
            Ok(index) => Ok(self.slots.bit_set(index, bit)),
            Err(_) => Ok(false),
        }
    }

    // ---- Data access ----

    /// Shared reference to one attached component. Works on alive and
    /// pending-destroy entities alike; data stays inspectable until
    /// compaction.
    pub fn get_component<T: Component>(&self, entity: Entity) -> Result<&T, EcsError> {
        let bit = self
            .schema
            .component_bit(TypeId::of::<T>(), type_name::<T>())?;
        let index = self.slots.check_usable(entity)?;
        if !self.slots.bit_set(index, bit) {
            return Err(EcsError::MissingComponent {
                entity,
                kind: type_name::<T>(),
            });
        }
        Ok(self
            .store::<T>()
            .get(index)
            .expect("presence bit implies a stored value"))
    }

    /// Mutable reference to one attached component.
    pub fn get_component_mut<T: Component>(&mut self, entity: Entity) -> Result<&mut T, EcsError> {
        let bit = self
            .schema
            .component_bit(TypeId::of::<T>(), type_name::<T>())?;
        let index = self.slots.check_usable(entity)?;
        if !self.slots.bit_set(index, bit) {
            return Err(EcsError::MissingComponent {
                entity,
                kind: type_name::<T>(),
            });
        }
        Ok(self
            .store_mut::<T>()
            .get_mut(index)
            .expect("presence bit implies a stored value"))
    }

    /// Shared references to a bundle of components, in tuple order. Fails
    /// with [`EcsError::MissingComponent`] naming the first absent kind.
    pub fn get_components<B: ComponentBundle>(
        &self,
        entity: Entity,
    ) -> Result<B::Ref<'_>, EcsError> {
        let index = self.slots.check_usable(entity)?;
        for (tid, name) in B::kinds() {
            let bit = self.schema.component_bit(tid, name)?;
            if !self.slots.bit_set(index, bit) {
                return Err(EcsError::MissingComponent { entity, kind: name });
            }
        }
        Ok(B::fetch(&self.stores, index).expect("presence bits imply stored values"))
    }

    /// Mutable references to a bundle of components, in tuple order. The
    /// bundle's member types must be distinct.
    pub fn get_components_mut<B: ComponentBundle>(
        &mut self,
        entity: Entity,
    ) -> Result<B::Mut<'_>, EcsError> {
        let index = self.slots.check_usable(entity)?;
        let kinds = B::kinds();
        assert_distinct_kinds(&kinds);
        for (tid, name) in kinds {
            let bit = self.schema.component_bit(tid, name)?;
            if !self.slots.bit_set(index, bit) {
                return Err(EcsError::MissingComponent { entity, kind: name });
            }
        }
        // Safety: `&mut self` guarantees exclusive access and the member
        // types were just checked distinct.
        Ok(unsafe { B::fetch_mut(&self.stores, index) }
            .expect("presence bits imply stored values"))
    }

    // ---- Hooks ----

    /// Hook registration surface for a component kind.
    pub fn component_hooks<T: Component>(&mut self) -> Result<ComponentHooks<'_, T>, EcsError> {
        self.schema
            .component_bit(TypeId::of::<T>(), type_name::<T>())?;
        Ok(ComponentHooks::new(self.store_mut::<T>()))
    }

    /// Hook registration surface for a tag kind.
    pub fn tag_hooks<T: 'static>(&mut self) -> Result<TagHooks<'_, T>, EcsError> {
        self.schema.tag_bit(TypeId::of::<T>(), type_name::<T>())?;
        Ok(TagHooks::new(self.tag_store_mut::<T>()))
    }

    // ---- Queries ----

    /// Lazy view over alive entities carrying every kind in `K` (components
    /// and tags both allowed). See [`View`] for iteration semantics.
    pub fn view<K: KindSet>(&self) -> Result<View<'_>, EcsError> {
        let mut mask = FixedBitSet::with_capacity(self.schema.bit_count());
        for (tid, name) in K::kinds() {
            mask.insert(self.schema.kind_bit(tid, name)?);
        }
        Ok(View {
            slots: self.slots.as_slice(),
            mask,
            cursor: 0,
        })
    }

    /// Lazy view over every alive entity, regardless of attached kinds.
    pub fn entities(&self) -> View<'_> {
        View {
            slots: self.slots.as_slice(),
            mask: FixedBitSet::with_capacity(self.schema.bit_count()),
            cursor: 0,
        }
    }

    /// Invoke `f` for every alive entity matching the registered signature
    /// `S`, in ascending slot order, passing shared references to the
    /// signature's component members in declared order. Tag members gate
    /// the match but contribute no argument. Pending-destroy entities never
    /// match.
    pub fn traverse_entity_match_signature<'a, S, F>(&'a self, mut f: F) -> Result<(), EcsError>
    where
        S: Signature,
        F: FnMut(<S::Components as ComponentBundle>::Ref<'a>),
    {
        let mask = self.schema.signature_mask::<S>()?;
        for (index, slot) in self.slots.as_slice().iter().enumerate() {
            if slot.state != SlotState::Alive || !mask.is_subset(&slot.mask) {
                continue;
            }
            let row = <S::Components as ComponentBundle>::fetch(&self.stores, index as u32)
                .expect("signature match implies member presence");
            f(row);
        }
        Ok(())
    }

    /// Like [`Self::traverse_entity_match_signature`], passing mutable
    /// references. The signature's component members must be distinct types.
    pub fn traverse_entity_match_signature_mut<'a, S, F>(
        &'a mut self,
        mut f: F,
    ) -> Result<(), EcsError>
    where
        S: Signature,
        F: FnMut(<S::Components as ComponentBundle>::Mut<'a>),
    {
        assert_distinct_kinds(&<S::Components as ComponentBundle>::kinds());
        let Self {
            schema,
            slots,
            stores,
        } = self;
        let mask = schema.signature_mask::<S>()?;
        let stores: &'a StoreMap = stores;
        for (index, slot) in slots.as_slice().iter().enumerate() {
            if slot.state != SlotState::Alive || !mask.is_subset(&slot.mask) {
                continue;
            }
            // Safety: each slot is visited once and the member types are
            // distinct, so no two rows alias.
            let row = unsafe {
                <S::Components as ComponentBundle>::fetch_mut(stores, index as u32)
            }
            .expect("signature match implies member presence");
            f(row);
        }
        Ok(())
    }

    // ---- Accessors ----

    /// Read-only accessor bound to one entity. Fails if the handle is stale
    /// or the slot is free.
    pub fn entity(&self, entity: Entity) -> Result<EntityRef<'_>, EcsError> {
        self.slots.check_usable(entity)?;
        Ok(EntityRef {
            manager: self,
            entity,
        })
    }

    /// Mutating accessor bound to one entity.
    pub fn entity_mut(&mut self, entity: Entity) -> Result<EntityMut<'_>, EcsError> {
        self.slots.check_usable(entity)?;
        Ok(EntityMut {
            manager: self,
            entity,
        })
    }

    // ---- Diagnostics ----

    /// Snapshot of slot counts and per-kind populations. Observational
    /// only; nothing in the manager depends on it.
    pub fn status(&self) -> Status {
        let kinds = self
            .schema
            .kinds_in_bit_order()
            .enumerate()
            .map(|(bit, (name, class))| KindStatus {
                name,
                class,
                population: self
                    .slots
                    .as_slice()
                    .iter()
                    .filter(|slot| slot.state != SlotState::Free && slot.mask.contains(bit))
                    .count(),
            })
            .collect();
        Status {
            alive: self.slots.alive_count(),
            pending_destroy: self.slots.pending_count(),
            free: self.slots.free_count(),
            kinds,
        }
    }

    fn store<T: Component>(&self) -> &ComponentStore<T> {
        self.stores
            .get(&TypeId::of::<T>())
            .and_then(|store| store.as_any().downcast_ref())
            .expect("a store exists for every registered kind")
    }

    fn store_mut<T: Component>(&mut self) -> &mut ComponentStore<T> {
        self.stores
            .get_mut(&TypeId::of::<T>())
            .and_then(|store| store.as_any_mut().downcast_mut())
            .expect("a store exists for every registered kind")
    }

    fn tag_store_mut<T: 'static>(&mut self) -> &mut TagStore<T> {
        self.stores
            .get_mut(&TypeId::of::<T>())
            .and_then(|store| store.as_any_mut().downcast_mut())
            .expect("a store exists for every registered kind")
    }
}

/// Read-only forwarding accessor for one entity.
#[derive(Clone, Copy)]
pub struct EntityRef<'w> {
    manager: &'w EntityManager,
    entity: Entity,
}

impl<'w> EntityRef<'w> {
    pub fn id(&self) -> Entity {
        self.entity
    }

    pub fn get_component<T: Component>(&self) -> Result<&'w T, EcsError> {
        self.manager.get_component(self.entity)
    }

    pub fn get_components<B: ComponentBundle>(&self) -> Result<B::Ref<'w>, EcsError> {
        self.manager.get_components::<B>(self.entity)
    }

    pub fn has_component<T: Component>(&self) -> Result<bool, EcsError> {
        self.manager.has_component::<T>(self.entity)
    }

    pub fn has_tag<T: 'static>(&self) -> Result<bool, EcsError> {
        self.manager.has_tag::<T>(self.entity)
    }
}

/// Mutating forwarding accessor for one entity.
pub struct EntityMut<'w> {
    manager: &'w mut EntityManager,
    entity: Entity,
}

impl<'w> EntityMut<'w> {
    pub fn id(&self) -> Entity {
        self.entity
    }

    pub fn add_component<T: Component>(&mut self, value: T) -> Result<&mut T, EcsError> {
        self.manager.add_component(self.entity, value)
    }

    pub fn remove_component<T: Component>(&mut self) -> Result<T, EcsError> {
        self.manager.remove_component(self.entity)
    }

    pub fn add_tag<T: 'static>(&mut self) -> Result<(), EcsError> {
        self.manager.add_tag::<T>(self.entity)
    }

    pub fn remove_tag<T: 'static>(&mut self) -> Result<(), EcsError> {
        self.manager.remove_tag::<T>(self.entity)
    }

    pub fn get_component<T: Component>(&self) -> Result<&T, EcsError> {
        self.manager.get_component(self.entity)
    }

    pub fn get_component_mut<T: Component>(&mut self) -> Result<&mut T, EcsError> {
        self.manager.get_component_mut(self.entity)
    }

    /// Declare destruction intent for this entity, consuming the accessor.
    pub fn destroy(self) -> Result<(), EcsError> {
        self.manager.destroy_entity(self.entity)
    }
}

/// Per-kind population entry in a [`Status`] report.
pub struct KindStatus {
    pub name: &'static str,
    pub class: KindClass,
    pub population: usize,
}

/// Observational snapshot of the manager: slot counts and per-kind
/// populations (pending-destroy entities still count until compaction).
pub struct Status {
    pub alive: usize,
    pub pending_destroy: usize,
    pub free: usize,
    pub kinds: Vec<KindStatus>,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "entities: {} alive, {} pending destroy, {} free",
            self.alive, self.pending_destroy, self.free
        )?;
        for kind in &self.kinds {
            writeln!(f, "  {} {}: {}", kind.class, kind.name, kind.population)?;
        }
        Ok(())
    }
}
