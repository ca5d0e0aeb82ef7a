use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::entity::Entity;

/// Marker trait for types that can be stored as components.
pub trait Component: 'static {}

/// Blanket implementation: any `'static` type is a valid component. The
/// manager is single-threaded by contract, so no `Send`/`Sync` bound is
/// required.
impl<T: 'static> Component for T {}

/// Type-erased per-kind storage interface. One store exists per registered
/// component or tag kind; compaction drives it through this trait when only
/// the bit index (not the concrete type) is known.
pub(crate) trait KindStore: Any {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Fire remove hooks for `entity` and drop its stored value, if any.
    fn detach(&mut self, entity: Entity);
}

/// Map from kind `TypeId` to its erased store.
pub(crate) type StoreMap = HashMap<TypeId, Box<dyn KindStore>>;

type ComponentHook<T> = Box<dyn FnMut(Entity, &mut T)>;
type TagHook = Box<dyn FnMut(Entity)>;

/// Storage for a single component kind: sparse-set keyed by slot index
/// (O(1) insert/remove/lookup, packed values), plus the ordered add/remove
/// hook lists for the kind. Hooks live with the values so `detach` can fire
/// them through the type-erased interface.
pub(crate) struct ComponentStore<T: Component> {
    /// Maps slot index to dense index. `None` means no value stored.
    sparse: Vec<Option<usize>>,
    /// Packed component values.
    dense: Vec<T>,
    /// Slot index owning each dense entry.
    owners: Vec<u32>,
    on_added: Vec<ComponentHook<T>>,
    on_removed: Vec<ComponentHook<T>>,
}

impl<T: Component> ComponentStore<T> {
    pub fn new() -> Self {
        Self {
            sparse: Vec::new(),
            dense: Vec::new(),
            owners: Vec::new(),
            on_added: Vec::new(),
            on_removed: Vec::new(),
        }
    }

    /// Insert or replace the value for a slot.
    pub fn insert(&mut self, index: u32, value: T) {
        let idx = index as usize;
        if idx >= self.sparse.len() {
            self.sparse.resize_with(idx + 1, || None);
        }
        if let Some(dense_idx) = self.sparse[idx] {
            self.dense[dense_idx] = value;
        } else {
            self.sparse[idx] = Some(self.dense.len());
            self.dense.push(value);
            self.owners.push(index);
        }
    }

    pub fn get(&self, index: u32) -> Option<&T> {
        let dense_idx = *self.sparse.get(index as usize)?;
        dense_idx.map(|i| &self.dense[i])
    }

    pub fn get_mut(&mut self, index: u32) -> Option<&mut T> {
        let dense_idx = *self.sparse.get(index as usize)?;
        dense_idx.map(move |i| &mut self.dense[i])
    }

    /// Remove the value for a slot (swap-remove in the dense array),
    /// returning it. Hooks are NOT fired here; callers fire them first so
    /// remove hooks observe the live value.
    pub fn take(&mut self, index: u32) -> Option<T> {
        let idx = index as usize;
        let dense_idx = self.sparse.get_mut(idx)?.take()?;
        let last = self.dense.len() - 1;
        self.dense.swap(dense_idx, last);
        self.owners.swap(dense_idx, last);
        let value = self.dense.pop();
        self.owners.pop();
        if dense_idx < self.dense.len() {
            let moved = self.owners[dense_idx];
            self.sparse[moved as usize] = Some(dense_idx);
        }
        value
    }

    pub fn has(&self, index: u32) -> bool {
        matches!(self.sparse.get(index as usize), Some(Some(_)))
    }

    /// Invoke every add hook, in registration order, with the stored value.
    pub fn fire_added(&mut self, entity: Entity) {
        let Some(Some(dense_idx)) = self.sparse.get(entity.index as usize).copied() else {
            return;
        };
        let value = &mut self.dense[dense_idx];
        for hook in &mut self.on_added {
            hook(entity, value);
        }
    }

    /// Invoke every remove hook, in registration order, with the still-live
    /// value.
    pub fn fire_removed(&mut self, entity: Entity) {
        let Some(Some(dense_idx)) = self.sparse.get(entity.index as usize).copied() else {
            return;
        };
        let value = &mut self.dense[dense_idx];
        for hook in &mut self.on_removed {
            hook(entity, value);
        }
    }
}

impl<T: Component> KindStore for ComponentStore<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn detach(&mut self, entity: Entity) {
        if self.has(entity.index) {
            self.fire_removed(entity);
            self.take(entity.index);
        }
    }
}

/// Storage for a single tag kind. Tags carry no value, so only the hook
/// lists live here; presence is tracked purely in the slot masks.
pub(crate) struct TagStore<T: 'static> {
    on_added: Vec<TagHook>,
    on_removed: Vec<TagHook>,
    _marker: PhantomData<T>,
}

impl<T: 'static> TagStore<T> {
    pub fn new() -> Self {
        Self {
            on_added: Vec::new(),
            on_removed: Vec::new(),
            _marker: PhantomData,
        }
    }

    pub fn fire_added(&mut self, entity: Entity) {
        for hook in &mut self.on_added {
            hook(entity);
        }
    }

    pub fn fire_removed(&mut self, entity: Entity) {
        for hook in &mut self.on_removed {
            hook(entity);
        }
    }
}

impl<T: 'static> KindStore for TagStore<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn detach(&mut self, entity: Entity) {
        self.fire_removed(entity);
    }
}

/// Fluent hook registration surface for one component kind, obtained from
/// `EntityManager::component_hooks`.
pub struct ComponentHooks<'a, T: Component> {
    store: &'a mut ComponentStore<T>,
}

impl<'a, T: Component> ComponentHooks<'a, T> {
    pub(crate) fn new(store: &'a mut ComponentStore<T>) -> Self {
        Self { store }
    }

    /// Register a hook fired after a value of this kind is attached.
    pub fn on_added(self, hook: impl FnMut(Entity, &mut T) + 'static) -> Self {
        self.store.on_added.push(Box::new(hook));
        self
    }

    /// Register a hook fired before a value of this kind is detached.
    pub fn on_removed(self, hook: impl FnMut(Entity, &mut T) + 'static) -> Self {
        self.store.on_removed.push(Box::new(hook));
        self
    }
}

/// Fluent hook registration surface for one tag kind, obtained from
/// `EntityManager::tag_hooks`.
pub struct TagHooks<'a, T: 'static> {
    store: &'a mut TagStore<T>,
}

impl<'a, T: 'static> TagHooks<'a, T> {
    pub(crate) fn new(store: &'a mut TagStore<T>) -> Self {
        Self { store }
    }

    /// Register a hook fired after the tag is attached.
    pub fn on_added(self, hook: impl FnMut(Entity) + 'static) -> Self {
        self.store.on_added.push(Box::new(hook));
        self
    }

    /// Register a hook fired before the tag is detached.
    pub fn on_removed(self, hook: impl FnMut(Entity) + 'static) -> Self {
        self.store.on_removed.push(Box::new(hook));
        self
    }
}
