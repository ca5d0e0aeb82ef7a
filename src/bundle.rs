#![allow(private_interfaces)]

use std::any::{type_name, TypeId};

use crate::store::{Component, ComponentStore, KindStore, StoreMap};

/// A tuple of kinds (components or tags) used to build a presence mask for
/// `EntityManager::view`. Membership is resolved against the schema at the
/// call site; an unregistered member is a configuration error.
pub trait KindSet: 'static {
    fn kinds() -> Vec<(TypeId, &'static str)>;
}

/// A tuple of component kinds fetched together: `get_components` returns the
/// bundle's references in tuple order, and signature traversal passes them
/// to the callback in declared order.
pub trait ComponentBundle: 'static {
    type Ref<'w>;
    type Mut<'w>;

    /// The bundle's component kinds in declared (tuple) order.
    fn kinds() -> Vec<(TypeId, &'static str)>;

    /// Fetch shared references for a slot. `None` if any member is absent.
    fn fetch<'w>(stores: &'w StoreMap, index: u32) -> Option<Self::Ref<'w>>;

    /// Fetch mutable references for a slot.
    ///
    /// # Safety
    /// The caller must hold exclusive access to the store map for `'w` and
    /// ensure the bundle's member types are distinct, so no two returned
    /// references alias.
    unsafe fn fetch_mut<'w>(stores: &'w StoreMap, index: u32) -> Option<Self::Mut<'w>>;
}

/// A declared query shape: a set of component kinds plus a set of tag kinds,
/// registered with the schema and matched as one precomputed bitmask.
///
/// ```
/// use sigil_ecs::Signature;
///
/// struct Position { x: f32 }
/// struct Velocity { dx: f32 }
/// struct Anchored;
///
/// struct Moving;
/// impl Signature for Moving {
///     type Components = (Position, Velocity);
///     type Tags = ();
/// }
///
/// struct Parked;
/// impl Signature for Parked {
///     type Components = (Position,);
///     type Tags = (Anchored,);
/// }
/// ```
pub trait Signature: 'static {
    /// Component members, in the order traversal callbacks receive them.
    type Components: ComponentBundle;
    /// Tag members. Contribute presence bits only, never callback arguments.
    type Tags: KindSet;
}

/// Panic if a mutable bundle names the same kind twice; two live `&mut` to
/// one value would alias.
pub(crate) fn assert_distinct_kinds(kinds: &[(TypeId, &'static str)]) {
    for (i, (tid, name)) in kinds.iter().enumerate() {
        for (other, _) in &kinds[i + 1..] {
            assert!(
                tid != other,
                "component kind `{name}` appears twice in a mutable bundle"
            );
        }
    }
}

impl KindSet for () {
    fn kinds() -> Vec<(TypeId, &'static str)> {
        Vec::new()
    }
}

impl ComponentBundle for () {
    type Ref<'w> = ();
    type Mut<'w> = ();

    fn kinds() -> Vec<(TypeId, &'static str)> {
        Vec::new()
    }

    fn fetch<'w>(_stores: &'w StoreMap, _index: u32) -> Option<()> {
        Some(())
    }

    unsafe fn fetch_mut<'w>(_stores: &'w StoreMap, _index: u32) -> Option<()> {
        Some(())
    }
}

macro_rules! impl_kind_set_tuple {
    ($($name:ident),+) => {
        impl<$($name: 'static),+> KindSet for ($($name,)+) {
            fn kinds() -> Vec<(TypeId, &'static str)> {
                vec![$((TypeId::of::<$name>(), type_name::<$name>())),+]
            }
        }
    };
}

macro_rules! impl_component_bundle_tuple {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentBundle for ($($name,)+) {
            type Ref<'w> = ($(&'w $name,)+);
            type Mut<'w> = ($(&'w mut $name,)+);

            fn kinds() -> Vec<(TypeId, &'static str)> {
                vec![$((TypeId::of::<$name>(), type_name::<$name>())),+]
            }

            fn fetch<'w>(stores: &'w StoreMap, index: u32) -> Option<Self::Ref<'w>> {
                Some(($(
                    stores
                        .get(&TypeId::of::<$name>())?
                        .as_any()
                        .downcast_ref::<ComponentStore<$name>>()?
                        .get(index)?,
                )+))
            }

            unsafe fn fetch_mut<'w>(stores: &'w StoreMap, index: u32) -> Option<Self::Mut<'w>> {
                Some(($(
                    {
                        let store = stores.get(&TypeId::of::<$name>())?;
                        // The caller guarantees exclusivity and distinct
                        // member types; see the trait-level contract.
                        let store = store.as_ref() as *const dyn KindStore as *mut dyn KindStore;
                        (*store)
                            .as_any_mut()
                            .downcast_mut::<ComponentStore<$name>>()?
                            .get_mut(index)?
                    },
                )+))
            }
        }
    };
}

impl_kind_set_tuple!(A);
impl_kind_set_tuple!(A, B);
impl_kind_set_tuple!(A, B, C);
impl_kind_set_tuple!(A, B, C, D);
impl_kind_set_tuple!(A, B, C, D, E);
impl_kind_set_tuple!(A, B, C, D, E, F);
impl_kind_set_tuple!(A, B, C, D, E, F, G);
impl_kind_set_tuple!(A, B, C, D, E, F, G, H);

impl_component_bundle_tuple!(A);
impl_component_bundle_tuple!(A, B);
impl_component_bundle_tuple!(A, B, C);
impl_component_bundle_tuple!(A, B, C, D);
impl_component_bundle_tuple!(A, B, C, D, E);
impl_component_bundle_tuple!(A, B, C, D, E, F);
impl_component_bundle_tuple!(A, B, C, D, E, F, G);
impl_component_bundle_tuple!(A, B, C, D, E, F, G, H);
