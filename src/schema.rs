use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;

use fixedbitset::FixedBitSet;

use crate::bundle::{ComponentBundle, KindSet, Signature};
use crate::error::EcsError;
use crate::store::{Component, ComponentStore, KindStore, StoreMap, TagStore};

/// Whether a registered kind carries data (component) or is a zero-sized
/// marker (tag).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum KindClass {
    Component,
    Tag,
}

impl fmt::Display for KindClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindClass::Component => f.write_str("component"),
            KindClass::Tag => f.write_str("tag"),
        }
    }
}

type StoreFactory = fn() -> Box<dyn KindStore>;

fn make_component_store<T: Component>() -> Box<dyn KindStore> {
    Box::new(ComponentStore::<T>::new())
}

fn make_tag_store<T: 'static>() -> Box<dyn KindStore> {
    Box::new(TagStore::<T>::new())
}

struct KindInfo {
    name: &'static str,
    class: KindClass,
    dense: usize,
    bit: usize,
}

struct SignatureInfo {
    name: &'static str,
    dense: usize,
    mask: FixedBitSet,
}

struct KindReg {
    tid: TypeId,
    name: &'static str,
    factory: StoreFactory,
}

struct SignatureReg {
    tid: TypeId,
    name: &'static str,
    members: Vec<(TypeId, &'static str)>,
}

/// Collects kind and signature declarations before the schema is frozen.
/// All validation happens in [`SchemaBuilder::freeze`]; a bad declaration
/// refuses to produce a `Schema` instead of failing later mid-simulation.
#[derive(Default)]
pub struct SchemaBuilder {
    components: Vec<KindReg>,
    tags: Vec<KindReg>,
    signatures: Vec<SignatureReg>,
}

impl SchemaBuilder {
    /// Declare a component kind. Dense ids and bit indices follow
    /// declaration order.
    pub fn component<T: Component>(mut self) -> Self {
        self.components.push(KindReg {
            tid: TypeId::of::<T>(),
            name: type_name::<T>(),
            factory: make_component_store::<T>,
        });
        self
    }

    /// Declare a tag kind.
    pub fn tag<T: 'static>(mut self) -> Self {
        self.tags.push(KindReg {
            tid: TypeId::of::<T>(),
            name: type_name::<T>(),
            factory: make_tag_store::<T>,
        });
        self
    }

    /// Declare a signature. Its members must be declared as components or
    /// tags in the same builder, or `freeze` fails.
    pub fn signature<S: Signature>(mut self) -> Self {
        let mut members = <S::Components as ComponentBundle>::kinds();
        members.extend(<S::Tags as KindSet>::kinds());
        self.signatures.push(SignatureReg {
            tid: TypeId::of::<S>(),
            name: type_name::<S>(),
            members,
        });
        self
    }

    /// Validate every declaration and produce the immutable schema.
    ///
    /// Fails on a kind declared twice (the component and tag spaces share
    /// one namespace) or on a signature member that was never declared.
    pub fn freeze(self) -> Result<Schema, EcsError> {
        let component_count = self.components.len();
        let tag_count = self.tags.len();
        let mut kinds = HashMap::with_capacity(component_count + tag_count);
        let mut bits = Vec::with_capacity(component_count + tag_count);
        let mut factories = Vec::with_capacity(component_count + tag_count);

        for (dense, reg) in self.components.into_iter().enumerate() {
            let info = KindInfo {
                name: reg.name,
                class: KindClass::Component,
                dense,
                bit: dense,
            };
            if kinds.insert(reg.tid, info).is_some() {
                return Err(EcsError::DuplicateKind(reg.name));
            }
            bits.push(reg.tid);
            factories.push((reg.tid, reg.factory));
        }
        for (dense, reg) in self.tags.into_iter().enumerate() {
            let info = KindInfo {
                name: reg.name,
                class: KindClass::Tag,
                dense,
                bit: component_count + dense,
            };
            if kinds.insert(reg.tid, info).is_some() {
                return Err(EcsError::DuplicateKind(reg.name));
            }
            bits.push(reg.tid);
            factories.push((reg.tid, reg.factory));
        }

        let mut signatures = HashMap::with_capacity(self.signatures.len());
        for (dense, reg) in self.signatures.into_iter().enumerate() {
            let mut mask = FixedBitSet::with_capacity(bits.len());
            for &(member, member_name) in &reg.members {
                let info = kinds
                    .get(&member)
                    .ok_or(EcsError::UnregisteredKind(member_name))?;
                mask.insert(info.bit);
            }
            let info = SignatureInfo {
                name: reg.name,
                dense,
                mask,
            };
            if signatures.insert(reg.tid, info).is_some() {
                return Err(EcsError::DuplicateSignature(reg.name));
            }
        }

        Ok(Schema {
            kinds,
            bits,
            signatures,
            component_count,
            tag_count,
            factories,
        })
    }
}

/// The frozen schema: every component kind, tag kind, and signature the
/// manager will ever see, with dense ids, bit indices, and precomputed
/// signature masks. Immutable once built, so all matching reduces to O(1)
/// table lookups and bitmask tests.
///
/// Bit layout over the shared space of width
/// `component_count + tag_count`: component bits first, in declaration
/// order, then tag bits. The layout is observable only through raw bit
/// indices; the kind-based API never depends on it.
pub struct Schema {
    kinds: HashMap<TypeId, KindInfo>,
    /// Bit index to owning kind, components then tags.
    bits: Vec<TypeId>,
    signatures: HashMap<TypeId, SignatureInfo>,
    component_count: usize,
    tag_count: usize,
    factories: Vec<(TypeId, StoreFactory)>,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn is_component<T: Component>(&self) -> bool {
        self.kinds
            .get(&TypeId::of::<T>())
            .map_or(false, |info| info.class == KindClass::Component)
    }

    pub fn is_tag<T: 'static>(&self) -> bool {
        self.kinds
            .get(&TypeId::of::<T>())
            .map_or(false, |info| info.class == KindClass::Tag)
    }

    pub fn is_signature<S: 'static>(&self) -> bool {
        self.signatures.contains_key(&TypeId::of::<S>())
    }

    pub fn component_count(&self) -> usize {
        self.component_count
    }

    pub fn tag_count(&self) -> usize {
        self.tag_count
    }

    pub fn signature_count(&self) -> usize {
        self.signatures.len()
    }

    /// Width of the shared bit space: `component_count + tag_count`.
    pub fn bit_count(&self) -> usize {
        self.bits.len()
    }

    /// Dense id of a component kind in `[0, component_count)`.
    pub fn component_id<T: Component>(&self) -> Result<usize, EcsError> {
        self.component_info(TypeId::of::<T>(), type_name::<T>())
            .map(|info| info.dense)
    }

    /// Dense id of a tag kind in `[0, tag_count)`.
    pub fn tag_id<T: 'static>(&self) -> Result<usize, EcsError> {
        self.tag_info(TypeId::of::<T>(), type_name::<T>())
            .map(|info| info.dense)
    }

    /// Dense id of a signature in `[0, signature_count)`.
    pub fn signature_id<S: Signature>(&self) -> Result<usize, EcsError> {
        self.signature_info::<S>().map(|info| info.dense)
    }

    /// Position of a kind (component or tag) in the shared bit space.
    pub fn bit_index<T: 'static>(&self) -> Result<usize, EcsError> {
        self.kind_bit(TypeId::of::<T>(), type_name::<T>())
    }

    /// Precomputed member mask of a registered signature.
    pub fn signature_mask<S: Signature>(&self) -> Result<&FixedBitSet, EcsError> {
        self.signature_info::<S>().map(|info| &info.mask)
    }

    fn component_info(&self, tid: TypeId, name: &'static str) -> Result<&KindInfo, EcsError> {
        match self.kinds.get(&tid) {
            Some(info) if info.class == KindClass::Component => Ok(info),
            _ => Err(EcsError::UnregisteredKind(name)),
        }
    }

    fn tag_info(&self, tid: TypeId, name: &'static str) -> Result<&KindInfo, EcsError> {
        match self.kinds.get(&tid) {
            Some(info) if info.class == KindClass::Tag => Ok(info),
            _ => Err(EcsError::UnregisteredKind(name)),
        }
    }

    fn signature_info<S: Signature>(&self) -> Result<&SignatureInfo, EcsError> {
        self.signatures
            .get(&TypeId::of::<S>())
            .ok_or(EcsError::UnregisteredSignature(type_name::<S>()))
    }

    pub(crate) fn component_bit(&self, tid: TypeId, name: &'static str) -> Result<usize, EcsError> {
        self.component_info(tid, name).map(|info| info.bit)
    }

    pub(crate) fn tag_bit(&self, tid: TypeId, name: &'static str) -> Result<usize, EcsError> {
        self.tag_info(tid, name).map(|info| info.bit)
    }

    pub(crate) fn kind_bit(&self, tid: TypeId, name: &'static str) -> Result<usize, EcsError> {
        self.kinds
            .get(&tid)
            .map(|info| info.bit)
            .ok_or(EcsError::UnregisteredKind(name))
    }

    pub(crate) fn bit_owner(&self, bit: usize) -> TypeId {
        self.bits[bit]
    }

    /// Kind names and classes in ascending bit order.
    pub(crate) fn kinds_in_bit_order(
        &self,
    ) -> impl Iterator<Item = (&'static str, KindClass)> + '_ {
        self.bits.iter().map(|tid| {
            let info = &self.kinds[tid];
            (info.name, info.class)
        })
    }

    /// Materialize one store per registered kind for a new manager.
    pub(crate) fn make_stores(&self) -> StoreMap {
        self.factories
            .iter()
            .map(|&(tid, factory)| (tid, factory()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Hull(#[allow(dead_code)] u32);
    struct Crew(#[allow(dead_code)] u8);
    struct Docked;
    struct Derelict;

    struct Manned;
    impl Signature for Manned {
        type Components = (Hull, Crew);
        type Tags = ();
    }

    struct Mothballed;
    impl Signature for Mothballed {
        type Components = (Hull,);
        type Tags = (Docked, Derelict);
    }

    fn schema() -> Schema {
        Schema::builder()
            .component::<Hull>()
            .component::<Crew>()
            .tag::<Docked>()
            .tag::<Derelict>()
            .signature::<Manned>()
            .signature::<Mothballed>()
            .freeze()
            .unwrap()
    }

    #[test]
    fn membership_predicates() {
        let schema = schema();
        assert!(schema.is_component::<Hull>());
        assert!(!schema.is_component::<Docked>());
        assert!(schema.is_tag::<Docked>());
        assert!(!schema.is_tag::<Hull>());
        assert!(schema.is_signature::<Manned>());
        assert!(!schema.is_signature::<Hull>());
    }

    #[test]
    fn dense_ids_and_bits_follow_declaration_order() {
        let schema = schema();
        assert_eq!(schema.component_count(), 2);
        assert_eq!(schema.tag_count(), 2);
        assert_eq!(schema.bit_count(), 4);
        assert_eq!(schema.component_id::<Hull>().unwrap(), 0);
        assert_eq!(schema.component_id::<Crew>().unwrap(), 1);
        assert_eq!(schema.tag_id::<Docked>().unwrap(), 0);
        assert_eq!(schema.bit_index::<Hull>().unwrap(), 0);
        // Tag bits sit after all component bits.
        assert_eq!(schema.bit_index::<Docked>().unwrap(), 2);
        assert_eq!(schema.bit_index::<Derelict>().unwrap(), 3);
    }

    #[test]
    fn signature_masks_or_member_bits() {
        let schema = schema();
        let manned = schema.signature_mask::<Manned>().unwrap();
        assert!(manned.contains(0) && manned.contains(1));
        assert!(!manned.contains(2));
        let mothballed = schema.signature_mask::<Mothballed>().unwrap();
        assert!(mothballed.contains(0) && mothballed.contains(2) && mothballed.contains(3));
        assert!(!mothballed.contains(1));
        assert_eq!(schema.signature_id::<Mothballed>().unwrap(), 1);
    }

    #[test]
    fn duplicate_kind_fails_freeze() {
        let result = Schema::builder()
            .component::<Hull>()
            .component::<Hull>()
            .freeze();
        assert!(matches!(result, Err(EcsError::DuplicateKind(_))));

        // One type cannot be both a component and a tag.
        let result = Schema::builder().component::<Hull>().tag::<Hull>().freeze();
        assert!(matches!(result, Err(EcsError::DuplicateKind(_))));
    }

    #[test]
    fn signature_with_unregistered_member_fails_freeze() {
        let result = Schema::builder()
            .component::<Hull>()
            .signature::<Manned>()
            .freeze();
        assert!(matches!(result, Err(EcsError::UnregisteredKind(_))));
    }

    #[test]
    fn unregistered_lookups_report_the_kind() {
        let schema = schema();
        struct Unknown;
        assert!(matches!(
            schema.bit_index::<Unknown>(),
            Err(EcsError::UnregisteredKind(_))
        ));
        struct Ghost;
        impl Signature for Ghost {
            type Components = (Hull,);
            type Tags = ();
        }
        assert!(matches!(
            schema.signature_mask::<Ghost>(),
            Err(EcsError::UnregisteredSignature(_))
        ));
    }
}
