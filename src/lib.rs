//! sigil-ecs - schema-driven entity-component-tag runtime
//!
//! Entities are generational handles into a slot table; components (data)
//! and tags (zero-sized markers) attach to them per a schema that is
//! declared once and frozen. Every kind owns a bit in one shared bit space,
//! so "all entities with X and Y" reduces to a bitmask test against
//! precomputed signature masks - no per-query type inspection. Destruction
//! is deferred: `destroy_entity` declares intent, and an explicit `refresh`
//! compaction pass fires remove hooks, drops stored values, and recycles
//! slots.
//!
//! ```
//! use sigil_ecs::{EcsError, EntityManager, Schema, Signature};
//!
//! struct Position { x: f32, y: f32 }
//! struct Velocity { dx: f32, dy: f32 }
//! struct Anchored;
//!
//! struct Moving;
//! impl Signature for Moving {
//!     type Components = (Position, Velocity);
//!     type Tags = ();
//! }
//!
//! # fn main() -> Result<(), EcsError> {
//! let schema = Schema::builder()
//!     .component::<Position>()
//!     .component::<Velocity>()
//!     .tag::<Anchored>()
//!     .signature::<Moving>()
//!     .freeze()?;
//!
//! let mut manager = EntityManager::new(schema);
//! let e = manager.create_entity();
//! manager.add_component(e, Position { x: 0.0, y: 0.0 })?;
//! manager.add_component(e, Velocity { dx: 1.0, dy: 2.0 })?;
//!
//! let mut travelled = 0.0;
//! manager.traverse_entity_match_signature::<Moving, _>(|(pos, vel)| {
//!     travelled += pos.x + vel.dx;
//! })?;
//! assert_eq!(travelled, 1.0);
//!
//! manager.destroy_entity(e)?;
//! manager.refresh();
//! assert!(!manager.is_valid(e));
//! # Ok(())
//! # }
//! ```

mod bundle;
mod entity;
mod error;
mod manager;
mod schema;
mod store;
mod view;

pub use bundle::{ComponentBundle, KindSet, Signature};
pub use entity::Entity;
pub use error::EcsError;
pub use manager::{EntityManager, EntityMut, EntityRef, KindStatus, Status};
pub use schema::{KindClass, Schema, SchemaBuilder};
pub use store::{Component, ComponentHooks, TagHooks};
pub use view::View;
