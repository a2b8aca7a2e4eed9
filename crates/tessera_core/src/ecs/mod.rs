//! Entity Component System core types.
//!
//! Entities are generational handles; each component type lives in its own
//! [`ComponentContainer`] backed by a chunked [`Pool`](crate::pool::Pool) and
//! an [`IndexPolicy`]. Mutations are queued by any number of producers and
//! applied once per tick by [`World::process_queued_actions`].

mod component;
mod container;
mod entity;
mod facet;
mod index;
mod serialize;
mod settings;
mod world;

pub use component::{component_type_id, Component, ComponentTypeId};
pub use container::{ComponentContainer, DrainReport, ErasedContainer};
pub use entity::{Entity, EntityId, EntityTable};
pub use facet::{ComponentSet, EntityFacet};
pub use index::{CompactIndex, IndexPolicy, SparseIndex};
pub use serialize::{
    load_entity, load_world, save_entity, save_world, ComponentFilter, LoadContext, SaveContext,
    SerializeError, IMPORT_KEY,
};
pub use settings::EcsSettings;
pub use world::World;
