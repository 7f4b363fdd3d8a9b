//! Hybrid ECS -- archetype cache and slot-recycling handle table for bridging
//! object-oriented authoring with a data-oriented entity store.
//!
//! Authoring code describes an entity as a list of stable component type
//! hashes. The [`ArchetypeCache`](archetype_cache::ArchetypeCache) turns that
//! list into a structural layout exactly once, however many entities share
//! it. A [`HandleTable`](handle_table::HandleTable) pairs entity handles with
//! per-entity payloads in dense arrays that rayon workers can sweep in
//! parallel, while freed slots are reused without moving anything else.
//!
//! # Quick Start
//!
//! ```
//! use hybrid_ecs::prelude::*;
//!
//! #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Debug, Default, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
//! struct Velocity { dx: f32, dy: f32 }
//!
//! let mut world = World::new();
//! world.register_component::<Position>("position").unwrap();
//! world.register_component::<Velocity>("velocity").unwrap();
//!
//! let hashes = [
//!     world.registry().stable_hash_of::<Position>().unwrap(),
//!     world.registry().stable_hash_of::<Velocity>().unwrap(),
//! ];
//! let key = ArchetypeKey::from_types(&hashes);
//!
//! let mut cache = ArchetypeCache::new();
//! let layout = cache.get_or_create_key(&key, &mut world).unwrap();
//! let entity = world.spawn(layout).unwrap();
//!
//! assert_eq!(world.get::<Velocity>(entity), Some(&Velocity::default()));
//! ```

#![deny(unsafe_code)]

pub mod archetype;
pub mod archetype_cache;
pub mod command;
pub mod component;
pub mod entity;
pub mod handle_table;
pub mod hash;
pub mod world;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// The entity does not exist (stale generation or never allocated).
    #[error("entity {entity:?} does not exist (stale or never allocated)")]
    StaleEntity { entity: entity::Entity },

    /// A component type was referenced that has not been registered.
    #[error("component type '{name}' not registered. Registered components: [{registered}]")]
    UnknownComponent { name: String, registered: String },

    /// Authoring data names a stable hash no registered type has. Usually
    /// means the data predates a layout change of the component.
    #[error("no registered component has stable type hash {hash}")]
    UnknownTypeHash { hash: hash::StableTypeHash },

    #[error("component name '{name}' is already registered for another type")]
    DuplicateComponentName { name: String },

    #[error("stable type hash {hash} of '{name}' collides with '{existing}'")]
    StableHashCollision {
        hash: hash::StableTypeHash,
        name: String,
        existing: String,
    },

    #[error("archetype {archetype:?} does not exist in this world")]
    UnknownArchetype { archetype: archetype::ArchetypeId },

    /// A layout was requested with a type id this world never issued.
    #[error("component type {id:?} is not registered in this world")]
    UnknownComponentType { id: component::ComponentTypeId },

    /// A `set` targeted a component the entity does not have.
    #[error("entity {entity:?} has no '{component}' component")]
    MissingComponent {
        entity: entity::Entity,
        component: String,
    },

    #[error("failed to deserialize component '{component}': {details}")]
    ComponentDeserialization { component: String, details: String },

    #[error("failed to serialize component '{component}': {details}")]
    ComponentSerialization { component: String, details: String },

    /// The slot id was never issued by this table or its slot has since been
    /// reused.
    #[error("slot {slot} is stale")]
    StaleSlot { slot: handle_table::SlotId },

    #[error("slot {slot} was already released")]
    SlotAlreadyFree { slot: handle_table::SlotId },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::archetype::{Archetype, ArchetypeId};
    pub use crate::archetype_cache::{ArchetypeCache, CacheConfig, CacheStats, LayoutStorage};
    pub use crate::command::{ApplyReport, Command, CommandBuffer, CommandKind};
    pub use crate::component::{Component, ComponentInfo, ComponentRegistry, ComponentTypeId};
    pub use crate::entity::Entity;
    pub use crate::handle_table::{HandleTable, SlotId, TableConfig};
    pub use crate::hash::{combine_ordered, combine_unordered, ArchetypeKey, StableTypeHash};
    pub use crate::world::{ComponentLookup, World};
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
