//! Compact record of which sync tags an entity carries.
//!
//! [`SyncState`] packs the four position/rotation sync tags into one byte so
//! authoring code can store an entity's sync configuration and restore it
//! later through a command buffer.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use hybrid_ecs::command::CommandBuffer;
use hybrid_ecs::component::{Component, ComponentRegistry};
use hybrid_ecs::entity::Entity;
use hybrid_ecs::world::World;
use hybrid_ecs::EcsError;

use crate::components::{
    SyncPositionToEntity, SyncPositionToTransform, SyncRotationToEntity, SyncRotationToTransform,
};

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct SyncState: u8 {
        const POSITION_TO_ENTITY = 1;
        const ROTATION_TO_ENTITY = 1 << 1;
        const POSITION_TO_TRANSFORM = 1 << 2;
        const ROTATION_TO_TRANSFORM = 1 << 3;
    }
}

impl SyncState {
    /// Read the tags `entity` currently has. A dead entity packs to empty.
    pub fn pack(world: &World, entity: Entity) -> SyncState {
        let mut state = SyncState::empty();
        if !world.is_alive(entity) {
            return state;
        }
        state.set(SyncState::POSITION_TO_ENTITY, world.has::<SyncPositionToEntity>(entity));
        state.set(SyncState::ROTATION_TO_ENTITY, world.has::<SyncRotationToEntity>(entity));
        state.set(SyncState::POSITION_TO_TRANSFORM, world.has::<SyncPositionToTransform>(entity));
        state.set(SyncState::ROTATION_TO_TRANSFORM, world.has::<SyncRotationToTransform>(entity));
        state
    }

    /// Queue commands that make `entity`'s tags match this state: every set
    /// flag adds its tag, every clear flag removes it.
    pub fn unpack_to(
        self,
        buffer: &mut CommandBuffer,
        registry: &ComponentRegistry,
        entity: Entity,
    ) -> Result<(), EcsError> {
        toggle::<SyncPositionToEntity>(
            buffer,
            registry,
            entity,
            self.contains(SyncState::POSITION_TO_ENTITY),
        )?;
        toggle::<SyncPositionToTransform>(
            buffer,
            registry,
            entity,
            self.contains(SyncState::POSITION_TO_TRANSFORM),
        )?;
        toggle::<SyncRotationToEntity>(
            buffer,
            registry,
            entity,
            self.contains(SyncState::ROTATION_TO_ENTITY),
        )?;
        toggle::<SyncRotationToTransform>(
            buffer,
            registry,
            entity,
            self.contains(SyncState::ROTATION_TO_TRANSFORM),
        )?;
        Ok(())
    }
}

fn toggle<T: Component>(
    buffer: &mut CommandBuffer,
    registry: &ComponentRegistry,
    entity: Entity,
    present: bool,
) -> Result<(), EcsError> {
    if present {
        buffer.add_default::<T>(registry, entity)
    } else {
        buffer.remove::<T>(registry, entity)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::register_components;

    fn setup() -> World {
        let mut world = World::new();
        register_components(&mut world).unwrap();
        world
    }

    #[test]
    fn pack_reads_tags() {
        let mut world = setup();
        let e = world.spawn_empty();
        world.add_component(e, SyncPositionToEntity).unwrap();
        world.add_component(e, SyncRotationToTransform).unwrap();

        let state = SyncState::pack(&world, e);
        assert_eq!(state, SyncState::POSITION_TO_ENTITY | SyncState::ROTATION_TO_TRANSFORM);
    }

    #[test]
    fn pack_of_dead_entity_is_empty() {
        let mut world = setup();
        let e = world.spawn_empty();
        world.add_component(e, SyncPositionToEntity).unwrap();
        world.despawn(e).unwrap();
        assert!(SyncState::pack(&world, e).is_empty());
    }

    #[test]
    fn unpack_restores_packed_state() {
        let mut world = setup();
        let source = world.spawn_empty();
        world.add_component(source, SyncPositionToTransform).unwrap();
        world.add_component(source, SyncRotationToEntity).unwrap();
        let packed = SyncState::pack(&world, source);

        let target = world.spawn_empty();
        world.add_component(target, SyncPositionToEntity).unwrap();

        let mut buffer = CommandBuffer::new();
        packed.unpack_to(&mut buffer, world.registry(), target).unwrap();
        buffer.apply(&mut world);

        assert_eq!(SyncState::pack(&world, target), packed);
        assert!(!world.has::<SyncPositionToEntity>(target));
    }

    #[test]
    fn serializes_as_flag_names() {
        let state = SyncState::POSITION_TO_ENTITY | SyncState::ROTATION_TO_ENTITY;
        let json = serde_json::to_string(&state).unwrap();
        let back: SyncState = serde_json::from_str(&json).unwrap();
        assert_eq!(back, state);
    }
}
