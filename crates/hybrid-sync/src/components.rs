//! Entity-side transform data and the tags that choose sync direction.
//!
//! Value components hold the entity's copy of a transform property. Tag
//! components carry no data; their presence on an entity opts it into one of
//! the sync systems. An entity is only synced when it also has a bound
//! [`EntityTransform`](crate::container::EntityTransform).

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};

use hybrid_ecs::entity::Entity;
use hybrid_ecs::world::{ComponentLookup, World};
use hybrid_ecs::EcsError;

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// World-space position.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position(pub Vec3);

/// World-space rotation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rotation(pub Quat);

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalPosition(pub Vec3);

#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalRotation(pub Quat);

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LocalScale(pub Vec3);

impl Default for LocalScale {
    fn default() -> Self {
        Self(Vec3::ONE)
    }
}

/// Desired world-space up axis. The transform is turned to face +Z with this
/// up vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UpDirection(pub Vec3);

impl Default for UpDirection {
    fn default() -> Self {
        Self(Vec3::Y)
    }
}

/// Added to the transform position when it is copied into [`Position`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SyncPositionOffset(pub Vec3);

/// Points a secondary entity at the entity that owns its transform.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityReference(pub Entity);

/// Follow `references` from `entity` to its main entity. Entities without a
/// reference are their own main entity.
pub fn main_entity(references: &ComponentLookup<'_, EntityReference>, entity: Entity) -> Entity {
    references.get(entity).map_or(entity, |r| r.0)
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

macro_rules! tags {
    ($($(#[$meta:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
            pub struct $name;
        )*
    };
}

tags!(
    /// Copy the transform's position into [`Position`] before simulation.
    SyncPositionToEntity,
    /// Copy the transform's rotation into [`Rotation`] before simulation.
    SyncRotationToEntity,
    /// Write [`Position`] to the transform after simulation.
    SyncPositionToTransform,
    /// Write [`Rotation`] to the transform after simulation.
    SyncRotationToTransform,
    SyncLocalPositionToTransform,
    SyncLocalRotationToTransform,
    SyncLocalScaleToTransform,
    /// Turn the transform to match [`UpDirection`] after simulation.
    SyncUpToTransform,
    /// Skip entity-to-transform sync for the current frame. Removed again
    /// at the start of the next frame.
    DontSyncOneFrame,
);

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

/// Register every component of this module under its canonical name.
pub fn register_components(world: &mut World) -> Result<(), EcsError> {
    world.register_component::<Position>("position")?;
    world.register_component::<Rotation>("rotation")?;
    world.register_component::<LocalPosition>("local_position")?;
    world.register_component::<LocalRotation>("local_rotation")?;
    world.register_component::<LocalScale>("local_scale")?;
    world.register_component::<UpDirection>("up_direction")?;
    world.register_component::<SyncPositionOffset>("sync_position_offset")?;
    world.register_component::<EntityReference>("entity_reference")?;

    world.register_component::<SyncPositionToEntity>("sync_position_to_entity")?;
    world.register_component::<SyncRotationToEntity>("sync_rotation_to_entity")?;
    world.register_component::<SyncPositionToTransform>("sync_position_to_transform")?;
    world.register_component::<SyncRotationToTransform>("sync_rotation_to_transform")?;
    world.register_component::<SyncLocalPositionToTransform>("sync_local_position_to_transform")?;
    world.register_component::<SyncLocalRotationToTransform>("sync_local_rotation_to_transform")?;
    world.register_component::<SyncLocalScaleToTransform>("sync_local_scale_to_transform")?;
    world.register_component::<SyncUpToTransform>("sync_up_to_transform")?;
    world.register_component::<DontSyncOneFrame>("dont_sync_one_frame")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registration_is_repeatable() {
        let mut world = World::new();
        register_components(&mut world).unwrap();
        let count = world.registry().len();
        register_components(&mut world).unwrap();
        assert_eq!(world.registry().len(), count);
        assert_eq!(count, 17);
    }

    #[test]
    fn spawned_defaults_are_neutral() {
        let mut world = World::new();
        register_components(&mut world).unwrap();
        let e = world.spawn_empty();
        world.add_component(e, LocalScale::default()).unwrap();
        world.add_component(e, Rotation::default()).unwrap();
        assert_eq!(world.get::<LocalScale>(e), Some(&LocalScale(Vec3::ONE)));
        assert_eq!(world.get::<Rotation>(e), Some(&Rotation(Quat::IDENTITY)));
    }

    #[test]
    fn main_entity_follows_reference() {
        let mut world = World::new();
        register_components(&mut world).unwrap();
        let main = world.spawn_empty();
        let child = world.spawn_empty();
        world.add_component(child, EntityReference(main)).unwrap();

        let refs = world.lookup::<EntityReference>();
        assert_eq!(main_entity(&refs, child), main);
        assert_eq!(main_entity(&refs, main), main);
    }

    #[test]
    fn tags_serialize_as_null() {
        let json = serde_json::to_value(DontSyncOneFrame).unwrap();
        assert!(json.is_null());
        let back: DontSyncOneFrame = serde_json::from_value(json).unwrap();
        assert_eq!(back, DontSyncOneFrame);
    }
}
