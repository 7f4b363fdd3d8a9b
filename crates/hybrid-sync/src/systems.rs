//! Systems that copy transform data between the container and the world.
//!
//! All of them sweep the [`TransformContainer`] in parallel. Each worker
//! handles a disjoint range of slots, reads the slot's entity handle and
//! decides through read-only tag lookups whether the slot takes part:
//!
//! - to-entity systems only read in the workers; the collected values are
//!   written into the world on the calling thread afterwards.
//! - to-transform systems read the world and write only the worker's own
//!   slot payload.
//!
//! Slots whose entity has been despawned fail every lookup and are skipped.

use glam::{Quat, Vec3};

use hybrid_ecs::command::CommandBuffer;
use hybrid_ecs::entity::Entity;
use hybrid_ecs::world::World;
use hybrid_ecs::EcsError;

use crate::components::{
    DontSyncOneFrame, LocalPosition, LocalRotation, LocalScale, Position, Rotation,
    SyncLocalPositionToTransform, SyncLocalRotationToTransform, SyncLocalScaleToTransform,
    SyncPositionOffset, SyncPositionToEntity, SyncPositionToTransform, SyncRotationToEntity,
    SyncRotationToTransform, SyncUpToTransform, UpDirection,
};
use crate::container::TransformContainer;
use crate::transform::look_rotation;

// ---------------------------------------------------------------------------
// SyncReport
// ---------------------------------------------------------------------------

/// How many entities each sync system touched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub position_to_entity: usize,
    pub rotation_to_entity: usize,
    pub local_position_to_transform: usize,
    pub local_rotation_to_transform: usize,
    pub rotation_to_transform: usize,
    pub local_scale_to_transform: usize,
    pub up_to_transform: usize,
    pub position_to_transform: usize,
}

// ---------------------------------------------------------------------------
// Transform -> entity
// ---------------------------------------------------------------------------

/// Copy each tagged transform's world position, plus its optional
/// [`SyncPositionOffset`], into [`Position`].
pub fn sync_position_to_entity(world: &mut World, container: &TransformContainer) -> usize {
    let updates: Vec<(Entity, Vec3)> = {
        let tags = world.lookup::<SyncPositionToEntity>();
        let positions = world.lookup::<Position>();
        let offsets = world.lookup::<SyncPositionOffset>();
        container.par_collect(|_, &entity, transform| {
            if !tags.has(entity) || !positions.has(entity) {
                return None;
            }
            let offset = offsets.get(entity).map_or(Vec3::ZERO, |o| o.0);
            Some((entity, transform.position() + offset))
        })
    };
    write_back(world, updates, |p: &mut Position, v| p.0 = v)
}

/// Copy each tagged transform's world rotation into [`Rotation`].
pub fn sync_rotation_to_entity(world: &mut World, container: &TransformContainer) -> usize {
    let updates: Vec<(Entity, Quat)> = {
        let tags = world.lookup::<SyncRotationToEntity>();
        let rotations = world.lookup::<Rotation>();
        container.par_collect(|_, &entity, transform| {
            (tags.has(entity) && rotations.has(entity)).then(|| (entity, transform.rotation()))
        })
    };
    write_back(world, updates, |r: &mut Rotation, q| r.0 = q)
}

fn write_back<T, V>(
    world: &mut World,
    updates: Vec<(Entity, V)>,
    apply: impl Fn(&mut T, V),
) -> usize
where
    T: hybrid_ecs::component::Component,
{
    let mut written = 0;
    for (entity, value) in updates {
        if let Some(slot) = world.get_mut::<T>(entity) {
            apply(slot, value);
            written += 1;
        }
    }
    written
}

// ---------------------------------------------------------------------------
// Entity -> transform
// ---------------------------------------------------------------------------

/// Write [`Position`] to tagged transforms, skipping [`DontSyncOneFrame`].
pub fn sync_position_to_transform(world: &World, container: &mut TransformContainer) -> usize {
    let skip = world.lookup::<DontSyncOneFrame>();
    let tags = world.lookup::<SyncPositionToTransform>();
    let values = world.lookup::<Position>();
    container.par_for_each_mut(|_, &entity, transform| {
        if skip.has(entity) || !tags.has(entity) {
            return false;
        }
        let Some(value) = values.get(entity) else {
            return false;
        };
        transform.set_position(value.0);
        true
    })
}

/// Write [`Rotation`] to tagged transforms, skipping [`DontSyncOneFrame`].
pub fn sync_rotation_to_transform(world: &World, container: &mut TransformContainer) -> usize {
    let skip = world.lookup::<DontSyncOneFrame>();
    let tags = world.lookup::<SyncRotationToTransform>();
    let values = world.lookup::<Rotation>();
    container.par_for_each_mut(|_, &entity, transform| {
        if skip.has(entity) || !tags.has(entity) {
            return false;
        }
        let Some(value) = values.get(entity) else {
            return false;
        };
        transform.set_rotation(value.0);
        true
    })
}

/// Write [`LocalRotation`] to tagged transforms, skipping
/// [`DontSyncOneFrame`].
pub fn sync_local_rotation_to_transform(
    world: &World,
    container: &mut TransformContainer,
) -> usize {
    let skip = world.lookup::<DontSyncOneFrame>();
    let tags = world.lookup::<SyncLocalRotationToTransform>();
    let values = world.lookup::<LocalRotation>();
    container.par_for_each_mut(|_, &entity, transform| {
        if skip.has(entity) || !tags.has(entity) {
            return false;
        }
        let Some(value) = values.get(entity) else {
            return false;
        };
        transform.set_local_rotation(value.0);
        true
    })
}

/// Write [`LocalScale`] to tagged transforms, skipping [`DontSyncOneFrame`].
pub fn sync_local_scale_to_transform(world: &World, container: &mut TransformContainer) -> usize {
    let skip = world.lookup::<DontSyncOneFrame>();
    let tags = world.lookup::<SyncLocalScaleToTransform>();
    let values = world.lookup::<LocalScale>();
    container.par_for_each_mut(|_, &entity, transform| {
        if skip.has(entity) || !tags.has(entity) {
            return false;
        }
        let Some(value) = values.get(entity) else {
            return false;
        };
        transform.set_local_scale(value.0);
        true
    })
}

/// Write [`LocalPosition`] to tagged transforms. Ignores
/// [`DontSyncOneFrame`].
pub fn sync_local_position_to_transform(
    world: &World,
    container: &mut TransformContainer,
) -> usize {
    let tags = world.lookup::<SyncLocalPositionToTransform>();
    let values = world.lookup::<LocalPosition>();
    container.par_for_each_mut(|_, &entity, transform| {
        let Some(value) = values.get(entity).filter(|_| tags.has(entity)) else {
            return false;
        };
        transform.set_local_position(value.0);
        true
    })
}

/// Turn tagged transforms to face +Z with [`UpDirection`] as up. Ignores
/// [`DontSyncOneFrame`].
pub fn sync_up_to_transform(world: &World, container: &mut TransformContainer) -> usize {
    let tags = world.lookup::<SyncUpToTransform>();
    let values = world.lookup::<UpDirection>();
    container.par_for_each_mut(|_, &entity, transform| {
        let Some(value) = values.get(entity).filter(|_| tags.has(entity)) else {
            return false;
        };
        transform.set_rotation(look_rotation(Vec3::Z, value.0));
        true
    })
}

/// Run every entity-to-transform system. World position goes last so it
/// wins over local position when both are tagged.
pub fn sync_to_transform(
    world: &World,
    container: &mut TransformContainer,
    report: &mut SyncReport,
) {
    report.local_position_to_transform = sync_local_position_to_transform(world, container);
    report.local_rotation_to_transform = sync_local_rotation_to_transform(world, container);
    report.rotation_to_transform = sync_rotation_to_transform(world, container);
    report.local_scale_to_transform = sync_local_scale_to_transform(world, container);
    report.up_to_transform = sync_up_to_transform(world, container);
    report.position_to_transform = sync_position_to_transform(world, container);
}

/// Run every transform-to-entity system.
pub fn sync_to_entity(world: &mut World, container: &TransformContainer, report: &mut SyncReport) {
    report.position_to_entity = sync_position_to_entity(world, container);
    report.rotation_to_entity = sync_rotation_to_entity(world, container);
}

// ---------------------------------------------------------------------------
// Reset
// ---------------------------------------------------------------------------

/// Queue removal of [`DontSyncOneFrame`] from every entity that has it.
/// Returns how many removals were queued.
pub fn reset_sync_state(world: &World, next_frame: &mut CommandBuffer) -> Result<usize, EcsError> {
    let tagged = world.entities_with::<DontSyncOneFrame>();
    for &entity in &tagged {
        next_frame.remove::<DontSyncOneFrame>(world.registry(), entity)?;
    }
    Ok(tagged.len())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
