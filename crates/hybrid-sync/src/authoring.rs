//! Bridge from object-style authoring to entities.
//!
//! An [`EntityBehaviour`] represents one authored object. It is built from a
//! list of [`EntitySupplier`]s, each of which declares the component types it
//! needs and later fills them in. The declared types are folded into an
//! [`ArchetypeKey`] once, up front, so that initializing any number of
//! objects with the same suppliers goes through a single cached layout.

use hybrid_ecs::component::{Component, ComponentRegistry};
use hybrid_ecs::entity::Entity;
use hybrid_ecs::handle_table::SlotId;
use hybrid_ecs::hash::{ArchetypeKey, StableTypeHash};
use hybrid_ecs::world::World;
use hybrid_ecs::EcsError;

use crate::components::{DontSyncOneFrame, Position, Rotation};
use crate::container::{EntityTransform, TransformContainer};
use crate::sync_state::SyncState;
use crate::transform::Transform;
use crate::world::{HybridWorld, SetupContext};
use crate::SyncError;

/// Append `T`'s stable hash to `types`.
pub fn gather<T: Component>(
    registry: &ComponentRegistry,
    types: &mut Vec<StableTypeHash>,
) -> Result<(), EcsError> {
    types.push(registry.info_of::<T>()?.stable_hash);
    Ok(())
}

// ---------------------------------------------------------------------------
// EntitySupplier
// ---------------------------------------------------------------------------

/// One piece of an authored object that contributes to its entity.
pub trait EntitySupplier {
    /// Append the stable hashes of every component this supplier needs on
    /// the entity. Order and duplicates do not matter.
    fn gather_types(
        &self,
        registry: &ComponentRegistry,
        types: &mut Vec<StableTypeHash>,
    ) -> Result<(), EcsError>;

    /// Called once the entity exists. Mutations should be recorded into
    /// `ctx.buffer`.
    fn setup_entity(&mut self, entity: Entity, ctx: &mut SetupContext<'_>) -> Result<(), SyncError>;

    /// Called when the owning object is torn down, before the entity's
    /// despawn is queued.
    fn cleanup(&mut self, _entity: Entity, _ctx: &mut SetupContext<'_>) -> Result<(), SyncError> {
        Ok(())
    }

    /// Container slot of the transform this supplier bound, if any.
    fn transform_slot(&self) -> Option<SlotId> {
        None
    }
}

// ---------------------------------------------------------------------------
// Suppliers
// ---------------------------------------------------------------------------

/// Binds a [`Transform`] into the container for the entity's lifetime.
#[derive(Debug, Clone, Default)]
pub struct TransformSupplier {
    binding: EntityTransform,
}

impl TransformSupplier {
    pub fn new(initial: Transform) -> Self {
        Self {
            binding: EntityTransform::new(initial),
        }
    }

    pub fn binding(&self) -> &EntityTransform {
        &self.binding
    }
}

impl EntitySupplier for TransformSupplier {
    fn gather_types(
        &self,
        _: &ComponentRegistry,
        _: &mut Vec<StableTypeHash>,
    ) -> Result<(), EcsError> {
        Ok(())
    }

    fn setup_entity(
        &mut self,
        entity: Entity,
        ctx: &mut SetupContext<'_>,
    ) -> Result<(), SyncError> {
        self.binding.setup(ctx.container, entity).map(|_| ())
    }

    fn cleanup(&mut self, _entity: Entity, ctx: &mut SetupContext<'_>) -> Result<(), SyncError> {
        self.binding.cleanup(ctx.container)
    }

    fn transform_slot(&self) -> Option<SlotId> {
        self.binding.slot()
    }
}

/// Declares the sync tags in a [`SyncState`] together with the values they
/// sync, and applies the state on setup.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncStateSupplier {
    state: SyncState,
}

impl SyncStateSupplier {
    pub fn new(state: SyncState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> SyncState {
        self.state
    }
}

impl EntitySupplier for SyncStateSupplier {
    fn gather_types(
        &self,
        registry: &ComponentRegistry,
        types: &mut Vec<StableTypeHash>,
    ) -> Result<(), EcsError> {
        use crate::components::{
            SyncPositionToEntity, SyncPositionToTransform, SyncRotationToEntity,
            SyncRotationToTransform,
        };

        let s = self.state;
        if s.contains(SyncState::POSITION_TO_ENTITY) {
            gather::<SyncPositionToEntity>(registry, types)?;
        }
        if s.contains(SyncState::POSITION_TO_TRANSFORM) {
            gather::<SyncPositionToTransform>(registry, types)?;
        }
        if s.contains(SyncState::ROTATION_TO_ENTITY) {
            gather::<SyncRotationToEntity>(registry, types)?;
        }
        if s.contains(SyncState::ROTATION_TO_TRANSFORM) {
            gather::<SyncRotationToTransform>(registry, types)?;
        }
        if s.intersects(SyncState::POSITION_TO_ENTITY | SyncState::POSITION_TO_TRANSFORM) {
            gather::<Position>(registry, types)?;
        }
        if s.intersects(SyncState::ROTATION_TO_ENTITY | SyncState::ROTATION_TO_TRANSFORM) {
            gather::<Rotation>(registry, types)?;
        }
        Ok(())
    }

    fn setup_entity(
        &mut self,
        entity: Entity,
        ctx: &mut SetupContext<'_>,
    ) -> Result<(), SyncError> {
        Ok(self.state.unpack_to(ctx.buffer, ctx.world.registry(), entity)?)
    }
}

/// Declares `T` and sets it to a fixed value on setup.
#[derive(Debug, Clone, Default)]
pub struct ComponentSupplier<T> {
    value: T,
}

impl<T: Component> ComponentSupplier<T> {
    pub fn new(value: T) -> Self {
        Self { value }
    }
}

impl<T: Component> EntitySupplier for ComponentSupplier<T> {
    fn gather_types(
        &self,
        registry: &ComponentRegistry,
        types: &mut Vec<StableTypeHash>,
    ) -> Result<(), EcsError> {
        gather::<T>(registry, types)
    }

    fn setup_entity(
        &mut self,
        entity: Entity,
        ctx: &mut SetupContext<'_>,
    ) -> Result<(), SyncError> {
        Ok(ctx.buffer.add(ctx.world.registry(), entity, &self.value)?)
    }
}

// ---------------------------------------------------------------------------
// EntityBehaviour
// ---------------------------------------------------------------------------

/// One authored object and the entity it owns while initialized.
pub struct EntityBehaviour {
    key: ArchetypeKey,
    suppliers: Vec<Box<dyn EntitySupplier>>,
    entity: Option<Entity>,
}

impl std::fmt::Debug for EntityBehaviour {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityBehaviour")
            .field("key", &self.key)
            .field("supplier_count", &self.suppliers.len())
            .field("entity", &self.entity)
            .finish()
    }
}

impl EntityBehaviour {
    /// Gather every supplier's types and bake them into a key.
    pub fn new(
        registry: &ComponentRegistry,
        suppliers: Vec<Box<dyn EntitySupplier>>,
    ) -> Result<Self, EcsError> {
        let mut types = Vec::new();
        for supplier in &suppliers {
            supplier.gather_types(registry, &mut types)?;
        }
        Ok(Self::from_key(ArchetypeKey::from_types(&types), suppliers))
    }

    /// Use a previously baked key, for example one loaded from disk.
    pub fn from_key(key: ArchetypeKey, suppliers: Vec<Box<dyn EntitySupplier>>) -> Self {
        Self {
            key,
            suppliers,
            entity: None,
        }
    }

    pub fn key(&self) -> &ArchetypeKey {
        &self.key
    }

    pub fn entity(&self) -> Option<Entity> {
        self.entity
    }

    pub fn is_initialized(&self) -> bool {
        self.entity.is_some()
    }

    /// Spawn the entity through the archetype cache and run every supplier's
    /// setup. Calling it again while initialized returns the same entity.
    ///
    /// If a supplier fails the entity stays allocated, so a later
    /// [`cleanup`](Self::cleanup) still tears it down.
    pub fn initialize(&mut self, hybrid: &mut HybridWorld) -> Result<Entity, SyncError> {
        if let Some(entity) = self.entity {
            return Ok(entity);
        }
        let entity = hybrid.spawn_from_key(&self.key)?;
        self.entity = Some(entity);

        let mut ctx = hybrid.setup_context();
        for supplier in &mut self.suppliers {
            supplier.setup_entity(entity, &mut ctx)?;
        }
        tracing::debug!(
            entity = %entity,
            unique_hash = self.key.unique_hash,
            suppliers = self.suppliers.len(),
            "entity initialized"
        );
        Ok(entity)
    }

    /// Run every supplier's cleanup and queue the despawn into the
    /// begin-frame buffer. A no-op when not initialized.
    ///
    /// All suppliers are cleaned up even if one fails; the first error is
    /// returned.
    pub fn cleanup(&mut self, hybrid: &mut HybridWorld) -> Result<(), SyncError> {
        let Some(entity) = self.entity.take() else {
            return Ok(());
        };
        let mut ctx = hybrid.setup_context();
        let mut first_error = None;
        for supplier in &mut self.suppliers {
            if let Err(e) = supplier.cleanup(entity, &mut ctx) {
                tracing::warn!(entity = %entity, error = %e, "supplier cleanup failed");
                first_error.get_or_insert(e);
            }
        }
        if ctx.world.is_alive(entity) {
            ctx.buffer.despawn(entity);
        }
        first_error.map_or(Ok(()), Err)
    }

    fn require_entity(&self) -> Result<Entity, SyncError> {
        self.entity.ok_or(SyncError::NotInitialized)
    }

    // -- component access ---------------------------------------------------

    /// Current value of `T`. `None` when not initialized or absent.
    pub fn get<'w, T: Component>(&self, world: &'w World) -> Option<&'w T> {
        world.get::<T>(self.entity?)
    }

    pub fn has<T: Component>(&self, world: &World) -> bool {
        self.entity.is_some_and(|e| world.has::<T>(e))
    }

    /// Queue attaching `value` into the begin-frame buffer.
    pub fn add<T: Component>(&self, hybrid: &mut HybridWorld, value: &T) -> Result<(), SyncError> {
        let entity = self.require_entity()?;
        let ctx = hybrid.setup_context();
        Ok(ctx.buffer.add(ctx.world.registry(), entity, value)?)
    }

    /// Queue overwriting `T` into the begin-frame buffer.
    pub fn set<T: Component>(&self, hybrid: &mut HybridWorld, value: &T) -> Result<(), SyncError> {
        let entity = self.require_entity()?;
        let ctx = hybrid.setup_context();
        Ok(ctx.buffer.set(ctx.world.registry(), entity, value)?)
    }

    /// Queue detaching `T` into the begin-frame buffer.
    pub fn remove<T: Component>(&self, hybrid: &mut HybridWorld) -> Result<(), SyncError> {
        let entity = self.require_entity()?;
        let ctx = hybrid.setup_context();
        Ok(ctx.buffer.remove::<T>(ctx.world.registry(), entity)?)
    }

    /// Overwrite `T` immediately, bypassing the buffers.
    pub fn set_direct<T: Component>(&self, world: &mut World, value: T) -> Result<(), SyncError> {
        let entity = self.require_entity()?;
        Ok(world.set_component(entity, value)?)
    }

    /// Keep entity data from overwriting the transform during the next
    /// frame. Used after teleporting the transform directly.
    pub fn skip_sync_one_frame(&self, hybrid: &mut HybridWorld) -> Result<(), SyncError> {
        self.add(hybrid, &DontSyncOneFrame)
    }

    // -- sync state ---------------------------------------------------------

    /// Current sync tags. Empty when not initialized.
    pub fn pack_sync_state(&self, world: &World) -> SyncState {
        self.entity
            .map_or(SyncState::empty(), |e| SyncState::pack(world, e))
    }

    /// Queue commands restoring `state` into the begin-frame buffer.
    pub fn unpack_sync_state(
        &self,
        hybrid: &mut HybridWorld,
        state: SyncState,
    ) -> Result<(), SyncError> {
        let entity = self.require_entity()?;
        let ctx = hybrid.setup_context();
        Ok(state.unpack_to(ctx.buffer, ctx.world.registry(), entity)?)
    }

    // -- transform ----------------------------------------------------------

    /// Container slot of the first bound transform among the suppliers.
    pub fn transform_slot(&self) -> Option<SlotId> {
        self.suppliers.iter().find_map(|s| s.transform_slot())
    }

    pub fn transform<'c>(&self, container: &'c TransformContainer) -> Option<&'c Transform> {
        container.payload(self.transform_slot()?)
    }

    pub fn transform_mut<'c>(
        &self,
        container: &'c mut TransformContainer,
    ) -> Option<&'c mut Transform> {
        container.payload_mut(self.transform_slot()?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{SyncPositionOffset, SyncPositionToEntity};
    use crate::config::HybridConfig;
    use glam::Vec3;

    fn hybrid() -> HybridWorld {
        HybridWorld::new(&HybridConfig::default()).unwrap()
    }

    fn suppliers(position: Vec3) -> Vec<Box<dyn EntitySupplier>> {
        vec![
            Box::new(TransformSupplier::new(Transform::from_position(position))),
            Box::new(SyncStateSupplier::new(SyncState::POSITION_TO_ENTITY)),
            Box::new(ComponentSupplier::new(SyncPositionOffset(Vec3::Y))),
        ]
    }

    struct Failing;

    impl EntitySupplier for Failing {
        fn gather_types(
            &self,
            _: &ComponentRegistry,
            _: &mut Vec<StableTypeHash>,
        ) -> Result<(), EcsError> {
            Ok(())
        }

        fn setup_entity(&mut self, _: Entity, _: &mut SetupContext<'_>) -> Result<(), SyncError> {
            Err(SyncError::NotInitialized)
        }

        fn cleanup(&mut self, _: Entity, _: &mut SetupContext<'_>) -> Result<(), SyncError> {
            Err(SyncError::NotInitialized)
        }
    }

    #[test]
    fn gathered_key_is_shared_by_identical_objects() {
        let mut hybrid = hybrid();
        let mut a = EntityBehaviour::new(hybrid.world().registry(), suppliers(Vec3::X)).unwrap();
        let mut b = EntityBehaviour::new(hybrid.world().registry(), suppliers(Vec3::Z)).unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key().component_hashes.len(), 3);

        let ea = a.initialize(&mut hybrid).unwrap();
        let eb = b.initialize(&mut hybrid).unwrap();
        assert_ne!(ea, eb);
        assert_eq!(hybrid.world().archetype_of(ea), hybrid.world().archetype_of(eb));
        assert_eq!(hybrid.cache().stats().misses, 1);
        assert_eq!(hybrid.container().live_count(), 2);
    }

    #[test]
    fn initialize_is_idempotent() {
        let mut hybrid = hybrid();
        let mut obj = EntityBehaviour::new(hybrid.world().registry(), suppliers(Vec3::X)).unwrap();
        let first = obj.initialize(&mut hybrid).unwrap();
        let second = obj.initialize(&mut hybrid).unwrap();
        assert_eq!(first, second);
        assert_eq!(hybrid.world().entity_count(), 1);
        assert_eq!(hybrid.container().live_count(), 1);
    }

    #[test]
    fn spawned_entity_has_declared_components_immediately() {
        let mut hybrid = hybrid();
        let mut obj = EntityBehaviour::new(hybrid.world().registry(), suppliers(Vec3::X)).unwrap();
        obj.initialize(&mut hybrid).unwrap();

        assert!(obj.has::<SyncPositionToEntity>(hybrid.world()));
        assert!(obj.has::<Position>(hybrid.world()));
        // Supplied values arrive with the begin-frame playback.
        assert_eq!(
            obj.get::<SyncPositionOffset>(hybrid.world()),
            Some(&SyncPositionOffset(Vec3::ZERO))
        );
    }

    #[test]
    fn cleanup_releases_slot_and_queues_despawn() {
        let mut hybrid = hybrid();
        let mut obj = EntityBehaviour::new(hybrid.world().registry(), suppliers(Vec3::X)).unwrap();
        let entity = obj.initialize(&mut hybrid).unwrap();
        let slot = obj.transform_slot().unwrap();

        obj.cleanup(&mut hybrid).unwrap();
        assert!(!obj.is_initialized());
        assert!(!hybrid.container().is_live(slot));
        assert!(hybrid.world().is_alive(entity));

        let mut buffer = std::mem::take(hybrid.begin_frame_buffer());
        buffer.apply(hybrid.world_mut());
        assert!(!hybrid.world().is_alive(entity));

        obj.cleanup(&mut hybrid).unwrap();
    }

    #[test]
    fn reinitialize_after_cleanup_reuses_transform_slot() {
        let mut hybrid = hybrid();
        let mut obj = EntityBehaviour::new(hybrid.world().registry(), suppliers(Vec3::X)).unwrap();
        obj.initialize(&mut hybrid).unwrap();
        let slot = obj.transform_slot().unwrap();
        obj.cleanup(&mut hybrid).unwrap();

        obj.initialize(&mut hybrid).unwrap();
        assert_eq!(obj.transform_slot().unwrap().index(), slot.index());
        assert_eq!(obj.transform(hybrid.container()).unwrap().position(), Vec3::X);
    }

    #[test]
    fn access_before_initialize_is_an_error() {
        let mut hybrid = hybrid();
        let obj = EntityBehaviour::new(hybrid.world().registry(), suppliers(Vec3::X)).unwrap();
        assert!(matches!(
            obj.add(&mut hybrid, &Position::default()),
            Err(SyncError::NotInitialized)
        ));
        assert!(obj.get::<Position>(hybrid.world()).is_none());
        assert!(obj.pack_sync_state(hybrid.world()).is_empty());
    }

    #[test]
    fn failing_cleanup_still_cleans_the_rest() {
        let mut hybrid = hybrid();
        let mut list = suppliers(Vec3::X);
        list.insert(0, Box::new(Failing));
        let mut obj = EntityBehaviour::new(hybrid.world().registry(), list).unwrap();
        assert!(obj.initialize(&mut hybrid).is_err());
        assert!(obj.is_initialized());

        assert!(obj.cleanup(&mut hybrid).is_err());
        assert!(!obj.is_initialized());
        assert_eq!(hybrid.begin_frame_buffer().len(), 1);
    }

    #[test]
    fn unknown_component_in_gather_fails_construction() {
        let world = World::new();
        let err = EntityBehaviour::new(world.registry(), suppliers(Vec3::X)).unwrap_err();
        assert!(matches!(err, EcsError::UnknownComponent { .. }));
    }
}
