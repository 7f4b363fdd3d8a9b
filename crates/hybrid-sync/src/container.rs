//! The transform container and the per-object binding into it.
//!
//! Every authored object that wants its transform synced owns an
//! [`EntityTransform`]. Setting it up stores `(entity, transform)` in the
//! shared [`TransformContainer`] and keeps the returned slot id; cleaning it
//! up releases the slot so the next object can reuse it.

use hybrid_ecs::entity::Entity;
use hybrid_ecs::handle_table::{HandleTable, SlotId};

use crate::transform::Transform;
use crate::SyncError;

/// Dense `(entity, transform)` storage swept by the sync systems.
pub type TransformContainer = HandleTable<Entity, Transform>;

/// One object's binding into a [`TransformContainer`].
#[derive(Debug, Clone, Default)]
pub struct EntityTransform {
    initial: Transform,
    binding: Option<(Entity, SlotId)>,
}

impl EntityTransform {
    /// An unbound binding that will insert `initial` on setup.
    pub fn new(initial: Transform) -> Self {
        Self {
            initial,
            binding: None,
        }
    }

    /// Store the transform for `entity`. Binding twice without a cleanup in
    /// between is an error and leaves the container untouched.
    pub fn setup(
        &mut self,
        container: &mut TransformContainer,
        entity: Entity,
    ) -> Result<SlotId, SyncError> {
        if let Some((bound, slot)) = self.binding {
            return Err(SyncError::TransformAlreadyBound { entity: bound, slot });
        }
        let slot = container.add(entity, self.initial);
        self.binding = Some((entity, slot));
        tracing::trace!(entity = %entity, slot = %slot, "transform bound");
        Ok(slot)
    }

    /// Release the slot if bound. The transform's last value becomes the
    /// initial value for a later setup.
    pub fn cleanup(&mut self, container: &mut TransformContainer) -> Result<(), SyncError> {
        let Some((entity, slot)) = self.binding.take() else {
            return Ok(());
        };
        if let Some(last) = container.payload(slot) {
            self.initial = *last;
        }
        container.release(slot)?;
        tracing::trace!(entity = %entity, slot = %slot, "transform released");
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }

    pub fn slot(&self) -> Option<SlotId> {
        self.binding.map(|(_, slot)| slot)
    }

    pub fn entity(&self) -> Option<Entity> {
        self.binding.map(|(entity, _)| entity)
    }

    /// The live transform if bound, otherwise the one that will be inserted.
    pub fn transform<'c>(&'c self, container: &'c TransformContainer) -> &'c Transform {
        self.slot()
            .and_then(|slot| container.payload(slot))
            .unwrap_or(&self.initial)
    }

    /// Mutable access to the live transform. `None` while unbound.
    pub fn transform_mut<'c>(
        &self,
        container: &'c mut TransformContainer,
    ) -> Option<&'c mut Transform> {
        container.payload_mut(self.slot()?)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use hybrid_ecs::world::World;

    #[test]
    fn setup_then_cleanup_reuses_slot() {
        let mut world = World::new();
        let mut container = TransformContainer::new();
        let a = world.spawn_empty();
        let b = world.spawn_empty();

        let mut first = EntityTransform::new(Transform::from_position(Vec3::X));
        let mut second = EntityTransform::default();
        let slot_a = first.setup(&mut container, a).unwrap();
        second.setup(&mut container, b).unwrap();

        first.cleanup(&mut container).unwrap();
        assert!(!first.is_bound());
        assert_eq!(container.live_count(), 1);

        let c = world.spawn_empty();
        let slot_c = first.setup(&mut container, c).unwrap();
        assert_eq!(slot_c.index(), slot_a.index());
        assert_eq!(first.transform(&container).position(), Vec3::X);
    }

    #[test]
    fn double_setup_is_rejected() {
        let mut world = World::new();
        let mut container = TransformContainer::new();
        let e = world.spawn_empty();
        let mut binding = EntityTransform::default();
        binding.setup(&mut container, e).unwrap();

        let err = binding.setup(&mut container, e).unwrap_err();
        assert!(matches!(err, SyncError::TransformAlreadyBound { .. }));
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn cleanup_without_setup_is_noop() {
        let mut container = TransformContainer::new();
        let mut binding = EntityTransform::default();
        binding.cleanup(&mut container).unwrap();
        assert!(container.is_empty());
    }

    #[test]
    fn cleanup_keeps_last_transform() {
        let mut world = World::new();
        let mut container = TransformContainer::new();
        let e = world.spawn_empty();
        let mut binding = EntityTransform::default();
        binding.setup(&mut container, e).unwrap();
        binding
            .transform_mut(&mut container)
            .unwrap()
            .set_position(Vec3::new(4.0, 5.0, 6.0));

        binding.cleanup(&mut container).unwrap();
        assert_eq!(binding.transform(&container).position(), Vec3::new(4.0, 5.0, 6.0));
        assert!(binding.transform_mut(&mut container).is_none());
    }
}
