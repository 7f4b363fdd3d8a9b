//! The shared context every authored object and sync system works against.

use hybrid_ecs::archetype::ArchetypeId;
use hybrid_ecs::archetype_cache::ArchetypeCache;
use hybrid_ecs::command::CommandBuffer;
use hybrid_ecs::component::ComponentRegistry;
use hybrid_ecs::entity::Entity;
use hybrid_ecs::hash::ArchetypeKey;
use hybrid_ecs::world::World;
use hybrid_ecs::EcsError;

use crate::components::register_components;
use crate::config::HybridConfig;
use crate::container::TransformContainer;

/// Owns the entity world, the archetype cache, the transform container and
/// the three deferred command buffers.
///
/// - `begin_frame` is played back at the start of the next frame. Authoring
///   objects record their setup and teardown here.
/// - `after_simulation` is played back at the end of the current frame.
/// - `next_frame` is played back at the start of the next frame, before
///   `begin_frame`. Sync-state resets land here.
#[derive(Debug)]
pub struct HybridWorld {
    world: World,
    cache: ArchetypeCache,
    container: TransformContainer,
    begin_frame: CommandBuffer,
    after_simulation: CommandBuffer,
    next_frame: CommandBuffer,
}

/// Borrowed pieces an [`EntitySupplier`](crate::authoring::EntitySupplier)
/// needs during setup and cleanup.
pub struct SetupContext<'a> {
    pub world: &'a World,
    pub buffer: &'a mut CommandBuffer,
    pub container: &'a mut TransformContainer,
}

impl SetupContext<'_> {
    pub fn registry(&self) -> &ComponentRegistry {
        self.world.registry()
    }
}

impl HybridWorld {
    /// Create a context with the transform components already registered.
    pub fn new(config: &HybridConfig) -> Result<Self, EcsError> {
        let mut world = World::new();
        register_components(&mut world)?;
        Ok(Self {
            world,
            cache: ArchetypeCache::with_config(config.cache.clone()),
            container: TransformContainer::with_config(&config.container),
            begin_frame: CommandBuffer::new(),
            after_simulation: CommandBuffer::new(),
            next_frame: CommandBuffer::new(),
        })
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    /// Direct world access for setup code that runs outside a frame.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn cache(&self) -> &ArchetypeCache {
        &self.cache
    }

    pub fn container(&self) -> &TransformContainer {
        &self.container
    }

    pub fn container_mut(&mut self) -> &mut TransformContainer {
        &mut self.container
    }

    pub fn begin_frame_buffer(&mut self) -> &mut CommandBuffer {
        &mut self.begin_frame
    }

    pub fn after_simulation_buffer(&mut self) -> &mut CommandBuffer {
        &mut self.after_simulation
    }

    pub fn next_frame_buffer(&mut self) -> &mut CommandBuffer {
        &mut self.next_frame
    }

    /// Layout for `key`, built through the cache on first use.
    pub fn layout_for(&mut self, key: &ArchetypeKey) -> Result<ArchetypeId, EcsError> {
        self.cache.get_or_create_key(key, &mut self.world)
    }

    /// Spawn an entity of `key`'s layout immediately.
    pub fn spawn_from_key(&mut self, key: &ArchetypeKey) -> Result<Entity, EcsError> {
        let layout = self.layout_for(key)?;
        self.world.spawn(layout)
    }

    /// Split into the pieces suppliers use, recording into the begin-frame
    /// buffer.
    pub fn setup_context(&mut self) -> SetupContext<'_> {
        SetupContext {
            world: &self.world,
            buffer: &mut self.begin_frame,
            container: &mut self.container,
        }
    }

    /// Mutable world and container at once, for the sync stages.
    pub(crate) fn sync_parts(&mut self) -> (&mut World, &mut TransformContainer) {
        (&mut self.world, &mut self.container)
    }

    /// Play back `next_frame` then `begin_frame`.
    pub(crate) fn play_frame_start(&mut self) -> (usize, usize) {
        let next = self.next_frame.apply(&mut self.world).len();
        let begin = self.begin_frame.apply(&mut self.world).len();
        (next, begin)
    }

    /// Queue [`DontSyncOneFrame`](crate::components::DontSyncOneFrame)
    /// removals into `next_frame`.
    pub(crate) fn queue_sync_reset(&mut self) -> Result<usize, EcsError> {
        crate::systems::reset_sync_state(&self.world, &mut self.next_frame)
    }

    pub(crate) fn play_after_simulation(&mut self) -> usize {
        self.after_simulation.apply(&mut self.world).len()
    }

    /// Apply a buffer recorded by simulation systems.
    pub(crate) fn apply(&mut self, buffer: &mut CommandBuffer) -> usize {
        buffer.apply(&mut self.world).len()
    }

    /// Whether any buffer still holds commands.
    pub fn has_pending_commands(&self) -> bool {
        !(self.begin_frame.is_empty()
            && self.after_simulation.is_empty()
            && self.next_frame.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
