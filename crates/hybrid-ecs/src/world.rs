//! The [`World`] is the storage engine: it owns the entity allocator, the
//! component registry, the archetypes and every component value.
//!
//! Component values live in one sparse column per registered type, keyed by
//! [`Entity`]. An entity's archetype is the exact set of columns it has a
//! value in, and it is updated whenever a component is attached or detached.
//! Per-handle reads go through [`ComponentLookup`], which is `Sync` and can be
//! handed to parallel workers alongside a shared borrow of the world.

use std::any::Any;
use std::collections::HashMap;
use std::marker::PhantomData;

use crate::archetype::{Archetype, ArchetypeId};
use crate::archetype_cache::LayoutStorage;
use crate::component::{Component, ComponentRegistry, ComponentTypeId};
use crate::entity::{Entity, EntityAllocator};
use crate::hash::StableTypeHash;
use crate::EcsError;

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Type-erased operations the world needs on a column without knowing `T`.
trait ErasedColumn: Send + Sync {
    fn insert_default(&mut self, entity: Entity);
    fn insert_json(&mut self, entity: Entity, value: &serde_json::Value) -> Result<(), String>;
    fn remove(&mut self, entity: Entity) -> bool;
    fn contains(&self, entity: Entity) -> bool;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Sparse storage for one component type.
struct Column<T> {
    values: HashMap<Entity, T>,
}

impl<T> Default for Column<T> {
    fn default() -> Self {
        Self {
            values: HashMap::new(),
        }
    }
}

impl<T: Component> ErasedColumn for Column<T> {
    fn insert_default(&mut self, entity: Entity) {
        self.values.insert(entity, T::default());
    }

    fn insert_json(&mut self, entity: Entity, value: &serde_json::Value) -> Result<(), String> {
        let typed: T = serde_json::from_value(value.clone()).map_err(|e| e.to_string())?;
        self.values.insert(entity, typed);
        Ok(())
    }

    fn remove(&mut self, entity: Entity) -> bool {
        self.values.remove(&entity).is_some()
    }

    fn contains(&self, entity: Entity) -> bool {
        self.values.contains_key(&entity)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// ComponentLookup
// ---------------------------------------------------------------------------

/// Read-only per-entity view of one component type.
///
/// A lookup for an unregistered type answers `false`/`None` for every entity.
pub struct ComponentLookup<'w, T> {
    values: Option<&'w HashMap<Entity, T>>,
    _marker: PhantomData<&'w T>,
}

impl<T> Clone for ComponentLookup<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ComponentLookup<'_, T> {}

impl<'w, T> ComponentLookup<'w, T> {
    /// Whether `entity` currently has this component.
    #[inline]
    pub fn has(&self, entity: Entity) -> bool {
        self.values.is_some_and(|v| v.contains_key(&entity))
    }

    /// The component value for `entity`, if present.
    #[inline]
    pub fn get(&self, entity: Entity) -> Option<&'w T> {
        self.values.and_then(|v| v.get(&entity))
    }
}

// ---------------------------------------------------------------------------
// World
// ---------------------------------------------------------------------------

/// Entity and component storage.
pub struct World {
    allocator: EntityAllocator,
    registry: ComponentRegistry,
    /// Indexed by `ComponentTypeId`.
    columns: Vec<Box<dyn ErasedColumn>>,
    /// Indexed by `ArchetypeId`.
    archetypes: Vec<Archetype>,
    /// Sorted component set -> archetype.
    archetype_index: HashMap<Vec<ComponentTypeId>, ArchetypeId>,
    locations: HashMap<Entity, ArchetypeId>,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entity_count", &self.locations.len())
            .field("archetype_count", &self.archetypes.len())
            .field("component_count", &self.registry.len())
            .finish()
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self {
            allocator: EntityAllocator::new(),
            registry: ComponentRegistry::new(),
            columns: Vec::new(),
            archetypes: Vec::new(),
            archetype_index: HashMap::new(),
            locations: HashMap::new(),
        }
    }

    /// Read-only access to the component registry.
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Register a component type and allocate its column.
    pub fn register_component<T: Component>(
        &mut self,
        name: &str,
    ) -> Result<ComponentTypeId, EcsError> {
        let id = self.registry.register::<T>(name)?;
        if id.index() == self.columns.len() {
            self.columns.push(Box::new(Column::<T>::default()));
        }
        Ok(id)
    }

    // -- archetypes ---------------------------------------------------------

    /// Find or create the archetype for a sorted, deduplicated type set.
    fn archetype_for(&mut self, types: &[ComponentTypeId]) -> ArchetypeId {
        if let Some(&id) = self.archetype_index.get(types) {
            return id;
        }
        let id = ArchetypeId(self.archetypes.len() as u32);
        let hashes = types
            .iter()
            .filter_map(|t| self.registry.get_info(*t))
            .map(|info| info.stable_hash)
            .collect();
        self.archetypes
            .push(Archetype::new(id, types.to_vec(), hashes));
        self.archetype_index.insert(types.to_vec(), id);
        tracing::trace!(archetype = ?id, types = ?types, "archetype created");
        id
    }

    /// Archetype metadata by id.
    pub fn archetype(&self, id: ArchetypeId) -> Option<&Archetype> {
        self.archetypes.get(id.index())
    }

    /// The archetype `entity` currently belongs to.
    pub fn archetype_of(&self, entity: Entity) -> Option<ArchetypeId> {
        self.locations.get(&entity).copied()
    }

    /// Number of distinct archetypes created so far.
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Spawn an entity with every component of `archetype` set to its
    /// default value.
    pub fn spawn(&mut self, archetype: ArchetypeId) -> Result<Entity, EcsError> {
        let types = self
            .archetypes
            .get(archetype.index())
            .ok_or(EcsError::UnknownArchetype { archetype })?
            .component_types()
            .to_vec();
        let entity = self.allocator.allocate();
        for t in &types {
            self.columns[t.index()].insert_default(entity);
        }
        self.locations.insert(entity, archetype);
        Ok(entity)
    }

    /// Spawn an entity with no components.
    pub fn spawn_empty(&mut self) -> Entity {
        let archetype = self.archetype_for(&[]);
        let entity = self.allocator.allocate();
        self.locations.insert(entity, archetype);
        entity
    }

    /// Despawn `entity`, dropping all of its components.
    pub fn despawn(&mut self, entity: Entity) -> Result<(), EcsError> {
        let archetype = self
            .locations
            .remove(&entity)
            .ok_or(EcsError::StaleEntity { entity })?;
        for t in self.archetypes[archetype.index()].component_types() {
            self.columns[t.index()].remove(entity);
        }
        self.allocator.deallocate(entity);
        Ok(())
    }

    /// Whether `entity` refers to a live row.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.allocator.is_alive(entity)
    }

    /// Number of live entities.
    pub fn entity_count(&self) -> usize {
        self.locations.len()
    }

    // -- typed component access ---------------------------------------------

    fn column<T: Component>(&self) -> Option<&Column<T>> {
        let id = self.registry.lookup::<T>()?;
        self.columns[id.index()].as_any().downcast_ref::<Column<T>>()
    }

    fn column_mut<T: Component>(&mut self) -> Option<&mut Column<T>> {
        let id = self.registry.lookup::<T>()?;
        self.columns[id.index()]
            .as_any_mut()
            .downcast_mut::<Column<T>>()
    }

    fn type_id_of<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.registry.info_of::<T>().map(|info| info.id)
    }

    fn ensure_alive(&self, entity: Entity) -> Result<ArchetypeId, EcsError> {
        self.locations
            .get(&entity)
            .copied()
            .ok_or(EcsError::StaleEntity { entity })
    }

    /// Move `entity` to the archetype that also contains / no longer contains
    /// `type_id`.
    fn migrate(
        &mut self,
        entity: Entity,
        from: ArchetypeId,
        type_id: ComponentTypeId,
        attach: bool,
    ) {
        let mut types = self.archetypes[from.index()].component_types().to_vec();
        match (attach, types.binary_search(&type_id)) {
            (true, Err(pos)) => types.insert(pos, type_id),
            (false, Ok(pos)) => {
                types.remove(pos);
            }
            _ => return,
        }
        let to = self.archetype_for(&types);
        self.locations.insert(entity, to);
    }

    /// Attach `value` to `entity`, overwriting any existing value.
    pub fn add_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<(), EcsError> {
        let from = self.ensure_alive(entity)?;
        let type_id = self.type_id_of::<T>()?;
        if let Some(column) = self.column_mut::<T>() {
            column.values.insert(entity, value);
        }
        self.migrate(entity, from, type_id, true);
        Ok(())
    }

    /// Overwrite the value of a component `entity` already has.
    pub fn set_component<T: Component>(
        &mut self,
        entity: Entity,
        value: T,
    ) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let type_id = self.type_id_of::<T>()?;
        if !self.has::<T>(entity) {
            return Err(EcsError::MissingComponent {
                entity,
                component: self.component_name(type_id),
            });
        }
        if let Some(slot) = self.get_mut::<T>(entity) {
            *slot = value;
        }
        Ok(())
    }

    /// Detach `T` from `entity`. Returns whether a value was removed.
    pub fn remove_component<T: Component>(&mut self, entity: Entity) -> Result<bool, EcsError> {
        let type_id = self.type_id_of::<T>()?;
        self.remove_component_by_id(entity, type_id)
    }

    /// Shared reference to `entity`'s `T`.
    pub fn get<T: Component>(&self, entity: Entity) -> Option<&T> {
        self.column::<T>()?.values.get(&entity)
    }

    /// Mutable reference to `entity`'s `T`.
    pub fn get_mut<T: Component>(&mut self, entity: Entity) -> Option<&mut T> {
        self.column_mut::<T>()?.values.get_mut(&entity)
    }

    /// Whether `entity` has a `T`.
    pub fn has<T: Component>(&self, entity: Entity) -> bool {
        self.column::<T>()
            .is_some_and(|c| c.values.contains_key(&entity))
    }

    /// Read-only lookup for `T`, suitable for sharing with parallel workers.
    pub fn lookup<T: Component>(&self) -> ComponentLookup<'_, T> {
        ComponentLookup {
            values: self.column::<T>().map(|c| &c.values),
            _marker: PhantomData,
        }
    }

    /// Every entity that has a `T`, in handle order.
    pub fn entities_with<T: Component>(&self) -> Vec<Entity> {
        let mut entities: Vec<Entity> = self
            .column::<T>()
            .map(|c| c.values.keys().copied().collect())
            .unwrap_or_default();
        entities.sort_unstable();
        entities
    }

    // -- name-based access (command playback) -------------------------------

    fn type_id_by_name(&self, name: &str) -> Result<ComponentTypeId, EcsError> {
        self.registry
            .lookup_by_name(name)
            .ok_or_else(|| EcsError::UnknownComponent {
                name: name.to_owned(),
                registered: self.registry.registered_names().join(", "),
            })
    }

    fn component_name(&self, type_id: ComponentTypeId) -> String {
        self.registry
            .get_info(type_id)
            .map(|info| info.name.clone())
            .unwrap_or_default()
    }

    /// Attach a JSON-encoded component by registered name, overwriting any
    /// existing value.
    pub fn add_component_json(
        &mut self,
        entity: Entity,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<(), EcsError> {
        let from = self.ensure_alive(entity)?;
        let type_id = self.type_id_by_name(name)?;
        self.columns[type_id.index()]
            .insert_json(entity, value)
            .map_err(|details| EcsError::ComponentDeserialization {
                component: name.to_owned(),
                details,
            })?;
        self.migrate(entity, from, type_id, true);
        Ok(())
    }

    /// Overwrite a JSON-encoded component `entity` already has.
    pub fn set_component_json(
        &mut self,
        entity: Entity,
        name: &str,
        value: &serde_json::Value,
    ) -> Result<(), EcsError> {
        self.ensure_alive(entity)?;
        let type_id = self.type_id_by_name(name)?;
        let column = &mut self.columns[type_id.index()];
        if !column.contains(entity) {
            return Err(EcsError::MissingComponent {
                entity,
                component: name.to_owned(),
            });
        }
        column
            .insert_json(entity, value)
            .map_err(|details| EcsError::ComponentDeserialization {
                component: name.to_owned(),
                details,
            })
    }

    /// Detach a component by registered name.
    pub fn remove_component_by_name(
        &mut self,
        entity: Entity,
        name: &str,
    ) -> Result<bool, EcsError> {
        let type_id = self.type_id_by_name(name)?;
        self.remove_component_by_id(entity, type_id)
    }

    fn remove_component_by_id(
        &mut self,
        entity: Entity,
        type_id: ComponentTypeId,
    ) -> Result<bool, EcsError> {
        let from = self.ensure_alive(entity)?;
        if !self.columns[type_id.index()].remove(entity) {
            return Ok(false);
        }
        self.migrate(entity, from, type_id, false);
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// LayoutStorage
// ---------------------------------------------------------------------------

impl LayoutStorage for World {
    fn resolve_type(&self, hash: StableTypeHash) -> Result<ComponentTypeId, EcsError> {
        self.registry.resolve(hash).map(|info| info.id)
    }

    fn create_layout(&mut self, types: &[ComponentTypeId]) -> Result<ArchetypeId, EcsError> {
        if let Some(&id) = types.iter().find(|t| t.index() >= self.columns.len()) {
            return Err(EcsError::UnknownComponentType { id });
        }
        let mut sorted = types.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        Ok(self.archetype_for(&sorted))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
