//! Component type registration and metadata.
//!
//! Every component type is registered up front in a [`ComponentRegistry`].
//! Registration assigns a dense [`ComponentTypeId`] (used for storage and
//! archetype membership) and a [`StableTypeHash`] (used by authoring data and
//! the archetype cache). The registry is the explicit replacement for runtime
//! type reflection: a stable hash either resolves to registered metadata or
//! the lookup fails with [`EcsError::UnknownTypeHash`].

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::hash::{stable_type_hash, StableTypeHash};
use crate::EcsError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// Bound shared by every storable component type.
///
/// `Default` is required because spawning from an archetype initializes each
/// component to its default value. The serde bounds let the command buffer
/// carry values as JSON.
pub trait Component: Default + Clone + Send + Sync + Serialize + DeserializeOwned + 'static {}

impl<T> Component for T where
    T: Default + Clone + Send + Sync + Serialize + DeserializeOwned + 'static
{
}

// ---------------------------------------------------------------------------
// ComponentTypeId
// ---------------------------------------------------------------------------

/// Dense, registration-order identifier for a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ComponentTypeId(pub(crate) u32);

impl ComponentTypeId {
    /// Position in registration order.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ComponentTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComponentTypeId({})", self.0)
    }
}

// ---------------------------------------------------------------------------
// ComponentInfo
// ---------------------------------------------------------------------------

/// Metadata about a registered component type.
#[derive(Debug, Clone)]
pub struct ComponentInfo {
    /// Dense id assigned at registration time.
    pub id: ComponentTypeId,
    /// Registered name. Command payloads refer to components by this name.
    pub name: String,
    /// Content-derived identifier used by authoring data.
    pub stable_hash: StableTypeHash,
    /// `std::mem::size_of::<T>()`
    pub size: usize,
    /// `std::mem::align_of::<T>()`
    pub align: usize,
    /// Rust `TypeId` for runtime type checking.
    pub type_id: TypeId,
}

// ---------------------------------------------------------------------------
// ComponentRegistry
// ---------------------------------------------------------------------------

/// Registration table mapping Rust types, names and stable hashes to
/// component metadata.
#[derive(Debug, Default)]
pub struct ComponentRegistry {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<String, ComponentTypeId>,
    by_hash: HashMap<StableTypeHash, ComponentTypeId>,
    /// Indexed by `ComponentTypeId.0`.
    infos: Vec<ComponentInfo>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `T` under `name`.
    ///
    /// Registering the same Rust type again returns the existing id and
    /// ignores `name`. Reusing a name for a different type, or a stable hash
    /// that collides with an already registered type, is an error.
    pub fn register<T: Component>(&mut self, name: &str) -> Result<ComponentTypeId, EcsError> {
        let rust_type_id = TypeId::of::<T>();
        if let Some(&existing) = self.by_type.get(&rust_type_id) {
            return Ok(existing);
        }
        if self.by_name.contains_key(name) {
            return Err(EcsError::DuplicateComponentName {
                name: name.to_owned(),
            });
        }

        let size = std::mem::size_of::<T>();
        let align = std::mem::align_of::<T>();
        let stable_hash = stable_type_hash(name, size, align);
        if let Some(&other) = self.by_hash.get(&stable_hash) {
            return Err(EcsError::StableHashCollision {
                hash: stable_hash,
                name: name.to_owned(),
                existing: self.infos[other.index()].name.clone(),
            });
        }

        let id = ComponentTypeId(self.infos.len() as u32);
        self.infos.push(ComponentInfo {
            id,
            name: name.to_owned(),
            stable_hash,
            size,
            align,
            type_id: rust_type_id,
        });
        self.by_type.insert(rust_type_id, id);
        self.by_name.insert(name.to_owned(), id);
        self.by_hash.insert(stable_hash, id);
        tracing::trace!(component = %name, id = id.0, hash = %stable_hash, "registered component");
        Ok(id)
    }

    /// Look up a component type by its Rust type.
    pub fn lookup<T: 'static>(&self) -> Option<ComponentTypeId> {
        self.by_type.get(&TypeId::of::<T>()).copied()
    }

    /// Look up a component type by its registered name.
    pub fn lookup_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Look up a component type by its stable hash.
    pub fn lookup_by_hash(&self, hash: StableTypeHash) -> Option<ComponentTypeId> {
        self.by_hash.get(&hash).copied()
    }

    /// Resolve a stable hash to its metadata, failing loudly on unknown
    /// hashes (usually stale authoring data after a schema change).
    pub fn resolve(&self, hash: StableTypeHash) -> Result<&ComponentInfo, EcsError> {
        self.lookup_by_hash(hash)
            .map(|id| &self.infos[id.index()])
            .ok_or(EcsError::UnknownTypeHash { hash })
    }

    /// Metadata for `T`, or `UnknownComponent` if it was never registered.
    pub fn info_of<T: 'static>(&self) -> Result<&ComponentInfo, EcsError> {
        self.lookup::<T>()
            .map(|id| &self.infos[id.index()])
            .ok_or_else(|| EcsError::UnknownComponent {
                name: std::any::type_name::<T>().to_owned(),
                registered: self.registered_names().join(", "),
            })
    }

    /// Get the [`ComponentInfo`] for a registered component type id.
    pub fn get_info(&self, id: ComponentTypeId) -> Option<&ComponentInfo> {
        self.infos.get(id.index())
    }

    /// Stable hash of a registered component type.
    pub fn stable_hash_of<T: 'static>(&self) -> Option<StableTypeHash> {
        self.lookup::<T>()
            .map(|id| self.infos[id.index()].stable_hash)
    }

    /// Total number of registered component types.
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Whether any component types have been registered.
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// Names of all registered component types, sorted.
    pub fn registered_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.by_name.keys().map(|s| s.as_str()).collect();
        names.sort();
        names
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    struct Pos {
        x: f32,
        y: f32,
    }

    #[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
    struct Vel {
        dx: f32,
        dy: f32,
    }

    #[test]
    fn register_and_lookup() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Pos>("position").unwrap();
        assert_eq!(reg.lookup::<Pos>(), Some(id));
        assert_eq!(reg.lookup_by_name("position"), Some(id));
    }

    #[test]
    fn same_type_same_id() {
        let mut reg = ComponentRegistry::new();
        let id1 = reg.register::<Pos>("position").unwrap();
        let id2 = reg.register::<Pos>("position_again").unwrap();
        assert_eq!(id1, id2);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn name_reuse_by_other_type_is_rejected() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("position").unwrap();
        let err = reg.register::<Vel>("position").unwrap_err();
        assert!(matches!(err, EcsError::DuplicateComponentName { .. }));
    }

    #[test]
    fn resolve_by_stable_hash() {
        let mut reg = ComponentRegistry::new();
        let id = reg.register::<Vel>("velocity").unwrap();
        let hash = reg.stable_hash_of::<Vel>().unwrap();
        let info = reg.resolve(hash).unwrap();
        assert_eq!(info.id, id);
        assert_eq!(info.size, std::mem::size_of::<Vel>());
        assert_eq!(info.type_id, TypeId::of::<Vel>());
    }

    #[test]
    fn unknown_hash_fails_loudly() {
        let reg = ComponentRegistry::new();
        let err = reg.resolve(StableTypeHash(0xdead_beef)).unwrap_err();
        assert!(matches!(err, EcsError::UnknownTypeHash { .. }));
    }

    #[test]
    fn info_of_unregistered_lists_known_names() {
        let mut reg = ComponentRegistry::new();
        reg.register::<Pos>("position").unwrap();
        match reg.info_of::<Vel>() {
            Err(EcsError::UnknownComponent { registered, .. }) => {
                assert_eq!(registered, "position");
            }
            other => panic!("expected UnknownComponent, got {other:?}"),
        }
    }
}
