//! Structural layouts.
//!
//! An [`Archetype`] names a fixed set of component types. Every entity in the
//! [`World`](crate::world::World) belongs to exactly one archetype, the one
//! matching the set of components it currently carries. Archetypes are
//! immutable once created and live as long as the world that created them.

use serde::{Deserialize, Serialize};

use crate::component::ComponentTypeId;
use crate::hash::{combine_ordered, StableTypeHash};

// ---------------------------------------------------------------------------
// ArchetypeId
// ---------------------------------------------------------------------------

/// Handle to an archetype. Indexes `World::archetypes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ArchetypeId(pub(crate) u32);

impl ArchetypeId {
    /// Position in creation order.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

// ---------------------------------------------------------------------------
// Archetype
// ---------------------------------------------------------------------------

/// A fixed, sorted set of component types.
#[derive(Debug, Clone)]
pub struct Archetype {
    id: ArchetypeId,
    /// Sorted by `ComponentTypeId`.
    component_types: Vec<ComponentTypeId>,
    /// Parallel to `component_types`.
    stable_hashes: Vec<StableTypeHash>,
}

impl Archetype {
    /// Create an archetype. `types` must be sorted and free of duplicates,
    /// and `stable_hashes` must correspond 1:1 with it.
    pub(crate) fn new(
        id: ArchetypeId,
        component_types: Vec<ComponentTypeId>,
        stable_hashes: Vec<StableTypeHash>,
    ) -> Self {
        debug_assert!(component_types.windows(2).all(|w| w[0] < w[1]));
        debug_assert_eq!(component_types.len(), stable_hashes.len());
        Self {
            id,
            component_types,
            stable_hashes,
        }
    }

    /// The archetype's id.
    #[inline]
    pub fn id(&self) -> ArchetypeId {
        self.id
    }

    /// The sorted component types that define this archetype.
    #[inline]
    pub fn component_types(&self) -> &[ComponentTypeId] {
        &self.component_types
    }

    /// Stable hashes of the component types, in `component_types` order.
    #[inline]
    pub fn stable_hashes(&self) -> &[StableTypeHash] {
        &self.stable_hashes
    }

    /// Whether this archetype contains the given component type.
    #[inline]
    pub fn contains(&self, type_id: ComponentTypeId) -> bool {
        self.component_types.binary_search(&type_id).is_ok()
    }

    /// Number of component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.component_types.len()
    }

    /// Whether this is the empty archetype.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.component_types.is_empty()
    }

    /// Order-independent unique hash of this archetype's component set. Equal
    /// to `ArchetypeKey::from_types(self.stable_hashes()).unique_hash`.
    pub fn unique_hash(&self) -> u64 {
        let mut raw: Vec<u64> = self.stable_hashes.iter().map(|h| h.0).collect();
        raw.sort_unstable();
        combine_ordered(raw)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::ArchetypeKey;

    fn sample() -> Archetype {
        Archetype::new(
            ArchetypeId(0),
            vec![ComponentTypeId(0), ComponentTypeId(2)],
            vec![StableTypeHash(900), StableTypeHash(100)],
        )
    }

    #[test]
    fn contains_uses_sorted_types() {
        let arch = sample();
        assert!(arch.contains(ComponentTypeId(0)));
        assert!(arch.contains(ComponentTypeId(2)));
        assert!(!arch.contains(ComponentTypeId(1)));
        assert_eq!(arch.len(), 2);
    }

    #[test]
    fn unique_hash_matches_authoring_key() {
        let arch = sample();
        let key = ArchetypeKey::from_types(arch.stable_hashes());
        assert_eq!(arch.unique_hash(), key.unique_hash);
    }
}
