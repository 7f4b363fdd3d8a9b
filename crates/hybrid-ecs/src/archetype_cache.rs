//! Unique-hash to archetype cache.
//!
//! Authoring data describes an entity template as an
//! [`ArchetypeKey`]: a precomputed unique hash plus the stable type hashes of
//! its components. Resolving those hashes and building a layout is the slow
//! path; the [`ArchetypeCache`] makes every request after the first one for a
//! given unique hash a single map lookup.
//!
//! The cache is owned by whoever owns the world and is passed explicitly to
//! every call site. It is single-writer: `get_or_create` takes `&mut self`.
//!
//! # Collisions
//!
//! By default a unique-hash hit is trusted without comparing component sets,
//! so two distinct sets that collide on the 64-bit hash would share a layout.
//! Setting [`CacheConfig::verify_component_sets`] keeps the canonical hash
//! list next to every entry and compares it on each hit; a mismatch is logged
//! and gets its own layout instead.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::archetype::ArchetypeId;
use crate::component::ComponentTypeId;
use crate::hash::{canonicalize, ArchetypeKey, StableTypeHash};
use crate::EcsError;

// ---------------------------------------------------------------------------
// LayoutStorage
// ---------------------------------------------------------------------------

/// The storage side of archetype construction.
///
/// Implemented by [`World`](crate::world::World). The cache only talks to
/// storage through this trait so tests can count constructions.
pub trait LayoutStorage {
    /// Resolve a stable type hash to a registered component type.
    fn resolve_type(&self, hash: StableTypeHash) -> Result<ComponentTypeId, EcsError>;

    /// Build (or fetch) the layout for the given component types. Every id
    /// must belong to this storage; otherwise nothing is built.
    fn create_layout(&mut self, types: &[ComponentTypeId]) -> Result<ArchetypeId, EcsError>;
}

// ---------------------------------------------------------------------------
// CacheConfig
// ---------------------------------------------------------------------------

/// Tuning knobs for [`ArchetypeCache`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Number of unique hashes to reserve room for up front.
    pub initial_capacity: usize,
    /// Compare full component sets on every hit instead of trusting the hash.
    pub verify_component_sets: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 1024,
            verify_component_sets: false,
        }
    }
}

// ---------------------------------------------------------------------------
// CacheStats
// ---------------------------------------------------------------------------

/// Running counters, mostly useful in tests and diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Requests served from the map.
    pub hits: u64,
    /// Requests that went through layout construction.
    pub misses: u64,
    /// Hits whose component set did not match the cached one. Only counted
    /// when verification is enabled.
    pub collisions: u64,
}

// ---------------------------------------------------------------------------
// ArchetypeCache
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
struct CacheEntry {
    /// Canonical component hashes. Empty when verification is off.
    component_hashes: Vec<u64>,
    layout: ArchetypeId,
}

/// Maps a component set's unique hash to a previously built archetype.
///
/// Entries are never evicted; the number of distinct archetypes is bounded by
/// content, not by runtime events.
#[derive(Debug)]
pub struct ArchetypeCache {
    config: CacheConfig,
    /// Each bucket holds one entry unless verification split a collision.
    entries: HashMap<u64, Vec<CacheEntry>>,
    stats: CacheStats,
}

impl ArchetypeCache {
    /// Create an empty cache with default configuration.
    pub fn new() -> Self {
        Self::with_config(CacheConfig::default())
    }

    /// Create an empty cache.
    pub fn with_config(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::with_capacity(config.initial_capacity),
            config,
            stats: CacheStats::default(),
        }
    }

    /// Return the archetype cached for `unique_hash`, building it from
    /// `component_hashes` on the first request.
    ///
    /// Fails with [`EcsError::UnknownTypeHash`] if any component hash does not
    /// resolve. Nothing is inserted in that case.
    pub fn get_or_create<S>(
        &mut self,
        unique_hash: u64,
        component_hashes: &[u64],
        storage: &mut S,
    ) -> Result<ArchetypeId, EcsError>
    where
        S: LayoutStorage + ?Sized,
    {
        let canonical = self
            .config
            .verify_component_sets
            .then(|| canonicalize(component_hashes));

        if let Some(bucket) = self.entries.get(&unique_hash) {
            match &canonical {
                None => {
                    self.stats.hits += 1;
                    tracing::trace!(unique_hash, layout = ?bucket[0].layout, "archetype cache hit");
                    return Ok(bucket[0].layout);
                }
                Some(set) => {
                    if let Some(entry) = bucket.iter().find(|e| &e.component_hashes == set) {
                        self.stats.hits += 1;
                        tracing::trace!(unique_hash, layout = ?entry.layout, "archetype cache hit");
                        return Ok(entry.layout);
                    }
                    self.stats.collisions += 1;
                    tracing::warn!(
                        unique_hash,
                        components = ?set,
                        "unique hash collision between distinct component sets"
                    );
                }
            }
        }

        let types = component_hashes
            .iter()
            .map(|&h| storage.resolve_type(StableTypeHash(h)))
            .collect::<Result<Vec<_>, _>>()?;
        let layout = storage.create_layout(&types)?;
        self.stats.misses += 1;
        tracing::debug!(
            unique_hash,
            layout = ?layout,
            component_count = types.len(),
            "archetype cache miss, layout created"
        );

        self.entries.entry(unique_hash).or_default().push(CacheEntry {
            component_hashes: canonical.unwrap_or_default(),
            layout,
        });
        Ok(layout)
    }

    /// [`get_or_create`](Self::get_or_create) for a stored authoring key.
    pub fn get_or_create_key<S>(
        &mut self,
        key: &ArchetypeKey,
        storage: &mut S,
    ) -> Result<ArchetypeId, EcsError>
    where
        S: LayoutStorage + ?Sized,
    {
        self.get_or_create(key.unique_hash, &key.component_hashes, storage)
    }

    /// Cached layout for `unique_hash`, if any. Never constructs.
    pub fn get(&self, unique_hash: u64) -> Option<ArchetypeId> {
        self.entries
            .get(&unique_hash)
            .and_then(|bucket| bucket.first())
            .map(|e| e.layout)
    }

    /// Number of cached layouts.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Whether the cache holds no layouts.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hit/miss counters.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Active configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

impl Default for ArchetypeCache {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
