//! Stable type hashing and component-set hash combination.
//!
//! Two kinds of hashes flow through the crate:
//!
//! - A [`StableTypeHash`] identifies a single component type. It is derived
//!   from the type's registered name and memory layout, so it survives
//!   rebuilds but changes when the layout changes.
//! - A *unique hash* identifies a whole set of component types and is the key
//!   of the [`ArchetypeCache`](crate::archetype_cache::ArchetypeCache).
//!
//! The unique hash is a Josh-Bloch style rolling fold
//! (`seed = 17; seed = seed * 23 + h`). The fold is not commutative, so the
//! authoring path always folds over the canonical (sorted, deduplicated)
//! sequence. Two logically equal component sets therefore always produce the
//! same unique hash, no matter how the caller enumerated them.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Initial value of the rolling fold.
pub const COMBINE_SEED: u64 = 17;

/// Multiplier applied to the accumulator before each element is added.
pub const COMBINE_FACTOR: u64 = 23;

// ---------------------------------------------------------------------------
// StableTypeHash
// ---------------------------------------------------------------------------

/// Content-derived 64-bit identifier of a component type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StableTypeHash(pub u64);

impl fmt::Debug for StableTypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StableTypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for StableTypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

/// Derive the stable hash of a component type from its name and layout.
///
/// Uses the first eight bytes (little endian) of the blake3 digest over the
/// name, size and alignment.
pub fn stable_type_hash(name: &str, size: usize, align: usize) -> StableTypeHash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(name.as_bytes());
    hasher.update(&(size as u64).to_le_bytes());
    hasher.update(&(align as u64).to_le_bytes());
    let digest = hasher.finalize();
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest.as_bytes()[..8]);
    StableTypeHash(u64::from_le_bytes(head))
}

// ---------------------------------------------------------------------------
// Combination
// ---------------------------------------------------------------------------

/// Fold `hashes` in the order given. Arithmetic wraps on overflow.
///
/// This is order sensitive: `[a, b]` and `[b, a]` generally differ. Use
/// [`combine_unordered`] for component sets.
pub fn combine_ordered<I>(hashes: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    hashes.into_iter().fold(COMBINE_SEED, |seed, h| {
        seed.wrapping_mul(COMBINE_FACTOR).wrapping_add(h)
    })
}

/// Sort ascending and drop duplicates.
pub fn canonicalize(hashes: &[u64]) -> Vec<u64> {
    let mut sorted = hashes.to_vec();
    sorted.sort_unstable();
    sorted.dedup();
    sorted
}

/// Order-independent unique hash of a component set.
pub fn combine_unordered(hashes: &[u64]) -> u64 {
    combine_ordered(canonicalize(hashes))
}

// ---------------------------------------------------------------------------
// ArchetypeKey
// ---------------------------------------------------------------------------

/// Persistable description of a component set: the combined unique hash plus
/// the individual stable type hashes it was computed from.
///
/// Authoring code stores one of these per entity template and hands it to the
/// archetype cache at spawn time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArchetypeKey {
    /// Combined hash over `component_hashes`.
    pub unique_hash: u64,
    /// Stable type hashes, sorted and deduplicated.
    pub component_hashes: Vec<u64>,
}

impl ArchetypeKey {
    /// Build a canonical key from stable type hashes in any order.
    pub fn from_hashes(hashes: &[u64]) -> Self {
        let component_hashes = canonicalize(hashes);
        Self {
            unique_hash: combine_ordered(component_hashes.iter().copied()),
            component_hashes,
        }
    }

    /// Build a canonical key from typed stable hashes.
    pub fn from_types(types: &[StableTypeHash]) -> Self {
        let raw: Vec<u64> = types.iter().map(|t| t.0).collect();
        Self::from_hashes(&raw)
    }

    /// Whether `unique_hash` agrees with `component_hashes` and the hashes
    /// are in canonical order. Keys loaded from disk may fail this check
    /// after a schema change.
    pub fn is_canonical(&self) -> bool {
        self.component_hashes.windows(2).all(|w| w[0] < w[1])
            && self.unique_hash == combine_ordered(self.component_hashes.iter().copied())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_set_hashes_to_seed() {
        assert_eq!(combine_ordered(std::iter::empty()), COMBINE_SEED);
        assert_eq!(combine_unordered(&[]), COMBINE_SEED);
    }

    #[test]
    fn fold_matches_rolling_formula() {
        let expected = (17u64 * 23 + 5) * 23 + 9;
        assert_eq!(combine_ordered([5, 9]), expected);
    }

    #[test]
    fn ordered_fold_is_enumeration_sensitive() {
        assert_ne!(combine_ordered([1, 2]), combine_ordered([2, 1]));
    }

    #[test]
    fn unordered_fold_ignores_order_and_duplicates() {
        assert_eq!(combine_unordered(&[3, 1, 2]), combine_unordered(&[2, 3, 1]));
        assert_eq!(combine_unordered(&[1, 1, 2]), combine_unordered(&[2, 1]));
    }

    #[test]
    fn fold_wraps_instead_of_overflowing() {
        let h = combine_ordered([u64::MAX, u64::MAX, u64::MAX]);
        let expected = COMBINE_SEED
            .wrapping_mul(23)
            .wrapping_add(u64::MAX)
            .wrapping_mul(23)
            .wrapping_add(u64::MAX)
            .wrapping_mul(23)
            .wrapping_add(u64::MAX);
        assert_eq!(h, expected);
    }

    #[test]
    fn stable_hash_depends_on_name_and_layout() {
        let a = stable_type_hash("position", 12, 4);
        assert_eq!(a, stable_type_hash("position", 12, 4));
        assert_ne!(a, stable_type_hash("rotation", 12, 4));
        assert_ne!(a, stable_type_hash("position", 16, 4));
    }

    #[test]
    fn key_is_canonical_and_detects_tampering() {
        let key = ArchetypeKey::from_hashes(&[30, 10, 20, 10]);
        assert_eq!(key.component_hashes, vec![10, 20, 30]);
        assert!(key.is_canonical());

        let mut stale = key.clone();
        stale.component_hashes.push(5);
        assert!(!stale.is_canonical());
    }

    #[test]
    fn key_survives_json() {
        let key = ArchetypeKey::from_hashes(&[7, 3]);
        let json = serde_json::to_string(&key).unwrap();
        let back: ArchetypeKey = serde_json::from_str(&json).unwrap();
        assert_eq!(back, key);
    }
}
