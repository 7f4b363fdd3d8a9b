//! Entity handles and allocation.
//!
//! An [`Entity`] packs a *generation* counter in the high 32 bits and a row
//! *index* in the low 32 bits. Despawning bumps the generation of the index,
//! so handles held past a despawn are recognised as stale even after the
//! index is recycled.

use std::collections::VecDeque;
use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// Opaque generational handle to a storage row.
///
/// Layout: `[generation: u32 | index: u32]`
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity(u64);

impl Entity {
    /// Sentinel that never refers to a live row.
    pub const NULL: Entity = Entity(u64::MAX);

    #[inline]
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self((generation as u64) << 32 | index as u64)
    }

    /// Row index (low 32 bits).
    #[inline]
    pub fn index(self) -> u32 {
        self.0 as u32
    }

    /// Generation (high 32 bits).
    #[inline]
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::NULL
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::NULL {
            return f.write_str("Entity(null)");
        }
        write!(f, "Entity({}v{})", self.index(), self.generation())
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index(), self.generation())
    }
}

// ---------------------------------------------------------------------------
// EntityAllocator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct RowMeta {
    generation: u32,
    alive: bool,
}

/// Hands out [`Entity`] handles and recycles despawned indices.
///
/// Recycled indices come back in FIFO order so generation churn is spread
/// across rows instead of piling onto the most recently freed one.
#[derive(Debug, Default)]
pub struct EntityAllocator {
    rows: Vec<RowMeta>,
    recycled: VecDeque<u32>,
    alive: usize,
}

impl EntityAllocator {
    /// Create an empty allocator.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a handle, reusing a recycled index when one is available.
    pub fn allocate(&mut self) -> Entity {
        self.alive += 1;
        if let Some(index) = self.recycled.pop_front() {
            let row = &mut self.rows[index as usize];
            row.alive = true;
            return Entity::new(index, row.generation);
        }
        let index = self.rows.len() as u32;
        self.rows.push(RowMeta {
            generation: 0,
            alive: true,
        });
        Entity::new(index, 0)
    }

    /// Release `entity`. Returns `false` if it was already dead or stale.
    pub fn deallocate(&mut self, entity: Entity) -> bool {
        if !self.is_alive(entity) {
            return false;
        }
        let row = &mut self.rows[entity.index() as usize];
        row.alive = false;
        row.generation = row.generation.wrapping_add(1);
        self.recycled.push_back(entity.index());
        self.alive -= 1;
        true
    }

    /// Whether `entity` is alive and its generation is current.
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.rows
            .get(entity.index() as usize)
            .is_some_and(|row| row.alive && row.generation == entity.generation())
    }

    /// Number of live entities.
    pub fn alive_count(&self) -> usize {
        self.alive
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_unique_indices() {
        let mut alloc = EntityAllocator::new();
        let mut indices: Vec<u32> = (0..64).map(|_| alloc.allocate().index()).collect();
        indices.sort();
        indices.dedup();
        assert_eq!(indices.len(), 64);
    }

    #[test]
    fn recycled_index_gets_new_generation() {
        let mut alloc = EntityAllocator::new();
        let e0 = alloc.allocate();
        assert!(alloc.deallocate(e0));
        let e1 = alloc.allocate();
        assert_eq!(e1.index(), e0.index());
        assert_eq!(e1.generation(), e0.generation() + 1);
        assert!(!alloc.is_alive(e0));
        assert!(alloc.is_alive(e1));
    }

    #[test]
    fn recycling_is_fifo() {
        let mut alloc = EntityAllocator::new();
        let a = alloc.allocate();
        let b = alloc.allocate();
        alloc.deallocate(a);
        alloc.deallocate(b);
        assert_eq!(alloc.allocate().index(), a.index());
        assert_eq!(alloc.allocate().index(), b.index());
    }

    #[test]
    fn double_deallocate_returns_false() {
        let mut alloc = EntityAllocator::new();
        let e = alloc.allocate();
        assert!(alloc.deallocate(e));
        assert!(!alloc.deallocate(e));
        assert_eq!(alloc.alive_count(), 0);
    }

    #[test]
    fn null_is_never_alive() {
        let mut alloc = EntityAllocator::new();
        alloc.allocate();
        assert!(!alloc.is_alive(Entity::NULL));
        assert_eq!(format!("{:?}", Entity::NULL), "Entity(null)");
    }
}
