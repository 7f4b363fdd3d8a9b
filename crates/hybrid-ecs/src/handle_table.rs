//! Dense slot table pairing an external handle with a payload.
//!
//! A [`HandleTable`] keeps two parallel dense arrays, one of handles (usually
//! [`Entity`](crate::entity::Entity)) and one of payloads, and hands out a
//! [`SlotId`] for every pair added. Slot ids stay valid until released:
//! releasing never moves or shrinks the arrays, it only puts the index on a
//! free stack for the next [`add`](HandleTable::add) to reuse. Consumers can
//! therefore cache their id across frames.
//!
//! Each slot carries a generation that is bumped whenever the slot is reused,
//! so an id kept past its release is rejected instead of silently aliasing
//! the new occupant.
//!
//! # Parallel consumption
//!
//! [`par_for_each_mut`](HandleTable::par_for_each_mut) and
//! [`par_collect`](HandleTable::par_collect) split the dense index range
//! across rayon workers. Every worker owns a disjoint range, reads the handle
//! of each of its slots and touches at most that slot's payload; free slots
//! are skipped. Mutation of the table itself (`add`/`release`) needs
//! `&mut self` and so can never overlap a parallel pass.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::EcsError;

// ---------------------------------------------------------------------------
// SlotId
// ---------------------------------------------------------------------------

/// Stable id of an occupied slot.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId {
    index: u32,
    generation: u32,
}

impl SlotId {
    /// Dense array position.
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Reuse counter of the slot at the time the id was issued.
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SlotId({}v{})", self.index, self.generation)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.index, self.generation)
    }
}

// ---------------------------------------------------------------------------
// TableConfig
// ---------------------------------------------------------------------------

/// Sizing knobs for [`HandleTable`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    /// Slots to reserve up front.
    pub initial_capacity: usize,
    /// Smallest index range a single rayon task will be given.
    pub min_parallel_len: usize,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            initial_capacity: 128,
            min_parallel_len: 64,
        }
    }
}

// ---------------------------------------------------------------------------
// HandleTable
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct SlotState {
    generation: u32,
    live: bool,
}

/// Slot-recycling arena of `(handle, payload)` pairs.
///
/// Limits: slot indices are `u32`, so a table holds at most `u32::MAX`
/// slots. A slot whose generation reaches `u32::MAX` is retired on release
/// instead of returning to the free list, so a stale [`SlotId`] can never
/// match a later occupant.
#[derive(Debug)]
pub struct HandleTable<H, P> {
    handles: Vec<H>,
    payloads: Vec<P>,
    /// Parallel to `handles`.
    states: Vec<SlotState>,
    /// Released indices, most recent last.
    free: Vec<u32>,
    min_parallel_len: usize,
}

impl<H, P> HandleTable<H, P> {
    /// Create an empty table with default configuration.
    pub fn new() -> Self {
        Self::with_config(&TableConfig::default())
    }

    /// Create an empty table.
    pub fn with_config(config: &TableConfig) -> Self {
        Self {
            handles: Vec::with_capacity(config.initial_capacity),
            payloads: Vec::with_capacity(config.initial_capacity),
            states: Vec::with_capacity(config.initial_capacity),
            free: Vec::with_capacity(config.initial_capacity),
            min_parallel_len: config.min_parallel_len.max(1),
        }
    }

    /// Store `(handle, payload)` and return its slot id.
    ///
    /// Reuses the most recently released slot if there is one, otherwise
    /// appends; an appended slot's index equals the table length before the
    /// call.
    pub fn add(&mut self, handle: H, payload: P) -> SlotId {
        if let Some(index) = self.free.pop() {
            let i = index as usize;
            let state = &mut self.states[i];
            state.generation += 1;
            state.live = true;
            self.handles[i] = handle;
            self.payloads[i] = payload;
            return SlotId {
                index,
                generation: state.generation,
            };
        }

        let index = self.handles.len() as u32;
        self.handles.push(handle);
        self.payloads.push(payload);
        self.states.push(SlotState {
            generation: 0,
            live: true,
        });
        SlotId {
            index,
            generation: 0,
        }
    }

    /// Mark `id`'s slot free for reuse.
    ///
    /// The slot's handle and payload stay in place until the slot is reused.
    /// Releasing an id that was never issued, was issued for an earlier
    /// occupant, or is already free is an error and leaves the table
    /// untouched.
    pub fn release(&mut self, id: SlotId) -> Result<(), EcsError> {
        let state = self
            .states
            .get_mut(id.index as usize)
            .filter(|s| s.generation == id.generation)
            .ok_or(EcsError::StaleSlot { slot: id })?;
        if !state.live {
            return Err(EcsError::SlotAlreadyFree { slot: id });
        }
        state.live = false;
        if state.generation == u32::MAX {
            tracing::debug!(slot = %id, "slot generations exhausted, retiring slot");
        } else {
            self.free.push(id.index);
        }
        Ok(())
    }

    /// Whether `id` refers to the slot's current, unreleased occupant.
    pub fn is_live(&self, id: SlotId) -> bool {
        self.states
            .get(id.index as usize)
            .is_some_and(|s| s.live && s.generation == id.generation)
    }

    /// The pair stored under `id`, if `id` is live.
    pub fn get(&self, id: SlotId) -> Option<(&H, &P)> {
        if !self.is_live(id) {
            return None;
        }
        let i = id.index as usize;
        Some((&self.handles[i], &self.payloads[i]))
    }

    /// Handle stored under `id`, if `id` is live.
    pub fn handle(&self, id: SlotId) -> Option<&H> {
        self.get(id).map(|(h, _)| h)
    }

    /// Payload stored under `id`, if `id` is live.
    pub fn payload(&self, id: SlotId) -> Option<&P> {
        self.get(id).map(|(_, p)| p)
    }

    /// Mutable payload stored under `id`, if `id` is live.
    pub fn payload_mut(&mut self, id: SlotId) -> Option<&mut P> {
        if !self.is_live(id) {
            return None;
        }
        self.payloads.get_mut(id.index as usize)
    }

    /// Every handle in dense order, including stale ones in free slots.
    pub fn handles(&self) -> &[H] {
        &self.handles
    }

    /// Every payload in dense order, including stale ones in free slots.
    pub fn payloads(&self) -> &[P] {
        &self.payloads
    }

    /// Whether the slot at dense `index` is occupied.
    pub fn is_index_live(&self, index: usize) -> bool {
        self.states.get(index).is_some_and(|s| s.live)
    }

    /// Dense length. Never shrinks.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether nothing was ever added.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Number of occupied slots.
    pub fn live_count(&self) -> usize {
        self.handles.len() - self.free.len()
    }

    /// Number of slots waiting for reuse.
    pub fn free_count(&self) -> usize {
        self.free.len()
    }
}

impl<H: Clone, P> HandleTable<H, P> {
    /// Point-in-time copy of every handle in dense order.
    ///
    /// Free slots still report whatever handle they last held; callers that
    /// iterate this must check liveness themselves.
    pub fn snapshot_handles(&self) -> Vec<H> {
        self.handles.clone()
    }
}

impl<H: Sync, P: Send + Sync> HandleTable<H, P> {
    /// Run `f(index, handle, payload)` for every occupied slot in parallel.
    ///
    /// Returns how many calls reported `true` (for example, how many
    /// payloads were actually written).
    pub fn par_for_each_mut<F>(&mut self, f: F) -> usize
    where
        F: Fn(usize, &H, &mut P) -> bool + Sync + Send,
    {
        let states = &self.states;
        self.handles
            .par_iter()
            .zip(self.payloads.par_iter_mut())
            .enumerate()
            .with_min_len(self.min_parallel_len)
            .filter(|(i, _)| states[*i].live)
            .map(|(i, (handle, payload))| f(i, handle, payload))
            .filter(|touched| *touched)
            .count()
    }

    /// Map every occupied slot in parallel and collect the `Some` results in
    /// dense order.
    pub fn par_collect<R, F>(&self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize, &H, &P) -> Option<R> + Sync + Send,
    {
        let states = &self.states;
        self.handles
            .par_iter()
            .zip(self.payloads.par_iter())
            .enumerate()
            .with_min_len(self.min_parallel_len)
            .filter(|(i, _)| states[*i].live)
            .filter_map(|(i, (handle, payload))| f(i, handle, payload))
            .collect()
    }
}

impl<H, P> Default for HandleTable<H, P> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
