use std::collections::HashMap;

use log::{debug, trace};
use roaring::RoaringBitmap;

use crate::arena::config::ReleaseStrategy;
use crate::arena::Arena;

//------------ RootSlots -----------------------------------------------------

// An auxiliary table of root pointers that lets a caller release individual
// versions of a structure ahead of a full reset. Registration is optional;
// a structure whose roots never sit in a slot is still fully usable, it is
// just not individually freeable.
//
// The table guards itself against resets with the arena generation: the
// first call after a reset finds the stale generation and throws the whole
// table away, since every pointer it held died with the old heap.

/// Returned by `register` when the table is exhausted.
pub const NO_SLOT: u32 = u32::MAX;

#[derive(Debug)]
pub struct RootSlots {
    slots: Vec<u32>,
    free: RoaringBitmap,
    // How many slots currently hold each pointer. Only the last slot to
    // let go of a pointer queues it for release.
    refs: HashMap<u32, u32>,
    pending: Vec<u32>,
    generation: u32,
    capacity: u32,
}

impl RootSlots {
    pub fn new(arena: &Arena, capacity: u32) -> Self {
        let mut free = RoaringBitmap::new();
        free.insert_range(0..capacity);
        Self {
            slots: vec![0; capacity as usize],
            free,
            refs: HashMap::new(),
            pending: Vec::new(),
            generation: arena.generation(),
            capacity,
        }
    }

    /// Puts a root into a slot, returning the slot id, or [`NO_SLOT`] when
    /// every slot is taken.
    pub fn register(&mut self, arena: &Arena, ptr: u32) -> u32 {
        self.sync_generation(arena);
        let Some(slot) = self.free.min() else {
            return NO_SLOT;
        };
        self.free.remove(slot);
        self.slots[slot as usize] = ptr;
        *self.refs.entry(ptr).or_insert(0) += 1;
        trace!("root_slots: registered {} in slot {}", ptr, slot);
        slot
    }

    pub fn get(&self, slot: u32) -> Option<u32> {
        if slot == NO_SLOT || self.free.contains(slot) {
            return None;
        }
        self.slots.get(slot as usize).copied()
    }

    /// Swaps a new root into the slot. The pointer it held before becomes
    /// a release candidate once no other slot holds it; whether it is
    /// released now is up to the configured strategy.
    pub fn update(&mut self, arena: &mut Arena, slot: u32, new_ptr: u32) {
        self.sync_generation(arena);
        if slot == NO_SLOT || self.free.contains(slot) {
            return;
        }
        let old = self.slots[slot as usize];
        self.drop_ref(old);
        self.slots[slot as usize] = new_ptr;
        *self.refs.entry(new_ptr).or_insert(0) += 1;
        self.maybe_auto_release(arena);
    }

    /// Makes the slot available again; the pointer it held is dropped and,
    /// if this was its last slot, queued for release.
    pub fn unregister(&mut self, arena: &mut Arena, slot: u32) {
        self.sync_generation(arena);
        if slot == NO_SLOT || self.free.contains(slot) {
            return;
        }
        let old = self.slots[slot as usize];
        self.drop_ref(old);
        self.slots[slot as usize] = 0;
        self.free.insert(slot);
        self.maybe_auto_release(arena);
    }

    /// Hands every pending root's fixed-size top-level block back to the
    /// arena's free list. Pointers that were re-registered since they were
    /// queued are skipped.
    pub fn release_pending(&mut self, arena: &mut Arena) {
        self.sync_generation(arena);
        if self.pending.is_empty() {
            return;
        }
        debug!(
            "root_slots: releasing {} pending roots",
            self.pending.len()
        );
        for ptr in std::mem::take(&mut self.pending) {
            if self.refs.get(&ptr).copied().unwrap_or(0) == 0 {
                arena.free_fixed(ptr);
            }
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn occupied_len(&self) -> u32 {
        self.capacity - self.free.len() as u32
    }

    fn drop_ref(&mut self, ptr: u32) {
        if ptr == 0 {
            return;
        }
        if let Some(n) = self.refs.get_mut(&ptr) {
            *n -= 1;
            if *n == 0 {
                self.refs.remove(&ptr);
                self.pending.push(ptr);
            }
        }
    }

    fn maybe_auto_release(&mut self, arena: &mut Arena) {
        if let ReleaseStrategy::Auto {
            ops_threshold,
            memory_threshold,
        } = arena.config().release_strategy
        {
            if self.pending.len() >= ops_threshold as usize
                || arena.get_heap_end() > memory_threshold
            {
                self.release_pending(arena);
            }
        }
    }

    // A reset killed every pointer in here. Start over on the new
    // generation.
    fn sync_generation(&mut self, arena: &Arena) {
        if self.generation == arena.generation() {
            return;
        }
        debug!(
            "root_slots: stale generation {} (arena at {}), dropping all \
            slots",
            self.generation,
            arena.generation()
        );
        self.slots.iter_mut().for_each(|s| *s = 0);
        self.free.clear();
        self.free.insert_range(0..self.capacity);
        self.refs.clear();
        self.pending.clear();
        self.generation = arena.generation();
    }
}
