pub mod config;
pub mod root_slots;
pub mod snapshot;

use std::sync::Arc;

use log::{debug, trace};
use serde_derive::{Deserialize, Serialize};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::types::errors::StoreError;
use crate::types::packed::{PackedWord, LEN_MAX};
use crate::types::stats::Counters;
use config::StoreConfig;

//------------ Arena ---------------------------------------------------------

// One structure family owns one arena: a single contiguous byte region that
// is the only source of allocations for that family. The region is divided
// into three parts at fixed offsets: a key scratch, a blob scratch (the two
// staging areas a caller hands variable-length bytes through) and, from
// `heap_start` on, the node heap a bump cursor walks through.
//
// The layout constants are part of the attach contract: a worker that
// adopts an arena by bytes asks for them through `key_buf`/`blob_buf`
// instead of hard-coding offsets. The bump cursor and the free-list head
// are the whole of the allocator state; shipping them next to the bytes is
// all it takes for a second thread to pick up where the first left off.

/// Backing memory grows in pages of 64 KiB.
pub const PAGE_SIZE: u32 = 0x1_0000;

/// Where the staging regions and the node heap of a family live.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize,
)]
pub struct FamilyLayout {
    pub key_buf: u32,
    pub key_buf_size: u32,
    pub blob_buf: u32,
    pub blob_buf_size: u32,
    pub heap_start: u32,
    /// Size of the fixed node class this family releases onto its free
    /// list. Zero for families whose nodes are variable-size; those are
    /// only reclaimed by a whole-arena reset.
    pub node_class_size: u32,
}

impl FamilyLayout {
    /// Layout for families that take keys (map, ordered map, sorted map):
    /// key scratch at offset 0, blob scratch behind it.
    pub fn keyed(node_class_size: u32) -> Self {
        Self {
            key_buf: 0,
            key_buf_size: 1024,
            blob_buf: 1024,
            blob_buf_size: 4096,
            heap_start: PAGE_SIZE,
            node_class_size,
        }
    }

    /// Layout for keyless families (lists, heaps): only a blob scratch,
    /// at offset 0.
    pub fn plain(node_class_size: u32) -> Self {
        Self {
            key_buf: 0,
            key_buf_size: 0,
            blob_buf: 0,
            blob_buf_size: 4096,
            heap_start: PAGE_SIZE,
            node_class_size,
        }
    }
}

/// The allocator state that travels with a published arena.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize,
)]
pub struct AllocState {
    pub heap_end: u32,
    pub free_list: u32,
}

// The backing bytes: either owned outright, or adopted zero-copy from a
// publisher. A shared buffer turns into a private copy on the first local
// write, which is what makes local allocations invisible to everyone else.
#[derive(Clone, Debug)]
enum Buf {
    Owned(Vec<u8>),
    Shared(Arc<Vec<u8>>),
}

impl Buf {
    fn as_slice(&self) -> &[u8] {
        match self {
            Buf::Owned(v) => v,
            Buf::Shared(a) => a,
        }
    }

    fn make_mut(&mut self) -> &mut Vec<u8> {
        match self {
            Buf::Owned(v) => v,
            Buf::Shared(a) => Arc::make_mut(a),
        }
    }
}

#[derive(Debug)]
pub struct Arena {
    buf: Buf,
    layout: FamilyLayout,
    heap_end: u32,
    free_list: u32,
    generation: u32,
    counters: Counters,
    config: StoreConfig,
}

impl Arena {
    pub fn new(layout: FamilyLayout) -> Self {
        Self::with_config(layout, StoreConfig::default())
    }

    pub fn with_config(layout: FamilyLayout, config: StoreConfig) -> Self {
        let initial = layout
            .heap_start
            .max(config.initial_pages.saturating_mul(PAGE_SIZE))
            .next_multiple_of(PAGE_SIZE);
        Self {
            buf: Buf::Owned(vec![0; initial as usize]),
            layout,
            heap_end: layout.heap_start,
            free_list: 0,
            generation: 0,
            counters: Counters::default(),
            config,
        }
    }

    pub fn layout(&self) -> FamilyLayout {
        self.layout
    }

    pub fn config(&self) -> StoreConfig {
        self.config
    }

    /// Offset and size of the key staging region. Part of the attach
    /// contract; workers must ask, not assume.
    pub fn key_buf(&self) -> (u32, u32) {
        (self.layout.key_buf, self.layout.key_buf_size)
    }

    /// Offset and size of the value staging region.
    pub fn blob_buf(&self) -> (u32, u32) {
        (self.layout.blob_buf, self.layout.blob_buf_size)
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn get_heap_end(&self) -> u32 {
        self.heap_end
    }

    pub fn set_heap_end(&mut self, v: u32) {
        self.heap_end = v;
    }

    pub fn get_free_list(&self) -> u32 {
        self.free_list
    }

    pub fn set_free_list(&mut self, v: u32) {
        self.free_list = v;
    }

    pub fn alloc_state(&self) -> AllocState {
        AllocState {
            heap_end: self.heap_end,
            free_list: self.free_list,
        }
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    /// Moves the heap cursor back to the start of the heap, empties the
    /// free list and bumps the generation. Every handle issued before this
    /// call is stale afterwards: reads through it come back absent, writes
    /// hand out a fresh empty handle.
    pub fn reset(&mut self) {
        debug!(
            "arena: reset, retiring generation {} ({} bytes in use)",
            self.generation, self.heap_end
        );
        self.heap_end = self.layout.heap_start;
        self.free_list = 0;
        self.generation += 1;
        self.counters.inc_resets();
    }

    //--- attach -------------------------------------------------------------

    /// A copy of the in-use part of the backing memory, for publishing to
    /// another thread over whatever transport the host prefers.
    pub fn buffer_copy(&self) -> Vec<u8> {
        self.buf.as_slice()[..self.heap_end as usize].to_vec()
    }

    /// Rebuilds a worker-side arena from a byte copy plus the sender's
    /// allocator state. The result is independently writable.
    pub fn attach_to_buffer_copy(
        mut bytes: Vec<u8>,
        layout: FamilyLayout,
        state: AllocState,
        generation: u32,
    ) -> Self {
        let target = (bytes.len() as u32)
            .max(layout.heap_start)
            .max(state.heap_end)
            .next_multiple_of(PAGE_SIZE);
        bytes.resize(target as usize, 0);
        debug!(
            "arena: attached to a {} byte copy, heap_end {}",
            target, state.heap_end
        );
        Self {
            buf: Buf::Owned(bytes),
            layout,
            heap_end: state.heap_end,
            free_list: state.free_list,
            generation,
            counters: Counters::default(),
            config: StoreConfig::default(),
        }
    }

    /// Adopts shared backing memory zero-copy. Reads go straight to the
    /// shared bytes; the first local allocation clones them, so new
    /// versions built here stay invisible to other holders of the memory.
    pub fn attach_to_memory(
        mem: Arc<Vec<u8>>,
        layout: FamilyLayout,
        state: AllocState,
        generation: u32,
    ) -> Self {
        debug!(
            "arena: attached zero-copy, {} bytes, heap_end {}",
            mem.len(),
            state.heap_end
        );
        Self {
            buf: Buf::Shared(mem),
            layout,
            heap_end: state.heap_end,
            free_list: state.free_list,
            generation,
            counters: Counters::default(),
            config: StoreConfig::default(),
        }
    }

    /// Gives up ownership of the backing memory for zero-copy publishing.
    pub fn into_shared_memory(self) -> Arc<Vec<u8>> {
        match self.buf {
            Buf::Owned(v) => Arc::new(v),
            Buf::Shared(a) => a,
        }
    }

    //--- allocation ---------------------------------------------------------

    fn grow_to(&mut self, end: u32) -> Result<(), StoreError> {
        let cur = self.buf.as_slice().len() as u32;
        if end <= cur {
            return Ok(());
        }
        if let Some(cap) = self.config.max_bytes {
            if end > cap {
                return Err(StoreError::OutOfMemory);
            }
        }
        let new_len = (end as u64).next_multiple_of(PAGE_SIZE as u64);
        if new_len > u32::MAX as u64 {
            return Err(StoreError::OutOfMemory);
        }
        debug!("arena: growing backing memory {} -> {}", cur, new_len);
        let v = self.buf.make_mut();
        v.try_reserve_exact(new_len as usize - v.len())
            .map_err(|_| StoreError::OutOfMemory)?;
        v.resize(new_len as usize, 0);
        Ok(())
    }

    fn bump(&mut self, size: u32) -> Result<u32, StoreError> {
        let ptr = (self.heap_end + 7) & !7;
        let end = ptr.checked_add(size).ok_or(StoreError::OutOfMemory)?;
        self.grow_to(end)?;
        self.heap_end = end;
        Ok(ptr)
    }

    /// Allocates `size` bytes of zeroed, 8-byte-aligned node storage.
    pub(crate) fn alloc(&mut self, size: u32) -> Result<u32, StoreError> {
        let ptr = self.bump(size)?;
        // The cursor may be re-walking memory it covered before a reset.
        self.bytes_mut(ptr, size).fill(0);
        self.counters.inc_nodes_created();
        Ok(ptr)
    }

    /// Allocates one block of the family's fixed node class, reusing the
    /// free list when it has something for us.
    pub(crate) fn alloc_fixed(&mut self) -> Result<u32, StoreError> {
        let class = self.layout.node_class_size;
        if class != 0 && self.free_list != 0 {
            let ptr = self.free_list;
            self.free_list = self.word(ptr);
            self.bytes_mut(ptr, class).fill(0);
            self.counters.inc_free_list_reuses();
            trace!("arena: reused fixed block at {}", ptr);
            return Ok(ptr);
        }
        self.alloc(class)
    }

    /// Prepends a block of the family's fixed class to the free list. The
    /// block's first word becomes the list link.
    pub(crate) fn free_fixed(&mut self, ptr: u32) {
        if self.layout.node_class_size == 0 || ptr == 0 {
            return;
        }
        let head = self.free_list;
        self.set_word(ptr, head);
        self.free_list = ptr;
    }

    //--- staging ------------------------------------------------------------

    /// Copies the next key into the key scratch. Returns its length.
    pub(crate) fn stage_key(
        &mut self,
        bytes: &[u8],
    ) -> Result<u32, StoreError> {
        let (off, size) = self.key_buf();
        let len = bytes.len() as u64;
        if len > size as u64 || len > LEN_MAX as u64 {
            return Err(StoreError::BlobTooLarge);
        }
        self.bytes_mut(off, bytes.len() as u32).copy_from_slice(bytes);
        Ok(bytes.len() as u32)
    }

    /// Copies the next value payload into the blob scratch.
    pub(crate) fn stage_value(
        &mut self,
        bytes: &[u8],
    ) -> Result<u32, StoreError> {
        let (off, size) = self.blob_buf();
        let len = bytes.len() as u64;
        if len > size as u64 || len > LEN_MAX as u64 {
            return Err(StoreError::BlobTooLarge);
        }
        self.bytes_mut(off, bytes.len() as u32).copy_from_slice(bytes);
        Ok(bytes.len() as u32)
    }

    pub(crate) fn key_bytes(&self, len: u32) -> &[u8] {
        self.bytes(self.layout.key_buf, len)
    }

    pub(crate) fn value_bytes(&self, len: u32) -> &[u8] {
        self.bytes(self.layout.blob_buf, len)
    }

    /// Copies `len` staged key bytes out of the scratch into the heap and
    /// returns the packed reference.
    pub(crate) fn commit_key(
        &mut self,
        len: u32,
    ) -> Result<PackedWord, StoreError> {
        let src = self.layout.key_buf;
        self.commit_region(src, len)
    }

    /// Copies `len` staged value bytes out of the blob scratch into the
    /// heap and returns the packed reference.
    pub(crate) fn commit_value(
        &mut self,
        len: u32,
    ) -> Result<PackedWord, StoreError> {
        let src = self.layout.blob_buf;
        self.commit_region(src, len)
    }

    fn commit_region(
        &mut self,
        src: u32,
        len: u32,
    ) -> Result<PackedWord, StoreError> {
        // Empty payloads still get a distinct nonzero pointer, so the
        // packed word never collides with the absent sentinel.
        let ptr = self.bump(((len + 7) & !7).max(8))?;
        let word = PackedWord::new(ptr, len)?;
        self.copy_within(src, ptr, len);
        self.counters.inc_blobs_created();
        Ok(word)
    }

    pub(crate) fn copy_within(&mut self, src: u32, dst: u32, len: u32) {
        if len == 0 {
            return;
        }
        self.buf.make_mut().copy_within(
            src as usize..(src + len) as usize,
            dst as usize,
        );
    }

    //--- raw access ---------------------------------------------------------

    // Offsets handed to these come from nodes this arena allocated; an
    // out-of-range offset means the arena is corrupted and panicking is
    // the only honest answer.
    #[allow(clippy::indexing_slicing)]
    pub(crate) fn bytes(&self, off: u32, len: u32) -> &[u8] {
        &self.buf.as_slice()[off as usize..(off + len) as usize]
    }

    #[allow(clippy::indexing_slicing)]
    pub(crate) fn bytes_mut(&mut self, off: u32, len: u32) -> &mut [u8] {
        &mut self.buf.make_mut()[off as usize..(off + len) as usize]
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn word(&self, off: u32) -> u32 {
        // Cannot fail: the slice is exactly four bytes.
        u32::from_le_bytes(self.bytes(off, 4).try_into().unwrap())
    }

    pub(crate) fn set_word(&mut self, off: u32, w: u32) {
        self.bytes_mut(off, 4).copy_from_slice(&w.to_le_bytes());
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn quad(&self, off: u32) -> u64 {
        // Cannot fail: the slice is exactly eight bytes.
        u64::from_le_bytes(self.bytes(off, 8).try_into().unwrap())
    }

    pub(crate) fn set_quad(&mut self, off: u32, v: u64) {
        self.bytes_mut(off, 8).copy_from_slice(&v.to_le_bytes());
    }

    pub(crate) fn float(&self, off: u32) -> f64 {
        f64::from_bits(self.quad(off))
    }

    pub(crate) fn set_float(&mut self, off: u32, v: f64) {
        self.set_quad(off, v.to_bits());
    }

    pub(crate) fn blob(&self, w: PackedWord) -> &[u8] {
        self.bytes(w.ptr(), w.len())
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn node<T>(&self, off: u32) -> &T
    where
        T: FromBytes + KnownLayout + Immutable + Unaligned,
    {
        // Cannot fail: the slice length is exactly T's size and T has no
        // alignment requirement.
        T::ref_from_bytes(self.bytes(off, size_of::<T>() as u32)).unwrap()
    }

    #[allow(clippy::unwrap_used)]
    pub(crate) fn node_mut<T>(&mut self, off: u32) -> &mut T
    where
        T: FromBytes + IntoBytes + KnownLayout + Unaligned,
    {
        // Cannot fail, as per `node`.
        T::mut_from_bytes(self.bytes_mut(off, size_of::<T>() as u32))
            .unwrap()
    }
}
