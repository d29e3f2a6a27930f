use std::sync::Arc;

use log::debug;

use crate::arena::{AllocState, Arena, FamilyLayout};
use crate::types::value::StructureRef;

//------------ Snapshot ------------------------------------------------------

// The bytes that cross a thread boundary: the backing memory (or a copy of
// it), the allocator state for the family, and the handles the publisher
// wants the subscriber to see. The transport is the host's business; this
// type only pins down *what* must travel. The host transport has to give
// us a happens-before edge between the publisher's last write and the
// subscriber's first read; moving the snapshot through a channel does.

#[derive(Clone, Debug)]
pub enum SnapshotMemory {
    /// An independent byte copy. Attaching yields a writable arena.
    Copy(Vec<u8>),
    /// The publisher's own buffer, zero-copy. Attaching yields an arena
    /// that reads the shared bytes and clones them on its first local
    /// write.
    Shared(Arc<Vec<u8>>),
}

#[derive(Clone, Debug)]
pub struct Snapshot {
    memory: SnapshotMemory,
    layout: FamilyLayout,
    alloc: AllocState,
    generation: u32,
    structures: Vec<(String, StructureRef)>,
}

impl Snapshot {
    /// Publishes a byte copy of the arena together with the given handles.
    /// The publisher keeps writing into its own arena afterwards.
    pub fn copy_of(
        arena: &Arena,
        structures: Vec<(String, StructureRef)>,
    ) -> Self {
        let memory = arena.buffer_copy();
        debug!(
            "snapshot: publishing a {} byte copy with {} structures",
            memory.len(),
            structures.len()
        );
        Self {
            memory: SnapshotMemory::Copy(memory),
            layout: arena.layout(),
            alloc: arena.alloc_state(),
            generation: arena.generation(),
            structures,
        }
    }

    /// Publishes the arena's own buffer zero-copy, consuming the arena:
    /// the epoch is quiesced and nobody writes these bytes again. A
    /// publisher that wants to continue writing attaches to the snapshot
    /// itself like any other subscriber.
    pub fn shared_from(
        arena: Arena,
        structures: Vec<(String, StructureRef)>,
    ) -> Self {
        let layout = arena.layout();
        let alloc = arena.alloc_state();
        let generation = arena.generation();
        let memory = arena.into_shared_memory();
        debug!(
            "snapshot: publishing {} shared bytes with {} structures",
            memory.len(),
            structures.len()
        );
        Self {
            memory: SnapshotMemory::Shared(memory),
            layout,
            alloc,
            generation,
            structures,
        }
    }

    pub fn alloc_state(&self) -> AllocState {
        self.alloc
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn layout(&self) -> FamilyLayout {
        self.layout
    }

    pub fn structures(&self) -> &[(String, StructureRef)] {
        &self.structures
    }

    /// Instantiates a worker-side view: an arena aligned with the
    /// publisher's allocator state, plus the published handles.
    pub fn attach(self) -> (Arena, Vec<(String, StructureRef)>) {
        let arena = match self.memory {
            SnapshotMemory::Copy(bytes) => Arena::attach_to_buffer_copy(
                bytes,
                self.layout,
                self.alloc,
                self.generation,
            ),
            SnapshotMemory::Shared(mem) => Arena::attach_to_memory(
                mem,
                self.layout,
                self.alloc,
                self.generation,
            ),
        };
        (arena, self.structures)
    }
}
