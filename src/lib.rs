#![allow(clippy::type_complexity)]

//! A library of persistent (immutable) in-memory data structures whose
//! backing storage is a single contiguous byte arena, built to be handed
//! between the threads of one process without serialization.
//!
//! Every write returns a new handle; the old handle keeps observing the
//! version it was created from, by way of path copy on the write path and
//! structural sharing everywhere else. A second thread reconstructs views
//! over the same bytes (or a copy of them) from a small allocator snapshot,
//! see [`Snapshot`].

pub use arena::config::{ReleaseStrategy, StoreConfig};
pub use arena::root_slots::{RootSlots, NO_SLOT};
pub use arena::snapshot::{Snapshot, SnapshotMemory};
pub use arena::{AllocState, Arena, FamilyLayout};
pub use types::errors::StoreError;
pub use types::packed::PackedWord;
pub use types::value::{
    decode_structure, SortOrder, StructureKind, StructureRef, Value,
    ValueKind,
};

pub use shared::linked::{SharedDoublyLinkedList, SharedLinkedList};
pub use shared::map::{SharedMap, SharedSet};
pub use shared::ordered::{SharedOrderedMap, SharedOrderedSet};
pub use shared::pqueue::{PqBackend, SharedPriorityQueue};
pub use shared::sorted::{SharedSortedMap, SharedSortedSet, SortedKey};
pub use shared::stack_queue::{SharedQueue, SharedStack};
pub use shared::vec_list::SharedList;

pub mod arena;
pub mod types;

pub(crate) mod hamt;
pub(crate) mod linked_list;
pub(crate) mod ordered_map;
pub(crate) mod pqueue;
pub(crate) mod rb_tree;
pub(crate) mod vector_trie;

pub mod shared;
