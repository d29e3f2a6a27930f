use zerocopy::byteorder::{LittleEndian, U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::arena::Arena;
use crate::types::errors::StoreError;

//------------ Linked list nodes ---------------------------------------------

// The one structure family that mutates node fields in place: linking a
// node splices its neighbors' pointers. Handles stay honest across
// versions by carrying their own (head, tail, size) and by bounding every
// iteration with the size, but interior relinks are visible to old
// handles; callers wanting full persistence use the trie-backed
// structures instead. The value slot is eight bytes: an IEEE-754 double
// stored directly, or a packed word in the low half.

type U32LE = U32<LittleEndian>;
type U64LE = U64<LittleEndian>;

/// Both node records are 16 bytes; the family's free-list class.
pub(crate) const NODE_CLASS: u32 = 16;

#[derive(
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
#[repr(C)]
pub(crate) struct DlNode {
    pub prev: U32LE,
    pub next: U32LE,
    pub slot: U64LE,
}

#[derive(
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
#[repr(C)]
pub(crate) struct SlNode {
    pub next: U32LE,
    _pad: U32LE,
    pub slot: U64LE,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct DlEnds {
    pub head: u32,
    pub tail: u32,
}

//------------ Doubly linked -------------------------------------------------

fn alloc_dl(
    arena: &mut Arena,
    prev: u32,
    next: u32,
    slot: u64,
) -> Result<u32, StoreError> {
    let ptr = arena.alloc_fixed()?;
    let node = arena.node_mut::<DlNode>(ptr);
    node.prev.set(prev);
    node.next.set(next);
    node.slot.set(slot);
    Ok(ptr)
}

pub(crate) fn dl_slot(arena: &Arena, ptr: u32) -> u64 {
    arena.node::<DlNode>(ptr).slot.get()
}

pub(crate) fn dl_push_front(
    arena: &mut Arena,
    ends: DlEnds,
    slot: u64,
) -> Result<DlEnds, StoreError> {
    let ptr = alloc_dl(arena, 0, ends.head, slot)?;
    if ends.head != 0 {
        arena.node_mut::<DlNode>(ends.head).prev.set(ptr);
    }
    Ok(DlEnds {
        head: ptr,
        tail: if ends.tail == 0 { ptr } else { ends.tail },
    })
}

pub(crate) fn dl_push_back(
    arena: &mut Arena,
    ends: DlEnds,
    slot: u64,
) -> Result<DlEnds, StoreError> {
    let ptr = alloc_dl(arena, ends.tail, 0, slot)?;
    if ends.tail != 0 {
        arena.node_mut::<DlNode>(ends.tail).next.set(ptr);
    }
    Ok(DlEnds {
        head: if ends.head == 0 { ptr } else { ends.head },
        tail: ptr,
    })
}

pub(crate) fn dl_insert_after(
    arena: &mut Arena,
    ends: DlEnds,
    at: u32,
    slot: u64,
) -> Result<DlEnds, StoreError> {
    let next = arena.node::<DlNode>(at).next.get();
    let ptr = alloc_dl(arena, at, next, slot)?;
    arena.node_mut::<DlNode>(at).next.set(ptr);
    if next != 0 {
        arena.node_mut::<DlNode>(next).prev.set(ptr);
    }
    Ok(DlEnds {
        head: ends.head,
        tail: if ends.tail == at { ptr } else { ends.tail },
    })
}

pub(crate) fn dl_insert_before(
    arena: &mut Arena,
    ends: DlEnds,
    at: u32,
    slot: u64,
) -> Result<DlEnds, StoreError> {
    let prev = arena.node::<DlNode>(at).prev.get();
    let ptr = alloc_dl(arena, prev, at, slot)?;
    arena.node_mut::<DlNode>(at).prev.set(ptr);
    if prev != 0 {
        arena.node_mut::<DlNode>(prev).next.set(ptr);
    }
    Ok(DlEnds {
        head: if ends.head == at { ptr } else { ends.head },
        tail: ends.tail,
    })
}

pub(crate) fn dl_remove_first(arena: &mut Arena, ends: DlEnds) -> DlEnds {
    if ends.head == 0 {
        return ends;
    }
    let next = arena.node::<DlNode>(ends.head).next.get();
    if next != 0 {
        arena.node_mut::<DlNode>(next).prev.set(0);
        DlEnds {
            head: next,
            tail: ends.tail,
        }
    } else {
        DlEnds::default()
    }
}

pub(crate) fn dl_remove_last(arena: &mut Arena, ends: DlEnds) -> DlEnds {
    if ends.tail == 0 {
        return ends;
    }
    let prev = arena.node::<DlNode>(ends.tail).prev.get();
    if prev != 0 {
        arena.node_mut::<DlNode>(prev).next.set(0);
        DlEnds {
            head: ends.head,
            tail: prev,
        }
    } else {
        DlEnds::default()
    }
}

/// Unlinks an interior node. The node itself is left intact so that older
/// handles walking through it still find their way.
pub(crate) fn dl_remove_node(
    arena: &mut Arena,
    ends: DlEnds,
    at: u32,
) -> DlEnds {
    let (prev, next) = {
        let node = arena.node::<DlNode>(at);
        (node.prev.get(), node.next.get())
    };
    if prev != 0 {
        arena.node_mut::<DlNode>(prev).next.set(next);
    }
    if next != 0 {
        arena.node_mut::<DlNode>(next).prev.set(prev);
    }
    DlEnds {
        head: if ends.head == at { next } else { ends.head },
        tail: if ends.tail == at { prev } else { ends.tail },
    }
}

pub(crate) fn dl_node_at(arena: &Arena, head: u32, i: u32) -> Option<u32> {
    let mut cur = head;
    for _ in 0..i {
        if cur == 0 {
            return None;
        }
        cur = arena.node::<DlNode>(cur).next.get();
    }
    (cur != 0).then_some(cur)
}

pub(crate) fn dl_node_at_rev(
    arena: &Arena,
    tail: u32,
    i: u32,
) -> Option<u32> {
    let mut cur = tail;
    for _ in 0..i {
        if cur == 0 {
            return None;
        }
        cur = arena.node::<DlNode>(cur).prev.get();
    }
    (cur != 0).then_some(cur)
}

pub(crate) struct DlIter<'a> {
    arena: &'a Arena,
    cur: u32,
    remaining: u32,
    forward: bool,
}

pub(crate) fn dl_iter<'a>(
    arena: &'a Arena,
    start: u32,
    size: u32,
    forward: bool,
) -> DlIter<'a> {
    DlIter {
        arena,
        cur: start,
        remaining: size,
        forward,
    }
}

impl<'a> Iterator for DlIter<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.cur == 0 {
            return None;
        }
        let node = self.arena.node::<DlNode>(self.cur);
        let slot = node.slot.get();
        self.cur = if self.forward {
            node.next.get()
        } else {
            node.prev.get()
        };
        self.remaining -= 1;
        Some(slot)
    }
}

//------------ Singly linked -------------------------------------------------

pub(crate) fn sl_alloc(
    arena: &mut Arena,
    next: u32,
    slot: u64,
) -> Result<u32, StoreError> {
    let ptr = arena.alloc_fixed()?;
    let node = arena.node_mut::<SlNode>(ptr);
    node.next.set(next);
    node.slot.set(slot);
    Ok(ptr)
}

pub(crate) fn sl_next(arena: &Arena, ptr: u32) -> u32 {
    arena.node::<SlNode>(ptr).next.get()
}

pub(crate) fn sl_slot(arena: &Arena, ptr: u32) -> u64 {
    arena.node::<SlNode>(ptr).slot.get()
}

/// Appends behind `tail`, patching the old tail's link in place. The new
/// node is returned; the caller updates its ends.
pub(crate) fn sl_push_back(
    arena: &mut Arena,
    tail: u32,
    slot: u64,
) -> Result<u32, StoreError> {
    let ptr = sl_alloc(arena, 0, slot)?;
    if tail != 0 {
        arena.node_mut::<SlNode>(tail).next.set(ptr);
    }
    Ok(ptr)
}

pub(crate) struct SlIter<'a> {
    arena: &'a Arena,
    cur: u32,
    remaining: u32,
}

pub(crate) fn sl_iter<'a>(
    arena: &'a Arena,
    head: u32,
    size: u32,
) -> SlIter<'a> {
    SlIter {
        arena,
        cur: head,
        remaining: size,
    }
}

impl<'a> Iterator for SlIter<'a> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.cur == 0 {
            return None;
        }
        let node = self.arena.node::<SlNode>(self.cur);
        let slot = node.slot.get();
        self.cur = node.next.get();
        self.remaining -= 1;
        Some(slot)
    }
}
