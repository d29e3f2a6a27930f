use crate::arena::Arena;
use crate::pqueue::better;
use crate::types::errors::StoreError;
use crate::types::packed::PackedWord;

//------------ Leftist heap --------------------------------------------------

// A persistent mergeable heap. Every node keeps `rank(left) >= rank(right)`
// (the rank being the length of the rightmost spine), so merges recurse
// down the right side only and finish in O(log n). Every node a merge
// touches is reallocated; both input heaps remain valid versions.
//
// Node: [priority f64][value packed][rank][left][right], 24 bytes, the
// family's free-list class.

pub(crate) const NODE_CLASS: u32 = 24;

fn prio(arena: &Arena, ptr: u32) -> f64 {
    arena.float(ptr)
}

fn val(arena: &Arena, ptr: u32) -> PackedWord {
    PackedWord::from_bits(arena.word(ptr + 8))
}

fn rank(arena: &Arena, ptr: u32) -> u32 {
    if ptr == 0 {
        0
    } else {
        arena.word(ptr + 12)
    }
}

fn left(arena: &Arena, ptr: u32) -> u32 {
    arena.word(ptr + 16)
}

fn right(arena: &Arena, ptr: u32) -> u32 {
    arena.word(ptr + 20)
}

// Builds a node, swapping the children when the leftist condition asks
// for it.
fn mk(
    arena: &mut Arena,
    priority: f64,
    value: PackedWord,
    a: u32,
    b: u32,
) -> Result<u32, StoreError> {
    let (l, r) = if rank(arena, a) >= rank(arena, b) {
        (a, b)
    } else {
        (b, a)
    };
    let ptr = arena.alloc_fixed()?;
    arena.set_float(ptr, priority);
    arena.set_word(ptr + 8, value.bits());
    arena.set_word(ptr + 12, rank(arena, r) + 1);
    arena.set_word(ptr + 16, l);
    arena.set_word(ptr + 20, r);
    Ok(ptr)
}

pub(crate) fn merge(
    arena: &mut Arena,
    a: u32,
    b: u32,
    is_max: bool,
) -> Result<u32, StoreError> {
    if a == 0 {
        return Ok(b);
    }
    if b == 0 {
        return Ok(a);
    }
    let (top, other) =
        if better(prio(arena, b), prio(arena, a), is_max) {
            (b, a)
        } else {
            (a, b)
        };
    let (p, v, l, r) = (
        prio(arena, top),
        val(arena, top),
        left(arena, top),
        right(arena, top),
    );
    let merged = merge(arena, r, other, is_max)?;
    mk(arena, p, v, l, merged)
}

pub(crate) fn insert(
    arena: &mut Arena,
    root: u32,
    priority: f64,
    value: PackedWord,
    is_max: bool,
) -> Result<u32, StoreError> {
    let single = mk(arena, priority, value, 0, 0)?;
    merge(arena, root, single, is_max)
}

/// Removes the top. An empty heap stays empty.
pub(crate) fn extract(
    arena: &mut Arena,
    root: u32,
    is_max: bool,
) -> Result<u32, StoreError> {
    if root == 0 {
        return Ok(0);
    }
    merge(arena, left(arena, root), right(arena, root), is_max)
}

pub(crate) fn peek(
    arena: &Arena,
    root: u32,
) -> Option<(f64, PackedWord)> {
    (root != 0).then(|| (prio(arena, root), val(arena, root)))
}
