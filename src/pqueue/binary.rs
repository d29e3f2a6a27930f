use log::trace;

use crate::arena::Arena;
use crate::pqueue::better;
use crate::types::errors::StoreError;
use crate::types::packed::PackedWord;

//------------ Binary heap ---------------------------------------------------

// The in-place variant: [capacity][size][(priority f64, value, pad) x
// capacity], sifted up and down inside one block. Not persistent: inserts
// and extracts mutate the block, and a full heap is abandoned in place
// when it doubles (the old region comes back only with a reset). Offered
// because flat sifting beats pointer chasing by a wide margin on large
// queues; callers who need version semantics use the leftist engine.

const HDR: u32 = 8;
const ENTRY: u32 = 16;

pub(crate) fn create(arena: &mut Arena, cap: u32) -> Result<u32, StoreError> {
    let cap = cap.max(1);
    let ptr = arena.alloc(HDR + ENTRY * cap)?;
    arena.set_word(ptr, cap);
    Ok(ptr)
}

pub(crate) fn len(arena: &Arena, heap: u32) -> u32 {
    arena.word(heap + 4)
}

fn entry(arena: &Arena, heap: u32, i: u32) -> (f64, u32) {
    let off = heap + HDR + ENTRY * i;
    (arena.float(off), arena.word(off + 8))
}

fn set_entry(arena: &mut Arena, heap: u32, i: u32, prio: f64, val: u32) {
    let off = heap + HDR + ENTRY * i;
    arena.set_float(off, prio);
    arena.set_word(off + 8, val);
}

/// Pushes an entry, doubling into a fresh block when full. Returns the
/// heap pointer, which moves on growth; the old block is orphaned.
pub(crate) fn insert(
    arena: &mut Arena,
    heap: u32,
    priority: f64,
    value: PackedWord,
    is_max: bool,
) -> Result<u32, StoreError> {
    let cap = arena.word(heap);
    let size = len(arena, heap);
    let heap = if size == cap {
        trace!("binary heap: growing {} -> {} entries", cap, cap * 2);
        let new = arena.alloc(HDR + ENTRY * cap * 2)?;
        arena.set_word(new, cap * 2);
        arena.set_word(new + 4, size);
        arena.copy_within(heap + HDR, new + HDR, ENTRY * size);
        new
    } else {
        heap
    };
    set_entry(arena, heap, size, priority, value.bits());
    arena.set_word(heap + 4, size + 1);
    sift_up(arena, heap, size, is_max);
    Ok(heap)
}

/// Drops the top entry in place. Empty heaps stay empty.
pub(crate) fn extract(arena: &mut Arena, heap: u32, is_max: bool) {
    let size = len(arena, heap);
    if size == 0 {
        return;
    }
    let (lp, lv) = entry(arena, heap, size - 1);
    arena.set_word(heap + 4, size - 1);
    if size > 1 {
        set_entry(arena, heap, 0, lp, lv);
        sift_down(arena, heap, 0, is_max);
    }
}

pub(crate) fn peek(
    arena: &Arena,
    heap: u32,
) -> Option<(f64, PackedWord)> {
    if len(arena, heap) == 0 {
        return None;
    }
    let (p, v) = entry(arena, heap, 0);
    Some((p, PackedWord::from_bits(v)))
}

fn sift_up(arena: &mut Arena, heap: u32, mut i: u32, is_max: bool) {
    while i > 0 {
        let parent = (i - 1) / 2;
        let (pi, vi) = entry(arena, heap, i);
        let (pp, vp) = entry(arena, heap, parent);
        if !better(pi, pp, is_max) {
            break;
        }
        set_entry(arena, heap, i, pp, vp);
        set_entry(arena, heap, parent, pi, vi);
        i = parent;
    }
}

fn sift_down(arena: &mut Arena, heap: u32, mut i: u32, is_max: bool) {
    let size = len(arena, heap);
    loop {
        let l = 2 * i + 1;
        let r = 2 * i + 2;
        let mut best = i;
        let (mut pb, _) = entry(arena, heap, best);
        if l < size {
            let (pl, _) = entry(arena, heap, l);
            if better(pl, pb, is_max) {
                best = l;
                pb = pl;
            }
        }
        if r < size {
            let (pr, _) = entry(arena, heap, r);
            if better(pr, pb, is_max) {
                best = r;
            }
        }
        if best == i {
            break;
        }
        let (pi, vi) = entry(arena, heap, i);
        let (pn, vn) = entry(arena, heap, best);
        set_entry(arena, heap, i, pn, vn);
        set_entry(arena, heap, best, pi, vi);
        i = best;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::FamilyLayout;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn arena() -> Arena {
        Arena::new(FamilyLayout::plain(0))
    }

    #[test]
    fn drains_in_priority_order_through_growth() {
        let mut a = arena();
        let mut heap = create(&mut a, 4).unwrap();
        let mut rng = StdRng::seed_from_u64(23);
        for _ in 0..200 {
            let p: f64 = rng.random_range(0.0..100.0);
            heap =
                insert(&mut a, heap, p, PackedWord::ABSENT, false).unwrap();
        }
        assert_eq!(len(&a, heap), 200);
        let mut last = f64::NEG_INFINITY;
        while let Some((p, _)) = peek(&a, heap) {
            assert!(p >= last);
            last = p;
            extract(&mut a, heap, false);
        }
        assert_eq!(len(&a, heap), 0);
        // Extracting from empty is a no-op.
        extract(&mut a, heap, false);
        assert_eq!(len(&a, heap), 0);
    }

    #[test]
    fn max_direction_flips_the_order() {
        let mut a = arena();
        let mut heap = create(&mut a, 2).unwrap();
        for p in [1.0, 3.0, 2.0] {
            heap =
                insert(&mut a, heap, p, PackedWord::ABSENT, true).unwrap();
        }
        assert_eq!(peek(&a, heap).unwrap().0, 3.0);
        extract(&mut a, heap, true);
        assert_eq!(peek(&a, heap).unwrap().0, 2.0);
    }
}
