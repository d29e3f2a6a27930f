// ----------- HAMT iterators ------------------------------------------------
//
// A single-pass walk over every leaf reachable from a root. The cursor is
// an explicit stack of (node, next child index, child count) frames; no
// recursion, no restart. Results are essentially unordered, like the trie
// itself. A fresh iterator from the root is the only way to start over.

use crate::arena::Arena;
use crate::hamt::{child_at, is_leaf, COLLISION_LEVEL};

pub(crate) struct LeafIter<'a> {
    arena: &'a Arena,
    // One frame per internal (or collision) node on the current path.
    stack: Vec<Frame>,
    // Set when the root itself is a leaf.
    root_leaf: Option<u32>,
}

struct Frame {
    node: u32,
    next: u32,
    count: u32,
}

pub(crate) fn leaves<'a>(arena: &'a Arena, root: u32) -> LeafIter<'a> {
    let mut it = LeafIter {
        arena,
        stack: Vec::new(),
        root_leaf: None,
    };
    if root == 0 {
        return it;
    }
    if is_leaf(arena, root) {
        it.root_leaf = Some(root);
    } else {
        it.stack.push(Frame {
            node: root,
            next: 0,
            count: arena.word(root).count_ones(),
        });
    }
    it
}

impl<'a> Iterator for LeafIter<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(leaf) = self.root_leaf.take() {
            return Some(leaf);
        }
        loop {
            let depth = self.stack.len() as u32;
            let frame = self.stack.last_mut()?;
            if frame.next >= frame.count {
                self.stack.pop();
                continue;
            }
            let child = child_at(self.arena, frame.node, frame.next);
            frame.next += 1;

            if is_leaf(self.arena, child) {
                return Some(child);
            }
            // The child's level equals the stack depth; at the collision
            // depth the first word is an entry count, everywhere else a
            // bitmap.
            let count = if depth >= COLLISION_LEVEL {
                self.arena.word(child)
            } else {
                self.arena.word(child).count_ones()
            };
            self.stack.push(Frame {
                node: child,
                next: 0,
                count,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::FamilyLayout;
    use crate::hamt::{insert, leaf_key};

    #[test]
    fn visits_every_leaf_exactly_once() {
        let mut a = Arena::new(FamilyLayout::keyed(0));
        let mut root = 0;
        for i in 0..500 {
            let k = a.stage_key(format!("it-{}", i).as_bytes()).unwrap();
            let v = a.stage_value(b"v").unwrap();
            let floor = a.get_heap_end();
            root = insert(&mut a, root, k, v, floor).unwrap().root;
        }
        let mut seen = std::collections::HashSet::new();
        for leaf in leaves(&a, root) {
            let key =
                String::from_utf8_lossy(leaf_key(&a, leaf)).into_owned();
            assert!(seen.insert(key));
        }
        assert_eq!(seen.len(), 500);
    }

    #[test]
    fn empty_and_single_leaf_roots() {
        let mut a = Arena::new(FamilyLayout::keyed(0));
        assert_eq!(leaves(&a, 0).count(), 0);
        let k = a.stage_key(b"only").unwrap();
        let v = a.stage_value(b"v").unwrap();
        let floor = a.get_heap_end();
        let root = insert(&mut a, 0, k, v, floor).unwrap().root;
        assert_eq!(leaves(&a, root).count(), 1);
    }
}
