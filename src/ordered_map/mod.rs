use log::trace;

use crate::arena::Arena;
use crate::hamt::{
    alloc_internal, child_at, child_slot, hash_key, slice, COLLISION_LEVEL,
};
use crate::types::errors::StoreError;

//------------ Insertion-ordered map -----------------------------------------

// A HAMT keyed on the key hash whose logical leaves are doubly-linked list
// nodes, threaded in insertion order. The trie's "leaf" slot is a two-word
// sentinel [0, nodePtr]; the payload (hash, lens, key bytes, value bytes)
// lives in the list node itself. Iteration follows the thread from head to
// tail, so it comes out in insertion order; lookups go through the trie.
//
// The trie side is path copy like the plain HAMT, so membership and values
// stay correct on old roots. The thread is made of linked-list nodes and is
// spliced in place; that is the documented in-place surface of this
// family. Replacing a key's value allocates a fresh node and splices it
// into the same position, which is why an update never moves a key to the
// end.

// List node: [prev][next][hash][key_len | val_len << 16][key][val].
const NODE_HDR: u32 = 16;

fn node_prev(arena: &Arena, ptr: u32) -> u32 {
    arena.word(ptr)
}

pub(crate) fn node_next(arena: &Arena, ptr: u32) -> u32 {
    arena.word(ptr + 4)
}

fn node_hash(arena: &Arena, ptr: u32) -> u32 {
    arena.word(ptr + 8)
}

fn node_lens(arena: &Arena, ptr: u32) -> (u32, u32) {
    let w = arena.word(ptr + 12);
    (w & 0xFFFF, w >> 16)
}

pub(crate) fn node_key(arena: &Arena, ptr: u32) -> &[u8] {
    let (key_len, _) = node_lens(arena, ptr);
    arena.bytes(ptr + NODE_HDR, key_len)
}

pub(crate) fn node_val(arena: &Arena, ptr: u32) -> &[u8] {
    let (key_len, val_len) = node_lens(arena, ptr);
    arena.bytes(ptr + NODE_HDR + key_len, val_len)
}

fn alloc_node(
    arena: &mut Arena,
    hash: u32,
    key: &[u8],
    val: &[u8],
) -> Result<u32, StoreError> {
    let key_len = key.len() as u32;
    let val_len = val.len() as u32;
    let ptr = arena.alloc(NODE_HDR + key_len + val_len)?;
    arena.set_word(ptr + 8, hash);
    arena.set_word(ptr + 12, key_len | (val_len << 16));
    arena.bytes_mut(ptr + NODE_HDR, key_len).copy_from_slice(key);
    arena
        .bytes_mut(ptr + NODE_HDR + key_len, val_len)
        .copy_from_slice(val);
    Ok(ptr)
}

// Sentinel leaf in the trie: [0][list node].
fn alloc_sentinel(arena: &mut Arena, node: u32) -> Result<u32, StoreError> {
    let ptr = arena.alloc(8)?;
    arena.set_word(ptr + 4, node);
    Ok(ptr)
}

fn sentinel_node(arena: &Arena, sent: u32) -> u32 {
    arena.word(sent + 4)
}

fn is_sentinel(arena: &Arena, ptr: u32) -> bool {
    arena.word(ptr) == 0
}

//------------ State ---------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub(crate) struct OmState {
    pub root: u32,
    pub head: u32,
    pub tail: u32,
}

pub(crate) struct OmOutcome {
    pub state: OmState,
    pub inserted: bool,
}

//------------ Set -----------------------------------------------------------

/// Inserts or replaces the staged key and value. A replaced key keeps its
/// position in the thread; a new key is appended at the tail.
pub(crate) fn set(
    arena: &mut Arena,
    st: OmState,
    key_len: u32,
    val_len: u32,
) -> Result<OmOutcome, StoreError> {
    let key = arena.key_bytes(key_len).to_vec();
    let val = arena.value_bytes(val_len).to_vec();
    let hash = hash_key(&key);

    let new_node = alloc_node(arena, hash, &key, &val)?;
    let new_sent = alloc_sentinel(arena, new_node)?;
    let (root, replaced) =
        ins_rec(arena, st.root, 0, hash, &key, new_sent)?;

    if let Some(old) = replaced {
        // Splice the fresh node into the old one's position.
        let (prev, next) = (node_prev(arena, old), node_next(arena, old));
        arena.set_word(new_node, prev);
        arena.set_word(new_node + 4, next);
        if prev != 0 {
            arena.set_word(prev + 4, new_node);
        }
        if next != 0 {
            arena.set_word(next, new_node);
        }
        let head = if st.head == old { new_node } else { st.head };
        let tail = if st.tail == old { new_node } else { st.tail };
        Ok(OmOutcome {
            state: OmState { root, head, tail },
            inserted: false,
        })
    } else {
        // Append at the tail of the thread.
        arena.set_word(new_node, st.tail);
        if st.tail != 0 {
            arena.set_word(st.tail + 4, new_node);
        }
        let head = if st.head == 0 { new_node } else { st.head };
        Ok(OmOutcome {
            state: OmState {
                root,
                head,
                tail: new_node,
            },
            inserted: true,
        })
    }
}

// Returns the new trie and, when the key already existed, the list node
// the replaced sentinel pointed at.
fn ins_rec(
    arena: &mut Arena,
    node: u32,
    level: u32,
    hash: u32,
    key: &[u8],
    new_sent: u32,
) -> Result<(u32, Option<u32>), StoreError> {
    if node == 0 {
        return Ok((new_sent, None));
    }

    if level >= COLLISION_LEVEL {
        return ins_collision_depth(arena, node, key, new_sent);
    }

    if is_sentinel(arena, node) {
        let entry = sentinel_node(arena, node);
        if node_hash(arena, entry) == hash && node_key(arena, entry) == key
        {
            return Ok((new_sent, Some(entry)));
        }
        trace!("ordered_map: splitting sentinel at level {}", level);
        let old_hash = node_hash(arena, entry);
        let root =
            split(arena, level, new_sent, hash, node, old_hash)?;
        return Ok((root, None));
    }

    let bitmap = arena.word(node);
    let bit = 1 << slice(hash, level);
    let idx = child_slot(bitmap, bit);
    let n = bitmap.count_ones();
    let mut children: Vec<u32> =
        (0..n).map(|i| child_at(arena, node, i)).collect();
    if bitmap & bit != 0 {
        let (child, replaced) = ins_rec(
            arena,
            children[idx as usize],
            level + 1,
            hash,
            key,
            new_sent,
        )?;
        children[idx as usize] = child;
        let root = alloc_internal(arena, bitmap, &children)?;
        Ok((root, replaced))
    } else {
        children.insert(idx as usize, new_sent);
        let root = alloc_internal(arena, bitmap | bit, &children)?;
        Ok((root, None))
    }
}

fn ins_collision_depth(
    arena: &mut Arena,
    node: u32,
    key: &[u8],
    new_sent: u32,
) -> Result<(u32, Option<u32>), StoreError> {
    if is_sentinel(arena, node) {
        let entry = sentinel_node(arena, node);
        if node_key(arena, entry) == key {
            return Ok((new_sent, Some(entry)));
        }
        let ptr = arena.alloc(12)?;
        arena.set_word(ptr, 2);
        arena.set_word(ptr + 4, node);
        arena.set_word(ptr + 8, new_sent);
        return Ok((ptr, None));
    }

    let count = arena.word(node);
    let mut entries: Vec<u32> =
        (0..count).map(|i| child_at(arena, node, i)).collect();
    let existing = entries.iter().position(|&s| {
        node_key(arena, sentinel_node(arena, s)) == key
    });
    let replaced = existing.map(|i| {
        let old = sentinel_node(arena, entries[i]);
        entries[i] = new_sent;
        old
    });
    if replaced.is_none() {
        entries.push(new_sent);
    }
    let ptr = arena.alloc(4 + 4 * entries.len() as u32)?;
    arena.set_word(ptr, entries.len() as u32);
    for (i, s) in entries.iter().enumerate() {
        arena.set_word(ptr + 4 + 4 * i as u32, *s);
    }
    Ok((ptr, replaced))
}

fn split(
    arena: &mut Arena,
    level: u32,
    new_sent: u32,
    new_hash: u32,
    old_sent: u32,
    old_hash: u32,
) -> Result<u32, StoreError> {
    if level >= COLLISION_LEVEL {
        let ptr = arena.alloc(12)?;
        arena.set_word(ptr, 2);
        arena.set_word(ptr + 4, old_sent);
        arena.set_word(ptr + 8, new_sent);
        return Ok(ptr);
    }
    let s_new = slice(new_hash, level);
    let s_old = slice(old_hash, level);
    if s_new == s_old {
        let child = split(
            arena,
            level + 1,
            new_sent,
            new_hash,
            old_sent,
            old_hash,
        )?;
        alloc_internal(arena, 1 << s_new, &[child])
    } else {
        let bitmap = (1 << s_new) | (1 << s_old);
        let children = if s_new < s_old {
            [new_sent, old_sent]
        } else {
            [old_sent, new_sent]
        };
        alloc_internal(arena, bitmap, &children)
    }
}

//------------ Lookup --------------------------------------------------------

/// Finds the list node holding a key. Reads take the key bytes directly;
/// only writes go through the staging regions.
pub(crate) fn get(arena: &Arena, root: u32, key: &[u8]) -> Option<u32> {
    let hash = hash_key(key);
    let mut node = root;
    let mut level = 0;
    loop {
        if node == 0 {
            return None;
        }
        if is_sentinel(arena, node) {
            let entry = sentinel_node(arena, node);
            return (node_hash(arena, entry) == hash
                && node_key(arena, entry) == key)
                .then_some(entry);
        }
        if level >= COLLISION_LEVEL {
            let count = arena.word(node);
            return (0..count)
                .map(|i| sentinel_node(arena, child_at(arena, node, i)))
                .find(|&e| node_key(arena, e) == key);
        }
        let bitmap = arena.word(node);
        let bit = 1 << slice(hash, level);
        if bitmap & bit == 0 {
            return None;
        }
        node = child_at(arena, node, child_slot(bitmap, bit));
        level += 1;
    }
}

//------------ Remove --------------------------------------------------------

enum Removed {
    NotFound,
    Gone { subtree: u32, node: u32 },
}

/// Deletes the staged key: rebuilds the trie without it and unlinks its
/// list node from the thread. `None` when the key was absent.
pub(crate) fn remove(
    arena: &mut Arena,
    st: OmState,
    key_len: u32,
) -> Result<Option<OmState>, StoreError> {
    let key = arena.key_bytes(key_len).to_vec();
    let hash = hash_key(&key);
    match rem_rec(arena, st.root, 0, hash, &key)? {
        Removed::NotFound => Ok(None),
        Removed::Gone { subtree, node } => {
            let (prev, next) =
                (node_prev(arena, node), node_next(arena, node));
            if prev != 0 {
                arena.set_word(prev + 4, next);
            }
            if next != 0 {
                arena.set_word(next, prev);
            }
            let head = if st.head == node { next } else { st.head };
            let tail = if st.tail == node { prev } else { st.tail };
            Ok(Some(OmState {
                root: subtree,
                head,
                tail,
            }))
        }
    }
}

fn rem_rec(
    arena: &mut Arena,
    node: u32,
    level: u32,
    hash: u32,
    key: &[u8],
) -> Result<Removed, StoreError> {
    if node == 0 {
        return Ok(Removed::NotFound);
    }

    if is_sentinel(arena, node) {
        let entry = sentinel_node(arena, node);
        if node_hash(arena, entry) == hash && node_key(arena, entry) == key
        {
            return Ok(Removed::Gone {
                subtree: 0,
                node: entry,
            });
        }
        return Ok(Removed::NotFound);
    }

    if level >= COLLISION_LEVEL {
        let count = arena.word(node);
        let entries: Vec<u32> =
            (0..count).map(|i| child_at(arena, node, i)).collect();
        let Some(i) = entries.iter().position(|&s| {
            node_key(arena, sentinel_node(arena, s)) == key
        }) else {
            return Ok(Removed::NotFound);
        };
        let removed = sentinel_node(arena, entries[i]);
        if count == 2 {
            return Ok(Removed::Gone {
                subtree: entries[1 - i],
                node: removed,
            });
        }
        let mut rest = entries;
        rest.remove(i);
        let ptr = arena.alloc(4 + 4 * rest.len() as u32)?;
        arena.set_word(ptr, rest.len() as u32);
        for (j, s) in rest.iter().enumerate() {
            arena.set_word(ptr + 4 + 4 * j as u32, *s);
        }
        return Ok(Removed::Gone {
            subtree: ptr,
            node: removed,
        });
    }

    let bitmap = arena.word(node);
    let bit = 1 << slice(hash, level);
    if bitmap & bit == 0 {
        return Ok(Removed::NotFound);
    }
    let idx = child_slot(bitmap, bit);
    let child = child_at(arena, node, idx);

    match rem_rec(arena, child, level + 1, hash, key)? {
        Removed::NotFound => Ok(Removed::NotFound),
        Removed::Gone {
            subtree: 0,
            node: removed,
        } => {
            let new_bitmap = bitmap & !bit;
            if new_bitmap == 0 {
                return Ok(Removed::Gone {
                    subtree: 0,
                    node: removed,
                });
            }
            let n = bitmap.count_ones();
            let mut children: Vec<u32> =
                (0..n).map(|i| child_at(arena, node, i)).collect();
            children.remove(idx as usize);
            if children.len() == 1 && is_sentinel(arena, children[0]) {
                return Ok(Removed::Gone {
                    subtree: children[0],
                    node: removed,
                });
            }
            let subtree = alloc_internal(arena, new_bitmap, &children)?;
            Ok(Removed::Gone {
                subtree,
                node: removed,
            })
        }
        Removed::Gone {
            subtree,
            node: removed,
        } => {
            if bitmap.count_ones() == 1 && is_sentinel(arena, subtree) {
                return Ok(Removed::Gone {
                    subtree,
                    node: removed,
                });
            }
            let n = bitmap.count_ones();
            let mut children: Vec<u32> =
                (0..n).map(|i| child_at(arena, node, i)).collect();
            children[idx as usize] = subtree;
            let new_node = alloc_internal(arena, bitmap, &children)?;
            Ok(Removed::Gone {
                subtree: new_node,
                node: removed,
            })
        }
    }
}

//------------ Iteration -----------------------------------------------------

pub(crate) struct ThreadIter<'a> {
    arena: &'a Arena,
    cur: u32,
    remaining: u32,
}

/// Walks the insertion-order thread, yielding list node pointers.
pub(crate) fn iter<'a>(
    arena: &'a Arena,
    head: u32,
    size: u32,
) -> ThreadIter<'a> {
    ThreadIter {
        arena,
        cur: head,
        remaining: size,
    }
}

impl<'a> Iterator for ThreadIter<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 || self.cur == 0 {
            return None;
        }
        let node = self.cur;
        self.cur = node_next(self.arena, node);
        self.remaining -= 1;
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::FamilyLayout;

    fn arena() -> Arena {
        Arena::new(FamilyLayout::keyed(0))
    }

    fn put(
        arena: &mut Arena,
        st: OmState,
        key: &str,
        val: &str,
    ) -> OmOutcome {
        let k = arena.stage_key(key.as_bytes()).unwrap();
        let v = arena.stage_value(val.as_bytes()).unwrap();
        set(arena, st, k, v).unwrap()
    }

    fn keys_in_order(arena: &Arena, st: OmState, size: u32) -> Vec<String> {
        iter(arena, st.head, size)
            .map(|n| {
                String::from_utf8_lossy(node_key(arena, n)).into_owned()
            })
            .collect()
    }

    #[test]
    fn iteration_is_insertion_ordered() {
        let mut a = arena();
        let mut st = OmState::default();
        for (k, v) in [("c", "C"), ("a", "A"), ("b", "B")] {
            st = put(&mut a, st, k, v).state;
        }
        assert_eq!(keys_in_order(&a, st, 3), vec!["c", "a", "b"]);
    }

    #[test]
    fn replacing_does_not_move_the_key() {
        let mut a = arena();
        let mut st = OmState::default();
        for (k, v) in [("c", "C"), ("a", "A"), ("b", "B")] {
            st = put(&mut a, st, k, v).state;
        }
        let out = put(&mut a, st, "a", "A2");
        assert!(!out.inserted);
        st = out.state;
        assert_eq!(keys_in_order(&a, st, 3), vec!["c", "a", "b"]);
        let node = get(&a, st.root, b"a").unwrap();
        assert_eq!(node_val(&a, node), b"A2");
    }

    #[test]
    fn remove_relinks_the_thread() {
        let mut a = arena();
        let mut st = OmState::default();
        for k in ["one", "two", "three", "four"] {
            st = put(&mut a, st, k, "x").state;
        }
        let k = a.stage_key(b"two").unwrap();
        st = remove(&mut a, st, k).unwrap().unwrap();
        assert_eq!(keys_in_order(&a, st, 3), vec!["one", "three", "four"]);

        // Removing the head and the tail updates the ends.
        let k = a.stage_key(b"one").unwrap();
        st = remove(&mut a, st, k).unwrap().unwrap();
        let k = a.stage_key(b"four").unwrap();
        st = remove(&mut a, st, k).unwrap().unwrap();
        assert_eq!(keys_in_order(&a, st, 1), vec!["three"]);
        assert_eq!(st.head, st.tail);

        let k = a.stage_key(b"missing").unwrap();
        assert!(remove(&mut a, st, k).unwrap().is_none());
    }

    #[test]
    fn old_roots_keep_membership_and_values() {
        let mut a = arena();
        let mut st = OmState::default();
        for i in 0..50 {
            st = put(&mut a, st, &format!("k{}", i), &format!("v{}", i))
                .state;
        }
        let old = st;
        st = put(&mut a, st, "k7", "changed").state;
        let old_node = get(&a, old.root, b"k7").unwrap();
        assert_eq!(node_val(&a, old_node), b"v7");
        let new_node = get(&a, st.root, b"k7").unwrap();
        assert_eq!(node_val(&a, new_node), b"changed");
    }
}
