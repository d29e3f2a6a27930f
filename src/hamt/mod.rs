pub(crate) mod iterators;

use log::trace;

use crate::arena::Arena;
use crate::types::errors::StoreError;

//------------ HAMT ----------------------------------------------------------

// The hash array mapped trie behind the unordered map and set. Five bits of
// the 32-bit key hash select the slot at each level; an internal node is a
// bitmap word followed by one child word per set bit, packed densely and
// indexed by the popcount of the lower bits. That layout is why a node with
// k children costs 4 + 4k bytes and nothing more.
//
// A leaf starts with a zero word; a valid internal bitmap is never zero, so
// the first word discriminates. The hash runs out after six 5-bit levels
// plus one 2-bit level. Keys that agree on the whole 32 bits meet below
// that last level in a collision node: a count word (>= 2, which cannot be
// confused with a leaf) followed by that many leaf pointers, searched
// linearly.
//
// Writes are path copy: every node on the way down to the touched leaf is
// reallocated, everything off the path is shared with the previous version.
// The one exception is a node allocated above `edit_floor`: that node came
// into existence after the floor was taken, so no published version can
// reach it yet and it may be patched in place. Single inserts pass the heap
// cursor as the floor (their own fresh copies qualify); batches fix the
// floor once and get transient behavior across the whole batch.

const BITS: u32 = 5;
const MASK: u32 = 0x1F;
// Level 6 only has the two top hash bits left.
const LAST_LEVEL: u32 = 6;
pub(crate) const COLLISION_LEVEL: u32 = 7;

//------------ Hashing -------------------------------------------------------

// FNV-1a over the key bytes. Collisions on the full 32 bits are expected
// and handled; this just has to spread well enough for 5-bit slices.
pub(crate) fn hash_key(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

pub(crate) fn slice(hash: u32, level: u32) -> u32 {
    if level == LAST_LEVEL {
        hash >> 30
    } else {
        (hash >> (level * BITS)) & MASK
    }
}

//------------ Node access ---------------------------------------------------

pub(crate) fn is_leaf(arena: &Arena, ptr: u32) -> bool {
    arena.word(ptr) == 0
}

pub(crate) fn child_at(arena: &Arena, ptr: u32, idx: u32) -> u32 {
    arena.word(ptr + 4 + 4 * idx)
}

pub(crate) fn child_slot(bitmap: u32, bit: u32) -> u32 {
    (bitmap & (bit - 1)).count_ones()
}

// Leaf: [0][hash][key_len | val_len << 16][key bytes][val bytes].
const LEAF_HDR: u32 = 12;

pub(crate) fn leaf_hash(arena: &Arena, leaf: u32) -> u32 {
    arena.word(leaf + 4)
}

fn leaf_lens(arena: &Arena, leaf: u32) -> (u32, u32) {
    let w = arena.word(leaf + 8);
    (w & 0xFFFF, w >> 16)
}

pub(crate) fn leaf_key(arena: &Arena, leaf: u32) -> &[u8] {
    let (key_len, _) = leaf_lens(arena, leaf);
    arena.bytes(leaf + LEAF_HDR, key_len)
}

pub(crate) fn leaf_val(arena: &Arena, leaf: u32) -> &[u8] {
    let (key_len, val_len) = leaf_lens(arena, leaf);
    arena.bytes(leaf + LEAF_HDR + key_len, val_len)
}

//------------ Builders ------------------------------------------------------

pub(crate) fn alloc_internal(
    arena: &mut Arena,
    bitmap: u32,
    children: &[u32],
) -> Result<u32, StoreError> {
    debug_assert_ne!(bitmap, 0);
    debug_assert_eq!(bitmap.count_ones() as usize, children.len());
    let ptr = arena.alloc(4 + 4 * children.len() as u32)?;
    arena.set_word(ptr, bitmap);
    for (i, child) in children.iter().enumerate() {
        arena.set_word(ptr + 4 + 4 * i as u32, *child);
    }
    Ok(ptr)
}

fn alloc_collision(
    arena: &mut Arena,
    entries: &[u32],
) -> Result<u32, StoreError> {
    debug_assert!(entries.len() >= 2);
    let ptr = arena.alloc(4 + 4 * entries.len() as u32)?;
    arena.set_word(ptr, entries.len() as u32);
    for (i, leaf) in entries.iter().enumerate() {
        arena.set_word(ptr + 4 + 4 * i as u32, *leaf);
    }
    Ok(ptr)
}

fn alloc_leaf(
    arena: &mut Arena,
    hash: u32,
    key: &[u8],
    val: &[u8],
) -> Result<u32, StoreError> {
    let key_len = key.len() as u32;
    let val_len = val.len() as u32;
    let ptr = arena.alloc(LEAF_HDR + key_len + val_len)?;
    arena.set_word(ptr, 0);
    arena.set_word(ptr + 4, hash);
    arena.set_word(ptr + 8, key_len | (val_len << 16));
    arena
        .bytes_mut(ptr + LEAF_HDR, key_len)
        .copy_from_slice(key);
    arena
        .bytes_mut(ptr + LEAF_HDR + key_len, val_len)
        .copy_from_slice(val);
    Ok(ptr)
}

// Collects an internal node's words so it can be rebuilt with one child
// swapped, added or dropped.
fn internal_children(arena: &Arena, ptr: u32) -> (u32, Vec<u32>) {
    let bitmap = arena.word(ptr);
    let n = bitmap.count_ones();
    let children = (0..n).map(|i| child_at(arena, ptr, i)).collect();
    (bitmap, children)
}

//------------ Insert --------------------------------------------------------

pub(crate) struct InsertOutcome {
    pub root: u32,
    pub inserted: bool,
}

/// Inserts the staged key (key scratch, `key_len` bytes) and value (blob
/// scratch, `val_len` bytes). Nodes at or above `edit_floor` are patched in
/// place; pass the current heap cursor for plain persistent behavior.
pub(crate) fn insert(
    arena: &mut Arena,
    root: u32,
    key_len: u32,
    val_len: u32,
    edit_floor: u32,
) -> Result<InsertOutcome, StoreError> {
    let key = arena.key_bytes(key_len).to_vec();
    let val = arena.value_bytes(val_len).to_vec();
    let hash = hash_key(&key);
    ins_rec(arena, root, 0, hash, &key, &val, edit_floor)
}

fn ins_rec(
    arena: &mut Arena,
    node: u32,
    level: u32,
    hash: u32,
    key: &[u8],
    val: &[u8],
    edit_floor: u32,
) -> Result<InsertOutcome, StoreError> {
    if node == 0 {
        let root = alloc_leaf(arena, hash, key, val)?;
        return Ok(InsertOutcome {
            root,
            inserted: true,
        });
    }

    if level >= COLLISION_LEVEL {
        return ins_collision_depth(arena, node, hash, key, val);
    }

    if is_leaf(arena, node) {
        if leaf_hash(arena, node) == hash && leaf_key(arena, node) == key {
            let root = alloc_leaf(arena, hash, key, val)?;
            return Ok(InsertOutcome {
                root,
                inserted: false,
            });
        }
        // Two distinct keys in one spot: push the old leaf down until
        // their hash slices diverge, or all the way into a collision node.
        trace!("hamt: splitting leaf at level {}", level);
        let old_hash = leaf_hash(arena, node);
        let new_leaf = alloc_leaf(arena, hash, key, val)?;
        let root = split(arena, level, new_leaf, hash, node, old_hash)?;
        return Ok(InsertOutcome {
            root,
            inserted: true,
        });
    }

    let bitmap = arena.word(node);
    let bit = 1 << slice(hash, level);
    if bitmap & bit != 0 {
        let idx = child_slot(bitmap, bit);
        let child = child_at(arena, node, idx);
        let r = ins_rec(arena, child, level + 1, hash, key, val, edit_floor)?;
        if node >= edit_floor {
            arena.set_word(node + 4 + 4 * idx, r.root);
            return Ok(InsertOutcome {
                root: node,
                inserted: r.inserted,
            });
        }
        let (_, mut children) = internal_children(arena, node);
        children[idx as usize] = r.root;
        let root = alloc_internal(arena, bitmap, &children)?;
        Ok(InsertOutcome {
            root,
            inserted: r.inserted,
        })
    } else {
        let leaf = alloc_leaf(arena, hash, key, val)?;
        let idx = child_slot(bitmap, bit);
        let (_, mut children) = internal_children(arena, node);
        children.insert(idx as usize, leaf);
        let root = alloc_internal(arena, bitmap | bit, &children)?;
        Ok(InsertOutcome {
            root,
            inserted: true,
        })
    }
}

// Below the last hash level: `node` is a leaf or a collision node and every
// key here shares the new key's full hash prefix.
fn ins_collision_depth(
    arena: &mut Arena,
    node: u32,
    hash: u32,
    key: &[u8],
    val: &[u8],
) -> Result<InsertOutcome, StoreError> {
    if is_leaf(arena, node) {
        if leaf_key(arena, node) == key {
            let root = alloc_leaf(arena, hash, key, val)?;
            return Ok(InsertOutcome {
                root,
                inserted: false,
            });
        }
        let new_leaf = alloc_leaf(arena, hash, key, val)?;
        let root = alloc_collision(arena, &[node, new_leaf])?;
        return Ok(InsertOutcome {
            root,
            inserted: true,
        });
    }

    let count = arena.word(node);
    let mut entries: Vec<u32> =
        (0..count).map(|i| child_at(arena, node, i)).collect();
    let existing = entries
        .iter()
        .position(|&l| leaf_key(arena, l) == key);
    let new_leaf = alloc_leaf(arena, hash, key, val)?;
    let inserted = match existing {
        Some(i) => {
            entries[i] = new_leaf;
            false
        }
        None => {
            entries.push(new_leaf);
            true
        }
    };
    let root = alloc_collision(arena, &entries)?;
    Ok(InsertOutcome { root, inserted })
}

fn split(
    arena: &mut Arena,
    level: u32,
    new_leaf: u32,
    new_hash: u32,
    old_leaf: u32,
    old_hash: u32,
) -> Result<u32, StoreError> {
    if level >= COLLISION_LEVEL {
        return alloc_collision(arena, &[old_leaf, new_leaf]);
    }
    let s_new = slice(new_hash, level);
    let s_old = slice(old_hash, level);
    if s_new == s_old {
        let child = split(
            arena,
            level + 1,
            new_leaf,
            new_hash,
            old_leaf,
            old_hash,
        )?;
        alloc_internal(arena, 1 << s_new, &[child])
    } else {
        let bitmap = (1 << s_new) | (1 << s_old);
        let children = if s_new < s_old {
            [new_leaf, old_leaf]
        } else {
            [old_leaf, new_leaf]
        };
        alloc_internal(arena, bitmap, &children)
    }
}

//------------ Lookup --------------------------------------------------------

/// Finds the leaf for a key. Reads take the key bytes directly (no
/// staging, so shared read-only views stay untouched); the caller reads
/// the value through `leaf_val`.
pub(crate) fn get(arena: &Arena, root: u32, key: &[u8]) -> Option<u32> {
    let hash = hash_key(key);
    let mut node = root;
    let mut level = 0;
    loop {
        if node == 0 {
            return None;
        }
        if is_leaf(arena, node) {
            return (leaf_hash(arena, node) == hash
                && leaf_key(arena, node) == key)
                .then_some(node);
        }
        if level >= COLLISION_LEVEL {
            let count = arena.word(node);
            return (0..count)
                .map(|i| child_at(arena, node, i))
                .find(|&l| leaf_key(arena, l) == key);
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
    // The subtree that replaces the old one; zero when it emptied out.
    Gone(u32),
}

/// Removes the staged key. `None` means the key was absent and the caller
/// can keep its handle as is.
pub(crate) fn remove(
    arena: &mut Arena,
    root: u32,
    key_len: u32,
    edit_floor: u32,
) -> Result<Option<u32>, StoreError> {
    let key = arena.key_bytes(key_len).to_vec();
    let hash = hash_key(&key);
    match rem_rec(arena, root, 0, hash, &key, edit_floor)? {
        Removed::NotFound => Ok(None),
        Removed::Gone(new_root) => Ok(Some(new_root)),
    }
}

fn rem_rec(
    arena: &mut Arena,
    node: u32,
    level: u32,
    hash: u32,
    key: &[u8],
    edit_floor: u32,
) -> Result<Removed, StoreError> {
    if node == 0 {
        return Ok(Removed::NotFound);
    }

    if is_leaf(arena, node) {
        if leaf_hash(arena, node) == hash && leaf_key(arena, node) == key {
            return Ok(Removed::Gone(0));
        }
        return Ok(Removed::NotFound);
    }

    if level >= COLLISION_LEVEL {
        let count = arena.word(node);
        let entries: Vec<u32> =
            (0..count).map(|i| child_at(arena, node, i)).collect();
        let Some(i) = entries
            .iter()
            .position(|&l| leaf_key(arena, l) == key)
        else {
            return Ok(Removed::NotFound);
        };
        if count == 2 {
            // A lone survivor goes back to being a plain leaf.
            return Ok(Removed::Gone(entries[1 - i]));
        }
        let mut rest = entries;
        rest.remove(i);
        return Ok(Removed::Gone(alloc_collision(arena, &rest)?));
    }

    let bitmap = arena.word(node);
    let bit = 1 << slice(hash, level);
    if bitmap & bit == 0 {
        return Ok(Removed::NotFound);
    }
    let idx = child_slot(bitmap, bit);
    let child = child_at(arena, node, idx);

    match rem_rec(arena, child, level + 1, hash, key, edit_floor)? {
        Removed::NotFound => Ok(Removed::NotFound),
        Removed::Gone(0) => {
            let new_bitmap = bitmap & !bit;
            if new_bitmap == 0 {
                return Ok(Removed::Gone(0));
            }
            let (_, mut children) = internal_children(arena, node);
            children.remove(idx as usize);
            // Path compression: a node holding one leaf is that leaf.
            if children.len() == 1 && is_leaf(arena, children[0]) {
                return Ok(Removed::Gone(children[0]));
            }
            Ok(Removed::Gone(alloc_internal(
                arena, new_bitmap, &children,
            )?))
        }
        Removed::Gone(new_child) => {
            if bitmap.count_ones() == 1 && is_leaf(arena, new_child) {
                return Ok(Removed::Gone(new_child));
            }
            if node >= edit_floor {
                arena.set_word(node + 4 + 4 * idx, new_child);
                return Ok(Removed::Gone(node));
            }
            let (_, mut children) = internal_children(arena, node);
            children[idx as usize] = new_child;
            Ok(Removed::Gone(alloc_internal(arena, bitmap, &children)?))
        }
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
        root: u32,
        key: &str,
        val: &str,
    ) -> InsertOutcome {
        let k = arena.stage_key(key.as_bytes()).unwrap();
        let v = arena.stage_value(val.as_bytes()).unwrap();
        let floor = arena.get_heap_end();
        insert(arena, root, k, v, floor).unwrap()
    }

    fn fetch(arena: &mut Arena, root: u32, key: &str) -> Option<String> {
        get(arena, root, key.as_bytes()).map(|leaf| {
            String::from_utf8_lossy(leaf_val(arena, leaf)).into_owned()
        })
    }

    fn drop_key(arena: &mut Arena, root: u32, key: &str) -> Option<u32> {
        let k = arena.stage_key(key.as_bytes()).unwrap();
        let floor = arena.get_heap_end();
        remove(arena, root, k, floor).unwrap()
    }

    #[test]
    fn insert_get_replace() {
        let mut a = arena();
        let r1 = put(&mut a, 0, "alpha", "A").root;
        let r2 = put(&mut a, r1, "beta", "B").root;
        let o3 = put(&mut a, r2, "alpha", "A2");
        assert!(!o3.inserted);
        assert_eq!(fetch(&mut a, o3.root, "alpha").as_deref(), Some("A2"));
        assert_eq!(fetch(&mut a, o3.root, "beta").as_deref(), Some("B"));
        // The old root still answers with the old value.
        assert_eq!(fetch(&mut a, r2, "alpha").as_deref(), Some("A"));
        assert_eq!(fetch(&mut a, r2, "gamma"), None);
    }

    #[test]
    fn remove_collapses_paths() {
        let mut a = arena();
        let mut root = 0;
        for i in 0..200 {
            root = put(&mut a, root, &format!("key-{}", i), "x").root;
        }
        for i in 0..200 {
            let key = format!("key-{}", i);
            root = drop_key(&mut a, root, &key).expect("present");
            assert_eq!(fetch(&mut a, root, &key), None);
        }
        assert_eq!(root, 0);
    }

    #[test]
    fn remove_missing_reports_not_found() {
        let mut a = arena();
        let root = put(&mut a, 0, "only", "x").root;
        assert_eq!(drop_key(&mut a, root, "other"), None);
        assert!(drop_key(&mut a, root, "only").is_some());
    }

    #[test]
    fn full_hash_collisions_coexist() {
        let mut a = arena();
        // Hunt down two distinct keys with the same 32-bit hash; the
        // generator is deterministic so this finds the same pair on every
        // run.
        let mut seen = std::collections::HashMap::new();
        let mut pair = None;
        for i in 0u64..300_000 {
            let key = format!("collide-{}", i);
            let h = hash_key(key.as_bytes());
            if let Some(prev) = seen.insert(h, key.clone()) {
                pair = Some((prev, key));
                break;
            }
        }
        let (k1, k2) = pair.expect("no collision in three hundred thousand");
        assert_eq!(hash_key(k1.as_bytes()), hash_key(k2.as_bytes()));

        let r1 = put(&mut a, 0, &k1, "first").root;
        let r2 = put(&mut a, r1, &k2, "second").root;
        assert_eq!(fetch(&mut a, r2, &k1).as_deref(), Some("first"));
        assert_eq!(fetch(&mut a, r2, &k2).as_deref(), Some("second"));

        // Replacing inside the collision node keeps the other entry.
        let r3 = put(&mut a, r2, &k1, "first2").root;
        assert_eq!(fetch(&mut a, r3, &k1).as_deref(), Some("first2"));
        assert_eq!(fetch(&mut a, r3, &k2).as_deref(), Some("second"));

        // Removing one collapses back to a plain leaf.
        let r4 = drop_key(&mut a, r3, &k1).expect("present");
        assert_eq!(fetch(&mut a, r4, &k1), None);
        assert_eq!(fetch(&mut a, r4, &k2).as_deref(), Some("second"));
    }

    #[test]
    fn batch_edit_floor_matches_sequential_result() {
        let mut a = arena();
        let mut seq_root = 0;
        for i in 0..100 {
            seq_root =
                put(&mut a, seq_root, &format!("k{}", i), &format!("v{}", i))
                    .root;
        }

        let mut b = arena();
        let floor = b.get_heap_end();
        let mut batch_root = 0;
        for i in 0..100 {
            let k = b.stage_key(format!("k{}", i).as_bytes()).unwrap();
            let v = b.stage_value(format!("v{}", i).as_bytes()).unwrap();
            batch_root = insert(&mut b, batch_root, k, v, floor)
                .unwrap()
                .root;
        }

        for i in 0..100 {
            let key = format!("k{}", i);
            assert_eq!(
                fetch(&mut a, seq_root, &key),
                fetch(&mut b, batch_root, &key)
            );
        }
    }
}
