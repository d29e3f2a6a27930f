use zerocopy::byteorder::{LittleEndian, U32};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::arena::Arena;
use crate::types::errors::StoreError;
use crate::types::packed::PackedWord;
use crate::types::value::SortOrder;

//------------ Red-black tree ------------------------------------------------

// The balanced tree behind the sorted map and set. Keys and values are
// packed words into blob storage; the comparison order is a property of
// the handle and is applied on every descent, so iteration comes out
// ordered without any re-sorting.
//
// Nodes carry no parent pointer: a shared subtree cannot answer to two
// parents, and path copy shares subtrees all the time. Insertion is the
// Okasaki rebalancing, deletion the Kahrs functional deletion; both
// reallocate exactly the nodes they touch and leave every old root
// observing its own version. Ordered walks use an explicit left-spine
// stack instead of parent links.

type U32LE = U32<LittleEndian>;

const RED: u32 = 0;
const BLACK: u32 = 1;

/// Node size; the family's free-list class.
pub(crate) const NODE_CLASS: u32 = 24;

#[derive(
    FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned,
)]
#[repr(C)]
struct RbNode {
    color: U32LE,
    left: U32LE,
    right: U32LE,
    key: U32LE,
    val: U32LE,
    _pad: U32LE,
}

// A small loaded copy the rebalancing clauses pattern-match on.
#[derive(Clone, Copy)]
struct N {
    color: u32,
    left: u32,
    right: u32,
    key: PackedWord,
    val: PackedWord,
}

fn load(arena: &Arena, ptr: u32) -> N {
    let n = arena.node::<RbNode>(ptr);
    N {
        color: n.color.get(),
        left: n.left.get(),
        right: n.right.get(),
        key: PackedWord::from_bits(n.key.get()),
        val: PackedWord::from_bits(n.val.get()),
    }
}

fn mk(
    arena: &mut Arena,
    color: u32,
    left: u32,
    key: PackedWord,
    val: PackedWord,
    right: u32,
) -> Result<u32, StoreError> {
    let ptr = arena.alloc_fixed()?;
    let n = arena.node_mut::<RbNode>(ptr);
    n.color.set(color);
    n.left.set(left);
    n.right.set(right);
    n.key.set(key.bits());
    n.val.set(val.bits());
    Ok(ptr)
}

fn is_red(arena: &Arena, ptr: u32) -> bool {
    ptr != 0 && load(arena, ptr).color == RED
}

fn blacken(arena: &mut Arena, ptr: u32) -> Result<u32, StoreError> {
    if ptr == 0 || !is_red(arena, ptr) {
        return Ok(ptr);
    }
    let n = load(arena, ptr);
    mk(arena, BLACK, n.left, n.key, n.val, n.right)
}

pub(crate) fn node_key<'a>(arena: &'a Arena, ptr: u32) -> &'a [u8] {
    arena.blob(load(arena, ptr).key)
}

pub(crate) fn node_val_word(arena: &Arena, ptr: u32) -> PackedWord {
    load(arena, ptr).val
}

//------------ Insert --------------------------------------------------------

pub(crate) struct RbInsert {
    pub root: u32,
    pub existed: bool,
}

/// Inserts the staged key (`key_len` bytes in the key scratch) with the
/// given value reference. An existing key keeps its key blob and gets the
/// new value; the outcome says which case happened.
pub(crate) fn insert(
    arena: &mut Arena,
    root: u32,
    key_len: u32,
    val: PackedWord,
    order: SortOrder,
) -> Result<RbInsert, StoreError> {
    let key = arena.key_bytes(key_len).to_vec();
    let (t, existed) = ins(arena, root, &key, key_len, val, order)?;
    let root = blacken(arena, t)?;
    Ok(RbInsert { root, existed })
}

fn ins(
    arena: &mut Arena,
    s: u32,
    key: &[u8],
    key_len: u32,
    val: PackedWord,
    order: SortOrder,
) -> Result<(u32, bool), StoreError> {
    if s == 0 {
        let key_word = arena.commit_key(key_len)?;
        return Ok((mk(arena, RED, 0, key_word, val, 0)?, false));
    }
    let n = load(arena, s);
    let cmp = order.cmp_keys(key, arena.blob(n.key));
    match cmp {
        std::cmp::Ordering::Equal => {
            Ok((mk(arena, n.color, n.left, n.key, val, n.right)?, true))
        }
        std::cmp::Ordering::Less => {
            let (l, existed) =
                ins(arena, n.left, key, key_len, val, order)?;
            let t = if n.color == BLACK {
                balance(arena, l, n.key, n.val, n.right)?
            } else {
                mk(arena, RED, l, n.key, n.val, n.right)?
            };
            Ok((t, existed))
        }
        std::cmp::Ordering::Greater => {
            let (r, existed) =
                ins(arena, n.right, key, key_len, val, order)?;
            let t = if n.color == BLACK {
                balance(arena, n.left, n.key, n.val, r)?
            } else {
                mk(arena, RED, n.left, n.key, n.val, r)?
            };
            Ok((t, existed))
        }
    }
}

// The balance of Okasaki's insertion, extended with the both-children-red
// recoloring clause the functional deletion needs.
fn balance(
    arena: &mut Arena,
    l: u32,
    key: PackedWord,
    val: PackedWord,
    r: u32,
) -> Result<u32, StoreError> {
    if is_red(arena, l) && is_red(arena, r) {
        let lb = blacken(arena, l)?;
        let rb = blacken(arena, r)?;
        return mk(arena, RED, lb, key, val, rb);
    }
    if is_red(arena, l) {
        let ln = load(arena, l);
        if is_red(arena, ln.left) {
            // (R (R a x b) y c) z d  ->  R (B a x b) y (B c z d)
            let gl = load(arena, ln.left);
            let nl = mk(arena, BLACK, gl.left, gl.key, gl.val, gl.right)?;
            let nr = mk(arena, BLACK, ln.right, key, val, r)?;
            return mk(arena, RED, nl, ln.key, ln.val, nr);
        }
        if is_red(arena, ln.right) {
            // (R a x (R b y c)) z d  ->  R (B a x b) y (B c z d)
            let gr = load(arena, ln.right);
            let nl = mk(arena, BLACK, ln.left, ln.key, ln.val, gr.left)?;
            let nr = mk(arena, BLACK, gr.right, key, val, r)?;
            return mk(arena, RED, nl, gr.key, gr.val, nr);
        }
    }
    if is_red(arena, r) {
        let rn = load(arena, r);
        if is_red(arena, rn.right) {
            // a x (R b y (R c z d))  ->  R (B a x b) y (B c z d)
            let gr = load(arena, rn.right);
            let nl = mk(arena, BLACK, l, key, val, rn.left)?;
            let nr = mk(arena, BLACK, gr.left, gr.key, gr.val, gr.right)?;
            return mk(arena, RED, nl, rn.key, rn.val, nr);
        }
        if is_red(arena, rn.left) {
            // a x (R (R b y c) z d)  ->  R (B a x b) y (B c z d)
            let gl = load(arena, rn.left);
            let nl = mk(arena, BLACK, l, key, val, gl.left)?;
            let nr = mk(arena, BLACK, gl.right, rn.key, rn.val, rn.right)?;
            return mk(arena, RED, nl, gl.key, gl.val, nr);
        }
    }
    mk(arena, BLACK, l, key, val, r)
}

//------------ Lookup --------------------------------------------------------

pub(crate) fn find(
    arena: &Arena,
    root: u32,
    key: &[u8],
    order: SortOrder,
) -> Option<u32> {
    let mut cur = root;
    while cur != 0 {
        let n = load(arena, cur);
        match order.cmp_keys(key, arena.blob(n.key)) {
            std::cmp::Ordering::Equal => return Some(cur),
            std::cmp::Ordering::Less => cur = n.left,
            std::cmp::Ordering::Greater => cur = n.right,
        }
    }
    None
}

pub(crate) fn min_node(arena: &Arena, root: u32) -> Option<u32> {
    if root == 0 {
        return None;
    }
    let mut cur = root;
    loop {
        let left = load(arena, cur).left;
        if left == 0 {
            return Some(cur);
        }
        cur = left;
    }
}

pub(crate) fn max_node(arena: &Arena, root: u32) -> Option<u32> {
    if root == 0 {
        return None;
    }
    let mut cur = root;
    loop {
        let right = load(arena, cur).right;
        if right == 0 {
            return Some(cur);
        }
        cur = right;
    }
}

//------------ Delete --------------------------------------------------------

/// Deletes the key. `None` when it is absent; the caller keeps its handle.
pub(crate) fn remove(
    arena: &mut Arena,
    root: u32,
    key: &[u8],
    order: SortOrder,
) -> Result<Option<u32>, StoreError> {
    if find(arena, root, key, order).is_none() {
        return Ok(None);
    }
    let t = del(arena, root, key, order)?;
    Ok(Some(blacken(arena, t)?))
}

fn del(
    arena: &mut Arena,
    s: u32,
    key: &[u8],
    order: SortOrder,
) -> Result<u32, StoreError> {
    if s == 0 {
        return Ok(0);
    }
    let n = load(arena, s);
    match order.cmp_keys(key, arena.blob(n.key)) {
        std::cmp::Ordering::Less => {
            let da = del(arena, n.left, key, order)?;
            if n.left != 0 && load(arena, n.left).color == BLACK {
                balleft(arena, da, n.key, n.val, n.right)
            } else {
                mk(arena, RED, da, n.key, n.val, n.right)
            }
        }
        std::cmp::Ordering::Greater => {
            let db = del(arena, n.right, key, order)?;
            if n.right != 0 && load(arena, n.right).color == BLACK {
                balright(arena, n.left, n.key, n.val, db)
            } else {
                mk(arena, RED, n.left, n.key, n.val, db)
            }
        }
        std::cmp::Ordering::Equal => app(arena, n.left, n.right),
    }
}

// balleft (R a x b) y c          = R (B a x b) y c
// balleft bl x (B a y b)         = balance bl x (R a y b)
// balleft bl x (R (B a y b) z c) = R (B bl x a) y (balance b z (sub1 c))
fn balleft(
    arena: &mut Arena,
    l: u32,
    key: PackedWord,
    val: PackedWord,
    r: u32,
) -> Result<u32, StoreError> {
    if is_red(arena, l) {
        let lb = blacken(arena, l)?;
        return mk(arena, RED, lb, key, val, r);
    }
    debug_assert_ne!(r, 0, "deletion left a black deficit with no sibling");
    let rn = load(arena, r);
    if rn.color == BLACK {
        let red_r = mk(arena, RED, rn.left, rn.key, rn.val, rn.right)?;
        return balance(arena, l, key, val, red_r);
    }
    let rl = load(arena, rn.left);
    let nl = mk(arena, BLACK, l, key, val, rl.left)?;
    let sub = sub1(arena, rn.right)?;
    let nr = balance(arena, rl.right, rn.key, rn.val, sub)?;
    mk(arena, RED, nl, rl.key, rl.val, nr)
}

// balright a x (R b y c)          = R a x (B b y c)
// balright (B a x b) y bl         = balance (R a x b) y bl
// balright (R a x (B b y c)) z bl = R (balance (sub1 a) x b) y (B c z bl)
fn balright(
    arena: &mut Arena,
    l: u32,
    key: PackedWord,
    val: PackedWord,
    r: u32,
) -> Result<u32, StoreError> {
    if is_red(arena, r) {
        let rb = blacken(arena, r)?;
        return mk(arena, RED, l, key, val, rb);
    }
    debug_assert_ne!(l, 0, "deletion left a black deficit with no sibling");
    let ln = load(arena, l);
    if ln.color == BLACK {
        let red_l = mk(arena, RED, ln.left, ln.key, ln.val, ln.right)?;
        return balance(arena, red_l, key, val, r);
    }
    let lr = load(arena, ln.right);
    let sub = sub1(arena, ln.left)?;
    let nl = balance(arena, sub, ln.key, ln.val, lr.left)?;
    let nr = mk(arena, BLACK, lr.right, key, val, r)?;
    mk(arena, RED, nl, lr.key, lr.val, nr)
}

// Repaints a black node red, giving one black level back.
fn sub1(arena: &mut Arena, ptr: u32) -> Result<u32, StoreError> {
    debug_assert!(
        ptr != 0 && load(arena, ptr).color == BLACK,
        "sub1 on a non-black node"
    );
    if ptr == 0 {
        return Ok(0);
    }
    let n = load(arena, ptr);
    mk(arena, RED, n.left, n.key, n.val, n.right)
}

// Fuses the two children of a deleted node into one tree.
fn app(arena: &mut Arena, l: u32, r: u32) -> Result<u32, StoreError> {
    if l == 0 {
        return Ok(r);
    }
    if r == 0 {
        return Ok(l);
    }
    let ln = load(arena, l);
    let rn = load(arena, r);
    if ln.color == RED && rn.color == RED {
        let bc = app(arena, ln.right, rn.left)?;
        if is_red(arena, bc) {
            let bcn = load(arena, bc);
            let nl =
                mk(arena, RED, ln.left, ln.key, ln.val, bcn.left)?;
            let nr =
                mk(arena, RED, bcn.right, rn.key, rn.val, rn.right)?;
            return mk(arena, RED, nl, bcn.key, bcn.val, nr);
        }
        let nr = mk(arena, RED, bc, rn.key, rn.val, rn.right)?;
        return mk(arena, RED, ln.left, ln.key, ln.val, nr);
    }
    if ln.color == BLACK && rn.color == BLACK {
        let bc = app(arena, ln.right, rn.left)?;
        if is_red(arena, bc) {
            let bcn = load(arena, bc);
            let nl =
                mk(arena, BLACK, ln.left, ln.key, ln.val, bcn.left)?;
            let nr =
                mk(arena, BLACK, bcn.right, rn.key, rn.val, rn.right)?;
            return mk(arena, RED, nl, bcn.key, bcn.val, nr);
        }
        let nr = mk(arena, BLACK, bc, rn.key, rn.val, rn.right)?;
        return balleft(arena, ln.left, ln.key, ln.val, nr);
    }
    if rn.color == RED {
        let fused = app(arena, l, rn.left)?;
        return mk(arena, RED, fused, rn.key, rn.val, rn.right);
    }
    // ln red, rn black.
    let fused = app(arena, ln.right, r)?;
    mk(arena, RED, ln.left, ln.key, ln.val, fused)
}

//------------ Iteration -----------------------------------------------------

// In-order cursor: the stack holds the unvisited left spine. Single pass,
// not restartable; a new walk starts from the root.
pub(crate) struct InOrderIter<'a> {
    arena: &'a Arena,
    stack: Vec<u32>,
}

pub(crate) fn iter<'a>(arena: &'a Arena, root: u32) -> InOrderIter<'a> {
    let mut it = InOrderIter {
        arena,
        stack: Vec::new(),
    };
    it.push_left_spine(root);
    it
}

impl<'a> InOrderIter<'a> {
    fn push_left_spine(&mut self, mut node: u32) {
        while node != 0 {
            self.stack.push(node);
            node = load(self.arena, node).left;
        }
    }
}

impl<'a> Iterator for InOrderIter<'a> {
    type Item = u32;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        let right = load(self.arena, node).right;
        self.push_left_spine(right);
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arena::FamilyLayout;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn arena() -> Arena {
        Arena::new(FamilyLayout::keyed(NODE_CLASS))
    }

    fn put(
        arena: &mut Arena,
        root: u32,
        key: &str,
        val: &str,
    ) -> RbInsert {
        let v = arena.stage_value(val.as_bytes()).unwrap();
        let vw = arena.commit_value(v).unwrap();
        let k = arena.stage_key(key.as_bytes()).unwrap();
        insert(arena, root, k, vw, SortOrder::BytesAsc).unwrap()
    }

    fn keys(arena: &Arena, root: u32) -> Vec<String> {
        iter(arena, root)
            .map(|n| {
                String::from_utf8_lossy(node_key(arena, n)).into_owned()
            })
            .collect()
    }

    // The five red-black invariants, checked structurally: root black, no
    // red-red edge, equal black height on every path, search order.
    fn check_invariants(arena: &Arena, root: u32, order: SortOrder) {
        if root == 0 {
            return;
        }
        assert_eq!(load(arena, root).color, BLACK, "root must be black");
        fn walk(
            arena: &Arena,
            node: u32,
            order: SortOrder,
        ) -> (u32, Vec<u8>, Vec<u8>) {
            let n = load(arena, node);
            assert!(n.color == RED || n.color == BLACK);
            if n.color == RED {
                assert!(
                    !is_red(arena, n.left) && !is_red(arena, n.right),
                    "red node with red child"
                );
            }
            let here = node_key(arena, node).to_vec();
            let mut lo = here.clone();
            let mut hi = here.clone();
            let mut lh = 0;
            if n.left != 0 {
                let (h, l_lo, l_hi) = walk(arena, n.left, order);
                assert!(
                    order.cmp_keys(&l_hi, &here).is_lt(),
                    "left subtree out of order"
                );
                lo = l_lo;
                lh = h;
            }
            let mut rh = 0;
            if n.right != 0 {
                let (h, r_lo, r_hi) = walk(arena, n.right, order);
                assert!(
                    order.cmp_keys(&here, &r_lo).is_lt(),
                    "right subtree out of order"
                );
                hi = r_hi;
                rh = h;
            }
            assert_eq!(lh, rh, "unequal black heights");
            (lh + u32::from(n.color == BLACK), lo, hi)
        }
        walk(arena, root, order);
    }

    #[test]
    fn sorted_iteration_and_replace() {
        let mut a = arena();
        let mut root = 0;
        for k in ["m", "a", "z", "c"] {
            root = put(&mut a, root, k, "v").root;
        }
        assert_eq!(keys(&a, root), vec!["a", "c", "m", "z"]);
        let out = put(&mut a, root, "m", "v2");
        assert!(out.existed);
        assert_eq!(keys(&a, out.root).len(), 4);
        check_invariants(&a, out.root, SortOrder::BytesAsc);
    }

    #[test]
    fn old_roots_are_unchanged_by_writes() {
        let mut a = arena();
        let mut root = 0;
        for i in 0..64 {
            root = put(&mut a, root, &format!("key{:03}", i), "v").root;
        }
        let old = root;
        root = put(&mut a, root, "key999", "v").root;
        let removed = {
            let key = b"key031".to_vec();
            remove(&mut a, root, &key, SortOrder::BytesAsc)
                .unwrap()
                .unwrap()
        };
        assert_eq!(keys(&a, old).len(), 64);
        assert!(keys(&a, old).contains(&"key031".to_string()));
        assert_eq!(keys(&a, removed).len(), 64);
        assert!(!keys(&a, removed).contains(&"key031".to_string()));
    }

    #[test]
    fn randomized_ops_hold_the_invariants() {
        let mut a = arena();
        let mut rng = StdRng::seed_from_u64(0x5eed);
        let mut root = 0;
        let mut model = std::collections::BTreeSet::new();
        for step in 0..2000 {
            let key = format!("k{:03}", rng.random_range(0..250));
            if rng.random_range(0..3) < 2 {
                root = put(&mut a, root, &key, "v").root;
                model.insert(key);
            } else if let Some(new_root) = remove(
                &mut a,
                root,
                key.as_bytes(),
                SortOrder::BytesAsc,
            )
            .unwrap()
            {
                root = new_root;
                model.remove(&key);
            }
            if step % 50 == 0 {
                check_invariants(&a, root, SortOrder::BytesAsc);
            }
        }
        check_invariants(&a, root, SortOrder::BytesAsc);
        let got = keys(&a, root);
        let want: Vec<String> = model.into_iter().collect();
        assert_eq!(got, want);
    }

    #[test]
    fn descending_order_reverses_iteration() {
        let mut a = arena();
        let mut root = 0;
        for k in ["m", "a", "z", "c"] {
            let v = a.stage_value(b"v").unwrap();
            let vw = a.commit_value(v).unwrap();
            let kl = a.stage_key(k.as_bytes()).unwrap();
            root = insert(&mut a, root, kl, vw, SortOrder::BytesDesc)
                .unwrap()
                .root;
        }
        assert_eq!(keys(&a, root), vec!["z", "m", "c", "a"]);
        check_invariants(&a, root, SortOrder::BytesDesc);
    }

    #[test]
    fn numeric_order_compares_by_value() {
        let mut a = arena();
        let mut root = 0;
        for n in [10.0f64, -3.5, 2.0, 100.0] {
            let v = a.stage_value(b"v").unwrap();
            let vw = a.commit_value(v).unwrap();
            let kl = a.stage_key(&n.to_le_bytes()).unwrap();
            root = insert(&mut a, root, kl, vw, SortOrder::NumericAsc)
                .unwrap()
                .root;
        }
        let got: Vec<f64> = iter(&a, root)
            .map(|n| {
                f64::from_le_bytes(node_key(&a, n).try_into().unwrap())
            })
            .collect();
        assert_eq!(got, vec![-3.5, 2.0, 10.0, 100.0]);
    }

    #[test]
    fn min_and_max_follow_the_handle_order() {
        let mut a = arena();
        let mut root = 0;
        for k in ["g", "b", "t"] {
            root = put(&mut a, root, k, "v").root;
        }
        let min = min_node(&a, root).unwrap();
        let max = max_node(&a, root).unwrap();
        assert_eq!(node_key(&a, min), b"b");
        assert_eq!(node_key(&a, max), b"t");
    }
}
