use serde_derive::{Deserialize, Serialize};

use crate::arena::{Arena, FamilyLayout};
use crate::linked_list::{
    dl_insert_after, dl_insert_before, dl_iter, dl_node_at,
    dl_node_at_rev, dl_push_back, dl_push_front, dl_remove_first,
    dl_remove_last, dl_remove_node, dl_slot, DlEnds, DlIter, NODE_CLASS,
};
use crate::linked_list::{sl_alloc, sl_iter, sl_next, sl_push_back, sl_slot};
use crate::shared::{decode_slot, encode_slot};
use crate::types::errors::StoreError;
use crate::types::value::{Value, ValueKind};

//------------ SharedLinkedList ----------------------------------------------

/// The general singly-linked list: pushes at both ends, pop at the front.
/// Front pushes and pops share structure freely; a back push patches the
/// old tail's link in place, which is this family's documented in-place
/// surface.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedLinkedList {
    head: u32,
    tail: u32,
    size: u32,
    value_kind: ValueKind,
    generation: u32,
}

impl SharedLinkedList {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::plain(NODE_CLASS)
    }

    pub fn new(arena: &Arena, value_kind: ValueKind) -> Self {
        Self {
            head: 0,
            tail: 0,
            size: 0,
            value_kind,
            generation: arena.generation(),
        }
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn value_kind(&self) -> &ValueKind {
        &self.value_kind
    }

    fn live(&self, arena: &Arena) -> bool {
        self.generation == arena.generation()
    }

    fn at(&self, head: u32, tail: u32, size: u32) -> Self {
        Self {
            head,
            tail,
            size,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        }
    }

    pub fn push_front(
        &self,
        arena: &mut Arena,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        let node = sl_alloc(arena, self.head, slot)?;
        let tail = if self.tail == 0 { node } else { self.tail };
        Ok(self.at(node, tail, self.size + 1))
    }

    pub fn push_back(
        &self,
        arena: &mut Arena,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        let node = sl_push_back(arena, self.tail, slot)?;
        let head = if self.head == 0 { node } else { self.head };
        Ok(self.at(head, node, self.size + 1))
    }

    pub fn pop_front(&self, arena: &mut Arena) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if self.size == 0 {
            return Ok(self.clone());
        }
        let head = sl_next(arena, self.head);
        let size = self.size - 1;
        if size == 0 {
            Ok(self.at(0, 0, 0))
        } else {
            Ok(self.at(head, self.tail, size))
        }
    }

    pub fn first(
        &self,
        arena: &Arena,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) || self.size == 0 {
            return Ok(None);
        }
        decode_slot(arena, &self.value_kind, sl_slot(arena, self.head))
            .map(Some)
    }

    pub fn last(
        &self,
        arena: &Arena,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) || self.size == 0 {
            return Ok(None);
        }
        decode_slot(arena, &self.value_kind, sl_slot(arena, self.tail))
            .map(Some)
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> LinkedIter<'a> {
        let (head, size) = if self.live(arena) {
            (self.head, self.size)
        } else {
            (0, 0)
        };
        LinkedIter {
            slots: SlotsInner::Single(sl_iter(arena, head, size)),
            arena,
            value_kind: self.value_kind.clone(),
        }
    }
}

//------------ SharedDoublyLinkedList ----------------------------------------

/// The doubly-linked list: O(1) operations at both ends, O(i) positional
/// access from whichever end is closer to the caller's index, and walks in
/// both directions. Node fields mutate in place; handles stay honest by
/// carrying their own ends and size.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedDoublyLinkedList {
    head: u32,
    tail: u32,
    size: u32,
    value_kind: ValueKind,
    generation: u32,
}

impl SharedDoublyLinkedList {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::plain(NODE_CLASS)
    }

    pub fn new(arena: &Arena, value_kind: ValueKind) -> Self {
        Self {
            head: 0,
            tail: 0,
            size: 0,
            value_kind,
            generation: arena.generation(),
        }
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn value_kind(&self) -> &ValueKind {
        &self.value_kind
    }

    fn live(&self, arena: &Arena) -> bool {
        self.generation == arena.generation()
    }

    fn ends(&self) -> DlEnds {
        DlEnds {
            head: self.head,
            tail: self.tail,
        }
    }

    fn at(&self, ends: DlEnds, size: u32) -> Self {
        Self {
            head: ends.head,
            tail: ends.tail,
            size,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        }
    }

    pub fn push_front(
        &self,
        arena: &mut Arena,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        let ends = dl_push_front(arena, self.ends(), slot)?;
        Ok(self.at(ends, self.size + 1))
    }

    pub fn push_back(
        &self,
        arena: &mut Arena,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        let ends = dl_push_back(arena, self.ends(), slot)?;
        Ok(self.at(ends, self.size + 1))
    }

    /// Inserts at position `index`; an index at or past the end appends.
    pub fn insert_at(
        &self,
        arena: &mut Arena,
        index: u32,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if index == 0 {
            return self.push_front(arena, value);
        }
        if index >= self.size {
            return self.push_back(arena, value);
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        // Splice from whichever end is closer to the index. The staleness
        // and range checks above mean the nodes exist.
        let ends = if index <= self.size / 2 {
            let Some(at) = dl_node_at(arena, self.head, index) else {
                return Ok(self.clone());
            };
            dl_insert_before(arena, self.ends(), at, slot)?
        } else {
            let Some(at) =
                dl_node_at_rev(arena, self.tail, self.size - index)
            else {
                return Ok(self.clone());
            };
            dl_insert_after(arena, self.ends(), at, slot)?
        };
        Ok(self.at(ends, self.size + 1))
    }

    pub fn remove_first(
        &self,
        arena: &mut Arena,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if self.size == 0 {
            return Ok(self.clone());
        }
        let ends = dl_remove_first(arena, self.ends());
        Ok(self.at(ends, self.size - 1))
    }

    pub fn remove_last(
        &self,
        arena: &mut Arena,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if self.size == 0 {
            return Ok(self.clone());
        }
        let ends = dl_remove_last(arena, self.ends());
        Ok(self.at(ends, self.size - 1))
    }

    /// Unlinks the node at `index`; out of range is a no-op.
    pub fn remove_at(
        &self,
        arena: &mut Arena,
        index: u32,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if index >= self.size {
            return Ok(self.clone());
        }
        let Some(at) = dl_node_at(arena, self.head, index) else {
            return Ok(self.clone());
        };
        let ends = dl_remove_node(arena, self.ends(), at);
        Ok(self.at(ends, self.size - 1))
    }

    pub fn get(
        &self,
        arena: &Arena,
        index: u32,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) || index >= self.size {
            return Ok(None);
        }
        match dl_node_at(arena, self.head, index) {
            None => Ok(None),
            Some(node) => decode_slot(
                arena,
                &self.value_kind,
                dl_slot(arena, node),
            )
            .map(Some),
        }
    }

    /// Positional access counted from the back: `get_from_end(0)` is the
    /// last element.
    pub fn get_from_end(
        &self,
        arena: &Arena,
        index: u32,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) || index >= self.size {
            return Ok(None);
        }
        match dl_node_at_rev(arena, self.tail, index) {
            None => Ok(None),
            Some(node) => decode_slot(
                arena,
                &self.value_kind,
                dl_slot(arena, node),
            )
            .map(Some),
        }
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> LinkedIter<'a> {
        let (head, size) = if self.live(arena) {
            (self.head, self.size)
        } else {
            (0, 0)
        };
        LinkedIter {
            slots: SlotsInner::Double(dl_iter(arena, head, size, true)),
            arena,
            value_kind: self.value_kind.clone(),
        }
    }

    pub fn iter_rev<'a>(&self, arena: &'a Arena) -> LinkedIter<'a> {
        let (tail, size) = if self.live(arena) {
            (self.tail, self.size)
        } else {
            (0, 0)
        };
        LinkedIter {
            slots: SlotsInner::Double(dl_iter(arena, tail, size, false)),
            arena,
            value_kind: self.value_kind.clone(),
        }
    }
}

//------------ LinkedIter ----------------------------------------------------

enum SlotsInner<'a> {
    Single(crate::linked_list::SlIter<'a>),
    Double(DlIter<'a>),
}

pub struct LinkedIter<'a> {
    slots: SlotsInner<'a>,
    arena: &'a Arena,
    value_kind: ValueKind,
}

impl<'a> Iterator for LinkedIter<'a> {
    type Item = Result<Value, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = match &mut self.slots {
            SlotsInner::Single(it) => it.next()?,
            SlotsInner::Double(it) => it.next()?,
        };
        Some(decode_slot(self.arena, &self.value_kind, slot))
    }
}
