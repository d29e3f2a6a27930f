use serde_derive::{Deserialize, Serialize};

use crate::arena::{Arena, FamilyLayout};
use crate::linked_list::{
    sl_alloc, sl_iter, sl_next, sl_push_back, sl_slot, SlIter, NODE_CLASS,
};
use crate::shared::{decode_slot, encode_slot};
use crate::types::errors::StoreError;
use crate::types::value::{Value, ValueKind};

//------------ SharedStack ---------------------------------------------------

/// A stack on singly-linked nodes. Pushing only points a new node at the
/// old head, so no existing node is ever touched and every old handle is a
/// complete version of its own.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedStack {
    head: u32,
    size: u32,
    value_kind: ValueKind,
    generation: u32,
}

impl SharedStack {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::plain(NODE_CLASS)
    }

    pub fn new(arena: &Arena, value_kind: ValueKind) -> Self {
        Self {
            head: 0,
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

    pub fn push(
        &self,
        arena: &mut Arena,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        let head = sl_alloc(arena, self.head, slot)?;
        Ok(Self {
            head,
            size: self.size + 1,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        })
    }

    /// Popping an empty stack is a no-op returning the same handle.
    pub fn pop(&self, arena: &mut Arena) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if self.size == 0 {
            return Ok(self.clone());
        }
        Ok(Self {
            head: sl_next(arena, self.head),
            size: self.size - 1,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        })
    }

    pub fn peek(
        &self,
        arena: &Arena,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) || self.size == 0 {
            return Ok(None);
        }
        decode_slot(arena, &self.value_kind, sl_slot(arena, self.head))
            .map(Some)
    }

    /// Walks top to bottom.
    pub fn iter<'a>(&self, arena: &'a Arena) -> ChainIter<'a> {
        let (head, size) = if self.live(arena) {
            (self.head, self.size)
        } else {
            (0, 0)
        };
        ChainIter {
            inner: sl_iter(arena, head, size),
            arena,
            value_kind: self.value_kind.clone(),
        }
    }
}

//------------ SharedQueue ---------------------------------------------------

/// A FIFO queue on singly-linked nodes: push on the tail (patching the old
/// tail's link in place, the documented in-place surface of this family),
/// pop from the head. Old handles keep a correct element count; iteration
/// is bounded by it.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedQueue {
    head: u32,
    tail: u32,
    size: u32,
    value_kind: ValueKind,
    generation: u32,
}

impl SharedQueue {
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

    pub fn enqueue(
        &self,
        arena: &mut Arena,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        let node = sl_push_back(arena, self.tail, slot)?;
        Ok(Self {
            head: if self.head == 0 { node } else { self.head },
            tail: node,
            size: self.size + 1,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        })
    }

    /// Dequeuing an empty queue is a no-op returning the same handle.
    pub fn dequeue(&self, arena: &mut Arena) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if self.size == 0 {
            return Ok(self.clone());
        }
        let head = sl_next(arena, self.head);
        let size = self.size - 1;
        Ok(Self {
            head: if size == 0 { 0 } else { head },
            tail: if size == 0 { 0 } else { self.tail },
            size,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        })
    }

    pub fn peek(
        &self,
        arena: &Arena,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) || self.size == 0 {
            return Ok(None);
        }
        decode_slot(arena, &self.value_kind, sl_slot(arena, self.head))
            .map(Some)
    }

    /// Walks front to back.
    pub fn iter<'a>(&self, arena: &'a Arena) -> ChainIter<'a> {
        let (head, size) = if self.live(arena) {
            (self.head, self.size)
        } else {
            (0, 0)
        };
        ChainIter {
            inner: sl_iter(arena, head, size),
            arena,
            value_kind: self.value_kind.clone(),
        }
    }
}

//------------ ChainIter -----------------------------------------------------

pub struct ChainIter<'a> {
    inner: SlIter<'a>,
    arena: &'a Arena,
    value_kind: ValueKind,
}

impl<'a> Iterator for ChainIter<'a> {
    type Item = Result<Value, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.inner.next()?;
        Some(decode_slot(self.arena, &self.value_kind, slot))
    }
}
