use serde_derive::{Deserialize, Serialize};

use crate::arena::{Arena, FamilyLayout};
use crate::shared::{decode_slot, encode_slot};
use crate::types::errors::StoreError;
use crate::types::value::{Value, ValueKind};
use crate::vector_trie;

//------------ SharedList ----------------------------------------------------

/// The persistent indexed list over the radix-32 vector trie. Push and pop
/// work on the back; `get`/`set` are positional, with out-of-range reads
/// coming back absent and out-of-range writes returning the same handle.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedList {
    root: u32,
    size: u32,
    value_kind: ValueKind,
    generation: u32,
}

impl SharedList {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::plain(vector_trie::ROOT_CLASS)
    }

    pub fn new(arena: &Arena, value_kind: ValueKind) -> Self {
        Self {
            root: 0,
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

    fn with_root(&self, root: u32, size: u32) -> Self {
        Self {
            root,
            size,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        }
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
        let root = vector_trie::push(arena, self.root, slot)?;
        Ok(self.with_root(root, self.size + 1))
    }

    pub fn get(
        &self,
        arena: &Arena,
        index: u32,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) {
            return Ok(None);
        }
        match vector_trie::get(arena, self.root, index) {
            None => Ok(None),
            Some(slot) => {
                decode_slot(arena, &self.value_kind, slot).map(Some)
            }
        }
    }

    pub fn set(
        &self,
        arena: &mut Arena,
        index: u32,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if index >= self.size {
            return Ok(self.clone());
        }
        let slot = encode_slot(arena, &self.value_kind, value)?;
        let root = vector_trie::set(arena, self.root, index, slot)?;
        Ok(self.with_root(root, self.size))
    }

    pub fn pop(&self, arena: &mut Arena) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if self.size == 0 {
            return Ok(self.clone());
        }
        let root = vector_trie::pop(arena, self.root)?;
        Ok(self.with_root(root, self.size - 1))
    }

    pub fn last(
        &self,
        arena: &Arena,
    ) -> Result<Option<Value>, StoreError> {
        if self.size == 0 {
            return Ok(None);
        }
        self.get(arena, self.size - 1)
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> ListIter<'a> {
        let root = if self.live(arena) { self.root } else { 0 };
        ListIter {
            inner: vector_trie::slots(arena, root),
            arena,
            value_kind: self.value_kind.clone(),
        }
    }
}

pub struct ListIter<'a> {
    inner: vector_trie::SlotIter<'a>,
    arena: &'a Arena,
    value_kind: ValueKind,
}

impl<'a> Iterator for ListIter<'a> {
    type Item = Result<Value, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let slot = self.inner.next()?;
        Some(decode_slot(self.arena, &self.value_kind, slot))
    }
}
