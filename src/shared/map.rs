use serde_derive::{Deserialize, Serialize};

use crate::arena::{Arena, FamilyLayout};
use crate::hamt;
use crate::hamt::iterators::{leaves, LeafIter};
use crate::types::errors::StoreError;
use crate::types::value::{Value, ValueKind};

//------------ SharedMap -----------------------------------------------------

/// The persistent unordered map. Keys are UTF-8 strings, values whatever
/// the handle's value type says; the backing trie is the HAMT family.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedMap {
    root: u32,
    size: u32,
    value_kind: ValueKind,
    generation: u32,
}

impl SharedMap {
    /// The arena layout this family expects.
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::keyed(0)
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

    pub fn insert(
        &self,
        arena: &mut Arena,
        key: &str,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        if !value.matches(&self.value_kind) {
            return Err(StoreError::ValueKindMismatch);
        }
        let bytes = value.to_bytes()?;
        let val_len = arena.stage_value(&bytes)?;
        let key_len = arena.stage_key(key.as_bytes())?;
        let floor = arena.get_heap_end();
        let out = hamt::insert(arena, self.root, key_len, val_len, floor)?;
        Ok(Self {
            root: out.root,
            size: self.size + u32::from(out.inserted),
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        })
    }

    pub fn get(
        &self,
        arena: &Arena,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) {
            return Ok(None);
        }
        match hamt::get(arena, self.root, key.as_bytes()) {
            None => Ok(None),
            Some(leaf) => Value::from_bytes(
                &self.value_kind,
                hamt::leaf_val(arena, leaf),
            )
            .map(Some),
        }
    }

    pub fn contains(&self, arena: &Arena, key: &str) -> bool {
        self.live(arena)
            && hamt::get(arena, self.root, key.as_bytes()).is_some()
    }

    pub fn remove(
        &self,
        arena: &mut Arena,
        key: &str,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let key_len = arena.stage_key(key.as_bytes())?;
        let floor = arena.get_heap_end();
        match hamt::remove(arena, self.root, key_len, floor)? {
            None => Ok(self.clone()),
            Some(root) => Ok(Self {
                root,
                size: self.size - 1,
                value_kind: self.value_kind.clone(),
                generation: self.generation,
            }),
        }
    }

    /// Applies a batch of inserts as one transient traversal committing to
    /// a single new root. Equivalent to inserting in sequence.
    pub fn insert_many(
        &self,
        arena: &mut Arena,
        entries: &[(&str, Value)],
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let floor = arena.get_heap_end();
        let mut root = self.root;
        let mut size = self.size;
        for (key, value) in entries {
            if !value.matches(&self.value_kind) {
                return Err(StoreError::ValueKindMismatch);
            }
            let bytes = value.to_bytes()?;
            let val_len = arena.stage_value(&bytes)?;
            let key_len = arena.stage_key(key.as_bytes())?;
            let out = hamt::insert(arena, root, key_len, val_len, floor)?;
            root = out.root;
            size += u32::from(out.inserted);
        }
        Ok(Self {
            root,
            size,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        })
    }

    pub fn remove_many(
        &self,
        arena: &mut Arena,
        keys: &[&str],
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena, self.value_kind.clone()));
        }
        let floor = arena.get_heap_end();
        let mut root = self.root;
        let mut size = self.size;
        for key in keys {
            let key_len = arena.stage_key(key.as_bytes())?;
            if let Some(new_root) =
                hamt::remove(arena, root, key_len, floor)?
            {
                root = new_root;
                size -= 1;
            }
        }
        Ok(Self {
            root,
            size,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        })
    }

    pub fn get_many(
        &self,
        arena: &Arena,
        keys: &[&str],
    ) -> Result<Vec<Option<Value>>, StoreError> {
        keys.iter().map(|k| self.get(arena, k)).collect()
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> MapIter<'a> {
        let root = if self.live(arena) { self.root } else { 0 };
        MapIter {
            inner: leaves(arena, root),
            arena,
            value_kind: self.value_kind.clone(),
        }
    }
}

pub struct MapIter<'a> {
    inner: LeafIter<'a>,
    arena: &'a Arena,
    value_kind: ValueKind,
}

impl<'a> Iterator for MapIter<'a> {
    type Item = Result<(String, Value), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = self.inner.next()?;
        let key = String::from_utf8_lossy(hamt::leaf_key(self.arena, leaf))
            .into_owned();
        let value = Value::from_bytes(
            &self.value_kind,
            hamt::leaf_val(self.arena, leaf),
        );
        Some(value.map(|v| (key, v)))
    }
}

//------------ SharedSet -----------------------------------------------------

/// The persistent unordered set: the same trie with string members and
/// empty payloads.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedSet {
    root: u32,
    size: u32,
    generation: u32,
}

impl SharedSet {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::keyed(0)
    }

    pub fn new(arena: &Arena) -> Self {
        Self {
            root: 0,
            size: 0,
            generation: arena.generation(),
        }
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    fn live(&self, arena: &Arena) -> bool {
        self.generation == arena.generation()
    }

    pub fn insert(
        &self,
        arena: &mut Arena,
        member: &str,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena));
        }
        let val_len = arena.stage_value(&[])?;
        let key_len = arena.stage_key(member.as_bytes())?;
        let floor = arena.get_heap_end();
        let out = hamt::insert(arena, self.root, key_len, val_len, floor)?;
        Ok(Self {
            root: out.root,
            size: self.size + u32::from(out.inserted),
            generation: self.generation,
        })
    }

    pub fn contains(&self, arena: &Arena, member: &str) -> bool {
        self.live(arena)
            && hamt::get(arena, self.root, member.as_bytes()).is_some()
    }

    pub fn remove(
        &self,
        arena: &mut Arena,
        member: &str,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::new(arena));
        }
        let key_len = arena.stage_key(member.as_bytes())?;
        let floor = arena.get_heap_end();
        match hamt::remove(arena, self.root, key_len, floor)? {
            None => Ok(self.clone()),
            Some(root) => Ok(Self {
                root,
                size: self.size - 1,
                generation: self.generation,
            }),
        }
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> SetIter<'a> {
        let root = if self.live(arena) { self.root } else { 0 };
        SetIter {
            inner: leaves(arena, root),
            arena,
        }
    }
}

pub struct SetIter<'a> {
    inner: LeafIter<'a>,
    arena: &'a Arena,
}

impl<'a> Iterator for SetIter<'a> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let leaf = self.inner.next()?;
        Some(
            String::from_utf8_lossy(hamt::leaf_key(self.arena, leaf))
                .into_owned(),
        )
    }
}
