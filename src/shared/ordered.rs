use serde_derive::{Deserialize, Serialize};

use crate::arena::{Arena, FamilyLayout};
use crate::ordered_map::{self, OmState, ThreadIter};
use crate::types::errors::StoreError;
use crate::types::value::{Value, ValueKind};

//------------ SharedOrderedMap ----------------------------------------------

/// The insertion-ordered map: HAMT lookups, iteration along the
/// doubly-linked thread from oldest to newest insertion. Replacing a key's
/// value keeps its position.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedOrderedMap {
    root: u32,
    head: u32,
    tail: u32,
    size: u32,
    value_kind: ValueKind,
    generation: u32,
}

impl SharedOrderedMap {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::keyed(0)
    }

    pub fn new(arena: &Arena, value_kind: ValueKind) -> Self {
        Self {
            root: 0,
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

    fn state(&self) -> OmState {
        OmState {
            root: self.root,
            head: self.head,
            tail: self.tail,
        }
    }

    fn at(&self, st: OmState, size: u32) -> Self {
        Self {
            root: st.root,
            head: st.head,
            tail: st.tail,
            size,
            value_kind: self.value_kind.clone(),
            generation: self.generation,
        }
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
        let out = ordered_map::set(arena, self.state(), key_len, val_len)?;
        Ok(self.at(out.state, self.size + u32::from(out.inserted)))
    }

    pub fn get(
        &self,
        arena: &Arena,
        key: &str,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) {
            return Ok(None);
        }
        match ordered_map::get(arena, self.root, key.as_bytes()) {
            None => Ok(None),
            Some(node) => Value::from_bytes(
                &self.value_kind,
                ordered_map::node_val(arena, node),
            )
            .map(Some),
        }
    }

    pub fn contains(&self, arena: &Arena, key: &str) -> bool {
        self.live(arena)
            && ordered_map::get(arena, self.root, key.as_bytes()).is_some()
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
        match ordered_map::remove(arena, self.state(), key_len)? {
            None => Ok(self.clone()),
            Some(st) => Ok(self.at(st, self.size - 1)),
        }
    }

    /// Walks entries oldest insertion first.
    pub fn iter<'a>(&self, arena: &'a Arena) -> OrderedIter<'a> {
        let (head, size) = if self.live(arena) {
            (self.head, self.size)
        } else {
            (0, 0)
        };
        OrderedIter {
            inner: ordered_map::iter(arena, head, size),
            arena,
            value_kind: self.value_kind.clone(),
            keys_only: false,
        }
    }
}

//------------ SharedOrderedSet ----------------------------------------------

/// Insertion-ordered set: same machinery, string members, empty payloads.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedOrderedSet {
    root: u32,
    head: u32,
    tail: u32,
    size: u32,
    generation: u32,
}

impl SharedOrderedSet {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::keyed(0)
    }

    pub fn new(arena: &Arena) -> Self {
        Self {
            root: 0,
            head: 0,
            tail: 0,
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

    fn state(&self) -> OmState {
        OmState {
            root: self.root,
            head: self.head,
            tail: self.tail,
        }
    }

    fn at(&self, st: OmState, size: u32) -> Self {
        Self {
            root: st.root,
            head: st.head,
            tail: st.tail,
            size,
            generation: self.generation,
        }
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
        let out = ordered_map::set(arena, self.state(), key_len, val_len)?;
        Ok(self.at(out.state, self.size + u32::from(out.inserted)))
    }

    pub fn contains(&self, arena: &Arena, member: &str) -> bool {
        self.live(arena)
            && ordered_map::get(arena, self.root, member.as_bytes())
                .is_some()
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
        match ordered_map::remove(arena, self.state(), key_len)? {
            None => Ok(self.clone()),
            Some(st) => Ok(self.at(st, self.size - 1)),
        }
    }

    /// Walks members oldest insertion first.
    pub fn iter<'a>(&self, arena: &'a Arena) -> OrderedIter<'a> {
        let (head, size) = if self.live(arena) {
            (self.head, self.size)
        } else {
            (0, 0)
        };
        OrderedIter {
            inner: ordered_map::iter(arena, head, size),
            arena,
            value_kind: ValueKind::String,
            keys_only: true,
        }
    }
}

//------------ OrderedIter ---------------------------------------------------

pub struct OrderedIter<'a> {
    inner: ThreadIter<'a>,
    arena: &'a Arena,
    value_kind: ValueKind,
    keys_only: bool,
}

impl<'a> Iterator for OrderedIter<'a> {
    type Item = Result<(String, Value), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.inner.next()?;
        let key =
            String::from_utf8_lossy(ordered_map::node_key(self.arena, node))
                .into_owned();
        if self.keys_only {
            let member = Value::String(key.clone());
            return Some(Ok((key, member)));
        }
        let value = Value::from_bytes(
            &self.value_kind,
            ordered_map::node_val(self.arena, node),
        );
        Some(value.map(|v| (key, v)))
    }
}
