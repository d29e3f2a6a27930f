use std::borrow::Cow;

use serde_derive::{Deserialize, Serialize};

use crate::arena::{Arena, FamilyLayout};
use crate::rb_tree::{self, InOrderIter};
use crate::types::errors::StoreError;
use crate::types::value::{key_f64, SortOrder, Value, ValueKind};

//------------ SortedKey -----------------------------------------------------

/// A key into a sorted map or set: text compared bytewise, or a number
/// compared numerically. Which one a tree uses is fixed by the handle's
/// [`SortOrder`].
#[derive(Clone, Copy, Debug)]
pub enum SortedKey<'a> {
    Str(&'a str),
    Num(f64),
}

impl<'a> SortedKey<'a> {
    fn bytes(&self) -> Cow<'a, [u8]> {
        match self {
            SortedKey::Str(s) => Cow::Borrowed(s.as_bytes()),
            SortedKey::Num(n) => Cow::Owned(n.to_le_bytes().to_vec()),
        }
    }
}

impl<'a> From<&'a str> for SortedKey<'a> {
    fn from(s: &'a str) -> Self {
        SortedKey::Str(s)
    }
}

impl From<f64> for SortedKey<'static> {
    fn from(n: f64) -> Self {
        SortedKey::Num(n)
    }
}

fn decode_key(order: SortOrder, bytes: &[u8]) -> Value {
    if order.is_numeric() {
        Value::Number(key_f64(bytes))
    } else {
        Value::String(String::from_utf8_lossy(bytes).into_owned())
    }
}

//------------ SharedSortedMap -----------------------------------------------

/// The sorted map over the red-black tree. The comparison order lives on
/// the handle and inside every tree descent, so iteration, min and max all
/// come out in handle order with no re-sorting anywhere.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedSortedMap {
    root: u32,
    size: u32,
    value_kind: ValueKind,
    order: SortOrder,
    generation: u32,
}

impl SharedSortedMap {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::keyed(rb_tree::NODE_CLASS)
    }

    pub fn new(arena: &Arena, value_kind: ValueKind) -> Self {
        Self::with_order(arena, value_kind, SortOrder::BytesAsc)
    }

    pub fn with_order(
        arena: &Arena,
        value_kind: ValueKind,
        order: SortOrder,
    ) -> Self {
        Self {
            root: 0,
            size: 0,
            value_kind,
            order,
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

    pub fn order(&self) -> SortOrder {
        self.order
    }

    fn live(&self, arena: &Arena) -> bool {
        self.generation == arena.generation()
    }

    fn fresh(&self, arena: &Arena) -> Self {
        Self::with_order(arena, self.value_kind.clone(), self.order)
    }

    pub fn insert<'k>(
        &self,
        arena: &mut Arena,
        key: impl Into<SortedKey<'k>>,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(self.fresh(arena));
        }
        let val_word =
            crate::shared::encode_word(arena, &self.value_kind, value)?;
        let key_len = arena.stage_key(&key.into().bytes())?;
        let out = rb_tree::insert(
            arena, self.root, key_len, val_word, self.order,
        )?;
        Ok(Self {
            root: out.root,
            size: self.size + u32::from(!out.existed),
            value_kind: self.value_kind.clone(),
            order: self.order,
            generation: self.generation,
        })
    }

    pub fn get<'k>(
        &self,
        arena: &Arena,
        key: impl Into<SortedKey<'k>>,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) {
            return Ok(None);
        }
        match rb_tree::find(
            arena,
            self.root,
            &key.into().bytes(),
            self.order,
        ) {
            None => Ok(None),
            Some(node) => crate::shared::decode_word(
                arena,
                &self.value_kind,
                rb_tree::node_val_word(arena, node),
            )
            .map(Some),
        }
    }

    pub fn contains<'k>(
        &self,
        arena: &Arena,
        key: impl Into<SortedKey<'k>>,
    ) -> bool {
        self.live(arena)
            && rb_tree::find(
                arena,
                self.root,
                &key.into().bytes(),
                self.order,
            )
            .is_some()
    }

    pub fn remove<'k>(
        &self,
        arena: &mut Arena,
        key: impl Into<SortedKey<'k>>,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(self.fresh(arena));
        }
        match rb_tree::remove(
            arena,
            self.root,
            &key.into().bytes(),
            self.order,
        )? {
            None => Ok(self.clone()),
            Some(root) => Ok(Self {
                root,
                size: self.size - 1,
                value_kind: self.value_kind.clone(),
                order: self.order,
                generation: self.generation,
            }),
        }
    }

    /// The first entry under the handle order.
    pub fn first_entry(
        &self,
        arena: &Arena,
    ) -> Result<Option<(Value, Value)>, StoreError> {
        if !self.live(arena) {
            return Ok(None);
        }
        self.entry_of(arena, rb_tree::min_node(arena, self.root))
    }

    /// The last entry under the handle order.
    pub fn last_entry(
        &self,
        arena: &Arena,
    ) -> Result<Option<(Value, Value)>, StoreError> {
        if !self.live(arena) {
            return Ok(None);
        }
        self.entry_of(arena, rb_tree::max_node(arena, self.root))
    }

    fn entry_of(
        &self,
        arena: &Arena,
        node: Option<u32>,
    ) -> Result<Option<(Value, Value)>, StoreError> {
        match node {
            None => Ok(None),
            Some(n) => {
                let key =
                    decode_key(self.order, rb_tree::node_key(arena, n));
                let val = crate::shared::decode_word(
                    arena,
                    &self.value_kind,
                    rb_tree::node_val_word(arena, n),
                )?;
                Ok(Some((key, val)))
            }
        }
    }

    /// Walks entries in handle order.
    pub fn iter<'a>(&self, arena: &'a Arena) -> SortedIter<'a> {
        let root = if self.live(arena) { self.root } else { 0 };
        SortedIter {
            inner: rb_tree::iter(arena, root),
            arena,
            value_kind: self.value_kind.clone(),
            order: self.order,
            keys_only: false,
        }
    }
}

//------------ SharedSortedSet -----------------------------------------------

/// Sorted set: the same tree with empty payloads. Members are text or
/// numbers per the handle order.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedSortedSet {
    root: u32,
    size: u32,
    order: SortOrder,
    generation: u32,
}

impl SharedSortedSet {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::keyed(rb_tree::NODE_CLASS)
    }

    pub fn new(arena: &Arena) -> Self {
        Self::with_order(arena, SortOrder::BytesAsc)
    }

    pub fn with_order(arena: &Arena, order: SortOrder) -> Self {
        Self {
            root: 0,
            size: 0,
            order,
            generation: arena.generation(),
        }
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn order(&self) -> SortOrder {
        self.order
    }

    fn live(&self, arena: &Arena) -> bool {
        self.generation == arena.generation()
    }

    pub fn insert<'k>(
        &self,
        arena: &mut Arena,
        member: impl Into<SortedKey<'k>>,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::with_order(arena, self.order));
        }
        let val_len = arena.stage_value(&[])?;
        let val_word = arena.commit_value(val_len)?;
        let key_len = arena.stage_key(&member.into().bytes())?;
        let out = rb_tree::insert(
            arena, self.root, key_len, val_word, self.order,
        )?;
        Ok(Self {
            root: out.root,
            size: self.size + u32::from(!out.existed),
            order: self.order,
            generation: self.generation,
        })
    }

    pub fn contains<'k>(
        &self,
        arena: &Arena,
        member: impl Into<SortedKey<'k>>,
    ) -> bool {
        self.live(arena)
            && rb_tree::find(
                arena,
                self.root,
                &member.into().bytes(),
                self.order,
            )
            .is_some()
    }

    pub fn remove<'k>(
        &self,
        arena: &mut Arena,
        member: impl Into<SortedKey<'k>>,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return Ok(Self::with_order(arena, self.order));
        }
        match rb_tree::remove(
            arena,
            self.root,
            &member.into().bytes(),
            self.order,
        )? {
            None => Ok(self.clone()),
            Some(root) => Ok(Self {
                root,
                size: self.size - 1,
                order: self.order,
                generation: self.generation,
            }),
        }
    }

    pub fn iter<'a>(&self, arena: &'a Arena) -> SortedIter<'a> {
        let root = if self.live(arena) { self.root } else { 0 };
        SortedIter {
            inner: rb_tree::iter(arena, root),
            arena,
            value_kind: ValueKind::String,
            order: self.order,
            keys_only: true,
        }
    }
}

//------------ SortedIter ----------------------------------------------------

pub struct SortedIter<'a> {
    inner: InOrderIter<'a>,
    arena: &'a Arena,
    value_kind: ValueKind,
    order: SortOrder,
    keys_only: bool,
}

impl<'a> Iterator for SortedIter<'a> {
    type Item = Result<(Value, Value), StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.inner.next()?;
        let key =
            decode_key(self.order, rb_tree::node_key(self.arena, node));
        if self.keys_only {
            return Some(Ok((key.clone(), key)));
        }
        let val = crate::shared::decode_word(
            self.arena,
            &self.value_kind,
            rb_tree::node_val_word(self.arena, node),
        );
        Some(val.map(|v| (key, v)))
    }
}
