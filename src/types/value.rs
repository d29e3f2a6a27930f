use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde_derive::{Deserialize, Serialize};

use crate::shared::linked::{SharedDoublyLinkedList, SharedLinkedList};
use crate::shared::map::{SharedMap, SharedSet};
use crate::shared::ordered::{SharedOrderedMap, SharedOrderedSet};
use crate::shared::pqueue::SharedPriorityQueue;
use crate::shared::sorted::{SharedSortedMap, SharedSortedSet};
use crate::shared::stack_queue::{SharedQueue, SharedStack};
use crate::shared::vec_list::SharedList;
use crate::types::errors::StoreError;

//------------ StructureKind -------------------------------------------------

/// The closed set of structure kinds a nested envelope can name.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum StructureKind {
    Map,
    Set,
    List,
    Stack,
    Queue,
    LinkedList,
    DoublyLinkedList,
    OrderedMap,
    OrderedSet,
    SortedMap,
    SortedSet,
    PriorityQueue,
}

impl StructureKind {
    /// The `__t` tag of the envelope.
    pub fn tag(self) -> &'static str {
        match self {
            StructureKind::Map => "SharedMap",
            StructureKind::Set => "SharedSet",
            StructureKind::List => "SharedList",
            StructureKind::Stack => "SharedStack",
            StructureKind::Queue => "SharedQueue",
            StructureKind::LinkedList => "SharedLinkedList",
            StructureKind::DoublyLinkedList => "SharedDoublyLinkedList",
            StructureKind::OrderedMap => "SharedOrderedMap",
            StructureKind::OrderedSet => "SharedOrderedSet",
            StructureKind::SortedMap => "SharedSortedMap",
            StructureKind::SortedSet => "SharedSortedSet",
            StructureKind::PriorityQueue => "SharedPriorityQueue",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self, StoreError> {
        Ok(match tag {
            "SharedMap" => StructureKind::Map,
            "SharedSet" => StructureKind::Set,
            "SharedList" => StructureKind::List,
            "SharedStack" => StructureKind::Stack,
            "SharedQueue" => StructureKind::Queue,
            "SharedLinkedList" => StructureKind::LinkedList,
            "SharedDoublyLinkedList" => StructureKind::DoublyLinkedList,
            "SharedOrderedMap" => StructureKind::OrderedMap,
            "SharedOrderedSet" => StructureKind::OrderedSet,
            "SharedSortedMap" => StructureKind::SortedMap,
            "SharedSortedSet" => StructureKind::SortedSet,
            "SharedPriorityQueue" => StructureKind::PriorityQueue,
            _ => return Err(StoreError::UnknownStructureKind),
        })
    }
}

impl fmt::Display for StructureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

//------------ ValueKind -----------------------------------------------------

/// The value type a handle was created with.
///
/// The node payloads in the arena are untyped bytes; this tag travels on
/// the handle and is the only thing that decides how those bytes decode.
/// Nested kinds render as `SharedSet<string>` etc., the same syntax the
/// envelope uses for its `__i` field.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum ValueKind {
    Number,
    Boolean,
    String,
    Object,
    Nested {
        kind: StructureKind,
        inner: Box<ValueKind>,
    },
}

impl ValueKind {
    pub fn nested(kind: StructureKind, inner: ValueKind) -> Self {
        ValueKind::Nested {
            kind,
            inner: Box::new(inner),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueKind::Number => f.write_str("number"),
            ValueKind::Boolean => f.write_str("boolean"),
            ValueKind::String => f.write_str("string"),
            ValueKind::Object => f.write_str("object"),
            ValueKind::Nested { kind, inner } => {
                write!(f, "{}<{}>", kind.tag(), inner)
            }
        }
    }
}

impl FromStr for ValueKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "number" => ValueKind::Number,
            "boolean" => ValueKind::Boolean,
            "string" => ValueKind::String,
            "object" => ValueKind::Object,
            _ => {
                let open =
                    s.find('<').ok_or(StoreError::UnknownStructureKind)?;
                if !s.ends_with('>') {
                    return Err(StoreError::UnknownStructureKind);
                }
                let kind = StructureKind::from_tag(&s[..open])?;
                let inner = s[open + 1..s.len() - 1].parse()?;
                ValueKind::nested(kind, inner)
            }
        })
    }
}

impl serde::Serialize for ValueKind {
    fn serialize<S: serde::Serializer>(
        &self,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ValueKind {
    fn deserialize<D: serde::Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Self, D::Error> {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        s.parse().map_err(|_| {
            serde::de::Error::custom(format!("unknown value kind `{}`", s))
        })
    }
}

//------------ SortOrder -----------------------------------------------------

/// How a sorted map or set compares its keys. The order is a property of
/// the handle and is applied inside every tree comparison; iteration comes
/// out in this order without any re-sorting.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub enum SortOrder {
    BytesAsc,
    BytesDesc,
    NumericAsc,
    NumericDesc,
}

impl SortOrder {
    pub(crate) fn cmp_keys(self, a: &[u8], b: &[u8]) -> Ordering {
        let natural = match self {
            SortOrder::BytesAsc | SortOrder::BytesDesc => a.cmp(b),
            SortOrder::NumericAsc | SortOrder::NumericDesc => {
                key_f64(a).total_cmp(&key_f64(b))
            }
        };
        match self {
            SortOrder::BytesAsc | SortOrder::NumericAsc => natural,
            SortOrder::BytesDesc | SortOrder::NumericDesc => {
                natural.reverse()
            }
        }
    }

    pub(crate) fn is_numeric(self) -> bool {
        matches!(self, SortOrder::NumericAsc | SortOrder::NumericDesc)
    }
}

pub(crate) fn key_f64(bytes: &[u8]) -> f64 {
    match <[u8; 8]>::try_from(bytes) {
        Ok(raw) => f64::from_le_bytes(raw),
        // A numeric key is always written as exactly eight bytes; anything
        // else sorts before all real keys instead of tearing the tree.
        Err(_) => f64::NEG_INFINITY,
    }
}

//------------ Value ---------------------------------------------------------

/// A single user value, on its way into or out of a structure.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Number(f64),
    Boolean(bool),
    String(String),
    Object(serde_json::Value),
    Nested(StructureRef),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Number(_) => ValueKind::Number,
            Value::Boolean(_) => ValueKind::Boolean,
            Value::String(_) => ValueKind::String,
            Value::Object(_) => ValueKind::Object,
            Value::Nested(r) => ValueKind::nested(r.kind(), r.value_kind()),
        }
    }

    /// Whether this value is admissible under the given handle value type.
    pub(crate) fn matches(&self, kind: &ValueKind) -> bool {
        match (self, kind) {
            (Value::Number(_), ValueKind::Number) => true,
            (Value::Boolean(_), ValueKind::Boolean) => true,
            (Value::String(_), ValueKind::String) => true,
            (Value::Object(_), ValueKind::Object) => true,
            (Value::Nested(r), ValueKind::Nested { kind, inner }) => {
                r.kind() == *kind && r.value_kind() == **inner
            }
            _ => false,
        }
    }

    /// The byte encoding stored in the arena. Numbers are eight bytes of
    /// IEEE-754, booleans a single byte, text UTF-8, objects and nested
    /// structures JSON.
    pub(crate) fn to_bytes(&self) -> Result<Cow<'_, [u8]>, StoreError> {
        Ok(match self {
            Value::Number(n) => Cow::Owned(n.to_le_bytes().to_vec()),
            Value::Boolean(b) => Cow::Owned(vec![u8::from(*b)]),
            Value::String(s) => Cow::Borrowed(s.as_bytes()),
            Value::Object(o) => Cow::Owned(
                serde_json::to_vec(o)
                    .map_err(|_| StoreError::InvalidEnvelope)?,
            ),
            Value::Nested(r) => Cow::Owned(encode_structure(r)?),
        })
    }

    pub(crate) fn from_bytes(
        kind: &ValueKind,
        bytes: &[u8],
    ) -> Result<Value, StoreError> {
        Ok(match kind {
            ValueKind::Number => Value::Number(key_f64(bytes)),
            ValueKind::Boolean => {
                Value::Boolean(bytes.first().copied().unwrap_or(0) != 0)
            }
            ValueKind::String => {
                Value::String(String::from_utf8_lossy(bytes).into_owned())
            }
            ValueKind::Object => Value::Object(
                serde_json::from_slice(bytes)
                    .map_err(|_| StoreError::InvalidEnvelope)?,
            ),
            ValueKind::Nested { .. } => {
                Value::Nested(decode_structure(bytes)?)
            }
        })
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

//------------ StructureRef --------------------------------------------------

/// A handle to some structure, as it appears inside a nested value or a
/// publish snapshot. This is the compile-time closed set behind the
/// envelope registry; deserialization is the only place the kind is looked
/// up at runtime.
#[derive(Clone, Debug, PartialEq)]
pub enum StructureRef {
    Map(SharedMap),
    Set(SharedSet),
    List(SharedList),
    Stack(SharedStack),
    Queue(SharedQueue),
    LinkedList(SharedLinkedList),
    DoublyLinkedList(SharedDoublyLinkedList),
    OrderedMap(SharedOrderedMap),
    OrderedSet(SharedOrderedSet),
    SortedMap(SharedSortedMap),
    SortedSet(SharedSortedSet),
    PriorityQueue(SharedPriorityQueue),
}

impl StructureRef {
    pub fn kind(&self) -> StructureKind {
        match self {
            StructureRef::Map(_) => StructureKind::Map,
            StructureRef::Set(_) => StructureKind::Set,
            StructureRef::List(_) => StructureKind::List,
            StructureRef::Stack(_) => StructureKind::Stack,
            StructureRef::Queue(_) => StructureKind::Queue,
            StructureRef::LinkedList(_) => StructureKind::LinkedList,
            StructureRef::DoublyLinkedList(_) => {
                StructureKind::DoublyLinkedList
            }
            StructureRef::OrderedMap(_) => StructureKind::OrderedMap,
            StructureRef::OrderedSet(_) => StructureKind::OrderedSet,
            StructureRef::SortedMap(_) => StructureKind::SortedMap,
            StructureRef::SortedSet(_) => StructureKind::SortedSet,
            StructureRef::PriorityQueue(_) => StructureKind::PriorityQueue,
        }
    }

    /// The value type of the inner structure, i.e. the `__i` tag.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            StructureRef::Map(h) => h.value_kind().clone(),
            StructureRef::Set(_) => ValueKind::String,
            StructureRef::List(h) => h.value_kind().clone(),
            StructureRef::Stack(h) => h.value_kind().clone(),
            StructureRef::Queue(h) => h.value_kind().clone(),
            StructureRef::LinkedList(h) => h.value_kind().clone(),
            StructureRef::DoublyLinkedList(h) => h.value_kind().clone(),
            StructureRef::OrderedMap(h) => h.value_kind().clone(),
            StructureRef::OrderedSet(_) => ValueKind::String,
            StructureRef::SortedMap(h) => h.value_kind().clone(),
            StructureRef::SortedSet(_) => ValueKind::String,
            StructureRef::PriorityQueue(h) => h.value_kind().clone(),
        }
    }
}

//------------ Envelope ------------------------------------------------------

// The JSON triple that lets a structure store another structure as a value
// without the byte layer understanding the inner structure. `__t` names the
// structure kind, `__i` the inner value type, `__d` the handle fields.

#[derive(Deserialize, Serialize)]
struct Envelope {
    #[serde(rename = "__t")]
    tag: String,
    #[serde(rename = "__i")]
    inner: String,
    #[serde(rename = "__d")]
    data: serde_json::Value,
}

pub(crate) fn encode_structure(
    r: &StructureRef,
) -> Result<Vec<u8>, StoreError> {
    let data = match r {
        StructureRef::Map(h) => serde_json::to_value(h),
        StructureRef::Set(h) => serde_json::to_value(h),
        StructureRef::List(h) => serde_json::to_value(h),
        StructureRef::Stack(h) => serde_json::to_value(h),
        StructureRef::Queue(h) => serde_json::to_value(h),
        StructureRef::LinkedList(h) => serde_json::to_value(h),
        StructureRef::DoublyLinkedList(h) => serde_json::to_value(h),
        StructureRef::OrderedMap(h) => serde_json::to_value(h),
        StructureRef::OrderedSet(h) => serde_json::to_value(h),
        StructureRef::SortedMap(h) => serde_json::to_value(h),
        StructureRef::SortedSet(h) => serde_json::to_value(h),
        StructureRef::PriorityQueue(h) => serde_json::to_value(h),
    }
    .map_err(|_| StoreError::InvalidEnvelope)?;

    let env = Envelope {
        tag: r.kind().tag().to_string(),
        inner: r.value_kind().to_string(),
        data,
    };
    serde_json::to_vec(&env).map_err(|_| StoreError::InvalidEnvelope)
}

/// Decodes a nested-structure envelope back into a handle.
///
/// Fails with [`StoreError::UnknownStructureKind`] when the `__t` tag does
/// not resolve, and with [`StoreError::InvalidEnvelope`] when the bytes are
/// not a well-formed envelope at all.
pub fn decode_structure(bytes: &[u8]) -> Result<StructureRef, StoreError> {
    let env: Envelope = serde_json::from_slice(bytes)
        .map_err(|_| StoreError::InvalidEnvelope)?;
    let kind = StructureKind::from_tag(&env.tag)?;

    fn from_data<T: serde::de::DeserializeOwned>(
        data: serde_json::Value,
    ) -> Result<T, StoreError> {
        serde_json::from_value(data).map_err(|_| StoreError::InvalidEnvelope)
    }

    Ok(match kind {
        StructureKind::Map => StructureRef::Map(from_data(env.data)?),
        StructureKind::Set => StructureRef::Set(from_data(env.data)?),
        StructureKind::List => StructureRef::List(from_data(env.data)?),
        StructureKind::Stack => StructureRef::Stack(from_data(env.data)?),
        StructureKind::Queue => StructureRef::Queue(from_data(env.data)?),
        StructureKind::LinkedList => {
            StructureRef::LinkedList(from_data(env.data)?)
        }
        StructureKind::DoublyLinkedList => {
            StructureRef::DoublyLinkedList(from_data(env.data)?)
        }
        StructureKind::OrderedMap => {
            StructureRef::OrderedMap(from_data(env.data)?)
        }
        StructureKind::OrderedSet => {
            StructureRef::OrderedSet(from_data(env.data)?)
        }
        StructureKind::SortedMap => {
            StructureRef::SortedMap(from_data(env.data)?)
        }
        StructureKind::SortedSet => {
            StructureRef::SortedSet(from_data(env.data)?)
        }
        StructureKind::PriorityQueue => {
            StructureRef::PriorityQueue(from_data(env.data)?)
        }
    })
}
