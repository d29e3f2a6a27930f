//------------ Shared handles ------------------------------------------------

//! The handle layer: one small immutable record per structure, carrying
//! exactly the identifiers needed to read and extend one logical version.
//! Every write returns a new handle; the old one keeps answering for the
//! version it was issued for. Handles serialize (they ride inside nested
//! envelopes and publish snapshots) and carry the arena generation, which
//! is how the stale-after-reset policy is enforced: stale reads come back
//! absent, stale writes hand out a fresh empty handle instead of touching
//! a heap that no longer exists.

pub mod linked;
pub mod map;
pub mod ordered;
pub mod pqueue;
pub mod sorted;
pub mod stack_queue;
pub mod vec_list;

use crate::arena::Arena;
use crate::types::errors::StoreError;
use crate::types::packed::PackedWord;
use crate::types::value::{Value, ValueKind};

// The eight-byte slot encoding used by the list-shaped families: numbers
// ride in the slot directly, booleans as 0/1, everything else as a packed
// word into blob storage in the low half.
pub(crate) fn encode_slot(
    arena: &mut Arena,
    kind: &ValueKind,
    value: &Value,
) -> Result<u64, StoreError> {
    if !value.matches(kind) {
        return Err(StoreError::ValueKindMismatch);
    }
    match value {
        Value::Number(n) => Ok(n.to_bits()),
        Value::Boolean(b) => Ok(u64::from(*b)),
        _ => Ok(u64::from(encode_word_unchecked(arena, value)?.bits())),
    }
}

pub(crate) fn decode_slot(
    arena: &Arena,
    kind: &ValueKind,
    slot: u64,
) -> Result<Value, StoreError> {
    match kind {
        ValueKind::Number => Ok(Value::Number(f64::from_bits(slot))),
        ValueKind::Boolean => Ok(Value::Boolean(slot != 0)),
        _ => {
            let word = PackedWord::from_bits(slot as u32);
            Value::from_bytes(kind, arena.blob(word))
        }
    }
}

// The packed-word encoding used by the tree-shaped families: every value,
// numbers included, becomes a blob referenced by one u32 slot.
pub(crate) fn encode_word(
    arena: &mut Arena,
    kind: &ValueKind,
    value: &Value,
) -> Result<PackedWord, StoreError> {
    if !value.matches(kind) {
        return Err(StoreError::ValueKindMismatch);
    }
    encode_word_unchecked(arena, value)
}

fn encode_word_unchecked(
    arena: &mut Arena,
    value: &Value,
) -> Result<PackedWord, StoreError> {
    let bytes = value.to_bytes()?;
    let len = arena.stage_value(&bytes)?;
    arena.commit_value(len)
}

pub(crate) fn decode_word(
    arena: &Arena,
    kind: &ValueKind,
    word: PackedWord,
) -> Result<Value, StoreError> {
    Value::from_bytes(kind, arena.blob(word))
}
