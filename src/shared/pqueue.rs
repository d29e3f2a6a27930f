use serde_derive::{Deserialize, Serialize};

use crate::arena::{Arena, FamilyLayout};
use crate::pqueue::{binary, leftist};
use crate::shared::{decode_word, encode_word};
use crate::types::errors::StoreError;
use crate::types::packed::PackedWord;
use crate::types::value::{Value, ValueKind};

//------------ SharedPriorityQueue -------------------------------------------

/// Which engine backs a priority queue.
///
/// `Leftist` is the persistent default. `Binary` mutates its block in
/// place and is offered as a performance knob; its handle caches the top
/// entry so `peek` on an older handle answers for that handle, but
/// contents must not be shared across versions that are expected to
/// differ.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Serialize)]
pub enum PqBackend {
    Leftist {
        root: u32,
    },
    Binary {
        heap: u32,
        top: Option<(f64, u32)>,
    },
}

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct SharedPriorityQueue {
    backend: PqBackend,
    size: u32,
    value_kind: ValueKind,
    is_max: bool,
    generation: u32,
}

impl SharedPriorityQueue {
    pub fn family_layout() -> FamilyLayout {
        FamilyLayout::plain(leftist::NODE_CLASS)
    }

    /// A persistent leftist-heap queue. `is_max` picks the direction.
    pub fn new(arena: &Arena, value_kind: ValueKind, is_max: bool) -> Self {
        Self {
            backend: PqBackend::Leftist { root: 0 },
            size: 0,
            value_kind,
            is_max,
            generation: arena.generation(),
        }
    }

    /// The in-place binary-heap variant, sized for `capacity` entries up
    /// front.
    pub fn new_binary(
        arena: &mut Arena,
        value_kind: ValueKind,
        is_max: bool,
        capacity: u32,
    ) -> Result<Self, StoreError> {
        let heap = binary::create(arena, capacity)?;
        Ok(Self {
            backend: PqBackend::Binary { heap, top: None },
            size: 0,
            value_kind,
            is_max,
            generation: arena.generation(),
        })
    }

    pub fn len(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn is_max(&self) -> bool {
        self.is_max
    }

    pub fn value_kind(&self) -> &ValueKind {
        &self.value_kind
    }

    pub fn backend(&self) -> PqBackend {
        self.backend
    }

    fn live(&self, arena: &Arena) -> bool {
        self.generation == arena.generation()
    }

    fn fresh(&self, arena: &mut Arena) -> Result<Self, StoreError> {
        match self.backend {
            PqBackend::Leftist { .. } => {
                Ok(Self::new(arena, self.value_kind.clone(), self.is_max))
            }
            PqBackend::Binary { .. } => Self::new_binary(
                arena,
                self.value_kind.clone(),
                self.is_max,
                16,
            ),
        }
    }

    pub fn enqueue(
        &self,
        arena: &mut Arena,
        priority: f64,
        value: &Value,
    ) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return self.fresh(arena);
        }
        let word = encode_word(arena, &self.value_kind, value)?;
        let backend = match self.backend {
            PqBackend::Leftist { root } => PqBackend::Leftist {
                root: leftist::insert(
                    arena, root, priority, word, self.is_max,
                )?,
            },
            PqBackend::Binary { heap, .. } => {
                let heap = binary::insert(
                    arena, heap, priority, word, self.is_max,
                )?;
                PqBackend::Binary {
                    heap,
                    top: binary::peek(arena, heap)
                        .map(|(p, w)| (p, w.bits())),
                }
            }
        };
        Ok(Self {
            backend,
            size: self.size + 1,
            value_kind: self.value_kind.clone(),
            is_max: self.is_max,
            generation: self.generation,
        })
    }

    /// Removes the best entry; an empty queue is a no-op.
    pub fn dequeue(&self, arena: &mut Arena) -> Result<Self, StoreError> {
        if !self.live(arena) {
            return self.fresh(arena);
        }
        if self.size == 0 {
            return Ok(self.clone());
        }
        let backend = match self.backend {
            PqBackend::Leftist { root } => PqBackend::Leftist {
                root: leftist::extract(arena, root, self.is_max)?,
            },
            PqBackend::Binary { heap, .. } => {
                binary::extract(arena, heap, self.is_max);
                PqBackend::Binary {
                    heap,
                    top: binary::peek(arena, heap)
                        .map(|(p, w)| (p, w.bits())),
                }
            }
        };
        Ok(Self {
            backend,
            size: self.size - 1,
            value_kind: self.value_kind.clone(),
            is_max: self.is_max,
            generation: self.generation,
        })
    }

    pub fn peek_priority(&self, arena: &Arena) -> Option<f64> {
        if !self.live(arena) || self.size == 0 {
            return None;
        }
        match self.backend {
            PqBackend::Leftist { root } => {
                leftist::peek(arena, root).map(|(p, _)| p)
            }
            PqBackend::Binary { top, .. } => top.map(|(p, _)| p),
        }
    }

    pub fn peek(
        &self,
        arena: &Arena,
    ) -> Result<Option<Value>, StoreError> {
        if !self.live(arena) || self.size == 0 {
            return Ok(None);
        }
        let word = match self.backend {
            PqBackend::Leftist { root } => {
                leftist::peek(arena, root).map(|(_, w)| w)
            }
            PqBackend::Binary { top, .. } => {
                top.map(|(_, bits)| PackedWord::from_bits(bits))
            }
        };
        match word {
            None => Ok(None),
            Some(w) => decode_word(arena, &self.value_kind, w).map(Some),
        }
    }
}
