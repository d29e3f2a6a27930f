use std::fmt;

/// Possible errors returned by methods on an arena or on a structure
/// handle.
///
/// Out-of-bounds reads, operations on empty structures and reads through
/// stale (pre-reset) handles are not errors: they are absorbed into absent
/// results and no-op writes, so the API stays total. What is left are the
/// conditions a caller genuinely has to deal with.
#[derive(Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The backing memory for the arena cannot grow any further, either
    /// because the configured cap was hit or because the allocator refused
    /// us. Fatal at the point of call.
    OutOfMemory,
    /// While decoding a nested value, the `__t` tag of the envelope did not
    /// resolve to a known structure kind.
    UnknownStructureKind,
    /// The bytes stored for a nested value are not a well-formed envelope.
    /// Either the arena is corrupted or the bytes were written by something
    /// that is not this library.
    InvalidEnvelope,
    /// A key or value payload is longer than a packed word can describe
    /// (4095 bytes), or longer than the staging region. Callers must
    /// segment large payloads above this library.
    BlobTooLarge,
    /// A blob would have to be placed beyond the window a packed word can
    /// point into (1 MiB from the arena base). The arena can keep growing
    /// for node storage, but no new packed payloads fit.
    ArenaRangeExceeded,
    /// The value passed to a write does not match the value type the
    /// handle was created with.
    ValueKindMismatch,
}

impl std::error::Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StoreError::OutOfMemory => {
                write!(f, "Error: The arena cannot grow its backing memory.")
            }
            StoreError::UnknownStructureKind => {
                write!(
                    f,
                    "Error: The envelope tag does not name a known \
                    structure kind."
                )
            }
            StoreError::InvalidEnvelope => {
                write!(
                    f,
                    "Error: The stored bytes are not a well-formed nested \
                    structure envelope."
                )
            }
            StoreError::BlobTooLarge => {
                write!(
                    f,
                    "Error: The payload does not fit a packed word. \
                    Payloads are limited to 4095 bytes."
                )
            }
            StoreError::ArenaRangeExceeded => {
                write!(
                    f,
                    "Error: No packed payload can be allocated beyond 1 MiB \
                    from the arena base."
                )
            }
            StoreError::ValueKindMismatch => {
                write!(
                    f,
                    "Error: The value does not match the value type of \
                    this handle."
                )
            }
        }
    }
}
