//------------ Config --------------------------------------------------------

//! Configuration options for an arena: how much backing memory to start
//! with, how far it may grow, and whether replaced roots are released
//! automatically.

/// Defines when roots that were replaced through a slot table are handed
/// back to the free list.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReleaseStrategy {
    /// Replaced roots are only released when the caller says so, through
    /// `RootSlots::release_pending` or a whole-arena reset.
    Manual,
    /// Replaced roots collect on a pending list that is drained whenever
    /// the list reaches `ops_threshold` entries or the heap cursor passes
    /// `memory_threshold` bytes.
    Auto {
        ops_threshold: u32,
        memory_threshold: u32,
    },
}

impl Default for ReleaseStrategy {
    fn default() -> Self {
        ReleaseStrategy::Manual
    }
}

//------------ StoreConfig ---------------------------------------------------

#[derive(Copy, Clone, Debug)]
pub struct StoreConfig {
    /// Number of 64 KiB pages the backing memory starts out with. The
    /// arena grows by whole pages beyond this on demand.
    pub initial_pages: u32,
    /// Hard cap on the backing memory. Growing past it fails with
    /// `OutOfMemory`. `None` leaves growth to the allocator.
    pub max_bytes: Option<u32>,
    pub release_strategy: ReleaseStrategy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_pages: 2,
            max_bytes: None,
            release_strategy: ReleaseStrategy::Manual,
        }
    }
}
