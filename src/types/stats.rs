//------------ Types for Statistics -----------------------------------------

use std::fmt::{Debug, Display};

/// Allocation counters kept by an [`Arena`](crate::Arena).
///
/// These are bookkeeping only; nothing in the store reads them back. They
/// exist so an operator can see where the memory of a long-lived family
/// went without walking the heap.
#[derive(Clone, Copy, Default)]
pub struct Counters {
    nodes_created: u64,
    blobs_created: u64,
    free_list_reuses: u64,
    resets: u64,
}

impl Counters {
    pub(crate) fn inc_nodes_created(&mut self) {
        self.nodes_created += 1;
    }

    pub(crate) fn inc_blobs_created(&mut self) {
        self.blobs_created += 1;
    }

    pub(crate) fn inc_free_list_reuses(&mut self) {
        self.free_list_reuses += 1;
    }

    pub(crate) fn inc_resets(&mut self) {
        self.resets += 1;
    }

    pub fn nodes_created(&self) -> u64 {
        self.nodes_created
    }

    pub fn blobs_created(&self) -> u64 {
        self.blobs_created
    }

    pub fn free_list_reuses(&self) -> u64 {
        self.free_list_reuses
    }

    pub fn resets(&self) -> u64 {
        self.resets
    }
}

impl Debug for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "nodes {} blobs {} reused {} resets {}",
            self.nodes_created,
            self.blobs_created,
            self.free_list_reuses,
            self.resets
        )
    }
}

impl Display for Counters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "{} nodes created", self.nodes_created)?;
        writeln!(f, "{} blobs created", self.blobs_created)?;
        writeln!(f, "{} free-list reuses", self.free_list_reuses)?;
        writeln!(f, "{} resets", self.resets)
    }
}
