//! Large-allocation list nodes.

use std::alloc::Layout;
use std::cell::Cell;
use std::ptr::NonNull;

/// Scan bound for reusing a freed large-allocation slot: a deliberate O(1)
/// bound, not an accident — preserve it rather than scanning the whole
/// list, since that bound is what keeps large-allocation reuse cheap.
pub(crate) const LARGE_REUSE_SCAN_LIMIT: usize = 4;

/// One entry in the pool's large-allocation list. Node storage is
/// pool-backed; the buffer it describes is heap-backed and freed
/// independently of the pool's blocks.
///
/// `alloc = None` marks a slot `pfree` emptied out and available for the
/// bounded reuse scan in `Pool::link_large_reuse`. `next` is left
/// untouched when a slot is freed — the node stays linked, only its
/// `alloc` goes to `None`.
pub(crate) struct LargeNode {
    pub(crate) alloc: Cell<Option<(NonNull<u8>, Layout)>>,
    pub(crate) next: Cell<Option<NonNull<LargeNode>>>,
}
