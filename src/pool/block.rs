//! Block chain nodes for the pool's bump allocator.

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::mem;
use std::ptr::NonNull;

use crate::platform::POOL_ALIGNMENT;

/// Bytes charged against a block's usable capacity for its own bookkeeping.
///
/// The header itself lives out-of-line (see [`BlockHeader`]'s doc comment),
/// but the capacity arithmetic in `Pool::create`/`palloc` still needs to
/// match the budget a header-inside-the-buffer design would produce, so
/// this many bytes are subtracted from every block's raw size before it
/// becomes usable.
pub(crate) const HEADER_RESERVE: usize = mem::size_of::<BlockHeader>();

/// One link of the pool's block chain.
///
/// A block's `{start, end, last, next, failed}` header could live inline
/// inside the block's own buffer, ahead of the bytes it bump-allocates
/// from, but that would need a raw-pointer cast back into typed fields on
/// every access. Instead this header is a separate heap allocation reached
/// only through the raw pointers `Pool` manages — a thin pointer
/// abstraction over the block's byte range without safe-slice semantics
/// layered underneath, since the bump allocator depends on raw `end -
/// last` and `align_up(last)` arithmetic.
pub(crate) struct BlockHeader {
    /// Base address of the block's raw byte buffer, and the layout it was
    /// allocated with — needed to free the buffer later.
    pub(crate) raw: NonNull<u8>,
    pub(crate) layout: Layout,
    /// One past the last usable byte (raw size minus [`HEADER_RESERVE`]).
    pub(crate) end: *mut u8,
    /// Current bump pointer; `raw <= last <= end`.
    pub(crate) last: Cell<*mut u8>,
    pub(crate) next: Cell<Option<NonNull<BlockHeader>>>,
    pub(crate) failed: Cell<u32>,
}

impl BlockHeader {
    /// Allocates a fresh block of `block_size` raw bytes, aligned to
    /// [`POOL_ALIGNMENT`], and boxes up its header.
    ///
    /// Returns `None` (OutOfMemory) if `block_size` can't fit the header
    /// charge, or if the backing allocation fails.
    pub(crate) fn new(block_size: usize) -> Option<NonNull<BlockHeader>> {
        let usable = block_size.checked_sub(HEADER_RESERVE)?;
        let layout = Layout::from_size_align(block_size, POOL_ALIGNMENT).ok()?;
        // SAFETY: `layout` has non-zero size, checked above.
        let raw = NonNull::new(unsafe { alloc::alloc(layout) })?;
        let end = unsafe { raw.as_ptr().add(usable) };
        let header = Box::new(BlockHeader {
            raw,
            layout,
            end,
            last: Cell::new(raw.as_ptr()),
            next: Cell::new(None),
            failed: Cell::new(0),
        });
        Some(NonNull::from(Box::leak(header)))
    }

    /// Frees this header's raw buffer and drops the header box itself.
    ///
    /// # Safety
    /// `header` must have come from [`BlockHeader::new`] and must not be
    /// used again, by any pointer, after this call.
    pub(crate) unsafe fn destroy(header: NonNull<BlockHeader>) {
        let boxed = unsafe { Box::from_raw(header.as_ptr()) };
        unsafe { alloc::dealloc(boxed.raw.as_ptr(), boxed.layout) };
    }
}
