//! Region-based memory pool: a chain of bump-allocated blocks, a large
//! allocation list, and a cleanup handler chain behind one arena handle.

mod block;
mod cleanup;
mod large;

use std::alloc::{self, Layout};
use std::cell::Cell;
use std::cmp;
use std::mem;
use std::ptr::{self, NonNull};

#[cfg(unix)]
pub use cleanup::{close_and_delete_file, close_fd, FileCleanup};
pub use cleanup::CleanupHandler;

use block::{BlockHeader, HEADER_RESERVE};
use cleanup::CleanupNode;
use large::{LargeNode, LARGE_REUSE_SCAN_LIMIT};

use crate::log::{pool_debug, pool_warn, Log};
use crate::platform::{self, WORD_ALIGNMENT};

/// Outcome of [`Pool::pfree`]. `Declined` is informational, not an error:
/// the pointer simply wasn't a live large allocation of this pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeOutcome {
    Freed,
    Declined,
}

/// A region-based memory pool.
///
/// Single-owner, `!Send`/`!Sync` by construction (every field is reached
/// through raw pointers or `Cell`s): a pool is never shared across threads
/// without external synchronization.
///
/// Dropping a `Pool` runs every registered cleanup handler in LIFO order,
/// frees every outstanding large allocation, then frees every block —
/// exactly what [`Pool::destroy`] does. `destroy` exists as a named entry
/// point for callers who prefer an explicit call; it has no behavior
/// beyond the implicit drop.
pub struct Pool {
    head: NonNull<BlockHeader>,
    current: Cell<NonNull<BlockHeader>>,
    large: Cell<Option<NonNull<LargeNode>>>,
    cleanup: Cell<Option<NonNull<CleanupNode>>>,
    log: Log,
    /// Upper bound on a request `palloc`/`pnalloc` will still serve from a
    /// block; larger requests go to the large path.
    max: usize,
    /// Size of every block in the chain, fixed at creation (the pool never
    /// grows its block size).
    block_size: usize,
}

impl Pool {
    /// Creates a pool with one block of `size` raw bytes.
    ///
    /// Returns `None` (OutOfMemory) if `size` can't fit even the block
    /// header charge, or if the backing aligned allocation fails.
    pub fn create(size: usize, log: Log) -> Option<Pool> {
        let head = BlockHeader::new(size)?;
        let max = cmp::min(size - HEADER_RESERVE, platform::size_threshold());
        Some(Pool {
            head,
            current: Cell::new(head),
            large: Cell::new(None),
            cleanup: Cell::new(None),
            log,
            max,
            block_size: size,
        })
    }

    /// The log handle this pool attributes its diagnostics to.
    pub fn log(&self) -> Log {
        self.log
    }

    /// Upper bound on a block-served allocation; requests larger than this
    /// take the large-object path.
    pub fn max(&self) -> usize {
        self.max
    }

    // ---- allocation -----------------------------------------------------

    /// Word-aligned allocation of `n` bytes.
    pub fn palloc(&self, n: usize) -> Option<NonNull<u8>> {
        if n <= self.max {
            self.alloc_small(n, true)
        } else {
            self.alloc_large(n)
        }
    }

    /// Byte-granular allocation of `n` bytes, with no alignment step.
    pub fn pnalloc(&self, n: usize) -> Option<NonNull<u8>> {
        if n <= self.max {
            self.alloc_small(n, false)
        } else {
            self.alloc_large(n)
        }
    }

    /// Word-aligned allocation of `n` zeroed bytes.
    pub fn pcalloc(&self, n: usize) -> Option<NonNull<u8>> {
        let ptr = self.palloc(n)?;
        // SAFETY: `ptr` is exclusively ours, `n` bytes live.
        unsafe { ptr.as_ptr().write_bytes(0, n) };
        Some(ptr)
    }

    /// Allocates `n` bytes aligned to `alignment`, always via the large
    /// path — the alignment requested may not match any prior large entry,
    /// so there is no reuse scan here.
    pub fn pmemalign(&self, n: usize, alignment: usize) -> Option<NonNull<u8>> {
        if n == 0 {
            return Some(NonNull::dangling());
        }
        let layout = Layout::from_size_align(n, alignment).ok()?;
        // SAFETY: `layout.size() == n > 0`, checked above.
        let raw = NonNull::new(unsafe { alloc::alloc(layout) })?;
        if self.link_large_new(raw, layout).is_none() {
            unsafe { alloc::dealloc(raw.as_ptr(), layout) };
            pool_warn!(self.log, "pmemalign: OOM recording {n}-byte large allocation");
            return None;
        }
        Some(raw)
    }

    fn alloc_small(&self, n: usize, align: bool) -> Option<NonNull<u8>> {
        let mut block = Some(self.current.get());
        while let Some(b) = block {
            // SAFETY: every block in the chain is live until the pool is
            // dropped.
            let hdr = unsafe { b.as_ref() };
            let last = hdr.last.get();
            let m = if align {
                unsafe { platform::align_up_ptr(last, WORD_ALIGNMENT) }
            } else {
                last
            };
            if (m as usize) <= (hdr.end as usize) && (hdr.end as usize) - (m as usize) >= n {
                hdr.last.set(unsafe { m.add(n) });
                return NonNull::new(m);
            }
            block = hdr.next.get();
        }
        self.palloc_block(n)
    }

    /// Links a fresh block of `block_size` bytes onto the chain, satisfying
    /// the `n`-byte request atomically with the block's creation. Walks
    /// from `current` to the tail, incrementing every visited block's
    /// `failed` counter and advancing `current` past any block that has
    /// now failed more than 4 times.
    fn palloc_block(&self, n: usize) -> Option<NonNull<u8>> {
        let new_block = BlockHeader::new(self.block_size)?;
        // SAFETY: just allocated, uniquely owned here.
        let new_hdr = unsafe { new_block.as_ref() };
        let m = unsafe { platform::align_up_ptr(new_hdr.last.get(), WORD_ALIGNMENT) };
        new_hdr.last.set(unsafe { m.add(n) });

        let mut p = self.current.get();
        loop {
            // SAFETY: `p` is always a live block in this chain.
            let hdr = unsafe { p.as_ref() };
            let Some(next) = hdr.next.get() else { break };
            let failed = hdr.failed.get() + 1;
            hdr.failed.set(failed);
            if failed > 4 {
                self.current.set(next);
            }
            p = next;
        }
        // SAFETY: `p` is the chain's tail block.
        unsafe { p.as_ref() }.next.set(Some(new_block));
        pool_debug!(self.log, "palloc_block: linked a new {}-byte block", self.block_size);
        NonNull::new(m)
    }

    fn alloc_large(&self, n: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(n, mem::align_of::<usize>())
            .ok()?
            .pad_to_align();
        // SAFETY: size is non-zero when `n > 0`; the `n == 0` case is
        // permitted to return any non-null aligned pointer.
        let raw = NonNull::new(unsafe { alloc::alloc(layout) })?;
        if self.link_large_reuse(raw, layout).is_none() {
            unsafe { alloc::dealloc(raw.as_ptr(), layout) };
            pool_warn!(self.log, "palloc_large: OOM recording {n}-byte large allocation");
            return None;
        }
        pool_debug!(self.log, "palloc_large: served {n} bytes from the system allocator");
        Some(raw)
    }

    /// Scans up to [`LARGE_REUSE_SCAN_LIMIT`] nodes of the large list for a
    /// freed slot before falling back to allocating a new node.
    fn link_large_reuse(&self, ptr: NonNull<u8>, layout: Layout) -> Option<()> {
        let mut node = self.large.get();
        for _ in 0..LARGE_REUSE_SCAN_LIMIT {
            let Some(n) = node else { break };
            // SAFETY: large nodes are pool-allocated and live until reset
            // or destroy.
            let hdr = unsafe { n.as_ref() };
            if hdr.alloc.get().is_none() {
                hdr.alloc.set(Some((ptr, layout)));
                return Some(());
            }
            node = hdr.next.get();
        }
        self.link_large_new(ptr, layout)
    }

    fn link_large_new(&self, ptr: NonNull<u8>, layout: Layout) -> Option<()> {
        let node = self.alloc_in_place(LargeNode {
            alloc: Cell::new(Some((ptr, layout))),
            next: Cell::new(self.large.get()),
        })?;
        self.large.set(Some(node));
        Some(())
    }

    /// Frees a prior large allocation. Returns [`FreeOutcome::Declined`],
    /// not an error, if `ptr` isn't a live large entry of this pool.
    pub fn pfree(&self, ptr: NonNull<u8>) -> FreeOutcome {
        let mut node = self.large.get();
        while let Some(n) = node {
            // SAFETY: see `link_large_reuse`.
            let hdr = unsafe { n.as_ref() };
            if let Some((alloc_ptr, layout)) = hdr.alloc.get() {
                if alloc_ptr == ptr {
                    unsafe { alloc::dealloc(alloc_ptr.as_ptr(), layout) };
                    hdr.alloc.set(None);
                    pool_debug!(self.log, "pfree: freed a large allocation");
                    return FreeOutcome::Freed;
                }
            }
            node = hdr.next.get();
        }
        FreeOutcome::Declined
    }

    /// Frees every outstanding large buffer and rewinds every block's bump
    /// pointer to its post-header start. Cleanup handlers are **not**
    /// invoked.
    pub fn reset(&self) {
        let mut node = self.large.get();
        while let Some(n) = node {
            let hdr = unsafe { n.as_ref() };
            if let Some((ptr, layout)) = hdr.alloc.get() {
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
            }
            node = hdr.next.get();
        }
        self.large.set(None);

        let mut block = Some(self.head);
        while let Some(b) = block {
            let hdr = unsafe { b.as_ref() };
            hdr.last.set(hdr.raw.as_ptr());
            hdr.failed.set(0);
            block = hdr.next.get();
        }
        self.current.set(self.head);
    }

    // ---- cooperative growth, used only by `Array` ------------------------

    /// If `tail` is exactly the current block's bump pointer and there is
    /// room for `extra_bytes` more, advances the bump pointer in place and
    /// returns `true`. This is the private hook array growth needs; it is
    /// deliberately not exposed as a general resize/grow API.
    pub(crate) fn try_extend_tail(&self, tail: *mut u8, extra_bytes: usize) -> bool {
        let hdr = unsafe { self.current.get().as_ref() };
        if tail != hdr.last.get() {
            return false;
        }
        let Some(new_last) = (tail as usize).checked_add(extra_bytes) else {
            return false;
        };
        if new_last > hdr.end as usize {
            return false;
        }
        hdr.last.set(new_last as *mut u8);
        true
    }

    /// If `tail` is exactly the current block's bump pointer, rewinds it
    /// back by `bytes`. Used only by `Array::destroy`'s opportunistic
    /// reclaim; this is not a general free.
    pub(crate) fn try_rewind_tail(&self, tail: *mut u8, bytes: usize) -> bool {
        let hdr = unsafe { self.current.get().as_ref() };
        if tail != hdr.last.get() {
            return false;
        }
        hdr.last.set(unsafe { tail.sub(bytes) });
        true
    }

    // ---- cleanup chain ----------------------------------------------------

    /// Allocates a cleanup node from the pool and, if `data_size > 0`, a
    /// pool buffer of that size for the caller to populate. Inserted at the
    /// head of the cleanup chain.
    pub fn cleanup_add(&self, data_size: usize) -> Option<NonNull<()>> {
        let node = self.alloc_in_place(CleanupNode {
            handler: Cell::new(None),
            data: Cell::new(ptr::null_mut()),
            next: Cell::new(self.cleanup.get()),
        })?;
        if data_size > 0 {
            let data = self.palloc(data_size)?;
            unsafe { node.as_ref() }.data.set(data.as_ptr());
        }
        self.cleanup.set(Some(node));
        Some(node.cast())
    }

    /// Installs `handler` on a node returned by [`Pool::cleanup_add`].
    ///
    /// # Safety
    /// `node` must be a still-registered handle from this pool's
    /// `cleanup_add`.
    pub unsafe fn cleanup_set_handler(&self, node: NonNull<()>, handler: CleanupHandler) {
        unsafe { node.cast::<CleanupNode>().as_ref() }
            .handler
            .set(Some(handler));
    }

    /// The data buffer allocated for `node` by `cleanup_add`, or a dangling
    /// pointer if `data_size` was 0.
    ///
    /// # Safety
    /// `node` must be a still-registered handle from this pool's
    /// `cleanup_add`.
    pub unsafe fn cleanup_data(&self, node: NonNull<()>) -> *mut u8 {
        unsafe { node.cast::<CleanupNode>().as_ref() }.data.get()
    }

    /// Runs and clears the well-known `close_fd` handler for any
    /// still-registered node whose [`FileCleanup::fd`] equals `fd`, so
    /// `destroy`/drop will not re-invoke it for a descriptor whose lifetime
    /// the caller ended early.
    #[cfg(unix)]
    pub fn run_cleanup_file(&self, fd: std::os::fd::RawFd) {
        let mut node = self.cleanup.get();
        while let Some(n) = node {
            let hdr = unsafe { n.as_ref() };
            if hdr.handler.get() == Some(close_fd) {
                let data = hdr.data.get();
                if !data.is_null() && unsafe { &*(data as *const FileCleanup) }.fd == fd {
                    // SAFETY: `data` was allocated and populated as a
                    // `FileCleanup` by this pool's `cleanup_add`.
                    unsafe { close_fd(data) };
                    hdr.handler.set(None);
                }
            }
            node = hdr.next.get();
        }
    }

    /// Allocates `value` from the pool and registers its `Drop::drop` to
    /// run at destroy time, so values owning non-pool resources (an open
    /// file, a heap buffer) aren't leaked when the pool goes away.
    pub fn alloc_with_cleanup<T>(&self, value: T) -> Option<NonNull<T>> {
        let node = self.alloc_in_place(CleanupNode {
            handler: Cell::new(None),
            data: Cell::new(ptr::null_mut()),
            next: Cell::new(self.cleanup.get()),
        })?;

        let typed = if mem::size_of::<T>() == 0 {
            NonNull::dangling()
        } else {
            self.palloc(mem::size_of::<T>())?.cast::<T>()
        };
        unsafe { ptr::write(typed.as_ptr(), value) };
        unsafe { node.as_ref() }.data.set(typed.as_ptr().cast());
        unsafe { node.as_ref() }
            .handler
            .set(Some(drop_glue::<T> as CleanupHandler));
        self.cleanup.set(Some(node));
        Some(typed)
    }

    /// Like [`Pool::alloc_with_cleanup`], but fails instead of allocating a
    /// second time if a value of type `T` is already registered.
    pub fn alloc_unique<T>(&self, value: T) -> Option<NonNull<T>> {
        if self.cleanup_lookup_by_type::<T>().is_some() {
            return None;
        }
        self.alloc_with_cleanup(value)
    }

    /// Reads the value of type `T` previously registered by
    /// [`Pool::alloc_unique`] out of the pool and disarms its cleanup
    /// handler, moving ownership to the caller.
    pub fn take_unique<T>(&self) -> Option<T> {
        let node = self.cleanup_lookup_by_type::<T>()?;
        let hdr = unsafe { node.as_ref() };
        hdr.handler.set(None);
        let data = hdr.data.get();
        let value = if mem::size_of::<T>() == 0 {
            unsafe { mem::zeroed() }
        } else {
            unsafe { ptr::read(data as *const T) }
        };
        Some(value)
    }

    fn cleanup_lookup_by_type<T>(&self) -> Option<NonNull<CleanupNode>> {
        let mut node = self.cleanup.get();
        while let Some(n) = node {
            let hdr = unsafe { n.as_ref() };
            if hdr.handler.get() == Some(drop_glue::<T> as CleanupHandler) {
                return Some(n);
            }
            node = hdr.next.get();
        }
        None
    }

    /// Bump-allocates room for a `T` (via the large path if its alignment
    /// exceeds [`WORD_ALIGNMENT`]) and moves `value` into it.
    pub(crate) fn alloc_in_place<T>(&self, value: T) -> Option<NonNull<T>> {
        let raw = self.alloc_buffer::<T>(1)?;
        unsafe { ptr::write(raw.as_ptr(), value) };
        Some(raw)
    }

    /// Allocates uninitialized room for `n` values of `T`, honoring `T`'s
    /// alignment: routed through [`Pool::pmemalign`] when `T`'s alignment
    /// exceeds [`WORD_ALIGNMENT`] (what `palloc` guarantees), through
    /// `palloc` otherwise. Used by every pool-backed container that stores
    /// a caller-chosen element type, so none of them have to re-derive
    /// this branch themselves.
    pub(crate) fn alloc_buffer<T>(&self, n: usize) -> Option<NonNull<T>> {
        let elem = Layout::new::<T>();
        if elem.size() == 0 {
            return Some(NonNull::dangling());
        }
        let size = elem.size().checked_mul(n)?;
        let raw = if size == 0 {
            NonNull::dangling()
        } else if elem.align() <= WORD_ALIGNMENT {
            self.palloc(size)?
        } else {
            self.pmemalign(size, elem.align())?
        };
        Some(raw.cast::<T>())
    }
}

/// Cleanup glue for [`Pool::alloc_with_cleanup`]: drops a `T` in place.
///
/// # Safety
/// `data` must be a valid, exclusively-owned, well-aligned `*mut T`.
unsafe fn drop_glue<T>(data: *mut u8) {
    unsafe { ptr::drop_in_place(data as *mut T) };
}

impl Drop for Pool {
    fn drop(&mut self) {
        // Teardown order: handlers (LIFO), then large buffers, then
        // blocks. Once the first block is freed, `self.log` may itself be
        // dangling (it could have been allocated from this very pool), so
        // no diagnostics after that point.
        let mut node = self.cleanup.get();
        while let Some(n) = node {
            let hdr = unsafe { n.as_ref() };
            if let Some(handler) = hdr.handler.get() {
                unsafe { handler(hdr.data.get()) };
            }
            node = hdr.next.get();
        }

        let mut node = self.large.get();
        while let Some(n) = node {
            let hdr = unsafe { n.as_ref() };
            if let Some((ptr, layout)) = hdr.alloc.get() {
                unsafe { alloc::dealloc(ptr.as_ptr(), layout) };
            }
            node = hdr.next.get();
        }

        let mut block = Some(self.head);
        while let Some(b) = block {
            let next = unsafe { b.as_ref() }.next.get();
            unsafe { BlockHeader::destroy(b) };
            block = next;
        }
    }
}

impl Pool {
    /// Tears the pool down. Equivalent to letting it go out of scope; see
    /// the type-level doc comment for the teardown order.
    pub fn destroy(self) {}
}
