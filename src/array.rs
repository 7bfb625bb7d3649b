//! A dynamic array whose element storage lives in a [`Pool`].

use std::cell::Cell;
use std::cmp;
use std::mem;
use std::ptr::{self, NonNull};

use crate::pool::Pool;

/// A contiguous, pool-backed sequence of `T`.
///
/// `Array` holds its backing pool by shared reference and never outlives
/// it; the per-element byte size is not stored as a runtime field, since
/// `mem::size_of::<T>()` already gives a generic Rust container that
/// information for free. Element storage is allocated through
/// [`Pool::alloc_buffer`], which routes to the pool's aligned
/// large-allocation path whenever `T`'s alignment exceeds the pool's word
/// alignment, so `T` is not restricted to word-aligned types.
///
/// `push` grows by doubling, preferring **cooperative in-place growth**
/// when this array's storage happens to be the pool's most recent
/// allocation: the pool's bump pointer is advanced instead of copying.
/// Otherwise the array relocates to a fresh, larger pool allocation and
/// its old storage is abandoned (reclaimed only at pool reset/destroy).
/// After any push, a previously obtained pointer into the array's storage
/// may be invalid — that is the cost of the in-place fast path existing
/// at all.
pub struct Array<'p, T> {
    elts: Cell<NonNull<T>>,
    nelts: Cell<usize>,
    nalloc: Cell<usize>,
    pool: &'p Pool,
}

impl<'p, T> Array<'p, T> {
    /// Allocates storage for `n` elements from `pool`.
    ///
    /// # Panics
    /// Panics if `n == 0` — an array must start with at least one element
    /// of capacity.
    pub fn create(pool: &'p Pool, n: usize) -> Option<Self> {
        assert!(n >= 1, "Array::create requires n >= 1");
        let elts = pool.alloc_buffer::<T>(n)?;
        Some(Self {
            elts: Cell::new(elts),
            nelts: Cell::new(0),
            nalloc: Cell::new(n),
            pool,
        })
    }

    pub fn len(&self) -> usize {
        self.nelts.get()
    }

    pub fn is_empty(&self) -> bool {
        self.nelts.get() == 0
    }

    pub fn capacity(&self) -> usize {
        self.nalloc.get()
    }

    pub fn as_slice(&self) -> &[T] {
        // SAFETY: `[0, nelts)` is always initialized.
        unsafe { std::slice::from_raw_parts(self.elts.get().as_ptr(), self.nelts.get()) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        // SAFETY: see `as_slice`; `&mut self` gives us exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.elts.get().as_ptr(), self.nelts.get()) }
    }

    /// Appends `value`, growing the backing storage if needed.
    ///
    /// Returns `None` (OutOfMemory) if growth was needed and the pool
    /// couldn't satisfy it; the array is left at its prior state.
    pub fn push(&mut self, value: T) -> Option<()> {
        let slot = self.reserve_slots(1)?;
        // SAFETY: `slot` is a freshly reserved, uninitialized element.
        unsafe { ptr::write(slot.as_ptr(), value) };
        Some(())
    }

    /// Appends every element of `values`, growing at most once.
    ///
    /// The bulk counterpart of a single-element `push`: one capacity check
    /// for all of `values` rather than one per element.
    pub fn extend_from_slice(&mut self, values: &[T]) -> Option<()>
    where
        T: Clone,
    {
        if values.is_empty() {
            return Some(());
        }
        let slot = self.reserve_slots(values.len())?;
        for (i, value) in values.iter().enumerate() {
            // SAFETY: `[slot, slot + values.len())` was just reserved.
            unsafe { ptr::write(slot.as_ptr().add(i), value.clone()) };
        }
        Some(())
    }

    /// Reserves `k` contiguous uninitialized slots at the end of the
    /// array and returns a pointer to the first one, bumping `nelts`.
    fn reserve_slots(&mut self, k: usize) -> Option<NonNull<T>> {
        let nelts = self.nelts.get();
        if nelts + k > self.nalloc.get() {
            self.grow(k)?;
        }
        let slot = unsafe { self.elts.get().as_ptr().add(nelts) };
        self.nelts.set(nelts + k);
        NonNull::new(slot)
    }

    fn grow(&mut self, k: usize) -> Option<()> {
        let elem_size = mem::size_of::<T>();
        let nalloc = self.nalloc.get();
        let tail = unsafe { self.elts.get().as_ptr().add(nalloc) } as *mut u8;

        if self.pool.try_extend_tail(tail, k * elem_size) {
            self.nalloc.set(nalloc + k);
            return Some(());
        }

        let new_nalloc = 2 * cmp::max(k, nalloc);
        let new_elts = self.pool.alloc_buffer::<T>(new_nalloc)?;
        // SAFETY: `new_elts` is freshly allocated and at least `nelts`
        // elements wide; `self.elts` holds `nelts` live elements.
        unsafe {
            ptr::copy_nonoverlapping(self.elts.get().as_ptr(), new_elts.as_ptr(), self.nelts.get())
        };
        self.elts.set(new_elts);
        self.nalloc.set(new_nalloc);
        Some(())
    }

    /// Opportunistically reclaims this array's storage if it is still the
    /// pool's most recent allocation. Not a general free — if any other
    /// allocation happened on the pool since the array's storage was last
    /// extended, this is a no-op and the memory is reclaimed only at pool
    /// reset or destroy.
    pub fn destroy(self) {
        let bytes = self.nalloc.get() * mem::size_of::<T>();
        let tail = unsafe { self.elts.get().as_ptr().add(self.nalloc.get()) } as *mut u8;
        self.pool.try_rewind_tail(tail, bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::Log;
    use crate::pool::Pool;

    #[test]
    fn cooperative_growth_keeps_storage_in_place() {
        let pool = Pool::create(4096, Log::default()).unwrap();
        let mut a: Array<'_, u64> = Array::create(&pool, 2).unwrap();
        a.push(1).unwrap();
        a.push(2).unwrap();
        let base = a.as_slice().as_ptr();
        a.push(3).unwrap();
        assert_eq!(a.as_slice().as_ptr(), base, "third push should grow in place");
        a.push(4).unwrap();
        assert_eq!(a.as_slice().as_ptr(), base, "fourth push should still be in place");
        assert_eq!(a.as_slice(), &[1, 2, 3, 4]);
    }

    #[test]
    fn intervening_allocation_forces_relocation() {
        let pool = Pool::create(4096, Log::default()).unwrap();
        let mut a: Array<'_, u64> = Array::create(&pool, 2).unwrap();
        a.push(1).unwrap();
        a.push(2).unwrap();
        let _ = pool.palloc(8).unwrap();
        let base = a.as_slice().as_ptr();
        a.push(3).unwrap();
        assert_ne!(a.as_slice().as_ptr(), base, "push after an intervening alloc must relocate");
        assert_eq!(a.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn destroy_rewinds_when_uninterrupted() {
        let pool = Pool::create(4096, Log::default()).unwrap();
        let before = pool.palloc(0).map(|p| p.as_ptr() as usize);
        let a: Array<'_, u64> = Array::create(&pool, 4).unwrap();
        a.destroy();
        let after = pool.palloc(0).map(|p| p.as_ptr() as usize);
        assert_eq!(before, after);
    }
}
