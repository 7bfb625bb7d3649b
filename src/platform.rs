//! Build-time and platform-discovered constants used by the pool.

use std::sync::OnceLock;

/// Alignment of each block's base address. Must be a power of two and at
/// least the platform's pointer alignment; 16 matches `max_align_t` on
/// most 64-bit targets.
pub const POOL_ALIGNMENT: usize = 16;

/// Alignment `Pool::palloc` aligns its return value to.
pub const WORD_ALIGNMENT: usize = 16;

/// Common cache line size for x86_64 and aarch64. There is no portable
/// syscall to discover this at runtime the way there is for the page
/// size, so unlike [`pagesize`] this is a fixed constant rather than a
/// cached probe.
pub const CACHELINE_SIZE: usize = 64;

static PAGESIZE: OnceLock<usize> = OnceLock::new();

/// The host's memory page size, discovered once at first use and cached
/// for the remainder of the process's lifetime.
#[inline]
pub fn pagesize() -> usize {
    *PAGESIZE.get_or_init(page_size::get)
}

/// Upper bound on the size of a request `Pool::palloc` will serve from a
/// block, derived as `min(block_capacity - header, SIZE_THRESHOLD)` per
/// block at pool-creation time; `size_threshold` is the page-size-derived
/// half of that `min`.
#[inline]
pub fn size_threshold() -> usize {
    pagesize() - WORD_ALIGNMENT
}

/// Rounds `value` up to the next multiple of `alignment`.
///
/// # Panics
/// Panics in debug builds if `alignment` is not a power of two.
#[inline(always)]
pub const fn align_up(value: usize, alignment: usize) -> usize {
    debug_assert!(alignment.is_power_of_two());
    (value + alignment - 1) & !(alignment - 1)
}

/// Rounds a pointer up to `alignment`, as raw address arithmetic.
///
/// # Safety
/// The caller must ensure the resulting pointer does not escape the
/// allocation `ptr` is derived from before it is dereferenced.
#[inline(always)]
pub unsafe fn align_up_ptr(ptr: *mut u8, alignment: usize) -> *mut u8 {
    align_up(ptr as usize, alignment) as *mut u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_examples() {
        assert_eq!(align_up(0, 16), 0);
        assert_eq!(align_up(1, 16), 16);
        assert_eq!(align_up(16, 16), 16);
        assert_eq!(align_up(17, 16), 32);
    }

    #[test]
    fn pagesize_is_cached_power_of_two() {
        let a = pagesize();
        let b = pagesize();
        assert_eq!(a, b);
        assert!(a.is_power_of_two());
        assert!(a >= 4096);
    }
}
