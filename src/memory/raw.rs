//! Unchecked copy and fill over raw spans.
//!
//! Nothing here validates its arguments: these run before any memory
//! protection exists and callers own the correctness of every range.

/// Copies `count` elements of `T` from `src` to `dst`.
///
/// # Safety
///
/// `src` must be valid for reads and `dst` valid for writes of `count`
/// elements, both properly aligned, and the two ranges must not overlap.
#[inline]
pub unsafe fn copy<T>(dst: *mut T, src: *const T, count: usize) {
    core::ptr::copy_nonoverlapping(src, dst, count);
}

/// Writes `count` bytes of `value` starting at `dst`.
///
/// # Safety
///
/// `dst` must be valid for writes of `count` bytes.
#[inline]
pub unsafe fn fill(dst: *mut u8, value: u8, count: usize) {
    core::ptr::write_bytes(dst, value, count);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn copy_moves_whole_elements() {
        let src: [u64; 4] = [1, 2, 3, 0xdead_beef];
        let mut dst = [0u64; 6];
        unsafe { copy(dst.as_mut_ptr().add(1), src.as_ptr(), src.len()) };
        assert_eq!(dst, [0, 1, 2, 3, 0xdead_beef, 0]);
    }

    #[test]
    fn fill_touches_only_the_span() {
        let mut buf = [0u8; 8];
        unsafe { fill(buf.as_mut_ptr().add(2), 0xAA, 4) };
        assert_eq!(buf, [0, 0, 0xAA, 0xAA, 0xAA, 0xAA, 0, 0]);
    }

    #[test]
    fn zero_length_is_a_no_op() {
        let mut buf = [7u8; 3];
        unsafe {
            fill(buf.as_mut_ptr(), 0, 0);
            copy(buf.as_mut_ptr(), [9u8].as_ptr(), 0);
        }
        assert_eq!(buf, [7, 7, 7]);
    }
}
