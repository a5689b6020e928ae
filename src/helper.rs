//! Small helpers of general use, mainly used by the token carrier and the
//! scanner.

/// This macro is useful for zero-cost conversion from a recorded
/// `(*const u8, usize)` pair back to `&[u8]`. Use this with care. Make
/// sure the address and length were taken from a buffer that is still
/// alive and unchanged, because this disables borrow checking for the
/// storage behind the pointer. A zero length yields an empty slice
/// without touching the pointer, so cleared parts convert safely.
#[macro_export]
macro_rules! as_slice_no_borrow_check {
    ($addr:expr, $len:expr) => {{
        let addr: *const u8 = $addr;
        let len: usize = $len;
        if len == 0 {
            &[][..]
        } else {
            unsafe { std::slice::from_raw_parts(addr, len) }
        }
    }};
}
