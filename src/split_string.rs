//! A token whose bytes may straddle the boundary between two reader
//! buffers.
//!
//! `SplitString` records up to two byte ranges by address and length.
//! Part 0 holds the head of the token, part 1 the tail that continues in
//! the following buffer. The ranges point into storage owned by the file
//! reader; a token must never outlive the buffers whose addresses it
//! records, and a released buffer invalidates every part pointing into it.

use crate::as_slice_no_borrow_check;
use std::ptr;

/// Maximum number of noncontiguous parts a token can be composed of.
pub const MAX_PARTS: usize = 2;

/// One byte range of a token: start address and length in bytes.
#[derive(Debug, Clone, Copy)]
struct Part {
    addr: *const u8,
    size: usize,
}

impl Part {
    const CLEAR: Part = Part {
        addr: ptr::null(),
        size: 0,
    };
}

/// A string stored as the concatenation of at most two byte ranges.
#[derive(Debug, Clone)]
pub struct SplitString {
    /// The number of noncontiguous parts the string is composed of,
    /// always in `0..=MAX_PARTS`. Part 0 is valid when the count is at
    /// least 1, part 1 when it is 2.
    parts_count: usize,
    parts: [Part; MAX_PARTS],
}

impl Default for SplitString {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitString {
    /// An empty string: no parts, both ranges zeroed.
    pub fn new() -> Self {
        Self {
            parts_count: 0,
            parts: [Part::CLEAR; MAX_PARTS],
        }
    }

    /// Resets to the state of [`SplitString::new`].
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Returns `true` if no part is set and both ranges are zeroed.
    pub fn is_clear(&self) -> bool {
        self.parts_count == 0
            && self
                .parts
                .iter()
                .all(|p| p.addr.is_null() && p.size == 0)
    }

    /// The number of parts the string is composed of.
    #[inline]
    pub fn parts_count(&self) -> usize {
        self.parts_count
    }

    /// Sets the number of parts. `count` must be at most [`MAX_PARTS`].
    #[inline]
    pub fn set_parts_count(&mut self, count: usize) {
        debug_assert!(count <= MAX_PARTS);
        self.parts_count = count;
    }

    /// Start address of part `idx`. Valid range for `idx` is
    /// `0..parts_count()`.
    #[inline]
    pub fn part_addr(&self, idx: usize) -> *const u8 {
        self.parts[idx].addr
    }

    /// Length in bytes of part `idx`. Valid range for `idx` is
    /// `0..parts_count()`.
    #[inline]
    pub fn part_size(&self, idx: usize) -> usize {
        self.parts[idx].size
    }

    /// The bytes of part `idx` as a slice. Use this with care: the part
    /// must point into a buffer that is still held, see the module
    /// description.
    #[inline]
    pub fn part(&self, idx: usize) -> &[u8] {
        as_slice_no_borrow_check!(self.parts[idx].addr, self.parts[idx].size)
    }

    /// Sets address and length of part `idx` in one go.
    #[inline]
    pub fn set_part(&mut self, idx: usize, addr: *const u8, size: usize) {
        self.parts[idx] = Part { addr, size };
    }

    /// Sets only the start address of part `idx`.
    #[inline]
    pub fn set_part_addr(&mut self, idx: usize, addr: *const u8) {
        self.parts[idx].addr = addr;
    }

    /// Sets only the length of part `idx`.
    #[inline]
    pub fn set_part_size(&mut self, idx: usize, size: usize) {
        self.parts[idx].size = size;
    }

    /// Sum of the lengths of all set parts.
    pub fn total_size(&self) -> usize {
        self.parts[..self.parts_count]
            .iter()
            .map(|p| p.size)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_is_clear() {
        let s = SplitString::new();
        assert!(s.is_clear());
        assert_eq!(s.parts_count(), 0);
        assert_eq!(s.total_size(), 0);
    }

    #[test]
    fn test_set_and_query_parts() {
        let buf = b"hello world";
        let mut s = SplitString::new();

        s.set_parts_count(1);
        s.set_part(0, buf.as_ptr(), 5);
        assert_eq!(s.parts_count(), 1);
        assert_eq!(s.part(0), b"hello");
        assert_eq!(s.part_size(0), 5);
        assert_eq!(s.total_size(), 5);
        assert!(!s.is_clear());

        s.set_parts_count(2);
        s.set_part_addr(1, unsafe { buf.as_ptr().add(6) });
        s.set_part_size(1, 5);
        assert_eq!(s.part(1), b"world");
        assert_eq!(s.total_size(), 10);
    }

    #[test]
    fn test_clear() {
        let buf = b"xyz";
        let mut s = SplitString::new();
        s.set_parts_count(2);
        s.set_part(0, buf.as_ptr(), 1);
        s.set_part(1, buf.as_ptr(), 2);
        s.clear();
        assert!(s.is_clear());
    }

    #[test]
    fn test_zero_length_part_is_empty_slice() {
        let buf = b"abc";
        let mut s = SplitString::new();
        s.set_parts_count(1);
        s.set_part(0, buf.as_ptr(), 0);
        assert!(s.part(0).is_empty());
    }
}
