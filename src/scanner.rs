//! Break a stream of file buffers into UTF-8 characters and byte tokens.
//!
//! [`Utf8Scanner`] keeps a cursor into the buffer most recently acquired
//! from a [`FileReader`] and grows a [`SplitString`] token as bytes are
//! consumed. When the buffer runs out the scanner transparently acquires
//! the next one; a token may continue into it, so a single token can span
//! one buffer boundary (and no more). Characters whose encoded bytes
//! straddle that boundary are reassembled in a small staging buffer.
//!
//! Protocol: read bytes and characters with [`next_byte`], [`next_char`]
//! and friends until a token is recognized, fetch it with
//! [`current_token`], then call [`clear_token`] to release buffers the
//! token no longer pins and to start the next token. [`unread`] removes
//! the last characters from the token again, stepping back across the
//! buffer boundary if necessary.
//!
//! [`next_byte`]: Utf8Scanner::next_byte
//! [`next_char`]: Utf8Scanner::next_char
//! [`current_token`]: Utf8Scanner::current_token
//! [`clear_token`]: Utf8Scanner::clear_token
//! [`unread`]: Utf8Scanner::unread

use crate::as_slice_no_borrow_check;
use crate::codec::utf8;
use crate::codec::utf8::MAX_SEQUENCE_LEN;
use crate::error::ScanError;
use crate::input::FileReader;
use crate::split_string::SplitString;
use std::cmp;
use std::ptr;

/// Scans the buffers of a [`FileReader`] as a stream of UTF-8 characters
/// while recording the bytes of the token currently being built.
///
/// The scanner is always in one of three states: *empty* (no buffer
/// held), scanning inside one buffer, or scanning a token that spans two
/// buffers. The number of token parts equals the number of reader buffers
/// the scanner holds.
pub struct Utf8Scanner {
    /// Points to the next byte returned from [`Utf8Scanner::next_byte`].
    next: *const u8,

    /// One past the last byte of the currently held buffer. As long as
    /// `next` is lower than `end` there are more bytes to read.
    end: *const u8,

    /// Begin and length of the token built since the last
    /// [`Utf8Scanner::clear_token`]. The bytes can be scattered across
    /// two reader buffers.
    scanned_token: SplitString,
}

impl Default for Utf8Scanner {
    fn default() -> Self {
        Self::new()
    }
}

impl Utf8Scanner {
    /// A scanner in the empty state. No data is read until the first
    /// buffer or character is requested.
    pub fn new() -> Self {
        Self {
            next: ptr::null(),
            end: ptr::null(),
            scanned_token: SplitString::new(),
        }
    }

    /// Releases any buffers still pinned by the current token back to
    /// `frd` and resets the scanner to the empty state. Idempotent.
    pub fn close(&mut self, frd: &mut FileReader) {
        if self.scanned_token.parts_count() > 0 {
            if self.scanned_token.parts_count() == 2 {
                frd.release();
            }
            frd.release();
        }
        *self = Self::new();
    }

    /// Returns `true` if the current buffer holds at least one more byte.
    /// When it returns `false`, call [`Utf8Scanner::read_buffer`] before
    /// using a byte primitive.
    #[inline]
    pub fn has_next(&self) -> bool {
        self.next < self.end
    }

    /// The number of bytes left unread in the current buffer.
    #[inline]
    pub fn unread_bytes_in_buffer(&self) -> usize {
        self.end as usize - self.next as usize
    }

    /// Returns the token built since the last
    /// [`Utf8Scanner::clear_token`].
    ///
    /// The length of the token's last part is brought up to date with the
    /// reading position first. The returned reference stays valid until
    /// the next call that advances the scanner; functions that can
    /// release a buffer (`clear_token`, `close`, a refilling `next_char`)
    /// also invalidate the bytes behind the recorded part addresses.
    pub fn current_token(&mut self) -> &SplitString {
        let count = self.scanned_token.parts_count();
        if count > 0 {
            let idx = count - 1;
            let size = self.next as usize - self.scanned_token.part_addr(idx) as usize;
            self.scanned_token.set_part_size(idx, size);
        }
        &self.scanned_token
    }

    /// Acquires the next buffer from `frd` if the current one is
    /// exhausted.
    ///
    /// Does nothing when unread bytes remain. Otherwise the exhausted
    /// buffer stays pinned while the token continues into the newly
    /// acquired one; a token can do that only once, so a third buffer is
    /// refused.
    ///
    /// Errors: [`ScanError::NoData`] at end of input,
    /// [`ScanError::Io`] for a latched read failure,
    /// [`ScanError::NoBuffer`] when the token already spans two buffers
    /// (the token is too long).
    pub fn read_buffer(&mut self, frd: &mut FileReader) -> Result<(), ScanError> {
        if self.next < self.end {
            return Ok(()); // buffer not empty
        }
        if frd.is_eof() {
            return Err(ScanError::NoData);
        }
        if frd.io_error() != 0 {
            return Err(ScanError::Io(frd.io_error()));
        }

        let count = self.scanned_token.parts_count();
        if count == 2 {
            return Err(ScanError::NoBuffer);
        }
        if count == 1 {
            // freeze the length of the part in the buffer left behind
            let size = self.end as usize - self.scanned_token.part_addr(0) as usize;
            self.scanned_token.set_part_size(0, size);
        }

        let slice = frd.acquire_next()?;
        self.next = slice.as_ptr();
        self.end = unsafe { slice.as_ptr().add(slice.len()) };

        self.scanned_token.set_parts_count(count + 1);
        self.scanned_token.set_part(count, self.next, 0);

        Ok(())
    }

    /// Reads the next byte and advances the reading position.
    ///
    /// Unchecked precondition: [`Utf8Scanner::has_next`] is `true`.
    #[inline]
    pub fn next_byte(&mut self) -> u8 {
        debug_assert!(self.has_next());
        unsafe {
            let byte = *self.next;
            self.next = self.next.add(1);
            byte
        }
    }

    /// Returns the byte `offset` positions ahead without moving the
    /// reading position.
    ///
    /// Unchecked precondition:
    /// `offset < `[`unread_bytes_in_buffer`](Self::unread_bytes_in_buffer).
    #[inline]
    pub fn peek_byte(&self, offset: usize) -> u8 {
        debug_assert!(offset < self.unread_bytes_in_buffer());
        unsafe { *self.next.add(offset) }
    }

    /// Advances the reading position by `count` bytes without reading
    /// them.
    ///
    /// Unchecked preconditions: `count` must not exceed
    /// [`unread_bytes_in_buffer`](Self::unread_bytes_in_buffer); only
    /// whole, correctly encoded characters may be skipped (a 4-byte
    /// character is skipped with all 4 bytes), and none of them may be a
    /// newline.
    #[inline]
    pub fn skip_bytes(&mut self, count: usize) {
        debug_assert!(count <= self.unread_bytes_in_buffer());
        self.next = unsafe { self.next.add(count) };
    }

    /// Decodes the next character and advances the reading position.
    ///
    /// Unlike the byte primitives this refills the buffer by itself, and
    /// it reassembles a multibyte sequence whose bytes are split across
    /// the buffer boundary.
    ///
    /// An illegal sequence is skipped (one byte for a bad first byte or a
    /// sequence that turns out malformed, the buffered fragment for a
    /// sequence truncated by the end of input) and reported as
    /// [`ScanError::IllegalSequence`]. End of input is
    /// [`ScanError::NoData`]; refill errors are passed through, see
    /// [`Utf8Scanner::read_buffer`].
    pub fn next_char(&mut self, frd: &mut FileReader) -> Result<u32, ScanError> {
        let mut size = self.unread_bytes_in_buffer();
        if size == 0 {
            self.read_buffer(frd)?;
            size = self.unread_bytes_in_buffer();
            // a successful read_buffer guarantees size > 0
        }

        let seq_len = utf8::sequence_length(unsafe { *self.next });
        if size >= MAX_SEQUENCE_LEN || size >= seq_len {
            // whole sequence (or offending byte) inside this buffer
            let bytes = as_slice_no_borrow_check!(self.next, cmp::min(size, MAX_SEQUENCE_LEN));
            match utf8::decode(bytes) {
                Ok((uchar, consumed)) => {
                    self.next = unsafe { self.next.add(consumed) };
                    Ok(uchar)
                }
                Err(_) => {
                    // skip the offending byte
                    self.next = unsafe { self.next.add(1) };
                    Err(ScanError::IllegalSequence)
                }
            }
        } else {
            // the sequence continues in the next buffer
            let missing = seq_len - size;
            let mut staged = [0u8; MAX_SEQUENCE_LEN];
            staged[..size].copy_from_slice(as_slice_no_borrow_check!(self.next, size));
            self.next = self.end; // consume the tail

            match self.read_buffer(frd) {
                Ok(()) => {}
                // truncated by the end of input
                Err(ScanError::NoData) => return Err(ScanError::IllegalSequence),
                Err(e) => return Err(e),
            }

            let available = self.unread_bytes_in_buffer();
            if available < missing {
                // not even the next buffer completes the sequence
                self.next = self.end;
                return Err(ScanError::IllegalSequence);
            }
            staged[size..seq_len].copy_from_slice(as_slice_no_borrow_check!(self.next, missing));
            self.next = unsafe { self.next.add(missing) };

            match utf8::decode(&staged[..seq_len]) {
                Ok((uchar, _)) => Ok(uchar),
                // the continuation bytes from the new buffer were no
                // follow bytes; they are consumed either way
                Err(_) => Err(ScanError::IllegalSequence),
            }
        }
    }

    /// Consumes bytes until just past the next occurrence of
    /// `code_point`, crossing as many buffers as necessary.
    ///
    /// The search works on bytes, not characters: malformed UTF-8 passed
    /// over is not reported (callers that care follow up with
    /// [`Utf8Scanner::next_char`], which does report it). The target
    /// itself may straddle a buffer boundary.
    ///
    /// Errors: [`ScanError::IllegalCodePoint`] for an unencodable target
    /// (nothing is consumed), [`ScanError::NoData`] when the stream ends
    /// without a match, plus the refill errors of
    /// [`Utf8Scanner::read_buffer`].
    pub fn skip_until_after(
        &mut self,
        frd: &mut FileReader,
        code_point: u32,
    ) -> Result<(), ScanError> {
        let mut target = [0u8; MAX_SEQUENCE_LEN];
        let target_len = match utf8::encode(code_point, &mut target) {
            Ok(len) => len,
            Err(_) => return Err(ScanError::IllegalCodePoint),
        };
        let target = &target[..target_len];

        // number of target bytes still to be confirmed in the next buffer
        let mut missing = 0usize;

        loop {
            let mut size = self.unread_bytes_in_buffer();
            if size == 0 {
                self.read_buffer(frd)?;
                size = self.unread_bytes_in_buffer();
            }

            if missing > 0 {
                if size < missing {
                    self.next = self.end;
                    missing = 0;
                    continue;
                }
                let seen: &[u8] = as_slice_no_borrow_check!(self.next, missing);
                let confirmed = seen == &target[target_len - missing..];
                self.next = unsafe { self.next.add(missing) };
                missing = 0;
                if confirmed {
                    return Ok(());
                }
                continue;
            }

            let haystack: &[u8] = as_slice_no_borrow_check!(self.next, size);
            match memchr::memchr(target[0], haystack) {
                None => {
                    self.next = self.end;
                }
                Some(pos) => {
                    let rest = size - pos;
                    if rest < target_len {
                        // candidate cut at the buffer boundary; remember
                        // how much of it still needs confirmation
                        let matches_so_far = haystack[pos + 1..] == target[1..rest];
                        self.next = self.end;
                        if matches_so_far {
                            missing = target_len - rest;
                        }
                    } else {
                        let found = haystack[pos + 1..pos + target_len] == target[1..];
                        self.next = unsafe { self.next.add(pos + target_len) };
                        if found {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }

    /// Clears the current token and releases every buffer the cleared
    /// token no longer pins; the next token starts at the reading
    /// position. Infallible.
    pub fn clear_token(&mut self, frd: &mut FileReader) {
        if self.scanned_token.parts_count() == 2 {
            // the older of the two buffers becomes reusable
            frd.release();
        }

        if self.next == self.end {
            if self.scanned_token.parts_count() > 0 {
                frd.release();
                self.scanned_token.set_parts_count(0);
            }
        } else {
            self.scanned_token.set_parts_count(1);
            self.scanned_token.set_part(0, self.next, 0);
        }
    }

    /// Removes the last `char_count` characters from the token and moves
    /// the reading position back onto the first of them.
    ///
    /// Characters are counted by their start bytes. A rollback that
    /// crosses the buffer boundary hands the second buffer back to the
    /// reader (it is re-delivered by the next refill, unchanged).
    ///
    /// Fails with [`ScanError::Invalid`] when the token holds fewer than
    /// `char_count` characters; the scanner is left unchanged then.
    /// `unread(0)` does nothing.
    pub fn unread(&mut self, frd: &mut FileReader, char_count: usize) -> Result<(), ScanError> {
        if char_count == 0 {
            return Ok(());
        }

        // bring the last part's length up to date
        self.current_token();

        let count = self.scanned_token.parts_count();
        if count == 0 {
            return Err(ScanError::Invalid);
        }
        let mut idx = count - 1;
        let mut size = self.scanned_token.part_size(idx);
        let mut crossed = false;
        let mut chars_left = char_count;

        loop {
            // step back to the start byte of the previous character
            loop {
                if size == 0 {
                    if idx == 0 {
                        return Err(ScanError::Invalid);
                    }
                    crossed = true;
                    idx -= 1;
                    size = self.scanned_token.part_size(idx);
                    continue;
                }
                size -= 1;
                let byte = unsafe { *self.scanned_token.part_addr(idx).add(size) };
                if utf8::is_valid_first_byte(byte) {
                    break;
                }
            }
            chars_left -= 1;
            if chars_left == 0 {
                break;
            }
        }

        if crossed {
            // the second buffer is the reader's most recent delivery;
            // the first stays pinned by the shortened token
            frd.unread();
            let addr = self.scanned_token.part_addr(0);
            self.end = unsafe { addr.add(self.scanned_token.part_size(0)) };
        }

        self.next = unsafe { self.scanned_token.part_addr(idx).add(size) };
        self.scanned_token.set_part_size(idx, size);
        self.scanned_token.set_parts_count(idx + 1);

        Ok(())
    }
}
