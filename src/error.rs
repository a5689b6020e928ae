//! The error kinds shared by the codec, the file reader and the scanner.

use thiserror::Error;

/// Everything that can go wrong while scanning a byte stream.
///
/// The variants carry no payload beyond their identity, except for
/// [`ScanError::Io`] which keeps the OS error code of the failed read. The
/// same set is used on every layer so that the scanner can hand reader
/// errors through unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ScanError {
    /// The stream is exhausted. This is the normal end-of-data signal, not
    /// a failure, and it is never latched.
    #[error("no more input data")]
    NoData,

    /// The scanner would need a third buffer to grow the current token.
    /// Two buffers per token is a hard limit; the caller sees this as
    /// "token too long".
    #[error("token already spans two buffers")]
    NoBuffer,

    /// An illegal UTF-8 byte sequence: bad first byte, bad follow byte,
    /// overlong encoding or a value above U+10FFFF. The offending bytes
    /// have been skipped when this is returned from the scanner.
    #[error("wrong UTF-8 encoding")]
    IllegalSequence,

    /// The supplied slice ends in the middle of a multibyte sequence. Only
    /// the codec returns this; the scanner turns it into a buffer refill
    /// or into `IllegalSequence` at end of input.
    #[error("truncated UTF-8 sequence")]
    Truncated,

    /// A code point outside `[0, 0x10FFFF]` was given to the encoder or to
    /// `skip_until_after`.
    #[error("code point beyond U+10FFFF")]
    IllegalCodePoint,

    /// The output buffer is too small for the encoded character.
    #[error("output buffer too small for encoded character")]
    InsufficientBuffer,

    /// An `unread` asked for more characters than the current token holds.
    /// The scanner state is unchanged.
    #[error("invalid argument")]
    Invalid,

    /// A file read failed. The code is the latched OS error number; the
    /// reader surfaces it once per failure and makes no further syscalls.
    #[error("input/output error (os error {0})")]
    Io(i32),
}
