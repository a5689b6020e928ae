//! Stream files from disk as validated UTF-8 code points and byte
//! tokens.
//!
//! The crate is built from four pieces. [`input::FileReader`] maps a file
//! into two alternating page-aligned buffers and hands them out in file
//! order. [`codec::utf8`] decodes and encodes code points in
//! `0..=0x10FFFF`, rejecting overlong and out-of-range sequences.
//! [`split_string::SplitString`] carries a token whose bytes may straddle
//! the boundary between two buffers. [`scanner::Utf8Scanner`] glues them
//! together: it reads bytes and characters, remembers the bytes of the
//! token being built, refills the buffer transparently, reassembles
//! characters cut at a buffer boundary and can unread the last characters
//! again.
//!
//! ```no_run
//! use std::path::Path;
//! use utf8scan::{FileReader, ScanError, Utf8Scanner, DEFAULT_BUFFER_SIZE};
//!
//! # fn main() -> std::io::Result<()> {
//! let mut frd = FileReader::open_double_buffer(Path::new("notes.txt"), None, DEFAULT_BUFFER_SIZE)?;
//! let mut scan = Utf8Scanner::new();
//! loop {
//!     match scan.next_char(&mut frd) {
//!         Ok(uchar) => println!("U+{:04X}", uchar),
//!         Err(ScanError::IllegalSequence) => eprintln!("skipped a malformed sequence"),
//!         Err(ScanError::NoData) => break,
//!         Err(e) => panic!("read failed: {e}"),
//!     }
//!     scan.clear_token(&mut frd);
//! }
//! scan.close(&mut frd);
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod error;
mod helper;
pub mod input;
pub mod scanner;
pub mod split_string;

pub use error::ScanError;
pub use input::{FileReader, SourceFile, DEFAULT_BUFFER_SIZE};
pub use scanner::Utf8Scanner;
pub use split_string::SplitString;
