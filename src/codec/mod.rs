//! Character codecs. Only UTF-8 lives here; the scanner is wired to it.

pub mod utf8;
