//! Command-line front end: stream a file through the UTF-8 scanner and
//! report what it contains.
//!
//! In the default mode the whole file is decoded character by character
//! and every malformed sequence is listed with its byte offset. With
//! `--delimiter` the stream is cut into tokens instead, one line printed
//! per token. The scanner commits after every character or token, so two
//! small buffers are enough for files of any size.

mod options;

use anyhow::{Context, Result};
use itertools::Itertools;
use options::ARGS;
use std::process;
use utf8scan::error::ScanError;
use utf8scan::input::{ByteCounter, FileReader};
use utf8scan::scanner::Utf8Scanner;

/// Totals collected while decoding a whole file.
#[derive(Debug, Default)]
struct Summary {
    /// Bytes consumed, including the bytes of malformed sequences.
    bytes: ByteCounter,
    /// Correctly encoded code points.
    chars: u64,
    /// Newline characters seen.
    lines: u64,
    /// Byte offsets of the malformed sequences.
    malformed: Vec<ByteCounter>,
}

/// Decodes the file to its end, committing every character so the reader
/// can recycle its buffers.
fn validate(scan: &mut Utf8Scanner, frd: &mut FileReader) -> Result<Summary> {
    let mut summary = Summary::default();

    loop {
        let result = scan.next_char(frd);
        // The committed token covers exactly the bytes this character
        // consumed, which keeps the offset exact even when a malformed
        // sequence is skipped.
        let consumed = scan.current_token().total_size() as ByteCounter;
        match result {
            Ok(uchar) => {
                summary.chars += 1;
                if uchar == u32::from(b'\n') {
                    summary.lines += 1;
                }
            }
            Err(ScanError::IllegalSequence) => summary.malformed.push(summary.bytes),
            Err(ScanError::NoData) => break,
            Err(e) => return Err(e).context("reading input failed"),
        }
        summary.bytes += consumed;
        scan.clear_token(frd);
    }

    Ok(summary)
}

/// Cuts the stream on the delimiter and prints one line per token.
fn tokenize(scan: &mut Utf8Scanner, frd: &mut FileReader, delimiter: char) -> Result<()> {
    let mut offset: ByteCounter = 0;
    let mut index = 0u64;

    loop {
        match scan.skip_until_after(frd, delimiter as u32) {
            Ok(()) => {
                let token = scan.current_token();
                println!(
                    "{}\t0x{:x}\t{} bytes\t{} part{}",
                    index,
                    offset,
                    token.total_size(),
                    token.parts_count(),
                    if token.parts_count() == 1 { "" } else { "s" },
                );
                offset += token.total_size() as ByteCounter;
                index += 1;
                scan.clear_token(frd);
            }
            Err(ScanError::NoData) => {
                // bytes after the last delimiter
                let trailing = scan.current_token().total_size();
                if trailing > 0 {
                    println!("{}\t0x{:x}\t{} bytes\t(no delimiter)", index, offset, trailing);
                }
                break;
            }
            Err(ScanError::NoBuffer) => {
                eprintln!(
                    "Warning: token {} at offset 0x{:x} is longer than two buffers, splitting it.",
                    index, offset
                );
                offset += scan.current_token().total_size() as ByteCounter;
                index += 1;
                scan.clear_token(frd);
            }
            Err(e) => return Err(e).context("reading input failed"),
        }
    }

    Ok(())
}

fn run() -> Result<()> {
    let mut frd = if ARGS.single_buffer {
        FileReader::open_single_buffer(&ARGS.input, None)
    } else {
        FileReader::open_double_buffer(&ARGS.input, None, ARGS.buffer_size)
    }
    .with_context(|| format!("can not read file `{}`", ARGS.input.display()))?;
    let mut scan = Utf8Scanner::new();

    if let Some(delimiter) = ARGS.delimiter {
        tokenize(&mut scan, &mut frd, delimiter)?;
        scan.close(&mut frd);
        return Ok(());
    }

    let summary = validate(&mut scan, &mut frd)?;
    scan.close(&mut frd);

    println!(
        "{}: {} bytes, {} code points, {} lines",
        ARGS.input.display(),
        summary.bytes,
        summary.chars,
        summary.lines
    );

    if !summary.malformed.is_empty() {
        let shown = summary
            .malformed
            .iter()
            .take(ARGS.max_report)
            .map(|offset| format!("0x{:x}", offset))
            .join(", ");
        let hidden = summary.malformed.len().saturating_sub(ARGS.max_report);
        if hidden > 0 {
            eprintln!(
                "Error: wrong UTF-8 encoding at offsets {} (and {} more).",
                shown, hidden
            );
        } else {
            eprintln!("Error: wrong UTF-8 encoding at offsets {}.", shown);
        }
        process::exit(1);
    }

    Ok(())
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}.", e);
        process::exit(2);
    }
}
