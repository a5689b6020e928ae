//! This module deals with command-line arguments and directly related
//! data structures.

use clap::Parser;
use lazy_static::lazy_static;
use std::path::PathBuf;
use utf8scan::input::DEFAULT_BUFFER_SIZE;

/// Default value when no `--max-report` command-line-argument is given.
pub const MAX_REPORT_DEFAULT: usize = 20;

#[derive(Debug, PartialEq, Parser)]
#[command(
    name = "utf8scan",
    about = "Validate and tokenize UTF-8 encoded files."
)]
/// This structure holds the command-line-options and is populated by
/// `clap`. See the output of `--help` for more information about their
/// meaning.
pub struct Args {
    /// path of the file to scan
    pub input: PathBuf,
    /// total reader buffer size in bytes (rounded up to a page pair)
    #[arg(long, short = 'b', default_value_t = DEFAULT_BUFFER_SIZE)]
    pub buffer_size: usize,
    /// split the stream into tokens ending after this character
    #[arg(long, short = 'd')]
    pub delimiter: Option<char>,
    /// print at most this many malformed-sequence offsets
    #[arg(long, short = 'm', default_value_t = MAX_REPORT_DEFAULT)]
    pub max_report: usize,
    /// preload the whole file into a single buffer
    #[arg(long, short = 's')]
    pub single_buffer: bool,
}

lazy_static! {
    /// Structure to hold the parsed command-line arguments.
    pub static ref ARGS: Args = Args::parse();
}

#[cfg(test)]
mod tests {

    /// Are the command-line options read and processed correctly?
    #[test]
    fn test_arg_parser() {
        use super::Args;
        use clap::Parser;
        use std::path::PathBuf;

        let argv = vec![
            "utf8scan",
            "-b",
            "32768",
            "--delimiter",
            "\n",
            "-m",
            "5",
            "--single-buffer",
            "infile",
        ];
        let args = Args::parse_from(argv);

        assert_eq!(args.input, PathBuf::from("infile"));
        assert_eq!(args.buffer_size, 32768);
        assert_eq!(args.delimiter, Some('\n'));
        assert_eq!(args.max_report, 5);
        assert!(args.single_buffer);
    }

    #[test]
    fn test_arg_defaults() {
        use super::{Args, MAX_REPORT_DEFAULT};
        use clap::Parser;
        use utf8scan::input::DEFAULT_BUFFER_SIZE;

        let args = Args::parse_from(vec!["utf8scan", "infile"]);
        assert_eq!(args.buffer_size, DEFAULT_BUFFER_SIZE);
        assert_eq!(args.delimiter, None);
        assert_eq!(args.max_report, MAX_REPORT_DEFAULT);
        assert!(!args.single_buffer);
    }
}
