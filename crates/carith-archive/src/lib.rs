#![doc = "Archive driver: block I/O loop, worker dispatch, file-level CRC"]

//! The driver splits a file into fixed-size segments, fans them out to a
//! pool of worker threads, and serializes the results into the container
//! format. Blocks are independent: workers never share state and never
//! touch the files; all I/O happens on the calling thread.

mod driver;
mod error;

pub use self::driver::{
    compress_file, extract_file, tell_file, ArchiveOptions, ArchiveReport, BlockReport, CompressSummary,
    ExtractSummary,
};
pub use self::error::ArchiveError;
