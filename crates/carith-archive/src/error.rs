//! Driver-level error type.

use std::io;
use std::path::PathBuf;

use carith_codec::CodecError;
use carith_container::ContainerError;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Container(#[from] ContainerError),

    #[error("block {index}: {source}")]
    Codec {
        /// Zero-based block number within the file.
        index: usize,
        source: CodecError,
    },

    #[error("segment size {0} outside the legal range")]
    BadSegmentSize(u32),

    #[error("{0} is larger than the container can describe")]
    InputTooLarge(PathBuf),

    #[error("{0} does not carry the .carith suffix")]
    NotAnArchiveName(PathBuf),
}
