//! Error type for codec operations.

use core::fmt;

/// Error type for compression and decompression primitives.
///
/// There is no recovery at this layer: any of these means the stream is
/// unusable (the formats carry no resynchronization points).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The encoder was handed a zero-length input.
    EmptyInput,
    /// An RLE repeat construct carried a count of zero.
    InvalidRepeatCount,
    /// The compressed stream ended before all declared tokens were read.
    TruncatedStream {
        /// What was being read when the stream ran out.
        context: &'static str,
    },
    /// An LZSS match token points outside the reachable window.
    OffsetOutOfWindow {
        /// Back-distance carried by the token.
        offset: usize,
        /// Bytes reachable behind the output cursor.
        available: usize,
    },
    /// No symbol interval contains the decoder window, even after the
    /// rounding-correction step.
    SymbolNotFound,
    /// The frequency table does not describe the declared source size.
    InvalidFrequencyTable,
    /// The scheme byte names no legal stage combination.
    IllegalScheme(u8),
    /// A decoded stage produced a different length than the block frame
    /// declared for it.
    LengthMismatch {
        /// Length declared by the frame.
        expected: usize,
        /// Length actually produced.
        actual: usize,
    },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyInput => write!(f, "zero length input"),
            Self::InvalidRepeatCount => write!(f, "illegal zero repeat count in stream, possible data corruption"),
            Self::TruncatedStream { context } => {
                write!(f, "compressed stream truncated while reading {context}")
            }
            Self::OffsetOutOfWindow { offset, available } => {
                write!(
                    f,
                    "match offset {offset} points outside the window ({available} bytes available)"
                )
            }
            Self::SymbolNotFound => write!(f, "no symbol interval contains the decoder window"),
            Self::InvalidFrequencyTable => write!(f, "frequency table does not match declared source size"),
            Self::IllegalScheme(scheme) => write!(f, "illegal scheme byte {scheme:#04x}"),
            Self::LengthMismatch { expected, actual } => {
                write!(f, "decoded stage produced {actual} bytes, frame declared {expected}")
            }
        }
    }
}

impl core::error::Error for CodecError {}
