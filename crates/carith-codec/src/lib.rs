#![doc = "RLE, LZSS and arithmetic-coding primitives with per-block chain selection"]

pub mod arith;
pub mod block;
pub mod lzss;
pub mod rle;
pub mod scheme;

mod error;

pub use self::error::CodecError;
