#![doc = "Bit-level cursors and checksums shared by the carith codec stack"]

mod bits;
mod crc32;

pub use self::bits::{bit_width, BitReader, BitWriter};
pub use self::crc32::{crc32, Crc32};
