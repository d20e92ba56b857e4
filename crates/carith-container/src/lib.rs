#![doc = "Archive container format: file header and per-block framing"]

//! The container wraps exactly one compressed file: a fixed header, then
//! per-block frames back to back until end of file. There is no sentinel
//! frame and no index; decoding seeks only forward. All integers are
//! big-endian.
//!
//! ```text
//! header:  u16 cookie  u8 scheme  u32 mode  u32 plain_crc
//!          u32 total_plain_len  u32 total_rle_len  u32 segsize
//!
//! frame:   u8 scheme  u32 rle_intermediate_len  u32 total_payload_len
//!          u16 freq_comp_len  u32 block_plain_len
//!          freq_comp[freq_comp_len]  comp[total_payload_len - freq_comp_len]
//! ```

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt as _, WriteBytesExt as _};

/// Magic cookie opening every archive.
pub const COOKIE: u16 = 0xD5AA;

/// Smallest legal segment size.
pub const MIN_SEGMENT_SIZE: u32 = 32_768;
/// Largest legal segment size; bounds per-worker memory.
pub const MAX_SEGMENT_SIZE: u32 = 16_777_216;
/// Default segment size.
pub const DEFAULT_SEGMENT_SIZE: u32 = 524_288;

/// Upper bound accepted for a frame's declared payload. Worst-case stage
/// expansion of a maximum segment stays well inside this.
const MAX_FRAME_PAYLOAD: u32 = 1 << 26;

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error("bad magic cookie {found:#06x}, not a carith archive")]
    BadCookie { found: u16 },
    #[error("segment size {0} outside {MIN_SEGMENT_SIZE}..={MAX_SEGMENT_SIZE}")]
    BadSegmentSize(u32),
    #[error("frame declares a payload smaller than its frequency table ({total} < {freq})")]
    InvalidPayloadLength { total: u32, freq: u16 },
    #[error("frame declares {0} payload bytes, over the format maximum")]
    OversizeFrame(u32),
    #[error("frame declares a plain length of {got}, over the segment size {segsize}")]
    OversizePlainLength { got: u32, segsize: u32 },
    #[error("archive ends inside a frame")]
    TruncatedFrame,
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// File-scope header. The scheme byte records what was requested of the
/// encoder; with per-block framing it is advisory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileHeader {
    pub scheme: u8,
    /// POSIX mode bits of the original file.
    pub mode: u32,
    /// CRC32 of the plain input.
    pub plain_crc: u32,
    pub total_plain_len: u32,
    /// Sum of per-block RLE intermediate sizes; 0 when RLE was never used.
    pub total_rle_len: u32,
    pub segsize: u32,
}

impl FileHeader {
    /// Encoded size in bytes: the compressor reserves this much and seeks
    /// back to rewrite the header once totals are known.
    pub const ENCODED_LEN: u64 = 23;

    pub fn write_to(&self, dst: &mut impl Write) -> io::Result<()> {
        dst.write_u16::<BigEndian>(COOKIE)?;
        dst.write_u8(self.scheme)?;
        dst.write_u32::<BigEndian>(self.mode)?;
        dst.write_u32::<BigEndian>(self.plain_crc)?;
        dst.write_u32::<BigEndian>(self.total_plain_len)?;
        dst.write_u32::<BigEndian>(self.total_rle_len)?;
        dst.write_u32::<BigEndian>(self.segsize)?;
        Ok(())
    }

    pub fn read_from(src: &mut impl Read) -> Result<Self, ContainerError> {
        let cookie = src.read_u16::<BigEndian>()?;
        if cookie != COOKIE {
            return Err(ContainerError::BadCookie { found: cookie });
        }
        let header = Self {
            scheme: src.read_u8()?,
            mode: src.read_u32::<BigEndian>()?,
            plain_crc: src.read_u32::<BigEndian>()?,
            total_plain_len: src.read_u32::<BigEndian>()?,
            total_rle_len: src.read_u32::<BigEndian>()?,
            segsize: src.read_u32::<BigEndian>()?,
        };
        if header.segsize < MIN_SEGMENT_SIZE || header.segsize > MAX_SEGMENT_SIZE {
            return Err(ContainerError::BadSegmentSize(header.segsize));
        }
        Ok(header)
    }
}

/// One framed block. The scheme byte names exactly the stages the block
/// used; the splits of the payload are recoverable from the lengths alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockFrame {
    pub scheme: u8,
    /// Size of the RLE intermediate, 0 when RLE is not in the chain.
    pub rle_intermediate_len: u32,
    pub block_plain_len: u32,
    /// Serialized frequency table, empty when AC is not in the chain.
    pub freq_comp: Vec<u8>,
    /// Final-stage payload.
    pub comp: Vec<u8>,
}

impl BlockFrame {
    pub fn total_payload_len(&self) -> u32 {
        (self.freq_comp.len() + self.comp.len()) as u32
    }

    /// Encoded size of this frame including its fixed fields.
    pub fn encoded_len(&self) -> u64 {
        15 + u64::from(self.total_payload_len())
    }

    pub fn write_to(&self, dst: &mut impl Write) -> io::Result<()> {
        dst.write_u8(self.scheme)?;
        dst.write_u32::<BigEndian>(self.rle_intermediate_len)?;
        dst.write_u32::<BigEndian>(self.total_payload_len())?;
        dst.write_u16::<BigEndian>(self.freq_comp.len() as u16)?;
        dst.write_u32::<BigEndian>(self.block_plain_len)?;
        dst.write_all(&self.freq_comp)?;
        dst.write_all(&self.comp)?;
        Ok(())
    }

    /// Reads the next frame, or `None` on a clean end of archive (the last
    /// block is detected by EOF; there is no sentinel).
    ///
    /// `segsize` comes from the header and bounds the declared plain length.
    pub fn read_from(src: &mut impl Read, segsize: u32) -> Result<Option<Self>, ContainerError> {
        let scheme = match src.read_u8() {
            Ok(byte) => byte,
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(err) => return Err(err.into()),
        };

        let mut fields = || -> Result<(u32, u32, u16, u32), io::Error> {
            Ok((
                src.read_u32::<BigEndian>()?,
                src.read_u32::<BigEndian>()?,
                src.read_u16::<BigEndian>()?,
                src.read_u32::<BigEndian>()?,
            ))
        };
        let (rle_intermediate_len, total_payload_len, freq_comp_len, block_plain_len) =
            fields().map_err(map_eof)?;

        if total_payload_len < u32::from(freq_comp_len) {
            return Err(ContainerError::InvalidPayloadLength {
                total: total_payload_len,
                freq: freq_comp_len,
            });
        }
        if total_payload_len > MAX_FRAME_PAYLOAD {
            return Err(ContainerError::OversizeFrame(total_payload_len));
        }
        if block_plain_len > segsize {
            return Err(ContainerError::OversizePlainLength {
                got: block_plain_len,
                segsize,
            });
        }

        let mut freq_comp = vec![0u8; usize::from(freq_comp_len)];
        src.read_exact(&mut freq_comp).map_err(map_eof)?;
        let mut comp = vec![0u8; (total_payload_len - u32::from(freq_comp_len)) as usize];
        src.read_exact(&mut comp).map_err(map_eof)?;

        Ok(Some(Self {
            scheme,
            rle_intermediate_len,
            block_plain_len,
            freq_comp,
            comp,
        }))
    }
}

fn map_eof(err: io::Error) -> ContainerError {
    if err.kind() == io::ErrorKind::UnexpectedEof {
        ContainerError::TruncatedFrame
    } else {
        ContainerError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample_header() -> FileHeader {
        FileHeader {
            scheme: 0x01,
            mode: 0o100644,
            plain_crc: 0xDEAD_BEEF,
            total_plain_len: 1_048_576,
            total_rle_len: 900_000,
            segsize: DEFAULT_SEGMENT_SIZE,
        }
    }

    #[test]
    fn header_round_trips() {
        let header = sample_header();
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, FileHeader::ENCODED_LEN);
        assert_eq!(FileHeader::read_from(&mut Cursor::new(&buf)).unwrap(), header);
    }

    #[test]
    fn header_starts_with_cookie() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();
        assert_eq!(&buf[..2], &[0xD5, 0xAA]);
    }

    #[test]
    fn bad_cookie_is_rejected() {
        let mut buf = Vec::new();
        sample_header().write_to(&mut buf).unwrap();
        buf[0] = 0x00;
        assert!(matches!(
            FileHeader::read_from(&mut Cursor::new(&buf)),
            Err(ContainerError::BadCookie { found: 0x00AA })
        ));
    }

    #[test]
    fn bad_segment_size_is_rejected() {
        let mut header = sample_header();
        header.segsize = 1024;
        let mut buf = Vec::new();
        header.write_to(&mut buf).unwrap();
        assert!(matches!(
            FileHeader::read_from(&mut Cursor::new(&buf)),
            Err(ContainerError::BadSegmentSize(1024))
        ));
    }

    fn sample_frame() -> BlockFrame {
        BlockFrame {
            scheme: 0xD0,
            rle_intermediate_len: 400,
            block_plain_len: 512,
            freq_comp: vec![0xAA; 37],
            comp: vec![0x42; 300],
        }
    }

    #[test]
    fn frame_round_trips() {
        let frame = sample_frame();
        let mut buf = Vec::new();
        frame.write_to(&mut buf).unwrap();
        assert_eq!(buf.len() as u64, frame.encoded_len());

        let mut cursor = Cursor::new(&buf);
        let read = BlockFrame::read_from(&mut cursor, DEFAULT_SEGMENT_SIZE).unwrap().unwrap();
        assert_eq!(read, frame);
        // Clean EOF after the last frame.
        assert!(BlockFrame::read_from(&mut cursor, DEFAULT_SEGMENT_SIZE).unwrap().is_none());
    }

    #[test]
    fn consecutive_frames() {
        let mut buf = Vec::new();
        sample_frame().write_to(&mut buf).unwrap();
        let stored = BlockFrame {
            scheme: 0x08,
            rle_intermediate_len: 0,
            block_plain_len: 100,
            freq_comp: Vec::new(),
            comp: vec![0x11; 100],
        };
        stored.write_to(&mut buf).unwrap();

        let mut cursor = Cursor::new(&buf);
        assert_eq!(
            BlockFrame::read_from(&mut cursor, DEFAULT_SEGMENT_SIZE).unwrap().unwrap(),
            sample_frame()
        );
        assert_eq!(BlockFrame::read_from(&mut cursor, DEFAULT_SEGMENT_SIZE).unwrap().unwrap(), stored);
        assert!(BlockFrame::read_from(&mut cursor, DEFAULT_SEGMENT_SIZE).unwrap().is_none());
    }

    #[test]
    fn truncated_frame_is_an_error() {
        let mut buf = Vec::new();
        sample_frame().write_to(&mut buf).unwrap();
        buf.truncate(buf.len() - 1);
        assert!(matches!(
            BlockFrame::read_from(&mut Cursor::new(&buf), DEFAULT_SEGMENT_SIZE),
            Err(ContainerError::TruncatedFrame)
        ));
        assert!(matches!(
            BlockFrame::read_from(&mut Cursor::new(&buf[..7]), DEFAULT_SEGMENT_SIZE),
            Err(ContainerError::TruncatedFrame)
        ));
    }

    #[test]
    fn payload_shorter_than_freq_table_is_rejected() {
        // total_payload_len 10 but freq_comp_len 20
        let mut buf = vec![0x80];
        buf.extend_from_slice(&0u32.to_be_bytes());
        buf.extend_from_slice(&10u32.to_be_bytes());
        buf.extend_from_slice(&20u16.to_be_bytes());
        buf.extend_from_slice(&100u32.to_be_bytes());
        assert!(matches!(
            BlockFrame::read_from(&mut Cursor::new(&buf), DEFAULT_SEGMENT_SIZE),
            Err(ContainerError::InvalidPayloadLength { total: 10, freq: 20 })
        ));
    }

    #[test]
    fn oversize_plain_length_is_rejected() {
        let frame = BlockFrame {
            scheme: 0x08,
            rle_intermediate_len: 0,
            block_plain_len: DEFAULT_SEGMENT_SIZE + 1,
            freq_comp: Vec::new(),
            comp: Vec::new(),
        };
        let mut buf = Vec::new();
        frame.write_to(&mut buf).unwrap();
        assert!(matches!(
            BlockFrame::read_from(&mut Cursor::new(&buf), DEFAULT_SEGMENT_SIZE),
            Err(ContainerError::OversizePlainLength { .. })
        ));
    }
}
