//! Scheme byte: which codec stages apply to a block.
//!
//! The wire carries a bitmask; inside the codec the legal combinations are
//! a closed enum so stage dispatch is a `match`, not bit tests scattered
//! through the pipeline. Stage order is fixed: RLE, then LZSS, then AC on
//! encode, the reverse on decode.

use bitflags::bitflags;

use crate::lzss::LzssLevel;
use crate::CodecError;

bitflags! {
    /// Raw scheme bits as they appear in the container.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Scheme: u8 {
        /// Arithmetic coder applied.
        const AC = 0x80;
        /// Run-length stage applied.
        const RLE = 0x40;
        /// LZSS with the 4k window applied.
        const LZSS_4K = 0x20;
        /// LZSS with the 32k window applied.
        const LZSS_32K = 0x10;
        /// Block stored verbatim.
        const STORED = 0x08;
        /// Request bit: pick the best chain per block. Never stored.
        const ROULETTE = 0x01;
    }
}

/// A legal stage combination, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chain {
    /// No compression; the payload is the plain block.
    Stored,
    Rle,
    Lzss(LzssLevel),
    Ac,
    RleLzss(LzssLevel),
    RleAc,
    LzssAc(LzssLevel),
    RleLzssAc(LzssLevel),
}

impl Chain {
    /// The scheme bits naming exactly the stages of this chain.
    pub fn scheme(self) -> Scheme {
        match self {
            Self::Stored => Scheme::STORED,
            Self::Rle => Scheme::RLE,
            Self::Lzss(level) => lzss_bit(level),
            Self::Ac => Scheme::AC,
            Self::RleLzss(level) => Scheme::RLE | lzss_bit(level),
            Self::RleAc => Scheme::RLE | Scheme::AC,
            Self::LzssAc(level) => lzss_bit(level) | Scheme::AC,
            Self::RleLzssAc(level) => Scheme::RLE | lzss_bit(level) | Scheme::AC,
        }
    }

    /// Parses a stored scheme byte. Anything outside the legal combinations
    /// (including a stray roulette bit) is rejected.
    pub fn from_scheme_byte(byte: u8) -> Result<Self, CodecError> {
        let chain = match byte {
            0x08 => Self::Stored,
            0x40 => Self::Rle,
            0x20 => Self::Lzss(LzssLevel::K4),
            0x10 => Self::Lzss(LzssLevel::K32),
            0x80 => Self::Ac,
            0x60 => Self::RleLzss(LzssLevel::K4),
            0x50 => Self::RleLzss(LzssLevel::K32),
            0xC0 => Self::RleAc,
            0xA0 => Self::LzssAc(LzssLevel::K4),
            0x90 => Self::LzssAc(LzssLevel::K32),
            0xE0 => Self::RleLzssAc(LzssLevel::K4),
            0xD0 => Self::RleLzssAc(LzssLevel::K32),
            other => return Err(CodecError::IllegalScheme(other)),
        };
        Ok(chain)
    }

    pub fn uses_rle(self) -> bool {
        self.scheme().contains(Scheme::RLE)
    }

    pub fn uses_ac(self) -> bool {
        self.scheme().contains(Scheme::AC)
    }

    pub fn lzss_level(self) -> Option<LzssLevel> {
        match self {
            Self::Lzss(level) | Self::RleLzss(level) | Self::LzssAc(level) | Self::RleLzssAc(level) => Some(level),
            _ => None,
        }
    }

    pub fn is_stored(self) -> bool {
        self == Self::Stored
    }
}

fn lzss_bit(level: LzssLevel) -> Scheme {
    match level {
        LzssLevel::K4 => Scheme::LZSS_4K,
        LzssLevel::K32 => Scheme::LZSS_32K,
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(Chain::Stored, 0x08)]
    #[case(Chain::Rle, 0x40)]
    #[case(Chain::Lzss(LzssLevel::K4), 0x20)]
    #[case(Chain::Lzss(LzssLevel::K32), 0x10)]
    #[case(Chain::Ac, 0x80)]
    #[case(Chain::RleLzss(LzssLevel::K4), 0x60)]
    #[case(Chain::RleLzss(LzssLevel::K32), 0x50)]
    #[case(Chain::RleAc, 0xC0)]
    #[case(Chain::LzssAc(LzssLevel::K4), 0xA0)]
    #[case(Chain::LzssAc(LzssLevel::K32), 0x90)]
    #[case(Chain::RleLzssAc(LzssLevel::K4), 0xE0)]
    #[case(Chain::RleLzssAc(LzssLevel::K32), 0xD0)]
    fn scheme_bytes_round_trip(#[case] chain: Chain, #[case] byte: u8) {
        assert_eq!(chain.scheme().bits(), byte);
        assert_eq!(Chain::from_scheme_byte(byte).unwrap(), chain);
    }

    #[rstest]
    #[case(0x00)]
    #[case(0x01)] // roulette is a request, never a stored scheme
    #[case(0x30)] // both LZSS variants at once
    #[case(0x48)] // stored combined with a stage
    #[case(0xF0)]
    #[case(0x81)]
    fn illegal_bytes_are_rejected(#[case] byte: u8) {
        assert_eq!(Chain::from_scheme_byte(byte), Err(CodecError::IllegalScheme(byte)));
    }
}
