//! Per-block compression pipeline and chain selection.
//!
//! A block is one bounded segment of the input; nothing carries across
//! blocks. The encoder either honours an explicitly requested chain or runs
//! the roulette: try every meaningful chain and keep the smallest result,
//! falling back to storing the block verbatim when nothing shrinks it.

use crate::arith;
use crate::lzss::{LzssContext, LzssLevel};
use crate::rle;
use crate::scheme::Chain;
use crate::CodecError;

/// What the encoder should do with a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemeRequest {
    /// Apply exactly this chain.
    Chain(Chain),
    /// Try the meaningful chains and keep the smallest result.
    Roulette {
        /// Whether RLE may participate.
        use_rle: bool,
    },
}

/// One compressed block, ready for framing.
pub struct CompressedBlock {
    /// The stages actually applied.
    pub chain: Chain,
    /// Plain length of the block.
    pub plain_len: usize,
    /// Size of the RLE intermediate, 0 when RLE is not in the chain.
    pub rle_intermediate_len: usize,
    /// Serialized frequency table, empty when AC is not in the chain.
    pub freq_table: Vec<u8>,
    /// Final stage output (or the verbatim block when stored).
    pub payload: Vec<u8>,
}

impl CompressedBlock {
    /// Bytes this block contributes to the container payload.
    pub fn total_payload_len(&self) -> usize {
        self.freq_table.len() + self.payload.len()
    }
}

/// Reusable per-worker codec state: both LZSS geometries.
///
/// Each call lays out fresh transient state, so a codec can be driven
/// block after block.
pub struct BlockCodec {
    lzss4: LzssContext,
    lzss32: LzssContext,
}

impl BlockCodec {
    pub fn new() -> Self {
        Self {
            lzss4: LzssContext::new(LzssLevel::K4),
            lzss32: LzssContext::new(LzssLevel::K32),
        }
    }

    fn lzss(&mut self, level: LzssLevel) -> &mut LzssContext {
        match level {
            LzssLevel::K4 => &mut self.lzss4,
            LzssLevel::K32 => &mut self.lzss32,
        }
    }

    /// Compresses one block.
    pub fn compress(&mut self, plain: &[u8], request: SchemeRequest) -> Result<CompressedBlock, CodecError> {
        if plain.is_empty() {
            return Err(CodecError::EmptyInput);
        }
        match request {
            SchemeRequest::Chain(chain) => self.compress_chain(plain, chain),
            SchemeRequest::Roulette { use_rle } => self.compress_roulette(plain, use_rle),
        }
    }

    /// Applies the requested chain as-is, with no expansion guards: the
    /// caller asked for these stages and gets them.
    fn compress_chain(&mut self, plain: &[u8], chain: Chain) -> Result<CompressedBlock, CodecError> {
        if chain.is_stored() {
            return Ok(CompressedBlock {
                chain,
                plain_len: plain.len(),
                rle_intermediate_len: 0,
                freq_table: Vec::new(),
                payload: plain.to_vec(),
            });
        }

        let mut rle_intermediate_len = 0;
        let mut intermediate: Option<Vec<u8>> = None;

        if chain.uses_rle() {
            let encoded = rle::encode(plain);
            rle_intermediate_len = encoded.len();
            intermediate = Some(encoded);
        }
        if let Some(level) = chain.lzss_level() {
            let src = intermediate.as_deref().unwrap_or(plain);
            intermediate = Some(self.lzss(level).encode(src)?);
        }

        let (freq_table, payload) = if chain.uses_ac() {
            let src = intermediate.as_deref().unwrap_or(plain);
            let encoded = arith::encode(src)?;
            (encoded.freq_table, encoded.payload)
        } else {
            // The chain always has at least one stage here.
            (Vec::new(), intermediate.unwrap_or_default())
        };

        Ok(CompressedBlock {
            chain,
            plain_len: plain.len(),
            rle_intermediate_len,
            freq_table,
            payload,
        })
    }

    /// Tries the meaningful chains and keeps the smallest result.
    ///
    /// Candidate intermediates, evaluated in order with strict-improvement
    /// comparisons (ties keep the simpler chain):
    /// plain, RLE, (RLE+)LZSS of the better geometry, plain LZSS-32k.
    /// AC then wraps the winner unless the payload-plus-table would not
    /// shrink it. A block no stage improved is stored verbatim.
    fn compress_roulette(&mut self, plain: &[u8], use_rle: bool) -> Result<CompressedBlock, CodecError> {
        let lzss32_plain = self.lzss32.encode(plain)?;

        let rle_encoded = if use_rle {
            Some(rle::encode(plain)).filter(|encoded| encoded.len() < plain.len())
        } else {
            None
        };

        // Best intermediate so far: the plain block, no stages.
        let mut best: Vec<u8> = plain.to_vec();
        let mut prefix: (bool, Option<LzssLevel>) = (false, None);

        if let Some(ref encoded) = rle_encoded {
            // Already known shorter than plain.
            best = encoded.clone();
            prefix = (true, None);
        }

        let (lzss4, lzss32) = match rle_encoded.as_deref() {
            Some(src) => (self.lzss4.encode(src)?, self.lzss32.encode(src)?),
            None => (self.lzss4.encode(plain)?, lzss32_plain.clone()),
        };
        let (level, encoded) = if lzss4.len() <= lzss32.len() {
            (LzssLevel::K4, lzss4)
        } else {
            (LzssLevel::K32, lzss32)
        };
        if encoded.len() < best.len() {
            best = encoded;
            prefix = (prefix.0, Some(level));
        }

        if lzss32_plain.len() < best.len() {
            best = lzss32_plain;
            prefix = (false, Some(LzssLevel::K32));
        }

        let (used_rle, used_lzss) = prefix;
        let rle_intermediate_len = if used_rle { rle_encoded.as_ref().map_or(0, Vec::len) } else { 0 };

        // AC on the winning intermediate, dropped if it would not shrink it.
        let ac = arith::encode(&best)?;
        let use_ac = ac.total_len() < best.len();

        let chain = match (used_rle, used_lzss, use_ac) {
            (false, None, false) => Chain::Stored,
            (false, None, true) => Chain::Ac,
            (true, None, false) => Chain::Rle,
            (true, None, true) => Chain::RleAc,
            (false, Some(level), false) => Chain::Lzss(level),
            (false, Some(level), true) => Chain::LzssAc(level),
            (true, Some(level), false) => Chain::RleLzss(level),
            (true, Some(level), true) => Chain::RleLzssAc(level),
        };

        let (freq_table, payload) = if use_ac {
            (ac.freq_table, ac.payload)
        } else {
            (Vec::new(), best)
        };

        Ok(CompressedBlock {
            chain,
            plain_len: plain.len(),
            rle_intermediate_len,
            freq_table,
            payload,
        })
    }

    /// Decompresses one block, undoing the chain stages in reverse order.
    ///
    /// Every stage boundary is checked against the lengths the frame
    /// declared; a mismatch means corruption and fails the whole extract.
    pub fn extract(&mut self, block: &CompressedBlock) -> Result<Vec<u8>, CodecError> {
        let chain = block.chain;

        if chain.is_stored() {
            if block.payload.len() != block.plain_len {
                return Err(CodecError::LengthMismatch {
                    expected: block.plain_len,
                    actual: block.payload.len(),
                });
            }
            return Ok(block.payload.clone());
        }

        let mut data = if chain.uses_ac() {
            arith::decode(&block.payload, &block.freq_table)?
        } else {
            block.payload.clone()
        };

        if let Some(level) = chain.lzss_level() {
            data = self.lzss(level).decode(&data)?;
        }

        if chain.uses_rle() {
            if data.len() != block.rle_intermediate_len {
                return Err(CodecError::LengthMismatch {
                    expected: block.rle_intermediate_len,
                    actual: data.len(),
                });
            }
            data = rle::decode(&data)?;
        }

        if data.len() != block.plain_len {
            return Err(CodecError::LengthMismatch {
                expected: block.plain_len,
                actual: data.len(),
            });
        }
        Ok(data)
    }
}

impl Default for BlockCodec {
    fn default() -> Self {
        Self::new()
    }
}
