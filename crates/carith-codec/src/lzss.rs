//! Lempel–Ziv–Storer–Szymanski dictionary coder, in two window geometries.
//!
//! The 4k variant packs a 12-bit offset and 4-bit length into a 2-byte match
//! token; the 32k variant packs a 15-bit offset and 6-bit length into the
//! low 21 bits of a 3-byte token. Both walk the same seeded sliding window
//! and differ only in their numeric parameters, selected at construction the
//! same way for both directions.
//!
//! The window starts pre-warmed with a fixed seed dictionary so inputs
//! smaller than the window still find matches. The seed bytes are part of
//! the wire format: both ends must load the identical text at the identical
//! position or the output is garbage.
//!
//! Compressed stream layout, from byte 0:
//!
//! ```text
//! u32 BE  initial_copy   raw bytes emitted before the first match
//! u32 BE  token_count    number of tokens that follow
//! bytes   flag/token stream: one flag byte per up to 8 tokens
//!         (bit 0 = first token; 0 = literal byte, 1 = match token)
//! ```

use crate::CodecError;

/// Seed dictionary: common English words, C-idiom keywords and other byte
/// sequences that repay dictionary hits on small technical inputs.
pub const SEED: &[u8] = b"the and over if else printf do while goto define include size_t \
int unsigned uint8_t uint16_t uint32_t uint64_t for void return char short long long \
static typedef union enum stdio.h stdlib.h errno.h string.h iostream map queue list \
stack sys/fcntl.h sys/time.h unistd.h class public private protected default memcpy \
memset volatile pthread exit mutex condition";

const MIN_MATCH: usize = 3;

const STREAM_HEADER_LEN: usize = 8;

/// Window geometry selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LzssLevel {
    /// 4095-byte window, 12-bit offset, 4-bit length, 2-byte match token.
    K4,
    /// 32767-byte window, 15-bit offset, 6-bit length, 3-byte match token.
    K32,
}

impl LzssLevel {
    pub fn window_size(self) -> usize {
        match self {
            Self::K4 => 4095,
            Self::K32 => 32767,
        }
    }

    fn length_bits(self) -> u32 {
        match self {
            Self::K4 => 4,
            Self::K32 => 6,
        }
    }

    fn token_bytes(self) -> usize {
        match self {
            Self::K4 => 2,
            Self::K32 => 3,
        }
    }

    /// Longest match a token can carry: `MIN_MATCH + 2^length_bits - 1`.
    pub fn max_match(self) -> usize {
        MIN_MATCH + (1 << self.length_bits()) - 1
    }
}

/// Per-symbol slice of the pointer pool.
///
/// `count_base` is the fixed start of the symbol's partition. As the window
/// slides forward, occurrences behind it die: `search_base` advances over
/// them and `count` shrinks, so later searches never revisit a dead entry.
#[derive(Clone, Copy, Default)]
struct SymbolHint {
    count_base: u32,
    search_base: u32,
    count: u32,
}

/// LZSS compression/decompression context.
///
/// Owns the window-plus-data buffer, the flat pointer pool and the symbol
/// hint table. Every encode or decode call lays the buffer out afresh, so a
/// context can be reused back-to-back without state leaking across blocks.
pub struct LzssContext {
    level: LzssLevel,
    /// `window ++ data`: seed-dictionary window followed by the working bytes.
    buf: Vec<u8>,
    /// Positions of every byte occurrence in `buf[seed_start..]`, partitioned
    /// by symbol value in increasing position order.
    pool: Vec<u32>,
    symbols: Box<[SymbolHint; 256]>,
}

impl LzssContext {
    pub fn new(level: LzssLevel) -> Self {
        Self {
            level,
            buf: Vec::new(),
            pool: Vec::new(),
            symbols: Box::new([SymbolHint::default(); 256]),
        }
    }

    pub fn level(&self) -> LzssLevel {
        self.level
    }

    fn seed_start(&self) -> usize {
        self.level.window_size() - SEED.len()
    }

    /// Lays out `window ++ data`: zero fill, seed at the right edge of the
    /// window, then the working bytes.
    fn prepare_buffer(&mut self, data: &[u8]) {
        let window = self.level.window_size();
        self.buf.clear();
        self.buf.resize(window, 0);
        self.buf[window - SEED.len()..].copy_from_slice(SEED);
        self.buf.extend_from_slice(data);
    }

    /// Tabulates per-symbol counts over `buf[seed_start..]` and fills each
    /// partition of the pool with the increasing positions of its symbol.
    fn prepare_pointer_pool(&mut self) {
        let seed_start = self.seed_start();

        let mut counts = [0u32; 256];
        for &byte in &self.buf[seed_start..] {
            counts[usize::from(byte)] += 1;
        }

        let mut base = 0u32;
        for (hint, &count) in self.symbols.iter_mut().zip(&counts) {
            *hint = SymbolHint {
                count_base: base,
                search_base: base,
                count,
            };
            base += count;
        }

        self.pool.clear();
        self.pool.resize(base as usize, 0);
        let mut next = [0u32; 256];
        for (pos, &byte) in self.buf.iter().enumerate().skip(seed_start) {
            let sym = usize::from(byte);
            let slot = self.symbols[sym].count_base + next[sym];
            self.pool[slot as usize] = pos as u32;
            next[sym] += 1;
        }
    }

    /// Finds the longest match for `buf[p..]` within `[window_back, p - MIN_MATCH]`.
    ///
    /// Walks the pointer-pool partition for `buf[p]` in increasing position
    /// order, pruning entries the window has passed. Ties in length go to
    /// the later (closer) candidate. Returns `(offset, len)`; `len` below
    /// `MIN_MATCH` means no usable match.
    fn find_match(&mut self, window_back: usize, p: usize, limit: usize) -> (usize, usize) {
        if window_back > p - MIN_MATCH {
            return (0, 0);
        }

        let max_match = self.level.max_match();
        let sym = usize::from(self.buf[p]);
        let search_base = self.symbols[sym].search_base as usize;
        let count = self.symbols[sym].count as usize;

        let mut best_len = 0usize;
        let mut best_pos = 0usize;

        for slot in search_base..search_base + count {
            let q = self.pool[slot] as usize;

            if q < window_back {
                // Dead entry, never look at it again.
                self.symbols[sym].count -= 1;
                self.symbols[sym].search_base += 1;
                continue;
            }
            if q > p - MIN_MATCH {
                break;
            }

            // Length is capped by the back-distance: a match never reads
            // past the position it started from.
            let target = (p + max_match).min(limit).min(p + (p - q));
            let mut len = 0;
            while p + len < target && self.buf[p + len] == self.buf[q + len] {
                len += 1;
            }

            if len >= best_len {
                best_len = len;
                best_pos = q;
            }
            if best_len == max_match {
                break;
            }
        }

        (p - best_pos, best_len)
    }

    /// Encodes `input` into a self-contained token stream.
    ///
    /// An uncompressible input costs about 9/8 of its size in literal tokens
    /// plus the 8-byte header; callers guard against expansion themselves.
    pub fn encode(&mut self, input: &[u8]) -> Result<Vec<u8>, CodecError> {
        if input.is_empty() {
            return Err(CodecError::EmptyInput);
        }

        self.prepare_buffer(input);
        self.prepare_pointer_pool();

        let window = self.level.window_size();
        let limit = window + input.len();

        let mut out = vec![0u8; STREAM_HEADER_LEN];
        let mut block = TokenBlock::new(self.level);
        let mut p = window;
        let mut window_back = self.seed_start();
        let mut initial_copy = 0u32;
        let mut token_count = 0u32;
        let mut found_first_match = false;

        while p < limit {
            if p - window_back > window {
                window_back = p - window;
            }

            let (offset, len) = self.find_match(window_back, p, limit);
            if len < MIN_MATCH {
                // No match: emit the unmatched bytes one at a time, raw
                // before the first match, as literal tokens after it.
                for _ in 0..len.max(1) {
                    if found_first_match {
                        block.push_literal(self.buf[p]);
                        token_count += 1;
                        block.flush_if_full(&mut out);
                    } else {
                        out.push(self.buf[p]);
                        initial_copy += 1;
                    }
                    p += 1;
                }
            } else {
                found_first_match = true;
                block.push_match(offset, len);
                token_count += 1;
                p += len;
            }
            block.flush_if_full(&mut out);
        }
        block.flush(&mut out);

        out[0..4].copy_from_slice(&initial_copy.to_be_bytes());
        out[4..8].copy_from_slice(&token_count.to_be_bytes());
        Ok(out)
    }

    /// Decodes a token stream produced by [`Self::encode`] at the same level.
    pub fn decode(&mut self, comp: &[u8]) -> Result<Vec<u8>, CodecError> {
        if comp.len() < STREAM_HEADER_LEN {
            return Err(CodecError::TruncatedStream { context: "stream header" });
        }
        let initial_copy = u32::from_be_bytes([comp[0], comp[1], comp[2], comp[3]]) as usize;
        let token_count = u32::from_be_bytes([comp[4], comp[5], comp[6], comp[7]]) as usize;

        self.prepare_buffer(&[]);

        let window = self.level.window_size();
        let seed_len = SEED.len();
        let length_bits = self.level.length_bits();
        let token_bytes = self.level.token_bytes();
        let mut in_ptr = STREAM_HEADER_LEN;

        let raw = comp
            .get(in_ptr..in_ptr + initial_copy)
            .ok_or(CodecError::TruncatedStream { context: "initial copy" })?;
        self.buf.extend_from_slice(raw);
        in_ptr += initial_copy;

        let mut tokens_done = 0;
        while tokens_done < token_count {
            let flags = *comp
                .get(in_ptr)
                .ok_or(CodecError::TruncatedStream { context: "flag byte" })?;
            in_ptr += 1;

            for bit in 0..8 {
                if tokens_done == token_count {
                    break;
                }
                if (flags >> bit) & 1 == 1 {
                    let raw = comp
                        .get(in_ptr..in_ptr + token_bytes)
                        .ok_or(CodecError::TruncatedStream { context: "match token" })?;
                    in_ptr += token_bytes;

                    let mut value = 0u32;
                    for &byte in raw {
                        value = value << 8 | u32::from(byte);
                    }
                    let offset = (value >> length_bits) as usize;
                    let len = (value & ((1 << length_bits) - 1)) as usize + MIN_MATCH;

                    let available = (self.buf.len() - window + seed_len).min(window);
                    if offset == 0 || offset > available {
                        return Err(CodecError::OffsetOutOfWindow { offset, available });
                    }

                    // Byte-by-byte so an overlapped match extends bytes it
                    // produced earlier in the same copy.
                    let mut src = self.buf.len() - offset;
                    for _ in 0..len {
                        let byte = self.buf[src];
                        self.buf.push(byte);
                        src += 1;
                    }
                } else {
                    let byte = *comp
                        .get(in_ptr)
                        .ok_or(CodecError::TruncatedStream { context: "literal token" })?;
                    in_ptr += 1;
                    self.buf.push(byte);
                }
                tokens_done += 1;
            }
        }

        Ok(self.buf[window..].to_vec())
    }
}

/// Up to 8 pending tokens sharing one flag byte.
///
/// Buffering a full group lets the encoder write the 8 flags as a single
/// byte instead of spending a bit cursor on the stream.
struct TokenBlock {
    level: LzssLevel,
    flags: u8,
    tokens: [PendingToken; 8],
    len: usize,
}

#[derive(Clone, Copy)]
enum PendingToken {
    Literal(u8),
    Match { offset: usize, len: usize },
}

impl TokenBlock {
    fn new(level: LzssLevel) -> Self {
        Self {
            level,
            flags: 0,
            tokens: [PendingToken::Literal(0); 8],
            len: 0,
        }
    }

    fn push_literal(&mut self, byte: u8) {
        self.tokens[self.len] = PendingToken::Literal(byte);
        self.len += 1;
    }

    fn push_match(&mut self, offset: usize, len: usize) {
        debug_assert!((MIN_MATCH..=self.level.max_match()).contains(&len));
        debug_assert!(offset >= 1 && offset <= self.level.window_size());
        self.flags |= 1 << self.len;
        self.tokens[self.len] = PendingToken::Match { offset, len };
        self.len += 1;
    }

    fn flush_if_full(&mut self, out: &mut Vec<u8>) {
        if self.len == 8 {
            self.flush(out);
        }
    }

    fn flush(&mut self, out: &mut Vec<u8>) {
        if self.len == 0 {
            return;
        }
        out.push(self.flags);
        for token in &self.tokens[..self.len] {
            match *token {
                PendingToken::Literal(byte) => out.push(byte),
                PendingToken::Match { offset, len } => {
                    let value = (offset as u32) << self.level.length_bits() | (len - MIN_MATCH) as u32;
                    match self.level {
                        LzssLevel::K4 => out.extend_from_slice(&(value as u16).to_be_bytes()),
                        LzssLevel::K32 => out.extend_from_slice(&value.to_be_bytes()[1..]),
                    }
                }
            }
        }
        self.flags = 0;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;

    fn roundtrip(level: LzssLevel, input: &[u8]) -> Vec<u8> {
        let mut ctx = LzssContext::new(level);
        let encoded = ctx.encode(input).expect("non-empty input");
        let mut ctx = LzssContext::new(level);
        ctx.decode(&encoded).expect("stream fresh from the encoder")
    }

    #[test]
    fn seed_fits_both_windows() {
        assert_eq!(SEED.len(), 361);
        assert!(SEED.len() < LzssLevel::K4.window_size());
    }

    #[rstest]
    #[case(LzssLevel::K4)]
    #[case(LzssLevel::K32)]
    fn empty_input_is_rejected(#[case] level: LzssLevel) {
        let mut ctx = LzssContext::new(level);
        assert_eq!(ctx.encode(&[]), Err(CodecError::EmptyInput));
    }

    #[rstest]
    #[case(LzssLevel::K4)]
    #[case(LzssLevel::K32)]
    fn single_byte(#[case] level: LzssLevel) {
        assert_eq!(roundtrip(level, b"x"), b"x");
    }

    #[rstest]
    #[case(LzssLevel::K4)]
    #[case(LzssLevel::K32)]
    fn seed_dictionary_pays_for_small_inputs(#[case] level: LzssLevel) {
        // Every word here sits verbatim in the seed, so the encoder should
        // beat plain storage even with the 8-byte header.
        let input = b"static typedef union enum stdio.h stdlib.h errno.h";
        let mut ctx = LzssContext::new(level);
        let encoded = ctx.encode(input).unwrap();
        assert!(encoded.len() < input.len(), "{} >= {}", encoded.len(), input.len());
        assert_eq!(roundtrip(level, input), input);
    }

    #[rstest]
    #[case(LzssLevel::K4)]
    #[case(LzssLevel::K32)]
    fn repetitive_input(#[case] level: LzssLevel) {
        let input = b"Pattern".repeat(200);
        let mut ctx = LzssContext::new(level);
        let encoded = ctx.encode(&input).unwrap();
        assert!(encoded.len() < input.len() / 4);
        assert_eq!(roundtrip(level, &input), input);
    }

    #[rstest]
    #[case(LzssLevel::K4)]
    #[case(LzssLevel::K32)]
    fn long_single_byte_run(#[case] level: LzssLevel) {
        let input = vec![0xAB; 5000];
        assert_eq!(roundtrip(level, &input), input);
    }

    #[test]
    fn input_slides_past_the_4k_window() {
        // Repeats spaced wider than 4095 bytes are invisible to the 4k
        // window but must still round-trip.
        let mut input = Vec::new();
        for i in 0..6000u32 {
            input.extend_from_slice(&i.to_be_bytes());
        }
        assert_eq!(roundtrip(LzssLevel::K4, &input), input);
        assert_eq!(roundtrip(LzssLevel::K32, &input), input);
    }

    #[test]
    fn context_reuse_is_stateless() {
        let mut ctx = LzssContext::new(LzssLevel::K4);
        let first = ctx.encode(b"the and over the and over").unwrap();
        let _ = ctx.encode(b"something else entirely....").unwrap();
        let again = ctx.encode(b"the and over the and over").unwrap();
        assert_eq!(first, again);
    }

    #[test]
    fn tail_flag_group_shorter_than_eight() {
        // One match then ten literal tokens: 11 tokens, so the second flag
        // byte covers only three.
        let mut input = vec![0xF7; 6];
        input.extend(1..=10u8);
        let mut enc = LzssContext::new(LzssLevel::K4);
        let encoded = enc.encode(&input).unwrap();
        let token_count = u32::from_be_bytes([encoded[4], encoded[5], encoded[6], encoded[7]]);
        assert_eq!(token_count, 11);
        let mut dec = LzssContext::new(LzssLevel::K4);
        assert_eq!(dec.decode(&encoded).unwrap(), input);
    }

    #[test]
    fn truncated_stream_is_rejected() {
        let mut ctx = LzssContext::new(LzssLevel::K4);
        let encoded = ctx.encode(b"static typedef union enum").unwrap();
        let mut dec = LzssContext::new(LzssLevel::K4);
        assert!(matches!(
            dec.decode(&encoded[..encoded.len() - 1]),
            Err(CodecError::TruncatedStream { .. })
        ));
        assert!(matches!(
            dec.decode(&encoded[..4]),
            Err(CodecError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn out_of_window_offset_is_rejected() {
        // initial_copy = 0, token_count = 1, one match token reaching past
        // the seeded window: offset 4095 with nothing decoded yet.
        let mut stream = Vec::new();
        stream.extend_from_slice(&0u32.to_be_bytes());
        stream.extend_from_slice(&1u32.to_be_bytes());
        stream.push(0x01);
        stream.extend_from_slice(&((4095u16) << 4).to_be_bytes());

        let mut dec = LzssContext::new(LzssLevel::K4);
        assert!(matches!(
            dec.decode(&stream),
            Err(CodecError::OffsetOutOfWindow { offset: 4095, .. })
        ));
    }

    #[test]
    fn zero_offset_is_rejected() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&0u32.to_be_bytes());
        stream.extend_from_slice(&1u32.to_be_bytes());
        stream.push(0x01);
        stream.extend_from_slice(&0u16.to_be_bytes());

        let mut dec = LzssContext::new(LzssLevel::K4);
        assert!(matches!(
            dec.decode(&stream),
            Err(CodecError::OffsetOutOfWindow { offset: 0, .. })
        ));
    }

    #[test]
    fn match_tokens_use_the_declared_packing() {
        // One literal then a match of the same three bytes at offset 3:
        // 4k packs (3 << 4) | 0 into two bytes, 32k packs (3 << 6) | 0
        // into three.
        let input = [0xF7, 0xF7, 0xF7, 0xF7, 0xF7, 0xF7];
        for (level, token) in [
            (LzssLevel::K4, vec![0x00, 0x30]),
            (LzssLevel::K32, vec![0x00, 0x00, 0xC0]),
        ] {
            let mut ctx = LzssContext::new(level);
            let encoded = ctx.encode(&input).unwrap();
            let initial_copy = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
            assert_eq!(initial_copy, 3);
            // header, 3 raw bytes, flag byte, match token
            assert_eq!(encoded[STREAM_HEADER_LEN + 3], 0x01);
            assert_eq!(&encoded[STREAM_HEADER_LEN + 4..], &token[..]);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn roundtrip_arbitrary_k4(input in prop::collection::vec(any::<u8>(), 1..6000)) {
            prop_assert_eq!(roundtrip(LzssLevel::K4, &input), input);
        }

        #[test]
        fn roundtrip_arbitrary_k32(input in prop::collection::vec(any::<u8>(), 1..6000)) {
            prop_assert_eq!(roundtrip(LzssLevel::K32, &input), input);
        }

        #[test]
        fn roundtrip_low_entropy(input in prop::collection::vec(0u8..4, 1..6000)) {
            prop_assert_eq!(roundtrip(LzssLevel::K4, &input), input.clone());
            prop_assert_eq!(roundtrip(LzssLevel::K32, &input), input);
        }
    }
}
