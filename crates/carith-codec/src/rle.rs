//! Rotating-escape run-length coder.
//!
//! Classic RLE needs an escape byte, and any fixed choice penalizes streams
//! that contain it. Here the escape starts at `0x55` and rotates by `0x3B`
//! (mod 256) every time a marker is spent (a compressed run header or a
//! doubled-escape literal), so no byte value stays burdened for long.
//!
//! A run of `n` occurrences (4..=254) compresses to the three bytes
//! `escape, byte, n`. Runs of 1–3 stay literal: they would not pay for the
//! header.

use crate::CodecError;

const INITIAL_ESCAPE: u8 = 0x55;
const ESCAPE_INCREMENT: u8 = 0x3B;

/// Extra repeats beyond the first occurrence before a run is force-flushed.
/// The header count byte holds `count + 1`, so this keeps it below 255.
const MAX_EXTRA_REPEATS: u32 = 253;

/// Run-length encodes `input`.
///
/// The output is at most twice the input length (an input consisting solely
/// of escape bytes doubles). Empty input yields empty output.
pub fn encode(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut escape = INITIAL_ESCAPE;
    // Sliding one-byte window: the byte seen and how many extra times it repeated.
    let mut window: Option<(u8, u32)> = None;

    for &new in input {
        if new == escape {
            match window.take() {
                Some((old, count)) if count >= 3 => {
                    emit_run(&mut out, &mut escape, old, count);
                    // The rotation above retired the marker this byte
                    // matched, so it passes through as a plain literal.
                    out.push(new);
                }
                Some((old, count)) => {
                    for _ in 0..=count {
                        out.push(old);
                    }
                    emit_doubled_escape(&mut out, &mut escape);
                }
                None => emit_doubled_escape(&mut out, &mut escape),
            }
            continue;
        }

        match window {
            None => window = Some((new, 0)),
            Some((old, ref mut count)) if old == new => {
                *count += 1;
                if *count == MAX_EXTRA_REPEATS {
                    let count = *count;
                    emit_run(&mut out, &mut escape, old, count);
                    window = None;
                }
            }
            Some((old, count)) => {
                if count >= 3 {
                    emit_run(&mut out, &mut escape, old, count);
                    if new == escape {
                        // The rotation made the incoming byte the escape.
                        emit_doubled_escape(&mut out, &mut escape);
                        window = None;
                        continue;
                    }
                } else {
                    for _ in 0..=count {
                        out.push(old);
                    }
                }
                window = Some((new, 0));
            }
        }
    }

    if let Some((old, count)) = window {
        if count >= 3 {
            emit_run(&mut out, &mut escape, old, count);
        } else {
            for _ in 0..=count {
                out.push(old);
            }
        }
    }

    out
}

fn emit_run(out: &mut Vec<u8>, escape: &mut u8, byte: u8, count: u32) {
    debug_assert!(count <= MAX_EXTRA_REPEATS);
    out.push(*escape);
    out.push(byte);
    out.push((count + 1) as u8);
    *escape = escape.wrapping_add(ESCAPE_INCREMENT);
}

fn emit_doubled_escape(out: &mut Vec<u8>, escape: &mut u8) {
    out.push(*escape);
    out.push(*escape);
    *escape = escape.wrapping_add(ESCAPE_INCREMENT);
}

#[derive(Clone, Copy)]
enum State {
    Collect,
    EscSeen,
    CharSeen(u8),
}

/// Decodes a run-length encoded stream.
///
/// A repeat construct with a count of zero is stream corruption and fails.
pub fn decode(input: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::with_capacity(input.len());
    let mut escape = INITIAL_ESCAPE;
    let mut state = State::Collect;

    for &byte in input {
        state = match state {
            State::Collect => {
                if byte == escape {
                    State::EscSeen
                } else {
                    out.push(byte);
                    State::Collect
                }
            }
            State::EscSeen => {
                if byte == escape {
                    // Doubled escape: one literal escape byte, then rotate.
                    out.push(byte);
                    escape = escape.wrapping_add(ESCAPE_INCREMENT);
                    State::Collect
                } else {
                    State::CharSeen(byte)
                }
            }
            State::CharSeen(repeat) => {
                if byte == 0 {
                    return Err(CodecError::InvalidRepeatCount);
                }
                for _ in 0..byte {
                    out.push(repeat);
                }
                escape = escape.wrapping_add(ESCAPE_INCREMENT);
                State::Collect
            }
        };
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    fn roundtrip(input: &[u8]) -> Vec<u8> {
        let encoded = encode(input);
        decode(&encoded).expect("stream fresh from the encoder")
    }

    #[test]
    fn empty_input() {
        assert_eq!(encode(&[]), Vec::<u8>::new());
        assert_eq!(decode(&[]).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn no_runs_is_identity() {
        assert_eq!(encode(b"BANANA"), b"BANANA");
        assert_eq!(roundtrip(b"BANANA"), b"BANANA");
    }

    #[test]
    fn short_runs_stay_literal() {
        // Runs of 1 to 3 cost less verbatim than as a 3-byte header.
        assert_eq!(encode(b"aabbbc"), b"aabbbc");
        assert_eq!(roundtrip(b"aabbbc"), b"aabbbc");
    }

    #[test]
    fn long_run_compresses() {
        let input = [0x41u8; 10];
        assert_eq!(encode(&input), vec![0x55, 0x41, 0x0A]);
        assert_eq!(roundtrip(&input), input);
    }

    #[test]
    fn thousand_a_blocks() {
        // 1000 = 254 * 3 + 238, so three capped headers plus a tail header,
        // each rotating the escape by 0x3B.
        let input = [0x41u8; 1000];
        let encoded = encode(&input);
        assert_eq!(
            encoded,
            vec![
                0x55, 0x41, 0xFE, //
                0x90, 0x41, 0xFE, //
                0xCB, 0x41, 0xFE, //
                0x06, 0x41, 0xEE,
            ]
        );
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn escape_pattern_stress() {
        // 0x55 hits the escape path twice, the 0x90 run arrives while 0x90
        // is the live escape, and the trailing 0x55s are plain data again.
        let input = [0x55, 0x55, 0x90, 0x90, 0x90, 0x90, 0x55, 0x55];
        let encoded = encode(&input);
        assert_eq!(encoded, vec![0x55, 0x55, 0x55, 0x90, 0x90, 0x90, 0x90, 0x90, 0x55, 0x55]);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn run_interrupted_by_escape() {
        // A pending long run flushed by an escape byte rotates the marker,
        // so the escape byte itself lands verbatim.
        let mut input = vec![0x41; 6];
        input.push(0x55);
        let encoded = encode(&input);
        assert_eq!(encoded, vec![0x55, 0x41, 0x06, 0x55]);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn run_of_escape_bytes() {
        let input = [0x55u8; 6];
        let encoded = encode(&input);
        // First byte doubles 0x55 and rotates; the remaining five are a run
        // of a byte that is no longer the escape, flushed at EOF under the
        // rotated marker 0x90.
        assert_eq!(encoded, vec![0x55, 0x55, 0x90, 0x55, 0x05]);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn run_flush_collides_with_new_escape() {
        // After the run header rotates 0x55 -> 0x90, the following byte is
        // exactly the fresh escape and must double.
        let mut input = vec![0x41; 5];
        input.push(0x90);
        let encoded = encode(&input);
        assert_eq!(encoded, vec![0x55, 0x41, 0x05, 0x90, 0x90]);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    #[test]
    fn zero_count_is_corruption() {
        // escape, repeat char, count 0
        assert_eq!(decode(&[0x55, 0x41, 0x00]), Err(CodecError::InvalidRepeatCount));
    }

    #[test]
    fn escape_rotation_invariant() {
        // Replay the encoded stream counting escape emissions: the marker in
        // play at every point must be 0x55 + k * 0x3B (mod 256).
        let mut input = Vec::new();
        input.extend_from_slice(&[0x55; 4]);
        input.extend_from_slice(&[0x00; 300]);
        input.extend_from_slice(&[0x90; 8]);
        input.extend_from_slice(b"tail");
        let encoded = encode(&input);

        let mut escape = INITIAL_ESCAPE;
        let mut rotations = 0u32;
        let mut i = 0;
        while i < encoded.len() {
            if encoded[i] == escape {
                rotations += 1;
                i += if encoded[i + 1] == escape { 2 } else { 3 };
                escape = INITIAL_ESCAPE.wrapping_add((rotations as u8).wrapping_mul(ESCAPE_INCREMENT));
            } else {
                i += 1;
            }
        }
        assert!(rotations >= 3);
        assert_eq!(decode(&encoded).unwrap(), input);
    }

    proptest! {
        #[test]
        fn roundtrip_arbitrary(input in prop::collection::vec(any::<u8>(), 0..4096)) {
            prop_assert_eq!(roundtrip(&input), input);
        }

        #[test]
        fn roundtrip_runs(byte: u8, len in 1usize..2048) {
            let input = vec![byte; len];
            prop_assert_eq!(roundtrip(&input), input);
        }

        #[test]
        fn output_never_doubles_plus(input in prop::collection::vec(any::<u8>(), 1..2048)) {
            prop_assert!(encode(&input).len() <= input.len() * 2);
        }
    }
}
