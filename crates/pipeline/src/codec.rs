//! Hierarchical audio-token codec
//!
//! The inference engine emits a flat token stream where every 7 consecutive
//! values form one frame. Slot layout per frame `i`:
//!
//! ```text
//! [ L1[i], L2[2i], L3[4i], L3[4i+1], L2[2i+1], L3[4i+2], L3[4i+3] ]
//! ```
//!
//! Each slot's code value is `(token - base) % alphabet_size`; the modulo
//! strips the per-slot sub-offset the engine vocabulary uses.

use bookvoice_core::HierarchicalCode;

/// Raw tokens per frame
pub const FRAME_SLOTS: usize = 7;

/// Codebook size per level
pub const ALPHABET_SIZE: u32 = 4096;

/// Default first audio-code id in the engine vocabulary
pub const CODE_TOKEN_OFFSET: u32 = 128_266;

/// Result of unpacking a flat token stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnpackOutcome {
    pub codes: HierarchicalCode,
    /// Complete frames assembled
    pub frames: usize,
    /// Tokens outside the valid range, excluded before framing
    ///
    /// A high count signals a degenerated upstream generation (e.g. the
    /// engine emitted text instead of audio codes). Non-fatal.
    pub anomalies: usize,
    /// Valid tokens discarded from a trailing partial frame
    pub dropped_tail: usize,
}

/// Unpack flat tokens into three-level hierarchical codes
///
/// Pure function: out-of-range tokens are excluded and counted, a trailing
/// partial frame is discarded (never padded), and every emitted code value
/// lies in `[0, alphabet_size)`.
pub fn unpack(flat_tokens: &[u32], base: u32, alphabet_size: u32) -> UnpackOutcome {
    let span = FRAME_SLOTS as u32 * alphabet_size;
    let valid: Vec<u32> = flat_tokens
        .iter()
        .copied()
        .filter(|t| *t >= base && *t < base + span)
        .collect();
    let anomalies = flat_tokens.len() - valid.len();

    let frames = valid.len() / FRAME_SLOTS;
    let dropped_tail = valid.len() % FRAME_SLOTS;

    let mut codes = HierarchicalCode {
        l1: Vec::with_capacity(frames),
        l2: Vec::with_capacity(frames * 2),
        l3: Vec::with_capacity(frames * 4),
    };

    for frame in valid.chunks_exact(FRAME_SLOTS) {
        let code = |t: u32| (t - base) % alphabet_size;
        codes.l1.push(code(frame[0]));
        codes.l2.push(code(frame[1]));
        codes.l2.push(code(frame[4]));
        codes.l3.push(code(frame[2]));
        codes.l3.push(code(frame[3]));
        codes.l3.push(code(frame[5]));
        codes.l3.push(code(frame[6]));
    }

    UnpackOutcome {
        codes,
        frames,
        anomalies,
        dropped_tail,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Inverse of `unpack` for round-trip testing. Places each slot's value
    /// at its per-slot sub-offset, as the engine vocabulary does.
    fn pack(codes: &HierarchicalCode, base: u32, alphabet_size: u32) -> Vec<u32> {
        let slot = |k: u32, value: u32| base + k * alphabet_size + value;
        let mut out = Vec::with_capacity(codes.frames() * FRAME_SLOTS);
        for i in 0..codes.frames() {
            out.push(slot(0, codes.l1[i]));
            out.push(slot(1, codes.l2[2 * i]));
            out.push(slot(2, codes.l3[4 * i]));
            out.push(slot(3, codes.l3[4 * i + 1]));
            out.push(slot(4, codes.l2[2 * i + 1]));
            out.push(slot(5, codes.l3[4 * i + 2]));
            out.push(slot(6, codes.l3[4 * i + 3]));
        }
        out
    }

    fn arbitrary_codes(n: usize) -> HierarchicalCode {
        // Deterministic pseudo-arbitrary values covering the full alphabet
        let gen = |i: usize, salt: u32| ((i as u32).wrapping_mul(2654435761) ^ salt) % ALPHABET_SIZE;
        HierarchicalCode {
            l1: (0..n).map(|i| gen(i, 0xA5A5)).collect(),
            l2: (0..2 * n).map(|i| gen(i, 0x5A5A)).collect(),
            l3: (0..4 * n).map(|i| gen(i, 0x3C3C)).collect(),
        }
    }

    #[test]
    fn test_round_trip_various_lengths() {
        for n in [0usize, 1, 2, 13, 100] {
            let codes = arbitrary_codes(n);
            let flat = pack(&codes, CODE_TOKEN_OFFSET, ALPHABET_SIZE);
            let outcome = unpack(&flat, CODE_TOKEN_OFFSET, ALPHABET_SIZE);

            assert_eq!(outcome.frames, n);
            assert_eq!(outcome.anomalies, 0);
            assert_eq!(outcome.dropped_tail, 0);
            assert_eq!(outcome.codes, codes);
            assert!(outcome.codes.is_well_formed());
        }
    }

    #[test]
    fn test_slot_to_level_mapping() {
        // One frame with distinct values per slot
        let base = 1000;
        let flat: Vec<u32> = (0..7).map(|s| base + s * ALPHABET_SIZE + s + 1).collect();
        let outcome = unpack(&flat, base, ALPHABET_SIZE);

        assert_eq!(outcome.codes.l1, vec![1]);
        assert_eq!(outcome.codes.l2, vec![2, 5]);
        assert_eq!(outcome.codes.l3, vec![3, 4, 6, 7]);
    }

    #[test]
    fn test_partial_trailing_frame_discarded() {
        let codes = arbitrary_codes(2);
        let mut flat = pack(&codes, CODE_TOKEN_OFFSET, ALPHABET_SIZE);
        flat.truncate(10); // one complete frame plus 3 stray tokens

        let outcome = unpack(&flat, CODE_TOKEN_OFFSET, ALPHABET_SIZE);
        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.dropped_tail, 3);
        assert_eq!(outcome.codes.l1.len(), 1);
        assert_eq!(outcome.codes.l2.len(), 2);
        assert_eq!(outcome.codes.l3.len(), 4);
    }

    #[test]
    fn test_out_of_range_tokens_excluded_and_counted() {
        let codes = arbitrary_codes(1);
        let mut flat = pack(&codes, CODE_TOKEN_OFFSET, ALPHABET_SIZE);
        // Interleave garbage below and above the valid span
        flat.insert(0, 5);
        flat.insert(3, CODE_TOKEN_OFFSET + 7 * ALPHABET_SIZE);
        flat.push(0);

        let outcome = unpack(&flat, CODE_TOKEN_OFFSET, ALPHABET_SIZE);
        assert_eq!(outcome.anomalies, 3);
        assert_eq!(outcome.frames, 1);
        assert_eq!(outcome.codes, codes);
    }

    #[test]
    fn test_all_tokens_below_base_yield_empty_codes() {
        let flat: Vec<u32> = (0..70).collect();
        let outcome = unpack(&flat, CODE_TOKEN_OFFSET, ALPHABET_SIZE);

        assert_eq!(outcome.frames, 0);
        assert_eq!(outcome.anomalies, 70);
        assert!(outcome.codes.is_empty());
        assert!(outcome.codes.l2.is_empty());
        assert!(outcome.codes.l3.is_empty());
    }

    #[test]
    fn test_code_values_bounded() {
        let flat: Vec<u32> =
            (0..7 * 5).map(|i| CODE_TOKEN_OFFSET + i * 997 % (7 * ALPHABET_SIZE)).collect();
        let outcome = unpack(&flat, CODE_TOKEN_OFFSET, ALPHABET_SIZE);
        let all = outcome
            .codes
            .l1
            .iter()
            .chain(&outcome.codes.l2)
            .chain(&outcome.codes.l3);
        for value in all {
            assert!(*value < ALPHABET_SIZE);
        }
    }
}
