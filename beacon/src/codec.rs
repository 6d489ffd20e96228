//! Bit-vector encoding of following-round votes.
//!
//! A following-round vote reclassifies the proposals of the voter's own
//! first-round lists. With `L` = valid ++ potentially-valid (broadcast
//! order), bit `i` of the little-endian bit-vector is 1 iff `L[i]` is
//! currently valid, 0 iff invalid. Proposals outside `L` cannot be
//! referenced. The vector is `⌈|L|/64⌉` words long and trailing bits are
//! zero.
//!
//! Both directions are pure functions; `decode(encode(v, L), L) == v`
//! holds for every full classification `v` of `L`.

use thiserror::Error;

use crate::votes::{FirstRoundVotes, VoteSet};

/// Bits per bit-vector word.
pub const WORD_BITS: usize = 64;

/// Decode failures; these surface as malformed messages.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("bit-vector length mismatch: expected {expected} words, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    #[error("bit-vector has nonzero trailing bits")]
    TrailingBits,
}

/// Number of words needed for `len` proposals.
pub fn words_for(len: usize) -> usize {
    len.div_ceil(WORD_BITS)
}

/// Encode a classification of the voter's first-round proposals.
///
/// A proposal absent from `votes.valid` encodes as 0; proposals outside
/// the first-round lists are not representable and are dropped.
pub fn encode_votes(votes: &VoteSet, first_round: &FirstRoundVotes) -> Vec<u64> {
    let mut words = vec![0u64; words_for(first_round.len())];
    for (i, proposal) in first_round.reference_list().enumerate() {
        if votes.valid.contains(proposal) {
            words[i / WORD_BITS] |= 1 << (i % WORD_BITS);
        }
    }
    words
}

/// Decode a bit-vector back into a full classification of the voter's
/// first-round proposals.
pub fn decode_votes(
    bit_vector: &[u64],
    first_round: &FirstRoundVotes,
) -> Result<VoteSet, CodecError> {
    let expected = words_for(first_round.len());
    if bit_vector.len() != expected {
        return Err(CodecError::LengthMismatch {
            expected,
            got: bit_vector.len(),
        });
    }

    let mut votes = VoteSet::default();
    for (i, proposal) in first_round.reference_list().enumerate() {
        if bit_vector[i / WORD_BITS] >> (i % WORD_BITS) & 1 == 1 {
            votes.valid.insert(*proposal);
        } else {
            votes.invalid.insert(*proposal);
        }
    }

    if let Some(last) = bit_vector.last() {
        let used = first_round.len() % WORD_BITS;
        if used != 0 && last >> used != 0 {
            return Err(CodecError::TrailingBits);
        }
    }

    Ok(votes)
}
