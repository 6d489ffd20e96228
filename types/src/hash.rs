//! Beacon and proposal digest types.

use crate::error::TypeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 32-byte epoch beacon value.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Beacon([u8; 32]);

impl Beacon {
    /// The genesis beacon (all zeros).
    pub const ZERO: Self = Self([0u8; 32]);

    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Parse from a hex string, with or without a `0x` prefix. Short input
    /// is left-padded with zero bytes.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        Ok(Self(decode_hex_padded(s)?))
    }
}

impl fmt::Debug for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Beacon(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Beacon {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// A 32-byte proposal tag.
///
/// A proposal is an eligibility-passing VRF signature; the tag is the
/// fixed-length identity under which it is voted on, tallied, and hashed
/// into the beacon. Tags order lexicographically by their byte value.
#[derive(
    Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Proposal([u8; 32]);

impl Proposal {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a hex string, with or without a `0x` prefix. Short input
    /// is left-padded with zero bytes.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        Ok(Self(decode_hex_padded(s)?))
    }
}

impl fmt::Debug for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Proposal(")?;
        for b in &self.0[..4] {
            write!(f, "{:02x}", b)?;
        }
        write!(f, ")")
    }
}

impl fmt::Display for Proposal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in &self.0 {
            write!(f, "{:02x}", b)?;
        }
        Ok(())
    }
}

/// Decode a hex string into 32 bytes, left-padded. Accepts odd nibble
/// counts and an optional `0x` prefix.
fn decode_hex_padded(s: &str) -> Result<[u8; 32], TypeError> {
    let s = s.strip_prefix("0x").unwrap_or(s);
    if s.is_empty() || s.len() > 64 {
        return Err(TypeError::InvalidHex {
            input: s.to_string(),
        });
    }

    let mut out = [0u8; 32];
    // Walk nibbles from the end so that short input lands right-aligned.
    let mut byte_idx = 31;
    let mut nibbles = s.chars().rev();
    loop {
        let lo = match nibbles.next() {
            Some(c) => hex_value(c, s)?,
            None => break,
        };
        let hi = match nibbles.next() {
            Some(c) => hex_value(c, s)?,
            None => {
                out[byte_idx] = lo;
                break;
            }
        };
        out[byte_idx] = (hi << 4) | lo;
        if byte_idx == 0 {
            break;
        }
        byte_idx -= 1;
    }
    Ok(out)
}

fn hex_value(c: char, input: &str) -> Result<u8, TypeError> {
    c.to_digit(16)
        .map(|v| v as u8)
        .ok_or_else(|| TypeError::InvalidHex {
            input: input.to_string(),
        })
}
