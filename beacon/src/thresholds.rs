//! Eligibility and voting threshold arithmetic.
//!
//! The proposal eligibility fraction is
//!
//! ```text
//! f(W) = 1 - 2^(-κ / ((1-q)·W))
//! ```
//!
//! where `W` is the total epoch weight, `κ` the security parameter and `q`
//! the assumed adversarial share. A VRF signature σ is eligible iff
//! `int(σ) < ⌊f(W)·2^512⌋`. The signature space is 2^512, so the fraction
//! is evaluated in integer fixed point — never in binary floating point —
//! to keep the cut-off stable across platforms.
//!
//! Everything in this module is a pure function of its arguments.

use num_bigint::{BigInt, BigUint};
use num_integer::Roots;
use num_rational::Ratio;
use num_traits::{One, Signed, ToPrimitive, Zero};
use pharos_types::VrfSignature;

use crate::error::BeaconError;

/// An arbitrary-precision rational.
pub type Rational = Ratio<BigInt>;

/// Bit length of the VRF signature space (64-byte signatures).
pub const SIGNATURE_BITS: u64 = 512;

/// Fractional bits carried through the fixed-point evaluation of `f(W)`.
/// 256 guard bits beyond the 512-bit compare absorb the truncation of the
/// repeated-square-root exponentiation.
const FRACTION_BITS: u64 = 768;

/// Parse a rational string such as `"1/3"`, `"0.25"`, or `"2"`.
pub fn parse_rational(s: &str) -> Result<Rational, BeaconError> {
    let s = s.trim();
    let invalid = || BeaconError::Config {
        reason: format!("not a rational number: {s:?}"),
    };

    if let Some((num, den)) = s.split_once('/') {
        let num: BigInt = num.trim().parse().map_err(|_| invalid())?;
        let den: BigInt = den.trim().parse().map_err(|_| invalid())?;
        if den.is_zero() {
            return Err(invalid());
        }
        return Ok(Rational::new(num, den));
    }

    if let Some((int_part, frac_part)) = s.split_once('.') {
        if frac_part.is_empty() || !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let negative = int_part.starts_with('-');
        let int_part: BigInt = if int_part.is_empty() || int_part == "-" {
            BigInt::zero()
        } else {
            int_part.parse().map_err(|_| invalid())?
        };
        let frac: BigInt = frac_part.parse().map_err(|_| invalid())?;
        let scale = BigInt::from(10u8).pow(frac_part.len() as u32);
        let magnitude = Rational::from_integer(int_part.abs())
            + Rational::new(frac, scale);
        return Ok(if negative { -magnitude } else { magnitude });
    }

    let int: BigInt = s.parse().map_err(|_| invalid())?;
    Ok(Rational::from_integer(int))
}

/// Parse the adversarial share `q`; must lie in `[0, 1)`.
pub fn parse_adversary_share(s: &str) -> Result<Rational, BeaconError> {
    let q = parse_rational(s)?;
    if q.is_negative() || q >= Rational::one() {
        return Err(BeaconError::Config {
            reason: format!("adversarial share must be in [0, 1): {s:?}"),
        });
    }
    Ok(q)
}

/// Parse the voting threshold fraction θ; must be non-negative.
pub fn parse_theta(s: &str) -> Result<Rational, BeaconError> {
    let theta = parse_rational(s)?;
    if theta.is_negative() {
        return Err(BeaconError::Config {
            reason: format!("voting threshold fraction must be non-negative: {s:?}"),
        });
    }
    Ok(theta)
}

/// The proposal eligibility threshold `⌊f(W)·2^512⌋`.
///
/// Returns zero for a zero epoch weight (nothing is eligible) and the
/// maximum signature value when the exponent saturates (tiny weights).
pub fn atx_threshold(kappa: u64, q: &Rational, epoch_weight: u64) -> BigUint {
    if epoch_weight == 0 {
        return BigUint::zero();
    }

    // x = κ / ((1-q)·W), strictly positive because q < 1.
    let denom = (Rational::one() - q) * Rational::from_integer(BigInt::from(epoch_weight));
    let x = Rational::from_integer(BigInt::from(kappa)) / denom;

    // threshold = 2^512 - 2^(512 - x), evaluated in Q(FRACTION_BITS).
    let y = Rational::from_integer(BigInt::from(SIGNATURE_BITS)) - x;
    if !y.is_positive() {
        return (BigUint::one() << SIGNATURE_BITS) - BigUint::one();
    }

    let whole = y
        .floor()
        .to_integer()
        .to_u64()
        .expect("0 < y < 512 so its floor fits in u64");
    let frac = &y - y.floor();

    let pow2_y = exp2_fraction(&frac) << whole;
    let total = BigUint::one() << (SIGNATURE_BITS + FRACTION_BITS);
    (total - pow2_y) >> FRACTION_BITS
}

/// `2^f` for `f ∈ [0, 1)` in Q(FRACTION_BITS) fixed point.
///
/// Walks the binary expansion of `f`; the k-th set bit contributes a factor
/// `2^(2^-k)`, obtained by iterated integer square roots of 2.
fn exp2_fraction(f: &Rational) -> BigUint {
    let mut result = BigUint::one() << FRACTION_BITS;
    if f.is_zero() {
        return result;
    }

    let mut root = sqrt_fixed(&(BigUint::from(2u8) << FRACTION_BITS));
    let mut num = f.numer().magnitude().clone();
    let den = f.denom().magnitude().clone();

    for _ in 0..FRACTION_BITS {
        if num.is_zero() {
            break;
        }
        num <<= 1;
        if num >= den {
            num -= &den;
            result = (result * &root) >> FRACTION_BITS;
        }
        root = sqrt_fixed(&root);
    }
    result
}

/// Square root in Q(FRACTION_BITS) fixed point.
fn sqrt_fixed(value: &BigUint) -> BigUint {
    (value << FRACTION_BITS).sqrt()
}

/// A VRF signature interpreted as a big-endian integer.
pub fn signature_int(signature: &VrfSignature) -> BigUint {
    BigUint::from_bytes_be(signature.as_bytes())
}

/// The eligibility test: `int(σ) < T(W)`.
pub fn passes_eligibility(signature: &VrfSignature, threshold: &BigUint) -> bool {
    signature_int(signature) < *threshold
}

/// The margin-adoption threshold `⌊θ·W⌋`.
pub fn voting_threshold(theta: &Rational, epoch_weight: u64) -> i128 {
    let product = theta * Rational::from_integer(BigInt::from(epoch_weight));
    product.floor().to_integer().to_i128().unwrap_or(i128::MAX)
}
