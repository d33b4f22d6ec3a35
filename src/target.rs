//! Difficulty to 256-bit target conversion.
//!
//! Pools communicate share difficulty as an IEEE double; the miner compares
//! hashes against a 32-byte big-endian target derived from it. The
//! conversion follows the classic pool convention
//! `floor((0xffff0000 * 2^192 + 1) / difficulty - 0.5)` and is carried out
//! in exact rational arithmetic so the half-unit rounding bias never falls
//! victim to floating-point error.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed};
use thiserror::Error;

/// Error converting a difficulty value.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TargetError {
    /// Difficulty must be non-negative.
    #[error("difficulty must be non-negative, got {0}")]
    Negative(f64),

    /// Difficulty must be a finite number.
    #[error("difficulty must be finite, got {0}")]
    NotFinite(f64),
}

/// Convert a pool difficulty into a 32-byte big-endian target.
///
/// Difficulty 0 yields the all-ones target (every hash is a share). Results
/// outside the 256-bit range are clamped: wider than 256 bits to all-ones,
/// below zero to all-zero.
pub fn difficulty_to_target(difficulty: f64) -> Result<[u8; 32], TargetError> {
    if difficulty.is_nan() || difficulty < 0.0 {
        return Err(TargetError::Negative(difficulty));
    }
    if difficulty == 0.0 {
        return Ok([0xff; 32]);
    }

    let base: BigInt = (BigInt::from(0xffff0000u64) << 192) + 1;
    let difficulty =
        BigRational::from_float(difficulty).ok_or(TargetError::NotFinite(difficulty))?;

    let half = BigRational::new(BigInt::one(), BigInt::from(2));
    let target = (BigRational::from_integer(base) / difficulty - half).floor().to_integer();

    if target.is_negative() {
        return Ok([0u8; 32]);
    }

    let (_, bytes) = target.to_bytes_be();
    if bytes.len() > 32 {
        return Ok([0xff; 32]);
    }

    let mut out = [0u8; 32];
    out[32 - bytes.len()..].copy_from_slice(&bytes);
    Ok(out)
}
