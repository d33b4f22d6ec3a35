//! Proof-of-work hash algorithm registry.
//!
//! Each supported algorithm resolves to a pure function from bytes to a
//! 32-byte digest. The mining engine is generic over [`HashFn`]; nothing
//! downstream knows which primitive is in play.

use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::{sha256d, Hash};
use thiserror::Error;

/// A pure proof-of-work hash: input bytes to a 32-byte digest.
pub type HashFn = fn(&[u8]) -> [u8; 32];

/// Supported proof-of-work algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Double SHA-256, used by Bitcoin.
    Sha256d,
    /// scrypt(N=1024, r=1, p=1), used by Litecoin.
    Scrypt,
}

/// Error parsing an algorithm name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown algorithm: {0}")]
pub struct ParseAlgorithmError(String);

impl Algorithm {
    /// Resolve the algorithm to its hash function.
    pub fn hash_fn(self) -> HashFn {
        match self {
            Algorithm::Sha256d => sha256d_hash,
            Algorithm::Scrypt => scrypt_hash,
        }
    }

    /// The lowercase protocol name.
    pub fn as_str(self) -> &'static str {
        match self {
            Algorithm::Sha256d => "sha256d",
            Algorithm::Scrypt => "scrypt",
        }
    }
}

impl FromStr for Algorithm {
    type Err = ParseAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sha256d" => Ok(Algorithm::Sha256d),
            "scrypt" => Ok(Algorithm::Scrypt),
            other => Err(ParseAlgorithmError(other.to_string())),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn sha256d_hash(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

/// scrypt with Litecoin's parameters: N=1024, r=1, p=1, the input doubling
/// as its own salt, 32-byte output.
fn scrypt_hash(data: &[u8]) -> [u8; 32] {
    let params = scrypt::Params::new(10, 1, 1, 32).expect("static scrypt parameters are valid");
    let mut out = [0u8; 32];
    scrypt::scrypt(data, data, &params, &mut out).expect("32-byte scrypt output length is valid");
    out
}
