//! Core types for proof-of-work mining
//!
//! Fundamental values shared by the encoder, the hash engine and the
//! searchers, with validation at construction and serde support for
//! reporting.

use crate::encoding::{CandidateEncoder, CandidateEncoding};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Length of a SHA-256 digest in bytes
pub const DIGEST_LEN: usize = 32;

/// Length of a SHA-256 digest rendered as hexadecimal
pub const DIGEST_HEX_LEN: usize = DIGEST_LEN * 2;

/// Proof-of-work nonce
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Nonce(pub u64);

impl Nonce {
    /// Largest representable nonce
    pub const MAX: Nonce = Nonce(u64::MAX);

    /// Create a new nonce
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the nonce value
    pub const fn value(self) -> u64 {
        self.0
    }

    /// Advance by `step`, or `None` if the counter would overflow
    pub fn checked_add(self, step: u64) -> Option<Self> {
        self.0.checked_add(step).map(Self)
    }

    /// Advance by one, or `None` if the counter would overflow
    pub fn checked_increment(self) -> Option<Self> {
        self.checked_add(1)
    }
}

impl fmt::Display for Nonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Nonce {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl From<Nonce> for u64 {
    fn from(nonce: Nonce) -> Self {
        nonce.0
    }
}

/// Number of leading zero hex digits a digest must have
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Difficulty(u32);

impl Difficulty {
    /// Hardest satisfiable difficulty: every hex digit of the digest is zero
    pub const MAX: u32 = DIGEST_HEX_LEN as u32;

    /// Create a difficulty, rejecting values no digest can satisfy
    pub fn new(zeros: u64) -> Result<Self> {
        if zeros > u64::from(Self::MAX) {
            return Err(Error::invalid_difficulty(zeros, Self::MAX));
        }
        Ok(Self(zeros as u32))
    }

    /// Get the required zero count
    pub const fn zeros(self) -> u32 {
        self.0
    }

    /// The required hex prefix, e.g. `"000"` for difficulty 3
    pub fn prefix(self) -> String {
        "0".repeat(self.0 as usize)
    }

    /// Expected number of attempts before a match (16^n)
    pub fn expected_attempts(self) -> f64 {
        16f64.powi(self.0 as i32)
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let zeros = u64::deserialize(deserializer)?;
        Difficulty::new(zeros).map_err(serde::de::Error::custom)
    }
}

/// SHA-256 digest of a candidate encoding
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Digest([u8; DIGEST_LEN]);

impl Digest {
    /// Wrap raw digest bytes
    pub const fn new(bytes: [u8; DIGEST_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw digest bytes
    pub fn as_bytes(&self) -> &[u8; DIGEST_LEN] {
        &self.0
    }

    /// Lowercase hexadecimal rendering (64 characters)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Count of leading zero hex digits
    pub fn leading_zero_hex_digits(&self) -> u32 {
        crate::crypto::leading_zero_hex_digits(&self.0)
    }

    /// Whether this digest satisfies `difficulty`
    pub fn meets(&self, difficulty: Difficulty) -> bool {
        self.leading_zero_hex_digits() >= difficulty.zeros()
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self.to_hex())
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Digest {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(Error::encoding(format!(
                "Invalid digest hex length: expected {} chars, got {}",
                DIGEST_HEX_LEN,
                s.len()
            )));
        }
        let mut bytes = [0u8; DIGEST_LEN];
        hex::decode_to_slice(s, &mut bytes)
            .map_err(|e| Error::encoding(format!("Invalid hex in digest: {}", e)))?;
        Ok(Self(bytes))
    }
}

impl Serialize for Digest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Digest::from_str(&s).map_err(serde::de::Error::custom)
    }
}

/// Immutable description of the block being mined
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BlockDescriptor {
    block_number: u64,
    transactions: String,
    previous_hash: String,
    difficulty: Difficulty,
}

impl BlockDescriptor {
    /// Create a descriptor.
    ///
    /// Only the difficulty is validated; `transactions` and `previous_hash`
    /// are opaque payloads accepted verbatim.
    pub fn new(
        block_number: u64,
        transactions: impl Into<String>,
        previous_hash: impl Into<String>,
        difficulty: u64,
    ) -> Result<Self> {
        let difficulty = Difficulty::new(difficulty)?;
        Ok(Self {
            block_number,
            transactions: transactions.into(),
            previous_hash: previous_hash.into(),
            difficulty,
        })
    }

    /// Create a descriptor from raw payload bytes, which must be valid UTF-8
    pub fn from_utf8(
        block_number: u64,
        transactions: Vec<u8>,
        previous_hash: Vec<u8>,
        difficulty: u64,
    ) -> Result<Self> {
        let transactions = String::from_utf8(transactions)
            .map_err(|e| Error::encoding(format!("transactions are not valid UTF-8: {}", e)))?;
        let previous_hash = String::from_utf8(previous_hash)
            .map_err(|e| Error::encoding(format!("previous hash is not valid UTF-8: {}", e)))?;
        Self::new(block_number, transactions, previous_hash, difficulty)
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    pub fn transactions(&self) -> &str {
        &self.transactions
    }

    pub fn previous_hash(&self) -> &str {
        &self.previous_hash
    }

    pub fn difficulty(&self) -> Difficulty {
        self.difficulty
    }

    /// Compute the digest of this block for `nonce`
    pub fn digest_for(&self, nonce: Nonce, encoding: CandidateEncoding) -> Result<Digest> {
        let encoder = CandidateEncoder::new(self, encoding)?;
        Ok(encoder.digest(nonce))
    }

    /// Recompute the digest for `nonce` and check it against `digest` and
    /// the block's difficulty
    pub fn verify(
        &self,
        nonce: Nonce,
        digest: &Digest,
        encoding: CandidateEncoding,
    ) -> Result<bool> {
        let computed = self.digest_for(nonce, encoding)?;
        Ok(&computed == digest && computed.meets(self.difficulty))
    }
}

/// Partial statistics of a search that stopped without a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SearchStats {
    /// Hashes computed across all workers
    pub hashes: u64,
    /// Wall-clock time spent searching
    pub elapsed: Duration,
}

/// Outcome of a successful search.
///
/// Only the searchers build one, so `attempts` always equals `nonce + 1`.
/// It is a `u128` because a winner at `u64::MAX` takes 2^64 attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MiningResult {
    digest: Digest,
    nonce: Nonce,
    elapsed: Duration,
    attempts: u128,
    hashes: u64,
    workers: usize,
}

impl MiningResult {
    pub(crate) fn new(
        digest: Digest,
        nonce: Nonce,
        elapsed: Duration,
        hashes: u64,
        workers: usize,
    ) -> Self {
        Self {
            digest,
            nonce,
            elapsed,
            attempts: u128::from(nonce.value()) + 1,
            hashes,
            workers,
        }
    }

    /// The winning digest
    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    /// The smallest qualifying nonce
    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Time from search start to the final result
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Attempts a sequential search needs to reach the winner (`nonce + 1`)
    pub fn attempts(&self) -> u128 {
        self.attempts
    }

    /// Hashes actually computed, including parallel overshoot
    pub fn hashes(&self) -> u64 {
        self.hashes
    }

    /// Number of workers that took part
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Average hash rate over the search
    pub fn hash_rate(&self) -> f64 {
        crate::worker::compute_hash_rate(self.hashes, self.elapsed)
    }
}
