//! Hashing and difficulty checks for mining
//!
//! SHA-256 is the only hash the miner uses. The difficulty predicate is
//! defined on the lowercase hex rendering of a digest; the byte-level
//! helpers below are the equivalent form used inside the search loop.

use crate::types::{Digest, DIGEST_LEN};
use sha2::{Digest as _, Sha256};

/// Reusable SHA-256 hasher for mining operations
#[derive(Clone, Default)]
pub struct Sha256Hasher {
    hasher: Sha256,
}

impl Sha256Hasher {
    /// Create a new SHA-256 hasher
    pub fn new() -> Self {
        Self {
            hasher: Sha256::new(),
        }
    }

    /// Create a hasher that has already absorbed `prefix`.
    ///
    /// Cloning the result and feeding it the remaining bytes gives the same
    /// digest as hashing `prefix ++ rest` from scratch.
    pub fn with_prefix(prefix: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(prefix);
        Self { hasher }
    }

    /// Absorb more input
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finish hashing, consuming the hasher
    pub fn finalize(self) -> Digest {
        Digest::new(self.hasher.finalize().into())
    }

    /// Hash data and return the result, leaving the hasher ready for reuse
    pub fn hash(&mut self, data: &[u8]) -> [u8; DIGEST_LEN] {
        self.hasher.update(data);
        self.hasher.finalize_reset().into()
    }
}

/// SHA-256 of `data`
pub fn sha256(data: &[u8]) -> Digest {
    Digest::new(Sha256Hasher::new().hash(data))
}

/// SHA-256 of `data` as a 64-character lowercase hex string
pub fn hash_hex(data: &[u8]) -> String {
    sha256(data).to_hex()
}

/// True iff the first `zeros` characters of `digest_hex` are ASCII `'0'`.
///
/// Zero required digits always succeed; a requirement longer than the
/// digest never does.
pub fn meets_difficulty(digest_hex: &str, zeros: usize) -> bool {
    let bytes = digest_hex.as_bytes();
    bytes.len() >= zeros && bytes[..zeros].iter().all(|&b| b == b'0')
}

/// Number of leading zero nibbles in `hash`
pub fn leading_zero_hex_digits(hash: &[u8]) -> u32 {
    let mut count = 0u32;
    for byte in hash {
        if *byte == 0 {
            count += 2;
            continue;
        }
        if *byte < 0x10 {
            count += 1;
        }
        break;
    }
    count
}

/// Fast check used by the searchers: no allocation, stops at the first
/// non-zero nibble
#[inline]
pub fn hash_meets_difficulty(hash: &[u8; DIGEST_LEN], zeros: u32) -> bool {
    let full = (zeros / 2) as usize;
    if hash[..full].iter().any(|&b| b != 0) {
        return false;
    }
    zeros % 2 == 0 || hash[full] < 0x10
}
