//! Candidate encoding
//!
//! Turns a block descriptor plus a nonce into the bytes that get hashed.
//! Everything except the nonce is constant for a search, so the encoder
//! keeps the descriptor prefix (and a hasher that has already absorbed it)
//! and only appends the nonce per attempt.

use crate::crypto::Sha256Hasher;
use crate::types::{BlockDescriptor, Digest, Nonce, DIGEST_LEN};
use crate::{Error, Result};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Longest decimal rendering of a `u64`
const MAX_DECIMAL_LEN: usize = 20;

/// Byte layout of a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CandidateEncoding {
    /// `text(block_number) ++ transactions ++ previous_hash ++ text(nonce)`
    /// with no delimiters. Digests match the legacy reference miner.
    #[default]
    Concatenated,
    /// Same field order, each field preceded by its length as a 4-byte
    /// big-endian integer, so no two field tuples share an encoding.
    LengthPrefixed,
}

impl fmt::Display for CandidateEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CandidateEncoding::Concatenated => write!(f, "concatenated"),
            CandidateEncoding::LengthPrefixed => write!(f, "length-prefixed"),
        }
    }
}

/// Encoder bound to one block descriptor
#[derive(Clone)]
pub struct CandidateEncoder {
    encoding: CandidateEncoding,
    prefix: Vec<u8>,
    midstate: Sha256Hasher,
}

impl CandidateEncoder {
    /// Encode the constant part of every candidate for `block`
    pub fn new(block: &BlockDescriptor, encoding: CandidateEncoding) -> Result<Self> {
        let block_number = block.block_number().to_string();
        let fields = [
            block_number.as_bytes(),
            block.transactions().as_bytes(),
            block.previous_hash().as_bytes(),
        ];

        let mut prefix = Vec::with_capacity(fields.iter().map(|f| f.len() + 4).sum());
        for field in fields {
            push_field(&mut prefix, field, encoding)?;
        }

        let midstate = Sha256Hasher::with_prefix(&prefix);
        Ok(Self {
            encoding,
            prefix,
            midstate,
        })
    }

    /// The encoding in use
    pub fn encoding(&self) -> CandidateEncoding {
        self.encoding
    }

    /// Full candidate bytes for `nonce`
    pub fn encode(&self, nonce: Nonce) -> Vec<u8> {
        let mut digits = [0u8; MAX_DECIMAL_LEN];
        let digits = write_decimal(nonce.value(), &mut digits);

        let mut out = Vec::with_capacity(self.prefix.len() + digits.len() + 4);
        out.extend_from_slice(&self.prefix);
        // A decimal u64 is at most 20 bytes, so framing it cannot fail.
        if self.encoding == CandidateEncoding::LengthPrefixed {
            out.extend_from_slice(&(digits.len() as u32).to_be_bytes());
        }
        out.extend_from_slice(digits);
        out
    }

    /// Hash the candidate for `nonce`, reusing the prefix midstate
    #[inline]
    pub fn hash(&self, nonce: Nonce) -> [u8; DIGEST_LEN] {
        let mut digits = [0u8; MAX_DECIMAL_LEN];
        let digits = write_decimal(nonce.value(), &mut digits);

        let mut hasher = self.midstate.clone();
        if self.encoding == CandidateEncoding::LengthPrefixed {
            hasher.update(&(digits.len() as u32).to_be_bytes());
        }
        hasher.update(digits);
        *hasher.finalize().as_bytes()
    }

    /// Digest of the candidate for `nonce`
    pub fn digest(&self, nonce: Nonce) -> Digest {
        Digest::new(self.hash(nonce))
    }
}

fn push_field(out: &mut Vec<u8>, field: &[u8], encoding: CandidateEncoding) -> Result<()> {
    if encoding == CandidateEncoding::LengthPrefixed {
        let len = u32::try_from(field.len()).map_err(|_| {
            Error::encoding(format!(
                "field of {} bytes exceeds the 4-byte length prefix",
                field.len()
            ))
        })?;
        out.extend_from_slice(&len.to_be_bytes());
    }
    out.extend_from_slice(field);
    Ok(())
}

/// Render `value` as ASCII decimal into the tail of `buf`
fn write_decimal(mut value: u64, buf: &mut [u8; MAX_DECIMAL_LEN]) -> &[u8] {
    let mut pos = MAX_DECIMAL_LEN;
    loop {
        pos -= 1;
        buf[pos] = b'0' + (value % 10) as u8;
        value /= 10;
        if value == 0 {
            break;
        }
    }
    &buf[pos..]
}
