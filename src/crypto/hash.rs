//! Block hash types
//!
//! The full-hash chain identifies blocks by a 32-byte double SHA-256.
//! The partial-hash chain identifies blocks by a 24-byte BLAKE3 digest and
//! references ancestors through the trailing bytes of that digest.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

/// Length of a full-hash chain block hash
pub const SHA256D_HASH_SIZE: usize = 32;

/// Length of a partial-hash chain block hash
pub const VBK_HASH_SIZE: usize = 24;

/// Length of a previous-block reference on the partial-hash chain
pub const VBK_PREVIOUS_BLOCK_SIZE: usize = 12;

/// Length of a keystone reference on the partial-hash chain
pub const VBK_PREVIOUS_KEYSTONE_SIZE: usize = 9;

/// Hash construction errors
#[derive(Debug, Error, PartialEq)]
pub enum HashError {
    #[error("invalid hash length {found}, expected {expected}")]
    InvalidLength { expected: usize, found: usize },
    #[error("invalid hex: {0}")]
    InvalidHex(#[from] hex::FromHexError),
}

/// Behaviour shared by the hash types a ring store can be keyed on
pub trait ChainHash:
    Clone + PartialEq + Eq + std::hash::Hash + fmt::Debug + fmt::Display + Send + Sync + 'static
{
    /// Raw hash bytes
    fn as_slice(&self) -> &[u8];

    /// Build a hash from raw bytes
    fn from_slice(bytes: &[u8]) -> Result<Self, HashError>;

    /// The all-zero hash marks an empty slot or an empty chain head
    fn is_zero(&self) -> bool {
        self.as_slice().iter().all(|b| *b == 0)
    }

    /// Compare against a stored full-length hash.
    ///
    /// A shorter hash matches when it equals the trailing bytes of `stored`.
    fn matches_bytes(&self, stored: &[u8]) -> bool {
        let query = self.as_slice();
        query.len() <= stored.len() && stored[stored.len() - query.len()..] == *query
    }

    /// Partial-hash-aware equality between two hashes of possibly different length
    fn matches(&self, other: &Self) -> bool {
        let (a, b) = (self.as_slice(), other.as_slice());
        if a.len() <= b.len() {
            self.matches_bytes(b)
        } else {
            other.matches_bytes(a)
        }
    }
}

/// 32-byte double SHA-256 hash
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Sha256dHash(pub [u8; SHA256D_HASH_SIZE]);

impl Sha256dHash {
    /// Create a zero hash (used for the genesis previous hash)
    pub const fn zero() -> Self {
        Sha256dHash([0u8; SHA256D_HASH_SIZE])
    }

    /// Create hash from hex string
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes)
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl ChainHash for Sha256dHash {
    fn as_slice(&self) -> &[u8] {
        &self.0
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        let arr: [u8; SHA256D_HASH_SIZE] =
            bytes.try_into().map_err(|_| HashError::InvalidLength {
                expected: SHA256D_HASH_SIZE,
                found: bytes.len(),
            })?;
        Ok(Sha256dHash(arr))
    }
}

impl fmt::Debug for Sha256dHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sha256dHash({})", self.to_hex())
    }
}

impl fmt::Display for Sha256dHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl Default for Sha256dHash {
    fn default() -> Self {
        Self::zero()
    }
}

/// Variable-length partial-hash chain hash.
///
/// Holds either a full 24-byte block hash or one of its truncations
/// (12-byte previous block, 9-byte keystone).
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VbkHash {
    buf: [u8; VBK_HASH_SIZE],
    len: u8,
}

impl VbkHash {
    /// All-zero hash of the given length
    pub fn zero(len: usize) -> Self {
        VbkHash {
            buf: [0u8; VBK_HASH_SIZE],
            len: len.min(VBK_HASH_SIZE) as u8,
        }
    }

    /// Keep only the trailing `len` bytes
    pub fn trim(&self, len: usize) -> Self {
        let bytes = self.as_slice();
        let len = len.min(bytes.len());
        let mut buf = [0u8; VBK_HASH_SIZE];
        buf[..len].copy_from_slice(&bytes[bytes.len() - len..]);
        VbkHash { buf, len: len as u8 }
    }

    /// Truncate to the previous-block reference width
    pub fn trim_to_previous_block(&self) -> Self {
        self.trim(VBK_PREVIOUS_BLOCK_SIZE)
    }

    /// Truncate to the keystone reference width
    pub fn trim_to_previous_keystone(&self) -> Self {
        self.trim(VBK_PREVIOUS_KEYSTONE_SIZE)
    }

    /// Length in bytes
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// True for the zero-length hash
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Create hash from hex string
    pub fn from_hex(hex: &str) -> Result<Self, HashError> {
        let bytes = hex::decode(hex)?;
        Self::from_slice(&bytes)
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.as_slice())
    }
}

impl ChainHash for VbkHash {
    fn as_slice(&self) -> &[u8] {
        &self.buf[..self.len as usize]
    }

    fn from_slice(bytes: &[u8]) -> Result<Self, HashError> {
        if bytes.is_empty() || bytes.len() > VBK_HASH_SIZE {
            return Err(HashError::InvalidLength {
                expected: VBK_HASH_SIZE,
                found: bytes.len(),
            });
        }
        let mut buf = [0u8; VBK_HASH_SIZE];
        buf[..bytes.len()].copy_from_slice(bytes);
        Ok(VbkHash {
            buf,
            len: bytes.len() as u8,
        })
    }
}

impl fmt::Debug for VbkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VbkHash({})", self.to_hex())
    }
}

impl fmt::Display for VbkHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Double SHA-256 of arbitrary bytes
pub fn sha256d(data: &[u8]) -> Sha256dHash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; SHA256D_HASH_SIZE];
    out.copy_from_slice(&second);
    Sha256dHash(out)
}

/// BLAKE3 of arbitrary bytes truncated to a partial-hash chain block hash
pub fn vbk_hash(data: &[u8]) -> VbkHash {
    let digest = blake3::hash(data);
    let mut buf = [0u8; VBK_HASH_SIZE];
    buf.copy_from_slice(&digest.as_bytes()[..VBK_HASH_SIZE]);
    VbkHash {
        buf,
        len: VBK_HASH_SIZE as u8,
    }
}
