//! Block header structures for both chains
//!
//! Both headers have a fixed serialized width so that stored records can be
//! addressed by slot index.

use crate::crypto::{
    sha256d, vbk_hash, ChainHash, Sha256dHash, VbkHash, VBK_PREVIOUS_BLOCK_SIZE,
    VBK_PREVIOUS_KEYSTONE_SIZE,
};
use crate::storage::CodecError;
use serde::{Deserialize, Serialize};

/// Serialized size of a full-hash chain header
pub const BTC_HEADER_SIZE: usize = 80;

/// Serialized size of a partial-hash chain header
pub const VBK_HEADER_SIZE: usize = 64;

/// Size of the partial-hash chain merkle root
pub const VBK_MERKLE_ROOT_SIZE: usize = 16;

/// Full-hash chain header (80 bytes, little-endian)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct BtcHeader {
    /// Protocol version
    pub version: i32,
    /// Hash of the previous block
    pub previous_block: Sha256dHash,
    /// Merkle root of all transactions
    pub merkle_root: Sha256dHash,
    /// Block timestamp (seconds since Unix epoch)
    pub timestamp: u32,
    /// Difficulty target (compact representation)
    pub bits: u32,
    /// Nonce used for PoW
    pub nonce: u32,
}

impl BtcHeader {
    /// Create a new block header
    pub fn new(
        version: i32,
        previous_block: Sha256dHash,
        merkle_root: Sha256dHash,
        timestamp: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        Self {
            version,
            previous_block,
            merkle_root,
            timestamp,
            bits,
            nonce,
        }
    }

    /// Serialize the header for hashing and storage
    pub fn to_bytes(&self) -> [u8; BTC_HEADER_SIZE] {
        let mut bytes = [0u8; BTC_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.version.to_le_bytes());
        bytes[4..36].copy_from_slice(&self.previous_block.0);
        bytes[36..68].copy_from_slice(&self.merkle_root.0);
        bytes[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Parse a serialized header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != BTC_HEADER_SIZE {
            return Err(CodecError::HeaderLength {
                expected: BTC_HEADER_SIZE,
                found: bytes.len(),
            });
        }
        Ok(Self {
            version: i32::from_le_bytes(array4(&bytes[0..4])),
            previous_block: Sha256dHash::from_slice(&bytes[4..36])?,
            merkle_root: Sha256dHash::from_slice(&bytes[36..68])?,
            timestamp: u32::from_le_bytes(array4(&bytes[68..72])),
            bits: u32::from_le_bytes(array4(&bytes[72..76])),
            nonce: u32::from_le_bytes(array4(&bytes[76..80])),
        })
    }

    /// Calculate the hash of this header
    pub fn hash(&self) -> Sha256dHash {
        sha256d(&self.to_bytes())
    }
}

/// Partial-hash chain header (64 bytes, big-endian).
///
/// Ancestors are referenced by truncated hashes: 12 bytes for the previous
/// block, 9 bytes for each keystone.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct VbkHeader {
    pub height: u32,
    pub version: u16,
    pub previous_block: VbkHash,
    pub previous_keystone: VbkHash,
    pub second_previous_keystone: VbkHash,
    pub merkle_root: [u8; VBK_MERKLE_ROOT_SIZE],
    pub timestamp: u32,
    /// Difficulty (compact representation)
    pub difficulty: u32,
    pub nonce: u32,
}

impl VbkHeader {
    /// Create a new header, truncating references to their on-wire widths
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        height: u32,
        version: u16,
        previous_block: VbkHash,
        previous_keystone: VbkHash,
        second_previous_keystone: VbkHash,
        merkle_root: [u8; VBK_MERKLE_ROOT_SIZE],
        timestamp: u32,
        difficulty: u32,
        nonce: u32,
    ) -> Self {
        Self {
            height,
            version,
            previous_block: previous_block.trim_to_previous_block(),
            previous_keystone: previous_keystone.trim_to_previous_keystone(),
            second_previous_keystone: second_previous_keystone.trim_to_previous_keystone(),
            merkle_root,
            timestamp,
            difficulty,
            nonce,
        }
    }

    /// Serialize the header for hashing and storage
    pub fn to_bytes(&self) -> [u8; VBK_HEADER_SIZE] {
        let mut bytes = [0u8; VBK_HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.height.to_be_bytes());
        bytes[4..6].copy_from_slice(&self.version.to_be_bytes());
        write_reference(&mut bytes[6..18], &self.previous_block);
        write_reference(&mut bytes[18..27], &self.previous_keystone);
        write_reference(&mut bytes[27..36], &self.second_previous_keystone);
        bytes[36..52].copy_from_slice(&self.merkle_root);
        bytes[52..56].copy_from_slice(&self.timestamp.to_be_bytes());
        bytes[56..60].copy_from_slice(&self.difficulty.to_be_bytes());
        bytes[60..64].copy_from_slice(&self.nonce.to_be_bytes());
        bytes
    }

    /// Parse a serialized header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        if bytes.len() != VBK_HEADER_SIZE {
            return Err(CodecError::HeaderLength {
                expected: VBK_HEADER_SIZE,
                found: bytes.len(),
            });
        }
        let mut merkle_root = [0u8; VBK_MERKLE_ROOT_SIZE];
        merkle_root.copy_from_slice(&bytes[36..52]);
        Ok(Self {
            height: u32::from_be_bytes(array4(&bytes[0..4])),
            version: u16::from_be_bytes([bytes[4], bytes[5]]),
            previous_block: VbkHash::from_slice(&bytes[6..6 + VBK_PREVIOUS_BLOCK_SIZE])?,
            previous_keystone: VbkHash::from_slice(&bytes[18..18 + VBK_PREVIOUS_KEYSTONE_SIZE])?,
            second_previous_keystone: VbkHash::from_slice(
                &bytes[27..27 + VBK_PREVIOUS_KEYSTONE_SIZE],
            )?,
            merkle_root,
            timestamp: u32::from_be_bytes(array4(&bytes[52..56])),
            difficulty: u32::from_be_bytes(array4(&bytes[56..60])),
            nonce: u32::from_be_bytes(array4(&bytes[60..64])),
        })
    }

    /// Calculate the full 24-byte hash of this header
    pub fn hash(&self) -> VbkHash {
        vbk_hash(&self.to_bytes())
    }
}

/// Right-align a reference in its fixed-width field
fn write_reference(field: &mut [u8], hash: &VbkHash) {
    let bytes = hash.as_slice();
    let len = bytes.len().min(field.len());
    let start = field.len() - len;
    field[start..].copy_from_slice(&bytes[bytes.len() - len..]);
}

fn array4(bytes: &[u8]) -> [u8; 4] {
    let mut out = [0u8; 4];
    out.copy_from_slice(bytes);
    out
}
