//! Partial-hash chain flavor
//!
//! Blocks are identified by a full 24-byte hash, but headers only carry the
//! trailing 12 bytes of their parent's hash and 9 bytes of each keystone's.
//! The prologue keeps the head hash at the previous-block width, so every
//! lookup through this store is a partial-hash match.

use crate::consensus::{decode_compact, NetworkParameters, Rejection, VbkHeader, VBK_HEADER_SIZE};
use crate::constants::KEYSTONE_INTERVAL;
use crate::crypto::{ChainHash, VbkHash, VBK_HASH_SIZE, VBK_PREVIOUS_BLOCK_SIZE};
use crate::storage::{ChainFlavor, CodecError, RingFileStore, StoredHeader};
use primitive_types::U256;

/// Partial-hash chain marker type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VbkChain;

/// Ring store of partial-hash chain headers
pub type VbkBlockStore = RingFileStore<VbkChain>;

/// Stored partial-hash chain header
pub type StoredVbkHeader = StoredHeader<VbkChain>;

impl ChainFlavor for VbkChain {
    type Hash = VbkHash;
    type Header = VbkHeader;

    const NAME: &'static str = "vbk";
    const MAGIC: [u8; 4] = *b"VBKS";
    const HASH_SIZE: usize = VBK_HASH_SIZE;
    const PREVIOUS_BLOCK_SIZE: usize = VBK_PREVIOUS_BLOCK_SIZE;
    const PREVIOUS_BLOCK_OFFSET: usize = 6;
    const HEADER_SIZE: usize = VBK_HEADER_SIZE;
    const HEIGHT_SIZE: usize = 0;
    const KEYSTONE_INTERVAL: Option<u32> = Some(KEYSTONE_INTERVAL);

    fn encode_header(header: &VbkHeader, out: &mut Vec<u8>) {
        out.extend_from_slice(&header.to_bytes());
    }

    fn decode_header(raw: &[u8]) -> Result<VbkHeader, CodecError> {
        VbkHeader::from_bytes(raw)
    }

    fn hash_header(header: &VbkHeader) -> VbkHash {
        header.hash()
    }

    fn previous_block(header: &VbkHeader) -> VbkHash {
        header.previous_block
    }

    fn header_height(header: &VbkHeader) -> Option<u32> {
        Some(header.height)
    }

    fn timestamp(header: &VbkHeader) -> u32 {
        header.timestamp
    }

    fn bits(header: &VbkHeader) -> u32 {
        header.difficulty
    }

    fn keystones(header: &VbkHeader) -> Option<(VbkHash, VbkHash)> {
        Some((header.previous_keystone, header.second_previous_keystone))
    }

    fn keystone_reference(hash: &VbkHash) -> VbkHash {
        hash.trim_to_previous_keystone()
    }

    /// The difficulty field is the work
    fn work(header: &VbkHeader) -> U256 {
        decode_compact(header.difficulty).unwrap_or_default()
    }

    /// The hash, read as a big-endian 192-bit integer, must not exceed
    /// `2^192 / difficulty`
    fn check_proof_of_work(header: &VbkHeader, params: &NetworkParameters) -> Result<(), Rejection> {
        let difficulty = decode_compact(header.difficulty)
            .map_err(|e| Rejection::Malformed(e.to_string()))?;
        let minimum = decode_compact(params.pow_limit)
            .map_err(|e| Rejection::Malformed(format!("network minimum difficulty: {}", e)))?;
        if difficulty.is_zero() || difficulty < minimum {
            return Err(Rejection::Malformed(format!(
                "difficulty {:#010x} is below the network minimum {:#010x}",
                header.difficulty, params.pow_limit
            )));
        }

        let hash = header.hash();
        let target = (U256::one() << (8 * VBK_HASH_SIZE)) / difficulty;
        if U256::from_big_endian(hash.as_slice()) > target {
            return Err(Rejection::InsufficientProofOfWork {
                hash: hash.to_hex(),
            });
        }
        Ok(())
    }
}
