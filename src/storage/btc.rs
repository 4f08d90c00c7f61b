//! Full-hash chain flavor
//!
//! Records are keyed and linked by complete 32-byte double-SHA256 hashes.

use crate::consensus::{
    decode_compact_nonzero, work_from_bits, BtcHeader, NetworkParameters, Rejection,
    BTC_HEADER_SIZE,
};
use crate::crypto::{Sha256dHash, SHA256D_HASH_SIZE};
use crate::storage::{ChainFlavor, CodecError, RingFileStore, StoredHeader};
use primitive_types::U256;

/// Full-hash chain marker type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BtcChain;

/// Ring store of full-hash chain headers
pub type BtcBlockStore = RingFileStore<BtcChain>;

/// Stored full-hash chain header
pub type StoredBtcHeader = StoredHeader<BtcChain>;

impl ChainFlavor for BtcChain {
    type Hash = Sha256dHash;
    type Header = BtcHeader;

    const NAME: &'static str = "btc";
    const MAGIC: [u8; 4] = *b"BTCS";
    const HASH_SIZE: usize = SHA256D_HASH_SIZE;
    const PREVIOUS_BLOCK_SIZE: usize = SHA256D_HASH_SIZE;
    const PREVIOUS_BLOCK_OFFSET: usize = 4;
    const HEADER_SIZE: usize = BTC_HEADER_SIZE;
    const HEIGHT_SIZE: usize = 4;
    const KEYSTONE_INTERVAL: Option<u32> = None;

    fn encode_header(header: &BtcHeader, out: &mut Vec<u8>) {
        out.extend_from_slice(&header.to_bytes());
    }

    fn decode_header(raw: &[u8]) -> Result<BtcHeader, CodecError> {
        BtcHeader::from_bytes(raw)
    }

    fn hash_header(header: &BtcHeader) -> Sha256dHash {
        header.hash()
    }

    fn previous_block(header: &BtcHeader) -> Sha256dHash {
        header.previous_block
    }

    fn header_height(_header: &BtcHeader) -> Option<u32> {
        None
    }

    fn timestamp(header: &BtcHeader) -> u32 {
        header.timestamp
    }

    fn bits(header: &BtcHeader) -> u32 {
        header.bits
    }

    fn work(header: &BtcHeader) -> U256 {
        work_from_bits(header.bits)
    }

    /// The hash, read as a little-endian integer, must not exceed the target
    fn check_proof_of_work(header: &BtcHeader, params: &NetworkParameters) -> Result<(), Rejection> {
        let target = decode_compact_nonzero(header.bits)
            .map_err(|e| Rejection::Malformed(e.to_string()))?;
        let limit = decode_compact_nonzero(params.pow_limit)
            .map_err(|e| Rejection::Malformed(format!("network pow limit: {}", e)))?;
        if target > limit {
            return Err(Rejection::Malformed(format!(
                "target {:#010x} is easier than the network limit {:#010x}",
                header.bits, params.pow_limit
            )));
        }

        let hash = header.hash();
        if U256::from_little_endian(&hash.0) > target {
            return Err(Rejection::InsufficientProofOfWork {
                hash: hash.to_hex(),
            });
        }
        Ok(())
    }
}
