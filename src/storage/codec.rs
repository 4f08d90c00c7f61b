//! Stored header records
//!
//! A record is `hash | height? | work | raw header`, all fixed width and
//! without length prefixes, so slot `i` of a ring file starts at
//! `PROLOGUE_SIZE + i * RECORD_SIZE`.

use crate::constants::WORK_SIZE;
use crate::crypto::ChainHash;
use crate::storage::{ChainFlavor, CodecError};
use primitive_types::U256;

/// A validated header together with its position and cumulative work
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredHeader<C: ChainFlavor> {
    pub hash: C::Hash,
    pub height: u32,
    pub work: U256,
    pub header: C::Header,
}

impl<C: ChainFlavor> StoredHeader<C> {
    /// Wrap a header, computing its hash
    pub fn new(header: C::Header, height: u32, work: U256) -> Self {
        Self {
            hash: C::hash_header(&header),
            height,
            work,
            header,
        }
    }

    /// Raw header bytes as stored on disk
    pub fn raw_header(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(C::HEADER_SIZE);
        C::encode_header(&self.header, &mut out);
        out
    }

    /// Previous-block reference declared by the header
    pub fn previous_block(&self) -> C::Hash {
        C::previous_block(&self.header)
    }

    /// Append the fixed-width record
    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), CodecError> {
        let start = out.len();
        out.extend_from_slice(self.hash.as_slice());
        if C::HEIGHT_SIZE > 0 {
            out.extend_from_slice(&self.height.to_be_bytes());
        }
        out.extend_from_slice(&encode_work(self.work)?);
        C::encode_header(&self.header, out);
        debug_assert_eq!(out.len() - start, C::RECORD_SIZE);
        Ok(())
    }

    /// Serialize into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        let mut out = Vec::with_capacity(C::RECORD_SIZE);
        self.serialize(&mut out)?;
        Ok(out)
    }

    /// Read one record, advancing `input` past it
    pub fn deserialize(input: &mut &[u8]) -> Result<Self, CodecError> {
        if input.len() < C::RECORD_SIZE {
            return Err(CodecError::Truncated {
                needed: C::RECORD_SIZE,
                available: input.len(),
            });
        }
        let (record, rest) = input.split_at(C::RECORD_SIZE);
        *input = rest;

        let (hash_bytes, record) = record.split_at(C::HASH_SIZE);
        let (height_bytes, record) = record.split_at(C::HEIGHT_SIZE);
        let (work_bytes, raw) = record.split_at(WORK_SIZE);

        let hash = C::Hash::from_slice(hash_bytes)?;
        let header = C::decode_header(raw)?;
        let height = if C::HEIGHT_SIZE > 0 {
            u32::from_be_bytes([height_bytes[0], height_bytes[1], height_bytes[2], height_bytes[3]])
        } else {
            C::header_height(&header).unwrap_or(0)
        };

        Ok(Self {
            hash,
            height,
            work: U256::from_big_endian(work_bytes),
            header,
        })
    }
}

/// Big-endian fixed-width cumulative work
fn encode_work(work: U256) -> Result<[u8; WORK_SIZE], CodecError> {
    let mut full = [0u8; 32];
    work.to_big_endian(&mut full);
    let (high, low) = full.split_at(32 - WORK_SIZE);
    if high.iter().any(|b| *b != 0) {
        return Err(CodecError::WorkOverflow { width: WORK_SIZE });
    }
    let mut out = [0u8; WORK_SIZE];
    out.copy_from_slice(low);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consensus::{BtcHeader, VbkHeader};
    use crate::crypto::{sha256d, vbk_hash, Sha256dHash};
    use crate::storage::{BtcChain, VbkChain};

    fn btc_record() -> StoredHeader<BtcChain> {
        let header = BtcHeader::new(2, sha256d(b"prev"), sha256d(b"root"), 1_600_000_000, 0x1d00ffff, 7);
        StoredHeader::new(header, 700_000, U256::from(123_456_789u64))
    }

    #[test]
    fn test_btc_record_layout() {
        let record = btc_record();
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), BtcChain::RECORD_SIZE);
        assert_eq!(bytes.len(), 32 + 4 + 12 + 80);
        assert_eq!(&bytes[0..32], record.hash.as_slice());
        assert_eq!(&bytes[32..36], &700_000u32.to_be_bytes());
        assert_eq!(&bytes[44..48], &123_456_789u32.to_be_bytes());
    }

    #[test]
    fn test_btc_record_roundtrip() {
        let record = btc_record();
        let bytes = record.to_bytes().unwrap();
        let mut input = bytes.as_slice();
        let decoded = StoredHeader::<BtcChain>::deserialize(&mut input).unwrap();
        assert_eq!(decoded, record);
        assert!(input.is_empty());
        assert_eq!(decoded.raw_header(), record.header.to_bytes().to_vec());
    }

    #[test]
    fn test_vbk_record_omits_height() {
        let header = VbkHeader::new(
            55,
            2,
            vbk_hash(b"p"),
            vbk_hash(b"k1"),
            vbk_hash(b"k2"),
            [1u8; 16],
            1_600_000_000,
            0x01010000,
            3,
        );
        let record = StoredHeader::<VbkChain>::new(header, 55, U256::from(56u64));
        let bytes = record.to_bytes().unwrap();
        assert_eq!(bytes.len(), 24 + 12 + 64);

        let mut input = bytes.as_slice();
        let decoded = StoredHeader::<VbkChain>::deserialize(&mut input).unwrap();
        assert_eq!(decoded.height, 55);
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_deserialize_advances_buffer() {
        let first = btc_record();
        let mut second = btc_record();
        second.height += 1;

        let mut buf = Vec::new();
        first.serialize(&mut buf).unwrap();
        second.serialize(&mut buf).unwrap();

        let mut input = buf.as_slice();
        assert_eq!(StoredHeader::<BtcChain>::deserialize(&mut input).unwrap(), first);
        assert_eq!(StoredHeader::<BtcChain>::deserialize(&mut input).unwrap(), second);
        assert!(input.is_empty());
    }

    #[test]
    fn test_truncated_record_is_error() {
        let bytes = btc_record().to_bytes().unwrap();
        let mut input = &bytes[..bytes.len() - 1];
        assert!(matches!(
            StoredHeader::<BtcChain>::deserialize(&mut input),
            Err(CodecError::Truncated { needed: 128, available: 127 })
        ));
    }

    #[test]
    fn test_work_overflow_rejected() {
        let mut record = btc_record();
        record.work = U256::one() << 96;
        assert!(matches!(record.to_bytes(), Err(CodecError::WorkOverflow { .. })));

        record.work = (U256::one() << 96) - 1;
        assert!(record.to_bytes().is_ok());
    }

    #[test]
    fn test_zero_hash_record_decodes() {
        // Empty ring slots are all zero; they still decode, callers skip them by hash.
        let bytes = vec![0u8; BtcChain::RECORD_SIZE];
        let mut input = bytes.as_slice();
        let decoded = StoredHeader::<BtcChain>::deserialize(&mut input).unwrap();
        assert_eq!(decoded.hash, Sha256dHash::zero());
    }
}
