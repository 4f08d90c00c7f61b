//! Property-based tests for record encoding, compact difficulty and hashes
//!
//! These tests verify invariants hold under random inputs.

use proptest::prelude::*;
use hdrchain::consensus::{decode_compact, encode_compact, BtcHeader, VbkHeader};
use hdrchain::crypto::{vbk_hash, ChainHash, Sha256dHash, VbkHash};
use hdrchain::storage::{BtcChain, StoredHeader, VbkChain};
use primitive_types::U256;

fn work_strategy() -> impl Strategy<Value = U256> {
    // 12-byte big-endian field
    (any::<u32>(), any::<u64>()).prop_map(|(high, low)| (U256::from(high) << 64) | U256::from(low))
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

proptest! {
    /// Full-hash records decode to exactly what was encoded
    #[test]
    fn prop_btc_record_roundtrip(
        version in any::<i32>(),
        previous in any::<[u8; 32]>(),
        merkle in any::<[u8; 32]>(),
        timestamp in any::<u32>(),
        bits in any::<u32>(),
        nonce in any::<u32>(),
        height in any::<u32>(),
        work in work_strategy(),
    ) {
        let header = BtcHeader::new(version, Sha256dHash(previous), Sha256dHash(merkle), timestamp, bits, nonce);
        let record = StoredHeader::<BtcChain>::new(header, height, work);
        let bytes = record.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), 128);

        let mut input = bytes.as_slice();
        let decoded = StoredHeader::<BtcChain>::deserialize(&mut input).unwrap();
        prop_assert_eq!(decoded.raw_header(), header.to_bytes().to_vec());
        prop_assert_eq!(decoded, record);
    }

    /// Partial-hash records recover their height from the header
    #[test]
    fn prop_vbk_record_roundtrip(
        height in any::<u32>(),
        version in any::<u16>(),
        seed in any::<[u8; 8]>(),
        merkle in any::<[u8; 16]>(),
        timestamp in any::<u32>(),
        difficulty in any::<u32>(),
        nonce in any::<u32>(),
        work in work_strategy(),
    ) {
        let header = VbkHeader::new(
            height,
            version,
            vbk_hash(&seed),
            vbk_hash(&[seed[0]]),
            vbk_hash(&[seed[1], seed[2]]),
            merkle,
            timestamp,
            difficulty,
            nonce,
        );
        let record = StoredHeader::<VbkChain>::new(header, height, work);
        let bytes = record.to_bytes().unwrap();
        prop_assert_eq!(bytes.len(), 100);

        let mut input = bytes.as_slice();
        let decoded = StoredHeader::<VbkChain>::deserialize(&mut input).unwrap();
        prop_assert_eq!(decoded.height, height);
        prop_assert_eq!(decoded, record);
    }

    /// Re-encoding a decoded compact value is stable
    #[test]
    fn prop_compact_encode_stable(bits in any::<u32>()) {
        if let Ok(value) = decode_compact(bits) {
            let canonical = encode_compact(value);
            prop_assert_eq!(decode_compact(canonical).unwrap(), value);
            prop_assert_eq!(encode_compact(decode_compact(canonical).unwrap()), canonical);
        }
    }

    /// Compact encoding truncates, keeping at least the top 16 bits
    #[test]
    fn prop_compact_precision(value in any::<u128>()) {
        let value = U256::from(value);
        let decoded = decode_compact(encode_compact(value)).unwrap();
        prop_assert!(decoded <= value);
        if !value.is_zero() {
            let shift = value.bits().saturating_sub(16);
            prop_assert_eq!(decoded >> shift, value >> shift);
        }
    }

    /// Every truncation of a hash matches the hash, in both directions
    #[test]
    fn prop_truncations_match(data in proptest::collection::vec(any::<u8>(), 0..64), len in 1usize..=24) {
        let full = vbk_hash(&data);
        let short = full.trim(len);
        prop_assert!(short.matches(&full));
        prop_assert!(full.matches(&short));
        prop_assert!(short.matches_bytes(full.as_slice()));
    }

    /// Hashes of distinct inputs do not match at reference width
    #[test]
    fn prop_distinct_hashes_differ(a in any::<[u8; 16]>(), b in any::<[u8; 16]>()) {
        prop_assume!(a != b);
        let (a, b) = (vbk_hash(&a), vbk_hash(&b));
        prop_assert!(!a.trim_to_previous_block().matches(&b));
    }
}

// ============================================================================
// ADVERSARIAL TESTS
// ============================================================================

#[test]
fn test_truncated_record_never_decodes() {
    let header = BtcHeader::new(1, Sha256dHash::zero(), Sha256dHash::zero(), 0, 0x1d00ffff, 0);
    let bytes = StoredHeader::<BtcChain>::new(header, 0, U256::one()).to_bytes().unwrap();
    for len in 0..bytes.len() {
        let mut input = &bytes[..len];
        assert!(StoredHeader::<BtcChain>::deserialize(&mut input).is_err(), "len {}", len);
    }
}

#[test]
fn test_oversized_partial_hash_refused() {
    assert!(VbkHash::from_slice(&[7u8; 25]).is_err());
    assert!(VbkHash::from_slice(&[7u8; 12]).is_ok());
}
