//! Shared header builders for integration tests

#![allow(dead_code)]

use hdrchain::config::StoreConfig;
use hdrchain::consensus::{BtcHeader, NetworkParameters, VbkHeader};
use hdrchain::crypto::{sha256d, Sha256dHash, VbkHash};
use hdrchain::storage::{BtcChain, ChainFlavor, RingFileStore, VbkChain};
use std::path::Path;
use std::sync::Arc;

/// Easiest full-hash chain bits: work 1 per block
pub const EASY_BITS: u32 = 0x2100ffff;

/// Minimum partial-hash chain difficulty: work 1 per block
pub const VBK_MIN_DIFFICULTY: u32 = 0x01010000;

pub const BASE_TIME: u32 = 1_600_000_000;

pub fn store_config(capacity: usize) -> StoreConfig {
    StoreConfig {
        capacity,
        ..StoreConfig::default()
    }
}

pub fn open_btc(dir: &Path, capacity: usize) -> Arc<RingFileStore<BtcChain>> {
    Arc::new(RingFileStore::open(dir.join("btc.dat"), &store_config(capacity)).unwrap())
}

pub fn open_vbk(dir: &Path, capacity: usize) -> Arc<RingFileStore<VbkChain>> {
    Arc::new(RingFileStore::open(dir.join("vbk.dat"), &store_config(capacity)).unwrap())
}

/// Search nonces until the header meets its own target
pub fn mine_btc(previous: Sha256dHash, timestamp: u32, bits: u32, tag: u32) -> BtcHeader {
    let params = NetworkParameters::btc_unit_test();
    let merkle_root = sha256d(&tag.to_le_bytes());
    let mut header = BtcHeader::new(1, previous, merkle_root, timestamp, bits, 0);
    while BtcChain::check_proof_of_work(&header, &params).is_err() {
        header.nonce += 1;
    }
    header
}

/// `len` connected easy headers starting at genesis, `spacing` seconds apart
pub fn btc_headers(len: usize, spacing: u32) -> Vec<BtcHeader> {
    btc_headers_from(Sha256dHash::zero(), BASE_TIME, len, spacing, 0)
}

/// Connected easy headers following `previous`; `tag` keeps forks distinct
pub fn btc_headers_from(
    previous: Sha256dHash,
    start_time: u32,
    len: usize,
    spacing: u32,
    tag: u32,
) -> Vec<BtcHeader> {
    let mut out = Vec::with_capacity(len);
    let mut previous = previous;
    for i in 0..len as u32 {
        let header = mine_btc(previous, start_time + i * spacing, EASY_BITS, tag.wrapping_mul(1_000_003) + i);
        previous = header.hash();
        out.push(header);
    }
    out
}

/// Partial-hash header at `height` with explicit references
pub fn vbk_header(
    height: u32,
    previous: VbkHash,
    keystone: VbkHash,
    second_keystone: VbkHash,
    timestamp: u32,
) -> VbkHeader {
    VbkHeader::new(
        height,
        2,
        previous,
        keystone,
        second_keystone,
        [height as u8; 16],
        timestamp,
        VBK_MIN_DIFFICULTY,
        height,
    )
}

/// Connected partial-hash headers for `heights`; keystones are left zero
pub fn vbk_headers(heights: std::ops::RangeInclusive<u32>) -> Vec<VbkHeader> {
    let mut out: Vec<VbkHeader> = Vec::new();
    let mut previous = VbkHash::zero(12);
    for height in heights {
        let header = vbk_header(
            height,
            previous,
            VbkHash::zero(9),
            VbkHash::zero(9),
            BASE_TIME + height * 30,
        );
        previous = VbkChain::hash_header(&header);
        out.push(header);
    }
    out
}
