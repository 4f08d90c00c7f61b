//! Chain flavors: what a ring store needs to know about one chain
//!
//! A flavor fixes the hash widths, the stored record layout and where the
//! previous-block reference sits inside a raw header. The generic ring store
//! and the validator are written once against this trait.

use crate::constants::WORK_SIZE;
use crate::consensus::{NetworkParameters, Rejection};
use crate::crypto::ChainHash;
use crate::storage::CodecError;
use primitive_types::U256;
use std::fmt;

pub trait ChainFlavor: Clone + fmt::Debug + PartialEq + Eq + Send + Sync + 'static {
    /// Block identifier type
    type Hash: ChainHash;
    /// Parsed header type
    type Header: Clone + fmt::Debug + PartialEq + Eq + Send + Sync + 'static;

    /// Human readable chain name
    const NAME: &'static str;
    /// ASCII tag at the start of the store file
    const MAGIC: [u8; 4];
    /// Length of the full identifying hash
    const HASH_SIZE: usize;
    /// Length of the previous-block reference inside a header
    const PREVIOUS_BLOCK_SIZE: usize;
    /// Offset of the previous-block reference inside a raw header
    const PREVIOUS_BLOCK_OFFSET: usize;
    /// Length of a raw header
    const HEADER_SIZE: usize;
    /// 4 when records store the height, 0 when it is read from the header
    const HEIGHT_SIZE: usize;
    /// Default keystone spacing, `None` for chains without keystone
    /// references. Validators take the spacing from their parameters.
    const KEYSTONE_INTERVAL: Option<u32>;

    /// Length of the head hash kept in the file prologue
    const HEAD_HASH_SIZE: usize = Self::PREVIOUS_BLOCK_SIZE;
    /// Length of one stored record
    const RECORD_SIZE: usize = Self::HASH_SIZE + Self::HEIGHT_SIZE + WORK_SIZE + Self::HEADER_SIZE;

    /// Append the raw header bytes
    fn encode_header(header: &Self::Header, out: &mut Vec<u8>);

    /// Parse raw header bytes
    fn decode_header(raw: &[u8]) -> Result<Self::Header, CodecError>;

    /// Full identifying hash of a header
    fn hash_header(header: &Self::Header) -> Self::Hash;

    /// Previous-block reference as declared by the header
    fn previous_block(header: &Self::Header) -> Self::Hash;

    /// Height carried by the header itself, if the chain has one
    fn header_height(header: &Self::Header) -> Option<u32>;

    /// Block timestamp
    fn timestamp(header: &Self::Header) -> u32;

    /// Compact difficulty bits
    fn bits(header: &Self::Header) -> u32;

    /// Declared previous and second-previous keystone references
    fn keystones(_header: &Self::Header) -> Option<(Self::Hash, Self::Hash)> {
        None
    }

    /// Trim a full hash to the width used for keystone comparisons
    fn keystone_reference(hash: &Self::Hash) -> Self::Hash {
        hash.clone()
    }

    /// Work contributed by this header alone
    fn work(header: &Self::Header) -> U256;

    /// Context-free proof-of-work check
    fn check_proof_of_work(header: &Self::Header, params: &NetworkParameters)
        -> Result<(), Rejection>;
}
