//! Cryptography module - block hash types and hash functions

mod hash;

pub use hash::*;
