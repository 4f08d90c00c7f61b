//! Compact difficulty encoding and difficulty adjustment
//!
//! Compact bits store a 256-bit value as one exponent byte and a 3-byte
//! mantissa. The full-hash chain encodes a target, the partial-hash chain
//! encodes the difficulty itself.

use crate::consensus::NetworkParameters;
use crate::storage::{ChainFlavor, StoredHeader};
use primitive_types::{U256, U512};
use thiserror::Error;

/// Compact encoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompactError {
    #[error("compact value {0:#010x} is negative")]
    Negative(u32),
    #[error("compact value {0:#010x} overflows 256 bits")]
    Overflow(u32),
    #[error("compact value {0:#010x} is zero")]
    Zero(u32),
}

/// Decode compact bits into a 256-bit value
pub fn decode_compact(bits: u32) -> Result<U256, CompactError> {
    let size = bits >> 24;
    let word = bits & 0x007f_ffff;

    if word != 0 && bits & 0x0080_0000 != 0 {
        return Err(CompactError::Negative(bits));
    }
    if word != 0 && (size > 34 || (word > 0xff && size > 33) || (word > 0xffff && size > 32)) {
        return Err(CompactError::Overflow(bits));
    }

    let value = if size <= 3 {
        U256::from(word >> (8 * (3 - size)))
    } else {
        U256::from(word) << (8 * (size - 3) as usize)
    };
    Ok(value)
}

/// Decode compact bits, additionally rejecting zero
pub fn decode_compact_nonzero(bits: u32) -> Result<U256, CompactError> {
    let value = decode_compact(bits)?;
    if value.is_zero() {
        return Err(CompactError::Zero(bits));
    }
    Ok(value)
}

/// Encode a 256-bit value into compact bits
pub fn encode_compact(value: U256) -> u32 {
    let mut size = ((value.bits() + 7) / 8) as u32;
    let mut compact = if size <= 3 {
        (value.low_u64() << (8 * (3 - size))) as u32
    } else {
        (value >> (8 * (size - 3) as usize)).low_u64() as u32
    };

    // The sign bit must stay clear; shift into the exponent instead.
    if compact & 0x0080_0000 != 0 {
        compact >>= 8;
        size += 1;
    }
    compact | (size << 24)
}

/// Work represented by a full-hash chain target: `2^256 / (target + 1)`.
///
/// `2^256` does not fit in 256 bits, so this uses `(!target / (target + 1)) + 1`.
pub fn work_from_target(target: U256) -> U256 {
    if target == U256::MAX {
        return U256::one();
    }
    (!target / (target + U256::one())) + U256::one()
}

/// Work represented by full-hash chain compact bits (zero for invalid bits)
pub fn work_from_bits(bits: u32) -> U256 {
    match decode_compact_nonzero(bits) {
        Ok(target) => work_from_target(target),
        Err(_) => U256::zero(),
    }
}

/// Computes the compact bits a new block must carry
pub trait DifficultyCalculator<C: ChainFlavor>: Send + Sync {
    /// Number of ancestors (newest first, starting with the previous block)
    /// required before the calculation applies
    fn window(&self) -> usize;

    /// Expected bits for a block at `height` given its ancestors, newest first
    fn expected_bits(&self, height: u32, ancestors: &[StoredHeader<C>]) -> u32;
}

/// Periodic retarget: bits change only every `interval` blocks.
///
/// At a boundary the elapsed time of the last period, clamped to 4x in
/// either direction, scales the previous target.
#[derive(Debug, Clone)]
pub struct BitcoinRetarget {
    interval: u32,
    target_timespan: u64,
    pow_limit: U256,
}

/// Maximum adjustment factor (4x in either direction per period)
const MAX_ADJUSTMENT_FACTOR: u64 = 4;

impl BitcoinRetarget {
    pub fn new(params: &NetworkParameters) -> Self {
        let interval = params.retarget_interval.max(1);
        Self {
            interval,
            target_timespan: params.target_spacing * interval as u64,
            pow_limit: decode_compact(params.pow_limit).unwrap_or(U256::MAX),
        }
    }

    /// Check if difficulty should be adjusted at this height
    pub fn is_adjustment_height(&self, height: u32) -> bool {
        height > 0 && height % self.interval == 0
    }

    /// Retarget from the previous bits over an elapsed period
    pub fn retarget(&self, previous_bits: u32, actual_timespan: u64) -> u32 {
        let actual = actual_timespan
            .max(self.target_timespan / MAX_ADJUSTMENT_FACTOR)
            .min(self.target_timespan * MAX_ADJUSTMENT_FACTOR);

        let previous = match decode_compact(previous_bits) {
            Ok(target) => target,
            Err(_) => return encode_compact(self.pow_limit),
        };

        let scaled = U512::from(previous) * U512::from(actual)
            / U512::from(self.target_timespan.max(1));
        let new_target = U256::try_from(scaled)
            .unwrap_or(U256::MAX)
            .min(self.pow_limit);
        encode_compact(new_target)
    }
}

impl<C: ChainFlavor> DifficultyCalculator<C> for BitcoinRetarget {
    fn window(&self) -> usize {
        self.interval as usize
    }

    fn expected_bits(&self, height: u32, ancestors: &[StoredHeader<C>]) -> u32 {
        let previous = match ancestors.first() {
            Some(p) => p,
            None => return encode_compact(self.pow_limit),
        };
        let previous_bits = C::bits(&previous.header);

        if !self.is_adjustment_height(height) {
            return previous_bits;
        }

        let first = match ancestors.get(self.interval as usize - 1) {
            Some(f) => f,
            None => return previous_bits,
        };
        let actual = (C::timestamp(&previous.header) as u64)
            .saturating_sub(C::timestamp(&first.header) as u64);
        self.retarget(previous_bits, actual)
    }
}

/// Moving-window difficulty: the mean difficulty of the last `window`
/// blocks scaled by how far their actual span strayed from the target span.
#[derive(Debug, Clone)]
pub struct AveragingWindow {
    window: usize,
    target_spacing: u64,
}

impl AveragingWindow {
    pub fn new(params: &NetworkParameters) -> Self {
        Self {
            window: (params.retarget_interval as usize).max(2),
            target_spacing: params.target_spacing.max(1),
        }
    }
}

impl<C: ChainFlavor> DifficultyCalculator<C> for AveragingWindow {
    fn window(&self) -> usize {
        self.window
    }

    fn expected_bits(&self, _height: u32, ancestors: &[StoredHeader<C>]) -> u32 {
        let window = &ancestors[..self.window.min(ancestors.len())];
        if window.is_empty() {
            return encode_compact(U256::one());
        }

        let total = window.iter().fold(U512::zero(), |acc, stored| {
            acc + U512::from(decode_compact(C::bits(&stored.header)).unwrap_or_default())
        });
        let mean = total / U512::from(window.len() as u64);

        let newest = C::timestamp(&window[0].header) as u64;
        let oldest = C::timestamp(&window[window.len() - 1].header) as u64;
        let target_span = self.target_spacing * (window.len() as u64 - 1).max(1);
        let actual_span = newest
            .saturating_sub(oldest)
            .max(target_span / MAX_ADJUSTMENT_FACTOR)
            .min(target_span * MAX_ADJUSTMENT_FACTOR)
            .max(1);

        let next = mean * U512::from(target_span) / U512::from(actual_span);
        let next = U256::try_from(next).unwrap_or(U256::MAX).max(U256::one());
        encode_compact(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_targets() {
        let genesis = decode_compact(0x1d00ffff).unwrap();
        assert_eq!(genesis, U256::from(0xffffu64) << 208);

        assert_eq!(decode_compact(0x01010000).unwrap(), U256::one());
        assert_eq!(decode_compact(0x03123456).unwrap(), U256::from(0x123456u64));
    }

    #[test]
    fn test_decode_rejects_negative_and_overflow() {
        assert_eq!(decode_compact(0x04923456), Err(CompactError::Negative(0x04923456)));
        assert_eq!(decode_compact(0xff123456), Err(CompactError::Overflow(0xff123456)));
        assert_eq!(decode_compact_nonzero(0), Err(CompactError::Zero(0)));
    }

    #[test]
    fn test_encode_roundtrip_canonical() {
        for bits in [0x1d00ffffu32, 0x1b0404cb, 0x207fffff, 0x2100ffff, 0x01010000] {
            let value = decode_compact(bits).unwrap();
            assert_eq!(encode_compact(value), bits, "bits {:#x}", bits);
        }
    }

    #[test]
    fn test_encode_shifts_sign_bit() {
        assert_eq!(encode_compact(U256::from(0x80u64)), 0x02008000);
    }

    #[test]
    fn test_work_from_bits() {
        assert_eq!(work_from_bits(0x2100ffff), U256::one());
        assert_eq!(work_from_bits(0x207fffff), U256::from(2u64));
        assert_eq!(work_from_bits(0x1d00ffff), U256::from(0x1_0001_0001u64));
        assert_eq!(work_from_bits(0), U256::zero());
    }

    #[test]
    fn test_harder_bits_more_work() {
        assert!(work_from_bits(0x1c00ffff) > work_from_bits(0x1d00ffff));
    }

    #[test]
    fn test_retarget_clamps_and_caps() {
        let params = NetworkParameters::btc_mainnet();
        let retarget = BitcoinRetarget::new(&params);
        let expected = params.target_spacing * params.retarget_interval as u64;

        // On-schedule period keeps difficulty
        assert_eq!(retarget.retarget(0x1b0404cb, expected), 0x1b0404cb);

        // Blocks twice as fast halve the target
        let faster = retarget.retarget(0x1c00ffff, expected / 2);
        assert!(decode_compact(faster).unwrap() < decode_compact(0x1c00ffff).unwrap());

        // Never easier than the limit
        assert_eq!(retarget.retarget(0x1d00ffff, expected * 100), 0x1d00ffff);

        // Instant blocks are clamped to a 4x change
        let instant = decode_compact(retarget.retarget(0x1c00ffff, 0)).unwrap();
        let quarter = decode_compact(0x1c00ffff).unwrap() / 4;
        assert_eq!(encode_compact(instant), encode_compact(quarter));
    }

    #[test]
    fn test_adjustment_heights() {
        let retarget = BitcoinRetarget::new(&NetworkParameters::btc_mainnet());
        assert!(!retarget.is_adjustment_height(0));
        assert!(!retarget.is_adjustment_height(1));
        assert!(retarget.is_adjustment_height(2016));
        assert!(retarget.is_adjustment_height(4032));
    }
}
