//! Network parameters driving header validation

use crate::constants::{KEYSTONE_INTERVAL, MAX_REORG_DISTANCE, MEDIAN_TIME_SPAN};
use serde::{Deserialize, Serialize};

/// Per-network consensus parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkParameters {
    /// Network name, informational
    pub name: String,
    /// Easiest allowed value in compact form: the largest target on the
    /// full-hash chain, the smallest difficulty on the partial-hash chain
    pub pow_limit: u32,
    /// Target seconds between blocks
    pub target_spacing: u64,
    /// Blocks per difficulty period (or averaging window)
    pub retarget_interval: u32,
    /// Ancestors considered for median-time-past
    pub median_time_span: usize,
    /// How far a timestamp may run ahead of the local clock, in seconds
    pub max_future_block_time: u64,
    /// Blocks between keystones
    pub keystone_interval: u32,
    /// Beyond this many blocks ahead of the stored head, callers should reset
    pub max_reorg_distance: u32,
}

impl NetworkParameters {
    /// Full-hash chain main network
    pub fn btc_mainnet() -> Self {
        Self {
            name: "btc-main".to_string(),
            pow_limit: 0x1d00ffff,
            target_spacing: 600,
            retarget_interval: 2016,
            median_time_span: MEDIAN_TIME_SPAN,
            max_future_block_time: 2 * 60 * 60,
            keystone_interval: KEYSTONE_INTERVAL,
            max_reorg_distance: MAX_REORG_DISTANCE,
        }
    }

    /// Full-hash chain network with a trivially easy limit, for tests
    pub fn btc_unit_test() -> Self {
        Self {
            name: "btc-unit-test".to_string(),
            pow_limit: 0x2100ffff,
            ..Self::btc_mainnet()
        }
    }

    /// Partial-hash chain main network
    pub fn vbk_mainnet() -> Self {
        Self {
            name: "vbk-main".to_string(),
            pow_limit: 0x01010000,
            target_spacing: 30,
            retarget_interval: 100,
            median_time_span: MEDIAN_TIME_SPAN,
            max_future_block_time: 60,
            keystone_interval: KEYSTONE_INTERVAL,
            max_reorg_distance: MAX_REORG_DISTANCE,
        }
    }

    /// Partial-hash chain network for tests
    pub fn vbk_unit_test() -> Self {
        Self {
            name: "vbk-unit-test".to_string(),
            ..Self::vbk_mainnet()
        }
    }
}
