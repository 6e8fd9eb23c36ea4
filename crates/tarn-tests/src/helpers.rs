//! Shared test helpers for E2E and adversarial tests.

use tarn_core::constants::{COIN, DEFAULT_PENALTY_BPS, WEEK};
use tarn_core::types::{Address, Moment};
use tarn_escrow::{Escrow, EscrowConfig, MemoryToken};

/// All scenarios start on a week boundary well past the epoch.
pub const START: u64 = 1000 * WEEK;

/// Simple address from a seed byte.
pub fn addr(seed: u8) -> Address {
    Address([seed; 20])
}

pub fn vault() -> Address {
    addr(0xEE)
}

pub fn treasury() -> Address {
    addr(0xDD)
}

pub fn voter() -> Address {
    addr(0xCC)
}

pub fn admin() -> Address {
    addr(0xAA)
}

/// Blocks tick every 10 seconds in tests, which divides the block
/// interpolation fixed-point exactly.
pub fn moment(timestamp: u64) -> Moment {
    Moment::new(timestamp, timestamp / 10)
}

/// A fresh escrow with each listed user funded 1,000,000 TARN.
pub fn funded_escrow(users: &[Address]) -> Escrow<MemoryToken> {
    let mut token = MemoryToken::new();
    for user in users {
        token.mint(*user, 1_000_000 * COIN).unwrap();
    }
    let config = EscrowConfig {
        vault: vault(),
        treasury: treasury(),
        voter: voter(),
        admin: admin(),
        penalty_bps: DEFAULT_PENALTY_BPS,
    };
    Escrow::new(config, token, moment(START))
}
