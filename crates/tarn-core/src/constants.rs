//! Ledger constants. All token values in grains (1 TARN = 10^8 grains).

pub const COIN: u64 = 100_000_000;

/// Checkpoint period in seconds. Lock expiries are rounded down to
/// multiples of this, so every scheduled slope change lands on a
/// week boundary.
pub const WEEK: u64 = 7 * 86_400;

/// Longest allowed lock duration: four years.
///
/// A lock of amount `A` held for the full duration starts with voting
/// power of (almost exactly) `A` and decays linearly to zero at expiry.
pub const MAX_LOCK_DURATION: u64 = 4 * 365 * 86_400;

/// Iteration cap for the weekly catch-up loop in the checkpoint
/// algorithm.
///
/// 255 weeks is just under five years of unvisited boundaries. A ledger
/// stale for longer than this cannot be caught up in a single
/// checkpoint call; the call commits its partial progress and reports
/// [`StateInvariantError::CatchUpCapExceeded`](crate::error::StateInvariantError),
/// after which further calls continue from where it stopped.
pub const MAX_CHECKPOINT_WEEKS: u64 = 255;

/// Basis-point denominator for penalty math.
pub const BPS_PRECISION: u64 = 10_000;

/// Default liquidation penalty applied to a lock's *remaining voting
/// power* (not its principal): 50%.
pub const DEFAULT_PENALTY_BPS: u64 = 5_000;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_duration_fits_under_catchup_cap() {
        // The longest possible lock spans fewer week boundaries than the
        // catch-up loop can visit in one call.
        assert!(MAX_LOCK_DURATION / WEEK < MAX_CHECKPOINT_WEEKS);
    }

    #[test]
    fn week_divides_cleanly_into_seconds() {
        assert_eq!(WEEK, 604_800);
        assert_eq!(MAX_LOCK_DURATION, 126_144_000);
    }

    #[test]
    fn default_penalty_is_half() {
        assert_eq!(DEFAULT_PENALTY_BPS * 2, BPS_PRECISION);
    }
}
