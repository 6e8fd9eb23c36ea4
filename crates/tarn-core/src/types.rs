//! Core ledger types: addresses, lock records, curve points.
//!
//! All token amounts are in grains (1 TARN = 10^8 grains). Timestamps are
//! Unix seconds and block numbers are counters, both supplied by the host
//! environment and monotonically non-decreasing.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a lock record.
///
/// Minted monotonically starting at 1; never reused once the lock is
/// burned.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LockId(pub u64);

impl fmt::Display for LockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A 20-byte account address, displayed as lowercase hex.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The zero address. Never owns a lock.
    pub const ZERO: Self = Self([0u8; 20]);

    /// Create an Address from a byte array.
    pub fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the underlying bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Check if this is the zero address.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl From<[u8; 20]> for Address {
    fn from(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }
}

/// Host-supplied clock/block stamp for a state transition.
///
/// Every mutation carries one; the ledger rejects stamps that regress
/// relative to its latest checkpoint.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Moment {
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Host block counter.
    pub block: u64,
}

impl Moment {
    /// Construct a stamp from a timestamp/block pair.
    pub fn new(timestamp: u64, block: u64) -> Self {
        Self { timestamp, block }
    }
}

/// A lock's current principal and expiry.
///
/// `end == 0` means no active lock; otherwise `end` is rounded down to a
/// week boundary. Zeroed on withdraw, merge-source, and liquidation.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default,
    bincode::Encode, bincode::Decode,
)]
pub struct LockedBalance {
    /// Locked principal in grains.
    pub amount: u64,
    /// Expiry timestamp (week boundary), or 0.
    pub end: u64,
}

impl LockedBalance {
    /// The zero (terminated or nonexistent) lock state.
    pub const ZERO: Self = Self { amount: 0, end: 0 };

    /// Whether this is the zero state.
    pub fn is_zero(&self) -> bool {
        self.amount == 0 && self.end == 0
    }

    /// Whether the lock has expired as of `now`.
    pub fn is_expired(&self, now: u64) -> bool {
        self.end <= now
    }
}

/// A sample of a piecewise-linear decay curve.
///
/// Represents `value(t) = max(0, bias - slope * (t - timestamp))`.
/// Bias and slope are kept non-negative; `block` records the host block
/// counter at `timestamp` so point-in-block queries can interpolate.
#[derive(
    Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct Point {
    /// Curve intercept at `timestamp`.
    pub bias: i128,
    /// Decay rate per second.
    pub slope: i128,
    /// Time this sample was taken.
    pub timestamp: u64,
    /// Block counter at `timestamp`.
    pub block: u64,
}

impl Point {
    /// A flat zero curve stamped at the given moment.
    pub fn zero_at(moment: Moment) -> Self {
        Self {
            bias: 0,
            slope: 0,
            timestamp: moment.timestamp,
            block: moment.block,
        }
    }
}

/// One delegation checkpoint: the full set of lock ids delegated to an
/// address as of `timestamp`.
///
/// Stored append-only per delegatee; at most one entry per distinct
/// timestamp.
#[derive(
    Serialize, Deserialize, Clone, Debug, PartialEq, Eq,
    bincode::Encode, bincode::Decode,
)]
pub struct SetCheckpoint {
    /// Time this set became current.
    pub timestamp: u64,
    /// Lock ids delegated at `timestamp`.
    pub ids: Vec<LockId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address([seed; 20])
    }

    // --- Address ---

    #[test]
    fn address_zero_is_zero() {
        assert!(Address::ZERO.is_zero());
        assert_eq!(Address::ZERO, Address::default());
        assert!(!addr(1).is_zero());
    }

    #[test]
    fn address_display_hex() {
        let s = format!("{}", addr(0xAB));
        assert_eq!(s.len(), 2 + 40);
        assert!(s.starts_with("0xabab"));
    }

    #[test]
    fn address_from_bytes_round_trip() {
        let bytes = [7u8; 20];
        assert_eq!(Address::from_bytes(bytes).as_bytes(), &bytes);
        assert_eq!(Address::from(bytes), addr(7));
    }

    // --- LockId ---

    #[test]
    fn lock_id_display() {
        assert_eq!(format!("{}", LockId(42)), "#42");
    }

    #[test]
    fn lock_id_ordering() {
        assert!(LockId(1) < LockId(2));
    }

    // --- LockedBalance ---

    #[test]
    fn locked_balance_zero_state() {
        assert!(LockedBalance::ZERO.is_zero());
        assert!(!LockedBalance { amount: 1, end: 0 }.is_zero());
        assert!(!LockedBalance { amount: 0, end: 100 }.is_zero());
    }

    #[test]
    fn locked_balance_expiry() {
        let lb = LockedBalance { amount: 10, end: 1000 };
        assert!(!lb.is_expired(999));
        assert!(lb.is_expired(1000));
        assert!(lb.is_expired(1001));
    }

    // --- Point ---

    #[test]
    fn point_zero_at_carries_moment() {
        let p = Point::zero_at(Moment::new(123, 45));
        assert_eq!(p.bias, 0);
        assert_eq!(p.slope, 0);
        assert_eq!(p.timestamp, 123);
        assert_eq!(p.block, 45);
    }

    // --- Bincode round-trips ---

    #[test]
    fn bincode_round_trip_point() {
        let p = Point { bias: 1 << 80, slope: 12345, timestamp: 1_700_000_000, block: 99 };
        let encoded = bincode::encode_to_vec(p, bincode::config::standard()).unwrap();
        let (decoded, _): (Point, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn bincode_round_trip_set_checkpoint() {
        let cp = SetCheckpoint { timestamp: 7 * 604_800, ids: vec![LockId(1), LockId(9)] };
        let encoded = bincode::encode_to_vec(&cp, bincode::config::standard()).unwrap();
        let (decoded, _): (SetCheckpoint, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(cp, decoded);
    }

    #[test]
    fn bincode_round_trip_locked_balance() {
        let lb = LockedBalance { amount: u64::MAX, end: 604_800 };
        let encoded = bincode::encode_to_vec(lb, bincode::config::standard()).unwrap();
        let (decoded, _): (LockedBalance, usize) =
            bincode::decode_from_slice(&encoded, bincode::config::standard()).unwrap();
        assert_eq!(lb, decoded);
    }
}
