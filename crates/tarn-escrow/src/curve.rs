//! Decay curve primitive.
//!
//! A lock's voting power is a line: it starts at (almost) the locked
//! amount when locked for the maximum duration and reaches zero at
//! expiry. [`project`] evaluates such a line at a point in time;
//! [`lock_point`] derives the line for a given lock state.

use tarn_core::constants::{MAX_LOCK_DURATION, WEEK};
use tarn_core::types::{LockedBalance, Moment, Point};

/// Round a timestamp down to its week boundary.
pub fn floor_to_week(t: u64) -> u64 {
    t / WEEK * WEEK
}

/// Project a curve point forward to time `t`.
///
/// Computes `max(0, bias - slope * (t - timestamp))` as a magnitude.
/// Saturates at zero once the elapsed interval exhausts the bias; a `t`
/// at or before the sample returns the bias unchanged.
pub fn project(point: &Point, t: u64) -> u64 {
    let dt = t.saturating_sub(point.timestamp) as i128;
    let Some(decayed) = point.slope.checked_mul(dt) else {
        return 0;
    };
    let bias = point.bias.saturating_sub(decayed);
    if bias <= 0 {
        0
    } else {
        u64::try_from(bias).unwrap_or(u64::MAX)
    }
}

/// The bias/slope pair for a lock state at `moment`.
///
/// Non-zero only while the lock holds value and has not expired:
/// `slope = amount / MAX_LOCK_DURATION` (integer division, so dust
/// amounts can carry zero slope), `bias = slope * (end - now)`.
pub fn lock_point(locked: &LockedBalance, moment: Moment) -> Point {
    let mut point = Point::zero_at(moment);
    if locked.end > moment.timestamp && locked.amount > 0 {
        point.slope = locked.amount as i128 / MAX_LOCK_DURATION as i128;
        point.bias = point.slope * (locked.end - moment.timestamp) as i128;
    }
    point
}
