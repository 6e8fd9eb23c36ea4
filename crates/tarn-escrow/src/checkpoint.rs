//! Global and per-lock checkpoint logs, the slope schedule, and the
//! checkpoint algorithm that advances them.
//!
//! The aggregate voting-power curve is piecewise linear: its slope only
//! changes at week boundaries (when locks expire) and at mutations.
//! [`DecayLedger::checkpoint`] rolls the curve forward one boundary at a
//! time, applying the scheduled slope drops and recording one snapshot
//! per boundary, so catching up costs elapsed *weeks*, not seconds, and
//! any past second remains exactly reconstructable by interpolation.
//!
//! Clamp policy: a slightly negative aggregate *bias* during replay is a
//! rounding remainder of the integer slope division and floors to zero.
//! A negative aggregate *slope* during replay cannot result from
//! rounding and is reported as a state invariant violation. Clamps after
//! applying a lock delta are expected floor behavior and only logged.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use tarn_core::constants::{MAX_CHECKPOINT_WEEKS, WEEK};
use tarn_core::error::{LockError, StateInvariantError, TarnError};
use tarn_core::types::{LockId, LockedBalance, Moment, Point};

use crate::curve;

/// Fixed-point denominator for block-number interpolation between
/// checkpoints.
const BLOCK_INTERP: u128 = 1_000_000_000_000_000_000;

/// A lock mutation handed to the checkpoint algorithm.
#[derive(Clone, Copy, Debug)]
pub struct LockChange {
    pub id: LockId,
    pub old: LockedBalance,
    pub new: LockedBalance,
}

/// The checkpointed decay ledger: aggregate curve history, per-lock
/// curve histories, and the schedule of future slope adjustments.
#[derive(Debug, Clone)]
pub struct DecayLedger {
    /// Global checkpoint log; the index is the epoch. Never empty:
    /// construction seeds a zero genesis point.
    pub(crate) points: Vec<Point>,
    /// Per-lock checkpoint logs; the index within a log is the lock
    /// epoch.
    pub(crate) lock_points: HashMap<LockId, Vec<Point>>,
    /// Scheduled aggregate slope deltas keyed by week boundary. Entries
    /// are negative (the slope drops when locks expire) and are never
    /// removed; deltas up to the latest checkpoint are already folded
    /// into the log tip.
    pub(crate) slope_changes: BTreeMap<u64, i128>,
}

impl DecayLedger {
    /// Create a ledger whose history starts at `genesis`.
    pub fn new(genesis: Moment) -> Self {
        Self {
            points: vec![Point::zero_at(genesis)],
            lock_points: HashMap::new(),
            slope_changes: BTreeMap::new(),
        }
    }

    /// Latest global checkpoint.
    pub fn tip(&self) -> &Point {
        self.points.last().expect("log seeded with a genesis point")
    }

    /// Index of the latest global checkpoint.
    pub fn epoch(&self) -> u64 {
        (self.points.len() - 1) as u64
    }

    /// A lock's checkpoint history, oldest first. Empty for unknown locks.
    pub fn lock_history(&self, id: LockId) -> &[Point] {
        self.lock_points
            .get(&id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of checkpoints recorded for a lock.
    pub fn lock_epoch(&self, id: LockId) -> u64 {
        self.lock_history(id).len() as u64
    }

    /// A lock's most recent checkpoint, if any.
    pub fn latest_lock_point(&self, id: LockId) -> Option<&Point> {
        self.lock_points.get(&id).and_then(|log| log.last())
    }

    /// The scheduled aggregate slope delta at a week boundary (0 if none).
    pub fn scheduled_slope_delta(&self, boundary: u64) -> i128 {
        *self.slope_changes.get(&boundary).unwrap_or(&0)
    }

    /// Whether the lock already carries a checkpoint stamped exactly `now`.
    pub fn checkpointed_at(&self, id: LockId, now: u64) -> bool {
        self.latest_lock_point(id)
            .is_some_and(|p| p.timestamp == now)
    }

    /// Reject moments that regress relative to the latest checkpoint.
    pub fn ensure_monotonic(&self, moment: Moment) -> Result<(), LockError> {
        let tip = self.tip();
        if moment.timestamp < tip.timestamp {
            return Err(LockError::NonMonotonicMoment {
                have: moment.timestamp,
                prev: tip.timestamp,
            });
        }
        if moment.block < tip.block {
            return Err(LockError::NonMonotonicMoment {
                have: moment.block,
                prev: tip.block,
            });
        }
        Ok(())
    }

    /// Roll a curve point forward to `target` one week boundary at a
    /// time, applying scheduled slope deltas and interpolating block
    /// numbers linearly between `start` and `target`.
    ///
    /// Pure with respect to the ledger: consults the slope schedule but
    /// mutates nothing. Returns the boundary snapshots crossed and the
    /// final point stamped at `target` — or `None` for the final point
    /// when more than [`MAX_CHECKPOINT_WEEKS`] boundaries separate the
    /// two, in which case the snapshots cover as far as the walk got.
    pub(crate) fn replay(
        &self,
        start: Point,
        target: Moment,
    ) -> Result<(Vec<Point>, Option<Point>), StateInvariantError> {
        let origin = start;
        let mut last = start;
        let block_slope: u128 = if target.timestamp > origin.timestamp {
            BLOCK_INTERP * (target.block - origin.block) as u128
                / (target.timestamp - origin.timestamp) as u128
        } else {
            0
        };

        let mut boundaries = Vec::new();
        let mut t_i = curve::floor_to_week(origin.timestamp);
        for _ in 0..MAX_CHECKPOINT_WEEKS {
            t_i += WEEK;
            let mut d_slope = 0i128;
            if t_i > target.timestamp {
                t_i = target.timestamp;
            } else {
                d_slope = self.scheduled_slope_delta(t_i);
            }

            let elapsed = (t_i - last.timestamp) as i128;
            let decayed = last
                .slope
                .checked_mul(elapsed)
                .ok_or(StateInvariantError::CurveOverflow)?;
            last.bias = last
                .bias
                .checked_sub(decayed)
                .ok_or(StateInvariantError::CurveOverflow)?;
            last.slope += d_slope;
            if last.bias < 0 {
                // Integer-division remainder of the slope; floors to zero.
                last.bias = 0;
            }
            if last.slope < 0 {
                return Err(StateInvariantError::NegativeSlope(t_i));
            }
            last.timestamp = t_i;
            last.block = origin.block
                + ((block_slope * (t_i - origin.timestamp) as u128) / BLOCK_INTERP) as u64;
            if t_i == target.timestamp {
                last.block = target.block;
                return Ok((boundaries, Some(last)));
            }
            boundaries.push(last);
        }
        Ok((boundaries, None))
    }

    /// Advance the global log to `moment`, optionally applying a lock
    /// mutation.
    ///
    /// With a [`LockChange`], the rolled-forward aggregate point takes
    /// the lock's bias/slope delta, the slope schedule cancels the old
    /// contribution at the old end and registers the new one at the new
    /// end, and the lock's own log gains a checkpoint stamped `moment`.
    ///
    /// # Errors
    ///
    /// - [`LockError::NonMonotonicMoment`] when `moment` regresses.
    /// - [`StateInvariantError::CatchUpCapExceeded`] when the log is
    ///   stale by more than [`MAX_CHECKPOINT_WEEKS`] boundaries. The
    ///   catch-up progress made so far is kept, so repeating the call
    ///   continues from where this one stopped; the lock mutation
    ///   itself is not applied.
    pub fn checkpoint(
        &mut self,
        change: Option<&LockChange>,
        moment: Moment,
    ) -> Result<(), TarnError> {
        self.ensure_monotonic(moment)?;

        let mut u_old = Point::zero_at(moment);
        let mut u_new = Point::zero_at(moment);
        let mut old_dslope = 0i128;
        let mut new_dslope = 0i128;
        if let Some(c) = change {
            u_old = curve::lock_point(&c.old, moment);
            u_new = curve::lock_point(&c.new, moment);
            old_dslope = self.scheduled_slope_delta(c.old.end);
            if c.new.end != 0 {
                new_dslope = if c.new.end == c.old.end {
                    old_dslope
                } else {
                    self.scheduled_slope_delta(c.new.end)
                };
            }
        }

        let (boundaries, finished) = self.replay(*self.tip(), moment)?;
        let crossed = boundaries.len();
        for point in boundaries {
            self.push_global(point);
        }
        let Some(mut last) = finished else {
            warn!(
                stale_weeks = MAX_CHECKPOINT_WEEKS,
                "checkpoint catch-up cap hit; repeat the call to continue"
            );
            return Err(StateInvariantError::CatchUpCapExceeded {
                stale_weeks: MAX_CHECKPOINT_WEEKS,
            }
            .into());
        };
        if crossed > 0 {
            debug!(boundaries = crossed, epoch = self.epoch(), "advanced global checkpoint log");
        }

        if let Some(c) = change {
            last.slope += u_new.slope - u_old.slope;
            last.bias += u_new.bias - u_old.bias;
            if last.slope < 0 {
                warn!(lock = %c.id, "aggregate slope clamped to zero after lock delta");
                last.slope = 0;
            }
            if last.bias < 0 {
                warn!(lock = %c.id, "aggregate bias clamped to zero after lock delta");
                last.bias = 0;
            }
        }
        self.push_global(last);

        if let Some(c) = change {
            // Reschedule the aggregate slope drops at the old and new ends.
            if c.old.end > moment.timestamp {
                // The old contribution was scheduled at old.end; cancel it.
                old_dslope += u_old.slope;
                if c.new.end == c.old.end {
                    // The new contribution replaces it at the same boundary.
                    old_dslope -= u_new.slope;
                }
                self.slope_changes.insert(c.old.end, old_dslope);
            }
            if c.new.end > moment.timestamp && c.new.end > c.old.end {
                new_dslope -= u_new.slope;
                self.slope_changes.insert(c.new.end, new_dslope);
            }
            self.push_lock_point(c.id, u_new);
        }
        Ok(())
    }

    /// Append to the global log, folding onto the tip when the
    /// timestamp has not advanced.
    fn push_global(&mut self, point: Point) {
        match self.points.last_mut() {
            Some(tip) if tip.timestamp == point.timestamp => *tip = point,
            _ => self.points.push(point),
        }
    }

    /// Append to a lock's log with the same folding rule.
    fn push_lock_point(&mut self, id: LockId, point: Point) {
        let log = self.lock_points.entry(id).or_default();
        match log.last_mut() {
            Some(tip) if tip.timestamp == point.timestamp => *tip = point,
            _ => log.push(point),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tarn_core::constants::{COIN, MAX_LOCK_DURATION};

    fn moment(timestamp: u64) -> Moment {
        Moment::new(timestamp, timestamp / 10)
    }

    fn change(id: u64, old: LockedBalance, new: LockedBalance) -> LockChange {
        LockChange { id: LockId(id), old, new }
    }

    fn lock(amount: u64, end: u64) -> LockedBalance {
        LockedBalance { amount, end }
    }

    /// A fresh ledger plus one lock of `amount` ending at `end`,
    /// created at `start`.
    fn ledger_with_lock(start: u64, amount: u64, end: u64) -> DecayLedger {
        let mut ledger = DecayLedger::new(moment(start));
        ledger
            .checkpoint(Some(&change(1, LockedBalance::ZERO, lock(amount, end))), moment(start))
            .unwrap();
        ledger
    }

    // --- construction ---

    #[test]
    fn new_ledger_has_genesis_tip() {
        let ledger = DecayLedger::new(moment(5 * WEEK));
        assert_eq!(ledger.epoch(), 0);
        assert_eq!(ledger.tip().bias, 0);
        assert_eq!(ledger.tip().timestamp, 5 * WEEK);
    }

    // --- monotonicity ---

    #[test]
    fn rejects_regressing_timestamp() {
        let mut ledger = DecayLedger::new(moment(10 * WEEK));
        let err = ledger.checkpoint(None, moment(10 * WEEK - 1)).unwrap_err();
        assert!(matches!(err, TarnError::Lock(LockError::NonMonotonicMoment { .. })));
    }

    #[test]
    fn rejects_regressing_block() {
        let mut ledger = DecayLedger::new(Moment::new(10 * WEEK, 100));
        let err = ledger
            .checkpoint(None, Moment::new(11 * WEEK, 99))
            .unwrap_err();
        assert!(matches!(err, TarnError::Lock(LockError::NonMonotonicMoment { .. })));
    }

    // --- single lock lifecycle on the aggregate curve ---

    #[test]
    fn create_sets_aggregate_bias_and_schedule() {
        let start = 100 * WEEK;
        let end = start + 104 * WEEK;
        let ledger = ledger_with_lock(start, 1000 * COIN, end);

        let slope = (1000 * COIN) as i128 / MAX_LOCK_DURATION as i128;
        assert_eq!(ledger.tip().slope, slope);
        assert_eq!(ledger.tip().bias, slope * (104 * WEEK) as i128);
        // The expiry is scheduled as a slope drop.
        assert_eq!(ledger.scheduled_slope_delta(end), -slope);
        // Per-lock log mirrors it.
        assert_eq!(ledger.lock_epoch(LockId(1)), 1);
        assert_eq!(ledger.latest_lock_point(LockId(1)).unwrap().slope, slope);
    }

    #[test]
    fn catch_up_appends_one_point_per_week() {
        let start = 100 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, start + 104 * WEEK);
        let before = ledger.epoch();
        ledger.checkpoint(None, moment(start + 5 * WEEK + 3600)).unwrap();
        // Five boundary snapshots plus the tip at now.
        assert_eq!(ledger.epoch(), before + 6);
        assert_eq!(ledger.tip().timestamp, start + 5 * WEEK + 3600);
    }

    #[test]
    fn same_instant_checkpoint_folds_into_tip() {
        let start = 100 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, start + 104 * WEEK);
        let epoch = ledger.epoch();
        ledger.checkpoint(None, moment(start)).unwrap();
        assert_eq!(ledger.epoch(), epoch);
    }

    #[test]
    fn aggregate_slope_drops_at_expiry() {
        let start = 100 * WEEK;
        let end = start + 10 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, end);
        assert!(ledger.tip().slope > 0);

        ledger.checkpoint(None, moment(end + 1)).unwrap();
        assert_eq!(ledger.tip().slope, 0);
        assert_eq!(ledger.tip().bias, 0);
    }

    #[test]
    fn withdraw_zeroes_contribution() {
        let start = 100 * WEEK;
        let end = start + 10 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, end);
        ledger
            .checkpoint(Some(&change(1, lock(1000 * COIN, end), LockedBalance::ZERO)), moment(end))
            .unwrap();
        assert_eq!(ledger.tip().bias, 0);
        assert_eq!(ledger.tip().slope, 0);
        // The lock's own log records the zero state.
        let p = ledger.latest_lock_point(LockId(1)).unwrap();
        assert_eq!((p.bias, p.slope), (0, 0));
    }

    #[test]
    fn extend_reschedules_slope_drop() {
        let start = 100 * WEEK;
        let end = start + 10 * WEEK;
        let new_end = start + 20 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, end);
        let slope = ledger.tip().slope;

        ledger
            .checkpoint(
                Some(&change(1, lock(1000 * COIN, end), lock(1000 * COIN, new_end))),
                moment(start + WEEK),
            )
            .unwrap();
        assert_eq!(ledger.scheduled_slope_delta(end), 0);
        assert_eq!(ledger.scheduled_slope_delta(new_end), -slope);
        // Aggregate slope unchanged; bias now covers the longer runway.
        assert_eq!(ledger.tip().slope, slope);
        assert_eq!(ledger.tip().bias, slope * (19 * WEEK) as i128);
    }

    #[test]
    fn top_up_at_same_end_folds_schedule_in_place() {
        let start = 100 * WEEK;
        let end = start + 50 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, end);
        ledger
            .checkpoint(
                Some(&change(1, lock(1000 * COIN, end), lock(3000 * COIN, end))),
                moment(start + WEEK),
            )
            .unwrap();
        let slope = (3000 * COIN) as i128 / MAX_LOCK_DURATION as i128;
        assert_eq!(ledger.tip().slope, slope);
        assert_eq!(ledger.scheduled_slope_delta(end), -slope);
    }

    #[test]
    fn two_locks_aggregate_their_curves() {
        let start = 100 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, start + 10 * WEEK);
        ledger
            .checkpoint(
                Some(&change(2, LockedBalance::ZERO, lock(500 * COIN, start + 20 * WEEK))),
                moment(start),
            )
            .unwrap();
        let s1 = (1000 * COIN) as i128 / MAX_LOCK_DURATION as i128;
        let s2 = (500 * COIN) as i128 / MAX_LOCK_DURATION as i128;
        assert_eq!(ledger.tip().slope, s1 + s2);

        // After the first expiry only the second lock decays.
        ledger.checkpoint(None, moment(start + 15 * WEEK)).unwrap();
        assert_eq!(ledger.tip().slope, s2);
    }

    #[test]
    fn block_numbers_interpolate_at_boundaries() {
        let start = 100 * WEEK;
        let mut ledger = DecayLedger::new(Moment::new(start, 1000));
        ledger
            .checkpoint(
                Some(&change(1, LockedBalance::ZERO, lock(1000 * COIN, start + 10 * WEEK))),
                Moment::new(start, 1000),
            )
            .unwrap();
        // Two weeks and 1890 blocks later: the intermediate boundary
        // point sits halfway in both time and block. 1890 blocks over
        // two weeks divides the interpolation fixed-point exactly.
        ledger.checkpoint(None, Moment::new(start + 2 * WEEK, 2890)).unwrap();
        let points = &ledger.points;
        let boundary = &points[points.len() - 2];
        assert_eq!(boundary.timestamp, start + WEEK);
        assert_eq!(boundary.block, 1945);
        assert_eq!(ledger.tip().block, 2890);
    }

    #[test]
    fn catch_up_cap_is_recoverable() {
        let start = 100 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, start + 10 * WEEK);
        let far = start + (MAX_CHECKPOINT_WEEKS + 40) * WEEK;
        let err = ledger.checkpoint(None, moment(far)).unwrap_err();
        assert!(matches!(
            err,
            TarnError::Invariant(StateInvariantError::CatchUpCapExceeded { .. })
        ));
        // Partial progress was kept; a second call completes.
        assert!(ledger.tip().timestamp > start);
        ledger.checkpoint(None, moment(far)).unwrap();
        assert_eq!(ledger.tip().timestamp, far);
        assert_eq!(ledger.tip().bias, 0);
    }

    #[test]
    fn slope_schedule_entry_applies_exactly_at_boundary_now() {
        // A checkpoint landing exactly on a scheduled boundary applies
        // the drop in the same call.
        let start = 100 * WEEK;
        let end = start + 4 * WEEK;
        let mut ledger = ledger_with_lock(start, 1000 * COIN, end);
        ledger.checkpoint(None, moment(end)).unwrap();
        assert_eq!(ledger.tip().slope, 0);
    }
}
