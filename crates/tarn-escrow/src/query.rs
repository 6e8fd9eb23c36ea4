//! Historical query engine: binary searches over the checkpoint logs.
//!
//! Point-in-time queries find the latest checkpoint at or before the
//! requested instant and project it forward. Point-in-block queries
//! first translate the block number into an estimated timestamp by
//! interpolating between the two nearest global checkpoints. Queries
//! never mutate the ledger.

use tarn_core::error::{QueryError, StateInvariantError};
use tarn_core::types::{LockId, Moment, Point};

use crate::checkpoint::DecayLedger;
use crate::curve;

/// Latest point at or before `t` by timestamp, if any.
///
/// Checkpoint logs are strictly increasing in timestamp, so the
/// partition point is the count of entries at or before `t`.
fn latest_at_or_before(points: &[Point], t: u64) -> Option<&Point> {
    let n = points.partition_point(|p| p.timestamp <= t);
    if n == 0 { None } else { Some(&points[n - 1]) }
}

/// Latest point at or before `block` by block number, if any, with its
/// index. Block numbers are non-decreasing (several checkpoints may
/// share a block), so this lands on the last entry of a run.
fn latest_at_or_before_block(points: &[Point], block: u64) -> Option<(usize, &Point)> {
    let n = points.partition_point(|p| p.block <= block);
    if n == 0 { None } else { Some((n - 1, &points[n - 1])) }
}

fn clamp_magnitude(bias: i128) -> u64 {
    if bias <= 0 {
        0
    } else {
        u64::try_from(bias).unwrap_or(u64::MAX)
    }
}

impl DecayLedger {
    /// The lock's voting power at `t`.
    ///
    /// Zero when the lock has no checkpoint at or before `t` — a lock
    /// that did not exist yet carries no weight, and a burned lock's
    /// final zero checkpoint projects to zero.
    pub fn value_at(&self, id: LockId, t: u64) -> u64 {
        match latest_at_or_before(self.lock_history(id), t) {
            Some(point) => curve::project(point, t),
            None => 0,
        }
    }

    /// Translate a settled block number into an estimated timestamp by
    /// linear interpolation between the two global checkpoints
    /// bracketing it.
    fn block_to_time(&self, block: u64) -> Result<u64, QueryError> {
        let tip = self.tip();
        if block > tip.block {
            return Err(QueryError::FutureBlock { requested: block, current: tip.block });
        }
        let Some((epoch, p0)) = latest_at_or_before_block(&self.points, block) else {
            // Predates the ledger entirely.
            return Ok(self.points[0].timestamp);
        };
        let (d_t, d_block) = match self.points.get(epoch + 1) {
            Some(p1) => (p1.timestamp - p0.timestamp, p1.block - p0.block),
            // p0 is the tip itself, so block == tip.block exactly.
            None => (0, 0),
        };
        if d_block == 0 {
            return Ok(p0.timestamp);
        }
        let offset = (d_t as u128 * (block - p0.block) as u128) / d_block as u128;
        Ok(p0.timestamp + offset as u64)
    }

    /// The lock's voting power as of a settled `block`.
    ///
    /// # Errors
    ///
    /// [`QueryError::FutureBlock`] if `block` exceeds the latest
    /// checkpointed block.
    pub fn value_at_block(&self, id: LockId, block: u64) -> Result<u64, QueryError> {
        let tip = self.tip();
        if block > tip.block {
            return Err(QueryError::FutureBlock { requested: block, current: tip.block });
        }
        let Some((_, point)) = latest_at_or_before_block(self.lock_history(id), block) else {
            return Ok(0);
        };
        let at = self.block_to_time(block)?;
        Ok(curve::project(point, at))
    }

    /// Aggregate voting power at `t`, replaying the slope schedule
    /// forward from the latest global checkpoint at or before `t`
    /// without mutating the log.
    ///
    /// # Errors
    ///
    /// [`QueryError::FutureLookup`] when `t` is past the latest
    /// checkpoint — the caller must advance the log first so the answer
    /// is settled.
    pub fn aggregate_at(&self, t: u64) -> Result<u64, QueryError> {
        let tip = self.tip();
        if t > tip.timestamp {
            return Err(QueryError::FutureLookup { requested: t, now: tip.timestamp });
        }
        let Some(start) = latest_at_or_before(&self.points, t) else {
            return Ok(0);
        };
        let (_, finished) = self.replay(*start, Moment::new(t, start.block))?;
        match finished {
            Some(point) => Ok(clamp_magnitude(point.bias)),
            // Checkpoints are at most a week apart, so the walk from the
            // bracketing point always terminates well under the cap.
            None => Err(StateInvariantError::CatchUpCapExceeded {
                stale_weeks: tarn_core::constants::MAX_CHECKPOINT_WEEKS,
            }
            .into()),
        }
    }

    /// Aggregate voting power as of a settled `block`.
    pub fn aggregate_at_block(&self, block: u64) -> Result<u64, QueryError> {
        let at = self.block_to_time(block)?;
        self.aggregate_at(at)
    }
}
