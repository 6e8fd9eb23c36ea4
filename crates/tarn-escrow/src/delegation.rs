//! Delegation checkpoint store.
//!
//! A time-indexed array-of-sets per delegatee, independent of the decay
//! logs: each checkpoint records the full set of lock ids whose weight
//! the delegatee tallies as of its timestamp. The store is append-only
//! with at most one checkpoint per distinct timestamp — a second write
//! in the same instant is rejected rather than silently replacing the
//! prior set.

use std::collections::HashMap;

use tarn_core::error::DelegationError;
use tarn_core::types::{Address, LockId, SetCheckpoint};

/// Set mutation dispatched through [`DelegationLog::push`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOp {
    Add,
    Remove,
}

/// Apply a set operation to the current id list, producing the new list.
///
/// `Remove` assumes duplicate-free membership (the lifecycle operations
/// guarantee it); removing an id that is not present leaves the list
/// unchanged.
pub fn apply_op(current: &[LockId], op: SetOp, ids: &[LockId]) -> Vec<LockId> {
    match op {
        SetOp::Add => {
            let mut next = current.to_vec();
            next.extend_from_slice(ids);
            next
        }
        SetOp::Remove => current
            .iter()
            .copied()
            .filter(|id| !ids.contains(id))
            .collect(),
    }
}

/// Per-delegatee append-only checkpoint arrays.
#[derive(Debug, Clone, Default)]
pub struct DelegationLog {
    checkpoints: HashMap<Address, Vec<SetCheckpoint>>,
}

impl DelegationLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recently checkpointed set, or empty.
    pub fn latest_set(&self, delegatee: &Address) -> &[LockId] {
        self.checkpoints
            .get(delegatee)
            .and_then(|log| log.last())
            .map(|cp| cp.ids.as_slice())
            .unwrap_or(&[])
    }

    /// The delegated set as of `t`, or empty if no checkpoint precedes it.
    pub fn set_at_or_before(&self, delegatee: &Address, t: u64) -> &[LockId] {
        let Some(log) = self.checkpoints.get(delegatee) else {
            return &[];
        };
        let n = log.partition_point(|cp| cp.timestamp <= t);
        if n == 0 { &[] } else { log[n - 1].ids.as_slice() }
    }

    /// Number of checkpoints recorded for a delegatee.
    pub fn epoch(&self, delegatee: &Address) -> u64 {
        self.checkpoints.get(delegatee).map(|log| log.len() as u64).unwrap_or(0)
    }

    /// Check that a checkpoint can still be written at `now`.
    ///
    /// # Errors
    ///
    /// [`DelegationError::SameInstantCheckpoint`] when the latest entry
    /// is already stamped `now`.
    pub fn pushable(&self, delegatee: &Address, now: u64) -> Result<(), DelegationError> {
        match self.checkpoints.get(delegatee).and_then(|log| log.last()) {
            Some(cp) if cp.timestamp == now => {
                Err(DelegationError::SameInstantCheckpoint(now))
            }
            _ => Ok(()),
        }
    }

    /// Append a checkpoint carrying the set produced by applying `op`
    /// with `ids` to the latest set.
    pub fn push(
        &mut self,
        delegatee: Address,
        op: SetOp,
        ids: &[LockId],
        now: u64,
    ) -> Result<(), DelegationError> {
        self.pushable(&delegatee, now)?;
        let next = apply_op(self.latest_set(&delegatee), op, ids);
        self.checkpoints
            .entry(delegatee)
            .or_default()
            .push(SetCheckpoint { timestamp: now, ids: next });
        Ok(())
    }
}
