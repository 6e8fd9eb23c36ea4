//! Trait interfaces for the Tarn ledger.
//!
//! These traits define the read-only contracts between the ledger and its
//! collaborators:
//! - [`VotingPowerSource`] — governance tally queries (tarn-escrow implements)
//! - [`LockReader`] — reward and attachment bookkeeping queries (tarn-escrow implements)
//!
//! Both collaborators only ever read; the lifecycle operations on the
//! escrow itself are the sole writers.

use crate::error::QueryError;
use crate::types::{Address, LockId};

/// Voting-power queries consumed by the governance process.
///
/// "Current" means as of the ledger's latest checkpoint; the host is
/// expected to keep the checkpoint log caught up before querying.
/// Historical variants require a strictly past timestamp.
pub trait VotingPowerSource: Send + Sync {
    /// Voting power currently delegated to `delegatee`.
    fn current_voting_power(&self, delegatee: &Address) -> Result<u64, QueryError>;

    /// Voting power delegated to `delegatee` at a past `timestamp`.
    ///
    /// # Errors
    ///
    /// [`QueryError::FutureLookup`] unless `timestamp` is strictly before
    /// the latest checkpoint time.
    fn voting_power_at(&self, delegatee: &Address, timestamp: u64) -> Result<u64, QueryError>;

    /// Total voting power across all locks at `timestamp`.
    ///
    /// `timestamp` may equal the latest checkpoint time but not exceed it.
    fn aggregate_voting_power_at(&self, timestamp: u64) -> Result<u64, QueryError>;
}

/// Per-lock queries consumed by reward-accrual collaborators.
pub trait LockReader: Send + Sync {
    /// Owner of a live lock. `None` once the lock is burned or never existed.
    fn owner_of(&self, lock: LockId) -> Option<Address>;

    /// Current principal and expiry of a live lock.
    fn locked_value_and_end(&self, lock: LockId) -> Option<(u64, u64)>;

    /// The lock's own voting power at a past or current `timestamp`.
    ///
    /// A lock with no checkpoint history at `timestamp` contributes 0.
    fn value_at(&self, lock: LockId, timestamp: u64) -> Result<u64, QueryError>;

    /// The lock's voting power as of a settled `block`.
    ///
    /// # Errors
    ///
    /// [`QueryError::FutureBlock`] if `block` is beyond the latest
    /// checkpointed block.
    fn value_at_block(&self, lock: LockId, block: u64) -> Result<u64, QueryError>;
}
