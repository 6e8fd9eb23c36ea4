//! Error types for the Tarn ledger.
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockError {
    #[error("caller is not owner or approved for lock {0}")] Unauthorized(u64),
    #[error("unknown lock: {0}")] UnknownLock(u64),
    #[error("zero amount")] ZeroAmount,
    #[error("value overflow")] ValueOverflow,
    #[error("unlock time {end} not in the future (now {now})")] DurationTooShort { end: u64, now: u64 },
    #[error("unlock time {end} exceeds maximum {max_end}")] DurationTooLong { end: u64, max_end: u64 },
    #[error("new unlock time {new_end} not after current {current_end}")] ExtensionNotLater { new_end: u64, current_end: u64 },
    #[error("lock {lock} expired at {end}")] Expired { lock: u64, end: u64 },
    #[error("lock {lock} not expired until {end}")] NotExpired { lock: u64, end: u64 },
    #[error("lock {0} already checkpointed in this instant")] SameInstantReplay(u64),
    #[error("moment regressed: have {have}, latest checkpoint {prev}")] NonMonotonicMoment { have: u64, prev: u64 },
    #[error("reentrant call rejected")] Reentrancy,
    #[error("lock {0} has voted in the current epoch")] VotedLock(u64),
    #[error("liquidations are not enabled")] LiquidationsDisabled,
    #[error("cannot merge lock {0} into itself")] SelfMerge(u64),
    #[error("split amount {extracted} not below locked amount {amount}")] SplitTooLarge { extracted: u64, amount: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("timestamp {requested} is not in the past (now {now})")] FutureLookup { requested: u64, now: u64 },
    #[error("block {requested} is not settled (current {current})")] FutureBlock { requested: u64, current: u64 },
    #[error("value overflow")] ValueOverflow,
    #[error(transparent)] Invariant(#[from] StateInvariantError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DelegationError {
    #[error("delegation checkpoint already written at {0}")] SameInstantCheckpoint(u64),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("insufficient funds: have {have}, need {need}")] InsufficientFunds { have: u64, need: u64 },
    #[error("value overflow")] ValueOverflow,
}

/// Defensive invariant violations. These signal a logic fault in the
/// ledger itself rather than bad user input, and abort the whole
/// transition.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateInvariantError {
    #[error("aggregate slope went negative at {0}")] NegativeSlope(u64),
    #[error("arithmetic overflow in curve math")] CurveOverflow,
    #[error("catch-up cap exceeded: {stale_weeks} stale weeks")] CatchUpCapExceeded { stale_weeks: u64 },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TarnError {
    #[error(transparent)] Lock(#[from] LockError),
    #[error(transparent)] Query(#[from] QueryError),
    #[error(transparent)] Delegation(#[from] DelegationError),
    #[error(transparent)] Token(#[from] TokenError),
    #[error(transparent)] Invariant(#[from] StateInvariantError),
}
