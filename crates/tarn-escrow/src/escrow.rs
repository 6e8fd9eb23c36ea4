//! Lock lifecycle operations.
//!
//! The [`Escrow`] owns every ledger structure and is its only writer:
//! create, top-up, extend, withdraw, merge, split, liquidate, and
//! delegate all funnel through the checkpoint algorithm and the
//! delegation store. Every operation validates fully before touching
//! state, so a rejected call leaves nothing half-written, and each
//! operation that moves tokens runs inside a reentrancy guard.

use std::collections::HashMap;

use tracing::info;

use tarn_core::constants::{BPS_PRECISION, MAX_LOCK_DURATION};
use tarn_core::error::{LockError, QueryError, TarnError, TokenError};
use tarn_core::types::{Address, LockId, LockedBalance, Moment};
use tarn_core::traits::{LockReader, VotingPowerSource};

use crate::checkpoint::{DecayLedger, LockChange};
use crate::curve;
use crate::delegation::{DelegationLog, SetOp};
use crate::token::TokenBackend;

/// Static escrow parameters fixed at construction.
#[derive(Debug, Clone)]
pub struct EscrowConfig {
    /// Account holding locked principal.
    pub vault: Address,
    /// Receives liquidation penalties.
    pub treasury: Address,
    /// May flag locks as having voted in the current governance epoch.
    pub voter: Address,
    /// May enable liquidations (a one-time, irreversible switch).
    pub admin: Address,
    /// Liquidation penalty on remaining voting power, in basis points.
    pub penalty_bps: u64,
}

/// Per-lock bookkeeping next to the checkpoint logs.
#[derive(Debug, Clone)]
struct LockRecord {
    owner: Address,
    approved: Option<Address>,
    delegatee: Address,
    voted: bool,
    locked: LockedBalance,
}

/// The voting-escrow ledger.
pub struct Escrow<T: TokenBackend> {
    config: EscrowConfig,
    token: T,
    ledger: DecayLedger,
    delegation: DelegationLog,
    locks: HashMap<LockId, LockRecord>,
    /// Sticky per-owner delegation preference; defaults to the owner.
    owner_delegatee: HashMap<Address, Address>,
    next_id: u64,
    total_locked: u64,
    liquidations_enabled: bool,
    entered: bool,
}

impl<T: TokenBackend> Escrow<T> {
    /// Create an empty escrow whose history starts at `genesis`.
    pub fn new(config: EscrowConfig, token: T, genesis: Moment) -> Self {
        Self {
            config,
            token,
            ledger: DecayLedger::new(genesis),
            delegation: DelegationLog::new(),
            locks: HashMap::new(),
            owner_delegatee: HashMap::new(),
            next_id: 1,
            total_locked: 0,
            liquidations_enabled: false,
            entered: false,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle operations
    // ------------------------------------------------------------------

    /// Lock `amount` grains until `unlock_time` (rounded down to a week
    /// boundary), minting a new lock id registered under the caller's
    /// current delegatee.
    pub fn create_lock(
        &mut self,
        caller: Address,
        amount: u64,
        unlock_time: u64,
        moment: Moment,
    ) -> Result<LockId, TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            if amount == 0 {
                return Err(LockError::ZeroAmount.into());
            }
            let end = validate_new_end(unlock_time, moment.timestamp)?;
            let have = this.token.balance_of(&caller);
            if have < amount {
                return Err(TokenError::InsufficientFunds { have, need: amount }.into());
            }
            let total = this
                .total_locked
                .checked_add(amount)
                .ok_or(LockError::ValueOverflow)?;
            let delegatee = *this.owner_delegatee.get(&caller).unwrap_or(&caller);
            this.delegation.pushable(&delegatee, moment.timestamp)?;

            let id = LockId(this.next_id);
            let locked = LockedBalance { amount, end };
            this.ledger.checkpoint(
                Some(&LockChange { id, old: LockedBalance::ZERO, new: locked }),
                moment,
            )?;
            this.next_id += 1;
            this.total_locked = total;
            this.locks.insert(
                id,
                LockRecord { owner: caller, approved: None, delegatee, voted: false, locked },
            );
            this.delegation
                .push(delegatee, SetOp::Add, &[id], moment.timestamp)?;
            this.token.transfer(&caller, &this.config.vault, amount)?;
            info!(lock = %id, owner = %caller, amount, end, "created lock");
            Ok(id)
        })
    }

    /// Add `amount` grains to an existing, unexpired lock. Delegation
    /// is untouched.
    pub fn increase_amount(
        &mut self,
        caller: Address,
        id: LockId,
        amount: u64,
        moment: Moment,
    ) -> Result<(), TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            if amount == 0 {
                return Err(LockError::ZeroAmount.into());
            }
            let old = this.require_auth(id, &caller)?.locked;
            if old.is_expired(moment.timestamp) {
                return Err(LockError::Expired { lock: id.0, end: old.end }.into());
            }
            let new_amount = old
                .amount
                .checked_add(amount)
                .ok_or(LockError::ValueOverflow)?;
            let have = this.token.balance_of(&caller);
            if have < amount {
                return Err(TokenError::InsufficientFunds { have, need: amount }.into());
            }
            let total = this
                .total_locked
                .checked_add(amount)
                .ok_or(LockError::ValueOverflow)?;

            let new = LockedBalance { amount: new_amount, end: old.end };
            this.ledger
                .checkpoint(Some(&LockChange { id, old, new }), moment)?;
            this.set_locked(id, new)?;
            this.total_locked = total;
            this.token.transfer(&caller, &this.config.vault, amount)?;
            info!(lock = %id, amount, "increased lock amount");
            Ok(())
        })
    }

    /// Push an unexpired lock's expiry out to `unlock_time` (week
    /// rounded, strictly later than the current end, at most the
    /// maximum duration from now).
    pub fn increase_unlock_time(
        &mut self,
        caller: Address,
        id: LockId,
        unlock_time: u64,
        moment: Moment,
    ) -> Result<(), TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            let old = this.require_auth(id, &caller)?.locked;
            if old.is_expired(moment.timestamp) {
                return Err(LockError::Expired { lock: id.0, end: old.end }.into());
            }
            let new_end = validate_new_end(unlock_time, moment.timestamp)?;
            if new_end <= old.end {
                return Err(LockError::ExtensionNotLater {
                    new_end,
                    current_end: old.end,
                }
                .into());
            }

            let new = LockedBalance { amount: old.amount, end: new_end };
            this.ledger
                .checkpoint(Some(&LockChange { id, old, new }), moment)?;
            this.set_locked(id, new)?;
            info!(lock = %id, end = new_end, "extended lock");
            Ok(())
        })
    }

    /// Withdraw an expired lock's principal and burn the lock.
    ///
    /// Returns the amount paid out.
    pub fn withdraw(
        &mut self,
        caller: Address,
        id: LockId,
        moment: Moment,
    ) -> Result<u64, TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            let record = this.require_auth(id, &caller)?;
            let (old, owner, delegatee, voted) =
                (record.locked, record.owner, record.delegatee, record.voted);
            if voted {
                return Err(LockError::VotedLock(id.0).into());
            }
            if !old.is_expired(moment.timestamp) {
                return Err(LockError::NotExpired { lock: id.0, end: old.end }.into());
            }
            this.delegation.pushable(&delegatee, moment.timestamp)?;

            this.ledger.checkpoint(
                Some(&LockChange { id, old, new: LockedBalance::ZERO }),
                moment,
            )?;
            this.delegation
                .push(delegatee, SetOp::Remove, &[id], moment.timestamp)?;
            this.burn(id, old.amount)?;
            this.token.transfer(&this.config.vault, &owner, old.amount)?;
            info!(lock = %id, amount = old.amount, "withdrew lock");
            Ok(old.amount)
        })
    }

    /// Fold lock `from` into lock `to`, burning `from`.
    ///
    /// The combined lock keeps the value-weighted average of the two
    /// expiries (integer division truncates downward, then floors to a
    /// week boundary). The principal is already held by the vault, so
    /// no tokens move.
    pub fn merge(
        &mut self,
        caller: Address,
        from: LockId,
        to: LockId,
        moment: Moment,
    ) -> Result<(), TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            if from == to {
                return Err(LockError::SelfMerge(from.0).into());
            }
            let f = this.require_auth(from, &caller)?;
            let (f_locked, f_delegatee, f_voted) = (f.locked, f.delegatee, f.voted);
            let t = this.require_auth(to, &caller)?;
            let (t_locked, t_voted) = (t.locked, t.voted);
            if f_voted {
                return Err(LockError::VotedLock(from.0).into());
            }
            if t_voted {
                return Err(LockError::VotedLock(to.0).into());
            }
            let now = moment.timestamp;
            if this.ledger.checkpointed_at(from, now) {
                return Err(LockError::SameInstantReplay(from.0).into());
            }
            if this.ledger.checkpointed_at(to, now) {
                return Err(LockError::SameInstantReplay(to.0).into());
            }
            if f_locked.is_expired(now) {
                return Err(LockError::Expired { lock: from.0, end: f_locked.end }.into());
            }
            if t_locked.is_expired(now) {
                return Err(LockError::Expired { lock: to.0, end: t_locked.end }.into());
            }
            let combined = f_locked
                .amount
                .checked_add(t_locked.amount)
                .ok_or(LockError::ValueOverflow)?;
            let weighted = (f_locked.amount as u128 * f_locked.end as u128
                + t_locked.amount as u128 * t_locked.end as u128)
                / combined as u128;
            let end = curve::floor_to_week(weighted as u64);
            this.delegation.pushable(&f_delegatee, now)?;

            this.ledger.checkpoint(
                Some(&LockChange { id: from, old: f_locked, new: LockedBalance::ZERO }),
                moment,
            )?;
            let new = LockedBalance { amount: combined, end };
            this.ledger.checkpoint(
                Some(&LockChange { id: to, old: t_locked, new }),
                moment,
            )?;
            this.delegation
                .push(f_delegatee, SetOp::Remove, &[from], now)?;
            this.locks.remove(&from);
            this.set_locked(to, new)?;
            info!(%from, %to, amount = combined, end, "merged locks");
            Ok(())
        })
    }

    /// Carve `extracted` grains out of a lock into a new sibling lock
    /// with the same expiry and delegatee.
    ///
    /// Returns the sibling's id.
    pub fn split(
        &mut self,
        caller: Address,
        id: LockId,
        extracted: u64,
        moment: Moment,
    ) -> Result<LockId, TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            let record = this.require_auth(id, &caller)?;
            let (old, owner, delegatee, voted) =
                (record.locked, record.owner, record.delegatee, record.voted);
            if voted {
                return Err(LockError::VotedLock(id.0).into());
            }
            if old.is_expired(moment.timestamp) {
                return Err(LockError::Expired { lock: id.0, end: old.end }.into());
            }
            if extracted == 0 {
                return Err(LockError::ZeroAmount.into());
            }
            if extracted >= old.amount {
                return Err(LockError::SplitTooLarge { extracted, amount: old.amount }.into());
            }
            this.delegation.pushable(&delegatee, moment.timestamp)?;

            let reduced = LockedBalance { amount: old.amount - extracted, end: old.end };
            let sibling = LockedBalance { amount: extracted, end: old.end };
            this.ledger
                .checkpoint(Some(&LockChange { id, old, new: reduced }), moment)?;
            let sibling_id = LockId(this.next_id);
            this.ledger.checkpoint(
                Some(&LockChange { id: sibling_id, old: LockedBalance::ZERO, new: sibling }),
                moment,
            )?;
            this.next_id += 1;
            this.set_locked(id, reduced)?;
            this.locks.insert(
                sibling_id,
                LockRecord {
                    owner,
                    approved: None,
                    delegatee,
                    voted: false,
                    locked: sibling,
                },
            );
            this.delegation
                .push(delegatee, SetOp::Add, &[sibling_id], moment.timestamp)?;
            info!(lock = %id, sibling = %sibling_id, extracted, "split lock");
            Ok(sibling_id)
        })
    }

    /// Exit a lock before expiry for a penalty proportional to its
    /// remaining (decayed) voting power; the penalty goes to the
    /// treasury. An already-expired lock liquidates as a plain
    /// withdrawal.
    ///
    /// Returns `(paid_to_owner, penalty)`.
    pub fn liquidate(
        &mut self,
        caller: Address,
        id: LockId,
        moment: Moment,
    ) -> Result<(u64, u64), TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            if !this.liquidations_enabled {
                return Err(LockError::LiquidationsDisabled.into());
            }
            let record = this.require_auth(id, &caller)?;
            let (old, owner, delegatee, voted) =
                (record.locked, record.owner, record.delegatee, record.voted);
            if voted {
                return Err(LockError::VotedLock(id.0).into());
            }
            this.delegation.pushable(&delegatee, moment.timestamp)?;

            // Remaining power is zero at or past expiry, so the penalty
            // vanishes and this degrades to a withdrawal.
            let remaining = this.ledger.value_at(id, moment.timestamp);
            let penalty = (remaining as u128 * this.config.penalty_bps as u128
                / BPS_PRECISION as u128) as u64;
            let paid = old
                .amount
                .checked_sub(penalty)
                .ok_or(LockError::ValueOverflow)?;

            this.ledger.checkpoint(
                Some(&LockChange { id, old, new: LockedBalance::ZERO }),
                moment,
            )?;
            this.delegation
                .push(delegatee, SetOp::Remove, &[id], moment.timestamp)?;
            this.burn(id, old.amount)?;
            this.token.transfer(&this.config.vault, &owner, paid)?;
            if penalty > 0 {
                this.token
                    .transfer(&this.config.vault, &this.config.treasury, penalty)?;
            }
            info!(lock = %id, paid, penalty, "liquidated lock");
            Ok((paid, penalty))
        })
    }

    /// Move all of the caller's locks to a new delegatee.
    ///
    /// Writes one removal checkpoint for the old delegatee and one
    /// addition checkpoint for the new, and records the preference for
    /// locks created later. Delegating to the current delegatee is a
    /// no-op.
    pub fn delegate(
        &mut self,
        caller: Address,
        new_delegatee: Address,
        moment: Moment,
    ) -> Result<(), TarnError> {
        self.guarded(|this| {
            this.ledger.ensure_monotonic(moment)?;
            let old = *this.owner_delegatee.get(&caller).unwrap_or(&caller);
            if old == new_delegatee {
                return Ok(());
            }
            let now = moment.timestamp;
            this.delegation.pushable(&old, now)?;
            this.delegation.pushable(&new_delegatee, now)?;

            let mut ids: Vec<LockId> = this
                .locks
                .iter()
                .filter(|(_, record)| record.owner == caller)
                .map(|(id, _)| *id)
                .collect();
            ids.sort_unstable();

            this.delegation.push(old, SetOp::Remove, &ids, now)?;
            this.delegation.push(new_delegatee, SetOp::Add, &ids, now)?;
            for id in &ids {
                if let Some(record) = this.locks.get_mut(id) {
                    record.delegatee = new_delegatee;
                }
            }
            this.owner_delegatee.insert(caller, new_delegatee);
            info!(owner = %caller, delegatee = %new_delegatee, moved = ids.len(), "delegated");
            Ok(())
        })
    }

    // ------------------------------------------------------------------
    // Policy and administration
    // ------------------------------------------------------------------

    /// Flag a lock as having voted in the current governance epoch.
    /// Voted locks refuse withdraw, merge, split, and liquidate until
    /// the flag is cleared. Only the configured voter may call this.
    pub fn set_voted(&mut self, caller: Address, id: LockId, voted: bool) -> Result<(), TarnError> {
        if caller != self.config.voter {
            return Err(LockError::Unauthorized(id.0).into());
        }
        let record = self
            .locks
            .get_mut(&id)
            .ok_or(LockError::UnknownLock(id.0))?;
        record.voted = voted;
        Ok(())
    }

    /// Approve `operator` to manage a lock alongside its owner.
    pub fn approve(&mut self, caller: Address, id: LockId, operator: Address) -> Result<(), TarnError> {
        let record = self
            .locks
            .get_mut(&id)
            .ok_or(LockError::UnknownLock(id.0))?;
        if record.owner != caller {
            return Err(LockError::Unauthorized(id.0).into());
        }
        record.approved = Some(operator);
        Ok(())
    }

    /// Clear a lock's approved operator.
    pub fn revoke_approval(&mut self, caller: Address, id: LockId) -> Result<(), TarnError> {
        let record = self
            .locks
            .get_mut(&id)
            .ok_or(LockError::UnknownLock(id.0))?;
        if record.owner != caller {
            return Err(LockError::Unauthorized(id.0).into());
        }
        record.approved = None;
        Ok(())
    }

    /// Flip the one-time liquidation switch. Irreversible; idempotent
    /// once set. Only the configured admin may call this.
    pub fn enable_liquidations(&mut self, caller: Address) -> Result<(), TarnError> {
        if caller != self.config.admin {
            return Err(LockError::Unauthorized(0).into());
        }
        self.liquidations_enabled = true;
        Ok(())
    }

    /// Advance the global checkpoint log to `moment` without a lock
    /// mutation. Hosts call this to keep the log warm so queries stay
    /// cheap and settled.
    pub fn checkpoint(&mut self, moment: Moment) -> Result<(), TarnError> {
        self.ledger.checkpoint(None, moment)
    }

    // ------------------------------------------------------------------
    // Read-only accessors
    // ------------------------------------------------------------------

    /// The ledger's settled "now": the latest checkpoint timestamp.
    pub fn now(&self) -> u64 {
        self.ledger.tip().timestamp
    }

    /// A live lock's principal and expiry.
    pub fn locked(&self, id: LockId) -> Option<LockedBalance> {
        self.locks.get(&id).map(|record| record.locked)
    }

    /// A live lock's current delegatee.
    pub fn delegatee_of(&self, id: LockId) -> Option<Address> {
        self.locks.get(&id).map(|record| record.delegatee)
    }

    /// Total principal currently locked, in grains.
    pub fn total_locked_supply(&self) -> u64 {
        self.total_locked
    }

    /// Whether the one-time liquidation switch has been flipped.
    pub fn liquidations_enabled(&self) -> bool {
        self.liquidations_enabled
    }

    /// The underlying decay ledger, for advanced queries.
    pub fn ledger(&self) -> &DecayLedger {
        &self.ledger
    }

    /// The delegation checkpoint store.
    pub fn delegation(&self) -> &DelegationLog {
        &self.delegation
    }

    /// The token backend.
    pub fn token(&self) -> &T {
        &self.token
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    /// Run `f` under the reentrancy guard: nested entry is rejected and
    /// the guard is released on every exit path, error or not.
    fn guarded<R>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<R, TarnError>,
    ) -> Result<R, TarnError> {
        if self.entered {
            return Err(LockError::Reentrancy.into());
        }
        self.entered = true;
        let result = f(self);
        self.entered = false;
        result
    }

    /// Fetch a live lock the caller owns or is approved for.
    fn require_auth(&self, id: LockId, caller: &Address) -> Result<&LockRecord, LockError> {
        let record = self.locks.get(&id).ok_or(LockError::UnknownLock(id.0))?;
        if record.owner != *caller && record.approved.as_ref() != Some(caller) {
            return Err(LockError::Unauthorized(id.0));
        }
        Ok(record)
    }

    fn set_locked(&mut self, id: LockId, locked: LockedBalance) -> Result<(), LockError> {
        self.locks
            .get_mut(&id)
            .ok_or(LockError::UnknownLock(id.0))?
            .locked = locked;
        Ok(())
    }

    /// Drop a terminated lock from the live table and the total.
    fn burn(&mut self, id: LockId, amount: u64) -> Result<(), LockError> {
        self.locks.remove(&id);
        self.total_locked = self
            .total_locked
            .checked_sub(amount)
            .ok_or(LockError::ValueOverflow)?;
        Ok(())
    }
}

/// Round `unlock_time` down to a week boundary and bound it to
/// `(now, now + MAX_LOCK_DURATION]`.
fn validate_new_end(unlock_time: u64, now: u64) -> Result<u64, LockError> {
    let end = curve::floor_to_week(unlock_time);
    if end <= now {
        return Err(LockError::DurationTooShort { end, now });
    }
    let max_end = now
        .checked_add(MAX_LOCK_DURATION)
        .ok_or(LockError::ValueOverflow)?;
    if end > max_end {
        return Err(LockError::DurationTooLong { end, max_end });
    }
    Ok(end)
}

// ----------------------------------------------------------------------
// Collaborator-facing trait impls
// ----------------------------------------------------------------------

impl<T: TokenBackend> VotingPowerSource for Escrow<T> {
    fn current_voting_power(&self, delegatee: &Address) -> Result<u64, QueryError> {
        let now = self.now();
        let mut total: u64 = 0;
        for id in self.delegation.latest_set(delegatee) {
            total = total
                .checked_add(self.ledger.value_at(*id, now))
                .ok_or(QueryError::ValueOverflow)?;
        }
        Ok(total)
    }

    fn voting_power_at(&self, delegatee: &Address, timestamp: u64) -> Result<u64, QueryError> {
        let now = self.now();
        if timestamp >= now {
            return Err(QueryError::FutureLookup { requested: timestamp, now });
        }
        let mut total: u64 = 0;
        for id in self.delegation.set_at_or_before(delegatee, timestamp) {
            total = total
                .checked_add(self.ledger.value_at(*id, timestamp))
                .ok_or(QueryError::ValueOverflow)?;
        }
        Ok(total)
    }

    fn aggregate_voting_power_at(&self, timestamp: u64) -> Result<u64, QueryError> {
        self.ledger.aggregate_at(timestamp)
    }
}

impl<T: TokenBackend> LockReader for Escrow<T> {
    fn owner_of(&self, lock: LockId) -> Option<Address> {
        self.locks.get(&lock).map(|record| record.owner)
    }

    fn locked_value_and_end(&self, lock: LockId) -> Option<(u64, u64)> {
        self.locks
            .get(&lock)
            .map(|record| (record.locked.amount, record.locked.end))
    }

    fn value_at(&self, lock: LockId, timestamp: u64) -> Result<u64, QueryError> {
        Ok(self.ledger.value_at(lock, timestamp))
    }

    fn value_at_block(&self, lock: LockId, block: u64) -> Result<u64, QueryError> {
        self.ledger.value_at_block(lock, block)
    }
}
