//! # tarn-escrow — checkpointed voting-escrow decay ledger.
//!
//! All curve arithmetic is integer-only for determinism.
//!
//! Users lock TARN for a bounded duration in exchange for time-decaying
//! voting power. This crate implements the ledger that accounts for it:
//! - **Decay curve primitive**: bias/slope points projected linearly in time.
//! - **Checkpoint algorithm**: weekly-stepped catch-up of the aggregate
//!   curve with scheduled slope drops as locks expire, plus per-lock
//!   checkpoint histories.
//! - **Historical queries**: binary search over both checkpoint logs for
//!   "as of time T" and "as of block B" answers.
//! - **Delegation checkpoints**: a time-indexed array-of-sets store
//!   mapping each delegatee to the lock ids it tallies for.
//! - **Lock lifecycle**: create, top-up, extend, withdraw, merge, split,
//!   liquidate, delegate.

pub mod checkpoint;
pub mod curve;
pub mod delegation;
pub mod escrow;
pub mod query;
pub mod token;

pub use checkpoint::{DecayLedger, LockChange};
pub use delegation::{DelegationLog, SetOp};
pub use escrow::{Escrow, EscrowConfig};
pub use token::{MemoryToken, TokenBackend};
