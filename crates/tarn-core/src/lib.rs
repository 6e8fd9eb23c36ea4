//! # tarn-core
//! Foundation types and traits for the Tarn voting-escrow ledger.

pub mod constants;
pub mod error;
pub mod traits;
pub mod types;
