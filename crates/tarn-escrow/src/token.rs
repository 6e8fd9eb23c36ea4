//! Token backend seam.
//!
//! The underlying fungible token is an external collaborator. The
//! escrow only needs to move principal between the caller, its own
//! vault, and the treasury; [`TokenBackend`] is that narrow surface.
//! [`MemoryToken`] backs tests and the scenario runner.

use std::collections::HashMap;

use tarn_core::error::TokenError;
use tarn_core::types::Address;

/// Minimal fungible-token operations the escrow relies on.
pub trait TokenBackend: Send + Sync {
    /// Move `amount` grains from `from` to `to`.
    ///
    /// # Errors
    ///
    /// [`TokenError::InsufficientFunds`] when `from` cannot cover the
    /// amount; [`TokenError::ValueOverflow`] if the credit would wrap.
    fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), TokenError>;

    /// Current balance of `who` in grains.
    fn balance_of(&self, who: &Address) -> u64;
}

/// In-memory token ledger for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct MemoryToken {
    balances: HashMap<Address, u64>,
}

impl MemoryToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credit freshly minted grains to `to`.
    pub fn mint(&mut self, to: Address, amount: u64) -> Result<(), TokenError> {
        let balance = self.balances.entry(to).or_insert(0);
        *balance = balance.checked_add(amount).ok_or(TokenError::ValueOverflow)?;
        Ok(())
    }
}

impl TokenBackend for MemoryToken {
    fn transfer(&mut self, from: &Address, to: &Address, amount: u64) -> Result<(), TokenError> {
        let have = self.balance_of(from);
        if have < amount {
            return Err(TokenError::InsufficientFunds { have, need: amount });
        }
        if from == to {
            return Ok(());
        }
        let credited = self
            .balance_of(to)
            .checked_add(amount)
            .ok_or(TokenError::ValueOverflow)?;
        self.balances.insert(*from, have - amount);
        self.balances.insert(*to, credited);
        Ok(())
    }

    fn balance_of(&self, who: &Address) -> u64 {
        *self.balances.get(who).unwrap_or(&0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(seed: u8) -> Address {
        Address([seed; 20])
    }

    #[test]
    fn mint_and_transfer() {
        let mut token = MemoryToken::new();
        token.mint(addr(1), 1000).unwrap();
        token.transfer(&addr(1), &addr(2), 400).unwrap();
        assert_eq!(token.balance_of(&addr(1)), 600);
        assert_eq!(token.balance_of(&addr(2)), 400);
    }

    #[test]
    fn transfer_insufficient_fails() {
        let mut token = MemoryToken::new();
        token.mint(addr(1), 100).unwrap();
        let err = token.transfer(&addr(1), &addr(2), 101).unwrap_err();
        assert_eq!(err, TokenError::InsufficientFunds { have: 100, need: 101 });
        // Balances untouched.
        assert_eq!(token.balance_of(&addr(1)), 100);
        assert_eq!(token.balance_of(&addr(2)), 0);
    }

    #[test]
    fn self_transfer_preserves_balance() {
        let mut token = MemoryToken::new();
        token.mint(addr(1), 100).unwrap();
        token.transfer(&addr(1), &addr(1), 60).unwrap();
        assert_eq!(token.balance_of(&addr(1)), 100);
    }

    #[test]
    fn mint_overflow_fails() {
        let mut token = MemoryToken::new();
        token.mint(addr(1), u64::MAX).unwrap();
        assert_eq!(token.mint(addr(1), 1).unwrap_err(), TokenError::ValueOverflow);
    }
}
