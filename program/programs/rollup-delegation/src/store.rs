//! Base-layer account storage.
//!
//! Accounts are addressed by a program-derived address computed from the
//! owner's key, so any party can locate an owner's account without a lookup
//! table.

use std::collections::HashMap;

use solana_sdk::pubkey::Pubkey;

use crate::errors::{DelegationError, Result};
use crate::state::UserAccount;

/// Derive the user account address for `owner`. Seeds: `["user", owner]`.
pub fn derive_user_account(program_id: &Pubkey, owner: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(&[UserAccount::SEED_PREFIX, owner.as_ref()], program_id)
}

/// Keyed storage for user accounts.
///
/// Implementations only store; authority checks belong to the handlers.
pub trait AccountStore {
    /// Insert a new record. Fails if the address is already occupied.
    fn create(&mut self, address: Pubkey, account: UserAccount) -> Result<()>;

    fn get(&self, address: &Pubkey) -> Result<&UserAccount>;

    fn get_mut(&mut self, address: &Pubkey) -> Result<&mut UserAccount>;

    /// Delete a record, returning it.
    fn remove(&mut self, address: &Pubkey) -> Result<UserAccount>;

    fn contains(&self, address: &Pubkey) -> bool;
}

/// `HashMap`-backed store used by tests and the local backend.
#[derive(Debug, Default)]
pub struct InMemoryAccountStore {
    accounts: HashMap<Pubkey, UserAccount>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }
}

impl AccountStore for InMemoryAccountStore {
    fn create(&mut self, address: Pubkey, account: UserAccount) -> Result<()> {
        if self.accounts.contains_key(&address) {
            return Err(DelegationError::InvalidStateTransition);
        }
        self.accounts.insert(address, account);
        Ok(())
    }

    fn get(&self, address: &Pubkey) -> Result<&UserAccount> {
        self.accounts
            .get(address)
            .ok_or(DelegationError::AccountNotFound)
    }

    fn get_mut(&mut self, address: &Pubkey) -> Result<&mut UserAccount> {
        self.accounts
            .get_mut(address)
            .ok_or(DelegationError::AccountNotFound)
    }

    fn remove(&mut self, address: &Pubkey) -> Result<UserAccount> {
        self.accounts
            .remove(address)
            .ok_or(DelegationError::AccountNotFound)
    }

    fn contains(&self, address: &Pubkey) -> bool {
        self.accounts.contains_key(address)
    }
}
