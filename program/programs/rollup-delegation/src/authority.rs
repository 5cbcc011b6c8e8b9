//! Ownership authority: arbitrates which execution context may write an
//! account.
//!
//! Per account this is a two-state machine, `Undelegated <-> Delegated`, with
//! `delegate` and `undelegate` as the only edges. The authority exclusively
//! owns the [`DelegationRecord`] for each delegated account.

use std::collections::HashMap;

use solana_sdk::pubkey::Pubkey;

use crate::errors::{DelegationError, Result};
use crate::events::OwnershipChanged;
use crate::state::{AuthorityState, DelegationRecord, UserAccount};

#[derive(Debug, Default)]
pub struct OwnershipAuthority {
    records: HashMap<Pubkey, DelegationRecord>,
}

impl OwnershipAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand write authority over `account` to `validator`.
    ///
    /// Only the owner may delegate. The validator's working copy starts from
    /// the base-layer data and sequence.
    pub fn delegate(
        &mut self,
        address: Pubkey,
        account: &mut UserAccount,
        signer: &Pubkey,
        validator: Pubkey,
        slot: u64,
    ) -> Result<OwnershipChanged> {
        if *signer != account.owner {
            return Err(DelegationError::PermissionDenied);
        }
        if account.authority.is_delegated() {
            return Err(DelegationError::AlreadyDelegated);
        }
        if validator == Pubkey::default() {
            return Err(DelegationError::ZeroAddressNotAllowed);
        }

        self.records.insert(
            address,
            DelegationRecord {
                account: address,
                validator,
                delegated_slot: slot,
                ephemeral_data: account.data,
                last_issued_sequence: account.last_applied_sequence,
            },
        );

        let previous = account.authority;
        account.authority = AuthorityState::Delegated(validator);

        Ok(OwnershipChanged {
            account: address,
            previous,
            current: account.authority,
        })
    }

    /// Return write authority over `account` to the base layer.
    ///
    /// Either the owner or the designated validator may undelegate, and only
    /// once every issued checkpoint has been applied.
    pub fn undelegate(
        &mut self,
        address: Pubkey,
        account: &mut UserAccount,
        signer: &Pubkey,
    ) -> Result<OwnershipChanged> {
        let AuthorityState::Delegated(validator) = account.authority else {
            return Err(DelegationError::InvalidStateTransition);
        };
        if *signer != account.owner && *signer != validator {
            return Err(DelegationError::PermissionDenied);
        }

        let record = self
            .records
            .get(&address)
            .ok_or(DelegationError::InvalidStateTransition)?;
        if record.last_issued_sequence > account.last_applied_sequence {
            return Err(DelegationError::UncommittedState);
        }

        self.records.remove(&address);
        let previous = account.authority;
        account.authority = AuthorityState::Undelegated;

        Ok(OwnershipChanged {
            account: address,
            previous,
            current: account.authority,
        })
    }

    pub fn record(&self, address: &Pubkey) -> Option<&DelegationRecord> {
        self.records.get(address)
    }

    pub(crate) fn record_mut(&mut self, address: &Pubkey) -> Option<&mut DelegationRecord> {
        self.records.get_mut(address)
    }

    /// Number of accounts currently delegated.
    pub fn delegated_count(&self) -> usize {
        self.records.len()
    }
}
