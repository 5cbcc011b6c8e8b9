use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::errors::{DelegationError, Result};
use crate::events::{AccountInitialized, ProgramEvent};
use crate::state::UserAccount;
use crate::store::{derive_user_account, AccountStore};
use crate::DelegationProgram;

/// Create the signer's user account at `["user", owner]`.
///
/// The account starts undelegated with `data = 0` and `random_value = 0`.
/// Fails with `InvalidStateTransition` if the account already exists.
pub fn handler<S: AccountStore>(program: &mut DelegationProgram<S>, user: &Keypair) -> Result<Pubkey> {
    let owner = user.pubkey();
    let (address, bump) = derive_user_account(&program.config.program_id, &owner);
    if program.store.contains(&address) {
        return Err(DelegationError::InvalidStateTransition);
    }
    let slot = program.next_slot()?;

    program.store.create(address, UserAccount::new(owner, bump))?;

    info!(account = %address, owner = %owner, "User account initialized");
    program.finish(
        slot,
        [ProgramEvent::AccountInitialized(AccountInitialized {
            account: address,
            owner,
        })],
    );
    Ok(address)
}
