use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::errors::{DelegationError, Result};
use crate::events::{AccountClosed, ProgramEvent};
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Destroy the account and reclaim its storage. Terminal.
///
/// A delegated account cannot be closed by anyone; otherwise owner only. Pending randomness
/// requests for the account stay pending and can no longer be fulfilled.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    user: &Keypair,
    address: &Pubkey,
) -> Result<()> {
    let slot = program.next_slot()?;
    let account = program.store.get(address)?;

    if account.authority.is_delegated() {
        return Err(DelegationError::InvalidStateTransition);
    }
    if user.pubkey() != account.owner {
        return Err(DelegationError::PermissionDenied);
    }

    let closed = program.store.remove(address)?;

    info!(account = %address, "User account closed");
    program.finish(
        slot,
        [ProgramEvent::AccountClosed(AccountClosed {
            account: *address,
            owner: closed.owner,
        })],
    );
    Ok(())
}
