use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::errors::{DelegationError, Result};
use crate::events::{AccountUpdated, ProgramEvent};
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Set `data` on the base layer.
///
/// Owner only, and only while undelegated: once a validator holds authority
/// the base-layer copy is read-only and a direct update is `PermissionDenied`
/// rather than a merge.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    user: &Keypair,
    address: &Pubkey,
    new_data: u64,
) -> Result<()> {
    let slot = program.next_slot()?;
    let account = program.store.get_mut(address)?;

    if user.pubkey() != account.owner || account.authority.is_delegated() {
        return Err(DelegationError::PermissionDenied);
    }

    account.data = new_data;

    info!(account = %address, data = new_data, "User account updated");
    program.finish(
        slot,
        [ProgramEvent::AccountUpdated(AccountUpdated {
            account: *address,
            data: new_data,
        })],
    );
    Ok(())
}
