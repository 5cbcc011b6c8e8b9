use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::errors::Result;
use crate::events::ProgramEvent;
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Delegate the account to `validator` on the ephemeral layer.
///
/// Fails with `PermissionDenied` unless signed by the owner and with
/// `AlreadyDelegated` if a validator already holds authority.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    user: &Keypair,
    address: &Pubkey,
    validator: Pubkey,
) -> Result<()> {
    let slot = program.next_slot()?;
    let account = program.store.get_mut(address)?;

    let changed = program
        .authority
        .delegate(*address, account, &user.pubkey(), validator, slot)?;

    info!(account = %address, validator = %validator, "Account delegated");
    program.finish(slot, [ProgramEvent::OwnershipChanged(changed)]);
    Ok(())
}
