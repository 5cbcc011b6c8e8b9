use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::errors::Result;
use crate::events::ProgramEvent;
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Return authority to the base layer.
///
/// Signed by the owner or the designated validator. Every checkpoint the
/// validator issued must already be applied, otherwise `UncommittedState`.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    signer: &Keypair,
    address: &Pubkey,
) -> Result<()> {
    let slot = program.next_slot()?;
    let account = program.store.get_mut(address)?;

    let changed = program
        .authority
        .undelegate(*address, account, &signer.pubkey())?;

    info!(account = %address, data = account.data, "Account undelegated");
    program.finish(slot, [ProgramEvent::OwnershipChanged(changed)]);
    Ok(())
}
