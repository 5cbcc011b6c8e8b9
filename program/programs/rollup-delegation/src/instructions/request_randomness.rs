use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::errors::{DelegationError, Result};
use crate::events::{ProgramEvent, RandomnessRequested};
use crate::randomness::caller_seed;
use crate::state::RandomnessRequest;
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Record a randomness request against the signer's account.
///
/// Allowed whether the account is delegated or not; the authority state at
/// issuance is stored on the request but never consulted again. Returns
/// immediately with the request `Pending`.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    user: &Keypair,
    address: &Pubkey,
    client_seed: u8,
) -> Result<RandomnessRequest> {
    let slot = program.next_slot()?;
    let requester = user.pubkey();
    let account = program.store.get(address)?;

    if requester != account.owner {
        return Err(DelegationError::PermissionDenied);
    }

    let seed = caller_seed(client_seed);
    let request = program
        .randomness
        .open(*address, requester, seed, account.authority, slot)?;

    info!(
        request_id = request.request_id,
        account = %address,
        queue = %program.config.oracle_queue,
        delegated = request.requester_context.is_delegated(),
        "Randomness requested"
    );
    program.finish(
        slot,
        [ProgramEvent::RandomnessRequested(RandomnessRequested {
            request_id: request.request_id,
            account: *address,
            requester,
            seed,
            request_slot: slot,
        })],
    );
    Ok(request)
}
