use solana_sdk::instruction::Instruction;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::errors::Result;
use crate::events::{ProgramEvent, RandomnessFulfilled};
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Oracle callback for a pending request.
///
/// 1. Checks the oracle capability: signer and Ed25519 proof over
///    `request_id || randomness`.
/// 2. Rejects a second delivery with `AlreadyFulfilled`, including one for a
///    request that was fulfilled and then pruned.
/// 3. Writes `random_value` straight into the account. This bypasses the
///    owner/validator authority check on purpose: the oracle's write
///    capability is independent of where the account currently resides.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    oracle: &Keypair,
    request_id: u64,
    randomness: [u8; 32],
    proof: &Instruction,
) -> Result<u64> {
    let slot = program.next_slot()?;
    let writer = program.randomness.capability().authorize(
        &oracle.pubkey(),
        proof,
        request_id,
        &randomness,
    )?;

    let address = program.randomness.pending_request(request_id)?.account;
    let account = program.store.get_mut(&address)?;

    program.randomness.settle(request_id, randomness, slot)?;
    let random_value = writer.write(account, &randomness);

    info!(
        request_id,
        account = %address,
        random_value,
        "Randomness fulfilled"
    );
    program.finish(
        slot,
        [ProgramEvent::RandomnessFulfilled(RandomnessFulfilled {
            request_id,
            account: address,
            random_value,
        })],
    );
    Ok(random_value)
}
