use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::checkpoint::CommitCheckpoint;
use crate::errors::{DelegationError, Result};
use crate::events::{CheckpointCommitted, ProgramEvent};
use crate::state::{AuthorityState, Mutation};
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Apply `mutation` to the validator's working copy and issue the next
/// checkpoint.
///
/// 1. The account must be delegated (`InvalidStateTransition`) to the signer
///    (`PermissionDenied`).
/// 2. `expected_prev_seq` must equal the last issued sequence
///    (`OutOfOrderCheckpoint`).
/// 3. The checkpoint binds validator, account, sequence and payload hash
///    under the validator's signature.
///
/// The base-layer record is untouched until the checkpoint is applied.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    validator: &Keypair,
    address: &Pubkey,
    mutation: Mutation,
    expected_prev_seq: u64,
) -> Result<CommitCheckpoint> {
    let slot = program.next_slot()?;
    let account = program.store.get(address)?;

    let AuthorityState::Delegated(designated) = account.authority else {
        return Err(DelegationError::InvalidStateTransition);
    };
    if validator.pubkey() != designated {
        return Err(DelegationError::PermissionDenied);
    }

    let record = program
        .authority
        .record_mut(address)
        .ok_or(DelegationError::InvalidStateTransition)?;
    if expected_prev_seq != record.last_issued_sequence {
        return Err(DelegationError::OutOfOrderCheckpoint);
    }

    let data = mutation.apply(record.ephemeral_data)?;
    let sequence = record
        .last_issued_sequence
        .checked_add(1)
        .ok_or(DelegationError::CounterOverflow)?;

    let checkpoint = CommitCheckpoint::sign(validator, *address, sequence, data);
    record.ephemeral_data = data;
    record.last_issued_sequence = sequence;

    info!(
        account = %address,
        validator = %designated,
        sequence,
        data,
        "Checkpoint committed"
    );
    program.finish(
        slot,
        [ProgramEvent::CheckpointCommitted(CheckpointCommitted {
            checkpoint: checkpoint.clone(),
        })],
    );
    Ok(checkpoint)
}
