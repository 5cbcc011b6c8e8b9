use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};
use tracing::info;

use crate::checkpoint::CommitCheckpoint;
use crate::errors::{DelegationError, Result};
use crate::events::{CheckpointApplied, CheckpointCommitted, ProgramEvent};
use crate::state::{AuthorityState, Mutation};
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Commit a final mutation, write it to the base layer, and return
/// authority, all in one transaction.
///
/// Validator only. Earlier checkpoints must already be applied
/// (`UncommittedState`); the final one never leaves the transaction, so
/// nothing is left for a relay to deliver.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    validator: &Keypair,
    address: &Pubkey,
    mutation: Mutation,
) -> Result<CommitCheckpoint> {
    let slot = program.next_slot()?;
    let signer = validator.pubkey();
    let account = program.store.get_mut(address)?;

    let AuthorityState::Delegated(designated) = account.authority else {
        return Err(DelegationError::InvalidStateTransition);
    };
    if signer != designated {
        return Err(DelegationError::PermissionDenied);
    }

    let record = program
        .authority
        .record(address)
        .ok_or(DelegationError::InvalidStateTransition)?;
    if record.last_issued_sequence > account.last_applied_sequence {
        return Err(DelegationError::UncommittedState);
    }

    let data = mutation.apply(record.ephemeral_data)?;
    let sequence = record
        .last_issued_sequence
        .checked_add(1)
        .ok_or(DelegationError::CounterOverflow)?;
    let checkpoint = CommitCheckpoint::sign(validator, *address, sequence, data);

    if let Some(record) = program.authority.record_mut(address) {
        record.ephemeral_data = data;
        record.last_issued_sequence = sequence;
    }
    account.data = data;
    account.last_applied_sequence = sequence;

    let changed = program.authority.undelegate(*address, account, &signer)?;

    info!(account = %address, sequence, data, "Committed and undelegated");
    program.finish(
        slot,
        [
            ProgramEvent::CheckpointCommitted(CheckpointCommitted {
                checkpoint: checkpoint.clone(),
            }),
            ProgramEvent::CheckpointApplied(CheckpointApplied {
                account: *address,
                sequence,
                data,
            }),
            ProgramEvent::OwnershipChanged(changed),
        ],
    );
    Ok(checkpoint)
}
