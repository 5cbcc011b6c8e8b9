use tracing::{debug, info};

use crate::checkpoint::CommitCheckpoint;
use crate::errors::{DelegationError, Result};
use crate::events::{CheckpointApplied, ProgramEvent};
use crate::state::AuthorityState;
use crate::store::AccountStore;
use crate::DelegationProgram;

/// Result of relaying a checkpoint to the base layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The checkpoint advanced the account.
    Applied,
    /// The sequence was already applied; nothing changed.
    Replayed,
}

/// Write a checkpoint into the base-layer record.
///
/// 1. Verifies the payload hash and validator signature.
/// 2. A sequence at or below `last_applied_sequence` is a silent no-op, so
///    relays may retry freely.
/// 3. Otherwise the signer must be the validator currently holding authority
///    and the sequence must be exactly `last_applied_sequence + 1`. There is
///    no reordering buffer: early checkpoints fail with
///    `OutOfOrderCheckpoint` and must be resent by the relay.
/// 4. The validator's working copy is brought up to the applied checkpoint
///    when it is behind, so a checkpoint signed outside `commit` is never
///    overwritten by the next commit and never blocks undelegation.
pub fn handler<S: AccountStore>(
    program: &mut DelegationProgram<S>,
    checkpoint: &CommitCheckpoint,
) -> Result<ApplyOutcome> {
    checkpoint.verify()?;

    let slot = program.next_slot()?;
    let account = program.store.get_mut(&checkpoint.account)?;

    if checkpoint.sequence <= account.last_applied_sequence {
        debug!(
            account = %checkpoint.account,
            sequence = checkpoint.sequence,
            last_applied = account.last_applied_sequence,
            "Checkpoint already applied"
        );
        return Ok(ApplyOutcome::Replayed);
    }

    match account.authority {
        AuthorityState::Delegated(validator) if validator == checkpoint.validator => {}
        AuthorityState::Delegated(_) => return Err(DelegationError::PermissionDenied),
        AuthorityState::Undelegated => return Err(DelegationError::InvalidStateTransition),
    }

    if checkpoint.sequence != account.last_applied_sequence + 1 {
        return Err(DelegationError::OutOfOrderCheckpoint);
    }
    let record = program
        .authority
        .record_mut(&checkpoint.account)
        .ok_or(DelegationError::InvalidStateTransition)?;

    account.data = checkpoint.data;
    account.last_applied_sequence = checkpoint.sequence;
    if checkpoint.sequence > record.last_issued_sequence {
        record.last_issued_sequence = checkpoint.sequence;
        record.ephemeral_data = checkpoint.data;
    }

    info!(
        account = %checkpoint.account,
        sequence = checkpoint.sequence,
        data = checkpoint.data,
        "Checkpoint applied"
    );
    program.finish(
        slot,
        [ProgramEvent::CheckpointApplied(CheckpointApplied {
            account: checkpoint.account,
            sequence: checkpoint.sequence,
            data: checkpoint.data,
        })],
    );
    Ok(ApplyOutcome::Applied)
}
