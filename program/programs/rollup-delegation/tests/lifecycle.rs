use std::sync::{Arc, Mutex};
use std::thread;

use rollup_delegation::checkpoint::CommitCheckpoint;
use rollup_delegation::config::ProgramConfig;
use rollup_delegation::ed25519::{build_signature_proof, fulfillment_message};
use rollup_delegation::errors::DelegationError;
use rollup_delegation::events::ProgramEvent;
use rollup_delegation::instructions::ApplyOutcome;
use rollup_delegation::state::{AuthorityState, Mutation, RequestStatus};
use rollup_delegation::DelegationProgram;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signer};

struct Harness {
    program: DelegationProgram,
    oracle: Keypair,
    owner: Keypair,
    validator: Keypair,
    account: Pubkey,
}

fn setup() -> Harness {
    let oracle = Keypair::new();
    let config = ProgramConfig::new(Pubkey::new_unique(), oracle.pubkey(), Pubkey::new_unique());
    let mut program = DelegationProgram::new(config).unwrap();
    let owner = Keypair::new();
    let account = program.initialize(&owner).unwrap();
    Harness {
        program,
        oracle,
        owner,
        validator: Keypair::new(),
        account,
    }
}

fn randomness_for(value: u64) -> [u8; 32] {
    let mut randomness = [0xABu8; 32];
    randomness[..8].copy_from_slice(&value.to_le_bytes());
    randomness
}

fn fulfill(h: &mut Harness, request_id: u64, value: u64) -> Result<u64, DelegationError> {
    let randomness = randomness_for(value);
    let proof = build_signature_proof(&h.oracle, &fulfillment_message(request_id, &randomness));
    h.program
        .fulfill_randomness(&h.oracle, request_id, randomness, &proof)
}

#[test]
fn full_lifecycle_scenario() {
    let mut h = setup();
    assert_eq!(h.program.account(&h.account).unwrap().data, 0);

    h.program.update(&h.owner, &h.account, 42).unwrap();
    assert_eq!(h.program.account(&h.account).unwrap().data, 42);

    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    assert_eq!(
        h.program.account(&h.account).unwrap().authority,
        AuthorityState::Delegated(h.validator.pubkey())
    );

    let checkpoint = h
        .program
        .commit(&h.validator, &h.account, Mutation::Set(43), 0)
        .unwrap();
    assert_eq!(checkpoint.sequence, 1);
    assert_eq!(
        h.program.apply_checkpoint(&checkpoint),
        Ok(ApplyOutcome::Applied)
    );
    assert_eq!(h.program.account(&h.account).unwrap().data, 43);

    h.program.undelegate(&h.owner, &h.account).unwrap();
    let account = h.program.account(&h.account).unwrap();
    assert_eq!(account.authority, AuthorityState::Undelegated);
    assert_eq!(account.data, 43);

    h.program.close(&h.owner, &h.account).unwrap();
    assert_eq!(
        h.program.account(&h.account),
        Err(DelegationError::AccountNotFound)
    );
}

#[test]
fn close_while_delegated_is_invalid() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();

    assert_eq!(
        h.program.close(&h.owner, &h.account),
        Err(DelegationError::InvalidStateTransition)
    );
    assert_eq!(
        h.program.close(&Keypair::new(), &h.account),
        Err(DelegationError::InvalidStateTransition)
    );
    assert!(h.program.account(&h.account).is_ok());
}

#[test]
fn close_by_non_owner_is_denied() {
    let mut h = setup();
    assert_eq!(
        h.program.close(&Keypair::new(), &h.account),
        Err(DelegationError::PermissionDenied)
    );
    assert!(h.program.account(&h.account).is_ok());
}

#[test]
fn update_by_non_owner_is_denied() {
    let mut h = setup();
    assert_eq!(
        h.program.update(&Keypair::new(), &h.account, 7),
        Err(DelegationError::PermissionDenied)
    );
    assert_eq!(h.program.account(&h.account).unwrap().data, 0);
}

#[test]
fn checkpoint_after_undelegate_is_invalid() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    h.program.undelegate(&h.owner, &h.account).unwrap();

    let late = CommitCheckpoint::sign(&h.validator, h.account, 1, 7);
    assert_eq!(
        h.program.apply_checkpoint(&late),
        Err(DelegationError::InvalidStateTransition)
    );
    let account = h.program.account(&h.account).unwrap();
    assert_eq!(account.data, 0);
    assert_eq!(account.last_applied_sequence, 0);
}

#[test]
fn directly_signed_checkpoint_updates_working_copy() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();

    let signed = CommitCheckpoint::sign(&h.validator, h.account, 1, 5);
    assert_eq!(h.program.apply_checkpoint(&signed), Ok(ApplyOutcome::Applied));

    let record = h.program.delegation(&h.account).unwrap();
    assert_eq!(record.last_issued_sequence, 1);
    assert_eq!(h.program.ephemeral_data(&h.account), Ok(5));

    h.program.undelegate(&h.owner, &h.account).unwrap();
    assert_eq!(h.program.account(&h.account).unwrap().data, 5);
}

#[test]
fn commit_builds_on_directly_signed_checkpoint() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    h.program
        .apply_checkpoint(&CommitCheckpoint::sign(&h.validator, h.account, 1, 100))
        .unwrap();

    assert_eq!(
        h.program
            .commit(&h.validator, &h.account, Mutation::Add(1), 0)
            .unwrap_err(),
        DelegationError::OutOfOrderCheckpoint
    );
    let next = h
        .program
        .commit(&h.validator, &h.account, Mutation::Add(1), 1)
        .unwrap();
    assert_eq!((next.sequence, next.data), (2, 101));
    assert_eq!(h.program.apply_checkpoint(&next), Ok(ApplyOutcome::Applied));
    assert_eq!(h.program.account(&h.account).unwrap().data, 101);
}

#[test]
fn out_of_order_checkpoint_is_rejected_and_replay_is_noop() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();

    let first = h
        .program
        .commit(&h.validator, &h.account, Mutation::Set(10), 0)
        .unwrap();
    let second = h
        .program
        .commit(&h.validator, &h.account, Mutation::Add(1), 1)
        .unwrap();
    let third = h
        .program
        .commit(&h.validator, &h.account, Mutation::Add(1), 2)
        .unwrap();
    assert_eq!(h.program.ephemeral_data(&h.account), Ok(12));
    assert_eq!(h.program.account(&h.account).unwrap().data, 0);

    assert_eq!(
        h.program.apply_checkpoint(&second),
        Err(DelegationError::OutOfOrderCheckpoint)
    );
    h.program.apply_checkpoint(&first).unwrap();
    assert_eq!(
        h.program.apply_checkpoint(&third),
        Err(DelegationError::OutOfOrderCheckpoint)
    );
    h.program.apply_checkpoint(&second).unwrap();
    assert_eq!(h.program.account(&h.account).unwrap().data, 11);

    assert_eq!(
        h.program.apply_checkpoint(&first),
        Ok(ApplyOutcome::Replayed)
    );
    assert_eq!(h.program.account(&h.account).unwrap().data, 11);
    assert_eq!(h.program.account(&h.account).unwrap().last_applied_sequence, 2);

    h.program.apply_checkpoint(&third).unwrap();
    assert_eq!(h.program.account(&h.account).unwrap().data, 12);
}

#[test]
fn commit_requires_expected_previous_sequence() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();

    assert_eq!(
        h.program
            .commit(&h.validator, &h.account, Mutation::Set(1), 5),
        Err(DelegationError::OutOfOrderCheckpoint)
    );
    assert_eq!(h.program.delegation(&h.account).unwrap().last_issued_sequence, 0);
}

#[test]
fn only_designated_validator_commits() {
    let mut h = setup();
    let stranger = Keypair::new();

    assert_eq!(
        h.program.commit(&h.validator, &h.account, Mutation::Set(1), 0),
        Err(DelegationError::InvalidStateTransition)
    );

    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    assert_eq!(
        h.program.commit(&stranger, &h.account, Mutation::Set(1), 0),
        Err(DelegationError::PermissionDenied)
    );
    assert_eq!(
        h.program.commit(&h.owner, &h.account, Mutation::Set(1), 0),
        Err(DelegationError::PermissionDenied)
    );
}

#[test]
fn undelegate_with_unapplied_checkpoint_fails() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    let checkpoint = h
        .program
        .commit(&h.validator, &h.account, Mutation::Set(7), 0)
        .unwrap();

    assert_eq!(
        h.program.undelegate(&h.validator, &h.account),
        Err(DelegationError::UncommittedState)
    );
    assert!(h.program.account(&h.account).unwrap().authority.is_delegated());

    h.program.apply_checkpoint(&checkpoint).unwrap();
    h.program.undelegate(&h.validator, &h.account).unwrap();
    assert_eq!(h.program.account(&h.account).unwrap().data, 7);
}

#[test]
fn delegate_then_undelegate_preserves_data() {
    let mut h = setup();
    h.program.update(&h.owner, &h.account, 5).unwrap();
    let before = h.program.account(&h.account).unwrap().clone();

    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    h.program.undelegate(&h.owner, &h.account).unwrap();

    let after = h.program.account(&h.account).unwrap();
    assert_eq!(after, &before);
    assert!(h.program.delegation(&h.account).is_none());
}

#[test]
fn delegate_rules() {
    let mut h = setup();
    let stranger = Keypair::new();

    assert_eq!(
        h.program
            .delegate(&stranger, &h.account, h.validator.pubkey()),
        Err(DelegationError::PermissionDenied)
    );
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    assert_eq!(
        h.program
            .delegate(&h.owner, &h.account, Keypair::new().pubkey()),
        Err(DelegationError::AlreadyDelegated)
    );
}

#[test]
fn base_layer_update_while_delegated_is_denied() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();

    assert_eq!(
        h.program.update(&h.owner, &h.account, 99),
        Err(DelegationError::PermissionDenied)
    );
    assert_eq!(h.program.account(&h.account).unwrap().data, 0);
}

#[test]
fn stale_validator_checkpoint_after_redelegation() {
    let mut h = setup();
    let second_validator = Keypair::new();

    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    let old = h
        .program
        .commit(&h.validator, &h.account, Mutation::Set(1), 0)
        .unwrap();
    h.program.apply_checkpoint(&old).unwrap();
    h.program.undelegate(&h.owner, &h.account).unwrap();

    h.program
        .delegate(&h.owner, &h.account, second_validator.pubkey())
        .unwrap();
    assert_eq!(
        h.program.apply_checkpoint(&old),
        Ok(ApplyOutcome::Replayed)
    );

    let next = h
        .program
        .commit(&second_validator, &h.account, Mutation::Add(1), 1)
        .unwrap();
    assert_eq!(next.sequence, 2);
    h.program.apply_checkpoint(&next).unwrap();
    assert_eq!(h.program.account(&h.account).unwrap().data, 2);
}

#[test]
fn commit_and_undelegate_is_atomic() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    let pending = h
        .program
        .commit(&h.validator, &h.account, Mutation::Set(3), 0)
        .unwrap();

    assert_eq!(
        h.program
            .commit_and_undelegate(&h.validator, &h.account, Mutation::Add(1)),
        Err(DelegationError::UncommittedState)
    );
    assert_eq!(h.program.delegation(&h.account).unwrap().last_issued_sequence, 1);

    h.program.apply_checkpoint(&pending).unwrap();
    let last = h
        .program
        .commit_and_undelegate(&h.validator, &h.account, Mutation::Add(1))
        .unwrap();
    assert_eq!(last.sequence, 2);

    let account = h.program.account(&h.account).unwrap();
    assert_eq!(account.data, 4);
    assert_eq!(account.last_applied_sequence, 2);
    assert_eq!(account.authority, AuthorityState::Undelegated);
    assert_eq!(
        h.program.apply_checkpoint(&last),
        Ok(ApplyOutcome::Replayed)
    );
}

#[test]
fn randomness_survives_delegation_changes() {
    let mut h = setup();
    let request = h.program.request_randomness(&h.owner, &h.account, 7).unwrap();
    assert_eq!(request.status, RequestStatus::Pending);
    assert_eq!(request.seed, [7u8; 32]);
    assert_eq!(request.requester_context, AuthorityState::Undelegated);
    assert_eq!(h.program.account(&h.account).unwrap().random_value, 0);

    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();

    assert_eq!(fulfill(&mut h, request.request_id, 99), Ok(99));
    let account = h.program.account(&h.account).unwrap();
    assert_eq!(account.random_value, 99);
    assert!(account.authority.is_delegated());
    assert_eq!(
        h.program.request(request.request_id).unwrap().status,
        RequestStatus::Fulfilled
    );

    h.program.undelegate(&h.owner, &h.account).unwrap();
    assert_eq!(h.program.account(&h.account).unwrap().random_value, 99);
}

#[test]
fn request_while_delegated_fulfilled_after_undelegate() {
    let mut h = setup();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    let request = h.program.request_randomness(&h.owner, &h.account, 1).unwrap();
    assert_eq!(
        request.requester_context,
        AuthorityState::Delegated(h.validator.pubkey())
    );

    h.program.undelegate(&h.owner, &h.account).unwrap();
    assert_eq!(fulfill(&mut h, request.request_id, 5), Ok(5));
    assert_eq!(h.program.account(&h.account).unwrap().random_value, 5);
}

#[test]
fn second_fulfill_reports_already_fulfilled() {
    let mut h = setup();
    let request = h.program.request_randomness(&h.owner, &h.account, 3).unwrap();

    fulfill(&mut h, request.request_id, 11).unwrap();
    assert_eq!(
        fulfill(&mut h, request.request_id, 12),
        Err(DelegationError::AlreadyFulfilled)
    );
    assert_eq!(h.program.account(&h.account).unwrap().random_value, 11);
}

#[test]
fn only_oracle_may_fulfill() {
    let mut h = setup();
    let request = h.program.request_randomness(&h.owner, &h.account, 3).unwrap();
    let randomness = randomness_for(8);
    let proof = build_signature_proof(&h.owner, &fulfillment_message(request.request_id, &randomness));

    assert_eq!(
        h.program
            .fulfill_randomness(&h.owner, request.request_id, randomness, &proof),
        Err(DelegationError::PermissionDenied)
    );
    assert_eq!(h.program.pending_requests().len(), 1);
}

#[test]
fn request_requires_owner() {
    let mut h = setup();
    assert_eq!(
        h.program
            .request_randomness(&Keypair::new(), &h.account, 1)
            .unwrap_err(),
        DelegationError::PermissionDenied
    );
}

#[test]
fn fulfill_after_close_leaves_request_pending() {
    let mut h = setup();
    let request = h.program.request_randomness(&h.owner, &h.account, 2).unwrap();
    h.program.close(&h.owner, &h.account).unwrap();

    assert_eq!(
        fulfill(&mut h, request.request_id, 1),
        Err(DelegationError::AccountNotFound)
    );
    assert_eq!(
        h.program.request(request.request_id).unwrap().status,
        RequestStatus::Pending
    );
}

#[test]
fn concurrent_fulfill_sets_value_once() {
    let h = setup();
    let Harness {
        mut program,
        oracle,
        owner,
        account,
        ..
    } = h;
    let request = program.request_randomness(&owner, &account, 9).unwrap();
    let program = Arc::new(Mutex::new(program));
    let oracle = Arc::new(oracle);

    let handles: Vec<_> = [21u64, 22u64]
        .into_iter()
        .map(|value| {
            let program = Arc::clone(&program);
            let oracle = Arc::clone(&oracle);
            thread::spawn(move || {
                let randomness = randomness_for(value);
                let proof = build_signature_proof(
                    &oracle,
                    &fulfillment_message(request.request_id, &randomness),
                );
                program.lock().unwrap().fulfill_randomness(
                    &oracle,
                    request.request_id,
                    randomness,
                    &proof,
                )
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let successes: Vec<u64> = results.iter().filter_map(|r| r.ok()).collect();
    assert_eq!(successes.len(), 1);
    assert!(results.contains(&Err(DelegationError::AlreadyFulfilled)));

    let program = program.lock().unwrap();
    assert_eq!(program.account(&account).unwrap().random_value, successes[0]);
    let fulfilled = program
        .events()
        .since(0)
        .iter()
        .filter(|e| matches!(e.event, ProgramEvent::RandomnessFulfilled(_)))
        .count();
    assert_eq!(fulfilled, 1);
}

#[test]
fn failed_operations_emit_nothing_and_keep_slot() {
    let mut h = setup();
    let slot = h.program.slot();
    let cursor = h.program.events().cursor();

    assert_eq!(
        h.program.close(&Keypair::new(), &h.account),
        Err(DelegationError::PermissionDenied)
    );
    assert_eq!(
        h.program.undelegate(&h.owner, &h.account),
        Err(DelegationError::InvalidStateTransition)
    );
    assert_eq!(
        h.program.initialize(&h.owner),
        Err(DelegationError::InvalidStateTransition)
    );

    assert_eq!(h.program.slot(), slot);
    assert!(h.program.events().since(cursor).is_empty());
}

#[test]
fn ownership_changes_are_observable() {
    let mut h = setup();
    let cursor = h.program.events().cursor();
    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    h.program.undelegate(&h.owner, &h.account).unwrap();

    let changes: Vec<_> = h
        .program
        .events()
        .since(cursor)
        .iter()
        .filter_map(|e| match &e.event {
            ProgramEvent::OwnershipChanged(changed) => Some(changed.current),
            _ => None,
        })
        .collect();
    assert_eq!(
        changes,
        vec![
            AuthorityState::Delegated(h.validator.pubkey()),
            AuthorityState::Undelegated
        ]
    );
}

#[test]
fn independent_deployments_do_not_share_accounts() {
    let mut first = setup();
    let second_config =
        ProgramConfig::new(Pubkey::new_unique(), Keypair::new().pubkey(), Pubkey::new_unique());
    let mut second = DelegationProgram::new(second_config).unwrap();

    let address = second.initialize(&first.owner).unwrap();
    assert_ne!(address, first.account);
    second.update(&first.owner, &address, 77).unwrap();
    assert_eq!(first.program.account(&first.account).unwrap().data, 0);
    first.program.update(&first.owner, &first.account, 1).unwrap();
    assert_eq!(second.account(&address).unwrap().data, 77);
}

#[test]
fn status_views_track_delegations_and_requests() {
    let mut h = setup();
    assert_eq!(h.program.delegated_count(), 0);
    assert_eq!(h.program.address_of(&h.owner.pubkey()), h.account);
    assert_ne!(h.program.config().oracle_queue, Pubkey::default());

    h.program
        .delegate(&h.owner, &h.account, h.validator.pubkey())
        .unwrap();
    assert_eq!(h.program.delegated_count(), 1);

    let request = h
        .program
        .request_randomness(&h.owner, &h.account, 3)
        .unwrap();
    assert_eq!(h.program.tracked_requests(), 1);
    fulfill(&mut h, request.request_id, 11).unwrap();
    assert_eq!(h.program.prune_fulfilled_requests(), 1);
    assert_eq!(h.program.tracked_requests(), 0);
    assert_eq!(
        fulfill(&mut h, request.request_id, 12),
        Err(DelegationError::AlreadyFulfilled)
    );
    assert_eq!(h.program.account(&h.account).unwrap().random_value, 11);

    h.program.undelegate(&h.owner, &h.account).unwrap();
    assert_eq!(h.program.delegated_count(), 0);
}
