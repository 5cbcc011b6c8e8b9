use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;

pub mod authority;
pub mod checkpoint;
pub mod config;
pub mod ed25519;
pub mod errors;
pub mod events;
pub mod instructions;
pub mod randomness;
pub mod state;
pub mod store;

use authority::OwnershipAuthority;
use checkpoint::CommitCheckpoint;
use config::ProgramConfig;
use errors::{DelegationError, Result};
use events::{EventLog, ProgramEvent};
use instructions::ApplyOutcome;
use randomness::{OracleCapability, RandomnessChannel};
use state::{DelegationRecord, Mutation, RandomnessRequest, UserAccount};
use store::{derive_user_account, AccountStore, InMemoryAccountStore};

/// Account delegation program.
///
/// Moves write authority over a per-owner user account between the base
/// ledger and a validator on an ephemeral rollup, checkpoints ephemeral
/// mutations back to the base layer in strict sequence order, and accepts
/// asynchronous randomness callbacks from a trusted oracle in any ownership
/// state.
///
/// ## Account lifecycle
///
/// 1. **Initialize**: the owner creates the account at `["user", owner]`.
/// 2. **Update**: while undelegated, the owner mutates `data` directly.
/// 3. **Delegate**: the owner hands write authority to a validator.
/// 4. **Commit / Apply**: the validator issues signed checkpoints; anyone
///    relays them to the base layer, which applies them in order.
/// 5. **Undelegate**: once every checkpoint is applied, authority returns.
/// 6. **Close**: the owner destroys the undelegated account.
///
/// `request_randomness` and `fulfill_randomness` are available in every
/// state but the last and never change authority.
///
/// Each operation is a single transaction: it validates fully before it
/// mutates, so a failed call leaves every entity unchanged.
#[derive(Debug)]
pub struct DelegationProgram<S: AccountStore = InMemoryAccountStore> {
    pub(crate) config: ProgramConfig,
    pub(crate) store: S,
    pub(crate) authority: OwnershipAuthority,
    pub(crate) randomness: RandomnessChannel,
    pub(crate) events: EventLog,
    /// Slot of the last successful state-changing operation.
    pub(crate) slot: u64,
}

impl DelegationProgram<InMemoryAccountStore> {
    pub fn new(config: ProgramConfig) -> Result<Self> {
        Self::with_store(config, InMemoryAccountStore::new())
    }
}

impl<S: AccountStore> DelegationProgram<S> {
    pub fn with_store(config: ProgramConfig, store: S) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            store,
            authority: OwnershipAuthority::new(),
            randomness: RandomnessChannel::new(OracleCapability::new(config.oracle_identity)),
            events: EventLog::new(),
            slot: 0,
        })
    }

    /// Create the caller's user account. Returns its address.
    pub fn initialize(&mut self, user: &Keypair) -> Result<Pubkey> {
        instructions::initialize::handler(self, user)
    }

    /// Set `data` directly on an undelegated account (owner only).
    pub fn update(&mut self, user: &Keypair, account: &Pubkey, new_data: u64) -> Result<()> {
        instructions::update::handler(self, user, account, new_data)
    }

    /// Hand write authority to `validator` on the ephemeral layer.
    pub fn delegate(&mut self, user: &Keypair, account: &Pubkey, validator: Pubkey) -> Result<()> {
        instructions::delegate::handler(self, user, account, validator)
    }

    /// Apply `mutation` on the ephemeral layer and issue the next checkpoint.
    ///
    /// Only the designated validator may commit. `expected_prev_seq` must be
    /// the sequence of the last checkpoint it issued for this account.
    pub fn commit(
        &mut self,
        validator: &Keypair,
        account: &Pubkey,
        mutation: Mutation,
        expected_prev_seq: u64,
    ) -> Result<CommitCheckpoint> {
        instructions::commit::handler(self, validator, account, mutation, expected_prev_seq)
    }

    /// Write a relayed checkpoint into the base-layer record.
    ///
    /// Callable by anyone. Replays of already-applied sequences are no-ops.
    pub fn apply_checkpoint(&mut self, checkpoint: &CommitCheckpoint) -> Result<ApplyOutcome> {
        instructions::apply_checkpoint::handler(self, checkpoint)
    }

    /// Return write authority to the base layer.
    pub fn undelegate(&mut self, signer: &Keypair, account: &Pubkey) -> Result<()> {
        instructions::undelegate::handler(self, signer, account)
    }

    /// Commit a final mutation, apply it, and undelegate in one transaction.
    pub fn commit_and_undelegate(
        &mut self,
        validator: &Keypair,
        account: &Pubkey,
        mutation: Mutation,
    ) -> Result<CommitCheckpoint> {
        instructions::commit_and_undelegate::handler(self, validator, account, mutation)
    }

    /// Destroy an undelegated account (owner only).
    pub fn close(&mut self, user: &Keypair, account: &Pubkey) -> Result<()> {
        instructions::close::handler(self, user, account)
    }

    /// Record a randomness request for the oracle.
    pub fn request_randomness(
        &mut self,
        user: &Keypair,
        account: &Pubkey,
        client_seed: u8,
    ) -> Result<RandomnessRequest> {
        instructions::request_randomness::handler(self, user, account, client_seed)
    }

    /// Oracle callback: deliver `randomness` for a pending request.
    ///
    /// `proof` must be an Ed25519 signature-verify instruction in which the
    /// configured oracle signed `request_id || randomness`.
    pub fn fulfill_randomness(
        &mut self,
        oracle: &Keypair,
        request_id: u64,
        randomness: [u8; 32],
        proof: &Instruction,
    ) -> Result<u64> {
        instructions::fulfill_randomness::handler(self, oracle, request_id, randomness, proof)
    }

    pub fn config(&self) -> &ProgramConfig {
        &self.config
    }

    /// Address of `owner`'s user account.
    pub fn address_of(&self, owner: &Pubkey) -> Pubkey {
        derive_user_account(&self.config.program_id, owner).0
    }

    /// Base-layer record.
    pub fn account(&self, address: &Pubkey) -> Result<&UserAccount> {
        self.store.get(address)
    }

    /// Data as seen on the layer that currently holds authority.
    pub fn ephemeral_data(&self, address: &Pubkey) -> Result<u64> {
        let account = self.store.get(address)?;
        Ok(self
            .authority
            .record(address)
            .map_or(account.data, |record| record.ephemeral_data))
    }

    pub fn delegation(&self, address: &Pubkey) -> Option<&DelegationRecord> {
        self.authority.record(address)
    }

    pub fn request(&self, request_id: u64) -> Result<&RandomnessRequest> {
        self.randomness.get(request_id)
    }

    pub fn pending_requests(&self) -> Vec<RandomnessRequest> {
        self.randomness.pending().cloned().collect()
    }

    /// Forget fulfilled requests. Returns how many were dropped.
    ///
    /// A later delivery for a pruned request still fails with
    /// `AlreadyFulfilled`.
    pub fn prune_fulfilled_requests(&mut self) -> usize {
        self.randomness.prune_fulfilled()
    }

    /// Requests still held, pending or fulfilled.
    pub fn tracked_requests(&self) -> usize {
        self.randomness.len()
    }

    /// Number of accounts currently delegated.
    pub fn delegated_count(&self) -> usize {
        self.authority.delegated_count()
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Drop log entries a reader has consumed up to `cursor`.
    pub fn discard_events_before(&mut self, cursor: usize) -> usize {
        self.events.discard_before(cursor)
    }

    pub fn slot(&self) -> u64 {
        self.slot
    }

    /// Slot the next successful operation will run at.
    pub(crate) fn next_slot(&self) -> Result<u64> {
        self.slot
            .checked_add(1)
            .ok_or(DelegationError::CounterOverflow)
    }

    /// Seal a successful operation: advance the clock and emit its events.
    pub(crate) fn finish(&mut self, slot: u64, events: impl IntoIterator<Item = ProgramEvent>) {
        self.slot = slot;
        for event in events {
            self.events.emit(slot, event);
        }
    }
}
