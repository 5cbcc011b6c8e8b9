use solana_sdk::pubkey::Pubkey;

use crate::errors::{DelegationError, Result};

/// Which execution context currently holds write authority over an account.
///
/// A delegated account always names its validator; there is no way to
/// represent "delegated to nobody".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityState {
    /// The base layer owns the account; the owner may mutate it directly.
    Undelegated,
    /// A validator on the ephemeral layer owns the account.
    Delegated(Pubkey),
}

impl AuthorityState {
    pub fn is_delegated(&self) -> bool {
        matches!(self, AuthorityState::Delegated(_))
    }

    /// The validator holding authority, if any.
    pub fn validator(&self) -> Option<&Pubkey> {
        match self {
            AuthorityState::Undelegated => None,
            AuthorityState::Delegated(validator) => Some(validator),
        }
    }
}

/// Per-owner user account, the base-layer record of truth.
///
/// Seeds: `["user", owner]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserAccount {
    /// Base-layer controller. Immutable after creation.
    pub owner: Pubkey,
    /// Application payload.
    pub data: u64,
    /// Last value delivered by the randomness oracle; zero until the first callback.
    pub random_value: u64,
    /// Current write authority.
    pub authority: AuthorityState,
    /// Sequence number of the last checkpoint written into `data`.
    pub last_applied_sequence: u64,
    /// PDA bump seed cached for efficient re-derivation.
    pub bump: u8,
}

impl UserAccount {
    pub const SEED_PREFIX: &'static [u8] = b"user";

    pub fn new(owner: Pubkey, bump: u8) -> Self {
        Self {
            owner,
            data: 0,
            random_value: 0,
            authority: AuthorityState::Undelegated,
            last_applied_sequence: 0,
            bump,
        }
    }
}

/// Grant of write authority to a validator, held by the ownership authority
/// for as long as the account is delegated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelegationRecord {
    pub account: Pubkey,
    pub validator: Pubkey,
    /// Slot at which authority was handed over.
    pub delegated_slot: u64,
    /// Validator's working copy of the account data on the ephemeral layer.
    pub ephemeral_data: u64,
    /// Sequence number of the last checkpoint the validator issued.
    pub last_issued_sequence: u64,
}

/// A change the current authority makes to the account data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutation {
    /// Replace the data outright.
    Set(u64),
    /// Add to the current data (checked).
    Add(u64),
}

impl Mutation {
    pub fn apply(&self, current: u64) -> Result<u64> {
        match *self {
            Mutation::Set(value) => Ok(value),
            Mutation::Add(delta) => current
                .checked_add(delta)
                .ok_or(DelegationError::DataOverflow),
        }
    }
}

/// Lifecycle of a randomness request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    /// Request recorded, awaiting oracle fulfillment.
    Pending,
    /// Oracle has delivered a value; terminal.
    Fulfilled,
}

/// Correlates an outstanding oracle request with the account its callback writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomnessRequest {
    /// Unique identifier taken from the channel's request counter.
    pub request_id: u64,
    /// Account whose `random_value` the callback writes.
    pub account: Pubkey,
    /// Signer that issued the request.
    pub requester: Pubkey,
    /// Caller-provided entropy mixed into the oracle input.
    pub seed: [u8; 32],
    /// Authority state of the account at issuance. Informational only.
    pub requester_context: AuthorityState,
    /// Slot at which the request was created.
    pub request_slot: u64,
    pub status: RequestStatus,
    /// The 32-byte oracle output, zero while pending.
    pub randomness: [u8; 32],
    /// Slot at which the oracle fulfilled this request.
    pub fulfilled_slot: u64,
}
