use thiserror::Error;

/// Error codes for the delegation program.
///
/// Every variant maps to a stable numeric code (`6000 + variant index`, the
/// same convention Anchor uses for on-chain error responses) so off-chain
/// relays can classify failures without matching on strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DelegationError {
    /// Signer does not hold the role required for this action (owner, validator, or oracle).
    #[error("Permission denied")]
    PermissionDenied,
    /// The operation has no edge out of the account's current authority state.
    #[error("Invalid state transition")]
    InvalidStateTransition,
    /// `delegate` was called on an account that is already delegated.
    #[error("Account is already delegated")]
    AlreadyDelegated,
    /// The randomness request has already been fulfilled.
    #[error("Randomness request already fulfilled")]
    AlreadyFulfilled,
    /// The checkpoint sequence is not exactly `last_applied_sequence + 1`.
    #[error("Checkpoint applied out of order")]
    OutOfOrderCheckpoint,
    /// `undelegate` was called while issued checkpoints are still unapplied.
    #[error("Account has uncommitted ephemeral state")]
    UncommittedState,
    /// No account record exists at the given address.
    #[error("Account not found")]
    AccountNotFound,
    /// No randomness request exists with the given id.
    #[error("Randomness request not found")]
    RequestNotFound,
    /// A checkpoint signature does not verify against its validator.
    #[error("Invalid signature")]
    InvalidSignature,
    /// The Ed25519 proof attached to a fulfillment is malformed or does not match.
    #[error("Invalid signature proof")]
    InvalidSignatureProof,
    /// A checkpoint could not be decoded or its payload hash does not match.
    #[error("Malformed checkpoint")]
    MalformedCheckpoint,
    /// An `Add` mutation would overflow the account data.
    #[error("Account data overflow")]
    DataOverflow,
    /// A sequence, request, or slot counter would overflow u64.
    #[error("Counter overflow")]
    CounterOverflow,
    /// A public key argument was the zero address.
    #[error("Zero address not allowed")]
    ZeroAddressNotAllowed,
}

impl DelegationError {
    /// Offset of the first program error code.
    pub const CODE_OFFSET: u32 = 6000;

    /// Stable numeric error code for this variant.
    pub fn code(&self) -> u32 {
        Self::CODE_OFFSET + *self as u32
    }

    /// Whether a relay may resubmit the same operation later and expect a
    /// different outcome. Only ordering failures qualify: the missing
    /// predecessor checkpoint may still be in flight.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DelegationError::OutOfOrderCheckpoint)
    }
}

pub type Result<T> = std::result::Result<T, DelegationError>;
