use solana_sdk::pubkey::Pubkey;

use crate::errors::{DelegationError, Result};

/// Per-deployment configuration.
///
/// Passed explicitly to each program instance so independent deployments
/// (and tests) never share an oracle queue or identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramConfig {
    /// Program id used to derive user account addresses.
    pub program_id: Pubkey,
    /// Ed25519 key of the oracle allowed to fulfill randomness requests.
    pub oracle_identity: Pubkey,
    /// Queue the oracle watches for requests from this deployment.
    pub oracle_queue: Pubkey,
}

impl ProgramConfig {
    pub fn new(program_id: Pubkey, oracle_identity: Pubkey, oracle_queue: Pubkey) -> Self {
        Self {
            program_id,
            oracle_identity,
            oracle_queue,
        }
    }

    /// Reject zero-address keys.
    pub fn validate(&self) -> Result<()> {
        let zero = Pubkey::default();
        if self.program_id == zero || self.oracle_identity == zero || self.oracle_queue == zero {
            return Err(DelegationError::ZeroAddressNotAllowed);
        }
        Ok(())
    }
}
