//! Randomness request channel.
//!
//! Requests are recorded immediately and fulfilled later by an external
//! oracle. Fulfillment is orthogonal to ownership: the oracle holds a narrow,
//! permanent capability to write `random_value` on any account regardless of
//! its authority state. That capability is modeled by [`OracleCapability`]
//! and the [`RandomnessWriter`] it hands out, and is checked independently of
//! the owner/validator authority model.

use std::collections::BTreeMap;

use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::ed25519::verify_signature_proof;
use crate::errors::{DelegationError, Result};
use crate::state::{AuthorityState, RandomnessRequest, RequestStatus, UserAccount};

/// Interpret the first 8 bytes of an oracle output as a little-endian u64.
pub fn random_u64(randomness: &[u8; 32]) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&randomness[..8]);
    u64::from_le_bytes(bytes)
}

/// Expand a one-byte client seed into the 32-byte caller seed sent to the oracle.
pub fn caller_seed(client_seed: u8) -> [u8; 32] {
    [client_seed; 32]
}

/// Write access to `random_value`, granted to exactly one oracle signer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleCapability {
    identity: Pubkey,
}

impl OracleCapability {
    pub fn new(identity: Pubkey) -> Self {
        Self { identity }
    }

    /// Check that `signer` is the oracle and that `proof` carries its
    /// signature over `request_id || randomness`.
    pub fn authorize(
        &self,
        signer: &Pubkey,
        proof: &Instruction,
        request_id: u64,
        randomness: &[u8; 32],
    ) -> Result<RandomnessWriter> {
        if *signer != self.identity {
            return Err(DelegationError::PermissionDenied);
        }
        verify_signature_proof(proof, &self.identity, request_id, randomness)?;
        Ok(RandomnessWriter { _private: () })
    }
}

/// Proof that the oracle capability was checked. Can only touch `random_value`.
#[derive(Debug)]
pub struct RandomnessWriter {
    _private: (),
}

impl RandomnessWriter {
    pub fn write(&self, account: &mut UserAccount, randomness: &[u8; 32]) -> u64 {
        let value = random_u64(randomness);
        account.random_value = value;
        value
    }
}

/// Outstanding and completed randomness requests, keyed by request id.
#[derive(Debug)]
pub struct RandomnessChannel {
    capability: OracleCapability,
    requests: BTreeMap<u64, RandomnessRequest>,
    /// Monotonically increasing counter used to assign request ids.
    request_counter: u64,
}

impl RandomnessChannel {
    pub fn new(capability: OracleCapability) -> Self {
        Self {
            capability,
            requests: BTreeMap::new(),
            request_counter: 0,
        }
    }

    pub fn capability(&self) -> &OracleCapability {
        &self.capability
    }

    /// Record a new pending request and return a copy of it.
    pub fn open(
        &mut self,
        account: Pubkey,
        requester: Pubkey,
        seed: [u8; 32],
        requester_context: AuthorityState,
        slot: u64,
    ) -> Result<RandomnessRequest> {
        let request_id = self.request_counter;
        let next = request_id
            .checked_add(1)
            .ok_or(DelegationError::CounterOverflow)?;

        let request = RandomnessRequest {
            request_id,
            account,
            requester,
            seed,
            requester_context,
            request_slot: slot,
            status: RequestStatus::Pending,
            randomness: [0u8; 32],
            fulfilled_slot: 0,
        };
        self.requests.insert(request_id, request.clone());
        self.request_counter = next;
        Ok(request)
    }

    pub fn get(&self, request_id: u64) -> Result<&RandomnessRequest> {
        self.requests
            .get(&request_id)
            .ok_or(DelegationError::RequestNotFound)
    }

    /// A request that can still be fulfilled.
    ///
    /// Ids below the counter were issued, so a missing one was fulfilled and
    /// pruned.
    pub fn pending_request(&self, request_id: u64) -> Result<&RandomnessRequest> {
        match self.requests.get(&request_id) {
            Some(request) if request.status == RequestStatus::Pending => Ok(request),
            Some(_) => Err(DelegationError::AlreadyFulfilled),
            None if request_id < self.request_counter => Err(DelegationError::AlreadyFulfilled),
            None => Err(DelegationError::RequestNotFound),
        }
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Mark a pending request fulfilled. Fails with `AlreadyFulfilled` on a
    /// second attempt, leaving the first output in place.
    pub(crate) fn settle(
        &mut self,
        request_id: u64,
        randomness: [u8; 32],
        slot: u64,
    ) -> Result<&RandomnessRequest> {
        let request = self
            .requests
            .get_mut(&request_id)
            .ok_or(DelegationError::RequestNotFound)?;
        if request.status == RequestStatus::Fulfilled {
            return Err(DelegationError::AlreadyFulfilled);
        }
        request.status = RequestStatus::Fulfilled;
        request.randomness = randomness;
        request.fulfilled_slot = slot;
        Ok(request)
    }

    /// Pending requests in id order.
    pub fn pending(&self) -> impl Iterator<Item = &RandomnessRequest> {
        self.requests
            .values()
            .filter(|request| request.status == RequestStatus::Pending)
    }

    /// Drop fulfilled requests; their values already live in the accounts.
    pub fn prune_fulfilled(&mut self) -> usize {
        let before = self.requests.len();
        self.requests
            .retain(|_, request| request.status == RequestStatus::Pending);
        before - self.requests.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ed25519::{build_signature_proof, fulfillment_message};
    use solana_sdk::signature::{Keypair, Signer};

    #[test]
    fn random_u64_reads_little_endian_prefix() {
        let mut randomness = [0u8; 32];
        randomness[0] = 99;
        randomness[8] = 0xFF;
        assert_eq!(random_u64(&randomness), 99);
    }

    #[test]
    fn request_ids_are_sequential() {
        let mut channel = RandomnessChannel::new(OracleCapability::new(Pubkey::new_unique()));
        let account = Pubkey::new_unique();

        let first = channel
            .open(account, account, caller_seed(1), AuthorityState::Undelegated, 1)
            .unwrap();
        let second = channel
            .open(account, account, caller_seed(2), AuthorityState::Undelegated, 2)
            .unwrap();
        assert_eq!(first.request_id, 0);
        assert_eq!(second.request_id, 1);
        assert_eq!(channel.pending().count(), 2);
    }

    #[test]
    fn settle_is_at_most_once() {
        let mut channel = RandomnessChannel::new(OracleCapability::new(Pubkey::new_unique()));
        let account = Pubkey::new_unique();
        let request = channel
            .open(account, account, caller_seed(7), AuthorityState::Undelegated, 1)
            .unwrap();

        channel.settle(request.request_id, [1u8; 32], 2).unwrap();
        assert_eq!(
            channel.settle(request.request_id, [2u8; 32], 3).unwrap_err(),
            DelegationError::AlreadyFulfilled
        );
        assert_eq!(channel.get(request.request_id).unwrap().randomness, [1u8; 32]);
        assert_eq!(channel.prune_fulfilled(), 1);
    }

    #[test]
    fn pruned_request_still_reports_already_fulfilled() {
        let mut channel = RandomnessChannel::new(OracleCapability::new(Pubkey::new_unique()));
        let account = Pubkey::new_unique();
        let done = channel
            .open(account, account, caller_seed(1), AuthorityState::Undelegated, 1)
            .unwrap();
        let open = channel
            .open(account, account, caller_seed(2), AuthorityState::Undelegated, 2)
            .unwrap();
        channel.settle(done.request_id, [1u8; 32], 3).unwrap();

        assert_eq!(channel.prune_fulfilled(), 1);
        assert_eq!(channel.len(), 1);
        assert_eq!(
            channel.pending_request(done.request_id).unwrap_err(),
            DelegationError::AlreadyFulfilled
        );
        assert_eq!(channel.pending_request(open.request_id).unwrap().request_id, 1);
        assert_eq!(
            channel.pending_request(99).unwrap_err(),
            DelegationError::RequestNotFound
        );
    }

    #[test]
    fn capability_rejects_other_signers() {
        let oracle = Keypair::new();
        let capability = OracleCapability::new(oracle.pubkey());
        let randomness = [3u8; 32];
        let proof = build_signature_proof(&oracle, &fulfillment_message(0, &randomness));

        assert!(capability
            .authorize(&Pubkey::new_unique(), &proof, 0, &randomness)
            .is_err());
        assert!(capability
            .authorize(&oracle.pubkey(), &proof, 0, &randomness)
            .is_ok());
    }
}
